//! Rewrites balanced simple loops into closed-form `Calc` updates, and
//! performs the smaller peephole cleanups a minimally sound optimizer
//! needs. Grounded on the balanced-loop detector in
//! `original_source/extras/profilebf.c`'s `optimise()` (lines 501-541),
//! generalized from its per-node `M`/`N`/`R`/`L` tagging to a closed-form
//! `Calc` node able to express both a plain assignment and a
//! self-accumulating update.
//!
//! Scope note (see DESIGN.md): the `Simple`/`Mult`/`Cmult`/`For` shape
//! checks only look at *leaf* loop bodies (no nested loop). A loop whose
//! body itself contains another loop is recursively optimized one level
//! down and then kept as a plain `Whl`/`End` at the outer level - this is
//! always sound, and it also happens to be required for any "balanced
//! slipping loop" whose outer loop has nonzero net pointer motion once
//! the inner one is accounted for, since such a loop could never have
//! qualified for a closed-form rewrite anyway.

use crate::ir::node::{Op, Program};
use std::collections::HashMap;

pub fn optimize(program: &Program) -> Program {
    let mut nodes = program.nodes.clone();
    drop_leading_dead_loop(&mut nodes);
    coalesce_movs(&mut nodes);
    collapse_set_add(&mut nodes);

    let mut ptr: i64 = 0;
    let mut known_zero: HashMap<i64, bool> = HashMap::new();
    let mut tracking = true;
    let nodes = rewrite_loops(&nodes, 0, &mut ptr, &mut known_zero, &mut tracking);

    Program {
        nodes,
        program_len: program.program_len,
    }
}

/// A `Whl` at the very first node has a statically-zero head cell (the
/// tape starts at all zeros and nothing has run yet), so its body executes
/// zero times; delete the whole loop.
fn drop_leading_dead_loop(nodes: &mut Vec<Op>) {
    if let Some(Op::Whl { link, .. }) = nodes.first().copied() {
        nodes.drain(0..=link);
    }
}

fn coalesce_movs(nodes: &mut Vec<Op>) {
    let mut out: Vec<Op> = Vec::with_capacity(nodes.len());
    for &n in nodes.iter() {
        if let (Op::Mov { count: a }, Some(Op::Mov { count: b })) = (n, out.last().copied()) {
            let idx = out.len() - 1;
            let merged = a + b;
            if merged == 0 {
                out.pop();
            } else {
                out[idx] = Op::Mov { count: merged };
            }
        } else {
            out.push(n);
        }
    }
    *nodes = out;
}

fn collapse_set_add(nodes: &mut Vec<Op>) {
    let mut out: Vec<Op> = Vec::with_capacity(nodes.len());
    for &n in nodes.iter() {
        if let (Op::Add { count: add, offset }, Some(Op::Set { count: set, offset: set_off })) =
            (n, out.last().copied())
        {
            if offset == set_off {
                let idx = out.len() - 1;
                out[idx] = Op::Set {
                    count: set + add,
                    offset,
                };
                continue;
            }
        }
        out.push(n);
    }
    *nodes = out;
}

/// Find the `End` matching the `Whl` at `open`, scanning only `Whl`/`End`
/// nesting (the only loop-forms present before this pass has run).
fn find_matching_end(nodes: &[Op], open: usize) -> usize {
    let mut depth = 0i64;
    for (i, n) in nodes.iter().enumerate().skip(open) {
        match n {
            Op::Whl { .. } => depth += 1,
            Op::End { .. } => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    panic!("unbalanced Whl/End in IR");
}

struct SimplePlan {
    /// (relative offset, accumulated factor), offset != 0, sorted by offset.
    targets: Vec<(i64, i64)>,
}

/// The classic `profilebf.c` balanced-loop test: body is pure `Mov`/`Add`,
/// net pointer motion is zero, and exactly one `-1` touches the head cell.
fn try_simple_multiply(body: &[Op]) -> Option<SimplePlan> {
    let mut rel: i64 = 0;
    let mut factors: HashMap<i64, i64> = HashMap::new();
    let mut head_decrements = 0u32;

    for n in body {
        match *n {
            Op::Mov { count } => rel += count,
            Op::Add { count, offset: 0 } => {
                if rel == 0 {
                    if count == -1 {
                        head_decrements += 1;
                    } else {
                        return None; // anything else touching the head breaks the idiom
                    }
                } else {
                    *factors.entry(rel).or_insert(0) += count;
                }
            }
            _ => return None,
        }
    }

    if rel != 0 || head_decrements != 1 {
        return None;
    }

    let mut targets: Vec<(i64, i64)> = factors.into_iter().filter(|&(_, f)| f != 0).collect();
    targets.sort_by_key(|&(off, _)| off);
    Some(SimplePlan { targets })
}

fn is_pure_arithmetic(body: &[Op]) -> bool {
    body.iter()
        .all(|n| matches!(n, Op::Mov { .. } | Op::Add { .. }))
}

fn net_motion_pure(body: &[Op]) -> i64 {
    body.iter()
        .map(|n| match n {
            Op::Mov { count } => *count,
            _ => 0,
        })
        .sum()
}

fn has_nested_loop(body: &[Op]) -> bool {
    body.iter().any(|n| matches!(n, Op::Whl { .. }))
}

/// Does the body's *last* write to the relative head offset (0) set it to
/// a literal zero, with no later write to that offset? If so the `Whl`
/// it belongs to runs at most once: after one pass the head is exactly 0,
/// so the zero-test can never re-enter it.
fn ends_with_literal_zero_at_head(body: &[Op]) -> bool {
    let mut rel: i64 = 0;
    let mut last_head_write: Option<i64> = None;
    for n in body {
        match *n {
            Op::Mov { count } => rel += count,
            Op::Add { offset: 0, .. } if rel == 0 => last_head_write = None,
            Op::Set { count, offset: 0 } if rel == 0 => last_head_write = Some(count),
            _ => {}
        }
    }
    matches!(last_head_write, Some(0))
}

fn all_targets_known_zero(
    plan_targets: &[(i64, i64)],
    ptr: i64,
    known_zero: &HashMap<i64, bool>,
) -> bool {
    plan_targets
        .iter()
        .all(|&(off, _)| *known_zero.get(&(ptr + off)).unwrap_or(&true))
}

fn rewrite_loops(
    nodes: &[Op],
    depth: u32,
    ptr: &mut i64,
    known_zero: &mut HashMap<i64, bool>,
    tracking: &mut bool,
) -> Vec<Op> {
    let mut out: Vec<Op> = Vec::with_capacity(nodes.len());
    let mut i = 0;
    while i < nodes.len() {
        match nodes[i] {
            Op::Whl { .. } => {
                let close = find_matching_end(nodes, i);
                let body = &nodes[i + 1..close];

                if !has_nested_loop(body) {
                    if let Some(plan) = try_simple_multiply(body) {
                        if plan.targets.is_empty() {
                            out.push(Op::Set {
                                count: 0,
                                offset: 0,
                            });
                        } else {
                            let use_assign = depth == 0
                                && *tracking
                                && all_targets_known_zero(&plan.targets, *ptr, known_zero);
                            for &(off, factor) in &plan.targets {
                                out.push(if use_assign {
                                    Op::Calc {
                                        off,
                                        c: 0,
                                        off2: 0,
                                        c2: factor,
                                        off3: 0,
                                        c3: 0,
                                    }
                                } else {
                                    Op::Calc {
                                        off,
                                        c: 0,
                                        off2: 0,
                                        c2: factor,
                                        off3: off,
                                        c3: 1,
                                    }
                                });
                            }
                            out.push(Op::Set {
                                count: 0,
                                offset: 0,
                            });
                        }
                        if depth == 0 {
                            for &(off, _) in &plan.targets {
                                known_zero.insert(*ptr + off, false);
                            }
                            known_zero.insert(*ptr, true);
                        }
                        i = close + 1;
                        continue;
                    }

                    if ends_with_literal_zero_at_head(body) {
                        push_bracket(
                            &mut out,
                            |off, link| Op::If { offset: off, link },
                            |off, link| Op::EndIf { offset: off, link },
                            body,
                        );
                        if depth == 0 {
                            known_zero.insert(*ptr, true);
                            for off in touched_offsets(body) {
                                known_zero.insert(*ptr + off, false);
                            }
                        }
                        i = close + 1;
                        continue;
                    }

                    if is_pure_arithmetic(body) && net_motion_pure(body) == 0 {
                        let cmult =
                            depth == 0 && *tracking && body_offsets_known_zero(body, *ptr, known_zero);
                        push_bracket(
                            &mut out,
                            |off, link| {
                                if cmult {
                                    Op::Cmult { offset: off, link }
                                } else {
                                    Op::Mult { offset: off, link }
                                }
                            },
                            |off, link| Op::End { offset: off, link },
                            body,
                        );
                        if depth == 0 {
                            known_zero.insert(*ptr, true);
                            for off in touched_offsets(body) {
                                known_zero.insert(*ptr + off, false);
                            }
                        }
                        i = close + 1;
                        continue;
                    }

                    if let Some(Op::Set { count: k, offset: 0 }) = out.last().copied() {
                        let body_is_plain_movable = body
                            .iter()
                            .all(|n| matches!(n, Op::Mov { .. } | Op::Add { .. } | Op::Prt { .. } | Op::Inp { .. } | Op::Chr { .. }));
                        if k >= 0 && body_is_plain_movable && net_motion_pure(body) == 0 {
                            push_bracket(
                                &mut out,
                                |off, link| Op::For {
                                    offset: off,
                                    trip_count: k,
                                    link,
                                },
                                |off, link| Op::End { offset: off, link },
                                body,
                            );
                            if depth == 0 {
                                known_zero.insert(*ptr, true);
                            }
                            i = close + 1;
                            continue;
                        }
                    }
                }

                // Fallback: recursively optimize the body, keep a generic loop.
                let mut inner_ptr = 0i64;
                let mut inner_zero = HashMap::new();
                let mut inner_tracking = true;
                let body_rewritten = rewrite_loops(
                    body,
                    depth + 1,
                    &mut inner_ptr,
                    &mut inner_zero,
                    &mut inner_tracking,
                );
                push_bracket(
                    &mut out,
                    |off, link| Op::Whl { offset: off, link },
                    |off, link| Op::End { offset: off, link },
                    &body_rewritten,
                );
                if depth == 0 {
                    *tracking = false;
                }
                i = close + 1;
            }
            other => {
                match other {
                    Op::Mov { count } => {
                        if depth == 0 {
                            *ptr += count;
                        }
                    }
                    Op::Add { count, offset } if depth == 0 => {
                        if count != 0 {
                            known_zero.insert(*ptr + offset, false);
                        }
                    }
                    Op::Set { count, offset } if depth == 0 => {
                        known_zero.insert(*ptr + offset, count == 0);
                    }
                    Op::Inp { offset } if depth == 0 => {
                        known_zero.insert(*ptr + offset, false);
                    }
                    _ => {}
                }
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

fn touched_offsets(body: &[Op]) -> Vec<i64> {
    let mut rel = 0i64;
    let mut offs = Vec::new();
    for n in body {
        match *n {
            Op::Mov { count } => rel += count,
            Op::Add { offset, .. } => offs.push(rel + offset),
            Op::Set { offset, .. } => offs.push(rel + offset),
            Op::Inp { offset } => offs.push(rel + offset),
            _ => {}
        }
    }
    offs
}

fn body_offsets_known_zero(body: &[Op], ptr: i64, known_zero: &HashMap<i64, bool>) -> bool {
    touched_offsets(body)
        .iter()
        .all(|&off| *known_zero.get(&(ptr + off)).unwrap_or(&true))
}

fn push_bracket(
    out: &mut Vec<Op>,
    open: impl FnOnce(i64, usize) -> Op,
    close: impl FnOnce(i64, usize) -> Op,
    body: &[Op],
) {
    let open_idx = out.len();
    out.push(open(0, usize::MAX));
    out.extend_from_slice(body);
    let close_idx = out.len();
    out.push(close(0, open_idx));
    match &mut out[open_idx] {
        Op::Whl { link, .. }
        | Op::If { link, .. }
        | Op::Mult { link, .. }
        | Op::Cmult { link, .. }
        | Op::For { link, .. } => *link = close_idx,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::build;
    use crate::lexer::Lexer;

    fn optimize_src(src: &[u8]) -> Program {
        let lex = Lexer::default();
        optimize(&build(&lex.tokenize(src)))
    }

    #[test]
    fn clear_cell_rewrite() {
        let p = optimize_src(b"++++[-]");
        assert_eq!(
            p.nodes,
            vec![
                Op::Add {
                    count: 4,
                    offset: 0
                },
                Op::Set {
                    count: 0,
                    offset: 0
                },
            ]
        );
    }

    #[test]
    fn hello_world_core_loop_becomes_calc() {
        let p = optimize_src(b"++++++++[>++++++++<-]>+.");
        assert_eq!(
            p.nodes,
            vec![
                Op::Add {
                    count: 8,
                    offset: 0
                },
                Op::Calc {
                    off: 1,
                    c: 0,
                    off2: 0,
                    c2: 8,
                    off3: 0,
                    c3: 0,
                },
                Op::Set {
                    count: 0,
                    offset: 0
                },
                Op::Mov { count: 1 },
                Op::Add {
                    count: 1,
                    offset: 0
                },
                Op::Prt { offset: 0 },
            ]
        );
    }

    #[test]
    fn slipping_loop_is_not_rewritten() {
        let p = optimize_src(b">+>++>+>+>+++[>[->+++<<++>]<<]");
        // Outer loop keeps its Whl/End shape: net pointer motion is -1 once
        // the (now-optimized) inner loop is taken as a zero-motion block.
        assert!(p.nodes.iter().any(|n| matches!(n, Op::Whl { .. })));
        assert!(p.nodes.iter().any(|n| matches!(n, Op::End { .. })));
        // But the inner loop did get reduced to Calc.
        assert!(p.nodes.iter().any(|n| matches!(n, Op::Calc { .. })));
    }

    #[test]
    fn leading_dead_loop_is_dropped() {
        let p = optimize_src(b"[+++.-]++.");
        assert_eq!(
            p.nodes,
            vec![
                Op::Add {
                    count: 2,
                    offset: 0
                },
                Op::Prt { offset: 0 },
            ]
        );
    }

    #[test]
    fn run_fold_cap_is_respected_after_optimization() {
        let many = vec![b'+'; 300];
        let lex = Lexer::default();
        let toks = lex.tokenize(&many);
        for t in toks {
            if let crate::lexer::Token::Inc(n) = t {
                assert!(n <= 128);
            }
        }
    }
}
