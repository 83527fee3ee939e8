//! Builds the flat, naive IR from a token stream: one pass, a loop stack of
//! open `Whl` indices, and a `program_len` tally.
//!
//! The link-by-index discipline mirrors `compiler::code`'s
//! `jump`/`get_label`/`patchlist` family: a loop head is emitted with a
//! placeholder link, the index is pushed, and closing the loop patches both
//! nodes to point at each other by position in the flat `Vec<Op>` rather
//! than by pointer.

use crate::ir::node::{Op, Program};
use crate::lexer::Token;

pub fn build(tokens: &[Token]) -> Program {
    let mut nodes: Vec<Op> = Vec::with_capacity(tokens.len());
    let mut loop_stack: Vec<usize> = Vec::new();
    let mut program_len: i64 = 0;

    for tok in tokens {
        match *tok {
            Token::Right(n) => {
                nodes.push(Op::Mov { count: n as i64 });
                program_len += n as i64;
            }
            Token::Left(n) => {
                nodes.push(Op::Mov { count: -(n as i64) });
                program_len += n as i64;
            }
            Token::Inc(n) => {
                nodes.push(Op::Add {
                    count: n as i64,
                    offset: 0,
                });
                program_len += n as i64;
            }
            Token::Dec(n) => {
                nodes.push(Op::Add {
                    count: -(n as i64),
                    offset: 0,
                });
                program_len += n as i64;
            }
            Token::Clear => {
                nodes.push(Op::Set {
                    count: 0,
                    offset: 0,
                });
                program_len += 3;
            }
            Token::LoopOpen => {
                let idx = nodes.len();
                nodes.push(Op::Whl {
                    offset: 0,
                    link: usize::MAX,
                });
                loop_stack.push(idx);
                program_len += 1;
            }
            Token::LoopClose => {
                // Dropped-unmatched closes never reach here: the lexer
                // only emits LoopClose when it saw a matching LoopOpen.
                let open_idx = loop_stack.pop().expect("unbalanced loop in token stream");
                let close_idx = nodes.len();
                nodes.push(Op::End {
                    offset: 0,
                    link: open_idx,
                });
                if let Op::Whl { link, .. } = &mut nodes[open_idx] {
                    *link = close_idx;
                }
                program_len += 1;
            }
            Token::Print => {
                nodes.push(Op::Prt { offset: 0 });
                program_len += 1;
            }
            Token::Read => {
                nodes.push(Op::Inp { offset: 0 });
                program_len += 1;
            }
            Token::Dump => {
                nodes.push(Op::Dump);
                program_len += 1;
            }
        }
    }

    debug_assert!(loop_stack.is_empty(), "unbalanced loop in token stream");

    Program { nodes, program_len }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn build_src(src: &[u8]) -> Program {
        let lex = Lexer::default();
        build(&lex.tokenize(src))
    }

    #[test]
    fn clear_cell_rewrite() {
        let p = build_src(b"++++[-]");
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
        assert_eq!(p.program_len, 4 + 3);
    }

    #[test]
    fn every_whl_links_to_exactly_one_end_and_back() {
        let p = build_src(b"++++++++[>++++++++<-]>+.");
        let whl_idx = p
            .nodes
            .iter()
            .position(|n| matches!(n, Op::Whl { .. }))
            .unwrap();
        let end_idx = p
            .nodes
            .iter()
            .position(|n| matches!(n, Op::End { .. }))
            .unwrap();
        match p.nodes[whl_idx] {
            Op::Whl { link, .. } => assert_eq!(link, end_idx),
            _ => unreachable!(),
        }
        match p.nodes[end_idx] {
            Op::End { link, .. } => assert_eq!(link, whl_idx),
            _ => unreachable!(),
        }
    }

    #[test]
    fn nested_loops_balance() {
        let p = build_src(b">+>++>+>+>+++[>[->+++<<++>]<<]");
        let opens: Vec<usize> = p
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Op::Whl { .. }))
            .map(|(i, _)| i)
            .collect();
        let closes: Vec<usize> = p
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Op::End { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(opens.len(), closes.len());
        for &o in &opens {
            if let Op::Whl { link, .. } = p.nodes[o] {
                assert!(matches!(p.nodes[link], Op::End { .. }));
            }
        }
    }

    #[test]
    fn debug_hash_becomes_a_dump_node() {
        let lex = Lexer::new(true);
        let p = build(&lex.tokenize(b"+#"));
        assert_eq!(p.nodes, vec![Op::Add { count: 1, offset: 0 }, Op::Dump]);
    }
}
