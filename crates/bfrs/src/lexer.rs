//! Lexer / normalizer: filters raw bytes down to the eight commands (plus
//! `#` when debug is enabled), run-length-folds `>`/`<`/`+`/`-`, and
//! peepholes `[-]` into a single `Clear` token.
//!
//! Structured the way `compiler::parser::lua_tokenize::LuaTokenize` wraps a
//! cursor and drives a `tokenize()` loop, but the scan algorithm itself is
//! ported from `original_source/extras/profilebf.c` lines 173-194.

use crate::config::ADD_SUB_FOLD_CAP;

/// One normalized token. Raw commands only - loop linking happens in the
/// IR builder, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Right(u32),
    Left(u32),
    Inc(u32),
    Dec(u32),
    LoopOpen,
    LoopClose,
    Print,
    Read,
    Clear,
    /// Debug dump, only emitted when `debug_hash` is enabled.
    Dump,
}

pub struct Lexer {
    debug_hash: bool,
}

impl Lexer {
    pub fn new(debug_hash: bool) -> Self {
        Lexer { debug_hash }
    }

    /// Tokenize `src`. Unmatched `]` are dropped; any `[` still open at end
    /// of input is discarded together with its (never-closed) body, by
    /// simply stopping the bracket-depth bookkeeping on a trailing `[` - a
    /// `[` with no matching `]` is, in effect, a no-op marker since nothing
    /// ever closes it; see `tokenize_to_end` for the stdin `!` terminator
    /// variant of the same loop.
    pub fn tokenize(&self, src: &[u8]) -> Vec<Token> {
        self.scan(src.iter().copied(), None).0
    }

    /// Stdin variant: a `!` with all loops closed ends the program phase.
    /// Returns the tokens and the byte offset right after the terminating
    /// `!` (or `src.len()` if none was found).
    pub fn tokenize_stdin(&self, src: &[u8]) -> (Vec<Token>, usize) {
        self.scan(src.iter().copied(), Some(b'!'))
    }

    fn scan(
        &self,
        bytes: impl Iterator<Item = u8>,
        terminator: Option<u8>,
    ) -> (Vec<Token>, usize) {
        let mut tokens: Vec<Token> = Vec::new();
        let mut open_depth: i64 = 0;
        let mut consumed = 0usize;

        for (i, ch) in bytes.enumerate() {
            consumed = i + 1;
            if Some(ch) == terminator && open_depth <= 0 && !tokens.is_empty() {
                consumed = i + 1;
                return (tokens, consumed);
            }

            match ch {
                b'>' | b'<' | b'+' | b'-' => {
                    self.fold_or_push(&mut tokens, ch);
                }
                b'[' => {
                    open_depth += 1;
                    tokens.push(Token::LoopOpen);
                }
                b']' => {
                    if open_depth > 0 {
                        open_depth -= 1;
                        self.apply_clear_peephole(&mut tokens);
                    }
                    // else: unmatched ']', silently dropped.
                }
                b'.' => tokens.push(Token::Print),
                b',' => tokens.push(Token::Read),
                b'#' if self.debug_hash => tokens.push(Token::Dump),
                _ => {}
            }
        }

        // Any '[' left open at end of input is a comment together with its
        // body: strip every token from the last unmatched LoopOpen onward.
        self.drop_trailing_unclosed_loops(&mut tokens);
        (tokens, consumed)
    }

    fn fold_or_push(&self, tokens: &mut Vec<Token>, ch: u8) {
        let capped = matches!(ch, b'+' | b'-');
        if let Some(last) = tokens.last_mut() {
            let merged = match (ch, last) {
                (b'>', Token::Right(n)) => Some(n),
                (b'<', Token::Left(n)) => Some(n),
                (b'+', Token::Inc(n)) => Some(n),
                (b'-', Token::Dec(n)) => Some(n),
                _ => None,
            };
            if let Some(n) = merged {
                if !capped || *n < ADD_SUB_FOLD_CAP {
                    *n += 1;
                    return;
                }
            }
        }
        tokens.push(match ch {
            b'>' => Token::Right(1),
            b'<' => Token::Left(1),
            b'+' => Token::Inc(1),
            b'-' => Token::Dec(1),
            _ => unreachable!(),
        });
    }

    /// Rewrite the just-closed `[ ... ]` into `Clear` when the body is
    /// exactly a single `-` of count 1.
    fn apply_clear_peephole(&self, tokens: &mut Vec<Token>) {
        let n = tokens.len();
        if n >= 3 {
            if let (Token::Dec(1), Token::LoopOpen) = (tokens[n - 1], tokens[n - 2]) {
                tokens.truncate(n - 2);
                tokens.push(Token::Clear);
                return;
            }
        }
        tokens.push(Token::LoopClose);
    }

    fn drop_trailing_unclosed_loops(&self, tokens: &mut Vec<Token>) {
        // Walk once, tracking depth; any LoopOpen whose matching close never
        // arrives (and everything lexed after it) is discarded.
        let mut depth = 0i64;
        let mut last_unmatched_open: Option<usize> = None;
        for (i, t) in tokens.iter().enumerate() {
            match t {
                Token::LoopOpen => {
                    if depth == 0 {
                        last_unmatched_open = Some(i);
                    }
                    depth += 1;
                }
                Token::LoopClose => {
                    depth -= 1;
                    if depth == 0 {
                        last_unmatched_open = None;
                    }
                }
                _ => {}
            }
        }
        if let Some(cut) = last_unmatched_open {
            tokens.truncate(cut);
        }
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Lexer::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_runs_and_caps_add_sub() {
        let lex = Lexer::default();
        let toks = lex.tokenize(b"++++++++");
        assert_eq!(toks, vec![Token::Inc(8)]);

        let many = vec![b'+'; 300];
        let toks = lex.tokenize(&many);
        assert_eq!(toks, vec![Token::Inc(128), Token::Inc(128), Token::Inc(44)]);

        // > and < have no cap.
        let many_right = vec![b'>'; 300];
        let toks = lex.tokenize(&many_right);
        assert_eq!(toks, vec![Token::Right(300)]);
    }

    #[test]
    fn clear_peephole() {
        let lex = Lexer::default();
        let toks = lex.tokenize(b"++++[-]");
        assert_eq!(toks, vec![Token::Inc(4), Token::Clear]);
    }

    #[test]
    fn unmatched_close_is_dropped() {
        let lex = Lexer::default();
        let toks = lex.tokenize(b"+]+");
        assert_eq!(toks, vec![Token::Inc(2)]);
    }

    #[test]
    fn trailing_unclosed_open_is_a_comment() {
        let lex = Lexer::default();
        let toks = lex.tokenize(b"++[--");
        assert_eq!(toks, vec![Token::Inc(2)]);
    }

    #[test]
    fn debug_hash_ignored_unless_enabled() {
        let lex = Lexer::default();
        assert_eq!(lex.tokenize(b"#"), vec![]);
        let lex = Lexer::new(true);
        assert_eq!(lex.tokenize(b"#"), vec![Token::Dump]);
    }

    #[test]
    fn stdin_terminator_splits_program_from_input() {
        let lex = Lexer::default();
        let (toks, consumed) = lex.tokenize_stdin(b"+.!hello");
        assert_eq!(toks, vec![Token::Inc(1), Token::Print]);
        assert_eq!(&b"+.!hello"[consumed..], b"hello");
    }

    #[test]
    fn tokenization_is_idempotent_on_printable_form() {
        let lex = Lexer::default();
        let toks = lex.tokenize(b"++++++++[>++++++++<-]>+.");
        let printed = print_tokens(&toks);
        let reparsed = lex.tokenize(printed.as_bytes());
        assert_eq!(toks, reparsed);
    }

    fn print_tokens(tokens: &[Token]) -> String {
        let mut s = String::new();
        for t in tokens {
            match t {
                Token::Right(n) => s.push_str(&">".repeat(*n as usize)),
                Token::Left(n) => s.push_str(&"<".repeat(*n as usize)),
                Token::Inc(n) => s.push_str(&"+".repeat(*n as usize)),
                Token::Dec(n) => s.push_str(&"-".repeat(*n as usize)),
                Token::LoopOpen => s.push('['),
                Token::LoopClose => s.push(']'),
                Token::Print => s.push('.'),
                Token::Read => s.push(','),
                Token::Clear => s.push_str("[-]"),
                Token::Dump => s.push('#'),
            }
        }
        s
    }
}
