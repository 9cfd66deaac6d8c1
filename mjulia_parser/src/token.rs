//! Token definitions for the Julia subset, produced by a
//! `logos`-generated lexer.
//!
//! Strings and block comments need unbounded lookahead (nested `$( … )`
//! interpolation, nested `#= =#`), so those are consumed by callbacks
//! rather than regular expressions.

use logos::{Lexer, Logos};

/// Consume a double-quoted string literal, tracking escape sequences and
/// `$( … )` interpolation groups (which may themselves contain quotes).
/// The lexer is positioned just after the opening quote; on success the
/// token slice covers the full literal including both quotes.
fn lex_string(lex: &mut Lexer<Token>) -> bool {
    let rest = lex.remainder().as_bytes();
    let mut i = 0;
    let mut paren_depth = 0usize;
    let mut in_nested_string = false;
    while i < rest.len() {
        match rest[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' if paren_depth == 0 => {
                lex.bump(i + 1);
                return true;
            }
            b'"' => in_nested_string = !in_nested_string,
            b'$' if !in_nested_string => {
                if rest.get(i + 1) == Some(&b'(') {
                    paren_depth += 1;
                    i += 2;
                    continue;
                }
            }
            b'(' if paren_depth > 0 && !in_nested_string => paren_depth += 1,
            b')' if paren_depth > 0 && !in_nested_string => paren_depth -= 1,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Consume a (possibly nested) `#= … =#` block comment.
fn lex_block_comment(lex: &mut Lexer<Token>) -> logos::Skip {
    let rest = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i + 1 < rest.len() {
        if rest[i] == b'#' && rest[i + 1] == b'=' {
            depth += 1;
            i += 2;
        } else if rest[i] == b'=' && rest[i + 1] == b'#' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                break;
            }
        } else {
            i += 1;
        }
    }
    lex.bump(i);
    logos::Skip
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    // ── literals ──────────────────────────────────────────────────────
    #[regex(r"0x[0-9a-fA-F_]+|0b[01_]+|0o[0-7_]+|[0-9][0-9_]*")]
    Int,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?|[0-9][0-9_]*[eE][+-]?[0-9]+")]
    Float,
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?f[0-9]+")]
    Float32,
    #[regex(r"'(\\.|[^'\\])'|'\\x[0-9a-fA-F]+'|'\\u[0-9a-fA-F]+'")]
    Char,
    #[token("\"", lex_string)]
    Str,

    #[token("true")]
    True,
    #[token("false")]
    False,

    // ── keywords ──────────────────────────────────────────────────────
    #[token("function")]
    Function,
    #[token("macro")]
    Macro,
    #[token("end")]
    End,
    #[token("if")]
    If,
    #[token("elseif")]
    Elseif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("struct")]
    Struct,
    #[token("mutable")]
    Mutable,
    #[token("abstract")]
    Abstract,
    #[token("primitive")]
    Primitive,
    #[token("type")]
    Type,
    #[token("const")]
    Const,
    #[token("global")]
    Global,
    #[token("local")]
    Local,
    #[token("quote")]
    Quote,
    #[token("begin")]
    Begin,
    #[token("let")]
    Let,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("using")]
    Using,
    #[token("import")]
    Import,
    #[token("export")]
    Export,
    #[token("module")]
    Module,
    #[token("in")]
    In,
    #[token("isa")]
    Isa,
    #[token("where")]
    Where,
    #[token("do")]
    Do,

    // ── identifiers ───────────────────────────────────────────────────
    // Trailing `!`s (mutating-function convention) are folded in by the
    // lexer wrapper, which can look ahead to rule out `!=`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[token("@")]
    At,

    // ── operators (longest first for shared prefixes) ─────────────────
    #[token("...")]
    Ellipsis,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<:")]
    SubtypeOp,
    #[token(">:")]
    SupertypeOp,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("^=")]
    CaretEq,
    #[token("%=")]
    PercentEq,
    #[token("÷=")]
    IntDivEq,
    #[token(".+=")]
    DotPlusEq,
    #[token(".-=")]
    DotMinusEq,
    #[token(".*=")]
    DotStarEq,
    #[token("./=")]
    DotSlashEq,
    #[token(".^=")]
    DotCaretEq,
    #[token(".=")]
    DotAssign,
    #[token(".+")]
    DotPlus,
    #[token(".-")]
    DotMinus,
    #[token(".*")]
    DotStar,
    #[token("./")]
    DotSlash,
    #[token(".\\")]
    DotBackslash,
    #[token(".^")]
    DotCaret,
    #[token(".%")]
    DotPercent,
    #[token(".==")]
    DotEqEq,
    #[token(".!=")]
    DotNotEq,
    #[token(".<=")]
    DotLe,
    #[token(".>=")]
    DotGe,
    #[token(".<")]
    DotLt,
    #[token(".>")]
    DotGt,
    #[token("::")]
    ColonColon,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("\\")]
    Backslash,
    #[token("÷")]
    IntDiv,
    #[token("^")]
    Caret,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("'")]
    Adjoint,
    #[token("?")]
    Question,
    #[token("$")]
    Dollar,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // ── trivia ────────────────────────────────────────────────────────
    // The line-comment pattern must not claim `#=`, or maximal munch
    // would swallow block-comment openers to end of line.
    #[token("#=", lex_block_comment)]
    BlockComment,
    #[regex(r"#([^=\n][^\n]*)?", logos::skip)]
    LineComment,
    #[token("\n")]
    Newline,
}

impl Token {
    /// Human-readable token name for error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Token::Int | Token::Float | Token::Float32 => "number",
            Token::Char => "character literal",
            Token::Str => "string literal",
            Token::Ident => "identifier",
            Token::Newline => "newline",
            Token::End => "`end`",
            Token::RParen => "`)`",
            Token::RBracket => "`]`",
            Token::RBrace => "`}`",
            Token::Comma => "`,`",
            _ => "token",
        }
    }

    /// True for tokens that may start an operand, used to tell postfix
    /// `'` (adjoint) apart from other uses and to end statements.
    pub fn is_expression_terminator(&self) -> bool {
        matches!(
            self,
            Token::Newline
                | Token::Semicolon
                | Token::End
                | Token::Else
                | Token::Elseif
                | Token::Catch
                | Token::Finally
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::Comma
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Token> {
        Token::lexer(src).filter_map(|t| t.ok()).collect()
    }

    #[test]
    fn test_numbers_lex_to_expected_kinds() {
        assert_eq!(lex_all("42"), vec![Token::Int]);
        assert_eq!(lex_all("0x1f"), vec![Token::Int]);
        assert_eq!(lex_all("0b1010"), vec![Token::Int]);
        assert_eq!(lex_all("3.25"), vec![Token::Float]);
        assert_eq!(lex_all("1e10"), vec![Token::Float]);
        assert_eq!(lex_all("1.5f0"), vec![Token::Float32]);
    }

    #[test]
    fn test_string_with_interpolation_is_one_token() {
        let toks = lex_all(r#""a $(f("x")) b""#);
        assert_eq!(toks, vec![Token::Str]);
    }

    #[test]
    fn test_nested_block_comment_is_skipped() {
        let toks = lex_all("1 #= outer #= inner =# still =# 2");
        assert_eq!(toks, vec![Token::Int, Token::Int]);
    }

    #[test]
    fn test_dot_operators() {
        assert_eq!(lex_all("a .+ b"), vec![Token::Ident, Token::DotPlus, Token::Ident]);
        assert_eq!(lex_all("a .== b"), vec![Token::Ident, Token::DotEqEq, Token::Ident]);
    }

    #[test]
    fn test_keywords_beat_identifiers_only_on_exact_match() {
        assert_eq!(lex_all("functional"), vec![Token::Ident]);
        assert_eq!(lex_all("function"), vec![Token::Function]);
    }

    #[test]
    fn test_char_and_adjoint() {
        assert_eq!(lex_all("'a'"), vec![Token::Char]);
        assert_eq!(lex_all("A'"), vec![Token::Ident, Token::Adjoint]);
    }
}
