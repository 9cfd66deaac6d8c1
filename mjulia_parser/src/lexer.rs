//! Lexer wrapper around the `logos`-generated token stream.
//!
//! Tokens are materialized up front into a vector. The wrapper also folds
//! trailing `!` characters into identifiers (`push!`, `normalize!!`),
//! which a regular lexer cannot do without ruling out `!=`.

use logos::Logos;

use crate::error::{ParseError, ParseResult};
use crate::span::{SourceMap, Span};
use crate::token::Token;

/// A token with its span and source text.
#[derive(Debug, Clone)]
pub struct SpannedToken<'a> {
    pub tok: Token,
    pub span: Span,
    pub text: &'a str,
}

/// Lex the entire source into spanned tokens.
pub fn tokenize(source: &str) -> ParseResult<Vec<SpannedToken<'_>>> {
    let map = SourceMap::new(source);
    let mut lexer = Token::lexer(source);
    let mut out: Vec<SpannedToken> = Vec::new();
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = map.span(range.start, range.end);
        let tok = match result {
            Ok(tok) => tok,
            Err(()) => {
                let found = source[range.start..].chars().next().unwrap_or('\0');
                if found == '"' {
                    return Err(ParseError::Unterminated {
                        what: "string literal",
                        span,
                    });
                }
                return Err(ParseError::UnexpectedChar { found, span });
            }
        };
        match tok {
            // Fold `ident` + adjacent `!` (not part of `!=`) into the
            // identifier, matching Julia's mutating-name convention.
            Token::Bang => {
                if let Some(prev) = out.last_mut() {
                    if prev.tok == Token::Ident && prev.span.end == span.start {
                        prev.span.end = span.end;
                        prev.text = &source[prev.span.start..span.end];
                        continue;
                    }
                }
                out.push(SpannedToken {
                    tok,
                    span,
                    text: &source[range.start..range.end],
                });
            }
            Token::BlockComment => {}
            _ => out.push(SpannedToken {
                tok,
                span,
                text: &source[range.start..range.end],
            }),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_bang_suffix_folds_into_identifier() {
        let toks = tokenize("push!(xs, 1)").unwrap();
        assert_eq!(toks[0].tok, Token::Ident);
        assert_eq!(toks[0].text, "push!");
    }

    #[test]
    fn test_bang_not_folded_across_whitespace() {
        let toks = kinds("x !y");
        assert_eq!(toks, vec![Token::Ident, Token::Bang, Token::Ident]);
    }

    #[test]
    fn test_not_equals_survives() {
        assert_eq!(kinds("a != b"), vec![Token::Ident, Token::NotEq, Token::Ident]);
        assert_eq!(kinds("a!=b"), vec![Token::Ident, Token::NotEq, Token::Ident]);
    }

    #[test]
    fn test_unterminated_string_reports_error() {
        assert!(matches!(
            tokenize("\"abc"),
            Err(ParseError::Unterminated { .. })
        ));
    }
}
