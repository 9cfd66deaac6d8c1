//! Literal decoding: numbers, chars, and string unescaping.

use crate::ast::SynNode;
use crate::error::{ParseError, ParseResult};
use crate::span::Span;

/// Decode an integer literal (decimal, `0x`, `0b`, `0o`, `_` separators).
/// Decimal literals that overflow `Int64` promote to `Int128`.
pub fn decode_int(text: &str, span: Span) -> ParseResult<SynNode> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let invalid = || ParseError::InvalidLiteral {
        what: "integer",
        text: text.to_string(),
        span,
    };
    if let Some(hex) = cleaned.strip_prefix("0x") {
        let v = u64::from_str_radix(hex, 16).map_err(|_| invalid())?;
        return Ok(SynNode::Int(v as i64));
    }
    if let Some(bin) = cleaned.strip_prefix("0b") {
        let v = u64::from_str_radix(bin, 2).map_err(|_| invalid())?;
        return Ok(SynNode::Int(v as i64));
    }
    if let Some(oct) = cleaned.strip_prefix("0o") {
        let v = u64::from_str_radix(oct, 8).map_err(|_| invalid())?;
        return Ok(SynNode::Int(v as i64));
    }
    if let Ok(v) = cleaned.parse::<i64>() {
        return Ok(SynNode::Int(v));
    }
    let v = cleaned.parse::<i128>().map_err(|_| invalid())?;
    Ok(SynNode::Int128(v))
}

pub fn decode_float(text: &str, span: Span) -> ParseResult<SynNode> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    cleaned
        .parse::<f64>()
        .map(SynNode::Float)
        .map_err(|_| ParseError::InvalidLiteral {
            what: "float",
            text: text.to_string(),
            span,
        })
}

/// Decode a `Float32` literal in `1.5f0` notation: the `f` plays the role
/// of `e` and the result is 32-bit.
pub fn decode_float32(text: &str, span: Span) -> ParseResult<SynNode> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let as_exp = cleaned.replacen('f', "e", 1);
    as_exp
        .parse::<f32>()
        .map(SynNode::Float32)
        .map_err(|_| ParseError::InvalidLiteral {
            what: "Float32",
            text: text.to_string(),
            span,
        })
}

/// Decode a character literal including escape sequences.
pub fn decode_char(text: &str, span: Span) -> ParseResult<SynNode> {
    let inner = &text[1..text.len() - 1];
    let invalid = || ParseError::InvalidLiteral {
        what: "character",
        text: text.to_string(),
        span,
    };
    let mut chars = inner.chars();
    let first = chars.next().ok_or_else(invalid)?;
    let c = if first == '\\' {
        decode_escape(&mut chars).ok_or_else(invalid)?
    } else {
        first
    };
    if chars.next().is_some() {
        return Err(invalid());
    }
    Ok(SynNode::Char(c))
}

fn decode_escape(chars: &mut std::str::Chars) -> Option<char> {
    match chars.next()? {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        '$' => Some('$'),
        'e' => Some('\u{1b}'),
        'x' | 'u' => {
            let hex: String = chars.clone().take_while(|c| c.is_ascii_hexdigit()).collect();
            for _ in 0..hex.len() {
                chars.next();
            }
            let code = u32::from_str_radix(&hex, 16).ok()?;
            char::from_u32(code)
        }
        _ => None,
    }
}

/// Unescape the literal (non-interpolated) portion of a string body.
pub fn unescape_str(raw: &str, span: Span) -> ParseResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let decoded = decode_escape(&mut chars).ok_or(ParseError::InvalidLiteral {
                what: "string escape",
                text: raw.to_string(),
                span,
            })?;
            out.push(decoded);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_int() {
        assert_eq!(decode_int("1_000", Span::default()).unwrap(), SynNode::Int(1000));
    }

    #[test]
    fn test_radix_ints() {
        assert_eq!(decode_int("0x10", Span::default()).unwrap(), SynNode::Int(16));
        assert_eq!(decode_int("0b101", Span::default()).unwrap(), SynNode::Int(5));
        assert_eq!(decode_int("0o17", Span::default()).unwrap(), SynNode::Int(15));
    }

    #[test]
    fn test_int_overflow_promotes_to_int128() {
        let node = decode_int("170141183460469231731687303715", Span::default()).unwrap();
        assert!(matches!(node, SynNode::Int128(_)));
    }

    #[test]
    fn test_float32_suffix() {
        assert_eq!(
            decode_float32("1.5f0", Span::default()).unwrap(),
            SynNode::Float32(1.5)
        );
        assert_eq!(
            decode_float32("25f-2", Span::default()).unwrap(),
            SynNode::Float32(0.25)
        );
    }

    #[test]
    fn test_char_escapes() {
        assert_eq!(decode_char(r"'\n'", Span::default()).unwrap(), SynNode::Char('\n'));
        assert_eq!(decode_char(r"'☃'", Span::default()).unwrap(), SynNode::Char('☃'));
    }

    #[test]
    fn test_unescape_string() {
        assert_eq!(unescape_str(r"a\tb", Span::default()).unwrap(), "a\tb");
        assert_eq!(unescape_str(r"\$x", Span::default()).unwrap(), "$x");
    }
}
