//! Surface expression tree.
//!
//! The parser produces `SynNode`s in the same shape Julia's own parser
//! produces `Expr`s: a literal layer plus head/args nodes whose heads are
//! the familiar `:call`, `:block`, `:if`, … symbols (represented here as
//! strings; the VM interns them). Downstream stages never see tokens.

use crate::span::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SynNode {
    Int(i64),
    Int128(i128),
    Float(f64),
    Float32(f32),
    Bool(bool),
    Char(char),
    Str(String),
    /// An identifier reference. Operator names (`+`, `==`, …) also appear
    /// here when used as values or call targets.
    Ident(String, Span),
    Expr(Box<SynExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynExpr {
    pub head: String,
    pub args: Vec<SynNode>,
    pub span: Span,
}

impl SynNode {
    pub fn expr(head: &str, args: Vec<SynNode>, span: Span) -> SynNode {
        SynNode::Expr(Box::new(SynExpr {
            head: head.to_string(),
            args,
            span,
        }))
    }

    pub fn ident(name: &str, span: Span) -> SynNode {
        SynNode::Ident(name.to_string(), span)
    }

    /// The source span, where one is tracked.
    pub fn span(&self) -> Option<Span> {
        match self {
            SynNode::Ident(_, span) => Some(*span),
            SynNode::Expr(e) => Some(e.span),
            _ => None,
        }
    }

    /// If this node is an `Expr` with the given head, borrow it.
    pub fn as_expr(&self, head: &str) -> Option<&SynExpr> {
        match self {
            SynNode::Expr(e) if e.head == head => Some(e),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            SynNode::Ident(name, _) => Some(name),
            _ => None,
        }
    }

    /// True for `Expr` nodes regardless of head.
    pub fn is_expr(&self) -> bool {
        matches!(self, SynNode::Expr(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_expr_matches_head() {
        let node = SynNode::expr("call", vec![SynNode::ident("f", Span::default())], Span::default());
        assert!(node.as_expr("call").is_some());
        assert!(node.as_expr("block").is_none());
    }

    #[test]
    fn test_as_ident() {
        let node = SynNode::ident("x", Span::default());
        assert_eq!(node.as_ident(), Some("x"));
        assert_eq!(SynNode::Int(1).as_ident(), None);
    }
}
