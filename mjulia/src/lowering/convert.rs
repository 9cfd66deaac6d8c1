//! Surface-tree → runtime `Expr` value conversion.
//!
//! Everything after the parser works on first-class AST values, exactly
//! the trees user code sees from `quote`: identifiers become `Symbol`s,
//! `:x` becomes a `QuoteNode`, and blocks get a `LineNumberNode` before
//! each statement. Macro expansion and lowering both consume this form,
//! which is what lets `eval` share their pipeline.

use mjulia_parser::{SynExpr, SynNode};

use crate::interner::Symbol;
use crate::values::{LineNumberNodeValue, Value};
use std::rc::Rc;

/// Convert one parsed node into an AST value.
pub fn syn_to_value(node: &SynNode) -> Value {
    match node {
        SynNode::Int(x) => Value::I64(*x),
        SynNode::Int128(x) => Value::I128(*x),
        SynNode::Float(x) => Value::F64(*x),
        SynNode::Float32(x) => Value::F32(*x),
        SynNode::Bool(b) => Value::Bool(*b),
        SynNode::Char(c) => Value::Char(*c),
        SynNode::Str(s) => Value::str(s),
        SynNode::Ident(name, _) => Value::symbol(name),
        SynNode::Expr(e) => expr_to_value(e),
    }
}

fn expr_to_value(e: &SynExpr) -> Value {
    match e.head.as_str() {
        // `:x` is a quoted symbol.
        "symbol" => {
            let name = e.args[0].as_ident().unwrap_or("?");
            Value::QuoteNode(Rc::new(Value::symbol(name)))
        }
        // Blocks carry a line marker before each statement.
        "block" => {
            let mut args = Vec::with_capacity(e.args.len() * 2);
            for stmt in &e.args {
                let line = stmt.span().map(|s| s.line).unwrap_or(e.span.line);
                args.push(Value::LineNumberNode(LineNumberNodeValue::new(
                    line as i64,
                    None,
                )));
                args.push(syn_to_value(stmt));
            }
            Value::expr(Symbol::intern("block"), args)
        }
        head => {
            let args = e.args.iter().map(syn_to_value).collect();
            Value::expr(Symbol::intern(head), args)
        }
    }
}

/// Convert a whole program.
pub fn program_to_values(nodes: &[SynNode]) -> Vec<Value> {
    nodes.iter().map(syn_to_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mjulia_parser::parse_expression;

    fn conv(src: &str) -> Value {
        syn_to_value(&parse_expression(src).unwrap())
    }

    #[test]
    fn test_identifier_becomes_symbol() {
        assert!(matches!(conv("x"), Value::Sym(s) if s.as_str() == "x"));
    }

    #[test]
    fn test_quoted_symbol_becomes_quotenode() {
        let v = conv(":foo");
        let Value::QuoteNode(inner) = v else {
            panic!("expected QuoteNode");
        };
        assert!(matches!(&*inner, Value::Sym(s) if s.as_str() == "foo"));
    }

    #[test]
    fn test_call_shape() {
        let v = conv("f(1, 2)");
        let Value::Expr(e) = v else { panic!("expected Expr") };
        assert_eq!(e.head.as_str(), "call");
        assert_eq!(e.arg_count(), 3);
    }

    #[test]
    fn test_block_gets_line_markers() {
        let v = syn_to_value(
            &mjulia_parser::parse_program("begin\n    x = 1\n    y = 2\nend")
                .unwrap()
                .remove(0),
        );
        let Value::Expr(e) = v else { panic!("expected Expr") };
        assert_eq!(e.head.as_str(), "block");
        let args = e.arg_values();
        assert!(matches!(args[0], Value::LineNumberNode(_)));
        assert!(matches!(args[2], Value::LineNumberNode(_)));
    }

    #[test]
    fn test_field_access_carries_quotenode() {
        let v = conv("p.x");
        let Value::Expr(e) = v else { panic!("expected Expr") };
        assert_eq!(e.head.as_str(), ".");
        assert!(matches!(e.arg(1), Some(Value::QuoteNode(_))));
    }
}
