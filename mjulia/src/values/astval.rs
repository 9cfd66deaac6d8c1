//! First-class AST values: `Expr`, `LineNumberNode`, `GlobalRef`.
//!
//! `Expr.args` is a shared `Any` array so user code can `push!` into an
//! expression it is building, exactly as in Julia. `head` is fixed at
//! construction.

use super::array::{new_array_ref, ArrayRef, ArrayValue};
use super::Value;
use crate::interner::Symbol;

#[derive(Debug, Clone)]
pub struct ExprValue {
    pub head: Symbol,
    pub args: ArrayRef,
}

impl ExprValue {
    pub fn new(head: Symbol, args: Vec<Value>) -> Self {
        let len = args.len();
        Self {
            head,
            args: new_array_ref(ArrayValue::from_values(args, vec![len])),
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.borrow().len()
    }

    /// Clone out the argument list (cheap per-element clones).
    pub fn arg_values(&self) -> Vec<Value> {
        self.args.borrow().iter_values().collect()
    }

    pub fn arg(&self, index: usize) -> Option<Value> {
        let args = self.args.borrow();
        if index < args.len() {
            Some(args.get_linear(index))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberNodeValue {
    pub line: i64,
    pub file: Option<Symbol>,
}

impl LineNumberNodeValue {
    pub fn new(line: i64, file: Option<Symbol>) -> Self {
        Self { line, file }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalRefValue {
    pub module: Symbol,
    pub name: Symbol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_args_are_shared_and_mutable() {
        let e = ExprValue::new(Symbol::intern("call"), vec![Value::I64(1)]);
        e.args.borrow_mut().push(Value::I64(2));
        assert_eq!(e.arg_count(), 2);
        assert!(matches!(e.arg(1), Some(Value::I64(2))));
    }
}
