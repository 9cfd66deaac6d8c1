//! Fusion: collapse a nested `Broadcasted` tree into one flat form.
//!
//! `cat_nested` collects the non-`Broadcasted` leaves left-to-right
//! across every nesting level; `make_makeargs` builds one selector per
//! outer-function operand that either takes a leaf directly or applies
//! a nested function to its own selectors. The transform preserves
//! elementwise meaning: `flatten(bc)[i] == bc[i]` for every index.

use super::BroadcastedValue;
use crate::values::Value;

/// Selector reconstructing one operand of the outer function from the
/// flat leaf list.
#[derive(Debug, Clone)]
pub enum ArgMaker {
    /// Pass leaf `i` through unchanged.
    Leaf(usize),
    /// Apply `func` to the operands built by `inner`.
    Nested { func: Value, inner: Vec<ArgMaker> },
}

/// Single-level equivalent of a nested broadcast tree.
#[derive(Debug, Clone)]
pub struct FlatBroadcast {
    pub func: Value,
    pub leaves: Vec<Value>,
    pub makers: Vec<ArgMaker>,
}

impl FlatBroadcast {
    /// True when no fusion happened: every operand is a direct leaf.
    pub fn is_simple(&self) -> bool {
        self.makers.iter().all(|m| matches!(m, ArgMaker::Leaf(_)))
    }
}

/// Flatten a (possibly nested) broadcast into flat-argument form.
pub fn flatten(bc: &BroadcastedValue) -> FlatBroadcast {
    let mut leaves = Vec::new();
    let makers = make_makeargs(&bc.args, &mut leaves);
    FlatBroadcast {
        func: bc.func.clone(),
        leaves,
        makers,
    }
}

/// Collect leaves in left-to-right order and build the selector tree.
fn make_makeargs(args: &[Value], leaves: &mut Vec<Value>) -> Vec<ArgMaker> {
    args.iter()
        .map(|arg| match arg {
            Value::Broadcasted(inner) => {
                let sub = make_makeargs(&inner.args, leaves);
                ArgMaker::Nested {
                    func: inner.func.clone(),
                    inner: sub,
                }
            }
            leaf => {
                leaves.push(leaf.clone());
                ArgMaker::Leaf(leaves.len() - 1)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::broadcasted;
    use crate::interner::Symbol;
    use crate::values::{new_array_ref, ArrayValue, FunctionValue};

    fn f(name: &str) -> Value {
        Value::Function(FunctionValue::new(Symbol::intern(name)))
    }

    fn arr(data: Vec<f64>) -> Value {
        let len = data.len();
        Value::Array(new_array_ref(ArrayValue::from_f64(data, vec![len])))
    }

    #[test]
    fn test_flat_tree_stays_flat() {
        let bc = BroadcastedValue::new(f("+"), vec![arr(vec![1.0]), Value::F64(2.0)]);
        let flat = flatten(&bc);
        assert!(flat.is_simple());
        assert_eq!(flat.leaves.len(), 2);
    }

    #[test]
    fn test_nested_tree_collects_leaves_left_to_right() {
        // sin.(x) .+ cos.(y) → leaves (x, y), two nested makers.
        let x = arr(vec![0.0]);
        let y = arr(vec![1.0]);
        let inner_sin = broadcasted(f("sin"), vec![x]);
        let inner_cos = broadcasted(f("cos"), vec![y]);
        let outer = BroadcastedValue::new(f("+"), vec![inner_sin, inner_cos]);
        let flat = flatten(&outer);
        assert_eq!(flat.leaves.len(), 2);
        assert_eq!(flat.makers.len(), 2);
        assert!(matches!(
            &flat.makers[0],
            ArgMaker::Nested { inner, .. } if matches!(inner[0], ArgMaker::Leaf(0))
        ));
        assert!(matches!(
            &flat.makers[1],
            ArgMaker::Nested { inner, .. } if matches!(inner[0], ArgMaker::Leaf(1))
        ));
    }

    #[test]
    fn test_doubly_nested() {
        // exp.(sin.(x) .+ 1.0)
        let x = arr(vec![0.5]);
        let sin_x = broadcasted(f("sin"), vec![x]);
        let sum = broadcasted(f("+"), vec![sin_x, Value::F64(1.0)]);
        let outer = BroadcastedValue::new(f("exp"), vec![sum]);
        let flat = flatten(&outer);
        assert_eq!(flat.leaves.len(), 2);
        let ArgMaker::Nested { func: _, inner } = &flat.makers[0] else {
            panic!("expected nested maker");
        };
        assert!(matches!(&inner[0], ArgMaker::Nested { .. }));
        assert!(matches!(&inner[1], ArgMaker::Leaf(1)));
    }
}
