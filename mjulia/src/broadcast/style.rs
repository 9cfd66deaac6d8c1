//! The `BroadcastStyle` lattice.
//!
//! `Unknown < Scalar < Dim(1) < Dim(2) < … < Conflict`, with tuples
//! carrying their own style that loses to any array style. Pairwise
//! combination picks the join; participants then agree on how the
//! result is shaped (tuple vs N-dimensional array).

use crate::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStyle {
    Unknown,
    /// A scalar participant (dimension-0 array style).
    Scalar,
    /// Array result with the given dimensionality.
    Dim(u8),
    /// All-tuple broadcast: result is a tuple.
    TupleStyle,
    /// Incompatible participant styles.
    Conflict,
}

impl BroadcastStyle {
    /// Pairwise join in the style lattice.
    pub fn combine(self, other: BroadcastStyle) -> BroadcastStyle {
        use BroadcastStyle::*;
        match (self, other) {
            (Unknown, s) | (s, Unknown) => s,
            (Scalar, s) | (s, Scalar) => s,
            (Dim(a), Dim(b)) => Dim(a.max(b)),
            (TupleStyle, TupleStyle) => TupleStyle,
            // A tuple broadcast against an array materializes as array.
            (TupleStyle, Dim(n)) | (Dim(n), TupleStyle) => Dim(n.max(1)),
            (Conflict, _) | (_, Conflict) => Conflict,
        }
    }
}

/// Style of a single participant.
pub fn style_of(v: &Value) -> BroadcastStyle {
    match v {
        Value::Array(a) => BroadcastStyle::Dim(a.borrow().ndims().min(255) as u8),
        Value::SubArray(_) => BroadcastStyle::Dim(1),
        Value::Range(_) => BroadcastStyle::Dim(1),
        Value::Tuple(_) => BroadcastStyle::TupleStyle,
        Value::Broadcasted(inner) => inner.resolve_style(),
        // Ref(x) shields its payload: always scalar.
        Value::RefWrap(_) => BroadcastStyle::Scalar,
        _ => BroadcastStyle::Scalar,
    }
}

/// Fold styles across all participants.
pub fn combine_all(args: &[Value]) -> BroadcastStyle {
    args.iter()
        .map(style_of)
        .fold(BroadcastStyle::Unknown, BroadcastStyle::combine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{new_array_ref, ArrayValue};

    #[test]
    fn test_lattice_join() {
        use BroadcastStyle::*;
        assert_eq!(Scalar.combine(Dim(1)), Dim(1));
        assert_eq!(Dim(1).combine(Dim(2)), Dim(2));
        assert_eq!(Unknown.combine(Scalar), Scalar);
        assert_eq!(TupleStyle.combine(Scalar), TupleStyle);
        assert_eq!(TupleStyle.combine(Dim(2)), Dim(2));
        assert_eq!(Conflict.combine(Dim(1)), Conflict);
    }

    #[test]
    fn test_combine_is_commutative() {
        use BroadcastStyle::*;
        for a in [Unknown, Scalar, Dim(1), Dim(2), TupleStyle, Conflict] {
            for b in [Unknown, Scalar, Dim(1), Dim(2), TupleStyle, Conflict] {
                assert_eq!(a.combine(b), b.combine(a));
            }
        }
    }

    #[test]
    fn test_ref_is_scalar_even_when_indexable() {
        let arr = Value::Array(new_array_ref(ArrayValue::from_i64(vec![1, 2], vec![2])));
        assert_eq!(style_of(&arr), BroadcastStyle::Dim(1));
        let shielded = Value::RefWrap(std::rc::Rc::new(arr));
        assert_eq!(style_of(&shielded), BroadcastStyle::Scalar);
    }
}
