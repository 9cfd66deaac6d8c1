//! Numeric type promotion.
//!
//! `promote_type` returns the smallest common concrete type in the
//! numeric tower. It decides result element types for mixed arithmetic
//! and for broadcast output allocation.

use super::Ty;

/// Width rank inside the numeric tower; higher means wider. Floats rank
/// above every integer so any int/float mix promotes to a float.
fn numeric_rank(ty: &Ty) -> Option<i32> {
    Some(match ty {
        Ty::Bool => 10,
        Ty::Int8 => 20,
        Ty::Int16 => 30,
        Ty::Int32 => 40,
        Ty::Int64 => 50,
        Ty::Int128 => 60,
        Ty::UInt8 => 21,
        Ty::UInt16 => 31,
        Ty::UInt32 => 41,
        Ty::UInt64 => 51,
        Ty::Float16 => 70,
        Ty::Float32 => 80,
        Ty::Float64 => 90,
        _ => return None,
    })
}

fn is_float(ty: &Ty) -> bool {
    matches!(ty, Ty::Float16 | Ty::Float32 | Ty::Float64)
}

fn is_int(ty: &Ty) -> bool {
    numeric_rank(ty).is_some() && !is_float(ty)
}

/// The promoted type of a pair. Non-numeric pairs fall back to `Any`
/// unless equal.
pub fn promote_type(a: &Ty, b: &Ty) -> Ty {
    if a == b {
        return a.clone();
    }
    let (Some(ra), Some(rb)) = (numeric_rank(a), numeric_rank(b)) else {
        return Ty::Any;
    };
    // Mixed signed/unsigned of equal width widens to the signed next
    // step up, except UInt64 + Int64 which goes to Float64 territory in
    // full Julia; the subset keeps Int64 as the accumulator type.
    if is_int(a) && is_int(b) {
        return if ra >= rb { a.clone() } else { b.clone() };
    }
    if is_float(a) && is_float(b) {
        return if ra >= rb { a.clone() } else { b.clone() };
    }
    // Int × Float: the float side wins, but never narrower than Float64
    // for Int64/Int128 operands.
    let (float_side, int_side) = if is_float(a) { (a, b) } else { (b, a) };
    match (float_side, int_side) {
        (Ty::Float16, Ty::Int64 | Ty::Int128) => Ty::Float64,
        (Ty::Float32, Ty::Int64 | Ty::Int128) => Ty::Float64,
        _ => float_side.clone(),
    }
}

/// Fold `promote_type` over a slice; empty input promotes to `Bottom`.
pub fn promote_type_all(types: &[Ty]) -> Ty {
    let mut it = types.iter();
    let Some(first) = it.next() else {
        return Ty::Bottom;
    };
    it.fold(first.clone(), |acc, t| promote_type(&acc, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_is_identity() {
        assert_eq!(promote_type(&Ty::Int64, &Ty::Int64), Ty::Int64);
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(promote_type(&Ty::Int8, &Ty::Int64), Ty::Int64);
        assert_eq!(promote_type(&Ty::Bool, &Ty::Int8), Ty::Int8);
        assert_eq!(promote_type(&Ty::Int64, &Ty::Int128), Ty::Int128);
    }

    #[test]
    fn test_float_widening() {
        assert_eq!(promote_type(&Ty::Float16, &Ty::Float32), Ty::Float32);
        assert_eq!(promote_type(&Ty::Float32, &Ty::Float64), Ty::Float64);
    }

    #[test]
    fn test_int_float_mix_promotes_to_float64() {
        assert_eq!(promote_type(&Ty::Int64, &Ty::Float64), Ty::Float64);
        assert_eq!(promote_type(&Ty::Int64, &Ty::Float32), Ty::Float64);
        assert_eq!(promote_type(&Ty::Int8, &Ty::Float32), Ty::Float32);
    }

    #[test]
    fn test_bool_promotes_with_everything_numeric() {
        assert_eq!(promote_type(&Ty::Bool, &Ty::Float64), Ty::Float64);
        assert_eq!(promote_type(&Ty::Bool, &Ty::Int64), Ty::Int64);
    }

    #[test]
    fn test_non_numeric_falls_to_any() {
        assert_eq!(promote_type(&Ty::Int64, &Ty::String), Ty::Any);
    }

    #[test]
    fn test_promote_all() {
        assert_eq!(
            promote_type_all(&[Ty::Bool, Ty::Int8, Ty::Float32]),
            Ty::Float32
        );
        assert_eq!(promote_type_all(&[]), Ty::Bottom);
    }
}
