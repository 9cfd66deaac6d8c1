//! The three equality relations.
//!
//! - `is_identical` (`===`): egal. Bitwise for immutables (so
//!   `-0.0 !== 0.0` and `NaN === NaN`), pointer identity for mutables.
//! - `julia_eq` (`==`): numeric equality with three-valued logic —
//!   `missing` taints the result, `NaN != NaN`, `-0.0 == 0.0`.
//! - `isequal_values`/`hash_value`: the total order used by hash
//!   containers; `isequal(NaN, NaN)`, `!isequal(-0.0, 0.0)`, and
//!   `hash(1) == hash(1.0)`.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::Value;

/// `a === b`.
pub fn is_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::I8(x), Value::I8(y)) => x == y,
        (Value::I16(x), Value::I16(y)) => x == y,
        (Value::I32(x), Value::I32(y)) => x == y,
        (Value::I64(x), Value::I64(y)) => x == y,
        (Value::I128(x), Value::I128(y)) => x == y,
        (Value::U8(x), Value::U8(y)) => x == y,
        (Value::U16(x), Value::U16(y)) => x == y,
        (Value::U32(x), Value::U32(y)) => x == y,
        (Value::U64(x), Value::U64(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        // Floats are egal by bit pattern: NaN === NaN, -0.0 !== 0.0.
        (Value::F16(x), Value::F16(y)) => x.to_bits() == y.to_bits(),
        (Value::F32(x), Value::F32(y)) => x.to_bits() == y.to_bits(),
        (Value::F64(x), Value::F64(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Nothing, Value::Nothing) => true,
        (Value::Missing, Value::Missing) => true,
        (Value::Undef, Value::Undef) => true,
        (Value::Sym(x), Value::Sym(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| is_identical(a, b))
        }
        (Value::NamedTuple(x), Value::NamedTuple(y)) => {
            x.names == y.names
                && x.values
                    .iter()
                    .zip(y.values.iter())
                    .all(|(a, b)| is_identical(a, b))
        }
        (Value::Range(x), Value::Range(y)) => x == y,
        // Mutable containers: reference identity.
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::SubArray(x), Value::SubArray(y)) => Rc::ptr_eq(x, y),
        (Value::MutStruct(x), Value::MutStruct(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::Expr(x), Value::Expr(y)) => Rc::ptr_eq(x, y),
        (Value::Task(x), Value::Task(y)) => Rc::ptr_eq(x, y),
        (Value::IOBuf(x), Value::IOBuf(y)) => Rc::ptr_eq(x, y),
        // Immutable records: structural egal.
        (Value::Struct(x), Value::Struct(y)) => {
            x.name == y.name
                && x.params == y.params
                && x.fields.len() == y.fields.len()
                && x.fields
                    .iter()
                    .zip(y.fields.iter())
                    .all(|(a, b)| is_identical(a, b))
        }
        (Value::Type(x), Value::Type(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => x.name == y.name,
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        (Value::QuoteNode(x), Value::QuoteNode(y)) => is_identical(x, y),
        (Value::LineNumberNode(x), Value::LineNumberNode(y)) => x == y,
        (Value::GlobalRef(x), Value::GlobalRef(y)) => x == y,
        (Value::RefWrap(x), Value::RefWrap(y)) => Rc::ptr_eq(x, y),
        (Value::Regex(x), Value::Regex(y)) => x.pattern == y.pattern,
        (Value::Broadcasted(x), Value::Broadcasted(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// Numeric class for cross-type comparison.
enum Num {
    Int(i128),
    Float(f64),
}

fn numeric_class(v: &Value) -> Option<Num> {
    match v {
        Value::I8(x) => Some(Num::Int(*x as i128)),
        Value::I16(x) => Some(Num::Int(*x as i128)),
        Value::I32(x) => Some(Num::Int(*x as i128)),
        Value::I64(x) => Some(Num::Int(*x as i128)),
        Value::I128(x) => Some(Num::Int(*x)),
        Value::U8(x) => Some(Num::Int(*x as i128)),
        Value::U16(x) => Some(Num::Int(*x as i128)),
        Value::U32(x) => Some(Num::Int(*x as i128)),
        Value::U64(x) => Some(Num::Int(*x as i128)),
        Value::Bool(x) => Some(Num::Int(*x as i128)),
        Value::F16(x) => Some(Num::Float(x.to_f64())),
        Value::F32(x) => Some(Num::Float(*x as f64)),
        Value::F64(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

/// `a == b` with three-valued logic: `None` means `missing`.
pub fn julia_eq(a: &Value, b: &Value) -> Option<bool> {
    if matches!(a, Value::Missing) || matches!(b, Value::Missing) {
        return None;
    }
    if let (Some(na), Some(nb)) = (numeric_class(a), numeric_class(b)) {
        return Some(match (na, nb) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (Num::Float(x), Num::Float(y)) => x == y,
            (Num::Int(x), Num::Float(y)) | (Num::Float(y), Num::Int(x)) => {
                y == x as f64 && y.fract() == 0.0
            }
        });
    }
    match (a, b) {
        (Value::Tuple(x), Value::Tuple(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            let mut saw_missing = false;
            for (ea, eb) in x.iter().zip(y.iter()) {
                match julia_eq(ea, eb) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => saw_missing = true,
                }
            }
            if saw_missing {
                None
            } else {
                Some(true)
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            if x.shape != y.shape {
                return Some(false);
            }
            let mut saw_missing = false;
            for i in 0..x.len() {
                match julia_eq(&x.get_linear(i), &y.get_linear(i)) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => saw_missing = true,
                }
            }
            if saw_missing {
                None
            } else {
                Some(true)
            }
        }
        (Value::Struct(x), Value::Struct(y)) => {
            if x.name != y.name || x.fields.len() != y.fields.len() {
                return Some(false);
            }
            for (fa, fb) in x.fields.iter().zip(y.fields.iter()) {
                match julia_eq(fa, fb) {
                    Some(true) => {}
                    other => return other,
                }
            }
            Some(true)
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return Some(false);
            }
            for (k, v) in x.map.iter() {
                match y.map.get(k) {
                    Some(other) if isequal_values(v, other) => {}
                    _ => return Some(false),
                }
            }
            Some(true)
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            Some(x.len() == y.len() && x.iter_values().all(|v| y.contains(v)))
        }
        (Value::Range(x), Value::Range(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            for (ea, eb) in x.iter_values().zip(y.iter_values()) {
                if julia_eq(&ea, &eb) != Some(true) {
                    return Some(false);
                }
            }
            Some(true)
        }
        _ => Some(is_identical(a, b)),
    }
}

/// Total equality used by Dict/Set: like `==` but `isequal(NaN, NaN)`,
/// `!isequal(-0.0, 0.0)`, and `isequal(missing, missing)`.
pub fn isequal_values(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Missing, Value::Missing) => true,
        (Value::Missing, _) | (_, Value::Missing) => false,
        _ => {
            if let (Some(na), Some(nb)) = (numeric_class(a), numeric_class(b)) {
                return match (na, nb) {
                    (Num::Int(x), Num::Int(y)) => x == y,
                    (Num::Float(x), Num::Float(y)) => {
                        if x.is_nan() || y.is_nan() {
                            x.is_nan() && y.is_nan()
                        } else {
                            x == y && x.is_sign_negative() == y.is_sign_negative()
                        }
                    }
                    (Num::Int(x), Num::Float(y)) | (Num::Float(y), Num::Int(x)) => {
                        !y.is_nan()
                            && !y.is_sign_negative() == !(x < 0)
                            && y == x as f64
                            && y.fract() == 0.0
                    }
                };
            }
            julia_eq(a, b) == Some(true)
        }
    }
}

/// Total order used by `sort` and friends: `isless(NaN, x)` is false for
/// non-NaN x (NaN sorts last), `-0.0 < 0.0`, `missing` sorts last of all.
pub fn isless_values(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Missing, _) => Some(false),
        (_, Value::Missing) => Some(true),
        _ => {
            if let (Some(na), Some(nb)) = (numeric_class(a), numeric_class(b)) {
                return Some(match (na, nb) {
                    (Num::Int(x), Num::Int(y)) => x < y,
                    (Num::Float(x), Num::Float(y)) => float_isless(x, y),
                    (Num::Int(x), Num::Float(y)) => float_isless(x as f64, y),
                    (Num::Float(x), Num::Int(y)) => float_isless(x, y as f64),
                });
            }
            match (a, b) {
                (Value::Str(x), Value::Str(y)) => Some(x < y),
                (Value::Char(x), Value::Char(y)) => Some(x < y),
                (Value::Sym(x), Value::Sym(y)) => Some(x.as_str() < y.as_str()),
                (Value::Tuple(x), Value::Tuple(y)) => {
                    for (ea, eb) in x.iter().zip(y.iter()) {
                        if isless_values(ea, eb)? {
                            return Some(true);
                        }
                        if isless_values(eb, ea)? {
                            return Some(false);
                        }
                    }
                    Some(x.len() < y.len())
                }
                _ => None,
            }
        }
    }
}

fn float_isless(x: f64, y: f64) -> bool {
    // NaN is greater than everything else and equal to itself; -0.0 is
    // less than 0.0.
    match (x.is_nan(), y.is_nan()) {
        (true, _) => false,
        (false, true) => true,
        (false, false) => {
            if x == y {
                x.is_sign_negative() && !y.is_sign_negative()
            } else {
                x < y
            }
        }
    }
}

/// Hash consistent with `isequal_values`.
pub fn hash_value(v: &Value) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut h = DefaultHasher::new();
    hash_into(v, &mut h);
    h.finish()
}

fn hash_into(v: &Value, h: &mut impl Hasher) {
    match v {
        Value::Missing => 0x4d49_5353u64.hash(h),
        Value::Nothing => 0x4e4f_4e45u64.hash(h),
        Value::Undef => 0x554e_4445u64.hash(h),
        Value::Bool(_)
        | Value::I8(_)
        | Value::I16(_)
        | Value::I32(_)
        | Value::I64(_)
        | Value::I128(_)
        | Value::U8(_)
        | Value::U16(_)
        | Value::U32(_)
        | Value::U64(_)
        | Value::F16(_)
        | Value::F32(_)
        | Value::F64(_) => match numeric_class(v) {
            Some(Num::Int(x)) => {
                1u8.hash(h);
                x.hash(h);
            }
            Some(Num::Float(x)) => {
                if x.is_nan() {
                    2u8.hash(h);
                } else if x == x.trunc()
                    && !x.is_infinite()
                    && !(x == 0.0 && x.is_sign_negative())
                    && (i128::MIN as f64..i128::MAX as f64).contains(&x)
                {
                    // Integral floats hash like their integer value so
                    // hash(1) == hash(1.0), matching isequal.
                    1u8.hash(h);
                    (x as i128).hash(h);
                } else {
                    3u8.hash(h);
                    x.to_bits().hash(h);
                }
            }
            None => unreachable!("numeric variants classified above"),
        },
        Value::Str(s) => {
            4u8.hash(h);
            s.hash(h);
        }
        Value::Char(c) => {
            5u8.hash(h);
            c.hash(h);
        }
        Value::Sym(s) => {
            6u8.hash(h);
            s.id().hash(h);
        }
        Value::Tuple(elems) => {
            7u8.hash(h);
            elems.len().hash(h);
            for e in elems.iter() {
                hash_into(e, h);
            }
        }
        Value::NamedTuple(nt) => {
            8u8.hash(h);
            for (n, e) in nt.names.iter().zip(nt.values.iter()) {
                n.id().hash(h);
                hash_into(e, h);
            }
        }
        Value::Array(a) => {
            9u8.hash(h);
            let a = a.borrow();
            a.shape.hash(h);
            for e in a.iter_values() {
                hash_into(&e, h);
            }
        }
        Value::Range(r) => {
            10u8.hash(h);
            r.len().hash(h);
            for e in r.iter_values() {
                hash_into(&e, h);
            }
        }
        Value::Struct(s) => {
            11u8.hash(h);
            s.name.id().hash(h);
            for f in &s.fields {
                hash_into(f, h);
            }
        }
        Value::Type(t) => {
            12u8.hash(h);
            t.hash(h);
        }
        Value::Function(f) => {
            13u8.hash(h);
            f.name.id().hash(h);
        }
        Value::QuoteNode(inner) => {
            14u8.hash(h);
            hash_into(inner, h);
        }
        other => {
            // Reference values hash by heap identity, matching the
            // pointer-equality branch of isequal's fallback.
            15u8.hash(h);
            let addr = match other {
                Value::Dict(d) => Rc::as_ptr(d) as usize,
                Value::Set(s) => Rc::as_ptr(s) as usize,
                Value::MutStruct(s) => Rc::as_ptr(s) as usize,
                Value::Expr(e) => Rc::as_ptr(e) as usize,
                Value::Closure(c) => Rc::as_ptr(c) as usize,
                Value::SubArray(v) => Rc::as_ptr(v) as usize,
                Value::Task(t) => Rc::as_ptr(t) as usize,
                Value::IOBuf(b) => Rc::as_ptr(b) as usize,
                Value::RefWrap(r) => Rc::as_ptr(r) as usize,
                Value::Broadcasted(b) => Rc::as_ptr(b) as usize,
                Value::Regex(r) => Rc::as_ptr(r) as usize,
                Value::RegexMatch(m) => Rc::as_ptr(m) as usize,
                _ => 0,
            };
            addr.hash(h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{new_array_ref, ArrayValue};

    #[test]
    fn test_egal_floats_by_bits() {
        assert!(is_identical(&Value::F64(f64::NAN), &Value::F64(f64::NAN)));
        assert!(!is_identical(&Value::F64(-0.0), &Value::F64(0.0)));
        assert!(!is_identical(&Value::I64(1), &Value::F64(1.0)));
    }

    #[test]
    fn test_eq_floats_ieee() {
        assert_eq!(
            julia_eq(&Value::F64(f64::NAN), &Value::F64(f64::NAN)),
            Some(false)
        );
        assert_eq!(julia_eq(&Value::F64(-0.0), &Value::F64(0.0)), Some(true));
        assert_eq!(julia_eq(&Value::I64(1), &Value::F64(1.0)), Some(true));
    }

    #[test]
    fn test_missing_taints_eq_but_not_egal() {
        assert_eq!(julia_eq(&Value::Missing, &Value::Missing), None);
        assert_eq!(julia_eq(&Value::Missing, &Value::I64(1)), None);
        assert!(is_identical(&Value::Missing, &Value::Missing));
    }

    #[test]
    fn test_isequal_contracts() {
        assert!(isequal_values(
            &Value::F64(f64::NAN),
            &Value::F64(f64::NAN)
        ));
        assert!(!isequal_values(&Value::F64(-0.0), &Value::F64(0.0)));
        assert!(isequal_values(&Value::Missing, &Value::Missing));
        assert!(isequal_values(&Value::I64(1), &Value::F64(1.0)));
    }

    #[test]
    fn test_hash_respects_isequal() {
        assert_eq!(
            hash_value(&Value::I64(7)),
            hash_value(&Value::F64(7.0))
        );
        assert_eq!(
            hash_value(&Value::F64(f64::NAN)),
            hash_value(&Value::F64(f64::NAN))
        );
        assert_ne!(
            hash_value(&Value::F64(0.0)),
            hash_value(&Value::F64(-0.0))
        );
    }

    #[test]
    fn test_isless_total_order() {
        assert_eq!(
            isless_values(&Value::F64(1.0), &Value::F64(f64::NAN)),
            Some(true)
        );
        assert_eq!(
            isless_values(&Value::F64(f64::NAN), &Value::F64(1.0)),
            Some(false)
        );
        assert_eq!(
            isless_values(&Value::F64(-0.0), &Value::F64(0.0)),
            Some(true)
        );
        assert_eq!(isless_values(&Value::I64(1), &Value::Missing), Some(true));
        assert_eq!(isless_values(&Value::Missing, &Value::I64(1)), Some(false));
    }

    #[test]
    fn test_array_identity_vs_content_eq() {
        let a = Value::Array(new_array_ref(ArrayValue::from_i64(vec![1, 2], vec![2])));
        let b = Value::Array(new_array_ref(ArrayValue::from_i64(vec![1, 2], vec![2])));
        assert!(!is_identical(&a, &b));
        assert_eq!(julia_eq(&a, &b), Some(true));
        assert!(is_identical(&a, &a.clone()));
    }
}
