//! Numeric builtins: arithmetic with Julia's promotion rules, the
//! comparison family, and the math-function surface.
//!
//! Arithmetic preserves the promoted operand type (`Int8 + Int8 ->
//! Int8`, `Float32 + Int64 -> Float64` per the tower); `missing`
//! propagates through arithmetic and ordering comparisons but not
//! through `===`/`isequal`.

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::{promote_type, Ty};
use crate::values::{
    hash_value, is_identical, isequal_values, isless_values, julia_eq, Value,
};
use crate::vm::Vm;

use super::{def, def_vararg};

pub fn register(vm: &mut Vm) {
    for op in ["+", "-", "*", "/", "^", "%", "÷", "mod", "div"] {
        def(vm, op, &[Ty::Number, Ty::Number], arith_entry);
        def(vm, op, &[Ty::Missing, Ty::Any], missing_binary);
        def(vm, op, &[Ty::Any, Ty::Missing], missing_binary);
        def(vm, op, &[Ty::Missing, Ty::Missing], missing_binary);
    }
    // n-ary + and * fold left over the binary rule.
    for op in ["+", "*"] {
        def_vararg(
            vm,
            op,
            &[Ty::Number, Ty::Number, Ty::Number],
            Ty::Number,
            nary_arith,
        );
    }
    def(vm, "+", &[Ty::Char, Ty::Integer], char_plus_int);
    def(vm, "+", &[Ty::Integer, Ty::Char], char_plus_int);
    def(vm, "-", &[Ty::Char, Ty::Char], char_minus_char);
    def(vm, "-", &[Ty::Char, Ty::Integer], char_minus_int);
    def(vm, "*", &[Ty::String, Ty::String], string_concat_op);
    def(vm, "*", &[Ty::String, Ty::Char], string_concat_op);
    def(vm, "*", &[Ty::Char, Ty::String], string_concat_op);
    def(vm, "^", &[Ty::String, Ty::Integer], string_repeat_op);

    def(vm, "-", &[Ty::Number], negate);
    def(vm, "-", &[Ty::Missing], missing_unary);
    def(vm, "+", &[Ty::Number], |_, _, args, _| Ok(args[0].clone()));
    def(vm, "+", &[Ty::Missing], missing_unary);
    def(vm, "!", &[Ty::Bool], |_, _, args, _| {
        Ok(Value::Bool(!matches!(args[0], Value::Bool(true))))
    });
    def(vm, "!", &[Ty::Missing], missing_unary);

    def(vm, "==", &[Ty::Any, Ty::Any], eq_entry);
    def(vm, "!=", &[Ty::Any, Ty::Any], ne_entry);
    for op in ["<", "<=", ">", ">="] {
        def(vm, op, &[Ty::Any, Ty::Any], order_entry);
    }
    def(vm, "===", &[Ty::Any, Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(is_identical(&args[0], &args[1])))
    });
    def(vm, "!==", &[Ty::Any, Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(!is_identical(&args[0], &args[1])))
    });
    def(vm, "isequal", &[Ty::Any, Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(isequal_values(&args[0], &args[1])))
    });
    def(vm, "isless", &[Ty::Any, Ty::Any], |_, _, args, _| {
        match isless_values(&args[0], &args[1]) {
            Some(b) => Ok(Value::Bool(b)),
            None => Err(VmError::Method(format!(
                "no method matching isless(::{}, ::{})",
                args[0].runtime_ty(),
                args[1].runtime_ty()
            ))),
        }
    });
    def(vm, "cmp", &[Ty::Any, Ty::Any], |_, _, args, _| {
        if isequal_values(&args[0], &args[1]) {
            return Ok(Value::I64(0));
        }
        match isless_values(&args[0], &args[1]) {
            Some(true) => Ok(Value::I64(-1)),
            Some(false) => Ok(Value::I64(1)),
            None => Err(VmError::Method("cmp: values are not ordered".to_string())),
        }
    });
    def(vm, "hash", &[Ty::Any], |_, _, args, _| {
        Ok(Value::U64(hash_value(&args[0])))
    });

    // Unary math surface: Float64 results, with Missing propagation.
    for name in [
        "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp",
        "log", "log2", "log10", "sqrt", "cbrt",
    ] {
        def(vm, name, &[Ty::Number], math_unary_entry);
        def(vm, name, &[Ty::Missing], missing_unary);
    }
    def(vm, "atan", &[Ty::Number, Ty::Number], |_, _, args, _| {
        let (y, x) = (expect_f64(&args[0])?, expect_f64(&args[1])?);
        Ok(Value::F64(y.atan2(x)))
    });

    for name in ["floor", "ceil", "round", "trunc"] {
        def(vm, name, &[Ty::Number], round_family);
        def(vm, name, &[Ty::Missing], missing_unary);
    }
    def(vm, "abs", &[Ty::Number], abs_entry);
    def(vm, "abs", &[Ty::Missing], missing_unary);
    def(vm, "abs2", &[Ty::Number], |_, _, args, _| {
        match &args[0] {
            Value::I64(x) => Ok(Value::I64(x.wrapping_mul(*x))),
            other => {
                let x = expect_f64(other)?;
                Ok(Value::F64(x * x))
            }
        }
    });
    def(vm, "sign", &[Ty::Number], |_, _, args, _| {
        match &args[0] {
            Value::I64(x) => Ok(Value::I64(x.signum())),
            other => {
                let x = expect_f64(other)?;
                Ok(Value::F64(if x == 0.0 { 0.0 } else { x.signum() }))
            }
        }
    });
    def(vm, "min", &[Ty::Any, Ty::Any], |_, _, args, _| {
        if matches!(args[0], Value::Missing) || matches!(args[1], Value::Missing) {
            return Ok(Value::Missing);
        }
        match isless_values(&args[1], &args[0]) {
            Some(true) => Ok(args[1].clone()),
            Some(false) => Ok(args[0].clone()),
            None => Err(VmError::Method("min: values are not ordered".to_string())),
        }
    });
    def(vm, "max", &[Ty::Any, Ty::Any], |_, _, args, _| {
        if matches!(args[0], Value::Missing) || matches!(args[1], Value::Missing) {
            return Ok(Value::Missing);
        }
        match isless_values(&args[0], &args[1]) {
            Some(true) => Ok(args[1].clone()),
            Some(false) => Ok(args[0].clone()),
            None => Err(VmError::Method("max: values are not ordered".to_string())),
        }
    });

    def(vm, "isnan", &[Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(
            matches!(args[0].as_f64(), Some(x) if x.is_nan()),
        ))
    });
    def(vm, "isinf", &[Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(
            matches!(args[0].as_f64(), Some(x) if x.is_infinite()),
        ))
    });
    def(vm, "isfinite", &[Ty::Number], |_, _, args, _| {
        Ok(Value::Bool(
            matches!(args[0].as_f64(), Some(x) if x.is_finite()),
        ))
    });
    def(vm, "iseven", &[Ty::Integer], |_, _, args, _| {
        Ok(Value::Bool(args[0].as_i64().unwrap_or(1) % 2 == 0))
    });
    def(vm, "isodd", &[Ty::Integer], |_, _, args, _| {
        Ok(Value::Bool(args[0].as_i64().unwrap_or(0) % 2 != 0))
    });
    def(vm, "iszero", &[Ty::Number], |_, _, args, _| {
        Ok(Value::Bool(args[0].as_f64() == Some(0.0)))
    });
    def(vm, "isone", &[Ty::Number], |_, _, args, _| {
        Ok(Value::Bool(args[0].as_f64() == Some(1.0)))
    });

    def(vm, "zero", &[Ty::Number], |_, _, args, _| zero_like(&args[0]));
    def(vm, "one", &[Ty::Number], |_, _, args, _| one_like(&args[0]));
    def(vm, "zero", &[Ty::Type], |_, _, args, _| {
        let Value::Type(t) = &args[0] else { unreachable!() };
        crate::vm::call::convert_numeric(t, &Value::I64(0))
    });
    def(vm, "one", &[Ty::Type], |_, _, args, _| {
        let Value::Type(t) = &args[0] else { unreachable!() };
        crate::vm::call::convert_numeric(t, &Value::I64(1))
    });

    def(vm, "ifelse", &[Ty::Bool, Ty::Any, Ty::Any], |_, _, args, _| {
        Ok(if matches!(args[0], Value::Bool(true)) {
            args[1].clone()
        } else {
            args[2].clone()
        })
    });
    def(vm, "identity", &[Ty::Any], |_, _, args, _| Ok(args[0].clone()));

    def(vm, "promote_type", &[Ty::Type, Ty::Type], |_, _, args, _| {
        let (Value::Type(a), Value::Type(b)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::ty(promote_type(a, b)))
    });

    def(vm, "ismissing", &[Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(matches!(args[0], Value::Missing)))
    });
    def(vm, "isnothing", &[Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(matches!(args[0], Value::Nothing)))
    });
    def_vararg(vm, "coalesce", &[], Ty::Any, |_, _, args, _| {
        for arg in args {
            if !matches!(arg, Value::Missing) {
                return Ok(arg.clone());
            }
        }
        Ok(Value::Missing)
    });
}

// ── arithmetic core ───────────────────────────────────────────────────

fn missing_binary(_vm: &mut Vm, _name: Symbol, _args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    Ok(Value::Missing)
}

fn missing_unary(_vm: &mut Vm, _name: Symbol, _args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    Ok(Value::Missing)
}

fn expect_f64(v: &Value) -> VmResult<f64> {
    v.as_f64()
        .ok_or_else(|| VmError::Type(format!("expected a number, got {}", v.runtime_ty())))
}

fn is_float_value(v: &Value) -> bool {
    matches!(v, Value::F16(_) | Value::F32(_) | Value::F64(_))
}

fn nary_arith(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let mut acc = args[0].clone();
    for arg in &args[1..] {
        acc = numeric_binop(name.as_str(), &acc, arg)?;
    }
    Ok(acc)
}

/// Binary arithmetic entry shared by every operator name.
fn arith_entry(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    numeric_binop(name.as_str(), &args[0], &args[1])
}

/// Promoted binary arithmetic.
pub fn numeric_binop(op: &str, a: &Value, b: &Value) -> VmResult<Value> {
    if matches!(a, Value::Missing) || matches!(b, Value::Missing) {
        return Ok(Value::Missing);
    }
    let result_ty = promote_type(&a.runtime_ty(), &b.runtime_ty());
    let float_math = is_float_value(a) || is_float_value(b) || op == "/";
    if float_math {
        let (x, y) = (expect_f64(a)?, expect_f64(b)?);
        let r = match op {
            "+" => x + y,
            "-" => x - y,
            "*" => x * y,
            "/" => x / y,
            "^" => x.powf(y),
            "%" => x % y,
            "÷" | "div" => (x / y).trunc(),
            "mod" => x.rem_euclid(y),
            _ => return Err(VmError::Internal(format!("unknown operator {}", op))),
        };
        return Ok(match result_ty {
            Ty::Float32 => Value::F32(r as f32),
            Ty::Float16 => Value::F16(half::f16::from_f64(r)),
            _ => Value::F64(r),
        });
    }
    // Integer math in i128, truncated back to the promoted width
    // (native wrapping semantics).
    let (x, y) = (int_of(a)?, int_of(b)?);
    let r: i128 = match op {
        "+" => x.wrapping_add(y),
        "-" => x.wrapping_sub(y),
        "*" => x.wrapping_mul(y),
        "^" => {
            if y < 0 {
                return Err(VmError::Domain(format!(
                    "Cannot raise an integer to a negative power {}",
                    y
                )));
            }
            int_pow(x, y as u32)
        }
        "%" => {
            if y == 0 {
                return Err(VmError::Divide);
            }
            x.wrapping_rem(y)
        }
        "÷" | "div" => {
            if y == 0 {
                return Err(VmError::Divide);
            }
            x.wrapping_div(y)
        }
        "mod" => {
            if y == 0 {
                return Err(VmError::Divide);
            }
            x.rem_euclid(y)
        }
        _ => return Err(VmError::Internal(format!("unknown operator {}", op))),
    };
    Ok(int_to_ty(r, &result_ty))
}

fn int_of(v: &Value) -> VmResult<i128> {
    match v {
        Value::I128(x) => Ok(*x),
        other => other
            .as_i64()
            .map(|x| x as i128)
            .ok_or_else(|| VmError::Type(format!("expected an integer, got {}", other.runtime_ty()))),
    }
}

fn int_pow(base: i128, mut exp: u32) -> i128 {
    let mut acc: i128 = 1;
    let mut base = base;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    acc
}

fn int_to_ty(x: i128, ty: &Ty) -> Value {
    match ty {
        Ty::Bool => Value::I64(x as i64),
        Ty::Int8 => Value::I8(x as i8),
        Ty::Int16 => Value::I16(x as i16),
        Ty::Int32 => Value::I32(x as i32),
        Ty::Int128 => Value::I128(x),
        Ty::UInt8 => Value::U8(x as u8),
        Ty::UInt16 => Value::U16(x as u16),
        Ty::UInt32 => Value::U32(x as u32),
        Ty::UInt64 => Value::U64(x as u64),
        _ => Value::I64(x as i64),
    }
}

fn negate(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    Ok(match &args[0] {
        Value::I8(x) => Value::I8(x.wrapping_neg()),
        Value::I16(x) => Value::I16(x.wrapping_neg()),
        Value::I32(x) => Value::I32(x.wrapping_neg()),
        Value::I64(x) => Value::I64(x.wrapping_neg()),
        Value::I128(x) => Value::I128(x.wrapping_neg()),
        Value::F16(x) => Value::F16(-*x),
        Value::F32(x) => Value::F32(-x),
        Value::F64(x) => Value::F64(-x),
        Value::Bool(x) => Value::I64(-(*x as i64)),
        other => {
            return Err(VmError::Method(format!(
                "no method matching -(::{})",
                other.runtime_ty()
            )))
        }
    })
}

fn char_plus_int(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    let (c, n) = match (&args[0], &args[1]) {
        (Value::Char(c), n) => (*c, n.as_i64().unwrap_or(0)),
        (n, Value::Char(c)) => (*c, n.as_i64().unwrap_or(0)),
        _ => unreachable!("guarded by signature"),
    };
    let code = c as i64 + n;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| VmError::Argument(format!("invalid character code {}", code)))
}

fn char_minus_char(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    let (Value::Char(a), Value::Char(b)) = (&args[0], &args[1]) else {
        unreachable!()
    };
    Ok(Value::I64(*a as i64 - *b as i64))
}

fn char_minus_int(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    let (Value::Char(c), n) = (&args[0], &args[1]) else {
        unreachable!()
    };
    let code = *c as i64 - n.as_i64().unwrap_or(0);
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| VmError::Argument(format!("invalid character code {}", code)))
}

fn string_concat_op(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    let mut out = String::new();
    for arg in args {
        match arg {
            Value::Str(s) => out.push_str(s),
            Value::Char(c) => out.push(*c),
            _ => unreachable!("guarded by signature"),
        }
    }
    Ok(Value::str(&out))
}

fn string_repeat_op(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    let (Value::Str(s), n) = (&args[0], &args[1]) else {
        unreachable!()
    };
    let n = n.as_i64().unwrap_or(0).max(0) as usize;
    Ok(Value::str(&s.repeat(n)))
}

// ── comparison entries ────────────────────────────────────────────────

fn eq_entry(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    Ok(match julia_eq(&args[0], &args[1]) {
        Some(b) => Value::Bool(b),
        None => Value::Missing,
    })
}

fn ne_entry(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    Ok(match julia_eq(&args[0], &args[1]) {
        Some(b) => Value::Bool(!b),
        None => Value::Missing,
    })
}

fn order_entry(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    order_compare(name.as_str(), &args[0], &args[1])
}

/// IEEE-flavored ordering comparison used by `<`, `<=`, `>`, `>=`.
pub fn order_compare(op: &str, a: &Value, b: &Value) -> VmResult<Value> {
    if matches!(a, Value::Missing) || matches!(b, Value::Missing) {
        return Ok(Value::Missing);
    }
    if a.is_numeric() && b.is_numeric() {
        let (x, y) = (expect_f64(a)?, expect_f64(b)?);
        let r = match op {
            "<" => x < y,
            "<=" => x <= y,
            ">" => x > y,
            ">=" => x >= y,
            _ => return Err(VmError::Internal(format!("unknown comparison {}", op))),
        };
        return Ok(Value::Bool(r));
    }
    let ord = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        (Value::Sym(x), Value::Sym(y)) => x.as_str().cmp(y.as_str()),
        _ => {
            return Err(VmError::Method(format!(
                "no method matching {}(::{}, ::{})",
                op,
                a.runtime_ty(),
                b.runtime_ty()
            )))
        }
    };
    Ok(Value::Bool(match op {
        "<" => ord.is_lt(),
        "<=" => ord.is_le(),
        ">" => ord.is_gt(),
        ">=" => ord.is_ge(),
        _ => unreachable!(),
    }))
}

fn math_unary_entry(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    math_unary(name.as_str(), &args[0])
}

/// Unary math on Float64 with domain checks.
pub fn math_unary(name: &str, v: &Value) -> VmResult<Value> {
    let x = expect_f64(v)?;
    let r = match name {
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "asin" => {
            if !(-1.0..=1.0).contains(&x) {
                return Err(VmError::Domain(format!("asin({}) is undefined", x)));
            }
            x.asin()
        }
        "acos" => {
            if !(-1.0..=1.0).contains(&x) {
                return Err(VmError::Domain(format!("acos({}) is undefined", x)));
            }
            x.acos()
        }
        "atan" => x.atan(),
        "sinh" => x.sinh(),
        "cosh" => x.cosh(),
        "tanh" => x.tanh(),
        "exp" => x.exp(),
        "log" => {
            if x < 0.0 {
                return Err(VmError::Domain(format!(
                    "log was called with a negative real argument ({})",
                    x
                )));
            }
            x.ln()
        }
        "log2" => {
            if x < 0.0 {
                return Err(VmError::Domain(format!("log2({}) is undefined", x)));
            }
            x.log2()
        }
        "log10" => {
            if x < 0.0 {
                return Err(VmError::Domain(format!("log10({}) is undefined", x)));
            }
            x.log10()
        }
        "sqrt" => {
            if x < 0.0 {
                return Err(VmError::Domain(format!(
                    "sqrt was called with a negative real argument ({})",
                    x
                )));
            }
            x.sqrt()
        }
        "cbrt" => x.cbrt(),
        _ => return Err(VmError::Internal(format!("unknown math function {}", name))),
    };
    Ok(Value::F64(r))
}

fn round_family(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    round_value(name.as_str(), &args[0])
}

/// `floor`/`ceil`/`round`/`trunc`, preserving integer inputs.
pub fn round_value(name: &str, v: &Value) -> VmResult<Value> {
    if v.as_i64().is_some() && !is_float_value(v) {
        return Ok(v.clone());
    }
    let x = expect_f64(v)?;
    let r = match name {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        // Julia rounds to even at the halfway point.
        "round" => {
            let r = x.round();
            if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
                r - x.signum()
            } else {
                r
            }
        }
        "trunc" => x.trunc(),
        _ => return Err(VmError::Internal(format!("unknown rounding {}", name))),
    };
    Ok(Value::F64(r))
}

fn abs_entry(_vm: &mut Vm, _name: Symbol, args: &[Value], _kw: &[(Symbol, Value)]) -> VmResult<Value> {
    Ok(match &args[0] {
        Value::I8(x) => Value::I8(x.wrapping_abs()),
        Value::I16(x) => Value::I16(x.wrapping_abs()),
        Value::I32(x) => Value::I32(x.wrapping_abs()),
        Value::I64(x) => Value::I64(x.wrapping_abs()),
        Value::I128(x) => Value::I128(x.wrapping_abs()),
        Value::U8(x) => Value::U8(*x),
        Value::U16(x) => Value::U16(*x),
        Value::U32(x) => Value::U32(*x),
        Value::U64(x) => Value::U64(*x),
        Value::Bool(x) => Value::Bool(*x),
        Value::F16(x) => Value::F16(if x.is_sign_negative() { -*x } else { *x }),
        Value::F32(x) => Value::F32(x.abs()),
        Value::F64(x) => Value::F64(x.abs()),
        other => {
            return Err(VmError::Method(format!(
                "no method matching abs(::{})",
                other.runtime_ty()
            )))
        }
    })
}

fn zero_like(v: &Value) -> VmResult<Value> {
    Ok(match v {
        Value::F64(_) => Value::F64(0.0),
        Value::F32(_) => Value::F32(0.0),
        Value::F16(_) => Value::F16(half::f16::from_f64(0.0)),
        _ => Value::I64(0),
    })
}

fn one_like(v: &Value) -> VmResult<Value> {
    Ok(match v {
        Value::F64(_) => Value::F64(1.0),
        Value::F32(_) => Value::F32(1.0),
        Value::F16(_) => Value::F16(half::f16::from_f64(1.0)),
        _ => Value::I64(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_preserves_width() {
        let r = numeric_binop("+", &Value::I8(1), &Value::I8(2)).unwrap();
        assert!(matches!(r, Value::I8(3)));
        let r = numeric_binop("+", &Value::I8(1), &Value::I64(2)).unwrap();
        assert!(matches!(r, Value::I64(3)));
        let r = numeric_binop("+", &Value::I64(1), &Value::F64(0.5)).unwrap();
        assert!(matches!(r, Value::F64(x) if x == 1.5));
    }

    #[test]
    fn test_int_division_semantics() {
        assert!(matches!(
            numeric_binop("/", &Value::I64(1), &Value::I64(2)).unwrap(),
            Value::F64(x) if x == 0.5
        ));
        assert!(matches!(
            numeric_binop("÷", &Value::I64(7), &Value::I64(2)).unwrap(),
            Value::I64(3)
        ));
        assert!(matches!(
            numeric_binop("÷", &Value::I64(1), &Value::I64(0)),
            Err(VmError::Divide)
        ));
        // `%` is remainder (sign of dividend), `mod` is floored.
        assert!(matches!(
            numeric_binop("%", &Value::I64(-7), &Value::I64(3)).unwrap(),
            Value::I64(-1)
        ));
        assert!(matches!(
            numeric_binop("mod", &Value::I64(-7), &Value::I64(3)).unwrap(),
            Value::I64(2)
        ));
    }

    #[test]
    fn test_missing_propagates_through_arithmetic() {
        for op in ["+", "-", "*", "/"] {
            assert!(matches!(
                numeric_binop(op, &Value::Missing, &Value::I64(1)).unwrap(),
                Value::Missing
            ));
            assert!(matches!(
                numeric_binop(op, &Value::I64(1), &Value::Missing).unwrap(),
                Value::Missing
            ));
        }
    }

    #[test]
    fn test_negative_int_power_is_domain_error() {
        assert!(matches!(
            numeric_binop("^", &Value::I64(2), &Value::I64(-1)),
            Err(VmError::Domain(_))
        ));
    }

    #[test]
    fn test_order_compare_missing_and_nan() {
        assert!(matches!(
            order_compare("<", &Value::Missing, &Value::I64(1)).unwrap(),
            Value::Missing
        ));
        assert!(matches!(
            order_compare("<", &Value::F64(f64::NAN), &Value::F64(1.0)).unwrap(),
            Value::Bool(false)
        ));
        assert!(matches!(
            order_compare("<", &Value::Str("a".into()), &Value::Str("b".into())).unwrap(),
            Value::Bool(true)
        ));
    }

    #[test]
    fn test_sqrt_domain_error() {
        assert!(matches!(
            math_unary("sqrt", &Value::F64(-1.0)),
            Err(VmError::Domain(_))
        ));
    }

    #[test]
    fn test_round_half_to_even() {
        assert!(matches!(round_value("round", &Value::F64(2.5)).unwrap(), Value::F64(x) if x == 2.0));
        assert!(matches!(round_value("round", &Value::F64(3.5)).unwrap(), Value::F64(x) if x == 4.0));
        assert!(matches!(round_value("floor", &Value::I64(3)).unwrap(), Value::I64(3)));
    }
}
