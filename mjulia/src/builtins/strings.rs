//! String builtins and the print/show surface.
//!
//! Codeunit indices are 1-based and must land on UTF-8 starts;
//! `nextind`/`prevind` walk to the neighboring valid start, and
//! `isvalid` reports boundary validity. `print` writes display form,
//! `show`/`repr` write parseable form.

use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::Ty;
use crate::values::{display_value, show_value, Value};
use crate::vm::Vm;

use super::{def, def_kw, def_vararg};

pub fn register(vm: &mut Vm) {
    def_vararg(vm, "string", &[], Ty::Any, |_, _, args, _| {
        let mut out = String::new();
        for arg in args {
            out.push_str(&display_value(arg));
        }
        Ok(Value::str(&out))
    });
    def(vm, "repr", &[Ty::Any], |_, _, args, _| {
        Ok(Value::str(&show_value(&args[0])))
    });

    def_vararg(vm, "print", &[], Ty::Any, print_entry);
    def_vararg(vm, "println", &[], Ty::Any, print_entry);
    def(vm, "show", &[Ty::Any], |vm, _, args, _| {
        vm.write_out(&show_value(&args[0]));
        Ok(Value::Nothing)
    });
    def(vm, "show", &[Ty::IO, Ty::Any], |_, _, args, _| {
        let Value::IOBuf(buf) = &args[0] else {
            return Err(VmError::Method("show: unsupported IO".to_string()));
        };
        buf.borrow_mut()
            .extend_from_slice(show_value(&args[1]).as_bytes());
        Ok(Value::Nothing)
    });
    def(vm, "take!", &[Ty::IOBuffer], |_, _, args, _| {
        let Value::IOBuf(buf) = &args[0] else { unreachable!() };
        let bytes = std::mem::take(&mut *buf.borrow_mut());
        Ok(Value::str(&String::from_utf8_lossy(&bytes)))
    });
    def_vararg(vm, "sprint", &[Ty::Function], Ty::Any, |vm, _, args, _| {
        let buf = Value::IOBuf(Rc::new(std::cell::RefCell::new(Vec::new())));
        let mut call_args = vec![buf.clone()];
        call_args.extend_from_slice(&args[1..]);
        vm.call_value(&args[0], &call_args)?;
        let Value::IOBuf(buf) = buf else { unreachable!() };
        let bytes = buf.borrow().clone();
        Ok(Value::str(&String::from_utf8_lossy(&bytes)))
    });

    def(vm, "repeat", &[Ty::String, Ty::Integer], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        let n = args[1].as_i64().unwrap_or(0).max(0) as usize;
        Ok(Value::str(&s.repeat(n)))
    });
    def_kw(vm, "join", &[Ty::Any, Ty::String], &[], |_, _, args, _| {
        let Value::Str(sep) = &args[1] else { unreachable!() };
        let parts: Vec<String> = super::collections::iter_all(&args[0])?
            .iter()
            .map(display_value)
            .collect();
        Ok(Value::str(&parts.join(sep)))
    });
    def(vm, "join", &[Ty::Any], |_, _, args, _| {
        let parts: Vec<String> = super::collections::iter_all(&args[0])?
            .iter()
            .map(display_value)
            .collect();
        Ok(Value::str(&parts.concat()))
    });
    def(vm, "split", &[Ty::String, Ty::String], |_, _, args, _| {
        let (Value::Str(s), Value::Str(sep)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        let parts: Vec<Value> = s.split(&**sep).map(Value::str).collect();
        let n = parts.len();
        Ok(Value::Array(crate::values::new_array_ref(
            crate::values::ArrayValue::new(
                crate::values::ArrayData::Str(
                    parts
                        .into_iter()
                        .map(|v| match v {
                            Value::Str(s) => s,
                            _ => unreachable!(),
                        })
                        .collect(),
                ),
                vec![n],
            ),
        )))
    });
    def(vm, "split", &[Ty::String], |vm, name, args, kw| {
        let mut all = args.to_vec();
        all.push(Value::str(" "));
        let _ = name;
        let _ = kw;
        let f = Value::Function(crate::values::FunctionValue::new(Symbol::intern("split")));
        vm.call_value(&f, &all)
    });

    def_kw(
        vm,
        "replace",
        &[Ty::String, Ty::Any],
        &["count"],
        replace_entry,
    );

    def(vm, "occursin", &[Ty::String, Ty::String], |_, _, args, _| {
        let (Value::Str(needle), Value::Str(hay)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(hay.contains(&**needle)))
    });
    def(vm, "occursin", &[Ty::Char, Ty::String], |_, _, args, _| {
        let (Value::Char(c), Value::Str(hay)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(hay.contains(*c)))
    });
    def(vm, "startswith", &[Ty::String, Ty::String], |_, _, args, _| {
        let (Value::Str(s), Value::Str(prefix)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(s.starts_with(&**prefix)))
    });
    def(vm, "endswith", &[Ty::String, Ty::String], |_, _, args, _| {
        let (Value::Str(s), Value::Str(suffix)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(s.ends_with(&**suffix)))
    });
    def(vm, "uppercase", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::str(&s.to_uppercase()))
    });
    def(vm, "lowercase", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::str(&s.to_lowercase()))
    });
    def(vm, "uppercase", &[Ty::Char], |_, _, args, _| {
        let Value::Char(c) = &args[0] else { unreachable!() };
        Ok(Value::Char(c.to_ascii_uppercase()))
    });
    def(vm, "lowercase", &[Ty::Char], |_, _, args, _| {
        let Value::Char(c) = &args[0] else { unreachable!() };
        Ok(Value::Char(c.to_ascii_lowercase()))
    });
    def(vm, "strip", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::str(s.trim()))
    });
    def(vm, "lstrip", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::str(s.trim_start()))
    });
    def(vm, "rstrip", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::str(s.trim_end()))
    });

    def(vm, "ncodeunits", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::I64(s.len() as i64))
    });
    def(vm, "sizeof", &[Ty::String], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        Ok(Value::I64(s.len() as i64))
    });
    def(vm, "codeunit", &[Ty::String, Ty::Integer], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        let i = args[1].as_i64().unwrap_or(0);
        if i < 1 || i as usize > s.len() {
            return Err(VmError::Bounds {
                indices: vec![i],
                shape: vec![s.len()],
            });
        }
        Ok(Value::U8(s.as_bytes()[i as usize - 1]))
    });
    def(vm, "isvalid", &[Ty::String, Ty::Integer], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        let i = args[1].as_i64().unwrap_or(0);
        Ok(Value::Bool(
            i >= 1 && (i as usize) <= s.len() && s.is_char_boundary(i as usize - 1),
        ))
    });
    def(vm, "nextind", &[Ty::String, Ty::Integer], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        let i = args[1].as_i64().unwrap_or(0);
        nextind(s, i)
    });
    def(vm, "prevind", &[Ty::String, Ty::Integer], |_, _, args, _| {
        let Value::Str(s) = &args[0] else { unreachable!() };
        let i = args[1].as_i64().unwrap_or(0);
        prevind(s, i)
    });

    def(vm, "parse", &[Ty::Type, Ty::String], |_, _, args, _| {
        let (Value::Type(t), Value::Str(s)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        parse_string(t, s.trim())?
            .ok_or_else(|| VmError::Argument(format!("cannot parse {:?} as {}", s, t)))
    });
    def(vm, "tryparse", &[Ty::Type, Ty::String], |_, _, args, _| {
        let (Value::Type(t), Value::Str(s)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(parse_string(t, s.trim())?.unwrap_or(Value::Nothing))
    });
}

fn print_entry(
    vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    // `print(io, xs…)` writes into the buffer instead of the sink.
    let (target, rest): (Option<&Value>, &[Value]) = match args.first() {
        Some(first @ Value::IOBuf(_)) => (Some(first), &args[1..]),
        _ => (None, args),
    };
    let mut text = String::new();
    for arg in rest {
        text.push_str(&display_value(arg));
    }
    if name.as_str() == "println" {
        text.push('\n');
    }
    match target {
        Some(Value::IOBuf(buf)) => buf.borrow_mut().extend_from_slice(text.as_bytes()),
        _ => vm.write_out(&text),
    }
    Ok(Value::Nothing)
}

fn replace_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let Value::Str(subject) = &args[0] else { unreachable!() };
    let limit = kw
        .iter()
        .find(|(k, _)| k.as_str() == "count")
        .and_then(|(_, v)| v.as_i64())
        .map(|n| n.max(0) as usize);
    let (pattern, replacement) = crate::vm::call::as_pair(&args[1])?;
    match (&pattern, &replacement) {
        (Value::Str(pat), Value::Str(rep)) => {
            let out = match limit {
                Some(n) => subject.replacen(&**pat, rep, n),
                None => subject.replace(&**pat, rep),
            };
            Ok(Value::str(&out))
        }
        (Value::Regex(re), Value::Str(rep)) => {
            let out = match limit {
                Some(n) => re.compiled.replacen(subject, n, rep.as_ref()),
                None => re.compiled.replace_all(subject, rep.as_ref()),
            };
            Ok(Value::str(&out))
        }
        _ => Err(VmError::Argument(
            "replace expects a pattern => replacement pair".to_string(),
        )),
    }
}

/// Next valid character start after index `i` (0 allowed as the
/// before-start position).
fn nextind(s: &str, i: i64) -> VmResult<Value> {
    if i < 0 || i as usize > s.len() {
        return Err(VmError::Bounds {
            indices: vec![i],
            shape: vec![s.len()],
        });
    }
    if i == 0 {
        return Ok(Value::I64(1));
    }
    let mut j = i as usize; // byte index one past the 1-based position
    loop {
        j += 1;
        if j > s.len() || s.is_char_boundary(j - 1) {
            return Ok(Value::I64(j as i64));
        }
    }
}

/// Previous valid character start before index `i`.
fn prevind(s: &str, i: i64) -> VmResult<Value> {
    if i < 1 || i as usize > s.len() + 1 {
        return Err(VmError::Bounds {
            indices: vec![i],
            shape: vec![s.len()],
        });
    }
    let mut j = i as usize - 1;
    while j > 0 && !s.is_char_boundary(j - 1) {
        j -= 1;
    }
    Ok(Value::I64(j as i64))
}

fn parse_string(t: &Ty, s: &str) -> VmResult<Option<Value>> {
    Ok(match t {
        Ty::Int64 => s.parse::<i64>().ok().map(Value::I64),
        Ty::Int128 => s.parse::<i128>().ok().map(Value::I128),
        Ty::Float64 => s.parse::<f64>().ok().map(Value::F64),
        Ty::Float32 => s.parse::<f32>().ok().map(Value::F32),
        Ty::Bool => match s {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        other => {
            return Err(VmError::Method(format!(
                "no method matching parse(::Type{{{}}}, ::String)",
                other
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nextind_prevind_walk_boundaries() {
        let s = "añc"; // bytes: a(1) ñ(2,3) c(4)
        assert!(matches!(nextind(s, 1).unwrap(), Value::I64(2)));
        assert!(matches!(nextind(s, 2).unwrap(), Value::I64(4)));
        assert!(matches!(prevind(s, 4).unwrap(), Value::I64(2)));
        assert!(matches!(prevind(s, 2).unwrap(), Value::I64(1)));
    }

    #[test]
    fn test_nextind_prevind_inverse_on_valid_starts() {
        let s = "añc";
        for i in [2i64, 4] {
            let Value::I64(p) = prevind(s, i).unwrap() else { panic!() };
            let Value::I64(n) = nextind(s, p).unwrap() else { panic!() };
            assert_eq!(n, i);
        }
    }

    #[test]
    fn test_parse_kinds() {
        assert!(matches!(
            parse_string(&Ty::Int64, "42").unwrap(),
            Some(Value::I64(42))
        ));
        assert!(matches!(
            parse_string(&Ty::Float64, "2.5").unwrap(),
            Some(Value::F64(x)) if x == 2.5
        ));
        assert!(parse_string(&Ty::Int64, "abc").unwrap().is_none());
    }
}
