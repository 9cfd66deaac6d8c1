//! The call pipeline: generic-function dispatch, keyword binding,
//! closure invocation, and type-constructor calls.

use super::Vm;
use crate::dispatch::{Method, MethodBody};
use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::Ty;
use crate::values::{
    DictValue, NamedTupleValue, RangeValue, RegexValue, StructInstance, TaskValue, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

impl Vm {
    /// Call any callable with positional arguments.
    pub fn call_value(&mut self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        self.call_with_kw(callee, args, &[])
    }

    /// Call any callable with positional and keyword arguments.
    pub fn call_with_kw(
        &mut self,
        callee: &Value,
        args: &[Value],
        kwargs: &[(Symbol, Value)],
    ) -> VmResult<Value> {
        match callee {
            Value::Function(f) => self.call_generic(f.name, args, kwargs),
            Value::Closure(c) => {
                if !kwargs.is_empty() {
                    return Err(VmError::Method(format!(
                        "function {} does not accept keyword arguments",
                        c.name
                    )));
                }
                if args.len() != c.nparams {
                    return Err(VmError::Method(format!(
                        "{} expects {} arguments, got {}",
                        c.name,
                        c.nparams,
                        args.len()
                    )));
                }
                let captured = c.captured.clone();
                self.run_chunk(c.chunk, args.to_vec(), captured)
            }
            Value::Type(t) => self.construct((**t).clone(), args, kwargs),
            other => Err(VmError::Method(format!(
                "objects of type {} are not callable",
                other.runtime_ty()
            ))),
        }
    }

    /// Dispatch a call on a generic function by name.
    pub fn call_generic(
        &mut self,
        name: Symbol,
        args: &[Value],
        kwargs: &[(Symbol, Value)],
    ) -> VmResult<Value> {
        let arg_tys: Vec<Ty> = args.iter().map(|a| a.runtime_ty()).collect();
        let (idx, bindings) = self.registry.dispatch(name, &arg_tys, &self.types)?;
        let method: Method = self.registry.fns[&name].methods[idx].clone();
        match method.body {
            MethodBody::Builtin(f) => f(self, name, args, kwargs),
            MethodBody::Chunk(chunk) => {
                let fixed = method.params.len();
                let mut slots: Vec<Value> = Vec::with_capacity(fixed + 4);
                slots.extend_from_slice(&args[..fixed]);
                if method.vararg.is_some() {
                    slots.push(Value::tuple(args[fixed..].to_vec()));
                }
                // Declared keywords: bind by name, `#undef` when absent
                // (the body prologue fills defaults or raises for
                // required keywords).
                let mut extra_kw: Vec<(Symbol, Value)> = Vec::new();
                for (k, v) in kwargs {
                    let declared = method.kwparams.iter().any(|p| p.name == *k);
                    if !declared {
                        if method.kw_vararg.is_some() {
                            extra_kw.push((*k, v.clone()));
                        } else {
                            return Err(VmError::Method(format!(
                                "unsupported keyword argument `{}` in call to {}",
                                k, name
                            )));
                        }
                    }
                }
                for kw in &method.kwparams {
                    let bound = kwargs
                        .iter()
                        .find(|(k, _)| *k == kw.name)
                        .map(|(_, v)| v.clone());
                    slots.push(bound.unwrap_or(Value::Undef));
                }
                if method.kw_vararg.is_some() {
                    let (names, values): (Vec<Symbol>, Vec<Value>) =
                        extra_kw.into_iter().unzip();
                    slots.push(Value::NamedTuple(Rc::new(NamedTupleValue::new(
                        names, values,
                    ))));
                }
                // `where` parameters become type values in the frame.
                for tp in &method.where_params {
                    let bound = bindings.0.get(&tp.name).cloned().unwrap_or(Ty::Any);
                    slots.push(Value::ty(bound));
                }
                self.run_chunk(chunk, slots, vec![])
            }
        }
    }

    /// `T(args…)`: construction and numeric conversion.
    fn construct(
        &mut self,
        ty: Ty,
        args: &[Value],
        kwargs: &[(Symbol, Value)],
    ) -> VmResult<Value> {
        if !kwargs.is_empty() {
            return Err(VmError::Method(
                "type constructors do not accept keyword arguments".to_string(),
            ));
        }
        match &ty {
            Ty::Struct { name, params } => self.construct_struct(*name, params, args),
            Ty::Dict => {
                let mut dict = DictValue::new();
                for arg in args {
                    let (k, v) = as_pair(arg)?;
                    dict.insert(k, v);
                }
                Ok(Value::Dict(Rc::new(RefCell::new(dict))))
            }
            Ty::Set => {
                let mut set = crate::values::SetValue::new();
                for arg in args {
                    match arg {
                        Value::Array(a) => {
                            for v in a.borrow().iter_values() {
                                set.insert(v);
                            }
                        }
                        other => set.insert(other.clone()),
                    }
                }
                Ok(Value::Set(Rc::new(RefCell::new(set))))
            }
            Ty::IOBuffer => Ok(Value::IOBuf(Rc::new(RefCell::new(Vec::new())))),
            Ty::Task => {
                let [f] = args else {
                    return Err(VmError::Method(
                        "Task expects a zero-argument function".to_string(),
                    ));
                };
                Ok(Value::Task(Rc::new(RefCell::new(TaskValue::new(f.clone())))))
            }
            Ty::Regex => match args {
                [Value::Str(pat)] => Ok(Value::Regex(Rc::new(RegexValue::compile(pat)?))),
                _ => Err(VmError::Method(
                    "Regex expects a pattern string".to_string(),
                )),
            },
            Ty::String => match args {
                [Value::Str(s)] => Ok(Value::Str(s.clone())),
                [Value::Char(c)] => Ok(Value::str(&c.to_string())),
                [Value::Array(a)] => {
                    let mut out = String::new();
                    for v in a.borrow().iter_values() {
                        match v {
                            Value::Char(c) => out.push(c),
                            Value::U8(b) => out.push(b as char),
                            other => {
                                return Err(VmError::Method(format!(
                                    "cannot build a String from {}",
                                    other.runtime_ty()
                                )))
                            }
                        }
                    }
                    Ok(Value::str(&out))
                }
                _ => Err(VmError::Method("String(…): unsupported argument".to_string())),
            },
            Ty::LinRange => match args {
                [a, b, Value::I64(len)] => {
                    let (start, stop) = (expect_f64(a)?, expect_f64(b)?);
                    if *len < 0 {
                        return Err(VmError::Argument(
                            "LinRange length must be non-negative".to_string(),
                        ));
                    }
                    Ok(Value::Range(RangeValue::Lin {
                        start,
                        stop,
                        len: *len as usize,
                    }))
                }
                _ => Err(VmError::Method(
                    "LinRange expects (start, stop, len)".to_string(),
                )),
            },
            _ => {
                let [arg] = args else {
                    return Err(VmError::Method(format!(
                        "no method matching {}({} arguments)",
                        ty,
                        args.len()
                    )));
                };
                convert_numeric(&ty, arg)
            }
        }
    }

    fn construct_struct(
        &mut self,
        name: Symbol,
        explicit_params: &[Ty],
        args: &[Value],
    ) -> VmResult<Value> {
        let def = self
            .types
            .structs
            .get(&name)
            .cloned()
            .ok_or_else(|| VmError::UndefVar(name))?;
        if args.len() != def.fields.len() {
            return Err(VmError::Method(format!(
                "no method matching {}({} arguments); type has {} fields",
                name,
                args.len(),
                def.fields.len()
            )));
        }
        // Bind type parameters: explicit `{…}` wins, otherwise infer
        // from the arguments feeding parametric fields.
        let mut bound: Vec<(Symbol, Ty)> = Vec::new();
        for (i, pname) in def.params.iter().enumerate() {
            if let Some(t) = explicit_params.get(i) {
                bound.push((*pname, t.clone()));
                continue;
            }
            let inferred = def
                .fields
                .iter()
                .zip(args)
                .find_map(|((_, fty), arg)| match fty {
                    Ty::Var { name: v, .. } if v == pname => Some(arg.runtime_ty()),
                    _ => None,
                })
                .unwrap_or(Ty::Any);
            bound.push((*pname, inferred));
        }
        let mut fields = Vec::with_capacity(args.len());
        for ((fname, fty), arg) in def.fields.iter().zip(args) {
            let mut declared = fty.clone();
            for (pname, pty) in &bound {
                declared = declared.substitute(*pname, pty);
            }
            fields.push(super::access::convert_field_value(
                &self.types,
                &declared,
                arg.clone(),
                *fname,
            )?);
        }
        let params: Vec<Ty> = bound.into_iter().map(|(_, t)| t).collect();
        let instance = StructInstance::new(name, params, fields);
        Ok(if def.mutable {
            Value::MutStruct(Rc::new(RefCell::new(instance)))
        } else {
            Value::Struct(Rc::new(instance))
        })
    }
}

fn expect_f64(v: &Value) -> VmResult<f64> {
    v.as_f64()
        .ok_or_else(|| VmError::Argument(format!("expected a number, got {}", v.runtime_ty())))
}

/// Split a `Pair` struct (or 2-tuple) into key and value.
pub fn as_pair(v: &Value) -> VmResult<(Value, Value)> {
    match v {
        Value::Struct(s) if s.name.as_str() == "Pair" && s.fields.len() == 2 => {
            Ok((s.fields[0].clone(), s.fields[1].clone()))
        }
        Value::Tuple(t) if t.len() == 2 => Ok((t[0].clone(), t[1].clone())),
        other => Err(VmError::Argument(format!(
            "expected a Pair, got {}",
            other.runtime_ty()
        ))),
    }
}

/// Numeric conversion constructors: `Int64(x)`, `Float64(x)`, ….
pub fn convert_numeric(ty: &Ty, v: &Value) -> VmResult<Value> {
    let inexact = |what: &str| VmError::Inexact(format!("{}({})", what, display(v)));
    fn display(v: &Value) -> String {
        crate::values::display_value(v)
    }
    let int_from = |v: &Value, what: &str| -> VmResult<i64> {
        if let Some(i) = v.as_i64() {
            return Ok(i);
        }
        if let Value::I128(x) = v {
            return i64::try_from(*x).map_err(|_| {
                VmError::Overflow(format!("{}({}) overflows", what, x))
            });
        }
        if let Some(f) = v.as_f64() {
            if f.fract() == 0.0 && f.is_finite() {
                return Ok(f as i64);
            }
            return Err(VmError::Inexact(format!("{}({})", what, f)));
        }
        Err(VmError::Method(format!(
            "no method matching {}(::{})",
            what,
            v.runtime_ty()
        )))
    };
    match ty {
        Ty::Int64 => Ok(Value::I64(int_from(v, "Int64")?)),
        Ty::Int8 => {
            let x = int_from(v, "Int8")?;
            i8::try_from(x)
                .map(Value::I8)
                .map_err(|_| inexact("Int8"))
        }
        Ty::Int16 => {
            let x = int_from(v, "Int16")?;
            i16::try_from(x)
                .map(Value::I16)
                .map_err(|_| inexact("Int16"))
        }
        Ty::Int32 => {
            let x = int_from(v, "Int32")?;
            i32::try_from(x)
                .map(Value::I32)
                .map_err(|_| inexact("Int32"))
        }
        Ty::Int128 => match v {
            Value::I128(x) => Ok(Value::I128(*x)),
            other => Ok(Value::I128(int_from(other, "Int128")? as i128)),
        },
        Ty::UInt8 => {
            let x = int_from(v, "UInt8")?;
            u8::try_from(x)
                .map(Value::U8)
                .map_err(|_| inexact("UInt8"))
        }
        Ty::UInt16 => {
            let x = int_from(v, "UInt16")?;
            u16::try_from(x)
                .map(Value::U16)
                .map_err(|_| inexact("UInt16"))
        }
        Ty::UInt32 => {
            let x = int_from(v, "UInt32")?;
            u32::try_from(x)
                .map(Value::U32)
                .map_err(|_| inexact("UInt32"))
        }
        Ty::UInt64 => {
            let x = int_from(v, "UInt64")?;
            u64::try_from(x)
                .map(Value::U64)
                .map_err(|_| inexact("UInt64"))
        }
        Ty::Float64 => v
            .as_f64()
            .map(Value::F64)
            .ok_or_else(|| VmError::Method(format!(
                "no method matching Float64(::{})",
                v.runtime_ty()
            ))),
        Ty::Float32 => v
            .as_f64()
            .map(|x| Value::F32(x as f32))
            .ok_or_else(|| VmError::Method(format!(
                "no method matching Float32(::{})",
                v.runtime_ty()
            ))),
        Ty::Float16 => v
            .as_f64()
            .map(|x| Value::F16(half::f16::from_f64(x)))
            .ok_or_else(|| VmError::Method(format!(
                "no method matching Float16(::{})",
                v.runtime_ty()
            ))),
        Ty::Bool => match v.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(inexact("Bool")),
        },
        Ty::Char => match v {
            Value::Char(c) => Ok(Value::Char(*c)),
            other => {
                let code = int_from(other, "Char")?;
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(Value::Char)
                    .ok_or_else(|| inexact("Char"))
            }
        },
        other => Err(VmError::Method(format!(
            "no method matching {}(::{})",
            other,
            v.runtime_ty()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_numeric_exact_and_inexact() {
        assert!(matches!(
            convert_numeric(&Ty::Int64, &Value::F64(3.0)).unwrap(),
            Value::I64(3)
        ));
        assert!(matches!(
            convert_numeric(&Ty::Int64, &Value::F64(3.5)),
            Err(VmError::Inexact(_))
        ));
        assert!(matches!(
            convert_numeric(&Ty::Float64, &Value::I64(2)).unwrap(),
            Value::F64(x) if x == 2.0
        ));
        assert!(matches!(
            convert_numeric(&Ty::UInt8, &Value::I64(300)),
            Err(VmError::Inexact(_))
        ));
        assert!(matches!(
            convert_numeric(&Ty::Bool, &Value::I64(1)).unwrap(),
            Value::Bool(true)
        ));
        assert!(matches!(
            convert_numeric(&Ty::Char, &Value::I64(65)).unwrap(),
            Value::Char('A')
        ));
    }
}
