//! Collection builtins: sizes, indexing, mutation, iteration protocol,
//! folds, and the higher-order functions.
//!
//! `iterate` follows Julia's protocol: `iterate(x)` starts, `iterate(x,
//! state)` continues, `nothing` ends. Loop lowering and every fold here
//! go through it, so user types gain iteration by adding methods.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::{StructDef, Ty};
use crate::values::{
    isequal_values, isless_values, new_array_ref, ArrayData, ArrayValue, DictValue, ElemType,
    SetValue, StructInstance, SubArrayValue, Value,
};
use crate::vm::access;
use crate::vm::Vm;

use super::{def, def_kw, def_vararg};

pub fn register(vm: &mut Vm) {
    // Pair is an ordinary immutable struct so `a => b` values dispatch
    // and destructure like any other record.
    vm.types.define_struct(StructDef {
        name: Symbol::intern("Pair"),
        params: vec![],
        supertype: Ty::Any,
        fields: vec![
            (Symbol::intern("first"), Ty::Any),
            (Symbol::intern("second"), Ty::Any),
        ],
        mutable: false,
    });
    def(vm, "=>", &[Ty::Any, Ty::Any], |_, _, args, _| {
        Ok(Value::Struct(Rc::new(StructInstance::new(
            Symbol::intern("Pair"),
            vec![],
            vec![args[0].clone(), args[1].clone()],
        ))))
    });

    def(vm, "length", &[Ty::Any], length_entry);
    def(vm, "size", &[Ty::AbstractArray], |_, _, args, _| {
        with_array(&args[0], |a| {
            Ok(Value::tuple(
                a.shape.iter().map(|&d| Value::I64(d as i64)).collect(),
            ))
        })
    });
    def(vm, "size", &[Ty::AbstractArray, Ty::Integer], |_, _, args, _| {
        let d = args[1].as_i64().unwrap_or(0);
        if d < 1 {
            return Err(VmError::Argument(format!("dimension {} out of range", d)));
        }
        with_array(&args[0], |a| Ok(Value::I64(a.size(d as usize - 1) as i64)))
    });
    def(vm, "ndims", &[Ty::AbstractArray], |_, _, args, _| {
        with_array(&args[0], |a| Ok(Value::I64(a.ndims() as i64)))
    });
    def(vm, "eltype", &[Ty::Any], |_, _, args, _| {
        Ok(Value::ty(match &args[0] {
            Value::Array(a) => a.borrow().elem_type().to_ty(),
            Value::Range(r) => r.elem_ty(),
            Value::SubArray(v) => v.elem_ty(),
            Value::Str(_) => Ty::Char,
            _ => Ty::Any,
        }))
    });
    def(vm, "axes", &[Ty::AbstractArray], |_, _, args, _| {
        with_array(&args[0], |a| {
            Ok(Value::tuple(
                a.shape
                    .iter()
                    .map(|&d| Value::Range(crate::values::RangeValue::unit(1, d as i64)))
                    .collect(),
            ))
        })
    });
    def(vm, "firstindex", &[Ty::Any], |_, _, args, _| {
        let _ = &args[0];
        Ok(Value::I64(1))
    });
    def(vm, "lastindex", &[Ty::Any], lastindex_entry);
    def(vm, "lastindex", &[Ty::Any, Ty::Integer], |_, _, args, _| {
        let d = args[1].as_i64().unwrap_or(1);
        with_array(&args[0], |a| Ok(Value::I64(a.size(d as usize - 1) as i64)))
    });
    def(vm, "isempty", &[Ty::Any], |_, _, args, _| {
        Ok(Value::Bool(collection_len(&args[0])? == 0))
    });
    def(vm, "in", &[Ty::Any, Ty::Any], in_entry);

    def_vararg(vm, "getindex", &[Ty::Any], Ty::Any, |vm, _, args, _| {
        access::index_load(&vm.types, &args[0], &args[1..])
    });
    def_vararg(vm, "setindex!", &[Ty::Any, Ty::Any], Ty::Any, |_, _, args, _| {
        access::index_store(&args[0], &args[2..], args[1].clone())?;
        Ok(args[0].clone())
    });

    def(vm, "iterate", &[Ty::Any], |_, _, args, _| iterate_start(&args[0]));
    def(vm, "iterate", &[Ty::Any, Ty::Any], |_, _, args, _| {
        iterate_next(&args[0], &args[1])
    });

    def(vm, "push!", &[Ty::AbstractArray, Ty::Any], |_, _, args, _| {
        let Value::Array(a) = &args[0] else {
            return Err(VmError::Method("push! expects an Array".to_string()));
        };
        if a.borrow().ndims() != 1 {
            return Err(VmError::Method(
                "push! is only supported for 1-dimensional arrays".to_string(),
            ));
        }
        a.borrow_mut().push(args[1].clone());
        Ok(args[0].clone())
    });
    def(vm, "push!", &[Ty::Set, Ty::Any], |_, _, args, _| {
        let Value::Set(s) = &args[0] else { unreachable!() };
        s.borrow_mut().insert(args[1].clone());
        Ok(args[0].clone())
    });
    def(vm, "pop!", &[Ty::AbstractArray], |_, _, args, _| {
        let Value::Array(a) = &args[0] else {
            return Err(VmError::Method("pop! expects an Array".to_string()));
        };
        let popped = a.borrow_mut().pop()?;
        Ok(popped)
    });
    def(vm, "pushfirst!", &[Ty::AbstractArray, Ty::Any], |_, _, args, _| {
        let Value::Array(a) = &args[0] else {
            return Err(VmError::Method("pushfirst! expects an Array".to_string()));
        };
        a.borrow_mut().insert(0, args[1].clone());
        Ok(args[0].clone())
    });
    def(vm, "popfirst!", &[Ty::AbstractArray], |_, _, args, _| {
        let Value::Array(a) = &args[0] else {
            return Err(VmError::Method("popfirst! expects an Array".to_string()));
        };
        if a.borrow().is_empty() {
            return Err(VmError::Argument("array must be non-empty".to_string()));
        }
        Ok(a.borrow_mut().remove(0))
    });
    def(
        vm,
        "insert!",
        &[Ty::AbstractArray, Ty::Integer, Ty::Any],
        |_, _, args, _| {
            let Value::Array(a) = &args[0] else {
                return Err(VmError::Method("insert! expects an Array".to_string()));
            };
            let idx = args[1].as_i64().unwrap_or(0);
            let len = a.borrow().len();
            if idx < 1 || idx as usize > len + 1 {
                return Err(VmError::Bounds {
                    indices: vec![idx],
                    shape: vec![len],
                });
            }
            a.borrow_mut().insert(idx as usize - 1, args[2].clone());
            Ok(args[0].clone())
        },
    );
    def(
        vm,
        "deleteat!",
        &[Ty::AbstractArray, Ty::Integer],
        |_, _, args, _| {
            let Value::Array(a) = &args[0] else {
                return Err(VmError::Method("deleteat! expects an Array".to_string()));
            };
            let idx = args[1].as_i64().unwrap_or(0);
            let len = a.borrow().len();
            if idx < 1 || idx as usize > len {
                return Err(VmError::Bounds {
                    indices: vec![idx],
                    shape: vec![len],
                });
            }
            a.borrow_mut().remove(idx as usize - 1);
            Ok(args[0].clone())
        },
    );
    def(
        vm,
        "append!",
        &[Ty::AbstractArray, Ty::Any],
        |_, _, args, _| {
            let Value::Array(a) = &args[0] else {
                return Err(VmError::Method("append! expects an Array".to_string()));
            };
            for v in iter_all(&args[1])? {
                a.borrow_mut().push(v);
            }
            Ok(args[0].clone())
        },
    );
    def(vm, "empty!", &[Ty::Any], |_, _, args, _| {
        match &args[0] {
            Value::Array(a) => {
                let elem = a.borrow().elem_type();
                *a.borrow_mut() = ArrayValue::empty(elem);
            }
            Value::Dict(d) => d.borrow_mut().map.clear(),
            Value::Set(s) => s.borrow_mut().map.clear(),
            other => {
                return Err(VmError::Method(format!(
                    "no method matching empty!(::{})",
                    other.runtime_ty()
                )))
            }
        }
        Ok(args[0].clone())
    });

    def(vm, "collect", &[Ty::Any], |_, _, args, _| {
        let values = iter_all(&args[0])?;
        let n = values.len();
        let arr = new_array_ref(ArrayValue::from_values(values, vec![n]));
        crate::broadcast::materialize::narrow_any_array(&arr);
        Ok(Value::Array(arr))
    });
    def(vm, "reverse", &[Ty::Any], |_, _, args, _| {
        match &args[0] {
            Value::Str(s) => Ok(Value::str(&s.chars().rev().collect::<String>())),
            other => {
                let mut values = iter_all(other)?;
                values.reverse();
                let n = values.len();
                let arr = new_array_ref(ArrayValue::from_values(values, vec![n]));
                crate::broadcast::materialize::narrow_any_array(&arr);
                Ok(Value::Array(arr))
            }
        }
    });
    def(vm, "first", &[Ty::Any], |vm, _, args, _| {
        access::index_load(&vm.types, &args[0], &[Value::I64(1)])
    });
    def(vm, "last", &[Ty::Any], |vm, _, args, _| {
        let n = collection_len(&args[0])? as i64;
        access::index_load(&vm.types, &args[0], &[Value::I64(n)])
    });

    def_kw(vm, "sort", &[Ty::AbstractArray], &["rev", "by"], sort_entry);
    def_kw(vm, "sort!", &[Ty::AbstractArray], &["rev", "by"], sort_entry);

    def(vm, "sum", &[Ty::Any], |vm, _, args, _| fold_sum(vm, None, &args[0]));
    def(vm, "sum", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        fold_sum(vm, Some(args[0].clone()), &args[1])
    });
    def(vm, "prod", &[Ty::Any], |vm, _, args, _| {
        let mut acc = Value::I64(1);
        for v in iter_all(&args[0])? {
            acc = super::numeric::numeric_binop("*", &acc, &v)?;
        }
        let _ = vm;
        Ok(acc)
    });
    def(vm, "minimum", &[Ty::Any], |_, _, args, _| {
        extremum(&args[0], true)
    });
    def(vm, "maximum", &[Ty::Any], |_, _, args, _| {
        extremum(&args[0], false)
    });
    def(vm, "any", &[Ty::Any], |_, _, args, _| {
        for v in iter_all(&args[0])? {
            if matches!(v, Value::Bool(true)) {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });
    def(vm, "all", &[Ty::Any], |_, _, args, _| {
        for v in iter_all(&args[0])? {
            if !matches!(v, Value::Bool(true)) {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });
    def(vm, "any", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        for v in iter_all(&args[1])? {
            if matches!(vm.call_value(&args[0], &[v])?, Value::Bool(true)) {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });
    def(vm, "all", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        for v in iter_all(&args[1])? {
            if !matches!(vm.call_value(&args[0], &[v])?, Value::Bool(true)) {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });
    def(vm, "count", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        let mut n = 0i64;
        for v in iter_all(&args[1])? {
            if matches!(vm.call_value(&args[0], &[v])?, Value::Bool(true)) {
                n += 1;
            }
        }
        Ok(Value::I64(n))
    });

    def_vararg(vm, "map", &[Ty::Function], Ty::Any, map_entry);
    def(vm, "filter", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        let mut out = Vec::new();
        for v in iter_all(&args[1])? {
            if matches!(vm.call_value(&args[0], &[v.clone()])?, Value::Bool(true)) {
                out.push(v);
            }
        }
        let n = out.len();
        let arr = new_array_ref(ArrayValue::from_values(out, vec![n]));
        crate::broadcast::materialize::narrow_any_array(&arr);
        Ok(Value::Array(arr))
    });
    def_kw(
        vm,
        "reduce",
        &[Ty::Function, Ty::Any],
        &["init"],
        |vm, _, args, kw| {
            let init = kw
                .iter()
                .find(|(k, _)| k.as_str() == "init")
                .map(|(_, v)| v.clone());
            fold_with(vm, &args[0], &args[1], init)
        },
    );
    def(vm, "foldl", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        fold_with(vm, &args[0], &args[1], None)
    });
    def(vm, "foreach", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        for v in iter_all(&args[1])? {
            vm.call_value(&args[0], &[v])?;
        }
        Ok(Value::Nothing)
    });
    def(
        vm,
        "mapreduce",
        &[Ty::Function, Ty::Function, Ty::Any],
        |vm, _, args, _| {
            let mut acc: Option<Value> = None;
            for v in iter_all(&args[2])? {
                let mapped = vm.call_value(&args[0], &[v])?;
                acc = Some(match acc {
                    None => mapped,
                    Some(a) => vm.call_value(&args[1], &[a, mapped])?,
                });
            }
            acc.ok_or_else(|| {
                VmError::Argument("mapreduce over an empty collection".to_string())
            })
        },
    );

    def_vararg(vm, "zeros", &[], Ty::Integer, |_, _, args, _| {
        alloc_filled(args, Value::F64(0.0))
    });
    def_vararg(vm, "ones", &[], Ty::Integer, |_, _, args, _| {
        alloc_filled(args, Value::F64(1.0))
    });
    def_vararg(vm, "fill", &[Ty::Any], Ty::Integer, |_, _, args, _| {
        alloc_filled(&args[1..], args[0].clone())
    });
    def(vm, "similar", &[Ty::AbstractArray], |_, _, args, _| {
        with_array(&args[0], |a| {
            let len = a.len();
            let data = ArrayData::with_capacity(a.elem_type(), len);
            let mut arr = ArrayValue::new(data, vec![0]);
            for _ in 0..len {
                match &mut arr.data {
                    ArrayData::I64(v) => v.push(0),
                    ArrayData::F64(v) => v.push(0.0),
                    ArrayData::Bool(v) => v.push(false),
                    ArrayData::Char(v) => v.push('\0'),
                    ArrayData::Str(v) => v.push("".into()),
                    ArrayData::Any(v) => v.push(Value::Nothing),
                }
            }
            arr.shape = a.shape.clone();
            Ok(Value::Array(new_array_ref(arr)))
        })
    });

    def_vararg(vm, "vcat", &[], Ty::Any, vcat_entry);
    def_vararg(vm, "hcat", &[], Ty::Any, hcat_entry);

    // Dict surface.
    def(vm, "keys", &[Ty::Dict], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        let keys: Vec<Value> = d.borrow().map.keys().map(|k| k.0.clone()).collect();
        let n = keys.len();
        Ok(Value::Array(new_array_ref(ArrayValue::from_values(
            keys,
            vec![n],
        ))))
    });
    def(vm, "values", &[Ty::Dict], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        let vals: Vec<Value> = d.borrow().map.values().cloned().collect();
        let n = vals.len();
        Ok(Value::Array(new_array_ref(ArrayValue::from_values(
            vals,
            vec![n],
        ))))
    });
    def(vm, "haskey", &[Ty::Dict, Ty::Any], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        let has = d.borrow().contains(&args[1]);
        Ok(Value::Bool(has))
    });
    def(vm, "get", &[Ty::Dict, Ty::Any, Ty::Any], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        let got = d.borrow().get(&args[1]);
        Ok(got.unwrap_or_else(|| args[2].clone()))
    });
    def(vm, "get!", &[Ty::Dict, Ty::Any, Ty::Any], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        if let Some(v) = d.borrow().get(&args[1]) {
            return Ok(v);
        }
        d.borrow_mut().insert(args[1].clone(), args[2].clone());
        Ok(args[2].clone())
    });
    def(vm, "delete!", &[Ty::Dict, Ty::Any], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        d.borrow_mut().remove(&args[1]);
        Ok(args[0].clone())
    });
    def(vm, "merge", &[Ty::Dict, Ty::Dict], |_, _, args, _| {
        let (Value::Dict(a), Value::Dict(b)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        let mut out = DictValue::new();
        for (k, v) in a.borrow().map.iter() {
            out.insert(k.0.clone(), v.clone());
        }
        for (k, v) in b.borrow().map.iter() {
            out.insert(k.0.clone(), v.clone());
        }
        Ok(Value::Dict(Rc::new(RefCell::new(out))))
    });
    def(vm, "pairs", &[Ty::Dict], |_, _, args, _| {
        let Value::Dict(d) = &args[0] else { unreachable!() };
        let pairs: Vec<Value> = d
            .borrow()
            .map
            .iter()
            .map(|(k, v)| pair_value(k.0.clone(), v.clone()))
            .collect();
        let n = pairs.len();
        Ok(Value::Array(new_array_ref(ArrayValue::from_values(
            pairs,
            vec![n],
        ))))
    });

    // Set algebra.
    def(vm, "union", &[Ty::Set, Ty::Set], |_, _, args, _| {
        set_op(&args[0], &args[1], |a, b, out| {
            for v in a.iter_values() {
                out.insert(v.clone());
            }
            for v in b.iter_values() {
                out.insert(v.clone());
            }
        })
    });
    def(vm, "intersect", &[Ty::Set, Ty::Set], |_, _, args, _| {
        set_op(&args[0], &args[1], |a, b, out| {
            for v in a.iter_values() {
                if b.contains(v) {
                    out.insert(v.clone());
                }
            }
        })
    });
    def(vm, "setdiff", &[Ty::Set, Ty::Set], |_, _, args, _| {
        set_op(&args[0], &args[1], |a, b, out| {
            for v in a.iter_values() {
                if !b.contains(v) {
                    out.insert(v.clone());
                }
            }
        })
    });

    def(vm, "view", &[Ty::AbstractArray, Ty::UnitRange], |_, _, args, _| {
        let Value::Array(a) = &args[0] else {
            return Err(VmError::Method("view expects an Array".to_string()));
        };
        let Value::Range(r) = &args[1] else { unreachable!() };
        let len = a.borrow().len();
        let (start, stop) = match (r.first(), r.last()) {
            (Ok(Value::I64(s)), Ok(Value::I64(e))) => (s, e),
            _ => return Err(VmError::Argument("view range must be non-empty".to_string())),
        };
        if start < 1 || stop as usize > len {
            return Err(VmError::Bounds {
                indices: vec![start, stop],
                shape: vec![len],
            });
        }
        Ok(Value::SubArray(Rc::new(SubArrayValue {
            parent: a.clone(),
            offset: start as usize - 1,
            length: (stop - start + 1).max(0) as usize,
        })))
    });

    def(vm, "enumerate", &[Ty::Any], |_, _, args, _| {
        let values = iter_all(&args[0])?;
        let pairs: Vec<Value> = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Value::tuple(vec![Value::I64(i as i64 + 1), v]))
            .collect();
        let n = pairs.len();
        Ok(Value::Array(new_array_ref(ArrayValue::from_values(
            pairs,
            vec![n],
        ))))
    });
    def(vm, "zip", &[Ty::Any, Ty::Any], |_, _, args, _| {
        let a = iter_all(&args[0])?;
        let b = iter_all(&args[1])?;
        let pairs: Vec<Value> = a
            .into_iter()
            .zip(b)
            .map(|(x, y)| Value::tuple(vec![x, y]))
            .collect();
        let n = pairs.len();
        Ok(Value::Array(new_array_ref(ArrayValue::from_values(
            pairs,
            vec![n],
        ))))
    });

    def(vm, "findfirst", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        for (i, v) in iter_all(&args[1])?.into_iter().enumerate() {
            if matches!(vm.call_value(&args[0], &[v])?, Value::Bool(true)) {
                return Ok(Value::I64(i as i64 + 1));
            }
        }
        Ok(Value::Nothing)
    });
    def(vm, "findall", &[Ty::Function, Ty::Any], |vm, _, args, _| {
        let mut out = Vec::new();
        for (i, v) in iter_all(&args[1])?.into_iter().enumerate() {
            if matches!(vm.call_value(&args[0], &[v])?, Value::Bool(true)) {
                out.push(i as i64 + 1);
            }
        }
        let n = out.len();
        Ok(Value::Array(new_array_ref(ArrayValue::from_i64(
            out,
            vec![n],
        ))))
    });

    def(vm, "copy", &[Ty::Any], |vm, _, args, _| match &args[0] {
        Value::Array(a) => Ok(Value::Array(new_array_ref(a.borrow().clone()))),
        Value::Dict(d) => Ok(Value::Dict(Rc::new(RefCell::new(d.borrow().clone())))),
        Value::Set(s) => Ok(Value::Set(Rc::new(RefCell::new(s.borrow().clone())))),
        Value::Broadcasted(bc) => crate::broadcast::materialize::copy_broadcast(vm, bc),
        other => Ok(other.clone()),
    });

    def(vm, "Ref", &[Ty::Any], |_, _, args, _| {
        Ok(Value::RefWrap(Rc::new(args[0].clone())))
    });
}

// ── shared helpers ────────────────────────────────────────────────────

fn with_array<T>(
    v: &Value,
    f: impl FnOnce(&ArrayValue) -> VmResult<T>,
) -> VmResult<T> {
    match v {
        Value::Array(a) => f(&a.borrow()),
        Value::SubArray(view) => {
            let values: Vec<Value> = (0..view.length)
                .map(|i| view.parent.borrow().get_linear(view.offset + i))
                .collect();
            let len = values.len();
            f(&ArrayValue::from_values(values, vec![len]))
        }
        other => Err(VmError::Method(format!(
            "expected an array, got {}",
            other.runtime_ty()
        ))),
    }
}

pub fn collection_len(v: &Value) -> VmResult<usize> {
    Ok(match v {
        Value::Array(a) => a.borrow().len(),
        Value::SubArray(view) => view.length,
        Value::Range(r) => r.len(),
        Value::Tuple(t) => t.len(),
        Value::NamedTuple(nt) => nt.values.len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        Value::Str(s) => s.chars().count(),
        other => {
            return Err(VmError::Method(format!(
                "no method matching length(::{})",
                other.runtime_ty()
            )))
        }
    })
}

fn length_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    Ok(Value::I64(collection_len(&args[0])? as i64))
}

fn lastindex_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    Ok(match &args[0] {
        Value::Str(s) => {
            // Last valid character start.
            let mut idx = s.len();
            while idx > 0 && !s.is_char_boundary(idx - 1) {
                idx -= 1;
            }
            Value::I64(idx as i64)
        }
        other => Value::I64(collection_len(other)? as i64),
    })
}

fn in_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let needle = &args[0];
    match &args[1] {
        Value::Set(s) => {
            let has = s.borrow().contains(needle);
            Ok(Value::Bool(has))
        }
        Value::Dict(d) => {
            // `k => v in dict` membership over pairs.
            let (k, v) = crate::vm::call::as_pair(needle)?;
            let found = d.borrow().get(&k);
            Ok(Value::Bool(
                matches!(found, Some(existing) if isequal_values(&existing, &v)),
            ))
        }
        Value::Str(s) => match needle {
            Value::Char(c) => Ok(Value::Bool(s.contains(*c))),
            Value::Str(sub) => Ok(Value::Bool(s.contains(&**sub))),
            _ => Ok(Value::Bool(false)),
        },
        haystack => {
            for v in iter_all(haystack)? {
                if isequal_values(needle, &v) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
    }
}

/// Eagerly collect any iterable into values. Loops and folds share
/// this; user iterables go through the dispatched `iterate` instead.
pub fn iter_all(v: &Value) -> VmResult<Vec<Value>> {
    Ok(match v {
        Value::Array(a) => a.borrow().iter_values().collect(),
        Value::SubArray(view) => (0..view.length)
            .map(|i| view.parent.borrow().get_linear(view.offset + i))
            .collect(),
        Value::Range(r) => r.iter_values().collect(),
        Value::Tuple(t) => t.iter().cloned().collect(),
        Value::NamedTuple(nt) => nt.values.clone(),
        Value::Str(s) => s.chars().map(Value::Char).collect(),
        Value::Set(s) => s.borrow().iter_values().cloned().collect(),
        Value::Dict(d) => d
            .borrow()
            .map
            .iter()
            .map(|(k, val)| pair_value(k.0.clone(), val.clone()))
            .collect(),
        other => {
            return Err(VmError::Method(format!(
                "no method matching iterate(::{})",
                other.runtime_ty()
            )))
        }
    })
}

fn pair_value(first: Value, second: Value) -> Value {
    Value::Struct(Rc::new(StructInstance::new(
        Symbol::intern("Pair"),
        vec![],
        vec![first, second],
    )))
}

/// `iterate(x)`: first element and state, or `nothing`.
fn iterate_start(v: &Value) -> VmResult<Value> {
    match v {
        Value::Array(_) | Value::SubArray(_) | Value::Range(_) | Value::Tuple(_)
        | Value::NamedTuple(_) => indexed_iterate(v, 1),
        Value::Str(s) => match s.chars().next() {
            Some(c) => Ok(Value::tuple(vec![
                Value::Char(c),
                Value::I64(1 + c.len_utf8() as i64),
            ])),
            None => Ok(Value::Nothing),
        },
        Value::Dict(_) | Value::Set(_) => {
            let snapshot = iter_all(v)?;
            let n = snapshot.len();
            let arr = Value::Array(new_array_ref(ArrayValue::from_values(
                snapshot,
                vec![n],
            )));
            iterate_snapshot(&arr, 1)
        }
        other => Err(VmError::Method(format!(
            "no method matching iterate(::{})",
            other.runtime_ty()
        ))),
    }
}

/// `iterate(x, state)`.
fn iterate_next(v: &Value, state: &Value) -> VmResult<Value> {
    match v {
        Value::Array(_) | Value::SubArray(_) | Value::Range(_) | Value::Tuple(_)
        | Value::NamedTuple(_) => {
            let i = state
                .as_i64()
                .ok_or_else(|| VmError::Argument("bad iteration state".to_string()))?;
            indexed_iterate(v, i)
        }
        Value::Str(s) => {
            let i = state
                .as_i64()
                .ok_or_else(|| VmError::Argument("bad iteration state".to_string()))?;
            let byte = i as usize - 1;
            if byte >= s.len() {
                return Ok(Value::Nothing);
            }
            let c = s[byte..].chars().next().expect("boundary state");
            Ok(Value::tuple(vec![
                Value::Char(c),
                Value::I64(i + c.len_utf8() as i64),
            ]))
        }
        Value::Dict(_) | Value::Set(_) => match state {
            Value::Tuple(t) if t.len() == 2 => {
                let i = t[1]
                    .as_i64()
                    .ok_or_else(|| VmError::Argument("bad iteration state".to_string()))?;
                iterate_snapshot(&t[0], i)
            }
            _ => Err(VmError::Argument("bad iteration state".to_string())),
        },
        other => Err(VmError::Method(format!(
            "no method matching iterate(::{}, state)",
            other.runtime_ty()
        ))),
    }
}

fn indexed_iterate(v: &Value, i: i64) -> VmResult<Value> {
    let len = collection_len(v)? as i64;
    if i > len {
        return Ok(Value::Nothing);
    }
    let tt = crate::types::TypeTable::new();
    let elem = access::index_load(&tt, v, &[Value::I64(i)])?;
    Ok(Value::tuple(vec![elem, Value::I64(i + 1)]))
}

fn iterate_snapshot(arr: &Value, i: i64) -> VmResult<Value> {
    let len = collection_len(arr)? as i64;
    if i > len {
        return Ok(Value::Nothing);
    }
    let tt = crate::types::TypeTable::new();
    let elem = access::index_load(&tt, arr, &[Value::I64(i)])?;
    Ok(Value::tuple(vec![
        elem,
        Value::tuple(vec![arr.clone(), Value::I64(i + 1)]),
    ]))
}

fn fold_sum(vm: &mut Vm, f: Option<Value>, coll: &Value) -> VmResult<Value> {
    let mut acc: Option<Value> = None;
    for v in iter_all(coll)? {
        let v = match &f {
            Some(f) => vm.call_value(f, &[v])?,
            None => v,
        };
        acc = Some(match acc {
            None => v,
            Some(a) => super::numeric::numeric_binop("+", &a, &v)?,
        });
    }
    Ok(acc.unwrap_or(Value::I64(0)))
}

fn fold_with(
    vm: &mut Vm,
    op: &Value,
    coll: &Value,
    init: Option<Value>,
) -> VmResult<Value> {
    let mut acc = init;
    for v in iter_all(coll)? {
        acc = Some(match acc {
            None => v,
            Some(a) => vm.call_value(op, &[a, v])?,
        });
    }
    acc.ok_or_else(|| {
        VmError::Argument("reducing over an empty collection with no init".to_string())
    })
}

fn extremum(coll: &Value, want_min: bool) -> VmResult<Value> {
    let mut best: Option<Value> = None;
    for v in iter_all(coll)? {
        if matches!(v, Value::Missing) {
            return Ok(Value::Missing);
        }
        best = Some(match best {
            None => v,
            Some(b) => {
                let smaller = isless_values(&v, &b).ok_or_else(|| {
                    VmError::Method("values are not ordered".to_string())
                })?;
                if smaller == want_min {
                    v
                } else {
                    b
                }
            }
        });
    }
    best.ok_or_else(|| VmError::Argument("collection must be non-empty".to_string()))
}

fn map_entry(
    vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let f = &args[0];
    let colls = &args[1..];
    if colls.is_empty() {
        return Err(VmError::Method("map needs at least one collection".to_string()));
    }
    let mut iters: Vec<Vec<Value>> = Vec::with_capacity(colls.len());
    for coll in colls {
        iters.push(iter_all(coll)?);
    }
    let len = iters.iter().map(|it| it.len()).min().unwrap_or(0);
    if iters.iter().any(|it| it.len() != len) {
        return Err(VmError::DimensionMismatch(
            "map: collections have different lengths".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let call_args: Vec<Value> = iters.iter().map(|it| it[i].clone()).collect();
        out.push(vm.call_value(f, &call_args)?);
    }
    let arr = new_array_ref(ArrayValue::from_values(out, vec![len]));
    crate::broadcast::materialize::narrow_any_array(&arr);
    Ok(Value::Array(arr))
}

fn sort_entry(
    vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let rev = kw
        .iter()
        .any(|(k, v)| k.as_str() == "rev" && matches!(v, Value::Bool(true)));
    let by = kw
        .iter()
        .find(|(k, _)| k.as_str() == "by")
        .map(|(_, v)| v.clone());
    let mut values = iter_all(&args[0])?;
    // Decorate with the key when `by` is given (it may call user code).
    let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(values.len());
    for v in values.drain(..) {
        let key = match &by {
            Some(f) => vm.call_value(f, &[v.clone()])?,
            None => v.clone(),
        };
        keyed.push((key, v));
    }
    // Insertion sort on isless: stable and total.
    for i in 1..keyed.len() {
        let mut j = i;
        while j > 0 {
            let earlier = isless_values(&keyed[j].0, &keyed[j - 1].0).unwrap_or(false);
            let should_swap = if rev {
                isless_values(&keyed[j - 1].0, &keyed[j].0).unwrap_or(false)
            } else {
                earlier
            };
            if should_swap {
                keyed.swap(j, j - 1);
                j -= 1;
            } else {
                break;
            }
        }
    }
    let sorted: Vec<Value> = keyed.into_iter().map(|(_, v)| v).collect();
    if name.as_str() == "sort!" {
        let Value::Array(a) = &args[0] else {
            return Err(VmError::Method("sort! expects an Array".to_string()));
        };
        let n = sorted.len();
        *a.borrow_mut() = ArrayValue::from_values(sorted, vec![n]);
        crate::broadcast::materialize::narrow_any_array(a);
        Ok(args[0].clone())
    } else {
        let n = sorted.len();
        let arr = new_array_ref(ArrayValue::from_values(sorted, vec![n]));
        crate::broadcast::materialize::narrow_any_array(&arr);
        Ok(Value::Array(arr))
    }
}

fn alloc_filled(dims: &[Value], fill: Value) -> VmResult<Value> {
    let mut shape = Vec::with_capacity(dims.len().max(1));
    for d in dims {
        let n = d
            .as_i64()
            .ok_or_else(|| VmError::Argument("dimensions must be integers".to_string()))?;
        if n < 0 {
            return Err(VmError::Argument("dimensions must be non-negative".to_string()));
        }
        shape.push(n as usize);
    }
    if shape.is_empty() {
        shape.push(0);
    }
    let len: usize = shape.iter().product();
    let arr = match &fill {
        Value::F64(x) => ArrayValue::from_f64(vec![*x; len], shape),
        Value::I64(x) => ArrayValue::from_i64(vec![*x; len], shape),
        Value::Bool(x) => ArrayValue::new(ArrayData::Bool(vec![*x; len]), shape),
        other => ArrayValue::from_values(vec![other.clone(); len], shape),
    };
    Ok(Value::Array(new_array_ref(arr)))
}

/// `vcat`: scalars build a vector, vectors/matrices concatenate
/// vertically.
fn vcat_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let all_scalar = args.iter().all(|a| !matches!(a, Value::Array(_)));
    if all_scalar {
        let n = args.len();
        let arr = new_array_ref(ArrayValue::from_values(args.to_vec(), vec![n]));
        crate::broadcast::materialize::narrow_any_array(&arr);
        return Ok(Value::Array(arr));
    }
    // Matrix rows: all 2-D with equal column counts.
    let all_matrix = args
        .iter()
        .all(|a| matches!(a, Value::Array(arr) if arr.borrow().ndims() == 2));
    if all_matrix {
        let cols = match &args[0] {
            Value::Array(a) => a.borrow().size(1),
            _ => unreachable!(),
        };
        let mut total_rows = 0;
        for a in args {
            let Value::Array(a) = a else { unreachable!() };
            if a.borrow().size(1) != cols {
                return Err(VmError::DimensionMismatch(
                    "vcat: number of columns must match".to_string(),
                ));
            }
            total_rows += a.borrow().size(0);
        }
        let mut out = Vec::with_capacity(total_rows * cols);
        for c in 0..cols {
            for a in args {
                let Value::Array(a) = a else { unreachable!() };
                let a = a.borrow();
                let rows = a.size(0);
                for r in 0..rows {
                    out.push(a.get_linear(c * rows + r));
                }
            }
        }
        let arr = new_array_ref(ArrayValue::from_values(out, vec![total_rows, cols]));
        crate::broadcast::materialize::narrow_any_array(&arr);
        return Ok(Value::Array(arr));
    }
    // Vector/scalar concatenation.
    let mut out = Vec::new();
    for a in args {
        match a {
            Value::Array(arr) => out.extend(arr.borrow().iter_values()),
            scalar => out.push(scalar.clone()),
        }
    }
    let n = out.len();
    let arr = new_array_ref(ArrayValue::from_values(out, vec![n]));
    crate::broadcast::materialize::narrow_any_array(&arr);
    Ok(Value::Array(arr))
}

/// `hcat`: scalars build a 1×n matrix, vectors become columns,
/// matrices concatenate horizontally.
fn hcat_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let all_scalar = args.iter().all(|a| !matches!(a, Value::Array(_)));
    if all_scalar {
        let n = args.len();
        let arr = new_array_ref(ArrayValue::from_values(args.to_vec(), vec![1, n]));
        crate::broadcast::materialize::narrow_any_array(&arr);
        return Ok(Value::Array(arr));
    }
    // Column-wise concatenation: every participant contributes columns
    // of equal row count.
    let rows = args
        .iter()
        .find_map(|a| match a {
            Value::Array(arr) => Some(arr.borrow().size(0)),
            _ => None,
        })
        .unwrap_or(1);
    let mut out = Vec::new();
    let mut cols = 0;
    for a in args {
        match a {
            Value::Array(arr) => {
                let arr = arr.borrow();
                if arr.size(0) != rows {
                    return Err(VmError::DimensionMismatch(
                        "hcat: number of rows must match".to_string(),
                    ));
                }
                let c = if arr.ndims() == 1 { 1 } else { arr.size(1) };
                out.extend(arr.iter_values());
                cols += c;
            }
            scalar => {
                if rows != 1 {
                    return Err(VmError::DimensionMismatch(
                        "hcat: number of rows must match".to_string(),
                    ));
                }
                out.push(scalar.clone());
                cols += 1;
            }
        }
    }
    let arr = new_array_ref(ArrayValue::from_values(out, vec![rows, cols]));
    crate::broadcast::materialize::narrow_any_array(&arr);
    Ok(Value::Array(arr))
}

fn set_op(
    a: &Value,
    b: &Value,
    f: impl Fn(&SetValue, &SetValue, &mut SetValue),
) -> VmResult<Value> {
    let (Value::Set(a), Value::Set(b)) = (a, b) else {
        return Err(VmError::Method("expected two Sets".to_string()));
    };
    let mut out = SetValue::new();
    f(&a.borrow(), &b.borrow(), &mut out);
    Ok(Value::Set(Rc::new(RefCell::new(out))))
}
