//! Indexing and field access shared by the `IndexLoad`/`IndexStore`/
//! `FieldLoad`/`FieldStore` instructions and the `getindex`/`setindex!`
//! `getfield`/`setfield!` builtins.

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::{Ty, TypeTable};
use crate::values::{display_value, StructInstance, Value};

/// `collection[indices…]`, 1-based and bounds-checked everywhere.
pub fn index_load(types: &TypeTable, collection: &Value, indices: &[Value]) -> VmResult<Value> {
    let _ = types;
    match collection {
        Value::Array(a) => {
            // Range index: a[2:4] slices.
            if indices.len() == 1 {
                if let Value::Range(r) = &indices[0] {
                    let arr = a.borrow();
                    let mut out = Vec::with_capacity(r.len());
                    for iv in r.iter_values() {
                        let idx = iv.as_index().ok_or_else(|| {
                            VmError::Argument("array index must be an integer".to_string())
                        })?;
                        let off = arr.linear_index(&[idx])?;
                        out.push(arr.get_linear(off));
                    }
                    let n = out.len();
                    return Ok(Value::Array(crate::values::new_array_ref(
                        crate::values::ArrayValue::from_values(out, vec![n]),
                    )));
                }
            }
            let idx = integer_indices(indices)?;
            let arr = a.borrow();
            let offset = arr.linear_index(&idx)?;
            Ok(arr.get_linear(offset))
        }
        Value::SubArray(view) => {
            let idx = single_index(indices)?;
            view.get(idx)
        }
        Value::Range(r) => {
            let idx = single_index(indices)?;
            r.get(idx)
        }
        Value::Tuple(elems) => {
            let idx = single_index(indices)?;
            elems
                .get(idx as usize - 1)
                .cloned()
                .ok_or_else(|| VmError::Bounds {
                    indices: vec![idx],
                    shape: vec![elems.len()],
                })
        }
        Value::NamedTuple(nt) => match indices {
            [Value::Sym(name)] => nt
                .get_by_name(*name)
                .cloned()
                .ok_or_else(|| VmError::Key(format!(":{}", name))),
            _ => {
                let idx = single_index(indices)?;
                nt.values
                    .get(idx as usize - 1)
                    .cloned()
                    .ok_or_else(|| VmError::Bounds {
                        indices: vec![idx],
                        shape: vec![nt.values.len()],
                    })
            }
        },
        Value::Dict(d) => {
            let [key] = indices else {
                return Err(VmError::Argument(
                    "Dict indexing takes exactly one key".to_string(),
                ));
            };
            d.borrow()
                .get(key)
                .ok_or_else(|| VmError::Key(display_value(key)))
        }
        Value::Str(s) => {
            // Range index slices out a substring; both endpoints must
            // be valid character starts.
            if let [Value::Range(r)] = indices {
                if r.is_empty() {
                    return Ok(Value::str(""));
                }
                let (Value::I64(start), Value::I64(stop)) = (r.first()?, r.last()?) else {
                    return Err(VmError::Argument(
                        "string index range must be integer-valued".to_string(),
                    ));
                };
                if start < 1 || stop as usize > s.len() {
                    return Err(VmError::Bounds {
                        indices: vec![start, stop],
                        shape: vec![s.len()],
                    });
                }
                let from = start as usize - 1;
                if !s.is_char_boundary(from) || !s.is_char_boundary(stop as usize - 1) {
                    return Err(VmError::Argument(format!(
                        "invalid string index range {}:{}",
                        start, stop
                    )));
                }
                let last_char = s[stop as usize - 1..].chars().next().expect("boundary");
                let to = stop as usize - 1 + last_char.len_utf8();
                return Ok(Value::str(&s[from..to]));
            }
            let idx = single_index(indices)?;
            string_char_at(s, idx)
        }
        // Pairs index like 2-tuples, so dict iteration destructures.
        Value::Struct(p) if p.name.as_str() == "Pair" => {
            let idx = single_index(indices)?;
            p.fields
                .get(idx as usize - 1)
                .cloned()
                .ok_or_else(|| VmError::Bounds {
                    indices: vec![idx],
                    shape: vec![p.fields.len()],
                })
        }
        Value::RegexMatch(m) => {
            let idx = single_index(indices)?;
            if idx < 1 || idx as usize > m.captures.len() {
                return Err(VmError::Bounds {
                    indices: vec![idx],
                    shape: vec![m.captures.len()],
                });
            }
            Ok(match &m.captures[idx as usize - 1] {
                Some(s) => Value::Str(s.clone()),
                None => Value::Nothing,
            })
        }
        Value::RefWrap(inner) => {
            let _ = single_index(indices)?;
            Ok((**inner).clone())
        }
        other => Err(VmError::Method(format!(
            "no method matching getindex(::{}, …)",
            other.runtime_ty()
        ))),
    }
}

/// `collection[indices…] = value`.
pub fn index_store(
    collection: &Value,
    indices: &[Value],
    value: Value,
) -> VmResult<()> {
    match collection {
        Value::Array(a) => {
            let idx = integer_indices(indices)?;
            let offset = a.borrow().linear_index(&idx)?;
            a.borrow_mut().set_linear(offset, value);
            Ok(())
        }
        Value::SubArray(view) => {
            let idx = single_index(indices)?;
            view.set(idx, value)
        }
        Value::Dict(d) => {
            let [key] = indices else {
                return Err(VmError::Argument(
                    "Dict indexing takes exactly one key".to_string(),
                ));
            };
            d.borrow_mut().insert(key.clone(), value);
            Ok(())
        }
        Value::Tuple(_) | Value::NamedTuple(_) | Value::Str(_) | Value::Range(_) => {
            Err(VmError::Method(format!(
                "no method matching setindex!(::{}, …): value is immutable",
                collection.runtime_ty()
            )))
        }
        other => Err(VmError::Method(format!(
            "no method matching setindex!(::{}, …)",
            other.runtime_ty()
        ))),
    }
}

fn integer_indices(indices: &[Value]) -> VmResult<Vec<i64>> {
    indices
        .iter()
        .map(|v| {
            v.as_index().ok_or_else(|| {
                VmError::Argument(format!(
                    "array index must be an integer, got {}",
                    v.runtime_ty()
                ))
            })
        })
        .collect()
}

fn single_index(indices: &[Value]) -> VmResult<i64> {
    let [only] = indices else {
        return Err(VmError::Argument(format!(
            "expected exactly one index, got {}",
            indices.len()
        )));
    };
    only.as_index()
        .ok_or_else(|| VmError::Argument("index must be an integer".to_string()))
}

/// Character at a 1-based codeunit index; the index must land on a
/// valid UTF-8 start.
pub fn string_char_at(s: &str, index: i64) -> VmResult<Value> {
    if index < 1 || index as usize > s.len() {
        return Err(VmError::Bounds {
            indices: vec![index],
            shape: vec![s.len()],
        });
    }
    let byte = index as usize - 1;
    if !s.is_char_boundary(byte) {
        return Err(VmError::Argument(format!(
            "invalid string index {}: not a character boundary",
            index
        )));
    }
    Ok(Value::Char(s[byte..].chars().next().expect("non-empty")))
}

/// `obj.field` across every field-bearing value.
pub fn field_load(types: &TypeTable, object: &Value, field: Symbol) -> VmResult<Value> {
    match object {
        Value::Struct(s) => struct_field(types, s, field),
        Value::MutStruct(s) => struct_field(types, &s.borrow(), field),
        Value::NamedTuple(nt) => nt
            .get_by_name(field)
            .cloned()
            .ok_or(VmError::UndefField(field)),
        Value::Expr(e) => match field.as_str() {
            "head" => Ok(Value::Sym(e.head)),
            "args" => Ok(Value::Array(e.args.clone())),
            _ => Err(VmError::UndefField(field)),
        },
        Value::QuoteNode(inner) => match field.as_str() {
            "value" => Ok((**inner).clone()),
            _ => Err(VmError::UndefField(field)),
        },
        Value::LineNumberNode(n) => match field.as_str() {
            "line" => Ok(Value::I64(n.line)),
            "file" => Ok(n.file.map(Value::Sym).unwrap_or(Value::Nothing)),
            _ => Err(VmError::UndefField(field)),
        },
        Value::GlobalRef(g) => match field.as_str() {
            "mod" => Ok(Value::Sym(g.module)),
            "name" => Ok(Value::Sym(g.name)),
            _ => Err(VmError::UndefField(field)),
        },
        Value::RegexMatch(m) => match field.as_str() {
            "match" => Ok(Value::Str(m.matched.clone())),
            "captures" => Ok(Value::Array(crate::values::new_array_ref(
                crate::values::ArrayValue::from_values(
                    m.captures
                        .iter()
                        .map(|c| match c {
                            Some(s) => Value::Str(s.clone()),
                            None => Value::Nothing,
                        })
                        .collect(),
                    vec![m.captures.len()],
                ),
            ))),
            "offset" => Ok(Value::I64(m.offset)),
            _ => Err(VmError::UndefField(field)),
        },
        Value::Regex(r) => match field.as_str() {
            "pattern" => Ok(Value::str(&r.pattern)),
            _ => Err(VmError::UndefField(field)),
        },
        Value::RefWrap(inner) => match field.as_str() {
            "x" => Ok((**inner).clone()),
            _ => Err(VmError::UndefField(field)),
        },
        other => Err(VmError::Type(format!(
            "cannot access field `{}` of {}",
            field,
            other.runtime_ty()
        ))),
    }
}

fn struct_field(types: &TypeTable, s: &StructInstance, field: Symbol) -> VmResult<Value> {
    let def = types
        .structs
        .get(&s.name)
        .ok_or_else(|| VmError::Internal(format!("unknown struct type {}", s.name)))?;
    let index = def.field_index(field).ok_or(VmError::UndefField(field))?;
    s.get_field(index)
}

/// `obj.field = value`: mutable structs only, honoring the declared
/// field type.
pub fn field_store(
    types: &TypeTable,
    object: &Value,
    field: Symbol,
    value: Value,
) -> VmResult<()> {
    match object {
        Value::MutStruct(s) => {
            let (index, declared) = {
                let inner = s.borrow();
                let def = types.structs.get(&inner.name).ok_or_else(|| {
                    VmError::Internal(format!("unknown struct type {}", inner.name))
                })?;
                let index = def.field_index(field).ok_or(VmError::UndefField(field))?;
                (index, def.fields[index].1.clone())
            };
            let converted = convert_field_value(types, &declared, value, field)?;
            s.borrow_mut().set_field(index, converted)
        }
        Value::Struct(s) => Err(VmError::Type(format!(
            "setfield!: immutable struct of type {} cannot be changed",
            s.name
        ))),
        other => Err(VmError::Type(format!(
            "cannot assign field `{}` of {}",
            field,
            other.runtime_ty()
        ))),
    }
}

/// Check (and cheaply convert) a value against a declared field type.
pub fn convert_field_value(
    types: &TypeTable,
    declared: &Ty,
    value: Value,
    field: Symbol,
) -> VmResult<Value> {
    if matches!(declared, Ty::Any) || types.is_subtype(&value.runtime_ty(), declared) {
        return Ok(value);
    }
    // Numeric cross-assignments convert, as Julia's `convert` would.
    match (declared, &value) {
        (Ty::Float64, v) if v.as_f64().is_some() => Ok(Value::F64(v.as_f64().unwrap())),
        (Ty::Int64, Value::F64(x)) if x.fract() == 0.0 => Ok(Value::I64(*x as i64)),
        (Ty::Int64, v) if v.as_i64().is_some() => Ok(Value::I64(v.as_i64().unwrap())),
        (Ty::Int64, Value::F64(x)) => Err(VmError::Inexact(format!(
            "Int64({}) is not exact",
            x
        ))),
        _ => Err(VmError::Type(format!(
            "cannot assign value of type {} to field `{}` declared as {}",
            value.runtime_ty(),
            field,
            declared
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructDef;
    use crate::values::{new_array_ref, ArrayValue};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tt_with_c() -> TypeTable {
        let mut tt = TypeTable::new();
        tt.define_struct(StructDef {
            name: Symbol::intern("C"),
            params: vec![],
            supertype: Ty::Any,
            fields: vec![(Symbol::intern("n"), Ty::Int64)],
            mutable: true,
        });
        tt
    }

    #[test]
    fn test_array_index_load_store() {
        let tt = TypeTable::new();
        let a = Value::Array(new_array_ref(ArrayValue::from_i64(vec![1, 2, 3], vec![3])));
        assert!(matches!(
            index_load(&tt, &a, &[Value::I64(2)]).unwrap(),
            Value::I64(2)
        ));
        index_store(&a, &[Value::I64(2)], Value::I64(20)).unwrap();
        assert!(matches!(
            index_load(&tt, &a, &[Value::I64(2)]).unwrap(),
            Value::I64(20)
        ));
        assert!(matches!(
            index_load(&tt, &a, &[Value::I64(4)]),
            Err(VmError::Bounds { .. })
        ));
    }

    #[test]
    fn test_tuple_is_immutable() {
        let t = Value::tuple(vec![Value::I64(1)]);
        assert!(matches!(
            index_store(&t, &[Value::I64(1)], Value::I64(2)),
            Err(VmError::Method(_))
        ));
    }

    #[test]
    fn test_string_index_respects_utf8() {
        let s = "añc";
        assert!(matches!(string_char_at(s, 1).unwrap(), Value::Char('a')));
        assert!(matches!(string_char_at(s, 2).unwrap(), Value::Char('ñ')));
        // Byte 3 is inside the two-byte ñ.
        assert!(string_char_at(s, 3).is_err());
        assert!(matches!(string_char_at(s, 4).unwrap(), Value::Char('c')));
    }

    #[test]
    fn test_mutable_struct_field_store_with_conversion() {
        let tt = tt_with_c();
        let c = Value::MutStruct(Rc::new(RefCell::new(StructInstance::new(
            Symbol::intern("C"),
            vec![],
            vec![Value::I64(0)],
        ))));
        field_store(&tt, &c, Symbol::intern("n"), Value::I64(5)).unwrap();
        assert!(matches!(
            field_load(&tt, &c, Symbol::intern("n")).unwrap(),
            Value::I64(5)
        ));
        // Declared Int64: a fractional float is inexact.
        assert!(matches!(
            field_store(&tt, &c, Symbol::intern("n"), Value::F64(1.5)),
            Err(VmError::Inexact(_))
        ));
        // Unknown field.
        assert!(matches!(
            field_load(&tt, &c, Symbol::intern("zzz")),
            Err(VmError::UndefField(_))
        ));
    }
}
