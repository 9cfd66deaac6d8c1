//! Materialization: force a lazy broadcast into a concrete value.
//!
//! `materialize` = `copy` for a `Broadcasted`, identity otherwise.
//! `materialize_into` = shape-checked `copyto!`. Copying flattens the
//! tree first, defends against destination aliasing, and takes a typed
//! fast path when the fused function and element types are known
//! numeric; otherwise it fills an `Any` buffer and narrows afterwards.

use std::rc::Rc;

use super::flatten::{flatten, ArgMaker, FlatBroadcast};
use super::shape::{linear_of, newindexer, strides_of, IndexSpace};
use super::style::BroadcastStyle;
use super::BroadcastedValue;
use crate::error::{VmError, VmResult};
use crate::types::{promote_type, Ty};
use crate::values::{
    new_array_ref, ArrayData, ArrayRef, ArrayValue, ElemType, RangeValue, Value,
};
use crate::vm::Vm;

/// `materialize(x)`: force a `Broadcasted`, pass anything else through.
pub fn materialize(vm: &mut Vm, value: &Value) -> VmResult<Value> {
    match value {
        Value::Broadcasted(bc) => copy_broadcast(vm, bc),
        other => Ok(other.clone()),
    }
}

/// `materialize!(dest, x)`: write the broadcast into `dest` after
/// checking shapes.
pub fn materialize_into(vm: &mut Vm, dest: &Value, value: &Value) -> VmResult<Value> {
    let Value::Array(dest_ref) = dest else {
        return Err(VmError::Argument(
            "materialize! destination must be an array".to_string(),
        ));
    };
    match value {
        Value::Broadcasted(bc) => {
            let out_shape = bc.resolve_axes()?;
            let dest_shape = dest_ref.borrow().shape.clone();
            if !shapes_compatible(&dest_shape, &out_shape) {
                return Err(VmError::DimensionMismatch(format!(
                    "destination has shape {:?}, broadcast result has shape {:?}",
                    dest_shape, out_shape
                )));
            }
            let mut flat = flatten(bc);
            unalias(dest_ref, &mut flat);
            copy_into(vm, dest_ref, &flat, &dest_shape)?;
            Ok(dest.clone())
        }
        other => {
            // `dest .= scalar-or-array`
            let dest_shape = dest_ref.borrow().shape.clone();
            if let Some(src_shape) = super::shape::participant_shape(other) {
                let combined =
                    super::shape::broadcast_shape(&[dest_shape.clone(), src_shape.clone()])?;
                if combined != dest_shape {
                    return Err(VmError::DimensionMismatch(format!(
                        "cannot assign a source of shape {:?} into a destination of shape {:?}",
                        src_shape, dest_shape
                    )));
                }
            }
            let mut flat = FlatBroadcast {
                func: Value::Function(crate::values::FunctionValue::new(
                    crate::interner::Symbol::intern("identity"),
                )),
                leaves: vec![other.clone()],
                makers: vec![ArgMaker::Leaf(0)],
            };
            unalias(dest_ref, &mut flat);
            copy_into(vm, dest_ref, &flat, &dest_shape)?;
            Ok(dest.clone())
        }
    }
}

/// Surface `broadcast(f, args…)`: all-scalar calls skip the machinery.
pub fn broadcast_call(vm: &mut Vm, func: &Value, args: &[Value]) -> VmResult<Value> {
    let all_scalar = args
        .iter()
        .all(|a| matches!(super::style::style_of(a), BroadcastStyle::Scalar));
    if all_scalar {
        let unwrapped: Vec<Value> = args
            .iter()
            .map(|a| match a {
                Value::RefWrap(inner) => (**inner).clone(),
                other => other.clone(),
            })
            .collect();
        return vm.call_value(func, &unwrapped);
    }
    let bc = BroadcastedValue::new(func.clone(), args.to_vec());
    copy_broadcast(vm, &bc)
}

/// `copy(bc)`: allocate and fill a fresh output.
pub fn copy_broadcast(vm: &mut Vm, bc: &BroadcastedValue) -> VmResult<Value> {
    let style = bc.resolve_style();
    let out_shape = bc.resolve_axes()?;
    let flat = flatten(bc);

    // All-scalar tree: evaluate once, return the scalar.
    if out_shape.is_empty() {
        let mut scratch = LeafAccessSet::new(&flat.leaves, &[])?;
        return eval_at(vm, &flat, &mut scratch, &[]);
    }

    // Tuple style materializes as a tuple.
    if style == BroadcastStyle::TupleStyle {
        let len = out_shape.first().copied().unwrap_or(0);
        let mut access = LeafAccessSet::new(&flat.leaves, &out_shape)?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(eval_at(vm, &flat, &mut access, &[i])?);
        }
        return Ok(Value::tuple(out));
    }

    if let Some(fast) = try_fast_path(vm, &flat, &out_shape)? {
        return Ok(Value::Array(new_array_ref(fast)));
    }

    let dest = new_array_ref(alloc_output(&flat, &out_shape));
    copy_into(vm, &dest, &flat, &out_shape)?;
    Ok(Value::Array(dest))
}

fn shapes_compatible(dest: &[usize], src: &[usize]) -> bool {
    let n: usize = dest.iter().product();
    let m: usize = src.iter().product();
    if dest == src {
        return true;
    }
    // Trailing singleton dimensions are padding.
    n == m
        && dest
            .iter()
            .zip(src.iter().chain(std::iter::repeat(&1)))
            .all(|(&d, &s)| d == s || s == 1)
}

/// Replace any leaf that shares storage with the destination by a
/// temporary copy, so the loop never reads what it just wrote.
fn unalias(dest: &ArrayRef, flat: &mut FlatBroadcast) {
    for leaf in flat.leaves.iter_mut() {
        let aliased = match leaf {
            Value::Array(a) => Rc::ptr_eq(a, dest),
            Value::SubArray(view) => Rc::ptr_eq(&view.parent, dest),
            _ => false,
        };
        if aliased {
            let copied = match leaf {
                Value::Array(a) => a.borrow().clone(),
                Value::SubArray(view) => {
                    let parent = view.parent.borrow();
                    let values: Vec<Value> = (0..view.length)
                        .map(|i| parent.get_linear(view.offset + i))
                        .collect();
                    ArrayValue::from_values(values, vec![view.length])
                }
                _ => unreachable!(),
            };
            *leaf = Value::Array(new_array_ref(copied));
        }
    }
}

// ── leaf access ───────────────────────────────────────────────────────

enum LeafAccess {
    Scalar(Value),
    Arr {
        arr: ArrayRef,
        keeps: Vec<bool>,
        strides: Vec<usize>,
    },
    View {
        view: Rc<crate::values::SubArrayValue>,
        keep: bool,
    },
    Rng {
        range: RangeValue,
        keep: bool,
    },
    Tup {
        elems: Rc<Vec<Value>>,
        keep: bool,
    },
}

struct LeafAccessSet(Vec<LeafAccess>);

impl LeafAccessSet {
    fn new(leaves: &[Value], out_shape: &[usize]) -> VmResult<Self> {
        let out_ndims = out_shape.len();
        let mut set = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            set.push(match leaf {
                Value::Array(a) => {
                    let shape = a.borrow().shape.clone();
                    let (keeps, _) = newindexer(&shape, out_ndims);
                    LeafAccess::Arr {
                        arr: a.clone(),
                        keeps,
                        strides: strides_of(&shape),
                    }
                }
                Value::SubArray(view) => LeafAccess::View {
                    view: view.clone(),
                    keep: view.length != 1,
                },
                Value::Range(r) => LeafAccess::Rng {
                    range: *r,
                    keep: r.len() != 1,
                },
                Value::Tuple(t) => LeafAccess::Tup {
                    elems: t.clone(),
                    keep: t.len() != 1,
                },
                Value::RefWrap(inner) => LeafAccess::Scalar((**inner).clone()),
                scalar => LeafAccess::Scalar(scalar.clone()),
            });
        }
        Ok(Self(set))
    }

    fn get(&self, leaf: usize, out_index: &[usize]) -> VmResult<Value> {
        Ok(match &self.0[leaf] {
            LeafAccess::Scalar(v) => v.clone(),
            LeafAccess::Arr {
                arr,
                keeps,
                strides,
            } => {
                let mut offset = 0usize;
                for (d, &i) in out_index.iter().enumerate() {
                    if d < strides.len() && keeps[d] {
                        offset += i * strides[d];
                    }
                }
                arr.borrow().get_linear(offset)
            }
            LeafAccess::View { view, keep } => {
                let i = if *keep {
                    out_index.first().copied().unwrap_or(0)
                } else {
                    0
                };
                view.get(i as i64 + 1)?
            }
            LeafAccess::Rng { range, keep } => {
                let i = if *keep {
                    out_index.first().copied().unwrap_or(0)
                } else {
                    0
                };
                range.get(i as i64 + 1)?
            }
            LeafAccess::Tup { elems, keep } => {
                let i = if *keep {
                    out_index.first().copied().unwrap_or(0)
                } else {
                    0
                };
                elems[i].clone()
            }
        })
    }
}

/// Evaluate one output element by reconstructing the fused operands.
fn eval_at(
    vm: &mut Vm,
    flat: &FlatBroadcast,
    access: &mut LeafAccessSet,
    out_index: &[usize],
) -> VmResult<Value> {
    let args = eval_makers(vm, &flat.makers, access, out_index)?;
    vm.call_value(&flat.func, &args)
}

fn eval_makers(
    vm: &mut Vm,
    makers: &[ArgMaker],
    access: &mut LeafAccessSet,
    out_index: &[usize],
) -> VmResult<Vec<Value>> {
    let mut out = Vec::with_capacity(makers.len());
    for maker in makers {
        out.push(match maker {
            ArgMaker::Leaf(i) => access.get(*i, out_index)?,
            ArgMaker::Nested { func, inner } => {
                let args = eval_makers(vm, inner, access, out_index)?;
                vm.call_value(func, &args)?
            }
        });
    }
    Ok(out)
}

// ── output allocation and the general loop ────────────────────────────

/// Element type of a leaf when it is statically known and numeric-ish.
fn leaf_elem_ty(leaf: &Value) -> Option<Ty> {
    match leaf {
        Value::Array(a) => match a.borrow().elem_type() {
            ElemType::Any => None,
            e => Some(e.to_ty()),
        },
        Value::Range(r) => Some(r.elem_ty()),
        Value::Bool(_) => Some(Ty::Bool),
        Value::I64(_) => Some(Ty::Int64),
        Value::F64(_) => Some(Ty::Float64),
        Value::F32(_) => Some(Ty::Float32),
        Value::RefWrap(inner) => leaf_elem_ty(inner),
        _ => None,
    }
}

/// Result element type when the fused function is a known numeric
/// builtin over known element types. An over-approximation: the promoted
/// input type pushed through the operation's result rule.
fn combine_eltypes(flat: &FlatBroadcast) -> Option<ElemType> {
    if !flat.is_simple() {
        return None;
    }
    let name = match &flat.func {
        Value::Function(f) => f.name.as_str(),
        _ => return None,
    };
    let mut eltys = Vec::new();
    for leaf in &flat.leaves {
        eltys.push(leaf_elem_ty(leaf)?);
    }
    let promoted = eltys
        .iter()
        .skip(1)
        .fold(eltys.first()?.clone(), |acc, t| promote_type(&acc, t));
    let out = match name {
        "+" | "-" | "*" | "%" | "÷" | "min" | "max" | "abs" => promoted,
        "/" | "sqrt" | "sin" | "cos" | "tan" | "exp" | "log" | "^" => match promoted {
            Ty::Float32 => Ty::Float32,
            _ => Ty::Float64,
        },
        "==" | "!=" | "<" | "<=" | ">" | ">=" | "!" | "isodd" | "iseven" => Ty::Bool,
        "identity" => promoted,
        _ => return None,
    };
    match out {
        Ty::Int64 => Some(ElemType::I64),
        Ty::Float64 => Some(ElemType::F64),
        Ty::Float32 => Some(ElemType::F64),
        Ty::Bool => Some(ElemType::Bool),
        _ => None,
    }
}

fn alloc_output(flat: &FlatBroadcast, out_shape: &[usize]) -> ArrayValue {
    let len: usize = out_shape.iter().product();
    let elem = combine_eltypes(flat).unwrap_or(ElemType::Any);
    let data = match elem {
        ElemType::I64 => ArrayData::I64(vec![0; len]),
        ElemType::F64 => ArrayData::F64(vec![0.0; len]),
        ElemType::Bool => ArrayData::Bool(vec![false; len]),
        _ => ArrayData::Any(vec![Value::Nothing; len]),
    };
    ArrayValue::new(data, out_shape.to_vec())
}

/// The general `copyto!` loop: walk the output index space, evaluate
/// the fused function, store. Narrows an `Any` buffer afterwards when
/// the results turned out uniform.
fn copy_into(
    vm: &mut Vm,
    dest: &ArrayRef,
    flat: &FlatBroadcast,
    out_shape: &[usize],
) -> VmResult<()> {
    let mut access = LeafAccessSet::new(&flat.leaves, out_shape)?;
    let out_strides = strides_of(out_shape);
    for index in IndexSpace::new(out_shape) {
        let value = eval_at(vm, flat, &mut access, &index)?;
        let offset = linear_of(&index, &out_strides);
        dest.borrow_mut().set_linear(offset, value);
    }
    narrow_any_array(dest);
    Ok(())
}

/// If an `Any` buffer holds a uniform primitive type, convert it to the
/// typed representation.
pub fn narrow_any_array(dest: &ArrayRef) {
    let narrowed = {
        let arr = dest.borrow();
        let ArrayData::Any(values) = &arr.data else {
            return;
        };
        if values.is_empty() {
            None
        } else if values.iter().all(|v| matches!(v, Value::I64(_))) {
            Some(ArrayData::I64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::I64(x) => *x,
                        _ => unreachable!(),
                    })
                    .collect(),
            ))
        } else if values.iter().all(|v| matches!(v, Value::F64(_))) {
            Some(ArrayData::F64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::F64(x) => *x,
                        _ => unreachable!(),
                    })
                    .collect(),
            ))
        } else if values.iter().all(|v| matches!(v, Value::Bool(_))) {
            Some(ArrayData::Bool(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(x) => *x,
                        _ => unreachable!(),
                    })
                    .collect(),
            ))
        } else {
            None
        }
    };
    if let Some(data) = narrowed {
        dest.borrow_mut().data = data;
    }
}

// ── fast paths ────────────────────────────────────────────────────────

/// Specialized loops for the common shapes. Each checks applicability
/// and returns `None` to fall back to the general path. Aliasing never
/// reaches here: `copy` allocates a fresh destination.
fn try_fast_path(
    vm: &mut Vm,
    flat: &FlatBroadcast,
    out_shape: &[usize],
) -> VmResult<Option<ArrayValue>> {
    if !flat.is_simple() {
        return Ok(None);
    }
    let Value::Function(func) = &flat.func else {
        return Ok(None);
    };
    let op: fn(f64, f64) -> f64 = match func.name.as_str() {
        "+" => |a, b| a + b,
        "-" => |a, b| a - b,
        "*" => |a, b| a * b,
        "/" => |a, b| a / b,
        _ => return Ok(None),
    };
    let _ = vm;

    // Same-shape 1-D binary: dest[i] = f(a[i], b[i]). Only for Float64
    // buffers; integer arithmetic keeps its element type on the general
    // path.
    if let [Value::Array(a), Value::Array(b)] = flat.leaves.as_slice() {
        let (a, b) = (a.borrow(), b.borrow());
        if a.elem_type() != ElemType::F64 || b.elem_type() != ElemType::F64 {
            return Ok(None);
        }
        if a.ndims() == 1 && a.shape == b.shape {
            if let (Ok(xs), Ok(ys)) = (a.to_f64_vec(), b.to_f64_vec()) {
                let data: Vec<f64> =
                    xs.iter().zip(&ys).map(|(&x, &y)| op(x, y)).collect();
                return Ok(Some(ArrayValue::from_f64(data, a.shape.clone())));
            }
        }
        // 2-D binary honoring singleton-dimension masks.
        if out_shape.len() == 2 {
            if let (Ok(xs), Ok(ys)) = (a.to_f64_vec(), b.to_f64_vec()) {
                let (keeps_a, _) = newindexer(&a.shape, 2);
                let (keeps_b, _) = newindexer(&b.shape, 2);
                let sa = strides_of(&a.shape);
                let sb = strides_of(&b.shape);
                let (rows, cols) = (out_shape[0], out_shape[1]);
                let mut data = Vec::with_capacity(rows * cols);
                for c in 0..cols {
                    for r in 0..rows {
                        let ia = masked_offset(&[r, c], &keeps_a, &sa);
                        let ib = masked_offset(&[r, c], &keeps_b, &sb);
                        data.push(op(xs[ia], ys[ib]));
                    }
                }
                return Ok(Some(ArrayValue::from_f64(data, vec![rows, cols])));
            }
        }
        return Ok(None);
    }

    // Array-scalar: dest[i] = f(a[i], s) (and the mirrored form).
    match flat.leaves.as_slice() {
        [Value::Array(a), scalar]
            if scalar.as_f64().is_some()
                && a.borrow().elem_type() == ElemType::F64 =>
        {
            let a = a.borrow();
            let s = scalar.as_f64().unwrap();
            if let Ok(xs) = a.to_f64_vec() {
                let data: Vec<f64> = xs.iter().map(|&x| op(x, s)).collect();
                return Ok(Some(ArrayValue::new(
                    ArrayData::F64(data),
                    a.shape.clone(),
                )));
            }
            Ok(None)
        }
        [scalar, Value::Array(a)]
            if scalar.as_f64().is_some()
                && a.borrow().elem_type() == ElemType::F64 =>
        {
            let a = a.borrow();
            let s = scalar.as_f64().unwrap();
            if let Ok(xs) = a.to_f64_vec() {
                let data: Vec<f64> = xs.iter().map(|&x| op(s, x)).collect();
                return Ok(Some(ArrayValue::new(
                    ArrayData::F64(data),
                    a.shape.clone(),
                )));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn masked_offset(index: &[usize], keeps: &[bool], strides: &[usize]) -> usize {
    let mut offset = 0;
    for (d, &i) in index.iter().enumerate() {
        if d < strides.len() && keeps.get(d).copied().unwrap_or(false) {
            offset += i * strides[d];
        }
    }
    offset
}
