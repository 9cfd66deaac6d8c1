//! Array storage: a typed element buffer plus a column-major shape.
//!
//! Element buffers are specialized per element type so the hot indexing
//! paths never box primitives; heterogeneous arrays fall back to the
//! `Any` representation. Arrays are shared mutable values (`ArrayRef`),
//! which is also what gives `===` its reference semantics.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::Value;
use crate::error::{VmError, VmResult};
use crate::types::Ty;

pub type ArrayRef = Rc<RefCell<ArrayValue>>;

pub fn new_array_ref(value: ArrayValue) -> ArrayRef {
    Rc::new(RefCell::new(value))
}

/// Element type tag for specialized storage and instruction selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemType {
    I64,
    F64,
    Bool,
    Char,
    Str,
    Any,
}

impl ElemType {
    pub fn to_ty(self) -> Ty {
        match self {
            ElemType::I64 => Ty::Int64,
            ElemType::F64 => Ty::Float64,
            ElemType::Bool => Ty::Bool,
            ElemType::Char => Ty::Char,
            ElemType::Str => Ty::String,
            ElemType::Any => Ty::Any,
        }
    }

    pub fn from_ty(ty: &Ty) -> ElemType {
        match ty {
            Ty::Int64 => ElemType::I64,
            Ty::Float64 => ElemType::F64,
            Ty::Bool => ElemType::Bool,
            Ty::Char => ElemType::Char,
            Ty::String => ElemType::Str,
            _ => ElemType::Any,
        }
    }
}

/// Typed element buffer.
#[derive(Debug, Clone)]
pub enum ArrayData {
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Char(Vec<char>),
    Str(Vec<Rc<str>>),
    Any(Vec<Value>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::I64(v) => v.len(),
            ArrayData::F64(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Str(v) => v.len(),
            ArrayData::Any(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem_type(&self) -> ElemType {
        match self {
            ArrayData::I64(_) => ElemType::I64,
            ArrayData::F64(_) => ElemType::F64,
            ArrayData::Bool(_) => ElemType::Bool,
            ArrayData::Char(_) => ElemType::Char,
            ArrayData::Str(_) => ElemType::Str,
            ArrayData::Any(_) => ElemType::Any,
        }
    }

    pub fn with_capacity(elem: ElemType, cap: usize) -> ArrayData {
        match elem {
            ElemType::I64 => ArrayData::I64(Vec::with_capacity(cap)),
            ElemType::F64 => ArrayData::F64(Vec::with_capacity(cap)),
            ElemType::Bool => ArrayData::Bool(Vec::with_capacity(cap)),
            ElemType::Char => ArrayData::Char(Vec::with_capacity(cap)),
            ElemType::Str => ArrayData::Str(Vec::with_capacity(cap)),
            ElemType::Any => ArrayData::Any(Vec::with_capacity(cap)),
        }
    }
}

/// An N-dimensional array: typed buffer + column-major shape.
#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub data: ArrayData,
    pub shape: Vec<usize>,
}

impl ArrayValue {
    pub fn new(data: ArrayData, shape: Vec<usize>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { data, shape }
    }

    pub fn empty(elem: ElemType) -> Self {
        Self {
            data: ArrayData::with_capacity(elem, 0),
            shape: vec![0],
        }
    }

    pub fn from_i64(data: Vec<i64>, shape: Vec<usize>) -> Self {
        Self::new(ArrayData::I64(data), shape)
    }

    pub fn from_f64(data: Vec<f64>, shape: Vec<usize>) -> Self {
        Self::new(ArrayData::F64(data), shape)
    }

    pub fn from_values(values: Vec<Value>, shape: Vec<usize>) -> Self {
        Self::new(ArrayData::Any(values), shape)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ndims(&self) -> usize {
        self.shape.len()
    }

    pub fn elem_type(&self) -> ElemType {
        self.data.elem_type()
    }

    pub fn size(&self, dim: usize) -> usize {
        self.shape.get(dim).copied().unwrap_or(1)
    }

    /// Column-major linear offset for 1-based indices, bounds-checked.
    pub fn linear_index(&self, indices: &[i64]) -> VmResult<usize> {
        let oob = || VmError::Bounds {
            indices: indices.to_vec(),
            shape: self.shape.clone(),
        };
        // Linear indexing into any shape with a single index.
        if indices.len() == 1 && self.shape.len() != 1 {
            let i = indices[0];
            if i < 1 || i as usize > self.len() {
                return Err(oob());
            }
            return Ok(i as usize - 1);
        }
        if indices.len() != self.shape.len() {
            return Err(oob());
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (d, &idx) in indices.iter().enumerate() {
            if idx < 1 || idx as usize > self.shape[d] {
                return Err(oob());
            }
            offset += (idx as usize - 1) * stride;
            stride *= self.shape[d];
        }
        Ok(offset)
    }

    /// Read one element (0-based linear offset) as a `Value`.
    pub fn get_linear(&self, offset: usize) -> Value {
        match &self.data {
            ArrayData::I64(v) => Value::I64(v[offset]),
            ArrayData::F64(v) => Value::F64(v[offset]),
            ArrayData::Bool(v) => Value::Bool(v[offset]),
            ArrayData::Char(v) => Value::Char(v[offset]),
            ArrayData::Str(v) => Value::Str(v[offset].clone()),
            ArrayData::Any(v) => v[offset].clone(),
        }
    }

    /// Write one element. Writing a value outside the buffer's element
    /// type widens the buffer to `Any` first, preserving contents.
    pub fn set_linear(&mut self, offset: usize, value: Value) {
        let fits = match (&self.data, &value) {
            (ArrayData::I64(_), Value::I64(_)) => true,
            (ArrayData::F64(_), Value::F64(_)) => true,
            (ArrayData::F64(_), Value::I64(_)) => true,
            (ArrayData::Bool(_), Value::Bool(_)) => true,
            (ArrayData::Char(_), Value::Char(_)) => true,
            (ArrayData::Str(_), Value::Str(_)) => true,
            (ArrayData::Any(_), _) => true,
            _ => false,
        };
        if !fits {
            self.widen_to_any();
        }
        match (&mut self.data, value) {
            (ArrayData::I64(v), Value::I64(x)) => v[offset] = x,
            (ArrayData::F64(v), Value::F64(x)) => v[offset] = x,
            (ArrayData::F64(v), Value::I64(x)) => v[offset] = x as f64,
            (ArrayData::Bool(v), Value::Bool(x)) => v[offset] = x,
            (ArrayData::Char(v), Value::Char(x)) => v[offset] = x,
            (ArrayData::Str(v), Value::Str(x)) => v[offset] = x,
            (ArrayData::Any(v), x) => v[offset] = x,
            _ => unreachable!("widened above"),
        }
    }

    fn widen_to_any(&mut self) {
        let values: Vec<Value> = (0..self.len()).map(|i| self.get_linear(i)).collect();
        self.data = ArrayData::Any(values);
    }

    pub fn push(&mut self, value: Value) {
        match (&mut self.data, &value) {
            (ArrayData::I64(v), Value::I64(x)) => v.push(*x),
            (ArrayData::F64(v), Value::F64(x)) => v.push(*x),
            (ArrayData::F64(v), Value::I64(x)) => v.push(*x as f64),
            (ArrayData::Bool(v), Value::Bool(x)) => v.push(*x),
            (ArrayData::Char(v), Value::Char(x)) => v.push(*x),
            (ArrayData::Str(v), Value::Str(x)) => v.push(x.clone()),
            (ArrayData::Any(v), _) => v.push(value),
            _ => {
                self.widen_to_any();
                if let ArrayData::Any(v) = &mut self.data {
                    v.push(value);
                }
            }
        }
        self.shape = vec![self.len()];
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        let last = self
            .len()
            .checked_sub(1)
            .ok_or_else(|| VmError::Argument("array must be non-empty".to_string()))?;
        let value = self.get_linear(last);
        self.truncate(last);
        Ok(value)
    }

    pub fn insert(&mut self, at: usize, value: Value) {
        self.widen_if_needed(&value);
        match (&mut self.data, value) {
            (ArrayData::I64(v), Value::I64(x)) => v.insert(at, x),
            (ArrayData::F64(v), Value::F64(x)) => v.insert(at, x),
            (ArrayData::F64(v), Value::I64(x)) => v.insert(at, x as f64),
            (ArrayData::Bool(v), Value::Bool(x)) => v.insert(at, x),
            (ArrayData::Char(v), Value::Char(x)) => v.insert(at, x),
            (ArrayData::Str(v), Value::Str(x)) => v.insert(at, x),
            (ArrayData::Any(v), x) => v.insert(at, x),
            _ => unreachable!("widened above"),
        }
        self.shape = vec![self.len()];
    }

    pub fn remove(&mut self, at: usize) -> Value {
        let value = match &mut self.data {
            ArrayData::I64(v) => Value::I64(v.remove(at)),
            ArrayData::F64(v) => Value::F64(v.remove(at)),
            ArrayData::Bool(v) => Value::Bool(v.remove(at)),
            ArrayData::Char(v) => Value::Char(v.remove(at)),
            ArrayData::Str(v) => Value::Str(v.remove(at)),
            ArrayData::Any(v) => v.remove(at),
        };
        self.shape = vec![self.len()];
        value
    }

    fn widen_if_needed(&mut self, value: &Value) {
        let fits = match (&self.data, value) {
            (ArrayData::I64(_), Value::I64(_)) => true,
            (ArrayData::F64(_), Value::F64(_) | Value::I64(_)) => true,
            (ArrayData::Bool(_), Value::Bool(_)) => true,
            (ArrayData::Char(_), Value::Char(_)) => true,
            (ArrayData::Str(_), Value::Str(_)) => true,
            (ArrayData::Any(_), _) => true,
            _ => false,
        };
        if !fits {
            self.widen_to_any();
        }
    }

    fn truncate(&mut self, new_len: usize) {
        match &mut self.data {
            ArrayData::I64(v) => v.truncate(new_len),
            ArrayData::F64(v) => v.truncate(new_len),
            ArrayData::Bool(v) => v.truncate(new_len),
            ArrayData::Char(v) => v.truncate(new_len),
            ArrayData::Str(v) => v.truncate(new_len),
            ArrayData::Any(v) => v.truncate(new_len),
        }
        self.shape = vec![self.len()];
    }

    /// Iterate elements as `Value`s in column-major order.
    pub fn iter_values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |i| self.get_linear(i))
    }

    /// Borrow the f64 buffer, or fail with a type error.
    pub fn try_f64_slice(&self) -> VmResult<&[f64]> {
        match &self.data {
            ArrayData::F64(v) => Ok(v),
            other => Err(VmError::Type(format!(
                "expected Float64 array data, got {:?}",
                other.elem_type()
            ))),
        }
    }

    /// Copy the buffer out as f64, converting integer and bool elements.
    pub fn to_f64_vec(&self) -> VmResult<Vec<f64>> {
        match &self.data {
            ArrayData::F64(v) => Ok(v.clone()),
            ArrayData::I64(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            ArrayData::Bool(v) => Ok(v.iter().map(|&x| x as u8 as f64).collect()),
            other => Err(VmError::Type(format!(
                "cannot convert {:?} array to Float64",
                other.elem_type()
            ))),
        }
    }
}

/// A contiguous 1-D view into a parent vector.
#[derive(Debug, Clone)]
pub struct SubArrayValue {
    pub parent: ArrayRef,
    /// 0-based offset into the parent's linear storage.
    pub offset: usize,
    pub length: usize,
}

impl SubArrayValue {
    pub fn get(&self, index: i64) -> VmResult<Value> {
        if index < 1 || index as usize > self.length {
            return Err(VmError::Bounds {
                indices: vec![index],
                shape: vec![self.length],
            });
        }
        let parent = self.parent.borrow();
        Ok(parent.get_linear(self.offset + index as usize - 1))
    }

    pub fn set(&self, index: i64, value: Value) -> VmResult<()> {
        if index < 1 || index as usize > self.length {
            return Err(VmError::Bounds {
                indices: vec![index],
                shape: vec![self.length],
            });
        }
        let mut parent = self.parent.borrow_mut();
        parent.set_linear(self.offset + index as usize - 1, value);
        Ok(())
    }

    pub fn elem_ty(&self) -> Ty {
        self.parent.borrow().elem_type().to_ty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_index_column_major() {
        // 2×3 matrix: a[2, 1] is the second stored element.
        let m = ArrayValue::from_i64(vec![1, 2, 3, 4, 5, 6], vec![2, 3]);
        assert_eq!(m.linear_index(&[2, 1]).unwrap(), 1);
        assert_eq!(m.linear_index(&[1, 2]).unwrap(), 2);
        assert_eq!(m.linear_index(&[2, 3]).unwrap(), 5);
    }

    #[test]
    fn test_bounds_checked() {
        let a = ArrayValue::from_i64(vec![1, 2, 3], vec![3]);
        assert!(matches!(
            a.linear_index(&[0]),
            Err(VmError::Bounds { .. })
        ));
        assert!(matches!(
            a.linear_index(&[4]),
            Err(VmError::Bounds { .. })
        ));
    }

    #[test]
    fn test_single_index_into_matrix() {
        let m = ArrayValue::from_i64(vec![10, 20, 30, 40], vec![2, 2]);
        assert_eq!(m.linear_index(&[3]).unwrap(), 2);
    }

    #[test]
    fn test_set_widens_to_any() {
        let mut a = ArrayValue::from_i64(vec![1, 2], vec![2]);
        a.set_linear(0, Value::Str("x".into()));
        assert_eq!(a.elem_type(), ElemType::Any);
        assert!(matches!(a.get_linear(1), Value::I64(2)));
    }

    #[test]
    fn test_push_pop() {
        let mut a = ArrayValue::from_f64(vec![1.0], vec![1]);
        a.push(Value::F64(2.0));
        assert_eq!(a.len(), 2);
        assert!(matches!(a.pop().unwrap(), Value::F64(x) if x == 2.0));
        assert_eq!(a.shape, vec![1]);
    }

    #[test]
    fn test_subarray_view_is_shared() {
        let parent = new_array_ref(ArrayValue::from_i64(vec![1, 2, 3, 4], vec![4]));
        let view = SubArrayValue {
            parent: parent.clone(),
            offset: 1,
            length: 2,
        };
        assert!(matches!(view.get(1).unwrap(), Value::I64(2)));
        view.set(2, Value::I64(99)).unwrap();
        assert!(matches!(parent.borrow().get_linear(2), Value::I64(99)));
        assert!(view.get(3).is_err());
    }
}
