//! The tagged runtime value universe.
//!
//! Every value the interpreter touches is a [`Value`]. Immutable scalars
//! are stored inline; containers and mutable records are `Rc`-shared so
//! `===` has reference semantics exactly where Julia gives it reference
//! semantics (arrays, dicts, sets, mutable structs) and structural
//! semantics everywhere else.

pub mod array;
pub mod astval;
pub mod dict;
pub mod display;
pub mod equality;
pub mod func;
pub mod range;
pub mod regexval;
pub mod strukt;

pub use array::{new_array_ref, ArrayData, ArrayRef, ArrayValue, ElemType, SubArrayValue};
pub use astval::{ExprValue, GlobalRefValue, LineNumberNodeValue};
pub use dict::{DictRef, DictValue, SetRef, SetValue};
pub use display::{display_value, show_value};
pub use equality::{hash_value, is_identical, isequal_values, isless_values, julia_eq};
pub use func::{new_cell, CellRef, ClosureValue, FunctionValue, TaskState, TaskValue};
pub use range::RangeValue;
pub use regexval::{RegexMatchValue, RegexValue};
pub use strukt::StructInstance;

use std::cell::RefCell;
use std::rc::Rc;

use crate::broadcast::BroadcastedValue;
use crate::interner::Symbol;
use crate::types::Ty;
use half::f16;

#[derive(Debug, Clone)]
pub enum Value {
    // Signed integers
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    // Unsigned integers
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    // Boolean
    Bool(bool),
    // Floating point
    F16(f16),
    F32(f32),
    F64(f64),
    // Text
    Str(Rc<str>),
    Char(char),
    // Sentinels
    Nothing,
    Missing,
    Undef,
    // Interned identifier
    Sym(Symbol),
    // Aggregates
    Tuple(Rc<Vec<Value>>),
    NamedTuple(Rc<NamedTupleValue>),
    Range(RangeValue),
    Array(ArrayRef),
    SubArray(Rc<SubArrayValue>),
    Struct(Rc<StructInstance>),
    MutStruct(Rc<RefCell<StructInstance>>),
    Dict(DictRef),
    Set(SetRef),
    // Types as values
    Type(Rc<Ty>),
    // Callables
    Function(FunctionValue),
    Closure(Rc<ClosureValue>),
    // AST values
    Expr(Rc<ExprValue>),
    QuoteNode(Rc<Value>),
    LineNumberNode(LineNumberNodeValue),
    GlobalRef(GlobalRefValue),
    // Lazy broadcast
    Broadcasted(Rc<BroadcastedValue>),
    /// `Ref(x)`: scalar shield in broadcast.
    RefWrap(Rc<Value>),
    // Host-backed values
    Regex(Rc<RegexValue>),
    RegexMatch(Rc<RegexMatchValue>),
    Task(Rc<RefCell<TaskValue>>),
    IOBuf(Rc<RefCell<Vec<u8>>>),
}

/// Tuple plus an ordered field-name list.
#[derive(Debug, Clone)]
pub struct NamedTupleValue {
    pub names: Vec<Symbol>,
    pub values: Vec<Value>,
}

impl NamedTupleValue {
    pub fn new(names: Vec<Symbol>, values: Vec<Value>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    pub fn get_by_name(&self, name: Symbol) -> Option<&Value> {
        self.names
            .iter()
            .position(|&n| n == name)
            .map(|i| &self.values[i])
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Sym(Symbol::intern(name))
    }

    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(values))
    }

    pub fn expr(head: Symbol, args: Vec<Value>) -> Value {
        Value::Expr(Rc::new(ExprValue::new(head, args)))
    }

    pub fn ty(t: Ty) -> Value {
        Value::Type(Rc::new(t))
    }

    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value's runtime type, as used for dispatch and `typeof`.
    pub fn runtime_ty(&self) -> Ty {
        match self {
            Value::I8(_) => Ty::Int8,
            Value::I16(_) => Ty::Int16,
            Value::I32(_) => Ty::Int32,
            Value::I64(_) => Ty::Int64,
            Value::I128(_) => Ty::Int128,
            Value::U8(_) => Ty::UInt8,
            Value::U16(_) => Ty::UInt16,
            Value::U32(_) => Ty::UInt32,
            Value::U64(_) => Ty::UInt64,
            Value::Bool(_) => Ty::Bool,
            Value::F16(_) => Ty::Float16,
            Value::F32(_) => Ty::Float32,
            Value::F64(_) => Ty::Float64,
            Value::Str(_) => Ty::String,
            Value::Char(_) => Ty::Char,
            Value::Nothing => Ty::Nothing,
            Value::Missing => Ty::Missing,
            Value::Undef => Ty::Any,
            Value::Sym(_) => Ty::Symbol,
            Value::Tuple(elems) => {
                Ty::TupleOf(elems.iter().map(|v| v.runtime_ty()).collect())
            }
            Value::NamedTuple(_) => Ty::NamedTuple,
            Value::Range(r) => r.ty(),
            Value::Array(a) => {
                let a = a.borrow();
                let elem = a.elem_type().to_ty();
                match a.ndims() {
                    1 => Ty::VectorOf(Box::new(elem)),
                    2 => Ty::MatrixOf(Box::new(elem)),
                    _ => Ty::Array,
                }
            }
            Value::SubArray(view) => Ty::SubArrayOf(Box::new(view.elem_ty())),
            Value::Struct(s) => s.ty(),
            Value::MutStruct(s) => s.borrow().ty(),
            Value::Dict(_) => Ty::Dict,
            Value::Set(_) => Ty::Set,
            Value::Type(t) => Ty::TypeOf(Box::new((**t).clone())),
            Value::Function(_) => Ty::Function,
            Value::Closure(_) => Ty::Function,
            Value::Expr(_) => Ty::Expr,
            Value::QuoteNode(_) => Ty::QuoteNode,
            Value::LineNumberNode(_) => Ty::LineNumberNode,
            Value::GlobalRef(_) => Ty::GlobalRef,
            Value::Broadcasted(_) => Ty::Broadcasted,
            Value::RefWrap(inner) => Ty::Struct {
                name: Symbol::intern("RefValue"),
                params: vec![inner.runtime_ty()],
            },
            Value::Regex(_) => Ty::Regex,
            Value::RegexMatch(_) => Ty::RegexMatch,
            Value::Task(_) => Ty::Task,
            Value::IOBuf(_) => Ty::IOBuffer,
        }
    }

    /// Widen small integers/floats to a common arithmetic form.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::U8(v) => Some(*v as i64),
            Value::U16(v) => Some(*v as i64),
            Value::U32(v) => Some(*v as i64),
            Value::U64(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F16(v) => Some(v.to_f64()),
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Bool(_) => None,
            other => other.as_i64(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::I8(_)
                | Value::I16(_)
                | Value::I32(_)
                | Value::I64(_)
                | Value::I128(_)
                | Value::U8(_)
                | Value::U16(_)
                | Value::U32(_)
                | Value::U64(_)
                | Value::Bool(_)
                | Value::F16(_)
                | Value::F32(_)
                | Value::F64(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_ty_of_scalars() {
        assert_eq!(Value::I64(1).runtime_ty(), Ty::Int64);
        assert_eq!(Value::Bool(true).runtime_ty(), Ty::Bool);
        assert_eq!(Value::str("x").runtime_ty(), Ty::String);
        assert_eq!(Value::Missing.runtime_ty(), Ty::Missing);
    }

    #[test]
    fn test_runtime_ty_of_tuple_is_parametric() {
        let t = Value::tuple(vec![Value::I64(1), Value::F64(2.0)]);
        assert_eq!(t.runtime_ty(), Ty::TupleOf(vec![Ty::Int64, Ty::Float64]));
    }

    #[test]
    fn test_runtime_ty_of_arrays_tracks_dims() {
        let v = Value::Array(new_array_ref(ArrayValue::from_f64(vec![1.0], vec![1])));
        assert_eq!(v.runtime_ty(), Ty::VectorOf(Box::new(Ty::Float64)));
        let m = Value::Array(new_array_ref(ArrayValue::from_f64(
            vec![1.0, 2.0],
            vec![1, 2],
        )));
        assert_eq!(m.runtime_ty(), Ty::MatrixOf(Box::new(Ty::Float64)));
    }

    #[test]
    fn test_type_value_is_singleton_type() {
        let v = Value::ty(Ty::Int64);
        assert_eq!(v.runtime_ty(), Ty::TypeOf(Box::new(Ty::Int64)));
    }

    #[test]
    fn test_bool_is_not_an_index() {
        assert_eq!(Value::Bool(true).as_index(), None);
        assert_eq!(Value::I64(3).as_index(), Some(3));
    }
}
