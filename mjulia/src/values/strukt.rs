//! User struct instances.
//!
//! Immutable structs are shared read-only records (`Rc<StructInstance>`);
//! `mutable struct` instances live behind `Rc<RefCell<..>>` so `===` is
//! pointer identity and field writes are visible through every handle.

use super::Value;
use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::Ty;

#[derive(Debug, Clone)]
pub struct StructInstance {
    pub name: Symbol,
    /// Bound type parameters, e.g. `Point{Float64}` carries `[Float64]`.
    pub params: Vec<Ty>,
    pub fields: Vec<Value>,
}

impl StructInstance {
    pub fn new(name: Symbol, params: Vec<Ty>, fields: Vec<Value>) -> Self {
        Self {
            name,
            params,
            fields,
        }
    }

    pub fn ty(&self) -> Ty {
        Ty::Struct {
            name: self.name,
            params: self.params.clone(),
        }
    }

    pub fn get_field(&self, index: usize) -> VmResult<Value> {
        match self.fields.get(index) {
            Some(Value::Undef) => Err(VmError::UndefField(Symbol::intern(&format!(
                "#{}",
                index + 1
            )))),
            Some(v) => Ok(v.clone()),
            None => Err(VmError::Bounds {
                indices: vec![index as i64 + 1],
                shape: vec![self.fields.len()],
            }),
        }
    }

    pub fn set_field(&mut self, index: usize, value: Value) -> VmResult<()> {
        match self.fields.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::Bounds {
                indices: vec![index as i64 + 1],
                shape: vec![self.fields.len()],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip() {
        let mut s = StructInstance::new(
            Symbol::intern("C"),
            vec![],
            vec![Value::I64(0)],
        );
        s.set_field(0, Value::I64(15)).unwrap();
        assert!(matches!(s.get_field(0).unwrap(), Value::I64(15)));
    }

    #[test]
    fn test_undef_field_read_errors() {
        let s = StructInstance::new(Symbol::intern("C"), vec![], vec![Value::Undef]);
        assert!(matches!(s.get_field(0), Err(VmError::UndefField(_))));
    }

    #[test]
    fn test_out_of_range_field() {
        let mut s = StructInstance::new(Symbol::intern("C"), vec![], vec![]);
        assert!(s.get_field(0).is_err());
        assert!(s.set_field(0, Value::Nothing).is_err());
    }
}
