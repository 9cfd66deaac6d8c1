//! Conversion between raised `VmError`s and the exception values bound
//! by `catch`, plus registration of the builtin exception struct types
//! (`BoundsError`, `DomainError`, …) so `e isa BoundsError` works.

use crate::error::VmError;
use crate::interner::Symbol;
use crate::types::{StructDef, Ty, TypeTable};
use crate::values::{StructInstance, Value};
use std::rc::Rc;

const EXCEPTION_TYPES: &[&str] = &[
    "BoundsError",
    "DimensionMismatch",
    "DomainError",
    "DivideError",
    "MethodError",
    "UndefVarError",
    "UndefFieldError",
    "UndefKeywordError",
    "ArgumentError",
    "KeyError",
    "TypeError",
    "InexactError",
    "OverflowError",
    "TaskFailedException",
    "ParseError",
    "LoadError",
    "ErrorException",
    "InternalError",
];

/// Register the builtin exception structs, each carrying a `msg` field.
pub fn register_exception_types(types: &mut TypeTable) {
    let exception = Symbol::intern("Exception");
    types.define_abstract(exception, Ty::Any);
    for name in EXCEPTION_TYPES {
        types.define_struct(StructDef {
            name: Symbol::intern(name),
            params: vec![],
            supertype: Ty::AbstractUser(exception),
            fields: vec![(Symbol::intern("msg"), Ty::String)],
            mutable: false,
        });
    }
}

/// The value a `catch` binds for a raised error.
pub fn error_to_value(err: &VmError) -> Value {
    if let VmError::UserThrow(value) = err {
        return value.clone();
    }
    let msg = match err {
        VmError::UndefVar(name) => format!("`{}` not defined", name),
        VmError::UndefField(name) => format!("field `{}` is not defined", name),
        VmError::UndefKeyword(name) => format!("keyword argument `{}` not assigned", name),
        other => other.to_string(),
    };
    Value::Struct(Rc::new(StructInstance::new(
        Symbol::intern(err.kind()),
        vec![],
        vec![Value::str(&msg)],
    )))
}

/// Wrap a user string in the `ErrorException` carrier (`error("msg")`).
pub fn error_exception(msg: &str) -> Value {
    Value::Struct(Rc::new(StructInstance::new(
        Symbol::intern("ErrorException"),
        vec![],
        vec![Value::str(msg)],
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_value_carries_kind_and_message() {
        let err = VmError::Divide;
        let value = error_to_value(&err);
        let Value::Struct(s) = value else {
            panic!("expected struct exception value");
        };
        assert_eq!(s.name.as_str(), "DivideError");
        assert!(matches!(&s.fields[0], Value::Str(m) if m.contains("division")));
    }

    #[test]
    fn test_user_throw_passes_value_through() {
        let payload = Value::I64(42);
        let err = VmError::UserThrow(payload.clone());
        assert!(crate::values::is_identical(
            &error_to_value(&err),
            &payload
        ));
    }

    #[test]
    fn test_exception_types_registered_under_exception() {
        let mut tt = TypeTable::new();
        register_exception_types(&mut tt);
        let bounds = Ty::Struct {
            name: Symbol::intern("BoundsError"),
            params: vec![],
        };
        assert!(tt.is_subtype(&bounds, &Ty::AbstractUser(Symbol::intern("Exception"))));
    }
}
