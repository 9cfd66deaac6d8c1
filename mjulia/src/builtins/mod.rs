//! Host-implemented builtins.
//!
//! Builtins are ordinary methods: each registers into the same method
//! tables as user code, with a `Ty` signature, so dispatch — not name
//! switching — decides between a builtin and a stdlib or user method.
//! Guards stay coarse (`Any`, `Number`, `AbstractArray`); a Pure-Julia
//! method with a more specific signature outranks the builtin
//! naturally.

pub mod collections;
pub mod linalg;
pub mod meta;
pub mod numeric;
pub mod regexops;
pub mod strings;
pub mod tasks;

use crate::dispatch::{BuiltinFn, KwParam, Method, MethodBody, Param, VarargSpec};
use crate::interner::Symbol;
use crate::types::Ty;
use crate::vm::Vm;

/// Register every builtin into a fresh VM.
pub fn register_all(vm: &mut Vm) {
    numeric::register(vm);
    collections::register(vm);
    strings::register(vm);
    meta::register(vm);
    linalg::register(vm);
    regexops::register(vm);
    tasks::register(vm);
}

/// Register a fixed-arity builtin method.
pub(crate) fn def(vm: &mut Vm, name: &str, params: &[Ty], f: BuiltinFn) {
    let method = Method {
        params: params
            .iter()
            .enumerate()
            .map(|(i, ty)| Param {
                name: Symbol::intern(&format!("x{}", i + 1)),
                ty: ty.clone(),
            })
            .collect(),
        vararg: None,
        kwparams: Vec::new(),
        kw_vararg: None,
        where_params: Vec::new(),
        body: MethodBody::Builtin(f),
        order: 0,
    };
    vm.registry.add_method(Symbol::intern(name), method);
}

/// Register a builtin with a trailing vararg.
pub(crate) fn def_vararg(vm: &mut Vm, name: &str, fixed: &[Ty], elem: Ty, f: BuiltinFn) {
    let method = Method {
        params: fixed
            .iter()
            .enumerate()
            .map(|(i, ty)| Param {
                name: Symbol::intern(&format!("x{}", i + 1)),
                ty: ty.clone(),
            })
            .collect(),
        vararg: Some(VarargSpec {
            name: Symbol::intern("rest"),
            elem,
        }),
        kwparams: Vec::new(),
        kw_vararg: None,
        where_params: Vec::new(),
        body: MethodBody::Builtin(f),
        order: 0,
    };
    vm.registry.add_method(Symbol::intern(name), method);
}

/// Register a builtin that also accepts declared keywords (handled by
/// the builtin itself from the kwargs slice).
pub(crate) fn def_kw(
    vm: &mut Vm,
    name: &str,
    params: &[Ty],
    kw_names: &[&str],
    f: BuiltinFn,
) {
    let method = Method {
        params: params
            .iter()
            .enumerate()
            .map(|(i, ty)| Param {
                name: Symbol::intern(&format!("x{}", i + 1)),
                ty: ty.clone(),
            })
            .collect(),
        vararg: None,
        kwparams: kw_names
            .iter()
            .map(|n| KwParam {
                name: Symbol::intern(n),
                required: false,
            })
            .collect(),
        kw_vararg: None,
        where_params: Vec::new(),
        body: MethodBody::Builtin(f),
        order: 0,
    };
    vm.registry.add_method(Symbol::intern(name), method);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmResult;
    use crate::values::Value;

    fn probe(
        _vm: &mut Vm,
        _name: Symbol,
        args: &[Value],
        _kw: &[(Symbol, Value)],
    ) -> VmResult<Value> {
        Ok(Value::I64(args.len() as i64))
    }

    #[test]
    fn test_builtins_participate_in_dispatch() {
        let mut vm = Vm::new();
        def(&mut vm, "probe", &[Ty::Int64], probe);
        def_vararg(&mut vm, "probe", &[], Ty::Any, probe);
        let f = Value::Function(crate::values::FunctionValue::new(Symbol::intern(
            "probe",
        )));
        // Fixed arity wins over the vararg.
        let r = vm.call_value(&f, &[Value::I64(1)]).unwrap();
        assert!(matches!(r, Value::I64(1)));
        let r = vm
            .call_value(&f, &[Value::str("a"), Value::str("b")])
            .unwrap();
        assert!(matches!(r, Value::I64(2)));
    }
}
