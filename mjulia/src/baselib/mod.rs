//! Standard-library source loader.
//!
//! At session startup a curated set of subset-Julia sources is parsed
//! and lowered through the normal pipeline, populating the method
//! table with Pure-Julia methods next to the Rust builtins. Dispatch —
//! not special routing — decides which one a call reaches, so these
//! methods can be shadowed or extended exactly like user code.

use crate::builtins::meta::include_string;
use crate::error::{VmError, VmResult};
use crate::vm::Vm;

const SOURCES: &[(&str, &str)] = &[
    ("base/broadcast.jl", include_str!("base/broadcast.jl")),
    ("base/missing.jl", include_str!("base/missing.jl")),
    ("base/array.jl", include_str!("base/array.jl")),
    ("base/strings.jl", include_str!("base/strings.jl")),
    ("base/linalg.jl", include_str!("base/linalg.jl")),
];

/// Load every embedded stdlib file into the session.
pub fn load(vm: &mut Vm) -> VmResult<()> {
    for (name, source) in SOURCES {
        include_string(vm, source).map_err(|e| VmError::Load {
            file: (*name).to_string(),
            inner: Box::new(e),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    #[test]
    fn test_stdlib_loads_into_fresh_vm() {
        let mut vm = Vm::new();
        builtins::register_all(&mut vm);
        load(&mut vm).expect("stdlib must load");
        // A Pure-Julia method is now dispatchable.
        assert!(vm
            .registry
            .contains(crate::interner::Symbol::intern("clamp")));
    }
}
