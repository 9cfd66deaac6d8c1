//! Generic functions, method tables, and multiple dispatch.
//!
//! Each generic function owns an ordered method list. Dispatch filters
//! by subtype match (with diagonal-rule enforcement in the matcher),
//! scores survivors by specificity, and resolves ties: a strict-subtype
//! signature wins, otherwise the call is ambiguous. Results are cached
//! per argument-type tuple; the cache carries a generation stamp that
//! `add_method` invalidates, so a newly added method can never be
//! shadowed by a stale cache entry.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::subtype::Bindings;
use crate::types::{Ty, TypeParam, TypeTable};
use crate::values::Value;

/// Bonus for an exact match between concrete primitive types, so
/// `f(::Bool)` beats `f(::Integer)` when called with a Bool.
const EXACT_PRIMITIVE_MATCH_BONUS: u32 = 10;
/// Varargs lose one point so fixed-arity methods win head-to-head.
const VARARG_PENALTY: u32 = 1;

/// Host builtin: receives the generic-function name it was invoked
/// through (several operators share one entry), the positional
/// arguments, and the keyword arguments.
pub type BuiltinFn =
    fn(&mut crate::vm::Vm, Symbol, &[Value], &[(Symbol, Value)]) -> VmResult<Value>;

#[derive(Debug, Clone)]
pub enum MethodBody {
    /// Index into the program's chunk table.
    Chunk(usize),
    /// Host-implemented builtin.
    Builtin(BuiltinFn),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Symbol,
    pub ty: Ty,
}

#[derive(Debug, Clone)]
pub struct VarargSpec {
    pub name: Symbol,
    pub elem: Ty,
}

#[derive(Debug, Clone)]
pub struct KwParam {
    pub name: Symbol,
    /// Required keywords have no default; calls that omit them raise
    /// `UndefKeywordError` (from the body prologue).
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub params: Vec<Param>,
    pub vararg: Option<VarargSpec>,
    pub kwparams: Vec<KwParam>,
    /// `kwargs...` catch-all, collected into a NamedTuple.
    pub kw_vararg: Option<Symbol>,
    pub where_params: Vec<TypeParam>,
    pub body: MethodBody,
    /// Registration sequence number, for deterministic tie-breaks.
    pub order: usize,
}

impl Method {
    pub fn param_tys(&self) -> Vec<Ty> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    fn signature_tuple(&self) -> Ty {
        Ty::TupleOf(self.param_tys())
    }
}

/// One generic function: name + ordered methods + dispatch cache.
#[derive(Debug)]
pub struct GenericFn {
    pub name: Symbol,
    pub methods: Vec<Method>,
    cache: RefCell<HashMap<Vec<Ty>, usize>>,
    cache_generation: Cell<u64>,
}

impl GenericFn {
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            methods: Vec::new(),
            cache: RefCell::new(HashMap::new()),
            cache_generation: Cell::new(0),
        }
    }
}

/// All generic functions of a session.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    pub fns: HashMap<Symbol, GenericFn>,
    /// Bumped on every method addition; stale cache entries are
    /// detected by comparing against this.
    pub generation: u64,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: Symbol) -> Option<&GenericFn> {
        self.fns.get(&name)
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.fns.contains_key(&name)
    }

    /// Register a method, replacing an existing one with the same
    /// positional signature. Invalidate every cached pick.
    pub fn add_method(&mut self, name: Symbol, mut method: Method) {
        self.generation += 1;
        let generic = self
            .fns
            .entry(name)
            .or_insert_with(|| GenericFn::new(name));
        method.order = self.generation as usize;
        let same_sig = |existing: &Method| {
            existing.params.len() == method.params.len()
                && existing.vararg.is_some() == method.vararg.is_some()
                && existing
                    .params
                    .iter()
                    .zip(&method.params)
                    .all(|(a, b)| a.ty == b.ty)
        };
        if let Some(pos) = generic.methods.iter().position(same_sig) {
            generic.methods[pos] = method;
        } else {
            generic.methods.push(method);
        }
        generic.cache.borrow_mut().clear();
    }

    /// Number of methods on a generic function.
    pub fn method_count(&self, name: Symbol) -> usize {
        self.fns.get(&name).map_or(0, |g| g.methods.len())
    }

    /// Select the best method for the given argument types.
    pub fn dispatch(
        &self,
        name: Symbol,
        arg_tys: &[Ty],
        types: &TypeTable,
    ) -> VmResult<(usize, Bindings)> {
        let generic = self.fns.get(&name).ok_or_else(|| {
            VmError::Method(format!("no function named `{}`", name))
        })?;

        // Fast path: cached pick, still valid for this generation.
        if generic.cache_generation.get() == self.generation {
            if let Some(&idx) = generic.cache.borrow().get(arg_tys) {
                // Bindings are recomputed; the expensive part was the
                // candidate scan.
                let method = &generic.methods[idx];
                if let Some(b) = self.match_method(method, arg_tys, types) {
                    return Ok((idx, b));
                }
            }
        } else {
            generic.cache.borrow_mut().clear();
            generic.cache_generation.set(self.generation);
        }

        let mut best: Option<(usize, u32, Bindings)> = None;
        let mut tied: Option<usize> = None;
        for (idx, method) in generic.methods.iter().enumerate() {
            let Some(bindings) = self.match_method(method, arg_tys, types) else {
                continue;
            };
            let score = score_method(method, arg_tys);
            match &best {
                None => best = Some((idx, score, bindings)),
                Some((_, best_score, _)) if score > *best_score => {
                    tied = None;
                    best = Some((idx, score, bindings));
                }
                Some((best_idx, best_score, _)) if score == *best_score => {
                    // Equal score: a strictly more specific signature
                    // wins; mutual subtypes fall back to registration
                    // order; otherwise the call is ambiguous.
                    let a = generic.methods[*best_idx].signature_tuple();
                    let b = method.signature_tuple();
                    let a_sub_b = types.is_subtype(&a, &b);
                    let b_sub_a = types.is_subtype(&b, &a);
                    match (a_sub_b, b_sub_a) {
                        (true, false) => {}
                        (false, true) => {
                            tied = None;
                            best = Some((idx, score, bindings));
                        }
                        (true, true) => {} // earlier registration stays
                        (false, false) => tied = Some(idx),
                    }
                }
                _ => {}
            }
        }

        match best {
            None => Err(VmError::Method(format!(
                "no method matching {}({})",
                name,
                arg_tys
                    .iter()
                    .map(|t| format!("::{}", t))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
            Some((idx, _, _)) if tied.is_some() => Err(VmError::MethodAmbiguity(format!(
                "{}({}) matches methods {} and {} with equal specificity",
                name,
                arg_tys
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                idx + 1,
                tied.unwrap() + 1
            ))),
            Some((idx, _, bindings)) => {
                generic.cache.borrow_mut().insert(arg_tys.to_vec(), idx);
                Ok((idx, bindings))
            }
        }
    }

    fn match_method(
        &self,
        method: &Method,
        arg_tys: &[Ty],
        types: &TypeTable,
    ) -> Option<Bindings> {
        let fixed = method.params.len();
        match &method.vararg {
            None => {
                if arg_tys.len() != fixed {
                    return None;
                }
            }
            Some(_) => {
                if arg_tys.len() < fixed {
                    return None;
                }
            }
        }
        let params = method.param_tys();
        let bindings =
            types.match_signature(&params, &arg_tys[..fixed], &method.where_params)?;
        if let Some(vararg) = &method.vararg {
            for extra in &arg_tys[fixed..] {
                if !types.is_subtype(extra, &vararg.elem) {
                    return None;
                }
            }
        }
        Some(bindings)
    }
}

fn score_method(method: &Method, arg_tys: &[Ty]) -> u32 {
    let mut score: u32 = method
        .params
        .iter()
        .map(|p| p.ty.specificity())
        .sum();
    for (param, arg) in method.params.iter().zip(arg_tys) {
        let exact_primitive =
            param.ty.is_concrete_primitive() && arg.is_concrete_primitive() && param.ty == *arg;
        let exact_struct = matches!(
            (&param.ty, arg),
            (
                Ty::Struct { name: a, params: pa },
                Ty::Struct { name: b, params: pb }
            ) if a == b && pa == pb && !pa.is_empty()
        );
        if exact_primitive || exact_struct {
            score += EXACT_PRIMITIVE_MATCH_BONUS;
        }
    }
    if method.vararg.is_some() {
        score = score.saturating_sub(VARARG_PENALTY);
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn method(tys: Vec<Ty>) -> Method {
        Method {
            params: tys
                .into_iter()
                .enumerate()
                .map(|(i, ty)| Param {
                    name: sym(&format!("x{}", i)),
                    ty,
                })
                .collect(),
            vararg: None,
            kwparams: vec![],
            kw_vararg: None,
            where_params: vec![],
            body: MethodBody::Chunk(0),
            order: 0,
        }
    }

    fn var(name: &str) -> Ty {
        Ty::Var {
            name: sym(name),
            upper: None,
        }
    }

    #[test]
    fn test_most_specific_wins() {
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("f");
        reg.add_method(f, method(vec![Ty::Number]));
        reg.add_method(f, method(vec![Ty::Int64]));
        let (idx, _) = reg.dispatch(f, &[Ty::Int64], &tt).unwrap();
        assert_eq!(idx, 1);
        let (idx, _) = reg.dispatch(f, &[Ty::Float64], &tt).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_no_method_is_method_error() {
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("g");
        reg.add_method(f, method(vec![Ty::Int64]));
        assert!(matches!(
            reg.dispatch(f, &[Ty::String], &tt),
            Err(VmError::Method(_))
        ));
    }

    #[test]
    fn test_cross_ambiguity_detected() {
        // f(::Int64, ::Number) vs f(::Number, ::Int64) on (Int64, Int64).
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("amb");
        reg.add_method(f, method(vec![Ty::Int64, Ty::Number]));
        reg.add_method(f, method(vec![Ty::Number, Ty::Int64]));
        assert!(matches!(
            reg.dispatch(f, &[Ty::Int64, Ty::Int64], &tt),
            Err(VmError::MethodAmbiguity(_))
        ));
    }

    #[test]
    fn test_diagonal_rule_in_dispatch() {
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("same_type");
        let mut m = method(vec![var("T"), var("T")]);
        m.where_params = vec![TypeParam::unbounded(sym("T"))];
        reg.add_method(f, m);
        assert!(reg.dispatch(f, &[Ty::Int64, Ty::Int64], &tt).is_ok());
        assert!(matches!(
            reg.dispatch(f, &[Ty::Int64, Ty::Float64], &tt),
            Err(VmError::Method(_))
        ));
    }

    #[test]
    fn test_exact_primitive_beats_subtype_match() {
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("h");
        reg.add_method(f, method(vec![Ty::Int64]));
        reg.add_method(f, method(vec![Ty::Bool]));
        let (idx, _) = reg.dispatch(f, &[Ty::Bool], &tt).unwrap();
        assert_eq!(idx, 1, "Bool argument must pick the Bool method");
    }

    #[test]
    fn test_vararg_matches_but_loses_to_fixed() {
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("v");
        let mut varargs = method(vec![]);
        varargs.vararg = Some(VarargSpec {
            name: sym("xs"),
            elem: Ty::Any,
        });
        reg.add_method(f, varargs);
        reg.add_method(f, method(vec![Ty::Int64]));
        let (idx, _) = reg.dispatch(f, &[Ty::Int64], &tt).unwrap();
        assert_eq!(idx, 1);
        let (idx, _) = reg.dispatch(f, &[Ty::Int64, Ty::Int64], &tt).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_dispatch_cache_and_generation_invalidation() {
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("cached");
        reg.add_method(f, method(vec![Ty::Number]));
        let (idx, _) = reg.dispatch(f, &[Ty::Int64], &tt).unwrap();
        assert_eq!(idx, 0);
        // Adding a more specific method must outrank the cached pick.
        reg.add_method(f, method(vec![Ty::Int64]));
        let (idx, _) = reg.dispatch(f, &[Ty::Int64], &tt).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_specificity_monotone_for_unrelated_call() {
        // Adding a more specific method must not change the pick for a
        // call it does not match.
        let mut reg = MethodRegistry::new();
        let tt = TypeTable::new();
        let f = sym("mono");
        reg.add_method(f, method(vec![Ty::Number]));
        let (before, _) = reg.dispatch(f, &[Ty::Float64], &tt).unwrap();
        reg.add_method(f, method(vec![Ty::Int64]));
        let (after, _) = reg.dispatch(f, &[Ty::Float64], &tt).unwrap();
        assert_eq!(before, after);
    }
}
