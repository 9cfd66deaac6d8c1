//! Subtype checking, specificity, and signature matching.
//!
//! `is_subtype` implements `a <: b` over the builtin hierarchy plus the
//! user-declared supertype links in the [`TypeTable`]. Signature matching
//! additionally extracts type-variable bindings and enforces the diagonal
//! rule: a variable occurring at least twice covariantly (and never
//! invariantly) must bind to a concrete type.

use std::collections::HashMap;

use super::{Ty, TypeParam, TypeTable};
use crate::interner::Symbol;

/// Type-variable bindings extracted while matching a signature.
#[derive(Debug, Clone, Default)]
pub struct Bindings(pub HashMap<Symbol, Ty>);

impl TypeTable {
    /// `a <: b`.
    pub fn is_subtype(&self, a: &Ty, b: &Ty) -> bool {
        if a == b {
            return true;
        }
        if matches!(a, Ty::Bottom) {
            return true;
        }
        // Union distributes on either side.
        if let Ty::Union(parts) = a {
            return parts.iter().all(|t| self.is_subtype(t, b));
        }
        if let Ty::Union(parts) = b {
            return parts.iter().any(|t| self.is_subtype(a, t));
        }
        // Quantifiers: loosen the bound variable to a wildcard with its
        // bound and recurse on the body.
        if let Ty::UnionAll {
            var,
            upper,
            body,
            ..
        } = b
        {
            let loosened = body.substitute(
                *var,
                &Ty::Var {
                    name: *var,
                    upper: upper.clone(),
                },
            );
            return self.is_subtype(a, &loosened);
        }
        if let Ty::UnionAll {
            var,
            upper,
            body,
            ..
        } = a
        {
            let loosened = body.substitute(
                *var,
                &Ty::Var {
                    name: *var,
                    upper: upper.clone(),
                },
            );
            return self.is_subtype(&loosened, b);
        }
        if let Ty::Var { upper, .. } = a {
            let bound = upper.as_deref().cloned().unwrap_or(Ty::Any);
            return self.is_subtype(&bound, b);
        }

        match b {
            Ty::Any => true,
            Ty::Bottom => false,
            Ty::Var { upper, .. } => match upper {
                None => true,
                Some(bound) => self.is_subtype(a, bound),
            },
            Ty::TypeOf(inner) => match a {
                // Type{T} is invariant: Type{Int64} is not <: Type{Number},
                // but it does match a bounded type variable.
                Ty::TypeOf(at) => match inner.as_ref() {
                    Ty::Var { upper, .. } => match upper {
                        None => true,
                        Some(bound) => self.is_subtype(at, bound),
                    },
                    other => at.as_ref() == other,
                },
                _ => false,
            },
            Ty::DataType => matches!(a, Ty::TypeOf(_) | Ty::DataType),
            Ty::Type => matches!(a, Ty::TypeOf(_) | Ty::DataType | Ty::Type),
            Ty::Number => {
                matches!(
                    a,
                    Ty::Bool
                        | Ty::Int8
                        | Ty::Int16
                        | Ty::Int32
                        | Ty::Int64
                        | Ty::Int128
                        | Ty::UInt8
                        | Ty::UInt16
                        | Ty::UInt32
                        | Ty::UInt64
                        | Ty::Float16
                        | Ty::Float32
                        | Ty::Float64
                        | Ty::Integer
                        | Ty::Signed
                        | Ty::Unsigned
                        | Ty::Real
                        | Ty::AbstractFloat
                ) || self.super_chain_reaches(a, b)
            }
            Ty::Real => {
                matches!(
                    a,
                    Ty::Bool
                        | Ty::Int8
                        | Ty::Int16
                        | Ty::Int32
                        | Ty::Int64
                        | Ty::Int128
                        | Ty::UInt8
                        | Ty::UInt16
                        | Ty::UInt32
                        | Ty::UInt64
                        | Ty::Float16
                        | Ty::Float32
                        | Ty::Float64
                        | Ty::Integer
                        | Ty::Signed
                        | Ty::Unsigned
                        | Ty::AbstractFloat
                ) || self.super_chain_reaches(a, b)
            }
            Ty::Integer => matches!(
                a,
                Ty::Bool
                    | Ty::Int8
                    | Ty::Int16
                    | Ty::Int32
                    | Ty::Int64
                    | Ty::Int128
                    | Ty::UInt8
                    | Ty::UInt16
                    | Ty::UInt32
                    | Ty::UInt64
                    | Ty::Signed
                    | Ty::Unsigned
            ),
            Ty::Signed => matches!(
                a,
                Ty::Int8 | Ty::Int16 | Ty::Int32 | Ty::Int64 | Ty::Int128
            ),
            Ty::Unsigned => matches!(a, Ty::UInt8 | Ty::UInt16 | Ty::UInt32 | Ty::UInt64),
            Ty::AbstractFloat => matches!(a, Ty::Float16 | Ty::Float32 | Ty::Float64),
            Ty::AbstractString => matches!(a, Ty::String),
            Ty::AbstractChar => matches!(a, Ty::Char),
            Ty::AbstractRange => matches!(
                a,
                Ty::UnitRange | Ty::StepRange | Ty::StepRangeLen | Ty::LinRange
            ),
            Ty::IO => matches!(a, Ty::IOBuffer),
            Ty::AbstractArray => matches!(
                a,
                Ty::Array | Ty::VectorOf(_) | Ty::MatrixOf(_) | Ty::SubArrayOf(_)
            ),
            Ty::Array => matches!(a, Ty::VectorOf(_) | Ty::MatrixOf(_)),
            Ty::Tuple => matches!(a, Ty::TupleOf(_)),
            Ty::TupleOf(bs) => match a {
                // Tuples are covariant.
                Ty::TupleOf(asv) => {
                    asv.len() == bs.len()
                        && asv.iter().zip(bs).all(|(x, y)| self.is_subtype(x, y))
                }
                _ => false,
            },
            Ty::VectorOf(be) => match a {
                // Arrays are invariant in their element type.
                Ty::VectorOf(ae) => self.invariant_param_ok(ae, be),
                _ => false,
            },
            Ty::MatrixOf(be) => match a {
                Ty::MatrixOf(ae) => self.invariant_param_ok(ae, be),
                _ => false,
            },
            Ty::SubArrayOf(be) => match a {
                Ty::SubArrayOf(ae) => self.invariant_param_ok(ae, be),
                _ => false,
            },
            Ty::Struct {
                name: bn,
                params: bp,
            } => match a {
                Ty::Struct {
                    name: an,
                    params: ap,
                } if an == bn => {
                    // Bare name matches any instantiation (and vice versa).
                    if bp.is_empty() || ap.is_empty() {
                        return true;
                    }
                    ap.len() == bp.len()
                        && ap.iter().zip(bp).all(|(x, y)| self.invariant_param_ok(x, y))
                }
                _ => self.super_chain_reaches(a, b),
            },
            Ty::AbstractUser(_) => self.super_chain_reaches(a, b),
            _ => self.super_chain_reaches(a, b),
        }
    }

    /// Invariant parameter position: equal, or a bounded wildcard.
    fn invariant_param_ok(&self, actual: &Ty, declared: &Ty) -> bool {
        match declared {
            Ty::Var { upper, .. } => match upper {
                None => true,
                Some(bound) => self.is_subtype(actual, bound),
            },
            Ty::Any if matches!(actual, Ty::Any) => true,
            _ => actual == declared,
        }
    }

    /// Walk `a`'s declared supertype chain looking for `b`.
    fn super_chain_reaches(&self, a: &Ty, b: &Ty) -> bool {
        let mut cur = self.declared_super(a);
        let mut fuel = 64;
        while let Some(sup) = cur {
            if fuel == 0 {
                return false;
            }
            fuel -= 1;
            if &sup == b || self.is_subtype(&sup, b) {
                return true;
            }
            cur = self.declared_super(&sup);
        }
        false
    }

    /// Direct supertype in the builtin hierarchy (declared link for user
    /// types). Used by the join computation during dispatch binding.
    pub fn direct_super(&self, ty: &Ty) -> Option<Ty> {
        Some(match ty {
            Ty::Any => return None,
            Ty::Int8 | Ty::Int16 | Ty::Int32 | Ty::Int64 | Ty::Int128 => Ty::Signed,
            Ty::UInt8 | Ty::UInt16 | Ty::UInt32 | Ty::UInt64 => Ty::Unsigned,
            Ty::Bool => Ty::Integer,
            Ty::Signed | Ty::Unsigned => Ty::Integer,
            Ty::Integer => Ty::Real,
            Ty::Float16 | Ty::Float32 | Ty::Float64 => Ty::AbstractFloat,
            Ty::AbstractFloat => Ty::Real,
            Ty::Real => Ty::Number,
            Ty::Number => Ty::Any,
            Ty::String => Ty::AbstractString,
            Ty::Char => Ty::AbstractChar,
            Ty::VectorOf(_) | Ty::MatrixOf(_) => Ty::Array,
            Ty::SubArrayOf(_) | Ty::Array => Ty::AbstractArray,
            Ty::UnitRange | Ty::StepRange | Ty::StepRangeLen | Ty::LinRange => Ty::AbstractRange,
            Ty::IOBuffer => Ty::IO,
            Ty::TupleOf(_) => Ty::Tuple,
            Ty::DataType | Ty::TypeOf(_) => Ty::Type,
            Ty::Struct { .. } | Ty::AbstractUser(_) => {
                return self.declared_super(ty).or(Some(Ty::Any))
            }
            _ => Ty::Any,
        })
    }

    /// Smallest common supertype used to unify repeated type variables.
    pub fn type_join(&self, a: &Ty, b: &Ty) -> Ty {
        if self.is_subtype(a, b) {
            return b.clone();
        }
        if self.is_subtype(b, a) {
            return a.clone();
        }
        let mut cur = a.clone();
        let mut fuel = 64;
        while let Some(sup) = self.direct_super(&cur) {
            if fuel == 0 {
                break;
            }
            fuel -= 1;
            if self.is_subtype(b, &sup) {
                return sup;
            }
            cur = sup;
        }
        Ty::Any
    }

    /// Match argument types against a method's parameter types,
    /// extracting type-variable bindings and enforcing the diagonal rule.
    /// Returns `None` when the signature does not apply.
    pub fn match_signature(
        &self,
        params: &[Ty],
        args: &[Ty],
        where_params: &[TypeParam],
    ) -> Option<Bindings> {
        if params.len() != args.len() {
            return None;
        }
        let mut bindings = Bindings::default();
        for (param, arg) in params.iter().zip(args) {
            if !self.match_one(param, arg, where_params, &mut bindings, false) {
                return None;
            }
        }
        // Diagonal rule: variables occurring ≥2× covariantly and never
        // invariantly must bind to concrete types.
        let sig = Ty::TupleOf(params.to_vec());
        for (name, bound) in &bindings.0 {
            let (cov, inv) = count_var_occurrences(&sig, *name, false);
            if cov >= 2 && inv == 0 && !bound.is_concrete() {
                return None;
            }
        }
        Some(bindings)
    }

    fn match_one(
        &self,
        param: &Ty,
        arg: &Ty,
        where_params: &[TypeParam],
        bindings: &mut Bindings,
        invariant: bool,
    ) -> bool {
        match param {
            Ty::Var { name, upper } => {
                let decl = where_params.iter().find(|p| p.name == *name);
                let upper_bound = decl
                    .and_then(|p| p.upper.clone())
                    .or_else(|| upper.as_deref().cloned());
                if let Some(ub) = &upper_bound {
                    if !self.is_subtype(arg, ub) {
                        return false;
                    }
                }
                if let Some(lb) = decl.and_then(|p| p.lower.clone()) {
                    if !self.is_subtype(&lb, arg) {
                        return false;
                    }
                }
                match bindings.0.get(name) {
                    None => {
                        bindings.0.insert(*name, arg.clone());
                        true
                    }
                    Some(existing) if invariant => existing == arg,
                    Some(existing) => {
                        let joined = self.type_join(existing, arg);
                        if let Some(ub) = &upper_bound {
                            if !self.is_subtype(&joined, ub) {
                                return false;
                            }
                        }
                        bindings.0.insert(*name, joined);
                        true
                    }
                }
            }
            Ty::TypeOf(inner) => {
                let Ty::TypeOf(actual) = arg else {
                    return false;
                };
                match inner.as_ref() {
                    Ty::Var { .. } => {
                        self.match_one(inner, actual, where_params, bindings, true)
                    }
                    other => actual.as_ref() == other,
                }
            }
            Ty::VectorOf(pe) => match arg {
                Ty::VectorOf(ae) => self.match_one(pe, ae, where_params, bindings, true),
                _ => false,
            },
            Ty::MatrixOf(pe) => match arg {
                Ty::MatrixOf(ae) => self.match_one(pe, ae, where_params, bindings, true),
                _ => false,
            },
            Ty::SubArrayOf(pe) => match arg {
                Ty::SubArrayOf(ae) => self.match_one(pe, ae, where_params, bindings, true),
                _ => false,
            },
            Ty::TupleOf(ps) => match arg {
                Ty::TupleOf(asv) if asv.len() == ps.len() => ps
                    .iter()
                    .zip(asv)
                    .all(|(p, a)| self.match_one(p, a, where_params, bindings, invariant)),
                _ => false,
            },
            Ty::Struct {
                name: pn,
                params: pp,
            } => match arg {
                Ty::Struct {
                    name: an,
                    params: ap,
                } if an == pn => {
                    if pp.is_empty() {
                        return true;
                    }
                    if ap.len() != pp.len() {
                        return false;
                    }
                    pp.iter()
                        .zip(ap)
                        .all(|(p, a)| self.match_one(p, a, where_params, bindings, true))
                }
                _ => self.is_subtype(arg, param),
            },
            _ => self.is_subtype(arg, param),
        }
    }
}

/// Count covariant/invariant occurrences of a type variable in a
/// signature, saturating at 2.
fn count_var_occurrences(ty: &Ty, var: Symbol, inside_invariant: bool) -> (u8, u8) {
    let mut cov = 0u8;
    let mut inv = 0u8;
    match ty {
        Ty::Var { name, .. } if *name == var => {
            if inside_invariant {
                inv = 1;
            } else {
                cov = 1;
            }
        }
        Ty::TupleOf(ts) => {
            for t in ts {
                let (c, i) = count_var_occurrences(t, var, inside_invariant);
                cov = cov.saturating_add(c).min(2);
                inv = inv.saturating_add(i).min(2);
            }
        }
        Ty::VectorOf(e) | Ty::MatrixOf(e) | Ty::SubArrayOf(e) | Ty::TypeOf(e) => {
            let (c, i) = count_var_occurrences(e, var, true);
            cov = cov.saturating_add(c).min(2);
            inv = inv.saturating_add(i).min(2);
        }
        Ty::Struct { params, .. } => {
            for t in params {
                let (c, i) = count_var_occurrences(t, var, true);
                cov = cov.saturating_add(c).min(2);
                inv = inv.saturating_add(i).min(2);
            }
        }
        Ty::Union(ts) => {
            for t in ts {
                let (c, i) = count_var_occurrences(t, var, inside_invariant);
                cov = cov.saturating_add(c).min(2);
                inv = inv.saturating_add(i).min(2);
            }
        }
        _ => {}
    }
    (cov, inv)
}

impl Ty {
    /// Specificity tier (higher = more specific). Summed per-parameter by
    /// dispatch scoring; ties there break by registration order.
    pub fn specificity(&self) -> u32 {
        match self {
            Ty::Any => 0,
            Ty::Var { .. } | Ty::Bottom => 0,
            Ty::Union(_) => 1,
            Ty::Number
            | Ty::AbstractString
            | Ty::AbstractChar
            | Ty::AbstractArray
            | Ty::AbstractRange
            | Ty::Function
            | Ty::IO
            | Ty::Type
            | Ty::AbstractUser(_) => 1,
            Ty::Real => 2,
            Ty::Integer | Ty::AbstractFloat => 3,
            Ty::Signed | Ty::Unsigned => 4,
            Ty::TupleOf(elems) => {
                if elems.is_empty() {
                    5
                } else {
                    elems.iter().map(|t| t.specificity()).sum()
                }
            }
            Ty::VectorOf(e) | Ty::MatrixOf(e) | Ty::SubArrayOf(e) => {
                2 + e.specificity().min(3)
            }
            Ty::TypeOf(inner) => {
                if inner.specificity() == 0 {
                    2
                } else {
                    5
                }
            }
            Ty::UnionAll { body, .. } => body.specificity().saturating_sub(1).max(1),
            Ty::Struct { params, .. } => {
                if params.iter().any(|p| matches!(p, Ty::Var { .. })) {
                    4
                } else {
                    5
                }
            }
            _ => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructDef;

    fn tt() -> TypeTable {
        TypeTable::new()
    }

    fn var(name: &str) -> Ty {
        Ty::Var {
            name: Symbol::intern(name),
            upper: None,
        }
    }

    #[test]
    fn test_numeric_tower() {
        let t = tt();
        assert!(t.is_subtype(&Ty::Int64, &Ty::Integer));
        assert!(t.is_subtype(&Ty::Int64, &Ty::Number));
        assert!(t.is_subtype(&Ty::Bool, &Ty::Integer));
        assert!(t.is_subtype(&Ty::Float32, &Ty::AbstractFloat));
        assert!(!t.is_subtype(&Ty::Int64, &Ty::Float64));
        assert!(!t.is_subtype(&Ty::Float64, &Ty::Integer));
    }

    #[test]
    fn test_union_distribution() {
        let t = tt();
        let u = Ty::Union(vec![Ty::Int64, Ty::Float64]);
        assert!(t.is_subtype(&Ty::Int64, &u));
        assert!(t.is_subtype(&u, &Ty::Number));
        assert!(!t.is_subtype(&u, &Ty::Integer));
        assert!(t.is_subtype(&Ty::Bottom, &u));
    }

    #[test]
    fn test_tuple_covariance_array_invariance() {
        let t = tt();
        let tuple_int = Ty::TupleOf(vec![Ty::Int64]);
        let tuple_num = Ty::TupleOf(vec![Ty::Number]);
        assert!(t.is_subtype(&tuple_int, &tuple_num));

        let vec_int = Ty::VectorOf(Box::new(Ty::Int64));
        let vec_num = Ty::VectorOf(Box::new(Ty::Number));
        assert!(!t.is_subtype(&vec_int, &vec_num));
        assert!(t.is_subtype(&vec_int, &Ty::AbstractArray));
    }

    #[test]
    fn test_type_of_is_invariant() {
        let t = tt();
        let ty_int = Ty::TypeOf(Box::new(Ty::Int64));
        let ty_num = Ty::TypeOf(Box::new(Ty::Number));
        assert!(!t.is_subtype(&ty_int, &ty_num));
        assert!(t.is_subtype(&ty_int, &Ty::DataType));
        assert!(t.is_subtype(&ty_int, &Ty::Type));
    }

    #[test]
    fn test_unionall_vector() {
        let t = tt();
        let tsym = Symbol::intern("T");
        let bare_vector = Ty::UnionAll {
            var: tsym,
            lower: None,
            upper: None,
            body: Box::new(Ty::VectorOf(Box::new(var("T")))),
        };
        assert!(t.is_subtype(&Ty::VectorOf(Box::new(Ty::Int64)), &bare_vector));

        let numeric_vector = Ty::UnionAll {
            var: tsym,
            lower: None,
            upper: Some(Box::new(Ty::Number)),
            body: Box::new(Ty::VectorOf(Box::new(Ty::Var {
                name: tsym,
                upper: Some(Box::new(Ty::Number)),
            }))),
        };
        assert!(t.is_subtype(&Ty::VectorOf(Box::new(Ty::Int64)), &numeric_vector));
        assert!(!t.is_subtype(&Ty::VectorOf(Box::new(Ty::String)), &numeric_vector));
    }

    #[test]
    fn test_user_struct_supertype_chain() {
        let mut t = tt();
        let animal = Symbol::intern("Animal");
        let dog = Symbol::intern("Dog");
        t.define_abstract(animal, Ty::Any);
        t.define_struct(StructDef {
            name: dog,
            params: vec![],
            supertype: Ty::AbstractUser(animal),
            fields: vec![],
            mutable: false,
        });
        let dog_ty = Ty::Struct {
            name: dog,
            params: vec![],
        };
        assert!(t.is_subtype(&dog_ty, &Ty::AbstractUser(animal)));
        assert!(t.is_subtype(&dog_ty, &Ty::Any));
        assert!(!t.is_subtype(&Ty::AbstractUser(animal), &dog_ty));
    }

    #[test]
    fn test_diagonal_rule_rejects_mixed_concrete_pair() {
        let t = tt();
        let tp = vec![TypeParam::unbounded(Symbol::intern("T"))];
        let sig = vec![var("T"), var("T")];
        // (Int64, Int64) matches; T = Int64 is concrete.
        assert!(t
            .match_signature(&sig, &[Ty::Int64, Ty::Int64], &tp)
            .is_some());
        // (Int64, Float64) joins to Real, which is not concrete.
        assert!(t
            .match_signature(&sig, &[Ty::Int64, Ty::Float64], &tp)
            .is_none());
    }

    #[test]
    fn test_diagonal_rule_inapplicable_with_invariant_occurrence() {
        let t = tt();
        let tp = vec![TypeParam::unbounded(Symbol::intern("T"))];
        // f(x::T, xs::Vector{T}): T also occurs invariantly, so abstract
        // bindings are allowed — but the invariant position must agree.
        let sig = vec![var("T"), Ty::VectorOf(Box::new(var("T")))];
        assert!(t
            .match_signature(
                &sig,
                &[Ty::Int64, Ty::VectorOf(Box::new(Ty::Int64))],
                &tp
            )
            .is_some());
        assert!(t
            .match_signature(
                &sig,
                &[Ty::Int64, Ty::VectorOf(Box::new(Ty::Float64))],
                &tp
            )
            .is_none());
    }

    #[test]
    fn test_type_var_binding_through_type_of() {
        let t = tt();
        let tp = vec![TypeParam::unbounded(Symbol::intern("T"))];
        let sig = vec![Ty::TypeOf(Box::new(var("T"))), var("T")];
        // convert(::Type{T}, x::T): Type{Int64} binds T = Int64.
        let b = t
            .match_signature(
                &sig,
                &[Ty::TypeOf(Box::new(Ty::Int64)), Ty::Int64],
                &tp,
            )
            .unwrap();
        assert_eq!(b.0.get(&Symbol::intern("T")), Some(&Ty::Int64));
    }

    #[test]
    fn test_specificity_ordering() {
        assert!(Ty::Int64.specificity() > Ty::Integer.specificity());
        assert!(Ty::Integer.specificity() > Ty::Number.specificity());
        assert!(Ty::Number.specificity() > Ty::Any.specificity());
        assert!(
            Ty::TupleOf(vec![Ty::Int64, Ty::Int64]).specificity()
                > Ty::TupleOf(vec![Ty::Int64, Ty::Number]).specificity()
        );
    }

    #[test]
    fn test_type_join() {
        let t = tt();
        assert_eq!(t.type_join(&Ty::Int64, &Ty::Int64), Ty::Int64);
        assert_eq!(t.type_join(&Ty::Int64, &Ty::Float64), Ty::Real);
        assert_eq!(t.type_join(&Ty::Int8, &Ty::Int64), Ty::Signed);
        assert_eq!(t.type_join(&Ty::Int64, &Ty::String), Ty::Any);
    }
}
