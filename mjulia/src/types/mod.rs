//! Julia type hierarchy for the VM.
//!
//! The hierarchy mirrors Julia's type tree:
//! ```text
//! Any
//!  ├── Number
//!  │    ├── Real
//!  │    │    ├── Integer
//!  │    │    │    ├── Signed   → Int8 … Int128 (concrete)
//!  │    │    │    ├── Unsigned → UInt8 … UInt64 (concrete)
//!  │    │    │    └── Bool (concrete)
//!  │    │    └── AbstractFloat → Float16, Float32, Float64 (concrete)
//!  ├── AbstractString → String
//!  ├── AbstractChar   → Char
//!  ├── AbstractArray  → Array (Vector{T}, Matrix{T}), SubArray{T}
//!  ├── AbstractRange  → UnitRange, StepRange, StepRangeLen, LinRange
//!  └── Type           → DataType, Type{T}
//! ```
//!
//! Tuples are covariant, arrays (and user structs) invariant. `Union{}`
//! is `Bottom`. User-defined structs and abstract types carry their
//! declared supertype in the [`TypeTable`], which subtype checks consult.

mod display;
mod promote;
pub mod subtype;

pub use promote::{promote_type, promote_type_all};
pub use subtype::Bindings;

use crate::interner::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    /// `Union{}`: subtype of everything, no instances.
    Bottom,
    Any,

    // Concrete numeric tower
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,

    Char,
    String,
    Nothing,
    Missing,

    // Metaprogramming value types
    Symbol,
    Expr,
    QuoteNode,
    LineNumberNode,
    GlobalRef,

    // Containers
    Tuple,
    TupleOf(Vec<Ty>),
    NamedTuple,
    Array,
    VectorOf(Box<Ty>),
    MatrixOf(Box<Ty>),
    SubArrayOf(Box<Ty>),
    Dict,
    Set,

    // Ranges
    UnitRange,
    StepRange,
    StepRangeLen,
    LinRange,

    // Callables / types-as-values
    Function,
    DataType,
    Type,
    TypeOf(Box<Ty>),

    // Host-backed values
    IOBuffer,
    Task,
    Regex,
    RegexMatch,
    Broadcasted,

    // Abstract tags
    Number,
    Real,
    Integer,
    Signed,
    Unsigned,
    AbstractFloat,
    AbstractString,
    AbstractChar,
    AbstractArray,
    AbstractRange,
    IO,

    /// User-declared abstract type; supertype lives in the [`TypeTable`].
    AbstractUser(Symbol),

    /// User-declared struct, possibly with bound parameters.
    Struct { name: Symbol, params: Vec<Ty> },

    /// Normalized union: flattened, deduplicated, never empty (that is
    /// `Bottom`) and never a singleton (that is the type itself).
    Union(Vec<Ty>),

    /// A type variable occurrence inside a signature, from a `where`
    /// clause.
    Var {
        name: Symbol,
        upper: Option<Box<Ty>>,
    },

    /// `body where lower <: var <: upper`.
    UnionAll {
        var: Symbol,
        lower: Option<Box<Ty>>,
        upper: Option<Box<Ty>>,
        body: Box<Ty>,
    },
}

impl Ty {
    /// Normalize a union: flatten, dedup, collapse degenerate cases.
    pub fn union_of(types: Vec<Ty>) -> Ty {
        let mut flat: Vec<Ty> = Vec::new();
        let mut stack = types;
        stack.reverse();
        while let Some(t) = stack.pop() {
            match t {
                Ty::Union(inner) => {
                    for t in inner.into_iter().rev() {
                        stack.push(t);
                    }
                }
                Ty::Bottom => {}
                Ty::Any => return Ty::Any,
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Ty::Bottom,
            1 => flat.pop().unwrap(),
            _ => Ty::Union(flat),
        }
    }

    /// Resolve a builtin type name (`"Int64"`, `"Number"`, …).
    pub fn builtin(name: &str) -> Option<Ty> {
        Some(match name {
            "Any" => Ty::Any,
            "Bool" => Ty::Bool,
            "Int8" => Ty::Int8,
            "Int16" => Ty::Int16,
            "Int32" => Ty::Int32,
            "Int64" | "Int" => Ty::Int64,
            "Int128" => Ty::Int128,
            "UInt8" => Ty::UInt8,
            "UInt16" => Ty::UInt16,
            "UInt32" => Ty::UInt32,
            "UInt64" | "UInt" => Ty::UInt64,
            "Float16" => Ty::Float16,
            "Float32" => Ty::Float32,
            "Float64" => Ty::Float64,
            "Char" => Ty::Char,
            "String" => Ty::String,
            "Nothing" => Ty::Nothing,
            "Missing" => Ty::Missing,
            "Symbol" => Ty::Symbol,
            "Expr" => Ty::Expr,
            "QuoteNode" => Ty::QuoteNode,
            "LineNumberNode" => Ty::LineNumberNode,
            "GlobalRef" => Ty::GlobalRef,
            "Tuple" => Ty::Tuple,
            "NamedTuple" => Ty::NamedTuple,
            "Array" => Ty::Array,
            // Bare `Vector` is `Vector{T} where T`, so any instantiation
            // is a subtype of it; likewise `Matrix` and `SubArray`.
            "Vector" => wildcard_unionall(Ty::VectorOf),
            "Matrix" => wildcard_unionall(Ty::MatrixOf),
            "SubArray" => wildcard_unionall(Ty::SubArrayOf),
            "Dict" => Ty::Dict,
            "Set" => Ty::Set,
            "UnitRange" => Ty::UnitRange,
            "StepRange" => Ty::StepRange,
            "StepRangeLen" => Ty::StepRangeLen,
            "LinRange" => Ty::LinRange,
            "Function" => Ty::Function,
            "DataType" => Ty::DataType,
            "Type" => Ty::Type,
            "IOBuffer" => Ty::IOBuffer,
            "IO" => Ty::IO,
            "Task" => Ty::Task,
            "Regex" => Ty::Regex,
            "RegexMatch" => Ty::RegexMatch,
            "Broadcasted" => Ty::Broadcasted,
            "Number" => Ty::Number,
            "Real" => Ty::Real,
            "Integer" => Ty::Integer,
            "Signed" => Ty::Signed,
            "Unsigned" => Ty::Unsigned,
            "AbstractFloat" => Ty::AbstractFloat,
            "AbstractString" => Ty::AbstractString,
            "AbstractChar" => Ty::AbstractChar,
            "AbstractArray" => Ty::AbstractArray,
            "AbstractRange" => Ty::AbstractRange,
            // Bare `Union` only ever appears as the head of `Union{…}`;
            // the empty union is its uninstantiated reading.
            "Union" => Ty::Bottom,
            _ => return None,
        })
    }

    /// True for leaf types that can be instantiated.
    pub fn is_concrete(&self) -> bool {
        match self {
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
            | Ty::Char
            | Ty::String
            | Ty::Nothing
            | Ty::Missing
            | Ty::Symbol
            | Ty::Expr
            | Ty::QuoteNode
            | Ty::LineNumberNode
            | Ty::GlobalRef
            | Ty::TupleOf(_)
            | Ty::NamedTuple
            | Ty::VectorOf(_)
            | Ty::MatrixOf(_)
            | Ty::SubArrayOf(_)
            | Ty::Dict
            | Ty::Set
            | Ty::UnitRange
            | Ty::StepRange
            | Ty::StepRangeLen
            | Ty::LinRange
            | Ty::DataType
            | Ty::TypeOf(_)
            | Ty::IOBuffer
            | Ty::Task
            | Ty::Regex
            | Ty::RegexMatch
            | Ty::Broadcasted
            | Ty::Struct { .. } => true,
            _ => false,
        }
    }

    /// Concrete primitive leaves where exact-match dispatch is strongly
    /// preferred over a subtype match (Bool vs Int64 and friends).
    pub fn is_concrete_primitive(&self) -> bool {
        matches!(
            self,
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
                | Ty::Char
                | Ty::String
        )
    }

    /// Substitute a type variable by name.
    pub fn substitute(&self, var: Symbol, replacement: &Ty) -> Ty {
        match self {
            Ty::Var { name, .. } if *name == var => replacement.clone(),
            Ty::VectorOf(e) => Ty::VectorOf(Box::new(e.substitute(var, replacement))),
            Ty::MatrixOf(e) => Ty::MatrixOf(Box::new(e.substitute(var, replacement))),
            Ty::SubArrayOf(e) => Ty::SubArrayOf(Box::new(e.substitute(var, replacement))),
            Ty::TupleOf(ts) => {
                Ty::TupleOf(ts.iter().map(|t| t.substitute(var, replacement)).collect())
            }
            Ty::Union(ts) => {
                Ty::union_of(ts.iter().map(|t| t.substitute(var, replacement)).collect())
            }
            Ty::TypeOf(t) => Ty::TypeOf(Box::new(t.substitute(var, replacement))),
            Ty::Struct { name, params } => Ty::Struct {
                name: *name,
                params: params.iter().map(|t| t.substitute(var, replacement)).collect(),
            },
            Ty::UnionAll {
                var: v,
                lower,
                upper,
                body,
            } => {
                if *v == var {
                    // Shadowed by this quantifier.
                    self.clone()
                } else {
                    Ty::UnionAll {
                        var: *v,
                        lower: lower.clone(),
                        upper: upper.clone(),
                        body: Box::new(body.substitute(var, replacement)),
                    }
                }
            }
            _ => self.clone(),
        }
    }

    /// Instantiate a `UnionAll` with a type argument; identity otherwise.
    pub fn instantiate(&self, arg: &Ty) -> Ty {
        match self {
            Ty::UnionAll { var, body, .. } => body.substitute(*var, arg),
            _ => self.clone(),
        }
    }
}

/// `Ctor{T} where T` with an anonymous variable.
fn wildcard_unionall(ctor: fn(Box<Ty>) -> Ty) -> Ty {
    let var = Symbol::intern("#T");
    Ty::UnionAll {
        var,
        lower: None,
        upper: None,
        body: Box::new(ctor(Box::new(Ty::Var {
            name: var,
            upper: None,
        }))),
    }
}

/// A `where`-clause parameter attached to a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: Symbol,
    pub upper: Option<Ty>,
    pub lower: Option<Ty>,
}

impl TypeParam {
    pub fn unbounded(name: Symbol) -> Self {
        Self {
            name,
            upper: None,
            lower: None,
        }
    }
}

/// Declared shape of a user struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub name: Symbol,
    pub params: Vec<Symbol>,
    pub supertype: Ty,
    pub fields: Vec<(Symbol, Ty)>,
    pub mutable: bool,
}

impl StructDef {
    pub fn field_index(&self, name: Symbol) -> Option<usize> {
        self.fields.iter().position(|(f, _)| *f == name)
    }
}

/// Registry of user-declared types. Subtype checks consult this for the
/// supertype links of structs and user abstract types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    pub structs: HashMap<Symbol, StructDef>,
    pub abstract_supers: HashMap<Symbol, Ty>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_struct(&mut self, def: StructDef) {
        self.structs.insert(def.name, def);
    }

    pub fn define_abstract(&mut self, name: Symbol, supertype: Ty) {
        self.abstract_supers.insert(name, supertype);
    }

    /// The declared supertype of a nominal type, if any.
    pub fn declared_super(&self, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::Struct { name, .. } => self.structs.get(name).map(|d| d.supertype.clone()),
            Ty::AbstractUser(name) => self.abstract_supers.get(name).cloned(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_normalization_flattens_and_dedups() {
        let u = Ty::union_of(vec![
            Ty::Int64,
            Ty::Union(vec![Ty::Float64, Ty::Int64]),
            Ty::Bottom,
        ]);
        assert_eq!(u, Ty::Union(vec![Ty::Int64, Ty::Float64]));
    }

    #[test]
    fn test_union_degenerate_cases() {
        assert_eq!(Ty::union_of(vec![]), Ty::Bottom);
        assert_eq!(Ty::union_of(vec![Ty::Int64]), Ty::Int64);
        assert_eq!(Ty::union_of(vec![Ty::Int64, Ty::Any]), Ty::Any);
    }

    #[test]
    fn test_substitute_in_vector() {
        let t = Symbol::intern("T");
        let vec_t = Ty::VectorOf(Box::new(Ty::Var {
            name: t,
            upper: None,
        }));
        assert_eq!(
            vec_t.substitute(t, &Ty::Int64),
            Ty::VectorOf(Box::new(Ty::Int64))
        );
    }

    #[test]
    fn test_unionall_shadowing() {
        let t = Symbol::intern("T");
        let ua = Ty::UnionAll {
            var: t,
            lower: None,
            upper: None,
            body: Box::new(Ty::Var {
                name: t,
                upper: None,
            }),
        };
        // Substituting the shadowed name leaves the quantifier alone.
        assert_eq!(ua.substitute(t, &Ty::Int64), ua);
    }

    #[test]
    fn test_instantiate_unionall() {
        let t = Symbol::intern("T");
        let ua = Ty::UnionAll {
            var: t,
            lower: None,
            upper: Some(Box::new(Ty::Number)),
            body: Box::new(Ty::VectorOf(Box::new(Ty::Var {
                name: t,
                upper: None,
            }))),
        };
        assert_eq!(
            ua.instantiate(&Ty::Float64),
            Ty::VectorOf(Box::new(Ty::Float64))
        );
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Ty::builtin("Int"), Some(Ty::Int64));
        assert_eq!(Ty::builtin("NoSuchType"), None);
    }
}
