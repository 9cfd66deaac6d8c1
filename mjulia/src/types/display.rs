//! Julia-style rendering of types, used in error messages and `typeof`.

use super::Ty;
use std::fmt;

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Bottom => write!(f, "Union{{}}"),
            Ty::Any => write!(f, "Any"),
            Ty::Bool => write!(f, "Bool"),
            Ty::Int8 => write!(f, "Int8"),
            Ty::Int16 => write!(f, "Int16"),
            Ty::Int32 => write!(f, "Int32"),
            Ty::Int64 => write!(f, "Int64"),
            Ty::Int128 => write!(f, "Int128"),
            Ty::UInt8 => write!(f, "UInt8"),
            Ty::UInt16 => write!(f, "UInt16"),
            Ty::UInt32 => write!(f, "UInt32"),
            Ty::UInt64 => write!(f, "UInt64"),
            Ty::Float16 => write!(f, "Float16"),
            Ty::Float32 => write!(f, "Float32"),
            Ty::Float64 => write!(f, "Float64"),
            Ty::Char => write!(f, "Char"),
            Ty::String => write!(f, "String"),
            Ty::Nothing => write!(f, "Nothing"),
            Ty::Missing => write!(f, "Missing"),
            Ty::Symbol => write!(f, "Symbol"),
            Ty::Expr => write!(f, "Expr"),
            Ty::QuoteNode => write!(f, "QuoteNode"),
            Ty::LineNumberNode => write!(f, "LineNumberNode"),
            Ty::GlobalRef => write!(f, "GlobalRef"),
            Ty::Tuple => write!(f, "Tuple"),
            Ty::TupleOf(elems) => {
                write!(f, "Tuple{{")?;
                for (i, t) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "}}")
            }
            Ty::NamedTuple => write!(f, "NamedTuple"),
            Ty::Array => write!(f, "Array"),
            Ty::VectorOf(e) => write!(f, "Vector{{{}}}", e),
            Ty::MatrixOf(e) => write!(f, "Matrix{{{}}}", e),
            Ty::SubArrayOf(e) => write!(f, "SubArray{{{}}}", e),
            Ty::Dict => write!(f, "Dict"),
            Ty::Set => write!(f, "Set"),
            Ty::UnitRange => write!(f, "UnitRange{{Int64}}"),
            Ty::StepRange => write!(f, "StepRange{{Int64, Int64}}"),
            Ty::StepRangeLen => write!(f, "StepRangeLen{{Float64}}"),
            Ty::LinRange => write!(f, "LinRange{{Float64}}"),
            Ty::Function => write!(f, "Function"),
            Ty::DataType => write!(f, "DataType"),
            Ty::Type => write!(f, "Type"),
            Ty::TypeOf(t) => write!(f, "Type{{{}}}", t),
            Ty::IOBuffer => write!(f, "IOBuffer"),
            Ty::IO => write!(f, "IO"),
            Ty::Task => write!(f, "Task"),
            Ty::Regex => write!(f, "Regex"),
            Ty::RegexMatch => write!(f, "RegexMatch"),
            Ty::Broadcasted => write!(f, "Broadcasted"),
            Ty::Number => write!(f, "Number"),
            Ty::Real => write!(f, "Real"),
            Ty::Integer => write!(f, "Integer"),
            Ty::Signed => write!(f, "Signed"),
            Ty::Unsigned => write!(f, "Unsigned"),
            Ty::AbstractFloat => write!(f, "AbstractFloat"),
            Ty::AbstractString => write!(f, "AbstractString"),
            Ty::AbstractChar => write!(f, "AbstractChar"),
            Ty::AbstractArray => write!(f, "AbstractArray"),
            Ty::AbstractRange => write!(f, "AbstractRange"),
            Ty::AbstractUser(name) => write!(f, "{}", name),
            Ty::Struct { name, params } => {
                write!(f, "{}", name)?;
                if !params.is_empty() {
                    write!(f, "{{")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", p)?;
                    }
                    write!(f, "}}")?;
                }
                Ok(())
            }
            Ty::Union(parts) => {
                write!(f, "Union{{")?;
                for (i, t) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "}}")
            }
            Ty::Var { name, upper } => match upper {
                Some(u) => write!(f, "{}<:{}", name, u),
                None => write!(f, "{}", name),
            },
            Ty::UnionAll { var, upper, body, .. } => match upper {
                Some(u) => write!(f, "{} where {}<:{}", body, var, u),
                None => write!(f, "{} where {}", body, var),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_display() {
        assert_eq!(Ty::VectorOf(Box::new(Ty::Float64)).to_string(), "Vector{Float64}");
        assert_eq!(
            Ty::TupleOf(vec![Ty::Int64, Ty::String]).to_string(),
            "Tuple{Int64, String}"
        );
        assert_eq!(
            Ty::Union(vec![Ty::Int64, Ty::Missing]).to_string(),
            "Union{Int64, Missing}"
        );
        assert_eq!(Ty::TypeOf(Box::new(Ty::Int64)).to_string(), "Type{Int64}");
    }
}
