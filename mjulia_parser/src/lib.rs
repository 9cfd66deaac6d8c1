//! Parser front end for the mjulia VM.
//!
//! Turns Julia-subset source text into a surface expression tree
//! ([`SynNode`]) shaped like Julia's own `Expr` layer. The VM converts
//! these nodes into runtime `Expr` values, macro-expands, and lowers
//! them; nothing downstream of this crate touches tokens.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use ast::{SynExpr, SynNode};
pub use error::{ParseError, ParseResult};
pub use parser::{parse_expression, parse_program};
pub use span::{SourceMap, Span};
