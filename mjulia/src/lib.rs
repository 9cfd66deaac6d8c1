// Library code never prints to stderr; the CLI binary owns user-facing
// error output.
#![deny(clippy::print_stderr)]

//! mjulia: a Julia-subset interpreter/VM for no-JIT hosts.
//!
//! Source text flows through the parser front end
//! ([`mjulia_parser`]) into first-class `Expr` values, gets
//! macro-expanded and lowered to stack bytecode, and runs on the
//! interpreter with Julia-faithful dispatch, broadcasting, and
//! metaprogramming semantics. See `Session` in [`api`] for the
//! embedding entry point.

pub mod api;
pub mod baselib;
pub mod broadcast;
pub mod builtins;
pub mod dispatch;
pub mod error;
pub mod interner;
pub mod ir;
pub mod lowering;
pub mod types;
pub mod values;
pub mod vm;

pub use api::{run_str, run_str_with_output, Session};
pub use error::{SpannedError, VmError, VmResult};
pub use interner::Symbol;
pub use types::Ty;
pub use values::Value;
pub use vm::Vm;
