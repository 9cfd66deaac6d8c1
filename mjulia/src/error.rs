//! Runtime error kinds.
//!
//! Each distinguishable failure the interpreter can raise, carrying a
//! human-readable message. `UserThrow` transports arbitrary thrown
//! values (`throw(x)`, `error("msg")`); every other variant is converted
//! to a catchable exception value at the `catch` boundary.

use crate::interner::Symbol;
use crate::values::Value;

pub type VmResult<T> = Result<T, VmError>;

#[derive(Debug, Clone)]
pub enum VmError {
    /// Out-of-range indexing.
    Bounds {
        indices: Vec<i64>,
        shape: Vec<usize>,
    },
    /// Incompatible shapes (broadcast, matmul, copyto!).
    DimensionMismatch(String),
    Domain(String),
    Divide,
    /// No method matches the call.
    Method(String),
    /// Multiple maximally specific methods match.
    MethodAmbiguity(String),
    UndefVar(Symbol),
    UndefField(Symbol),
    UndefKeyword(Symbol),
    Argument(String),
    Key(String),
    Type(String),
    Inexact(String),
    Overflow(String),
    /// `wait`/`fetch` on a task whose function raised.
    TaskFailed(Box<VmError>),
    Parse(String),
    /// Failure while loading a file, wrapping the underlying error.
    Load {
        file: String,
        inner: Box<VmError>,
    },
    /// A value thrown by user code.
    UserThrow(Value),
    /// Interpreter invariant violation (a bug, not a user error).
    Internal(String),
}

impl VmError {
    /// The Julia-facing exception type name.
    pub fn kind(&self) -> &'static str {
        match self {
            VmError::Bounds { .. } => "BoundsError",
            VmError::DimensionMismatch(_) => "DimensionMismatch",
            VmError::Domain(_) => "DomainError",
            VmError::Divide => "DivideError",
            VmError::Method(_) => "MethodError",
            VmError::MethodAmbiguity(_) => "MethodError",
            VmError::UndefVar(_) => "UndefVarError",
            VmError::UndefField(_) => "UndefFieldError",
            VmError::UndefKeyword(_) => "UndefKeywordError",
            VmError::Argument(_) => "ArgumentError",
            VmError::Key(_) => "KeyError",
            VmError::Type(_) => "TypeError",
            VmError::Inexact(_) => "InexactError",
            VmError::Overflow(_) => "OverflowError",
            VmError::TaskFailed(_) => "TaskFailedException",
            VmError::Parse(_) => "ParseError",
            VmError::Load { .. } => "LoadError",
            VmError::UserThrow(_) => "ErrorException",
            VmError::Internal(_) => "InternalError",
        }
    }
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::Bounds { indices, shape } => write!(
                f,
                "BoundsError: attempt to access array with shape {:?} at index {:?}",
                shape, indices
            ),
            VmError::DimensionMismatch(msg) => write!(f, "DimensionMismatch: {}", msg),
            VmError::Domain(msg) => write!(f, "DomainError: {}", msg),
            VmError::Divide => write!(f, "DivideError: integer division error"),
            VmError::Method(msg) => write!(f, "MethodError: {}", msg),
            VmError::MethodAmbiguity(msg) => {
                write!(f, "MethodError: ambiguous method call: {}", msg)
            }
            VmError::UndefVar(name) => write!(f, "UndefVarError: `{}` not defined", name),
            VmError::UndefField(name) => {
                write!(f, "UndefFieldError: field `{}` is not defined", name)
            }
            VmError::UndefKeyword(name) => write!(
                f,
                "UndefKeywordError: keyword argument `{}` not assigned",
                name
            ),
            VmError::Argument(msg) => write!(f, "ArgumentError: {}", msg),
            VmError::Key(key) => write!(f, "KeyError: key {} not found", key),
            VmError::Type(msg) => write!(f, "TypeError: {}", msg),
            VmError::Inexact(msg) => write!(f, "InexactError: {}", msg),
            VmError::Overflow(msg) => write!(f, "OverflowError: {}", msg),
            VmError::TaskFailed(inner) => write!(f, "TaskFailedException: {}", inner),
            VmError::Parse(msg) => write!(f, "ParseError: {}", msg),
            VmError::Load { file, inner } => {
                write!(f, "LoadError: while loading {}: {}", file, inner)
            }
            VmError::UserThrow(value) => write!(f, "{}", crate::values::display_value(value)),
            VmError::Internal(msg) => write!(f, "InternalError: {}", msg),
        }
    }
}

impl std::error::Error for VmError {}

/// A runtime error paired with its best-effort source line, attached at
/// the API boundary.
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub error: VmError,
    pub line: Option<u32>,
}

impl SpannedError {
    pub fn new(error: VmError, line: Option<u32>) -> Self {
        Self { error, line }
    }
}

impl std::fmt::Display for SpannedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {}", self.error, line),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for SpannedError {}
