//! Callable values and cooperative tasks.

use std::cell::RefCell;
use std::rc::Rc;

use super::Value;
use crate::error::VmError;
use crate::interner::Symbol;

/// A binding cell. Locals live in cells so closures observe rebinding of
/// captured variables in the enclosing scope.
pub type CellRef = Rc<RefCell<Value>>;

pub fn new_cell(value: Value) -> CellRef {
    Rc::new(RefCell::new(value))
}

/// Handle to a generic function (its method table lives in the VM's
/// registry, keyed by name).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionValue {
    pub name: Symbol,
}

impl FunctionValue {
    pub fn new(name: Symbol) -> Self {
        Self { name }
    }
}

/// An anonymous function or inner function with captured environment.
#[derive(Debug, Clone)]
pub struct ClosureValue {
    /// Display name (`#anon#3` for lambdas).
    pub name: Symbol,
    /// Chunk index of the lowered body.
    pub chunk: usize,
    pub nparams: usize,
    /// Captured binding cells, in the order the chunk's `LoadCaptured`
    /// instructions expect.
    pub captured: Vec<CellRef>,
}

/// Run-to-completion task record. `schedule` executes the function
/// immediately; `wait`/`fetch` surface its stored outcome.
#[derive(Debug, Clone)]
pub struct TaskValue {
    pub func: Value,
    pub state: TaskState,
}

#[derive(Debug, Clone)]
pub enum TaskState {
    Created,
    Done(Value),
    Failed(VmError),
}

impl TaskValue {
    pub fn new(func: Value) -> Self {
        Self {
            func,
            state: TaskState::Created,
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.state, TaskState::Created)
    }
}
