//! Embedding API: a [`Session`] owns one VM with builtins and the
//! stdlib loaded, and evaluates source strings against it.

use crate::baselib;
use crate::builtins;
use crate::builtins::meta::include_string;
use crate::error::SpannedError;
use crate::values::{display_value, Value};
use crate::vm::{OutputSink, Vm};

pub struct Session {
    pub vm: Vm,
}

impl Session {
    /// A fresh session: builtins registered, stdlib sources loaded.
    pub fn new() -> Result<Session, SpannedError> {
        let mut vm = Vm::new();
        builtins::register_all(&mut vm);
        baselib::load(&mut vm).map_err(|e| SpannedError::new(e, None))?;
        Ok(Session { vm })
    }

    /// Evaluate a source string; returns the last statement's value.
    pub fn eval(&mut self, source: &str) -> Result<Value, SpannedError> {
        self.vm.error_line = None;
        include_string(&mut self.vm, source)
            .map_err(|e| SpannedError::new(e, self.vm.error_line))
    }

    /// Evaluate while capturing `print` output; returns the value and
    /// whatever was printed.
    pub fn eval_capture(&mut self, source: &str) -> (Result<Value, SpannedError>, String) {
        let saved = std::mem::replace(&mut self.vm.out, OutputSink::Buffer(Vec::new()));
        let result = self.eval(source);
        let printed = self.vm.out.take_buffer();
        self.vm.out = saved;
        (result, printed)
    }

    /// Load and evaluate a file.
    pub fn run_file(&mut self, path: &str) -> Result<Value, SpannedError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            SpannedError::new(
                crate::error::VmError::Load {
                    file: path.to_string(),
                    inner: Box::new(crate::error::VmError::Argument(e.to_string())),
                },
                None,
            )
        })?;
        self.eval(&source)
    }
}

/// One-shot: evaluate a string in a fresh session.
pub fn run_str(source: &str) -> Result<Value, SpannedError> {
    Session::new()?.eval(source)
}

/// One-shot with output capture; the value is rendered with `display`.
pub fn run_str_with_output(source: &str) -> (Result<String, SpannedError>, String) {
    match Session::new() {
        Ok(mut session) => {
            let (result, printed) = session.eval_capture(source);
            (result.map(|v| display_value(&v)), printed)
        }
        Err(e) => (Err(e), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_evaluates_arithmetic() {
        let mut s = Session::new().unwrap();
        let v = s.eval("1 + 2 * 3").unwrap();
        assert!(matches!(v, Value::I64(7)));
    }

    #[test]
    fn test_capture_collects_println() {
        let mut s = Session::new().unwrap();
        let (v, out) = s.eval_capture("println(\"hi\"); 42");
        assert!(matches!(v.unwrap(), Value::I64(42)));
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn test_error_reports_kind() {
        let mut s = Session::new().unwrap();
        let err = s.eval("[1, 2][5]").unwrap_err();
        assert_eq!(err.error.kind(), "BoundsError");
    }
}
