//! Per-activation state: operand stack, local binding cells, and the
//! `try` handler stack.

use crate::error::{VmError, VmResult};
use crate::values::{new_cell, CellRef, Value};

/// An installed `try` handler.
#[derive(Debug, Clone)]
pub struct Handler {
    pub catch_ip: Option<usize>,
    pub finally_ip: Option<usize>,
    /// Operand-stack depth to restore before entering the handler.
    pub stack_depth: usize,
}

#[derive(Debug)]
pub struct Frame {
    /// Local binding cells. Cells (not plain values) so closures can
    /// capture and observe later rebindings.
    pub slots: Vec<CellRef>,
    /// Captured environment (closure activations only).
    pub captured: Vec<CellRef>,
    pub stack: Vec<Value>,
    pub handlers: Vec<Handler>,
    /// The exception bound by the active `catch`, with its original
    /// error for `rethrow`.
    pub current_exception: Option<(VmError, Value)>,
    /// Error saved across an error-path `finally` block.
    pub pending: Option<VmError>,
}

impl Frame {
    pub fn new(nslots: usize, args: Vec<Value>, captured: Vec<CellRef>) -> Self {
        let mut slots = Vec::with_capacity(nslots);
        for arg in args {
            slots.push(new_cell(arg));
        }
        while slots.len() < nslots {
            slots.push(new_cell(Value::Undef));
        }
        Self {
            slots,
            captured,
            stack: Vec::new(),
            handlers: Vec::new(),
            current_exception: None,
            pending: None,
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::Internal("operand stack underflow".to_string()))
    }

    pub fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(VmError::Internal("operand stack underflow".to_string()));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub fn load_slot(&self, index: usize) -> VmResult<Value> {
        let cell = self
            .slots
            .get(index)
            .ok_or_else(|| VmError::Internal(format!("bad slot index {}", index)))?;
        Ok(cell.borrow().clone())
    }

    pub fn store_slot(&mut self, index: usize, value: Value) -> VmResult<()> {
        let cell = self
            .slots
            .get(index)
            .ok_or_else(|| VmError::Internal(format!("bad slot index {}", index)))?;
        *cell.borrow_mut() = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_cells_observe_rebinding() {
        let mut frame = Frame::new(1, vec![Value::I64(1)], vec![]);
        let captured = frame.slots[0].clone();
        frame.store_slot(0, Value::I64(2)).unwrap();
        assert!(matches!(&*captured.borrow(), Value::I64(2)));
    }

    #[test]
    fn test_pop_n_preserves_order() {
        let mut frame = Frame::new(0, vec![], vec![]);
        frame.push(Value::I64(1));
        frame.push(Value::I64(2));
        frame.push(Value::I64(3));
        let popped = frame.pop_n(2).unwrap();
        assert!(matches!(popped[0], Value::I64(2)));
        assert!(matches!(popped[1], Value::I64(3)));
        assert_eq!(frame.stack.len(), 1);
    }

    #[test]
    fn test_underflow_is_internal_error() {
        let mut frame = Frame::new(0, vec![], vec![]);
        assert!(frame.pop().is_err());
    }
}
