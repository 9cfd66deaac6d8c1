//! Cooperative tasks and the host clock.
//!
//! Scheduling is run-to-completion: `schedule` executes the task's
//! function immediately and records the outcome; `wait`/`fetch` surface
//! it; `yield` is a no-op. `current_task` is documented unsupported and
//! raises rather than inventing a placeholder.

use once_cell::sync::Lazy;
use std::time::Instant;

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::Ty;
use crate::values::{TaskState, Value};
use crate::vm::Vm;

use super::def;

static CLOCK_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

pub fn register(vm: &mut Vm) {
    def(vm, "schedule", &[Ty::Task], schedule_entry);
    def(vm, "wait", &[Ty::Task], wait_entry);
    def(vm, "fetch", &[Ty::Task], fetch_entry);
    def(vm, "istaskdone", &[Ty::Task], |_, _, args, _| {
        let Value::Task(t) = &args[0] else { unreachable!() };
        let done = t.borrow().is_done();
        Ok(Value::Bool(done))
    });
    def(vm, "yield", &[], |_, _, _, _| Ok(Value::Nothing));
    def(vm, "current_task", &[], |_, _, _, _| {
        Err(VmError::Argument(
            "current_task() is not supported in this runtime".to_string(),
        ))
    });

    def(vm, "time_ns", &[], |_, _, _, _| {
        Ok(Value::I64(CLOCK_EPOCH.elapsed().as_nanos() as i64))
    });
    def(vm, "time", &[], |_, _, _, _| {
        Ok(Value::F64(CLOCK_EPOCH.elapsed().as_secs_f64()))
    });
    def(vm, "sleep", &[Ty::Number], |_, _, args, _| {
        let secs = args[0].as_f64().unwrap_or(0.0).max(0.0);
        std::thread::sleep(std::time::Duration::from_secs_f64(secs));
        Ok(Value::Nothing)
    });
}

/// Run the task to completion, recording value or failure.
fn run_task(vm: &mut Vm, task: &Value) -> VmResult<()> {
    let Value::Task(t) = task else {
        return Err(VmError::Type("expected a Task".to_string()));
    };
    if t.borrow().is_done() {
        return Ok(());
    }
    let func = t.borrow().func.clone();
    match vm.call_value(&func, &[]) {
        Ok(value) => t.borrow_mut().state = TaskState::Done(value),
        Err(err) => t.borrow_mut().state = TaskState::Failed(err),
    }
    Ok(())
}

fn schedule_entry(
    vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    run_task(vm, &args[0])?;
    Ok(args[0].clone())
}

fn wait_entry(
    vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    run_task(vm, &args[0])?;
    let Value::Task(t) = &args[0] else { unreachable!() };
    let state = t.borrow().state.clone();
    match state {
        TaskState::Failed(err) => Err(VmError::TaskFailed(Box::new(err))),
        _ => Ok(Value::Nothing),
    }
}

fn fetch_entry(
    vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    run_task(vm, &args[0])?;
    let Value::Task(t) = &args[0] else { unreachable!() };
    let state = t.borrow().state.clone();
    match state {
        TaskState::Done(value) => Ok(value),
        TaskState::Failed(err) => Err(VmError::TaskFailed(Box::new(err))),
        TaskState::Created => Err(VmError::Internal("task did not run".to_string())),
    }
}
