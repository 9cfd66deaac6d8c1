//! The interpreter: a stack machine over [`Chunk`]s.
//!
//! Each activation owns a [`Frame`] (operand stack + local cells +
//! handler stack); calls recurse through `run_chunk`. Errors unwind to
//! the nearest installed handler in the current activation, or
//! propagate to the caller's handlers through the `Result` chain.

pub mod access;
pub mod call;
pub mod errorvals;
pub mod frame;

pub use errorvals::{error_exception, error_to_value, register_exception_types};
pub use frame::{Frame, Handler};

use std::collections::HashMap;

use crate::broadcast;
use crate::dispatch::MethodRegistry;
use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::ir::{Const, Instr, Program};
use crate::types::{Ty, TypeTable};
use crate::values::{
    new_array_ref, ArrayValue, CellRef, ClosureValue, ExprValue, NamedTupleValue, RangeValue,
    Value,
};
use std::rc::Rc;

const MAX_CALL_DEPTH: usize = 1_000;

/// Where `print` and friends write.
#[derive(Debug)]
pub enum OutputSink {
    Stdout,
    Buffer(Vec<u8>),
}

impl OutputSink {
    pub fn write(&mut self, text: &str) {
        match self {
            OutputSink::Stdout => {
                use std::io::Write;
                let _ = std::io::stdout().write_all(text.as_bytes());
            }
            OutputSink::Buffer(buf) => buf.extend_from_slice(text.as_bytes()),
        }
    }

    pub fn take_buffer(&mut self) -> String {
        match self {
            OutputSink::Buffer(buf) => String::from_utf8_lossy(&std::mem::take(buf)).into_owned(),
            OutputSink::Stdout => String::new(),
        }
    }
}

/// A user macro: a chunk taking `Expr` arguments, returning an `Expr`.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub chunk: usize,
    pub nparams: usize,
    pub vararg: bool,
}

/// The whole mutable world of one session: program, method tables,
/// globals, user types, and macros.
#[derive(Debug)]
pub struct Vm {
    pub program: Program,
    pub registry: MethodRegistry,
    pub types: TypeTable,
    pub globals: HashMap<Symbol, Value>,
    pub macros: HashMap<Symbol, MacroDef>,
    pub out: OutputSink,
    depth: usize,
    /// Line of the first uncaught error, for host reporting.
    pub error_line: Option<u32>,
}

enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

impl Vm {
    pub fn new() -> Self {
        let mut types = TypeTable::new();
        register_exception_types(&mut types);
        Self {
            program: Program::default(),
            registry: MethodRegistry::new(),
            types,
            globals: HashMap::new(),
            macros: HashMap::new(),
            out: OutputSink::Stdout,
            depth: 0,
            error_line: None,
        }
    }

    /// Execute a chunk to completion. `args` fill the leading slots;
    /// `captured` is the closure environment (empty otherwise).
    pub fn run_chunk(
        &mut self,
        chunk: usize,
        args: Vec<Value>,
        captured: Vec<CellRef>,
    ) -> VmResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(VmError::Internal("call depth limit exceeded".to_string()));
        }
        self.depth += 1;
        let result = self.run_chunk_inner(chunk, args, captured);
        self.depth -= 1;
        result
    }

    fn run_chunk_inner(
        &mut self,
        chunk: usize,
        args: Vec<Value>,
        captured: Vec<CellRef>,
    ) -> VmResult<Value> {
        let nslots = self.program.chunks[chunk].nslots.max(args.len());
        let code_len = self.program.chunks[chunk].code.len();
        let mut frame = Frame::new(nslots, args, captured);
        let mut ip = 0usize;
        loop {
            if ip >= code_len {
                return Ok(frame.stack.pop().unwrap_or(Value::Nothing));
            }
            let instr = self.program.chunks[chunk].code[ip].clone();
            match self.exec_instr(&instr, &mut frame, chunk) {
                Ok(Flow::Next) => ip += 1,
                Ok(Flow::Jump(target)) => ip = target,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(err) => {
                    // Unwind to the innermost handler in this
                    // activation, or out to the caller.
                    let mut target = None;
                    while let Some(handler) = frame.handlers.pop() {
                        frame.stack.truncate(handler.stack_depth);
                        if let Some(catch_ip) = handler.catch_ip {
                            frame.current_exception =
                                Some((err.clone(), error_to_value(&err)));
                            target = Some(catch_ip);
                            break;
                        }
                        if let Some(finally_ip) = handler.finally_ip {
                            frame.pending = Some(err.clone());
                            target = Some(finally_ip);
                            break;
                        }
                    }
                    match target {
                        Some(t) => ip = t,
                        None => {
                            if self.error_line.is_none() {
                                self.error_line = self.program.chunks[chunk].line_at(ip);
                            }
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    fn exec_instr(&mut self, instr: &Instr, frame: &mut Frame, chunk: usize) -> VmResult<Flow> {
        match instr {
            Instr::Nop => {}
            Instr::ConstLoad(c) => frame.push(const_value(c)),
            Instr::LocalLoad(slot) => {
                let value = frame.load_slot(*slot as usize)?;
                if matches!(value, Value::Undef) {
                    let name = self.program.chunks[chunk]
                        .slot_names
                        .get(*slot as usize)
                        .copied()
                        .unwrap_or_else(|| Symbol::intern("?"));
                    return Err(VmError::UndefVar(name));
                }
                frame.push(value);
            }
            Instr::LocalStore(slot) => {
                let value = frame.pop()?;
                frame.store_slot(*slot as usize, value)?;
            }
            Instr::LocalIsUndef(slot) => {
                let undef = matches!(frame.load_slot(*slot as usize)?, Value::Undef);
                frame.push(Value::Bool(undef));
            }
            Instr::CapturedLoad(index) => {
                let cell = frame
                    .captured
                    .get(*index as usize)
                    .ok_or_else(|| VmError::Internal("bad capture index".to_string()))?;
                let value = cell.borrow().clone();
                frame.push(value);
            }
            Instr::CapturedStore(index) => {
                let value = frame.pop()?;
                let cell = frame
                    .captured
                    .get(*index as usize)
                    .ok_or_else(|| VmError::Internal("bad capture index".to_string()))?;
                *cell.borrow_mut() = value;
            }
            Instr::GlobalLoad(name) => {
                let value = self.resolve_global(*name)?;
                frame.push(value);
            }
            Instr::GlobalStore(name) => {
                let value = frame.pop()?;
                self.globals.insert(*name, value);
            }

            // ── typed arithmetic ──────────────────────────────────────
            Instr::AddI64 => self.int_binop(frame, "+", |a, b| Ok(a.wrapping_add(b)))?,
            Instr::SubI64 => self.int_binop(frame, "-", |a, b| Ok(a.wrapping_sub(b)))?,
            Instr::MulI64 => self.int_binop(frame, "*", |a, b| Ok(a.wrapping_mul(b)))?,
            Instr::ModI64 => self.int_binop(frame, "%", |a, b| {
                if b == 0 {
                    Err(VmError::Divide)
                } else {
                    Ok(a.wrapping_rem(b))
                }
            })?,
            Instr::IntDivI64 => self.int_binop(frame, "÷", |a, b| {
                if b == 0 {
                    Err(VmError::Divide)
                } else {
                    Ok(a.wrapping_div(b))
                }
            })?,
            Instr::NegI64 => {
                let a = frame.pop()?;
                match a {
                    Value::I64(x) => frame.push(Value::I64(x.wrapping_neg())),
                    other => {
                        let r = self.call_generic(Symbol::intern("-"), &[other], &[])?;
                        frame.push(r);
                    }
                }
            }
            Instr::AddF64 => self.float_binop(frame, "+", |a, b| a + b)?,
            Instr::SubF64 => self.float_binop(frame, "-", |a, b| a - b)?,
            Instr::MulF64 => self.float_binop(frame, "*", |a, b| a * b)?,
            Instr::DivF64 => self.float_binop(frame, "/", |a, b| a / b)?,
            Instr::PowF64 => self.float_binop(frame, "^", |a, b| a.powf(b))?,
            Instr::NegF64 => {
                let a = frame.pop()?;
                match a {
                    Value::F64(x) => frame.push(Value::F64(-x)),
                    other => {
                        let r = self.call_generic(Symbol::intern("-"), &[other], &[])?;
                        frame.push(r);
                    }
                }
            }
            Instr::LtI64 => self.int_cmp(frame, "<", |a, b| a < b)?,
            Instr::LeI64 => self.int_cmp(frame, "<=", |a, b| a <= b)?,
            Instr::GtI64 => self.int_cmp(frame, ">", |a, b| a > b)?,
            Instr::GeI64 => self.int_cmp(frame, ">=", |a, b| a >= b)?,
            Instr::EqI64 => self.int_cmp(frame, "==", |a, b| a == b)?,
            Instr::NeI64 => self.int_cmp(frame, "!=", |a, b| a != b)?,
            Instr::LtF64 => self.float_cmp(frame, "<", |a, b| a < b)?,
            Instr::LeF64 => self.float_cmp(frame, "<=", |a, b| a <= b)?,
            Instr::GtF64 => self.float_cmp(frame, ">", |a, b| a > b)?,
            Instr::GeF64 => self.float_cmp(frame, ">=", |a, b| a >= b)?,
            Instr::EqF64 => self.float_cmp(frame, "==", |a, b| a == b)?,
            Instr::NeF64 => self.float_cmp(frame, "!=", |a, b| a != b)?,
            Instr::I64ToF64 => {
                let a = frame.pop()?;
                match a {
                    Value::I64(x) => frame.push(Value::F64(x as f64)),
                    other => frame.push(other),
                }
            }
            Instr::NotBool => {
                let a = frame.pop()?;
                match a {
                    Value::Bool(b) => frame.push(Value::Bool(!b)),
                    other => {
                        return Err(VmError::Type(format!(
                            "non-boolean ({}) used with !",
                            other.runtime_ty()
                        )))
                    }
                }
            }

            // ── indexing and fields ───────────────────────────────────
            Instr::IndexLoad(n) => {
                let indices = frame.pop_n(*n as usize)?;
                let collection = frame.pop()?;
                let value = access::index_load(&self.types, &collection, &indices)?;
                frame.push(value);
            }
            Instr::IndexStore(n) => {
                let value = frame.pop()?;
                let indices = frame.pop_n(*n as usize)?;
                let collection = frame.pop()?;
                access::index_store(&collection, &indices, value.clone())?;
                frame.push(value);
            }
            Instr::FieldLoad(field) => {
                let object = frame.pop()?;
                let value = access::field_load(&self.types, &object, *field)?;
                frame.push(value);
            }
            Instr::FieldStore(field) => {
                let value = frame.pop()?;
                let object = frame.pop()?;
                access::field_store(&self.types, &object, *field, value.clone())?;
                frame.push(value);
            }

            // ── calls ─────────────────────────────────────────────────
            Instr::Call(argc) => {
                let args = frame.pop_n(*argc as usize)?;
                let callee = frame.pop()?;
                let result = self.call_value(&callee, &args)?;
                frame.push(result);
            }
            Instr::CallKw { argc, kw_names } => {
                let kw_values = frame.pop_n(kw_names.len())?;
                let args = frame.pop_n(*argc as usize)?;
                let callee = frame.pop()?;
                let kwargs: Vec<(Symbol, Value)> =
                    kw_names.iter().copied().zip(kw_values).collect();
                let result = self.call_with_kw(&callee, &args, &kwargs)?;
                frame.push(result);
            }
            Instr::CallSplat { argc, splat_mask } => {
                let raw = frame.pop_n(*argc as usize)?;
                let callee = frame.pop()?;
                let args = expand_splats(raw, splat_mask)?;
                let result = self.call_value(&callee, &args)?;
                frame.push(result);
            }
            Instr::CallKwSplat {
                argc,
                splat_mask,
                kw_names,
                kw_splat_mask,
            } => {
                let kw_values = frame.pop_n(kw_names.len())?;
                let raw = frame.pop_n(*argc as usize)?;
                let callee = frame.pop()?;
                let args = expand_splats(raw, splat_mask)?;
                let mut kwargs: Vec<(Symbol, Value)> = Vec::new();
                for ((name, value), is_splat) in
                    kw_names.iter().copied().zip(kw_values).zip(kw_splat_mask)
                {
                    if *is_splat {
                        match value {
                            Value::NamedTuple(nt) => {
                                for (n, v) in nt.names.iter().zip(nt.values.iter()) {
                                    kwargs.push((*n, v.clone()));
                                }
                            }
                            other => {
                                return Err(VmError::Argument(format!(
                                    "cannot splat {} as keyword arguments",
                                    other.runtime_ty()
                                )))
                            }
                        }
                    } else {
                        kwargs.push((name, value));
                    }
                }
                let result = self.call_with_kw(&callee, &args, &kwargs)?;
                frame.push(result);
            }

            // ── control flow ──────────────────────────────────────────
            Instr::Branch(target) => return Ok(Flow::Jump(*target as usize)),
            Instr::BranchIf(target) => {
                if self.pop_condition(frame)? {
                    return Ok(Flow::Jump(*target as usize));
                }
            }
            Instr::BranchIfNot(target) => {
                if !self.pop_condition(frame)? {
                    return Ok(Flow::Jump(*target as usize));
                }
            }
            Instr::Return => {
                let value = frame.stack.pop().unwrap_or(Value::Nothing);
                return Ok(Flow::Return(value));
            }

            // ── constructors ──────────────────────────────────────────
            Instr::MakeTuple(n) => {
                let elems = frame.pop_n(*n as usize)?;
                frame.push(Value::tuple(elems));
            }
            Instr::MakeNamedTuple(names) => {
                let values = frame.pop_n(names.len())?;
                frame.push(Value::NamedTuple(Rc::new(NamedTupleValue::new(
                    names.clone(),
                    values,
                ))));
            }
            Instr::MakeArray { count, shape } => {
                let elems = frame.pop_n(*count as usize)?;
                frame.push(make_array_literal(elems, shape.clone())?);
            }
            Instr::MakeRange { has_step } => {
                let stop = frame.pop()?;
                let step = if *has_step { Some(frame.pop()?) } else { None };
                let start = frame.pop()?;
                frame.push(make_range(&start, step.as_ref(), &stop)?);
            }
            Instr::MakeClosure {
                chunk: target,
                captures,
                nparams,
                name,
            } => {
                let cells: Vec<CellRef> = captures
                    .iter()
                    .map(|&slot| frame.slots[slot as usize].clone())
                    .collect();
                frame.push(Value::Closure(Rc::new(ClosureValue {
                    name: *name,
                    chunk: *target as usize,
                    nparams: *nparams as usize,
                    captured: cells,
                })));
            }
            Instr::MakeExpr {
                head,
                argc,
                splat_mask,
            } => {
                let raw = frame.pop_n(*argc as usize)?;
                let args = expand_splats(raw, splat_mask)?;
                frame.push(Value::Expr(Rc::new(ExprValue::new(*head, args))));
            }
            Instr::MakeQuoteNode => {
                let inner = frame.pop()?;
                frame.push(Value::QuoteNode(Rc::new(inner)));
            }
            Instr::NarrowArray => {
                let value = frame.pop()?;
                if let Value::Array(a) = &value {
                    crate::broadcast::materialize::narrow_any_array(a);
                }
                frame.push(value);
            }

            // ── broadcast ─────────────────────────────────────────────
            Instr::BroadcastDot(argc) => {
                let args = frame.pop_n(*argc as usize)?;
                let func = frame.pop()?;
                frame.push(broadcast::broadcasted(func, args));
            }
            Instr::Materialize => {
                let value = frame.pop()?;
                let forced = broadcast::materialize(self, &value)?;
                frame.push(forced);
            }
            Instr::MaterializeInto => {
                let src = frame.pop()?;
                let dest = frame.pop()?;
                let result = broadcast::materialize_into(self, &dest, &src)?;
                frame.push(result);
            }

            // ── exceptions ────────────────────────────────────────────
            Instr::Catch {
                catch_ip,
                finally_ip,
            } => {
                frame.handlers.push(Handler {
                    catch_ip: catch_ip.map(|x| x as usize),
                    finally_ip: finally_ip.map(|x| x as usize),
                    stack_depth: frame.stack.len(),
                });
            }
            Instr::EndCatch => {
                frame.handlers.pop();
            }
            Instr::Throw => {
                let value = frame.pop()?;
                return Err(VmError::UserThrow(value));
            }
            Instr::Rethrow => match &frame.current_exception {
                Some((err, _)) => return Err(err.clone()),
                None => {
                    return Err(VmError::Argument(
                        "rethrow() outside a catch block".to_string(),
                    ))
                }
            },
            Instr::LoadException => match &frame.current_exception {
                Some((_, value)) => frame.push(value.clone()),
                None => frame.push(Value::Nothing),
            },
            Instr::EndFinally => {
                if let Some(err) = frame.pending.take() {
                    return Err(err);
                }
            }

            // ── operand stack ─────────────────────────────────────────
            Instr::Dup => {
                let top = frame.pop()?;
                frame.push(top.clone());
                frame.push(top);
            }
            Instr::Swap => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(b);
                frame.push(a);
            }
            Instr::Pop => {
                frame.pop()?;
            }

            Instr::TypeAssert => {
                let ty = frame.pop()?;
                let value = frame.pop()?;
                let Value::Type(expected) = &ty else {
                    return Err(VmError::Type(format!(
                        "expected a type in ::, got {}",
                        ty.runtime_ty()
                    )));
                };
                if !self.types.is_subtype(&value.runtime_ty(), expected) {
                    return Err(VmError::Type(format!(
                        "expected {}, got a value of type {}",
                        expected,
                        value.runtime_ty()
                    )));
                }
                frame.push(value);
            }
        }
        Ok(Flow::Next)
    }

    fn pop_condition(&mut self, frame: &mut Frame) -> VmResult<bool> {
        match frame.pop()? {
            Value::Bool(b) => Ok(b),
            Value::Missing => Err(VmError::Type(
                "non-boolean (Missing) used in boolean context".to_string(),
            )),
            other => Err(VmError::Type(format!(
                "non-boolean ({}) used in boolean context",
                other.runtime_ty()
            ))),
        }
    }

    fn int_binop(
        &mut self,
        frame: &mut Frame,
        op: &str,
        f: impl Fn(i64, i64) -> VmResult<i64>,
    ) -> VmResult<()> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        match (&a, &b) {
            (Value::I64(x), Value::I64(y)) => {
                frame.push(Value::I64(f(*x, *y)?));
                Ok(())
            }
            _ => {
                let r = self.call_generic(Symbol::intern(op), &[a, b], &[])?;
                frame.push(r);
                Ok(())
            }
        }
    }

    fn float_binop(
        &mut self,
        frame: &mut Frame,
        op: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> VmResult<()> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        match (&a, &b) {
            (Value::F64(x), Value::F64(y)) => {
                frame.push(Value::F64(f(*x, *y)));
                Ok(())
            }
            _ => {
                let r = self.call_generic(Symbol::intern(op), &[a, b], &[])?;
                frame.push(r);
                Ok(())
            }
        }
    }

    fn int_cmp(
        &mut self,
        frame: &mut Frame,
        op: &str,
        f: impl Fn(i64, i64) -> bool,
    ) -> VmResult<()> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        match (&a, &b) {
            (Value::I64(x), Value::I64(y)) => {
                frame.push(Value::Bool(f(*x, *y)));
                Ok(())
            }
            _ => {
                let r = self.call_generic(Symbol::intern(op), &[a, b], &[])?;
                frame.push(r);
                Ok(())
            }
        }
    }

    fn float_cmp(
        &mut self,
        frame: &mut Frame,
        op: &str,
        f: impl Fn(f64, f64) -> bool,
    ) -> VmResult<()> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        match (&a, &b) {
            (Value::F64(x), Value::F64(y)) => {
                frame.push(Value::Bool(f(*x, *y)));
                Ok(())
            }
            _ => {
                let r = self.call_generic(Symbol::intern(op), &[a, b], &[])?;
                frame.push(r);
                Ok(())
            }
        }
    }

    /// Global name resolution: bindings, then generic functions, then
    /// user types, then builtin type names.
    pub fn resolve_global(&self, name: Symbol) -> VmResult<Value> {
        if let Some(value) = self.globals.get(&name) {
            return Ok(value.clone());
        }
        if self.registry.contains(name) {
            return Ok(Value::Function(crate::values::FunctionValue::new(name)));
        }
        if let Some(def) = self.types.structs.get(&name) {
            return Ok(Value::ty(Ty::Struct {
                name: def.name,
                params: vec![],
            }));
        }
        if self.types.abstract_supers.contains_key(&name) {
            return Ok(Value::ty(Ty::AbstractUser(name)));
        }
        if let Some(ty) = Ty::builtin(name.as_str()) {
            return Ok(Value::ty(ty));
        }
        Err(VmError::UndefVar(name))
    }

    pub fn write_out(&mut self, text: &str) {
        self.out.write(text);
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn const_value(c: &Const) -> Value {
    match c {
        Const::Nothing => Value::Nothing,
        Const::Missing => Value::Missing,
        Const::Undef => Value::Undef,
        Const::Bool(b) => Value::Bool(*b),
        Const::I64(x) => Value::I64(*x),
        Const::I128(x) => Value::I128(*x),
        Const::F32(x) => Value::F32(*x),
        Const::F64(x) => Value::F64(*x),
        Const::Str(s) => Value::str(s),
        Const::Char(c) => Value::Char(*c),
        Const::Sym(s) => Value::Sym(*s),
        Const::Line(line, file) => Value::LineNumberNode(
            crate::values::LineNumberNodeValue::new(*line, *file),
        ),
    }
}

/// Expand `xs...` arguments at a call site into the positional list.
pub fn expand_splats(values: Vec<Value>, mask: &[bool]) -> VmResult<Vec<Value>> {
    let mut out = Vec::with_capacity(values.len());
    for (value, &splat) in values.into_iter().zip(mask) {
        if !splat {
            out.push(value);
            continue;
        }
        match value {
            Value::Tuple(elems) => out.extend(elems.iter().cloned()),
            Value::Array(a) => out.extend(a.borrow().iter_values()),
            Value::Range(r) => out.extend(r.iter_values()),
            Value::NamedTuple(nt) => out.extend(nt.values.iter().cloned()),
            Value::Str(s) => out.extend(s.chars().map(Value::Char)),
            Value::Set(s) => out.extend(s.borrow().iter_values().cloned()),
            other => {
                return Err(VmError::Argument(format!(
                    "cannot splat a value of type {}",
                    other.runtime_ty()
                )))
            }
        }
    }
    Ok(out)
}

/// Array literal construction. Elements arrive in source order; 2-D
/// shapes arrive row-major from the parser and are transposed into
/// column-major storage. Mixed int/float literals promote to Float64.
fn make_array_literal(elems: Vec<Value>, shape: Option<Vec<usize>>) -> VmResult<Value> {
    let elems = match &shape {
        Some(s) if s.len() == 2 => {
            let (rows, cols) = (s[0], s[1]);
            if rows * cols != elems.len() {
                return Err(VmError::Argument(format!(
                    "matrix literal rows have unequal lengths ({} elements for {}×{})",
                    elems.len(),
                    rows,
                    cols
                )));
            }
            let mut transposed = Vec::with_capacity(elems.len());
            for c in 0..cols {
                for r in 0..rows {
                    transposed.push(elems[r * cols + c].clone());
                }
            }
            transposed
        }
        _ => elems,
    };
    let shape = shape.unwrap_or_else(|| vec![elems.len()]);
    Ok(Value::Array(new_array_ref(narrow_literal(elems, shape))))
}

fn narrow_literal(elems: Vec<Value>, shape: Vec<usize>) -> ArrayValue {
    if !elems.is_empty() {
        if elems.iter().all(|v| matches!(v, Value::I64(_))) {
            let data = elems
                .iter()
                .map(|v| match v {
                    Value::I64(x) => *x,
                    _ => unreachable!(),
                })
                .collect();
            return ArrayValue::from_i64(data, shape);
        }
        if elems
            .iter()
            .all(|v| matches!(v, Value::F64(_) | Value::I64(_)))
        {
            let data = elems
                .iter()
                .map(|v| match v {
                    Value::F64(x) => *x,
                    Value::I64(x) => *x as f64,
                    _ => unreachable!(),
                })
                .collect();
            return ArrayValue::from_f64(data, shape);
        }
        if elems.iter().all(|v| matches!(v, Value::Bool(_))) {
            let data = elems
                .iter()
                .map(|v| match v {
                    Value::Bool(x) => *x,
                    _ => unreachable!(),
                })
                .collect();
            return ArrayValue::new(crate::values::ArrayData::Bool(data), shape);
        }
        if elems.iter().all(|v| matches!(v, Value::Str(_))) {
            let data = elems
                .iter()
                .map(|v| match v {
                    Value::Str(x) => x.clone(),
                    _ => unreachable!(),
                })
                .collect();
            return ArrayValue::new(crate::values::ArrayData::Str(data), shape);
        }
        if elems.iter().all(|v| matches!(v, Value::Char(_))) {
            let data = elems
                .iter()
                .map(|v| match v {
                    Value::Char(x) => *x,
                    _ => unreachable!(),
                })
                .collect();
            return ArrayValue::new(crate::values::ArrayData::Char(data), shape);
        }
    }
    ArrayValue::from_values(elems, shape)
}

/// `start:stop`, `start:step:stop`: pick the range representation from
/// the operand types.
pub fn make_range(start: &Value, step: Option<&Value>, stop: &Value) -> VmResult<Value> {
    let any_float = [Some(start), step, Some(stop)]
        .into_iter()
        .flatten()
        .any(|v| matches!(v, Value::F64(_) | Value::F32(_) | Value::F16(_)));
    if any_float {
        let s = start
            .as_f64()
            .ok_or_else(|| VmError::Argument("range start must be a number".to_string()))?;
        let e = stop
            .as_f64()
            .ok_or_else(|| VmError::Argument("range stop must be a number".to_string()))?;
        let st = match step {
            Some(v) => v
                .as_f64()
                .ok_or_else(|| VmError::Argument("range step must be a number".to_string()))?,
            None => 1.0,
        };
        return Ok(Value::Range(RangeValue::step_len_from_bounds(s, st, e)?));
    }
    let s = start
        .as_i64()
        .ok_or_else(|| VmError::Argument("range start must be an integer".to_string()))?;
    let e = stop
        .as_i64()
        .ok_or_else(|| VmError::Argument("range stop must be an integer".to_string()))?;
    match step {
        None => Ok(Value::Range(RangeValue::unit(s, e))),
        Some(v) => {
            let st = v
                .as_i64()
                .ok_or_else(|| VmError::Argument("range step must be an integer".to_string()))?;
            Ok(Value::Range(RangeValue::step(s, st, e)?))
        }
    }
}
