//! Lowering: AST values → linear instruction chunks.
//!
//! The lowerer consumes the same `Expr` trees user code manipulates.
//! Top-level statements are processed one at a time (definitions
//! register themselves; expressions become chunks and run), which is
//! exactly the pipeline `eval`/`include_string` share.
//!
//! Scoping: locals live in slots; every name assigned inside a function
//! body is local to it unless declared `global`. Closures capture the
//! binding cells of their free variables. At top level, assignments go
//! to globals.

pub mod convert;
pub mod function;
pub mod macros;
pub mod quoting;

use std::collections::{HashMap, HashSet};

use crate::error::{VmError, VmResult};
use crate::interner::{gensym, Symbol};
use crate::ir::{Chunk, Const, Instr};
use crate::values::{ExprValue, Value};
use crate::vm::Vm;

/// Evaluate one AST value in the global environment: expand macros,
/// lower, run. This is the shared `eval` pipeline.
pub fn eval_value(vm: &mut Vm, expr: &Value) -> VmResult<Value> {
    let expanded = macros::expand(vm, expr)?;
    let mut lowerer = Lowerer { vm };
    match lowerer.lower_toplevel(&expanded)? {
        Some(chunk) => lowerer.vm.run_chunk(chunk, vec![], vec![]),
        None => Ok(Value::Nothing),
    }
}

/// Shallow static type used to select typed instruction variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StaticTy {
    I64,
    F64,
    Bool,
}

pub struct Lowerer<'a> {
    pub vm: &'a mut Vm,
}

/// Builder for one chunk: bytecode buffer plus scope bookkeeping.
pub(crate) struct ChunkBuilder {
    pub chunk: Chunk,
    scopes: Vec<HashMap<Symbol, u16>>,
    slot_static: Vec<Option<StaticTy>>,
    globals_declared: HashSet<Symbol>,
    /// Names visible in the enclosing function (closure candidates).
    capturable: Vec<Symbol>,
    /// Captured names in `CapturedLoad` index order.
    pub captured: Vec<Symbol>,
    pub is_toplevel: bool,
    loops: Vec<LoopCtx>,
}

struct LoopCtx {
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
}

impl ChunkBuilder {
    pub fn toplevel(name: Symbol) -> Self {
        Self {
            chunk: Chunk::new(name),
            scopes: vec![HashMap::new()],
            slot_static: Vec::new(),
            globals_declared: HashSet::new(),
            capturable: Vec::new(),
            captured: Vec::new(),
            is_toplevel: true,
            loops: Vec::new(),
        }
    }

    pub fn function(name: Symbol, capturable: Vec<Symbol>) -> Self {
        Self {
            chunk: Chunk::new(name),
            scopes: vec![HashMap::new()],
            slot_static: Vec::new(),
            globals_declared: HashSet::new(),
            capturable,
            captured: Vec::new(),
            is_toplevel: false,
            loops: Vec::new(),
        }
    }

    pub fn emit(&mut self, instr: Instr) -> usize {
        self.chunk.code.push(instr);
        self.chunk.code.len() - 1
    }

    fn here(&self) -> usize {
        self.chunk.code.len()
    }

    fn patch_jump(&mut self, at: usize) {
        let target = self.here() as u32;
        match &mut self.chunk.code[at] {
            Instr::Branch(t) | Instr::BranchIf(t) | Instr::BranchIfNot(t) => *t = target,
            Instr::Catch {
                catch_ip,
                finally_ip,
            } => {
                if catch_ip == &Some(u32::MAX) {
                    *catch_ip = Some(target);
                } else if finally_ip == &Some(u32::MAX) {
                    *finally_ip = Some(target);
                }
            }
            other => unreachable!("patching non-jump instruction {:?}", other),
        }
    }

    fn record_line(&mut self, line: i64) {
        self.chunk
            .lines
            .push((self.here() as u32, line.max(0) as u32));
    }

    /// Introduce a fresh local slot bound to `name` in the innermost
    /// scope.
    pub fn bind_local(&mut self, name: Symbol) -> u16 {
        let slot = self.chunk.nslots as u16;
        self.chunk.nslots += 1;
        self.chunk.slot_names.push(name);
        self.slot_static.push(None);
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .insert(name, slot);
        slot
    }

    fn lookup(&self, name: Symbol) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&name).copied())
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Index into the captured environment, registering on first use.
    fn capture_index(&mut self, name: Symbol) -> Option<u16> {
        if !self.capturable.contains(&name) {
            return None;
        }
        if let Some(idx) = self.captured.iter().position(|&n| n == name) {
            return Some(idx as u16);
        }
        self.captured.push(name);
        Some((self.captured.len() - 1) as u16)
    }

    fn set_static(&mut self, slot: u16, ty: Option<StaticTy>) {
        if let Some(entry) = self.slot_static.get_mut(slot as usize) {
            *entry = ty;
        }
    }

    fn get_static(&self, slot: u16) -> Option<StaticTy> {
        self.slot_static.get(slot as usize).copied().flatten()
    }
}

impl Lowerer<'_> {
    /// Lower one top-level statement. Definitions register themselves
    /// and yield a chunk producing the defined object; expressions
    /// become a chunk to run.
    pub fn lower_toplevel(&mut self, stmt: &Value) -> VmResult<Option<usize>> {
        if let Value::Expr(e) = stmt {
            match e.head.as_str() {
                "function" | "macro" => {
                    let args = e.arg_values();
                    let name = if e.head.as_str() == "macro" {
                        self.register_macro_def(&args[0], &args[1])?
                    } else {
                        self.register_function_def(&args[0], &args[1])?
                    };
                    return Ok(Some(self.name_chunk(name)));
                }
                "struct" => {
                    let args = e.arg_values();
                    let name = self.register_struct_def(&args[0], &args[1], &args[2])?;
                    return Ok(Some(self.name_chunk(name)));
                }
                "abstract" => {
                    let args = e.arg_values();
                    let name = self.register_abstract_def(&args[0])?;
                    return Ok(Some(self.name_chunk(name)));
                }
                "const" | "global" => {
                    let inner = e.arg(0).unwrap_or(Value::Nothing);
                    return self.lower_toplevel(&inner);
                }
                "using" | "import" | "export" => return Ok(None),
                "module" => {
                    // Flat module semantics: the body runs in the same
                    // global environment.
                    let args = e.arg_values();
                    if let Some(Value::Expr(body)) = args.get(1) {
                        for stmt in body.arg_values() {
                            if matches!(stmt, Value::LineNumberNode(_)) {
                                continue;
                            }
                            eval_value(self.vm, &stmt)?;
                        }
                    }
                    return Ok(None);
                }
                "=" => {
                    // Short-form function definition: f(x) = body.
                    let args = e.arg_values();
                    if is_signature(&args[0]) {
                        let name = self.register_function_def(&args[0], &args[1])?;
                        return Ok(Some(self.name_chunk(name)));
                    }
                }
                _ => {}
            }
        }
        let mut b = ChunkBuilder::toplevel(Symbol::intern("top"));
        self.lower_expr(&mut b, stmt)?;
        Ok(Some(self.vm.program.add_chunk(b.chunk)))
    }

    /// A chunk that just resolves `name`, so definitions evaluate to
    /// the thing they defined.
    fn name_chunk(&mut self, name: Symbol) -> usize {
        let mut chunk = Chunk::new(Symbol::intern("defresult"));
        chunk.code.push(Instr::GlobalLoad(name));
        self.vm.program.add_chunk(chunk)
    }

    // ── expression lowering ───────────────────────────────────────────

    pub(crate) fn lower_expr(&mut self, b: &mut ChunkBuilder, v: &Value) -> VmResult<()> {
        match v {
            Value::I64(x) => {
                b.emit(Instr::ConstLoad(Const::I64(*x)));
            }
            Value::I128(x) => {
                b.emit(Instr::ConstLoad(Const::I128(*x)));
            }
            Value::F64(x) => {
                b.emit(Instr::ConstLoad(Const::F64(*x)));
            }
            Value::F32(x) => {
                b.emit(Instr::ConstLoad(Const::F32(*x)));
            }
            Value::Bool(x) => {
                b.emit(Instr::ConstLoad(Const::Bool(*x)));
            }
            Value::Char(x) => {
                b.emit(Instr::ConstLoad(Const::Char(*x)));
            }
            Value::Str(s) => {
                b.emit(Instr::ConstLoad(Const::Str(s.to_string())));
            }
            Value::Nothing => {
                b.emit(Instr::ConstLoad(Const::Nothing));
            }
            Value::Missing => {
                b.emit(Instr::ConstLoad(Const::Missing));
            }
            Value::Sym(name) => self.lower_name_load(b, *name),
            Value::QuoteNode(inner) => self.lower_literal(b, inner)?,
            Value::LineNumberNode(n) => {
                b.record_line(n.line);
                b.emit(Instr::ConstLoad(Const::Nothing));
            }
            Value::Expr(e) => self.lower_expr_node(b, e)?,
            other => {
                return Err(VmError::Internal(format!(
                    "cannot lower value of type {}",
                    other.runtime_ty()
                )))
            }
        }
        Ok(())
    }

    fn lower_name_load(&mut self, b: &mut ChunkBuilder, name: Symbol) {
        if let Some(slot) = b.lookup(name) {
            b.emit(Instr::LocalLoad(slot));
        } else if let Some(idx) = b.capture_index(name) {
            b.emit(Instr::CapturedLoad(idx));
        } else {
            b.emit(Instr::GlobalLoad(name));
        }
    }

    /// Store the top of stack into `name` under the scoping rules.
    fn lower_name_store(&mut self, b: &mut ChunkBuilder, name: Symbol, static_ty: Option<StaticTy>) {
        if let Some(slot) = b.lookup(name) {
            b.set_static(slot, static_ty);
            b.emit(Instr::LocalStore(slot));
        } else if b.globals_declared.contains(&name) || b.is_toplevel {
            b.emit(Instr::GlobalStore(name));
        } else if let Some(idx) = b.capture_index(name) {
            b.emit(Instr::CapturedStore(idx));
        } else {
            let slot = b.bind_local(name);
            b.set_static(slot, static_ty);
            b.emit(Instr::LocalStore(slot));
        }
    }

    fn lower_expr_node(&mut self, b: &mut ChunkBuilder, e: &ExprValue) -> VmResult<()> {
        let head = e.head.as_str();
        let args = e.arg_values();
        match head {
            "block" => self.lower_block(b, &args, true)?,
            "if" | "elseif" => self.lower_if(b, &args)?,
            "&&" => {
                self.lower_expr(b, &args[0])?;
                b.emit(Instr::Dup);
                let jump = b.emit(Instr::BranchIfNot(0));
                b.emit(Instr::Pop);
                self.lower_expr(b, &args[1])?;
                b.patch_jump(jump);
            }
            "||" => {
                self.lower_expr(b, &args[0])?;
                b.emit(Instr::Dup);
                let jump = b.emit(Instr::BranchIf(0));
                b.emit(Instr::Pop);
                self.lower_expr(b, &args[1])?;
                b.patch_jump(jump);
            }
            "while" => self.lower_while(b, &args)?,
            "for" => self.lower_for(b, &args)?,
            "try" => self.lower_try(b, &args)?,
            "=" if is_signature(&args[0]) => {
                // Short-form definition nested in a block: a global
                // method at top level, a named closure inside a
                // function body.
                if b.is_toplevel {
                    let name = self.register_function_def(&args[0], &args[1])?;
                    b.emit(Instr::GlobalLoad(name));
                } else {
                    self.lower_inner_function(b, &args[0], &args[1])?;
                }
            }
            "=" => self.lower_assign(b, &args[0], &args[1])?,
            "+=" | "-=" | "*=" | "/=" | "^=" | "%=" | "÷=" => {
                let op = Symbol::intern(&head[..head.len() - 1]);
                self.lower_compound_assign(b, op, &args[0], &args[1])?;
            }
            ".=" => {
                self.lower_expr(b, &args[0])?;
                self.lower_dot_operand(b, &args[1])?;
                b.emit(Instr::MaterializeInto);
            }
            ".+=" | ".-=" | ".*=" | "./=" | ".^=" => {
                let op = Symbol::intern(&head[1..head.len() - 1]);
                self.lower_dot_compound_assign(b, op, &args[0], &args[1])?;
            }
            "call" => self.lower_call(b, &args)?,
            "." => {
                // Field access or broadcast dot-call.
                match args.get(1) {
                    Some(Value::QuoteNode(field)) => {
                        let Value::Sym(field) = &**field else {
                            return Err(VmError::Argument(
                                "field name must be a symbol".to_string(),
                            ));
                        };
                        self.lower_expr(b, &args[0])?;
                        b.emit(Instr::FieldLoad(*field));
                    }
                    Some(Value::Expr(t)) if t.head.as_str() == "tuple" => {
                        self.lower_dot_call(b, e)?;
                        b.emit(Instr::Materialize);
                    }
                    _ => {
                        return Err(VmError::Argument(
                            "malformed field access".to_string(),
                        ))
                    }
                }
            }
            "ref" => self.lower_ref_load(b, &args)?,
            "tuple" => self.lower_tuple(b, &args)?,
            "vect" => {
                for arg in &args {
                    self.lower_expr(b, arg)?;
                }
                b.emit(Instr::MakeArray {
                    count: args.len() as u32,
                    shape: None,
                });
            }
            "vcat" => {
                if args.iter().all(|a| matches!(a, Value::Expr(r) if r.head.as_str() == "row")) {
                    b.emit(Instr::GlobalLoad(Symbol::intern("vcat")));
                    for row in &args {
                        let Value::Expr(row) = row else { unreachable!() };
                        let elems = row.arg_values();
                        b.emit(Instr::GlobalLoad(Symbol::intern("hcat")));
                        for elem in &elems {
                            self.lower_expr(b, elem)?;
                        }
                        b.emit(Instr::Call(elems.len() as u8));
                    }
                    b.emit(Instr::Call(args.len() as u8));
                } else {
                    b.emit(Instr::GlobalLoad(Symbol::intern("vcat")));
                    for arg in &args {
                        self.lower_expr(b, arg)?;
                    }
                    b.emit(Instr::Call(args.len() as u8));
                }
            }
            "hcat" | "row" => {
                b.emit(Instr::GlobalLoad(Symbol::intern("hcat")));
                for arg in &args {
                    self.lower_expr(b, arg)?;
                }
                b.emit(Instr::Call(args.len() as u8));
            }
            "curly" => {
                b.emit(Instr::GlobalLoad(Symbol::intern("apply_type")));
                for arg in &args {
                    self.lower_expr(b, arg)?;
                }
                b.emit(Instr::Call(args.len() as u8));
            }
            "::" => {
                // Typed expression: value :: T.
                self.lower_expr(b, &args[0])?;
                self.lower_expr(b, &args[1])?;
                b.emit(Instr::TypeAssert);
            }
            "<:" => {
                b.emit(Instr::GlobalLoad(Symbol::intern("<:")));
                self.lower_expr(b, &args[0])?;
                self.lower_expr(b, &args[1])?;
                b.emit(Instr::Call(2));
            }
            "quote" => {
                let inner = args.first().cloned().unwrap_or(Value::Nothing);
                self.lower_quote(b, &inner, 1)?;
            }
            "$" => {
                return Err(VmError::Argument(
                    "`$` interpolation is only valid inside quotes".to_string(),
                ))
            }
            "string" => {
                b.emit(Instr::GlobalLoad(Symbol::intern("string")));
                for arg in &args {
                    self.lower_expr(b, arg)?;
                }
                b.emit(Instr::Call(args.len() as u8));
            }
            "comprehension" => self.lower_comprehension(b, &args)?,
            "let" => self.lower_let(b, &args)?,
            "return" => {
                match args.first() {
                    Some(value) => self.lower_expr(b, value)?,
                    None => {
                        b.emit(Instr::ConstLoad(Const::Nothing));
                    }
                }
                b.emit(Instr::Return);
            }
            "break" => {
                let jump = b.emit(Instr::Branch(0));
                match b.loops.last_mut() {
                    Some(ctx) => ctx.break_patches.push(jump),
                    None => {
                        return Err(VmError::Argument(
                            "break outside a loop".to_string(),
                        ))
                    }
                }
            }
            "continue" => {
                let jump = b.emit(Instr::Branch(0));
                match b.loops.last_mut() {
                    Some(ctx) => ctx.continue_patches.push(jump),
                    None => {
                        return Err(VmError::Argument(
                            "continue outside a loop".to_string(),
                        ))
                    }
                }
            }
            "global" => {
                for arg in &args {
                    match arg {
                        Value::Sym(name) => {
                            b.globals_declared.insert(*name);
                        }
                        Value::Expr(inner) if inner.head.as_str() == "=" => {
                            let inner_args = inner.arg_values();
                            if let Value::Sym(name) = &inner_args[0] {
                                b.globals_declared.insert(*name);
                            }
                            self.lower_assign(b, &inner_args[0], &inner_args[1])?;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                b.emit(Instr::ConstLoad(Const::Nothing));
            }
            "local" => {
                let mut produced = false;
                for arg in &args {
                    match arg {
                        Value::Sym(name) => {
                            b.bind_local(*name);
                        }
                        Value::Expr(inner) if inner.head.as_str() == "=" => {
                            let inner_args = inner.arg_values();
                            if let Value::Sym(name) = &inner_args[0] {
                                b.bind_local(*name);
                            }
                            self.lower_assign(b, &inner_args[0], &inner_args[1])?;
                            produced = true;
                        }
                        _ => {}
                    }
                }
                if !produced {
                    b.emit(Instr::ConstLoad(Const::Nothing));
                }
            }
            "->" => self.lower_lambda(b, &args[0], &args[1])?,
            "function" => {
                // Inner function definition: a named closure.
                let sig = &args[0];
                let body = &args[1];
                if b.is_toplevel {
                    let name = self.register_function_def(sig, body)?;
                    b.emit(Instr::GlobalLoad(name));
                } else {
                    self.lower_inner_function(b, sig, body)?;
                }
            }
            "macrocall" => {
                // A macro produced by another macro's expansion.
                let expanded = macros::expand(self.vm, &Value::Expr(std::rc::Rc::new(e.clone())))?;
                if matches!(&expanded, Value::Expr(x) if x.head.as_str() == "macrocall") {
                    return Err(VmError::Argument(
                        "@generated is only valid as a function body".to_string(),
                    ));
                }
                self.lower_expr(b, &expanded)?;
            }
            "using" | "import" | "export" => {
                b.emit(Instr::ConstLoad(Const::Nothing));
            }
            "escape" => {
                // Leftover escape outside macro expansion.
                self.lower_expr(b, &args[0])?;
            }
            "where" => {
                return Err(VmError::Argument(
                    "`where` types are only supported in method signatures".to_string(),
                ))
            }
            "end" => {
                return Err(VmError::Argument(
                    "`end` is only valid inside an indexing expression".to_string(),
                ))
            }
            other => {
                return Err(VmError::Argument(format!(
                    "unsupported syntax: `{}` expression",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Lower block statements; `want_value` keeps the last statement's
    /// value on the stack.
    fn lower_block(&mut self, b: &mut ChunkBuilder, stmts: &[Value], want_value: bool) -> VmResult<()> {
        let last_real = stmts
            .iter()
            .rposition(|s| !matches!(s, Value::LineNumberNode(_)));
        let mut produced = false;
        for (i, stmt) in stmts.iter().enumerate() {
            if let Value::LineNumberNode(n) = stmt {
                b.record_line(n.line);
                continue;
            }
            self.lower_expr(b, stmt)?;
            if Some(i) == last_real && want_value {
                produced = true;
            } else {
                b.emit(Instr::Pop);
            }
        }
        if want_value && !produced {
            b.emit(Instr::ConstLoad(Const::Nothing));
        }
        Ok(())
    }

    fn lower_if(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        self.lower_expr(b, &args[0])?;
        let to_else = b.emit(Instr::BranchIfNot(0));
        self.lower_expr(b, &args[1])?;
        let to_end = b.emit(Instr::Branch(0));
        b.patch_jump(to_else);
        match args.get(2) {
            Some(otherwise) => self.lower_expr(b, otherwise)?,
            None => {
                b.emit(Instr::ConstLoad(Const::Nothing));
            }
        }
        b.patch_jump(to_end);
        Ok(())
    }

    fn lower_while(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        let start = b.here();
        self.lower_expr(b, &args[0])?;
        let to_exit = b.emit(Instr::BranchIfNot(0));
        b.loops.push(LoopCtx {
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
        self.lower_expr(b, &args[1])?;
        b.emit(Instr::Pop);
        let ctx = b.loops.pop().expect("loop context");
        for patch in ctx.continue_patches {
            b.patch_jump_to(patch, start);
        }
        b.emit(Instr::Branch(start as u32));
        b.patch_jump(to_exit);
        for patch in ctx.break_patches {
            b.patch_jump(patch);
        }
        b.emit(Instr::ConstLoad(Const::Nothing));
        Ok(())
    }

    fn lower_for(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        // Multiple bindings nest.
        if let Value::Expr(block) = &args[0] {
            if block.head.as_str() == "block" {
                let bindings: Vec<Value> = block
                    .arg_values()
                    .into_iter()
                    .filter(|v| !matches!(v, Value::LineNumberNode(_)))
                    .collect();
                if bindings.len() > 1 {
                    let inner_for = Value::expr(
                        Symbol::intern("for"),
                        vec![
                            Value::expr(
                                Symbol::intern("block"),
                                bindings[1..].to_vec(),
                            ),
                            args[1].clone(),
                        ],
                    );
                    return self.lower_for(b, &[bindings[0].clone(), inner_for]);
                }
                if bindings.len() == 1 {
                    return self.lower_for(b, &[bindings[0].clone(), args[1].clone()]);
                }
            }
        }

        let Value::Expr(binding) = &args[0] else {
            return Err(VmError::Argument("malformed for binding".to_string()));
        };
        let binding_args = binding.arg_values();
        let (var, iter) = (&binding_args[0], &binding_args[1]);

        b.push_scope();
        let it = b.bind_local(gensym("iter"));
        let st = b.bind_local(gensym("state"));

        self.lower_expr(b, iter)?;
        b.emit(Instr::LocalStore(it));
        // st = iterate(it)
        b.emit(Instr::GlobalLoad(Symbol::intern("iterate")));
        b.emit(Instr::LocalLoad(it));
        b.emit(Instr::Call(1));
        b.emit(Instr::LocalStore(st));

        let start = b.here();
        // isnothing(st) && break
        b.emit(Instr::GlobalLoad(Symbol::intern("isnothing")));
        b.emit(Instr::LocalLoad(st));
        b.emit(Instr::Call(1));
        let to_exit = b.emit(Instr::BranchIf(0));

        // Bind the loop variable(s) from st[1].
        b.emit(Instr::LocalLoad(st));
        b.emit(Instr::ConstLoad(Const::I64(1)));
        b.emit(Instr::IndexLoad(1));
        self.lower_binding_store(b, var)?;

        b.loops.push(LoopCtx {
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        });
        self.lower_expr(b, &args[1])?;
        b.emit(Instr::Pop);
        let ctx = b.loops.pop().expect("loop context");
        for patch in ctx.continue_patches {
            b.patch_jump(patch);
        }

        // st = iterate(it, st[2])
        b.emit(Instr::GlobalLoad(Symbol::intern("iterate")));
        b.emit(Instr::LocalLoad(it));
        b.emit(Instr::LocalLoad(st));
        b.emit(Instr::ConstLoad(Const::I64(2)));
        b.emit(Instr::IndexLoad(1));
        b.emit(Instr::Call(2));
        b.emit(Instr::LocalStore(st));
        b.emit(Instr::Branch(start as u32));

        b.patch_jump(to_exit);
        for patch in ctx.break_patches {
            b.patch_jump(patch);
        }
        b.pop_scope();
        b.emit(Instr::ConstLoad(Const::Nothing));
        Ok(())
    }

    /// Store top-of-stack into a binding target: a name or a tuple of
    /// names (destructuring).
    fn lower_binding_store(&mut self, b: &mut ChunkBuilder, target: &Value) -> VmResult<()> {
        match target {
            Value::Sym(name) => {
                if b.lookup(*name).is_none() && !b.is_toplevel {
                    b.bind_local(*name);
                }
                self.lower_name_store(b, *name, None);
                Ok(())
            }
            Value::Expr(t) if t.head.as_str() == "tuple" => {
                let parts = t.arg_values();
                for (i, part) in parts.iter().enumerate() {
                    b.emit(Instr::Dup);
                    b.emit(Instr::ConstLoad(Const::I64(i as i64 + 1)));
                    b.emit(Instr::IndexLoad(1));
                    self.lower_binding_store(b, part)?;
                }
                b.emit(Instr::Pop);
                Ok(())
            }
            _ => Err(VmError::Argument(
                "unsupported binding target".to_string(),
            )),
        }
    }

    fn lower_try(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        let has_catch = !matches!(args.get(2), Some(Value::Bool(false)) | None);
        let finally_block = args.get(3).cloned();

        let finally_handler = if finally_block.is_some() {
            Some(b.emit(Instr::Catch {
                catch_ip: None,
                finally_ip: Some(u32::MAX),
            }))
        } else {
            None
        };
        let catch_handler = if has_catch {
            Some(b.emit(Instr::Catch {
                catch_ip: Some(u32::MAX),
                finally_ip: None,
            }))
        } else {
            None
        };

        self.lower_expr(b, &args[0])?;
        if has_catch {
            b.emit(Instr::EndCatch);
        }
        let after_try = b.emit(Instr::Branch(0));

        let mut joins = vec![after_try];
        if let Some(handler) = catch_handler {
            b.patch_jump(handler);
            b.push_scope();
            if let Some(Value::Sym(var)) = args.get(1) {
                let slot = b.bind_local(*var);
                b.emit(Instr::LoadException);
                b.emit(Instr::LocalStore(slot));
            }
            self.lower_expr(b, &args[2])?;
            b.pop_scope();
            joins.push(b.emit(Instr::Branch(0)));
        }

        for join in joins {
            b.patch_jump(join);
        }

        if let Some(finally) = finally_block {
            b.emit(Instr::EndCatch);
            self.lower_expr(b, &finally)?;
            b.emit(Instr::Pop);
            let to_end = b.emit(Instr::Branch(0));
            if let Some(handler) = finally_handler {
                b.patch_jump(handler);
            }
            self.lower_expr(b, &finally)?;
            b.emit(Instr::Pop);
            b.emit(Instr::EndFinally);
            b.patch_jump(to_end);
        }
        Ok(())
    }

    fn lower_let(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        b.push_scope();
        if let Value::Expr(bindings) = &args[0] {
            for binding in bindings.arg_values() {
                match &binding {
                    Value::Sym(name) => {
                        b.bind_local(*name);
                    }
                    Value::Expr(a) if a.head.as_str() == "=" => {
                        let parts = a.arg_values();
                        self.lower_expr(b, &parts[1])?;
                        if let Value::Sym(name) = &parts[0] {
                            let slot = b.bind_local(*name);
                            b.emit(Instr::LocalStore(slot));
                        } else {
                            return Err(VmError::Argument(
                                "unsupported let binding".to_string(),
                            ));
                        }
                    }
                    Value::LineNumberNode(_) => {}
                    _ => {
                        return Err(VmError::Argument(
                            "unsupported let binding".to_string(),
                        ))
                    }
                }
            }
        }
        self.lower_expr(b, &args[1])?;
        b.pop_scope();
        Ok(())
    }

    fn lower_assign(&mut self, b: &mut ChunkBuilder, target: &Value, rhs: &Value) -> VmResult<()> {
        match target {
            Value::Sym(name) => {
                let static_ty = self.infer(b, rhs);
                self.lower_expr(b, rhs)?;
                b.emit(Instr::Dup);
                self.lower_name_store(b, *name, static_ty);
            }
            Value::Expr(t) => match t.head.as_str() {
                "tuple" => {
                    self.lower_expr(b, rhs)?;
                    let parts = t.arg_values();
                    for (i, part) in parts.iter().enumerate() {
                        b.emit(Instr::Dup);
                        b.emit(Instr::ConstLoad(Const::I64(i as i64 + 1)));
                        b.emit(Instr::IndexLoad(1));
                        match part {
                            Value::Sym(name) => self.lower_name_store(b, *name, None),
                            _ => {
                                return Err(VmError::Argument(
                                    "unsupported destructuring target".to_string(),
                                ))
                            }
                        }
                    }
                }
                "ref" => {
                    let ref_args = t.arg_values();
                    self.lower_ref_parts(b, &ref_args)?;
                    self.lower_expr(b, rhs)?;
                    b.emit(Instr::IndexStore((ref_args.len() - 1) as u8));
                }
                "." => {
                    let field_args = t.arg_values();
                    let Some(Value::QuoteNode(field)) = field_args.get(1) else {
                        return Err(VmError::Argument(
                            "malformed field assignment".to_string(),
                        ));
                    };
                    let Value::Sym(field) = &**field else {
                        return Err(VmError::Argument(
                            "field name must be a symbol".to_string(),
                        ));
                    };
                    self.lower_expr(b, &field_args[0])?;
                    self.lower_expr(b, rhs)?;
                    b.emit(Instr::FieldStore(*field));
                }
                "::" => {
                    let decl = t.arg_values();
                    self.lower_expr(b, rhs)?;
                    b.emit(Instr::Dup);
                    self.lower_expr(b, &decl[1])?;
                    b.emit(Instr::TypeAssert);
                    match &decl[0] {
                        Value::Sym(name) => self.lower_name_store(b, *name, None),
                        _ => {
                            return Err(VmError::Argument(
                                "unsupported typed assignment target".to_string(),
                            ))
                        }
                    }
                }
                _ => {
                    return Err(VmError::Argument(format!(
                        "cannot assign to `{}` expression",
                        t.head
                    )))
                }
            },
            _ => {
                return Err(VmError::Argument(
                    "unsupported assignment target".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// `target op= rhs`, evaluating the target's base exactly once.
    fn lower_compound_assign(
        &mut self,
        b: &mut ChunkBuilder,
        op: Symbol,
        target: &Value,
        rhs: &Value,
    ) -> VmResult<()> {
        match target {
            Value::Sym(name) => {
                b.emit(Instr::GlobalLoad(op));
                self.lower_name_load(b, *name);
                self.lower_expr(b, rhs)?;
                b.emit(Instr::Call(2));
                b.emit(Instr::Dup);
                self.lower_name_store(b, *name, None);
            }
            Value::Expr(t) if t.head.as_str() == "." => {
                // obj.f op= rhs: one load, one store, obj evaluated once.
                let field_args = t.arg_values();
                let Some(Value::QuoteNode(field)) = field_args.get(1) else {
                    return Err(VmError::Argument(
                        "malformed field assignment".to_string(),
                    ));
                };
                let Value::Sym(field) = &**field else {
                    return Err(VmError::Argument(
                        "field name must be a symbol".to_string(),
                    ));
                };
                self.lower_expr(b, &field_args[0])?;
                b.emit(Instr::Dup);
                b.emit(Instr::FieldLoad(*field));
                b.emit(Instr::GlobalLoad(op));
                b.emit(Instr::Swap);
                self.lower_expr(b, rhs)?;
                b.emit(Instr::Call(2));
                b.emit(Instr::FieldStore(*field));
            }
            Value::Expr(t) if t.head.as_str() == "ref" => {
                // a[i] op= rhs via temporaries so a and i evaluate once.
                let ref_args = t.arg_values();
                b.push_scope();
                let base = b.bind_local(gensym("base"));
                self.lower_expr(b, &ref_args[0])?;
                b.emit(Instr::LocalStore(base));
                let mut index_slots = Vec::new();
                for idx in &ref_args[1..] {
                    let slot = b.bind_local(gensym("idx"));
                    self.lower_expr(b, idx)?;
                    b.emit(Instr::LocalStore(slot));
                    index_slots.push(slot);
                }
                b.emit(Instr::GlobalLoad(op));
                b.emit(Instr::LocalLoad(base));
                for &slot in &index_slots {
                    b.emit(Instr::LocalLoad(slot));
                }
                b.emit(Instr::IndexLoad(index_slots.len() as u8));
                self.lower_expr(b, rhs)?;
                b.emit(Instr::Call(2));
                let result = b.bind_local(gensym("val"));
                b.emit(Instr::LocalStore(result));
                b.emit(Instr::LocalLoad(base));
                for &slot in &index_slots {
                    b.emit(Instr::LocalLoad(slot));
                }
                b.emit(Instr::LocalLoad(result));
                b.emit(Instr::IndexStore(index_slots.len() as u8));
                b.pop_scope();
            }
            _ => {
                return Err(VmError::Argument(
                    "unsupported compound assignment target".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// `x .op= rhs` → `x .= op.(x, rhs)`, with the destination bound
    /// once (aliasing is handled by materialize's unalias pass).
    fn lower_dot_compound_assign(
        &mut self,
        b: &mut ChunkBuilder,
        op: Symbol,
        target: &Value,
        rhs: &Value,
    ) -> VmResult<()> {
        b.push_scope();
        let dest = b.bind_local(gensym("dest"));
        self.lower_expr(b, target)?;
        b.emit(Instr::LocalStore(dest));
        b.emit(Instr::LocalLoad(dest));
        b.emit(Instr::GlobalLoad(op));
        b.emit(Instr::LocalLoad(dest));
        self.lower_dot_operand(b, rhs)?;
        b.emit(Instr::BroadcastDot(2));
        b.emit(Instr::MaterializeInto);
        b.pop_scope();
        Ok(())
    }

    /// Lower an operand of a broadcast expression: nested dot syntax
    /// stays lazy, anything else evaluates normally.
    fn lower_dot_operand(&mut self, b: &mut ChunkBuilder, v: &Value) -> VmResult<()> {
        if let Value::Expr(e) = v {
            if Self::is_dot_expr(e) {
                return self.lower_dot_call(b, e);
            }
        }
        self.lower_expr(b, v)
    }

    fn is_dot_expr(e: &ExprValue) -> bool {
        match e.head.as_str() {
            "." => matches!(e.arg(1), Some(Value::Expr(t)) if t.head.as_str() == "tuple"),
            "call" => matches!(
                e.arg(0),
                Some(Value::Sym(op)) if op.as_str().len() > 1 && op.as_str().starts_with('.')
                    && op.as_str() != "..."
            ),
            _ => false,
        }
    }

    /// Build (without materializing) a `Broadcasted` for a dot
    /// expression.
    fn lower_dot_call(&mut self, b: &mut ChunkBuilder, e: &ExprValue) -> VmResult<()> {
        match e.head.as_str() {
            "." => {
                let args = e.arg_values();
                let Value::Expr(tuple) = &args[1] else {
                    return Err(VmError::Argument("malformed dot call".to_string()));
                };
                self.lower_expr(b, &args[0])?;
                let operands = tuple.arg_values();
                for operand in &operands {
                    self.lower_dot_operand(b, operand)?;
                }
                b.emit(Instr::BroadcastDot(operands.len() as u8));
            }
            "call" => {
                let args = e.arg_values();
                let Value::Sym(dotted) = &args[0] else {
                    return Err(VmError::Argument("malformed dot operator".to_string()));
                };
                let base = Symbol::intern(&dotted.as_str()[1..]);
                b.emit(Instr::GlobalLoad(base));
                for operand in &args[1..] {
                    self.lower_dot_operand(b, operand)?;
                }
                b.emit(Instr::BroadcastDot((args.len() - 1) as u8));
            }
            _ => unreachable!("guarded by is_dot_expr"),
        }
        Ok(())
    }

    fn lower_ref_load(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        self.lower_ref_parts(b, args)?;
        b.emit(Instr::IndexLoad((args.len() - 1) as u8));
        Ok(())
    }

    /// Push collection then indices, rewriting `end` markers to
    /// `lastindex` calls against a temporary.
    fn lower_ref_parts(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        let uses_end = args[1..].iter().any(contains_end_marker);
        if !uses_end {
            self.lower_expr(b, &args[0])?;
            for idx in &args[1..] {
                self.lower_expr(b, idx)?;
            }
            return Ok(());
        }
        b.push_scope();
        let tmp_name = gensym("coll");
        let tmp = b.bind_local(tmp_name);
        self.lower_expr(b, &args[0])?;
        b.emit(Instr::LocalStore(tmp));
        b.emit(Instr::LocalLoad(tmp));
        let multi = args.len() > 2;
        for (d, idx) in args[1..].iter().enumerate() {
            let replacement = if multi {
                Value::expr(
                    Symbol::intern("call"),
                    vec![
                        Value::symbol("lastindex"),
                        Value::Sym(tmp_name),
                        Value::I64(d as i64 + 1),
                    ],
                )
            } else {
                Value::expr(
                    Symbol::intern("call"),
                    vec![Value::symbol("lastindex"), Value::Sym(tmp_name)],
                )
            };
            let rewritten = substitute_end_marker(idx, &replacement);
            self.lower_expr(b, &rewritten)?;
        }
        b.pop_scope();
        Ok(())
    }

    fn lower_tuple(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        let named = args
            .iter()
            .all(|a| matches!(a, Value::Expr(e) if e.head.as_str() == "="));
        if named && !args.is_empty() {
            let mut names = Vec::with_capacity(args.len());
            for arg in args {
                let Value::Expr(kv) = arg else { unreachable!() };
                let parts = kv.arg_values();
                let Value::Sym(name) = &parts[0] else {
                    return Err(VmError::Argument(
                        "named tuple keys must be identifiers".to_string(),
                    ));
                };
                names.push(*name);
                self.lower_expr(b, &parts[1])?;
            }
            b.emit(Instr::MakeNamedTuple(names));
        } else {
            for arg in args {
                self.lower_expr(b, arg)?;
            }
            b.emit(Instr::MakeTuple(args.len() as u8));
        }
        Ok(())
    }

    fn lower_comprehension(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        let Some(Value::Expr(generator)) = args.first() else {
            return Err(VmError::Argument("malformed comprehension".to_string()));
        };
        let gen_args = generator.arg_values();
        let body = gen_args[0].clone();
        let (cond, binding) = match &gen_args[1] {
            Value::Expr(f) if f.head.as_str() == "filter" => {
                let filter_args = f.arg_values();
                (Some(filter_args[0].clone()), filter_args[1].clone())
            }
            other => (None, other.clone()),
        };

        b.push_scope();
        let acc = b.bind_local(gensym("acc"));
        b.emit(Instr::MakeArray {
            count: 0,
            shape: None,
        });
        b.emit(Instr::LocalStore(acc));

        let mut push_body = vec![Value::expr(
            Symbol::intern("call"),
            vec![
                Value::symbol("push!"),
                Value::Sym(b.chunk.slot_names[acc as usize]),
                body,
            ],
        )];
        if let Some(cond) = cond {
            push_body = vec![Value::expr(
                Symbol::intern("if"),
                vec![cond, push_body.pop().expect("push call")],
            )];
        }
        let loop_expr = Value::expr(
            Symbol::intern("for"),
            vec![
                binding,
                Value::expr(Symbol::intern("block"), push_body),
            ],
        );
        self.lower_expr(b, &loop_expr)?;
        b.emit(Instr::Pop);
        b.emit(Instr::LocalLoad(acc));
        b.emit(Instr::NarrowArray);
        b.pop_scope();
        Ok(())
    }

    // ── calls ─────────────────────────────────────────────────────────

    fn lower_call(&mut self, b: &mut ChunkBuilder, args: &[Value]) -> VmResult<()> {
        let callee = &args[0];
        let rest = &args[1..];

        // `throw`/`rethrow` are raise instructions: `rethrow()` reaches
        // into the active handler state, and `throw(x)` unwinds from
        // the exact raise site.
        if let Value::Sym(name) = callee {
            if name.as_str() == "rethrow" && rest.is_empty() {
                b.emit(Instr::Rethrow);
                return Ok(());
            }
            if name.as_str() == "throw" && rest.len() == 1 {
                self.lower_expr(b, &rest[0])?;
                b.emit(Instr::Throw);
                return Ok(());
            }
        }

        // Broadcast operators (`.+` and friends) route to the lazy path.
        if let Value::Sym(op) = callee {
            let name = op.as_str();
            if name.len() > 1 && name.starts_with('.') && name != "..." {
                let fake = ExprValue::new(
                    Symbol::intern("call"),
                    args.to_vec(),
                );
                self.lower_dot_call(b, &fake)?;
                b.emit(Instr::Materialize);
                return Ok(());
            }
        }

        // Split argument kinds.
        let mut positional: Vec<Value> = Vec::new();
        let mut keywords: Vec<(Symbol, Value)> = Vec::new();
        let mut kw_splats: Vec<Value> = Vec::new();
        for arg in rest {
            match arg {
                Value::Expr(e) if e.head.as_str() == "kw" => {
                    let kv = e.arg_values();
                    let Value::Sym(name) = &kv[0] else {
                        return Err(VmError::Argument(
                            "keyword argument name must be an identifier".to_string(),
                        ));
                    };
                    keywords.push((*name, kv[1].clone()));
                }
                Value::Expr(e) if e.head.as_str() == "parameters" => {
                    for kw in e.arg_values() {
                        match &kw {
                            Value::Expr(k) if k.head.as_str() == "kw" => {
                                let kv = k.arg_values();
                                let Value::Sym(name) = &kv[0] else {
                                    return Err(VmError::Argument(
                                        "keyword argument name must be an identifier"
                                            .to_string(),
                                    ));
                                };
                                keywords.push((*name, kv[1].clone()));
                            }
                            Value::Expr(k) if k.head.as_str() == "..." => {
                                kw_splats.push(k.arg_values()[0].clone());
                            }
                            Value::Sym(name) => {
                                // `f(; x)` shorthand for `x = x`.
                                keywords.push((*name, Value::Sym(*name)));
                            }
                            _ => {
                                return Err(VmError::Argument(
                                    "malformed keyword section".to_string(),
                                ))
                            }
                        }
                    }
                }
                other => positional.push(other.clone()),
            }
        }

        // Typed fast path: two-operand arithmetic with known operand
        // types compiles to a typed instruction instead of dispatch.
        if keywords.is_empty() && kw_splats.is_empty() && positional.len() == 2 {
            if let Value::Sym(op) = callee {
                if let Some(()) = self.try_lower_typed_binop(b, op.as_str(), &positional)? {
                    return Ok(());
                }
                // Ranges lower to their own constructor.
                if op.as_str() == ":" {
                    self.lower_expr(b, &positional[0])?;
                    self.lower_expr(b, &positional[1])?;
                    b.emit(Instr::MakeRange { has_step: false });
                    return Ok(());
                }
            }
        }
        if keywords.is_empty() && positional.len() == 3 {
            if let Value::Sym(op) = callee {
                if op.as_str() == ":" {
                    for part in &positional {
                        self.lower_expr(b, part)?;
                    }
                    b.emit(Instr::MakeRange { has_step: true });
                    return Ok(());
                }
            }
        }

        let splat_mask: Vec<bool> = positional
            .iter()
            .map(|a| matches!(a, Value::Expr(e) if e.head.as_str() == "..."))
            .collect();
        let has_splat = splat_mask.iter().any(|&x| x);

        self.lower_expr(b, callee)?;
        for arg in &positional {
            match arg {
                Value::Expr(e) if e.head.as_str() == "..." => {
                    self.lower_expr(b, &e.arg_values()[0])?;
                }
                other => self.lower_expr(b, other)?,
            }
        }

        if keywords.is_empty() && kw_splats.is_empty() {
            if has_splat {
                b.emit(Instr::CallSplat {
                    argc: positional.len() as u8,
                    splat_mask,
                });
            } else {
                b.emit(Instr::Call(positional.len() as u8));
            }
        } else {
            let mut kw_names: Vec<Symbol> = Vec::new();
            let mut kw_splat_mask: Vec<bool> = Vec::new();
            for (name, value) in &keywords {
                self.lower_expr(b, value)?;
                kw_names.push(*name);
                kw_splat_mask.push(false);
            }
            for splat in &kw_splats {
                self.lower_expr(b, splat)?;
                kw_names.push(Symbol::intern("#kwsplat"));
                kw_splat_mask.push(true);
            }
            if has_splat || kw_splat_mask.iter().any(|&x| x) {
                b.emit(Instr::CallKwSplat {
                    argc: positional.len() as u8,
                    splat_mask,
                    kw_names,
                    kw_splat_mask,
                });
            } else {
                b.emit(Instr::CallKw {
                    argc: positional.len() as u8,
                    kw_names,
                });
            }
        }
        Ok(())
    }

    /// Emit a typed arithmetic/comparison instruction when both operand
    /// types are statically known, inserting `Int64 → Float64`
    /// promotion where the types mix.
    fn try_lower_typed_binop(
        &mut self,
        b: &mut ChunkBuilder,
        op: &str,
        operands: &[Value],
    ) -> VmResult<Option<()>> {
        let arith = matches!(op, "+" | "-" | "*" | "/" | "%" | "÷" | "^");
        let cmp = matches!(op, "<" | "<=" | ">" | ">=" | "==" | "!=");
        if !arith && !cmp {
            return Ok(None);
        }
        let (Some(lt), Some(rt)) = (self.infer(b, &operands[0]), self.infer(b, &operands[1]))
        else {
            return Ok(None);
        };
        use StaticTy::*;
        let both_int = lt == I64 && rt == I64;
        let numeric =
            matches!(lt, I64 | F64) && matches!(rt, I64 | F64) && !(lt == Bool || rt == Bool);
        if !numeric {
            return Ok(None);
        }
        // Integer division and `^` keep their generic semantics unless
        // the result type is obvious.
        if both_int && op != "/" && op != "^" {
            self.lower_expr(b, &operands[0])?;
            self.lower_expr(b, &operands[1])?;
            b.emit(match op {
                "+" => Instr::AddI64,
                "-" => Instr::SubI64,
                "*" => Instr::MulI64,
                "%" => Instr::ModI64,
                "÷" => Instr::IntDivI64,
                "<" => Instr::LtI64,
                "<=" => Instr::LeI64,
                ">" => Instr::GtI64,
                ">=" => Instr::GeI64,
                "==" => Instr::EqI64,
                "!=" => Instr::NeI64,
                _ => return Ok(None),
            });
            return Ok(Some(()));
        }
        // Mixed or float operands: promote to Float64 and use the
        // float variant.
        if both_int && op != "/" {
            return Ok(None);
        }
        self.lower_expr(b, &operands[0])?;
        if lt == I64 {
            b.emit(Instr::I64ToF64);
        }
        self.lower_expr(b, &operands[1])?;
        if rt == I64 {
            b.emit(Instr::I64ToF64);
        }
        b.emit(match op {
            "+" => Instr::AddF64,
            "-" => Instr::SubF64,
            "*" => Instr::MulF64,
            "/" => Instr::DivF64,
            "^" => Instr::PowF64,
            "<" => Instr::LtF64,
            "<=" => Instr::LeF64,
            ">" => Instr::GtF64,
            ">=" => Instr::GeF64,
            "==" => Instr::EqF64,
            "!=" => Instr::NeF64,
            _ => return Ok(None),
        });
        Ok(Some(()))
    }

    /// Shallow static type of an expression, used only to pick typed
    /// instruction variants.
    fn infer(&self, b: &ChunkBuilder, v: &Value) -> Option<StaticTy> {
        match v {
            Value::I64(_) => Some(StaticTy::I64),
            Value::F64(_) => Some(StaticTy::F64),
            Value::Bool(_) => Some(StaticTy::Bool),
            Value::Sym(name) => b.lookup(*name).and_then(|slot| b.get_static(slot)),
            Value::Expr(e) if e.head.as_str() == "call" => {
                let args = e.arg_values();
                let Value::Sym(op) = args.first()? else {
                    return None;
                };
                if args.len() != 3 {
                    return None;
                }
                let lt = self.infer(b, &args[1])?;
                let rt = self.infer(b, &args[2])?;
                match op.as_str() {
                    "+" | "-" | "*" => match (lt, rt) {
                        (StaticTy::I64, StaticTy::I64) => Some(StaticTy::I64),
                        (StaticTy::F64, StaticTy::F64)
                        | (StaticTy::I64, StaticTy::F64)
                        | (StaticTy::F64, StaticTy::I64) => Some(StaticTy::F64),
                        _ => None,
                    },
                    "/" => match (lt, rt) {
                        (StaticTy::Bool, _) | (_, StaticTy::Bool) => None,
                        _ => Some(StaticTy::F64),
                    },
                    "<" | "<=" | ">" | ">=" | "==" | "!=" => match (lt, rt) {
                        (StaticTy::Bool, _) | (_, StaticTy::Bool) => None,
                        _ => Some(StaticTy::Bool),
                    },
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // ── closures ──────────────────────────────────────────────────────

    /// `params -> body`.
    fn lower_lambda(&mut self, b: &mut ChunkBuilder, params: &Value, body: &Value) -> VmResult<()> {
        let names: Vec<Symbol> = match params {
            Value::Sym(name) => vec![*name],
            Value::Expr(t) if t.head.as_str() == "tuple" => {
                let mut out = Vec::new();
                for p in t.arg_values() {
                    match p {
                        Value::Sym(name) => out.push(name),
                        Value::Expr(ty) if ty.head.as_str() == "::" => {
                            match ty.arg(0) {
                                Some(Value::Sym(name)) => out.push(name),
                                _ => {
                                    return Err(VmError::Argument(
                                        "unsupported lambda parameter".to_string(),
                                    ))
                                }
                            }
                        }
                        _ => {
                            return Err(VmError::Argument(
                                "unsupported lambda parameter".to_string(),
                            ))
                        }
                    }
                }
                out
            }
            _ => {
                return Err(VmError::Argument(
                    "unsupported lambda parameter list".to_string(),
                ))
            }
        };
        let name = gensym("anon");
        self.lower_closure_chunk(b, name, &names, body)
    }

    fn lower_inner_function(
        &mut self,
        b: &mut ChunkBuilder,
        sig: &Value,
        body: &Value,
    ) -> VmResult<()> {
        let (name, params) = function::simple_signature(sig)?;
        // Bind the name first so the closure can capture its own cell
        // (recursion).
        if b.lookup(name).is_none() {
            b.bind_local(name);
        }
        self.lower_closure_chunk(b, name, &params, body)?;
        b.emit(Instr::Dup);
        self.lower_name_store(b, name, None);
        Ok(())
    }

    fn lower_closure_chunk(
        &mut self,
        b: &mut ChunkBuilder,
        name: Symbol,
        params: &[Symbol],
        body: &Value,
    ) -> VmResult<()> {
        // Everything visible here is capturable from the inner chunk.
        let mut capturable: Vec<Symbol> = Vec::new();
        for scope in &b.scopes {
            capturable.extend(scope.keys().copied());
        }
        capturable.extend(b.capturable.iter().copied());

        let mut inner = ChunkBuilder::function(name, capturable);
        for &param in params {
            inner.bind_local(param);
        }
        self.lower_expr(&mut inner, body)?;
        inner.emit(Instr::Return);

        let captured = inner.captured.clone();
        let chunk = self.vm.program.add_chunk(inner.chunk);
        let mut capture_slots = Vec::with_capacity(captured.len());
        for cap in &captured {
            match b.lookup(*cap) {
                Some(slot) => capture_slots.push(slot),
                None => {
                    // Visible through the enclosing closure environment:
                    // materialize it into a local first.
                    let idx = b.capture_index(*cap).ok_or_else(|| {
                        VmError::Internal(format!("lost capture `{}`", cap))
                    })?;
                    b.emit(Instr::CapturedLoad(idx));
                    let slot = b.bind_local(*cap);
                    b.emit(Instr::LocalStore(slot));
                    capture_slots.push(slot);
                }
            }
        }
        b.emit(Instr::MakeClosure {
            chunk: chunk as u32,
            captures: capture_slots,
            nparams: params.len() as u8,
            name,
        });
        Ok(())
    }

    fn lower_quote(&mut self, b: &mut ChunkBuilder, inner: &Value, depth: usize) -> VmResult<()> {
        quoting::lower_quote(self, b, inner, depth)
    }

    fn lower_literal(&mut self, b: &mut ChunkBuilder, value: &Value) -> VmResult<()> {
        quoting::lower_literal(self, b, value)
    }
}

impl ChunkBuilder {
    fn patch_jump_to(&mut self, at: usize, target: usize) {
        match &mut self.chunk.code[at] {
            Instr::Branch(t) | Instr::BranchIf(t) | Instr::BranchIfNot(t) => {
                *t = target as u32
            }
            other => unreachable!("patching non-jump instruction {:?}", other),
        }
    }
}

/// A statement LHS that denotes a method definition (`f(x) = …`,
/// `f(x::T) where T = …`).
fn is_signature(v: &Value) -> bool {
    match v {
        Value::Expr(e) => match e.head.as_str() {
            "call" => matches!(e.arg(0), Some(Value::Sym(_))),
            "where" => e.arg(0).is_some_and(|inner| is_signature(&inner)),
            "::" => {
                e.arg_count() == 2 && e.arg(0).is_some_and(|inner| is_signature(&inner))
            }
            _ => false,
        },
        _ => false,
    }
}

fn contains_end_marker(v: &Value) -> bool {
    match v {
        Value::Expr(e) => {
            e.head.as_str() == "end" || e.arg_values().iter().any(contains_end_marker)
        }
        _ => false,
    }
}

fn substitute_end_marker(v: &Value, replacement: &Value) -> Value {
    match v {
        Value::Expr(e) => {
            if e.head.as_str() == "end" {
                return replacement.clone();
            }
            let args = e
                .arg_values()
                .iter()
                .map(|a| substitute_end_marker(a, replacement))
                .collect();
            Value::expr(e.head, args)
        }
        other => other.clone(),
    }
}
