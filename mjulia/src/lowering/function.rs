//! Definition lowering: methods, macros, structs, abstract types.
//!
//! A method body becomes a chunk whose leading slots follow the calling
//! convention: positional params, the vararg tuple, declared keywords,
//! the `kwargs...` NamedTuple, then `where` parameters (bound to type
//! values by dispatch). Keyword defaults compile into a prologue that
//! fills still-`#undef` slots; required keywords raise from there.
//! Optional positionals expand into forwarding methods, one per arity.

use super::{ChunkBuilder, Lowerer};
use crate::dispatch::{KwParam, Method, MethodBody, Param, VarargSpec};
use crate::error::{VmError, VmResult};
use crate::interner::{gensym, Symbol};
use crate::ir::{Const, Instr};
use crate::types::{StructDef, Ty, TypeParam};
use crate::values::{ExprValue, Value};

/// A parsed positional parameter.
struct PosParam {
    name: Symbol,
    ty: Ty,
    default: Option<Value>,
}

/// A parsed keyword parameter.
struct KwParsed {
    name: Symbol,
    default: Option<Value>,
}

struct Signature {
    name: Symbol,
    positional: Vec<PosParam>,
    vararg: Option<VarargSpec>,
    keywords: Vec<KwParsed>,
    kw_vararg: Option<Symbol>,
    where_params: Vec<TypeParam>,
}

impl Lowerer<'_> {
    /// Register a `function … end` or short-form method definition.
    pub fn register_function_def(&mut self, sig: &Value, body: &Value) -> VmResult<Symbol> {
        let signature = self.parse_signature(sig)?;
        let body = recognize_generated(body);

        // Main chunk, covering the full arity.
        let mut b = ChunkBuilder::function(signature.name, Vec::new());
        for p in &signature.positional {
            let slot = b.bind_local(p.name);
            match &p.ty {
                Ty::Int64 => b.set_static(slot, Some(super::StaticTy::I64)),
                Ty::Float64 => b.set_static(slot, Some(super::StaticTy::F64)),
                Ty::Bool => b.set_static(slot, Some(super::StaticTy::Bool)),
                _ => {}
            }
        }
        if let Some(vararg) = &signature.vararg {
            b.bind_local(vararg.name);
        }
        let mut kw_slots = Vec::new();
        for kw in &signature.keywords {
            kw_slots.push((b.bind_local(kw.name), kw));
        }
        if let Some(kv) = signature.kw_vararg {
            b.bind_local(kv);
        }
        for tp in &signature.where_params {
            b.bind_local(tp.name);
        }

        // Keyword prologue: defaults for absent optionals, errors for
        // absent required keywords.
        for (slot, kw) in &kw_slots {
            b.emit(Instr::LocalIsUndef(*slot));
            let skip = b.emit(Instr::BranchIfNot(0));
            match &kw.default {
                Some(default) => {
                    self.lower_expr(&mut b, default)?;
                    b.emit(Instr::LocalStore(*slot));
                }
                None => {
                    b.emit(Instr::GlobalLoad(Symbol::intern("#kwerr")));
                    b.emit(Instr::ConstLoad(Const::Sym(kw.name)));
                    b.emit(Instr::Call(1));
                    b.emit(Instr::Pop);
                }
            }
            b.patch_jump(skip);
        }

        self.lower_expr(&mut b, &body)?;
        b.emit(Instr::Return);
        let chunk = self.vm.program.add_chunk(b.chunk);

        let required = signature
            .positional
            .iter()
            .take_while(|p| p.default.is_none())
            .count();
        let total = signature.positional.len();

        self.vm.registry.add_method(
            signature.name,
            Method {
                params: signature
                    .positional
                    .iter()
                    .map(|p| Param {
                        name: p.name,
                        ty: p.ty.clone(),
                    })
                    .collect(),
                vararg: signature.vararg.clone(),
                kwparams: signature
                    .keywords
                    .iter()
                    .map(|k| KwParam {
                        name: k.name,
                        required: k.default.is_none(),
                    })
                    .collect(),
                kw_vararg: signature.kw_vararg,
                where_params: signature.where_params.clone(),
                body: MethodBody::Chunk(chunk),
                order: 0,
            },
        );

        // Forwarding methods for each reduced arity: compute the
        // missing defaults (earlier params are in scope) and call the
        // full method.
        for arity in required..total {
            let mut fwd = ChunkBuilder::function(signature.name, Vec::new());
            for p in signature.positional.iter().take(arity) {
                fwd.bind_local(p.name);
            }
            fwd.emit(Instr::GlobalLoad(signature.name));
            for i in 0..total {
                if i < arity {
                    let slot = fwd
                        .lookup(signature.positional[i].name)
                        .expect("parameter bound above");
                    fwd.emit(Instr::LocalLoad(slot));
                } else {
                    let default = signature.positional[i]
                        .default
                        .clone()
                        .expect("defaults are trailing");
                    self.lower_expr(&mut fwd, &default)?;
                    let slot = fwd.bind_local(signature.positional[i].name);
                    fwd.emit(Instr::LocalStore(slot));
                    fwd.emit(Instr::LocalLoad(slot));
                }
            }
            fwd.emit(Instr::Call(total as u8));
            fwd.emit(Instr::Return);
            let fwd_chunk = self.vm.program.add_chunk(fwd.chunk);
            self.vm.registry.add_method(
                signature.name,
                Method {
                    params: signature
                        .positional
                        .iter()
                        .take(arity)
                        .map(|p| Param {
                            name: p.name,
                            ty: p.ty.clone(),
                        })
                        .collect(),
                    vararg: None,
                    kwparams: Vec::new(),
                    kw_vararg: None,
                    // The forwarder carries no where-parameters of its
                    // own: type variables in the kept parameter types
                    // still bind (and the full method re-derives them),
                    // and declaring them here would shift its slots.
                    where_params: Vec::new(),
                    body: MethodBody::Chunk(fwd_chunk),
                    order: 0,
                },
            );
        }

        Ok(signature.name)
    }

    /// Register `macro name(args…) body end`.
    pub fn register_macro_def(&mut self, sig: &Value, body: &Value) -> VmResult<Symbol> {
        let signature = self.parse_signature(sig)?;
        let mut b = ChunkBuilder::function(signature.name, Vec::new());
        for p in &signature.positional {
            b.bind_local(p.name);
        }
        if let Some(vararg) = &signature.vararg {
            b.bind_local(vararg.name);
        }
        self.lower_expr(&mut b, body)?;
        b.emit(Instr::Return);
        let chunk = self.vm.program.add_chunk(b.chunk);
        let macro_name = Symbol::intern(&format!("@{}", signature.name));
        self.vm.macros.insert(
            macro_name,
            crate::vm::MacroDef {
                chunk,
                nparams: signature.positional.len(),
                vararg: signature.vararg.is_some(),
            },
        );
        Ok(macro_name)
    }

    /// Register `struct`/`mutable struct`.
    pub fn register_struct_def(
        &mut self,
        mutable: &Value,
        sig: &Value,
        body: &Value,
    ) -> VmResult<Symbol> {
        let mutable = matches!(mutable, Value::Bool(true));
        let (head, supertype) = split_supertype(sig);
        let (name, params) = parse_type_head(&head)?;
        let where_params: Vec<TypeParam> = params
            .iter()
            .map(|&p| TypeParam::unbounded(p))
            .collect();
        let supertype = match supertype {
            Some(s) => self.resolve_sig_ty(&s, &where_params)?,
            None => Ty::Any,
        };
        let mut fields = Vec::new();
        if let Value::Expr(block) = body {
            for stmt in block.arg_values() {
                match &stmt {
                    Value::LineNumberNode(_) => {}
                    Value::Sym(fname) => fields.push((*fname, Ty::Any)),
                    Value::Expr(t) if t.head.as_str() == "::" => {
                        let parts = t.arg_values();
                        let Value::Sym(fname) = &parts[0] else {
                            return Err(VmError::Argument(
                                "struct field name must be an identifier".to_string(),
                            ));
                        };
                        let fty = self.resolve_sig_ty(&parts[1], &where_params)?;
                        fields.push((*fname, fty));
                    }
                    // Inner constructors are outside the supported
                    // subset; field declarations only.
                    _ => {}
                }
            }
        }
        self.vm.types.define_struct(StructDef {
            name,
            params,
            supertype,
            fields,
            mutable,
        });
        Ok(name)
    }

    /// Register `abstract type Name [<: Super] end`.
    pub fn register_abstract_def(&mut self, sig: &Value) -> VmResult<Symbol> {
        let (head, supertype) = split_supertype(sig);
        let (name, _) = parse_type_head(&head)?;
        let supertype = match supertype {
            Some(s) => self.resolve_sig_ty(&s, &[])?,
            None => Ty::Any,
        };
        self.vm.types.define_abstract(name, supertype);
        Ok(name)
    }

    // ── signature parsing ─────────────────────────────────────────────

    fn parse_signature(&mut self, sig: &Value) -> VmResult<Signature> {
        let mut where_params: Vec<TypeParam> = Vec::new();
        let mut current = sig.clone();

        // Peel return-type annotation and where clauses, outermost in.
        loop {
            let Value::Expr(e) = &current else { break };
            match e.head.as_str() {
                "where" => {
                    let args = e.arg_values();
                    for var in &args[1..] {
                        where_params.push(self.parse_where_var(var)?);
                    }
                    current = args[0].clone();
                }
                "::" if e.arg_count() == 2 => {
                    // Return type annotation: checked semantics are the
                    // callee's business; the signature just strips it.
                    current = e.arg(0).expect("two-argument ::");
                }
                _ => break,
            }
        }

        let Value::Expr(call) = &current else {
            return Err(VmError::Argument("malformed method signature".to_string()));
        };
        if call.head.as_str() != "call" {
            return Err(VmError::Argument("malformed method signature".to_string()));
        }
        let call_args = call.arg_values();
        let Value::Sym(name) = &call_args[0] else {
            return Err(VmError::Argument(
                "method name must be an identifier".to_string(),
            ));
        };

        let mut positional = Vec::new();
        let mut vararg = None;
        let mut keywords = Vec::new();
        let mut kw_vararg = None;

        for arg in &call_args[1..] {
            match arg {
                Value::Expr(p) if p.head.as_str() == "parameters" => {
                    for kw in p.arg_values() {
                        match &kw {
                            Value::Sym(kname) => keywords.push(KwParsed {
                                name: *kname,
                                default: None,
                            }),
                            Value::Expr(t) if t.head.as_str() == "::" => {
                                let (kname, _) = self.parse_param_inner(t, &where_params)?;
                                keywords.push(KwParsed {
                                    name: kname,
                                    default: None,
                                });
                            }
                            Value::Expr(k) if k.head.as_str() == "kw" => {
                                let parts = k.arg_values();
                                let kname = param_name(&parts[0])?;
                                keywords.push(KwParsed {
                                    name: kname,
                                    default: Some(parts[1].clone()),
                                });
                            }
                            Value::Expr(s) if s.head.as_str() == "..." => {
                                kw_vararg = Some(param_name(&s.arg_values()[0])?);
                            }
                            _ => {
                                return Err(VmError::Argument(
                                    "malformed keyword parameter".to_string(),
                                ))
                            }
                        }
                    }
                }
                Value::Expr(s) if s.head.as_str() == "..." => {
                    let inner = s.arg_values()[0].clone();
                    let (vname, vty) = match &inner {
                        Value::Sym(n) => (*n, Ty::Any),
                        Value::Expr(t) if t.head.as_str() == "::" => {
                            self.parse_param_inner(t, &where_params)?
                        }
                        _ => {
                            return Err(VmError::Argument(
                                "malformed vararg parameter".to_string(),
                            ))
                        }
                    };
                    vararg = Some(VarargSpec {
                        name: vname,
                        elem: vty,
                    });
                }
                Value::Expr(k) if k.head.as_str() == "kw" => {
                    let parts = k.arg_values();
                    let (pname, pty) = match &parts[0] {
                        Value::Sym(n) => (*n, Ty::Any),
                        Value::Expr(t) if t.head.as_str() == "::" => {
                            self.parse_param_inner(t, &where_params)?
                        }
                        _ => {
                            return Err(VmError::Argument(
                                "malformed optional parameter".to_string(),
                            ))
                        }
                    };
                    positional.push(PosParam {
                        name: pname,
                        ty: pty,
                        default: Some(parts[1].clone()),
                    });
                }
                Value::Sym(pname) => positional.push(PosParam {
                    name: *pname,
                    ty: Ty::Any,
                    default: None,
                }),
                Value::Expr(t) if t.head.as_str() == "::" => {
                    let (pname, pty) = self.parse_param_inner(t, &where_params)?;
                    positional.push(PosParam {
                        name: pname,
                        ty: pty,
                        default: None,
                    });
                }
                _ => {
                    return Err(VmError::Argument(
                        "malformed method parameter".to_string(),
                    ))
                }
            }
        }

        Ok(Signature {
            name: *name,
            positional,
            vararg,
            keywords,
            kw_vararg,
            where_params,
        })
    }

    fn parse_where_var(&mut self, var: &Value) -> VmResult<TypeParam> {
        match var {
            Value::Sym(name) => Ok(TypeParam::unbounded(*name)),
            Value::Expr(e) if e.head.as_str() == "<:" => {
                let parts = e.arg_values();
                let Value::Sym(name) = &parts[0] else {
                    return Err(VmError::Argument(
                        "type variable must be an identifier".to_string(),
                    ));
                };
                let upper = self.resolve_sig_ty(&parts[1], &[])?;
                Ok(TypeParam {
                    name: *name,
                    upper: Some(upper),
                    lower: None,
                })
            }
            Value::Expr(e) if e.head.as_str() == ">:" => {
                let parts = e.arg_values();
                let Value::Sym(name) = &parts[0] else {
                    return Err(VmError::Argument(
                        "type variable must be an identifier".to_string(),
                    ));
                };
                let lower = self.resolve_sig_ty(&parts[1], &[])?;
                Ok(TypeParam {
                    name: *name,
                    upper: None,
                    lower: Some(lower),
                })
            }
            _ => Err(VmError::Argument(
                "malformed where clause".to_string(),
            )),
        }
    }

    /// `name::T` (or `::T` unnamed) → (name, resolved type).
    fn parse_param_inner(
        &mut self,
        t: &ExprValue,
        where_params: &[TypeParam],
    ) -> VmResult<(Symbol, Ty)> {
        let parts = t.arg_values();
        match parts.len() {
            1 => {
                let ty = self.resolve_sig_ty(&parts[0], where_params)?;
                Ok((gensym("unused"), ty))
            }
            2 => {
                let Value::Sym(name) = &parts[0] else {
                    return Err(VmError::Argument(
                        "parameter name must be an identifier".to_string(),
                    ));
                };
                let ty = self.resolve_sig_ty(&parts[1], where_params)?;
                Ok((*name, ty))
            }
            _ => Err(VmError::Argument("malformed parameter".to_string())),
        }
    }

    /// Resolve a type expression in a signature, statically.
    pub fn resolve_sig_ty(
        &mut self,
        expr: &Value,
        where_params: &[TypeParam],
    ) -> VmResult<Ty> {
        match expr {
            Value::Sym(name) => {
                if let Some(tp) = where_params.iter().find(|p| p.name == *name) {
                    return Ok(Ty::Var {
                        name: *name,
                        upper: tp.upper.clone().map(Box::new),
                    });
                }
                if let Some(ty) = Ty::builtin(name.as_str()) {
                    return Ok(ty);
                }
                if self.vm.types.structs.contains_key(name) {
                    return Ok(Ty::Struct {
                        name: *name,
                        params: vec![],
                    });
                }
                if self.vm.types.abstract_supers.contains_key(name) {
                    return Ok(Ty::AbstractUser(*name));
                }
                Err(VmError::UndefVar(*name))
            }
            Value::Expr(e) if e.head.as_str() == "curly" => {
                let args = e.arg_values();
                let Value::Sym(base) = &args[0] else {
                    return Err(VmError::Argument(
                        "parametric type base must be a name".to_string(),
                    ));
                };
                let params: Vec<Ty> = args[1..]
                    .iter()
                    .map(|a| self.resolve_sig_ty(a, where_params))
                    .collect::<VmResult<_>>()?;
                Ok(match base.as_str() {
                    "Vector" => Ty::VectorOf(Box::new(params[0].clone())),
                    "Matrix" => Ty::MatrixOf(Box::new(params[0].clone())),
                    "SubArray" => Ty::SubArrayOf(Box::new(params[0].clone())),
                    "Tuple" => Ty::TupleOf(params),
                    "Union" => Ty::union_of(params),
                    "Type" => Ty::TypeOf(Box::new(params[0].clone())),
                    "Dict" => Ty::Dict,
                    "Set" => Ty::Set,
                    _ => {
                        if self.vm.types.structs.contains_key(base) {
                            Ty::Struct {
                                name: *base,
                                params,
                            }
                        } else {
                            return Err(VmError::UndefVar(*base));
                        }
                    }
                })
            }
            Value::Expr(e) if e.head.as_str() == "where" => {
                let args = e.arg_values();
                let mut inner_params = where_params.to_vec();
                let mut vars = Vec::new();
                for var in &args[1..] {
                    let tp = self.parse_where_var(var)?;
                    vars.push(tp.clone());
                    inner_params.push(tp);
                }
                let mut body = self.resolve_sig_ty(&args[0], &inner_params)?;
                for tp in vars.into_iter().rev() {
                    body = Ty::UnionAll {
                        var: tp.name,
                        lower: tp.lower.map(Box::new),
                        upper: tp.upper.map(Box::new),
                        body: Box::new(body),
                    };
                }
                Ok(body)
            }
            Value::Expr(e) if e.head.as_str() == "." => {
                // Module-qualified: only the final name matters here.
                match e.arg(1) {
                    Some(Value::QuoteNode(inner)) => match &*inner {
                        Value::Sym(name) => self.resolve_sig_ty(&Value::Sym(*name), where_params),
                        _ => Err(VmError::Argument("malformed type name".to_string())),
                    },
                    _ => Err(VmError::Argument("malformed type name".to_string())),
                }
            }
            other => Err(VmError::Argument(format!(
                "unsupported type expression: {}",
                crate::values::display_value(other)
            ))),
        }
    }
}

/// `Name <: Super` → (Name-part, Some(Super)); otherwise (sig, None).
fn split_supertype(sig: &Value) -> (Value, Option<Value>) {
    if let Value::Expr(e) = sig {
        if e.head.as_str() == "<:" {
            let args = e.arg_values();
            return (args[0].clone(), Some(args[1].clone()));
        }
    }
    (sig.clone(), None)
}

/// `Name` or `Name{T, S}` → (name, param names).
fn parse_type_head(head: &Value) -> VmResult<(Symbol, Vec<Symbol>)> {
    match head {
        Value::Sym(name) => Ok((*name, vec![])),
        Value::Expr(e) if e.head.as_str() == "curly" => {
            let args = e.arg_values();
            let Value::Sym(name) = &args[0] else {
                return Err(VmError::Argument(
                    "type name must be an identifier".to_string(),
                ));
            };
            let mut params = Vec::new();
            for p in &args[1..] {
                match p {
                    Value::Sym(pname) => params.push(*pname),
                    Value::Expr(b) if b.head.as_str() == "<:" => {
                        let parts = b.arg_values();
                        let Value::Sym(pname) = &parts[0] else {
                            return Err(VmError::Argument(
                                "type parameter must be an identifier".to_string(),
                            ));
                        };
                        params.push(*pname);
                    }
                    _ => {
                        return Err(VmError::Argument(
                            "type parameter must be an identifier".to_string(),
                        ))
                    }
                }
            }
            Ok((*name, params))
        }
        _ => Err(VmError::Argument(
            "type name must be an identifier".to_string(),
        )),
    }
}

/// Inner-function signature: plain name + plain parameter names.
pub(crate) fn simple_signature(sig: &Value) -> VmResult<(Symbol, Vec<Symbol>)> {
    let Value::Expr(call) = sig else {
        return Err(VmError::Argument("malformed function signature".to_string()));
    };
    if call.head.as_str() != "call" {
        return Err(VmError::Argument("malformed function signature".to_string()));
    }
    let args = call.arg_values();
    let Value::Sym(name) = &args[0] else {
        return Err(VmError::Argument(
            "function name must be an identifier".to_string(),
        ));
    };
    let mut params = Vec::new();
    for p in &args[1..] {
        params.push(param_name(p)?);
    }
    Ok((*name, params))
}

fn param_name(p: &Value) -> VmResult<Symbol> {
    match p {
        Value::Sym(name) => Ok(*name),
        Value::Expr(t) if t.head.as_str() == "::" && t.arg_count() == 2 => {
            match t.arg(0) {
                Some(Value::Sym(name)) => Ok(name),
                _ => Err(VmError::Argument(
                    "parameter name must be an identifier".to_string(),
                )),
            }
        }
        _ => Err(VmError::Argument(
            "parameter name must be an identifier".to_string(),
        )),
    }
}

/// Recognize the `if @generated … else … end` single-branch pattern and
/// substitute the quoted body.
fn recognize_generated(body: &Value) -> Value {
    let Value::Expr(block) = body else {
        return body.clone();
    };
    let stmts: Vec<Value> = block
        .arg_values()
        .into_iter()
        .filter(|s| !matches!(s, Value::LineNumberNode(_)))
        .collect();
    if stmts.len() != 1 {
        return body.clone();
    }
    let Value::Expr(ifexpr) = &stmts[0] else {
        return body.clone();
    };
    if ifexpr.head.as_str() != "if" {
        return body.clone();
    }
    let args = ifexpr.arg_values();
    let is_generated_cond = matches!(
        args.first(),
        Some(Value::Expr(mc)) if mc.head.as_str() == "macrocall"
            && matches!(mc.arg(0), Some(Value::Sym(n)) if n.as_str() == "@generated")
    );
    if !is_generated_cond {
        return body.clone();
    }
    // Use the quoted expression of the true branch, literally.
    if let Some(then) = args.get(1) {
        if let Some(quoted) = find_quote(then) {
            return quoted;
        }
    }
    body.clone()
}

fn find_quote(v: &Value) -> Option<Value> {
    match v {
        Value::Expr(e) if e.head.as_str() == "quote" => e.arg(0),
        Value::Expr(e) if e.head.as_str() == "block" => {
            let stmts: Vec<Value> = e
                .arg_values()
                .into_iter()
                .filter(|s| !matches!(s, Value::LineNumberNode(_)))
                .collect();
            stmts.last().and_then(find_quote)
        }
        _ => None,
    }
}
