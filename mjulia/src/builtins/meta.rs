//! Reflection, metaprogramming, and the eval/include surface.
//!
//! `eval`, `include_string`, `evalfile`, and `macroexpand` all share
//! the one pipeline: parse → macro-expand → lower → interpret, against
//! the live global environment.

use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::interner::{gensym, Symbol};
use crate::lowering::{convert, eval_value, macros};
use crate::types::Ty;
use crate::values::{display_value, ExprValue, Value};
use crate::vm::Vm;

use super::{def, def_vararg};

pub fn register(vm: &mut Vm) {
    def(vm, "typeof", &[Ty::Any], |_, _, args, _| {
        Ok(match &args[0] {
            // The type of a type is DataType.
            Value::Type(_) => Value::ty(Ty::DataType),
            other => Value::ty(other.runtime_ty()),
        })
    });
    def(vm, "isa", &[Ty::Any, Ty::Type], |vm, _, args, _| {
        let Value::Type(t) = &args[1] else { unreachable!() };
        Ok(Value::Bool(vm.types.is_subtype(&args[0].runtime_ty(), t)))
    });
    def(vm, "<:", &[Ty::Type, Ty::Type], |vm, _, args, _| {
        let (Value::Type(a), Value::Type(b)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(vm.types.is_subtype(a, b)))
    });
    def(vm, "supertype", &[Ty::Type], |vm, _, args, _| {
        let Value::Type(t) = &args[0] else { unreachable!() };
        Ok(Value::ty(vm.types.direct_super(t).unwrap_or(Ty::Any)))
    });
    def(vm, "isconcretetype", &[Ty::Type], |_, _, args, _| {
        let Value::Type(t) = &args[0] else { unreachable!() };
        Ok(Value::Bool(t.is_concrete()))
    });
    def(vm, "isabstracttype", &[Ty::Type], |_, _, args, _| {
        let Value::Type(t) = &args[0] else { unreachable!() };
        Ok(Value::Bool(!t.is_concrete() && !matches!(t.as_ref(), Ty::Bottom)))
    });
    def_vararg(vm, "apply_type", &[Ty::Type], Ty::Type, apply_type_entry);

    def(vm, "fieldnames", &[Ty::Type], |vm, _, args, _| {
        let Value::Type(t) = &args[0] else { unreachable!() };
        let Ty::Struct { name, .. } = t.as_ref() else {
            return Err(VmError::Argument(format!(
                "fieldnames: {} is not a struct type",
                t
            )));
        };
        let def = vm
            .types
            .structs
            .get(name)
            .ok_or_else(|| VmError::UndefVar(*name))?;
        Ok(Value::tuple(
            def.fields.iter().map(|(f, _)| Value::Sym(*f)).collect(),
        ))
    });
    def(vm, "nfields", &[Ty::Any], |_, _, args, _| {
        Ok(Value::I64(match &args[0] {
            Value::Struct(s) => s.fields.len() as i64,
            Value::MutStruct(s) => s.borrow().fields.len() as i64,
            Value::NamedTuple(nt) => nt.values.len() as i64,
            _ => 0,
        }))
    });
    def(vm, "getfield", &[Ty::Any, Ty::Symbol], |vm, _, args, _| {
        let Value::Sym(field) = &args[1] else { unreachable!() };
        crate::vm::access::field_load(&vm.types, &args[0], *field)
    });
    def(
        vm,
        "setfield!",
        &[Ty::Any, Ty::Symbol, Ty::Any],
        |vm, _, args, _| {
            let Value::Sym(field) = &args[1] else { unreachable!() };
            crate::vm::access::field_store(&vm.types, &args[0], *field, args[2].clone())?;
            Ok(args[2].clone())
        },
    );

    def(vm, "throw", &[Ty::Any], |_, _, args, _| {
        Err(VmError::UserThrow(args[0].clone()))
    });
    def_vararg(vm, "error", &[], Ty::Any, |_, _, args, _| {
        let msg: String = args.iter().map(display_value).collect();
        Err(VmError::UserThrow(crate::vm::error_exception(&msg)))
    });
    def(vm, "#kwerr", &[Ty::Symbol], |_, _, args, _| {
        let Value::Sym(name) = &args[0] else { unreachable!() };
        Err(VmError::UndefKeyword(*name))
    });

    def(vm, "gensym", &[], |_, _, _args, _| {
        Ok(Value::Sym(gensym("g")))
    });
    def(vm, "gensym", &[Ty::String], |_, _, args, _| {
        let Value::Str(base) = &args[0] else { unreachable!() };
        Ok(Value::Sym(gensym(base)))
    });
    def(vm, "esc", &[Ty::Any], |_, _, args, _| {
        Ok(Value::expr(Symbol::intern("escape"), vec![args[0].clone()]))
    });
    def(vm, "Symbol", &[Ty::Any], |_, _, args, _| {
        Ok(match &args[0] {
            Value::Sym(s) => Value::Sym(*s),
            other => Value::symbol(&display_value(other)),
        })
    });
    def_vararg(vm, "Expr", &[Ty::Symbol], Ty::Any, |_, _, args, _| {
        let Value::Sym(head) = &args[0] else { unreachable!() };
        Ok(Value::Expr(Rc::new(ExprValue::new(
            *head,
            args[1..].to_vec(),
        ))))
    });
    def(vm, "QuoteNode", &[Ty::Any], |_, _, args, _| {
        Ok(Value::QuoteNode(Rc::new(args[0].clone())))
    });

    def(vm, "eval", &[Ty::Any], |vm, _, args, _| eval_ast(vm, &args[0]));
    def(vm, "macroexpand", &[Ty::Any], |vm, _, args, _| {
        macros::expand(vm, &args[0])
    });
    // In-place variant: same expansion, and the tree is returned for
    // chaining either way.
    def(vm, "macroexpand!", &[Ty::Any], |vm, _, args, _| {
        macros::expand(vm, &args[0])
    });
    def(vm, "parse_expr", &[Ty::String], |_, _, args, _| {
        let Value::Str(src) = &args[0] else { unreachable!() };
        let node = mjulia_parser::parse_expression(src)
            .map_err(|e| VmError::Parse(e.to_string()))?;
        Ok(convert::syn_to_value(&node))
    });
    def(vm, "include_string", &[Ty::String], |vm, _, args, _| {
        let Value::Str(src) = &args[0] else { unreachable!() };
        include_string(vm, src)
    });
    def(vm, "include", &[Ty::String], |vm, _, args, _| {
        let Value::Str(path) = &args[0] else { unreachable!() };
        let source = std::fs::read_to_string(&**path).map_err(|e| VmError::Load {
            file: path.to_string(),
            inner: Box::new(VmError::Argument(e.to_string())),
        })?;
        include_string(vm, &source).map_err(|e| VmError::Load {
            file: path.to_string(),
            inner: Box::new(e),
        })
    });
    def(vm, "evalfile", &[Ty::String], |vm, _, args, _| {
        let Value::Str(path) = &args[0] else { unreachable!() };
        let source = std::fs::read_to_string(&**path).map_err(|e| VmError::Load {
            file: path.to_string(),
            inner: Box::new(VmError::Argument(e.to_string())),
        })?;
        include_string(vm, &source).map_err(|e| VmError::Load {
            file: path.to_string(),
            inner: Box::new(e),
        })
    });

    // Broadcast surface: the lazy constructor and the forcing verbs.
    def_vararg(vm, "broadcasted", &[Ty::Any], Ty::Any, |_, _, args, _| {
        Ok(crate::broadcast::broadcasted(
            args[0].clone(),
            args[1..].to_vec(),
        ))
    });
    def(vm, "materialize", &[Ty::Any], |vm, _, args, _| {
        crate::broadcast::materialize(vm, &args[0])
    });
    def(vm, "materialize!", &[Ty::Any, Ty::Any], |vm, _, args, _| {
        crate::broadcast::materialize_into(vm, &args[0], &args[1])
    });
    def_vararg(vm, "broadcast", &[Ty::Any], Ty::Any, |vm, _, args, _| {
        crate::broadcast::broadcast_call(vm, &args[0], &args[1..])
    });
    def_vararg(
        vm,
        "broadcast!",
        &[Ty::Any, Ty::Any],
        Ty::Any,
        |vm, _, args, _| {
            let bc = crate::broadcast::broadcasted(args[0].clone(), args[2..].to_vec());
            crate::broadcast::materialize_into(vm, &args[1], &bc)
        },
    );
}

/// Evaluate an AST value against the global environment. Quoted
/// fragments unwrap; bare symbols resolve as globals; literals are
/// themselves.
fn eval_ast(vm: &mut Vm, ast: &Value) -> VmResult<Value> {
    match ast {
        Value::Expr(_) => eval_value(vm, ast),
        Value::QuoteNode(inner) => Ok((**inner).clone()),
        Value::Sym(name) => vm.resolve_global(*name),
        literal => Ok(literal.clone()),
    }
}

/// Parse and evaluate a whole source text, statement by statement, so
/// earlier definitions (macros included) are visible to later ones.
pub fn include_string(vm: &mut Vm, source: &str) -> VmResult<Value> {
    let nodes = mjulia_parser::parse_program(source)
        .map_err(|e| VmError::Parse(e.to_string()))?;
    let mut last = Value::Nothing;
    for node in &nodes {
        let line = node.span().map(|s| s.line);
        let ast = convert::syn_to_value(node);
        match eval_value(vm, &ast) {
            Ok(value) => last = value,
            Err(err) => {
                // Best-effort location: the statement's own line when
                // nothing finer was recorded.
                if vm.error_line.is_none() {
                    vm.error_line = line;
                }
                return Err(err);
            }
        }
    }
    Ok(last)
}

fn apply_type_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let Value::Type(base) = &args[0] else { unreachable!() };
    let params: Vec<Ty> = args[1..]
        .iter()
        .map(|a| match a {
            Value::Type(t) => Ok((**t).clone()),
            other => Err(VmError::Type(format!(
                "type parameter must be a type, got {}",
                other.runtime_ty()
            ))),
        })
        .collect::<VmResult<_>>()?;
    Ok(Value::ty(match base.as_ref() {
        Ty::UnionAll { .. } => {
            // One application per leading quantifier.
            let mut t = (**base).clone();
            for p in &params {
                t = t.instantiate(p);
            }
            t
        }
        Ty::Array => match params.len() {
            1 => Ty::VectorOf(Box::new(params[0].clone())),
            _ => Ty::Array,
        },
        Ty::Tuple => Ty::TupleOf(params),
        Ty::Type => Ty::TypeOf(Box::new(params[0].clone())),
        Ty::Dict => Ty::Dict,
        Ty::Set => Ty::Set,
        Ty::Struct { name, .. } => Ty::Struct {
            name: *name,
            params,
        },
        other => {
            // `Union{…}` arrives as the base value of the Union global.
            if matches!(other, Ty::Bottom) {
                Ty::union_of(params)
            } else {
                return Err(VmError::Type(format!(
                    "{} does not accept type parameters",
                    other
                )));
            }
        }
    }))
}
