//! Macro expansion.
//!
//! User macros run their lowered body against the raw argument
//! expressions and splice the returned tree in place, after hygiene:
//! symbols the expansion *introduces* (`local` declarations, `let` and
//! `for` bindings, lambda parameters) are renamed with `gensym` unless
//! escaped, and one `esc` wrapper level is stripped per traversal.
//! A handful of macros (`@assert`, `@show`, timing, `@.`) are built in.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::interner::{gensym, Symbol};
use crate::values::{ExprValue, Value};
use crate::vm::Vm;

/// Expand every macro call in `value`, outside-in, to a fixed point.
pub fn expand(vm: &mut Vm, value: &Value) -> VmResult<Value> {
    match value {
        Value::Expr(e) => {
            let head = e.head;
            if head.as_str() == "macrocall" {
                return expand_macrocall(vm, e);
            }
            // Quoted code expands when it is itself evaluated.
            if head.as_str() == "quote" {
                return Ok(value.clone());
            }
            let mut args = Vec::with_capacity(e.arg_count());
            for arg in e.arg_values() {
                args.push(expand(vm, &arg)?);
            }
            Ok(Value::expr(head, args))
        }
        other => Ok(other.clone()),
    }
}

fn expand_macrocall(vm: &mut Vm, e: &ExprValue) -> VmResult<Value> {
    let args = e.arg_values();
    let Some(Value::Sym(name)) = args.first().cloned() else {
        return Err(VmError::Argument("malformed macro call".to_string()));
    };
    let macro_args = &args[1..];

    // `@generated` survives to function lowering, which recognizes the
    // single-branch pattern.
    if name.as_str() == "@generated" {
        return Ok(Value::Expr(Rc::new(e.clone())));
    }

    if let Some(expanded) = expand_builtin(vm, name, macro_args)? {
        return expand(vm, &expanded);
    }

    let def = vm
        .macros
        .get(&name)
        .cloned()
        .ok_or(VmError::UndefVar(name))?;
    let call_args: Vec<Value> = if def.vararg {
        if macro_args.len() < def.nparams {
            return Err(VmError::Method(format!(
                "macro {} expects at least {} arguments, got {}",
                name,
                def.nparams,
                macro_args.len()
            )));
        }
        let mut fixed: Vec<Value> = macro_args[..def.nparams].to_vec();
        fixed.push(Value::tuple(macro_args[def.nparams..].to_vec()));
        fixed
    } else {
        if macro_args.len() != def.nparams {
            return Err(VmError::Method(format!(
                "macro {} expects {} arguments, got {}",
                name,
                def.nparams,
                macro_args.len()
            )));
        }
        macro_args.to_vec()
    };
    let returned = vm.run_chunk(def.chunk, call_args, vec![])?;
    let hygienic = apply_hygiene(&returned);
    expand(vm, &hygienic)
}

// ── hygiene ───────────────────────────────────────────────────────────

fn apply_hygiene(value: &Value) -> Value {
    let mut renames: HashMap<Symbol, Symbol> = HashMap::new();
    collect_introduced(value, &mut renames);
    rewrite(value, &renames)
}

/// Find the symbols this expansion introduces: `local` declarations,
/// `let`/`for` bindings, lambda parameters. Escaped subtrees are the
/// caller's and contribute nothing.
fn collect_introduced(value: &Value, renames: &mut HashMap<Symbol, Symbol>) {
    let Value::Expr(e) = value else { return };
    match e.head.as_str() {
        "escape" => return,
        "local" => {
            for arg in e.arg_values() {
                register_binding_target(&arg, renames);
            }
        }
        "let" => {
            if let Some(Value::Expr(bindings)) = e.arg(0) {
                for b in bindings.arg_values() {
                    register_binding_target(&b, renames);
                }
            }
        }
        "for" => {
            if let Some(binding) = e.arg(0) {
                register_binding_target(&binding, renames);
            }
        }
        "->" => {
            if let Some(params) = e.arg(0) {
                register_binding_target(&params, renames);
            }
        }
        _ => {}
    }
    for arg in e.arg_values() {
        collect_introduced(&arg, renames);
    }
}

fn register_binding_target(target: &Value, renames: &mut HashMap<Symbol, Symbol>) {
    match target {
        Value::Sym(name) => {
            renames
                .entry(*name)
                .or_insert_with(|| gensym(name.as_str()));
        }
        Value::Expr(e) => match e.head.as_str() {
            "=" | "::" => {
                if let Some(first) = e.arg(0) {
                    register_binding_target(&first, renames);
                }
            }
            "tuple" => {
                for arg in e.arg_values() {
                    register_binding_target(&arg, renames);
                }
            }
            _ => {}
        },
        _ => {}
    }
}

/// Rewrite unescaped symbols through the rename map; strip one level of
/// `esc` per traversal.
fn rewrite(value: &Value, renames: &HashMap<Symbol, Symbol>) -> Value {
    match value {
        Value::Sym(name) => match renames.get(name) {
            Some(renamed) => Value::Sym(*renamed),
            None => value.clone(),
        },
        Value::Expr(e) => {
            if e.head.as_str() == "escape" {
                // The caller's syntax: pass through untouched, minus
                // this wrapper.
                return e.arg(0).unwrap_or(Value::Nothing);
            }
            let args = e.arg_values().iter().map(|a| rewrite(a, renames)).collect();
            Value::expr(e.head, args)
        }
        other => other.clone(),
    }
}

// ── builtin macros ────────────────────────────────────────────────────

fn expand_builtin(vm: &mut Vm, name: Symbol, args: &[Value]) -> VmResult<Option<Value>> {
    let _ = vm;
    let sym = Symbol::intern;
    let call = |f: &str, a: Vec<Value>| {
        let mut all = vec![Value::symbol(f)];
        all.extend(a);
        Value::expr(sym("call"), all)
    };
    Ok(Some(match name.as_str() {
        "@assert" => {
            let cond = args
                .first()
                .cloned()
                .ok_or_else(|| VmError::Argument("@assert needs a condition".to_string()))?;
            let message = match args.get(1) {
                Some(Value::Str(m)) => format!("AssertionError: {}", m),
                _ => "AssertionError".to_string(),
            };
            Value::expr(
                sym("if"),
                vec![
                    call("!", vec![cond]),
                    call("error", vec![Value::str(&message)]),
                ],
            )
        }
        "@show" => {
            let expr = args
                .first()
                .cloned()
                .ok_or_else(|| VmError::Argument("@show needs an expression".to_string()))?;
            let tmp = Value::Sym(gensym("show"));
            let label = format!("{} = ", render_source(&expr));
            Value::expr(
                sym("block"),
                vec![
                    Value::expr(sym("="), vec![tmp.clone(), expr]),
                    call(
                        "println",
                        vec![call(
                            "string",
                            vec![Value::str(&label), call("repr", vec![tmp.clone()])],
                        )],
                    ),
                    tmp,
                ],
            )
        }
        "@time" => {
            let expr = args.first().cloned().unwrap_or(Value::Nothing);
            let t0 = Value::Sym(gensym("t0"));
            let val = Value::Sym(gensym("val"));
            let elapsed = call(
                "/",
                vec![
                    call("-", vec![call("time_ns", vec![]), t0.clone()]),
                    Value::F64(1e9),
                ],
            );
            Value::expr(
                sym("block"),
                vec![
                    Value::expr(sym("="), vec![t0.clone(), call("time_ns", vec![])]),
                    Value::expr(sym("="), vec![val.clone(), expr]),
                    call(
                        "println",
                        vec![call(
                            "string",
                            vec![Value::str("  "), elapsed, Value::str(" seconds")],
                        )],
                    ),
                    val,
                ],
            )
        }
        "@elapsed" => {
            let expr = args.first().cloned().unwrap_or(Value::Nothing);
            let t0 = Value::Sym(gensym("t0"));
            Value::expr(
                sym("block"),
                vec![
                    Value::expr(sym("="), vec![t0.clone(), call("time_ns", vec![])]),
                    expr,
                    call(
                        "/",
                        vec![
                            call("-", vec![call("time_ns", vec![]), t0]),
                            Value::F64(1e9),
                        ],
                    ),
                ],
            )
        }
        "@timed" => {
            let expr = args.first().cloned().unwrap_or(Value::Nothing);
            let t0 = Value::Sym(gensym("t0"));
            let val = Value::Sym(gensym("val"));
            let time = call(
                "/",
                vec![
                    call("-", vec![call("time_ns", vec![]), t0.clone()]),
                    Value::F64(1e9),
                ],
            );
            Value::expr(
                sym("block"),
                vec![
                    Value::expr(sym("="), vec![t0.clone(), call("time_ns", vec![])]),
                    Value::expr(sym("="), vec![val.clone(), expr]),
                    Value::expr(
                        sym("tuple"),
                        vec![
                            Value::expr(sym("="), vec![Value::symbol("value"), val]),
                            Value::expr(sym("="), vec![Value::symbol("time"), time]),
                        ],
                    ),
                ],
            )
        }
        // No GC integration: the count is always zero, but the
        // expression still runs.
        "@allocated" | "@allocations" => {
            let expr = args.first().cloned().unwrap_or(Value::Nothing);
            Value::expr(sym("block"), vec![expr, Value::I64(0)])
        }
        "@coalesce" => {
            let mut result = Value::Missing;
            for arg in args.iter().rev() {
                let tmp = Value::Sym(gensym("c"));
                result = Value::expr(
                    sym("block"),
                    vec![
                        Value::expr(sym("="), vec![tmp.clone(), arg.clone()]),
                        Value::expr(
                            sym("if"),
                            vec![call("ismissing", vec![tmp.clone()]), result, tmp],
                        ),
                    ],
                );
            }
            result
        }
        "@__dot__" => {
            let expr = args.first().cloned().unwrap_or(Value::Nothing);
            dotify(&expr)
        }
        _ => return Ok(None),
    }))
}

/// Approximate source text for `@show` labels.
fn render_source(value: &Value) -> String {
    match value {
        Value::Sym(s) => s.to_string(),
        Value::Expr(e) if e.head.as_str() == "call" => {
            let args = e.arg_values();
            let parts: Vec<String> = args.iter().skip(1).map(render_source).collect();
            match args.first() {
                Some(Value::Sym(f)) => format!("{}({})", f, parts.join(", ")),
                _ => format!("({})", parts.join(", ")),
            }
        }
        other => crate::values::display_value(other),
    }
}

/// `@.`: turn every call into its broadcast form and `=` into `.=`.
fn dotify(value: &Value) -> Value {
    let Value::Expr(e) = value else {
        return value.clone();
    };
    match e.head.as_str() {
        "call" => {
            let args = e.arg_values();
            let func = args[0].clone();
            let dotted: Vec<Value> = args[1..].iter().map(dotify).collect();
            Value::expr(
                Symbol::intern("."),
                vec![func, Value::expr(Symbol::intern("tuple"), dotted)],
            )
        }
        "=" => {
            let args = e.arg_values();
            Value::expr(
                Symbol::intern(".="),
                vec![args[0].clone(), dotify(&args[1])],
            )
        }
        _ => {
            let args = e.arg_values().iter().map(dotify).collect();
            Value::expr(e.head, args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hygiene_renames_local_but_not_free_symbols() {
        // quote local t = x end — t is introduced, x is not.
        let t = Symbol::intern("t");
        let x = Symbol::intern("x");
        let tree = Value::expr(
            Symbol::intern("block"),
            vec![Value::expr(
                Symbol::intern("local"),
                vec![Value::expr(
                    Symbol::intern("="),
                    vec![Value::Sym(t), Value::Sym(x)],
                )],
            )],
        );
        let out = apply_hygiene(&tree);
        let Value::Expr(block) = &out else { panic!() };
        let Some(Value::Expr(local)) = block.arg(0) else { panic!() };
        let Some(Value::Expr(assign)) = local.arg(0) else { panic!() };
        let Some(Value::Sym(lhs)) = assign.arg(0) else { panic!() };
        let Some(Value::Sym(rhs)) = assign.arg(1) else { panic!() };
        assert_ne!(lhs, t, "introduced local must be gensym-renamed");
        assert!(lhs.as_str().starts_with("#t#"));
        assert_eq!(rhs, x, "free symbol must be left alone");
    }

    #[test]
    fn test_escape_strips_one_level_and_blocks_renames() {
        let t = Symbol::intern("t");
        let tree = Value::expr(
            Symbol::intern("block"),
            vec![
                Value::expr(
                    Symbol::intern("local"),
                    vec![Value::Sym(t)],
                ),
                Value::expr(Symbol::intern("escape"), vec![Value::Sym(t)]),
            ],
        );
        let out = apply_hygiene(&tree);
        let Value::Expr(block) = &out else { panic!() };
        // Second statement was escaped: the wrapper is gone and the
        // symbol kept its caller-facing name.
        let Some(Value::Sym(escaped)) = block.arg(1) else { panic!() };
        assert_eq!(escaped, t);
    }

    #[test]
    fn test_dotify_rewrites_calls_and_assignment() {
        // a = f(x) + 1 → a .= f.(x) .+ 1 (as dot-call exprs)
        let tree = Value::expr(
            Symbol::intern("="),
            vec![
                Value::symbol("a"),
                Value::expr(
                    Symbol::intern("call"),
                    vec![
                        Value::symbol("+"),
                        Value::expr(
                            Symbol::intern("call"),
                            vec![Value::symbol("f"), Value::symbol("x")],
                        ),
                        Value::I64(1),
                    ],
                ),
            ],
        );
        let out = dotify(&tree);
        let Value::Expr(assign) = &out else { panic!() };
        assert_eq!(assign.head.as_str(), ".=");
        let Some(Value::Expr(rhs)) = assign.arg(1) else { panic!() };
        assert_eq!(rhs.head.as_str(), ".");
    }
}
