//! Quote lowering: compile `:( … )` and `quote … end` bodies into
//! instructions that build `Expr` values at runtime.
//!
//! `$x` compiles the interpolated expression and splices its value;
//! `$(xs...)` marks the argument position for splicing a whole
//! collection. Nested quotes raise the depth so `$` binds to the
//! innermost quote, as in Julia.

use super::{ChunkBuilder, Lowerer};
use crate::error::{VmError, VmResult};
use crate::ir::{Const, Instr};
use crate::values::Value;

pub(super) fn lower_quote(
    lw: &mut Lowerer<'_>,
    b: &mut ChunkBuilder,
    value: &Value,
    depth: usize,
) -> VmResult<()> {
    match value {
        Value::Expr(e) => {
            let head = e.head.as_str();
            if head == "$" {
                let inner = e.arg(0).unwrap_or(Value::Nothing);
                if depth == 1 {
                    // Escape to runtime: evaluate the interpolated
                    // expression here and now.
                    return lw.lower_expr(b, &inner);
                }
                // Inside a nested quote the `$` survives one level.
                lower_quote(lw, b, &inner, depth - 1)?;
                b.emit(Instr::MakeExpr {
                    head: e.head,
                    argc: 1,
                    splat_mask: vec![false],
                });
                return Ok(());
            }
            let next_depth = if head == "quote" { depth + 1 } else { depth };
            let args = e.arg_values();
            let mut splat_mask = Vec::with_capacity(args.len());
            for arg in &args {
                if let Some(splatted) = as_interpolated_splat(arg) {
                    if depth == 1 {
                        lw.lower_expr(b, &splatted)?;
                        splat_mask.push(true);
                        continue;
                    }
                }
                lower_quote(lw, b, arg, next_depth)?;
                splat_mask.push(false);
            }
            b.emit(Instr::MakeExpr {
                head: e.head,
                argc: args.len() as u8,
                splat_mask,
            });
            Ok(())
        }
        other => lower_literal(lw, b, other),
    }
}

/// `$(xs...)` in argument position: the collection to splice.
fn as_interpolated_splat(arg: &Value) -> Option<Value> {
    let Value::Expr(dollar) = arg else { return None };
    if dollar.head.as_str() != "$" {
        return None;
    }
    let Some(Value::Expr(inner)) = dollar.arg(0) else {
        return None;
    };
    if inner.head.as_str() != "..." {
        return None;
    }
    inner.arg(0)
}

/// Push a value as quoted data, without unquote handling. Used for
/// `QuoteNode` payloads and nested literal trees.
pub(super) fn lower_literal(
    lw: &mut Lowerer<'_>,
    b: &mut ChunkBuilder,
    value: &Value,
) -> VmResult<()> {
    match value {
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
        Value::Sym(s) => {
            b.emit(Instr::ConstLoad(Const::Sym(*s)));
        }
        Value::LineNumberNode(n) => {
            b.emit(Instr::ConstLoad(Const::Line(n.line, n.file)));
        }
        Value::QuoteNode(inner) => {
            lower_literal(lw, b, inner)?;
            b.emit(Instr::MakeQuoteNode);
        }
        Value::Expr(e) => {
            let args = e.arg_values();
            for arg in &args {
                lower_literal(lw, b, arg)?;
            }
            b.emit(Instr::MakeExpr {
                head: e.head,
                argc: args.len() as u8,
                splat_mask: vec![false; args.len()],
            });
        }
        other => {
            return Err(VmError::Internal(format!(
                "cannot embed a {} in quoted code",
                other.runtime_ty()
            )))
        }
    }
    Ok(())
}
