//! The linear instruction form produced by lowering.
//!
//! Each activation runs a [`Chunk`]: an operand stack, a table of local
//! binding cells, and a handler stack for `try`/`catch`/`finally`.
//! Typed arithmetic variants (`AddI64`, `AddF64`, …) preserve their
//! exact operand type; everything else routes through generic dispatch
//! via the `Call*` family.

pub mod bytecode;

use serde::{Deserialize, Serialize};

use crate::interner::Symbol;

/// Serializable literal constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Const {
    Nothing,
    Missing,
    Undef,
    Bool(bool),
    I64(i64),
    I128(i128),
    F32(f32),
    F64(f64),
    Str(String),
    Char(char),
    Sym(Symbol),
    /// Source location marker carried into quoted blocks.
    Line(i64, Option<Symbol>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Instr {
    // ── constants and variables ───────────────────────────────────────
    ConstLoad(Const),
    LocalLoad(u16),
    LocalStore(u16),
    GlobalLoad(Symbol),
    GlobalStore(Symbol),
    /// Read a captured binding cell (closure bodies only).
    CapturedLoad(u16),
    CapturedStore(u16),
    /// Push whether the slot still holds `#undef` (keyword-default
    /// prologues).
    LocalIsUndef(u16),

    // ── typed arithmetic (exact type preserved) ───────────────────────
    AddI64,
    SubI64,
    MulI64,
    NegI64,
    ModI64,
    IntDivI64,
    AddF64,
    SubF64,
    MulF64,
    DivF64,
    NegF64,
    PowF64,
    LtI64,
    LeI64,
    GtI64,
    GeI64,
    EqI64,
    NeI64,
    LtF64,
    LeF64,
    GtF64,
    GeF64,
    EqF64,
    NeF64,
    /// Widen the I64 on top of stack to F64 (lowering-inserted
    /// promotion).
    I64ToF64,
    NotBool,

    // ── indexing and fields ───────────────────────────────────────────
    /// Pop N indices then the collection; push the element.
    IndexLoad(u8),
    /// Pop the value, N indices, then the collection; store, then push
    /// the value back (assignment is an expression).
    IndexStore(u8),
    FieldLoad(Symbol),
    /// Pop value then object; write the field and push the value back.
    FieldStore(Symbol),

    // ── calls (stack: callee, then arguments) ─────────────────────────
    Call(u8),
    CallKw {
        argc: u8,
        kw_names: Vec<Symbol>,
    },
    CallSplat {
        argc: u8,
        splat_mask: Vec<bool>,
    },
    CallKwSplat {
        argc: u8,
        splat_mask: Vec<bool>,
        kw_names: Vec<Symbol>,
        /// True where the keyword entry is itself `kws...` to expand.
        kw_splat_mask: Vec<bool>,
    },

    // ── control flow ──────────────────────────────────────────────────
    Branch(u32),
    /// Pop a Bool; branch when true. Non-Bool raises `TypeError`.
    BranchIf(u32),
    BranchIfNot(u32),
    Return,

    // ── constructors ──────────────────────────────────────────────────
    MakeTuple(u8),
    MakeNamedTuple(Vec<Symbol>),
    /// Pop `count` elements; `shape` of `None` means a plain vector.
    MakeArray {
        count: u32,
        shape: Option<Vec<usize>>,
    },
    /// Pop stop, (step when `has_step`), start.
    MakeRange {
        has_step: bool,
    },
    MakeClosure {
        chunk: u32,
        /// Local slots whose cells the closure captures, in order.
        captures: Vec<u16>,
        nparams: u8,
        name: Symbol,
    },
    /// Pop `argc` args; build an `Expr` value (quote lowering).
    MakeExpr {
        head: Symbol,
        argc: u8,
        /// True where the argument is a collection to splice in place
        /// (`$(xs...)` inside a quote).
        splat_mask: Vec<bool>,
    },
    /// Pop a value, wrap in `QuoteNode`.
    MakeQuoteNode,
    /// Narrow an `Any` array to a primitive element type when uniform
    /// (comprehension results).
    NarrowArray,

    // ── broadcast ─────────────────────────────────────────────────────
    /// Pop `argc` args then the function; push a lazy `Broadcasted`.
    BroadcastDot(u8),
    /// Pop a value; force it if it is a `Broadcasted`.
    Materialize,
    /// Pop source then destination; `copyto!` with shape check.
    MaterializeInto,

    // ── exceptions ────────────────────────────────────────────────────
    /// Install a handler for the enclosing `try`.
    Catch {
        catch_ip: Option<u32>,
        finally_ip: Option<u32>,
    },
    /// Uninstall the innermost handler (normal exit from `try` body).
    EndCatch,
    /// Pop a value and raise it.
    Throw,
    /// Re-raise the exception currently being handled.
    Rethrow,
    /// Push the exception value bound by the active `catch`.
    LoadException,
    /// End of a `finally` block: re-raise a pending exception, if any.
    EndFinally,

    // ── operand stack ─────────────────────────────────────────────────
    Dup,
    Swap,
    Pop,

    /// Pop expected type then value; raise `TypeError` unless
    /// `value isa type`; push the value back.
    TypeAssert,

    Nop,
}

/// One lowered function body (or top-level expression).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub name: Symbol,
    pub code: Vec<Instr>,
    /// Number of local slots (parameters first).
    pub nslots: usize,
    /// Slot names for diagnostics, parallel to slot indices.
    pub slot_names: Vec<Symbol>,
    /// `(ip, source line)` markers, ascending by ip.
    pub lines: Vec<(u32, u32)>,
}

impl Chunk {
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            code: Vec::new(),
            nslots: 0,
            slot_names: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Best-effort source line for an instruction pointer: the latest
    /// marker at or before it.
    pub fn line_at(&self, ip: usize) -> Option<u32> {
        self.lines
            .iter()
            .filter(|&&(mark_ip, _)| mark_ip as usize <= ip)
            .map(|&(_, line)| line)
            .last()
    }
}

/// All chunks produced for a session, indexed by the `Call`/closure
/// references inside instructions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub chunks: Vec<Chunk>,
}

impl Program {
    pub fn add_chunk(&mut self, chunk: Chunk) -> usize {
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_at_picks_latest_marker() {
        let mut chunk = Chunk::new(Symbol::intern("top"));
        chunk.lines = vec![(0, 1), (5, 2), (9, 3)];
        assert_eq!(chunk.line_at(0), Some(1));
        assert_eq!(chunk.line_at(6), Some(2));
        assert_eq!(chunk.line_at(20), Some(3));
    }

    #[test]
    fn test_instr_serde_round_trip() {
        let instrs = vec![
            Instr::ConstLoad(Const::I64(42)),
            Instr::Call(2),
            Instr::Branch(7),
            Instr::MakeTuple(3),
        ];
        let json = serde_json::to_string(&instrs).unwrap();
        let back: Vec<Instr> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 4);
        assert!(matches!(back[0], Instr::ConstLoad(Const::I64(42))));
        assert!(matches!(back[3], Instr::MakeTuple(3)));
    }
}
