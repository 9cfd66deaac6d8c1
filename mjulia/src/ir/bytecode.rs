//! Bytecode file format: a framed `bincode` serialization of a
//! [`Program`] with a magic header and format version, so compiled
//! chunks can be cached between runs.

use std::io::{Read, Write};

use super::Program;
use crate::error::{VmError, VmResult};

const MAGIC: &[u8; 4] = b"MJLB";
const VERSION: u32 = 2;

pub fn save_program<W: Write>(program: &Program, mut out: W) -> VmResult<()> {
    out.write_all(MAGIC)
        .map_err(|e| VmError::Argument(format!("bytecode write failed: {}", e)))?;
    out.write_all(&VERSION.to_le_bytes())
        .map_err(|e| VmError::Argument(format!("bytecode write failed: {}", e)))?;
    let body = bincode::serialize(program)
        .map_err(|e| VmError::Internal(format!("bytecode encode failed: {}", e)))?;
    out.write_all(&body)
        .map_err(|e| VmError::Argument(format!("bytecode write failed: {}", e)))?;
    Ok(())
}

pub fn load_program<R: Read>(mut input: R) -> VmResult<Program> {
    let mut header = [0u8; 8];
    input
        .read_exact(&mut header)
        .map_err(|e| VmError::Argument(format!("bytecode read failed: {}", e)))?;
    if &header[0..4] != MAGIC {
        return Err(VmError::Argument(
            "not a bytecode file (bad magic)".to_string(),
        ));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != VERSION {
        return Err(VmError::Argument(format!(
            "bytecode version mismatch: file has {}, this build reads {}",
            version, VERSION
        )));
    }
    let mut body = Vec::new();
    input
        .read_to_end(&mut body)
        .map_err(|e| VmError::Argument(format!("bytecode read failed: {}", e)))?;
    bincode::deserialize(&body)
        .map_err(|e| VmError::Argument(format!("bytecode decode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Symbol;
    use crate::ir::{Chunk, Const, Instr};

    fn sample_program() -> Program {
        let mut chunk = Chunk::new(Symbol::intern("top"));
        chunk.code = vec![
            Instr::ConstLoad(Const::I64(1)),
            Instr::ConstLoad(Const::I64(2)),
            Instr::AddI64,
            Instr::Return,
        ];
        let mut program = Program::default();
        program.add_chunk(chunk);
        program
    }

    #[test]
    fn test_round_trip() {
        let program = sample_program();
        let mut buf = Vec::new();
        save_program(&program, &mut buf).unwrap();
        let loaded = load_program(buf.as_slice()).unwrap();
        assert_eq!(loaded.chunks.len(), 1);
        assert_eq!(loaded.chunks[0].code.len(), 4);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = load_program(&b"XXXX\x01\x00\x00\x00"[..]).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut buf = Vec::new();
        save_program(&sample_program(), &mut buf).unwrap();
        buf[4] = 99;
        let err = load_program(buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("version"));
    }
}
