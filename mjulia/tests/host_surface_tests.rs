//! Host-facing surfaces: file evaluation, the bytecode file format,
//! and output capture.

use std::io::Write;

use mjulia::ir::bytecode::{load_program, save_program};
use mjulia::{run_str_with_output, Session, Value};

#[test]
fn test_evalfile_runs_and_wraps_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "answer(x) = x * 2").unwrap();
    writeln!(file, "answer(21)").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let mut s = Session::new().unwrap();
    let v = s.eval(&format!("evalfile(\"{}\")", path)).unwrap();
    assert!(matches!(v, Value::I64(42)));

    // A failing file surfaces as LoadError wrapping the cause.
    let mut bad = tempfile::NamedTempFile::new().unwrap();
    writeln!(bad, "[1, 2][99]").unwrap();
    let bad_path = bad.path().to_str().unwrap().to_string();
    let err = s
        .eval(&format!("evalfile(\"{}\")", bad_path))
        .unwrap_err();
    assert_eq!(err.error.kind(), "LoadError");
    assert!(err.to_string().contains("BoundsError"));
}

#[test]
fn test_run_file_reports_exit_worthy_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "x = 1").unwrap();
    writeln!(file, "undefined_variable").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let mut s = Session::new().unwrap();
    let err = s.run_file(&path).unwrap_err();
    assert_eq!(err.error.kind(), "UndefVarError");
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_bytecode_file_round_trip() {
    // Compile something through a session, persist its chunks, reload.
    let mut s = Session::new().unwrap();
    s.eval("bump(x) = x + 1\nbump(1)").unwrap();
    let program = s.vm.program.clone();

    let file = tempfile::NamedTempFile::new().unwrap();
    save_program(&program, file.reopen().unwrap()).unwrap();
    let loaded = load_program(file.reopen().unwrap()).unwrap();
    assert_eq!(loaded.chunks.len(), program.chunks.len());
    for (a, b) in loaded.chunks.iter().zip(&program.chunks) {
        assert_eq!(a.code.len(), b.code.len());
        assert_eq!(a.nslots, b.nslots);
    }
}

#[test]
fn test_output_capture_one_shot() {
    let (value, printed) = run_str_with_output("println(\"out\"); 1 + 1");
    assert_eq!(value.unwrap(), "2");
    assert_eq!(printed, "out\n");
}
