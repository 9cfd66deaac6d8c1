//! Exception semantics: raising, catching, finally, rethrow, and the
//! distinguishable error kinds.

use mjulia::{Session, Value};

fn session() -> Session {
    Session::new().expect("session startup")
}

fn eval(s: &mut Session, src: &str) -> Value {
    s.eval(src).unwrap_or_else(|e| panic!("eval failed for {:?}: {}", src, e))
}

fn eval_i64(s: &mut Session, src: &str) -> i64 {
    match eval(s, src) {
        Value::I64(x) => x,
        other => panic!("expected Int64 from {:?}, got {:?}", src, other),
    }
}

fn kind_of(s: &mut Session, src: &str) -> &'static str {
    s.eval(src).unwrap_err().error.kind()
}

#[test]
fn test_error_kinds() {
    let mut s = session();
    assert_eq!(kind_of(&mut s, "[1, 2][3]"), "BoundsError");
    assert_eq!(kind_of(&mut s, "(1:3)[9]"), "BoundsError");
    assert_eq!(kind_of(&mut s, "[1, 2] .+ [1, 2, 3]"), "DimensionMismatch");
    assert_eq!(kind_of(&mut s, "sqrt(-1.0)"), "DomainError");
    assert_eq!(kind_of(&mut s, "1 ÷ 0"), "DivideError");
    assert_eq!(kind_of(&mut s, "sin(\"abc\")"), "MethodError");
    assert_eq!(kind_of(&mut s, "no_such_function(1)"), "UndefVarError");
    assert_eq!(kind_of(&mut s, "no_such_variable"), "UndefVarError");
    assert_eq!(kind_of(&mut s, "Int64(1.5)"), "InexactError");
    assert_eq!(kind_of(&mut s, "Dict()[1]"), "KeyError");
    assert_eq!(kind_of(&mut s, "x::String = 1"), "TypeError");
    assert_eq!(kind_of(&mut s, "if 1\n    2\nend"), "TypeError");
    assert_eq!(kind_of(&mut s, "include_string(\"1 +\")"), "ParseError");
    assert_eq!(kind_of(&mut s, "evalfile(\"/no/such/file.jl\")"), "LoadError");
}

#[test]
fn test_try_catch_binds_exception_value() {
    let mut s = session();
    let r = eval(
        &mut s,
        "try\n    [1][5]\ncatch e\n    e isa BoundsError ? 1 : 2\nend",
    );
    assert!(matches!(r, Value::I64(1)));

    // Thrown values arrive as-is.
    let r = eval(&mut s, "try\n    throw(42)\ncatch e\n    e + 1\nend");
    assert!(matches!(r, Value::I64(43)));

    // error() raises an ErrorException carrying the message.
    let r = eval(
        &mut s,
        "try\n    error(\"boom\")\ncatch e\n    e.msg\nend",
    );
    assert!(matches!(r, Value::Str(m) if &*m == "boom"));
}

#[test]
fn test_try_is_an_expression() {
    let mut s = session();
    assert_eq!(eval_i64(&mut s, "x = try\n    1\ncatch\n    2\nend\nx"), 1);
    assert_eq!(
        eval_i64(&mut s, "y = try\n    error(\"no\")\ncatch\n    2\nend\ny"),
        2
    );
}

#[test]
fn test_finally_runs_on_both_paths() {
    let mut s = session();
    eval(&mut s, "log = []");
    eval(
        &mut s,
        "try\n    push!(log, 1)\nfinally\n    push!(log, 2)\nend",
    );
    assert_eq!(eval_i64(&mut s, "length(log)"), 2);

    // Error path: finally runs, then the error continues outward.
    let r = eval(
        &mut s,
        "try\n    try\n        error(\"inner\")\n    finally\n        push!(log, 3)\n    end\ncatch e\n    length(log)\nend",
    );
    assert!(matches!(r, Value::I64(3)));
}

#[test]
fn test_rethrow_preserves_original() {
    let mut s = session();
    let r = eval(
        &mut s,
        "try\n    try\n        [1][9]\n    catch e\n        rethrow()\n    end\ncatch e2\n    e2 isa BoundsError\nend",
    );
    assert!(matches!(r, Value::Bool(true)));
}

#[test]
fn test_uncaught_error_does_not_corrupt_globals() {
    let mut s = session();
    eval(&mut s, "committed = 0");
    let err = s.eval("committed = 1\n[1][9]\ncommitted = 2").unwrap_err();
    assert_eq!(err.error.kind(), "BoundsError");
    // Effects before the throw persist; the statement after it never
    // ran.
    assert_eq!(eval_i64(&mut s, "committed"), 1);
}

#[test]
fn test_error_reports_best_effort_line() {
    let mut s = session();
    let err = s
        .eval("a = 1\nb = 2\n\nundefined_here\n")
        .unwrap_err();
    assert_eq!(err.error.kind(), "UndefVarError");
    assert_eq!(err.line, Some(4), "expected line 4, got {:?}", err.line);
}

#[test]
fn test_catch_var_scoping() {
    let mut s = session();
    eval(&mut s, "e = \"outer\"");
    eval(&mut s, "try\n    error(\"x\")\ncatch e\n    e\nend");
    // The catch binding is local to the handler.
    assert!(matches!(eval(&mut s, "e"), Value::Str(v) if &*v == "outer"));
}
