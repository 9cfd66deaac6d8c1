//! Macro, quote, and eval surface tests.

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

#[test]
fn test_quote_builds_expr_values() {
    let mut s = session();
    eval(&mut s, "e = :(x + 1)");
    assert!(matches!(
        eval(&mut s, "e.head"),
        Value::Sym(h) if h.as_str() == "call"
    ));
    assert_eq!(eval_i64(&mut s, "length(e.args)"), 3);
    assert!(matches!(
        eval(&mut s, "e.args[1]"),
        Value::Sym(f) if f.as_str() == "+"
    ));
    assert!(matches!(eval(&mut s, "e.args[3]"), Value::I64(1)));
    // typeof on AST values.
    assert!(matches!(eval(&mut s, "e isa Expr"), Value::Bool(true)));
    assert!(matches!(eval(&mut s, ":x isa Symbol"), Value::Bool(true)));
}

#[test]
fn test_quote_interpolation_and_splat() {
    let mut s = session();
    eval(&mut s, "v = 10");
    assert!(matches!(
        eval(&mut s, "e = :(1 + $v)\ne.args[3]"),
        Value::I64(10)
    ));
    // $(xs...) splices a collection into the argument list.
    eval(&mut s, "xs = (2, 3)");
    eval(&mut s, "e2 = :(f(1, $(xs...)))");
    assert_eq!(eval_i64(&mut s, "length(e2.args)"), 4);
    assert!(matches!(eval(&mut s, "e2.args[3]"), Value::I64(2)));
    assert!(matches!(eval(&mut s, "e2.args[4]"), Value::I64(3)));
}

#[test]
fn test_expr_args_are_mutable_vectors() {
    let mut s = session();
    eval(&mut s, "e = :(f(1))");
    eval(&mut s, "push!(e.args, 2)");
    assert_eq!(eval_i64(&mut s, "length(e.args)"), 3);
    // The pushed argument is live in the same Expr.
    assert_eq!(eval_i64(&mut s, "eval_ready = e.args[3]"), 2);
}

#[test]
fn test_eval_shares_the_pipeline() {
    let mut s = session();
    assert_eq!(eval_i64(&mut s, "eval(:(1 + 2))"), 3);
    assert_eq!(
        eval_i64(&mut s, "ex = Expr(:call, :+, 4, 5)\neval(ex)"),
        9
    );
    // eval runs in the global environment and mutates it.
    eval(&mut s, "eval(:(global_from_eval = 7))");
    assert_eq!(eval_i64(&mut s, "global_from_eval"), 7);
    // include_string shares the same environment.
    assert_eq!(
        eval_i64(&mut s, "include_string(\"inc_def(x) = x + 1\ninc_def(41)\")"),
        42
    );
}

#[test]
fn test_user_macro_expansion() {
    let mut s = session();
    eval(
        &mut s,
        "macro twice(e)\n    quote\n        $e + $e\n    end\nend",
    );
    assert_eq!(eval_i64(&mut s, "@twice(21)"), 42);
    // Space-form call.
    assert_eq!(eval_i64(&mut s, "@twice 5"), 10);

    // macroexpand returns the tree without running it.
    eval(&mut s, "ex = macroexpand(:(@twice(3)))");
    assert!(matches!(eval(&mut s, "ex isa Expr"), Value::Bool(true)));
    assert_eq!(eval_i64(&mut s, "eval(ex)"), 6);
}

#[test]
fn test_macro_esc_reaches_caller_scope() {
    let mut s = session();
    // Without esc the assignment target would be renamed; with esc it
    // must hit the caller's variable.
    eval(
        &mut s,
        "macro setx(v)\n    quote\n        $(esc(:x)) = $v\n    end\nend",
    );
    eval(&mut s, "x = 0");
    eval(&mut s, "@setx(5)");
    assert_eq!(eval_i64(&mut s, "x"), 5);
}

#[test]
fn test_vararg_macro() {
    let mut s = session();
    eval(
        &mut s,
        "macro sumall(xs...)\n    quote\n        +(0, $(xs...))\n    end\nend",
    );
    assert_eq!(eval_i64(&mut s, "@sumall(1, 2, 3)"), 6);
}

#[test]
fn test_generated_single_branch() {
    let mut s = session();
    eval(
        &mut s,
        "function gpow(x)\n    if @generated\n        :(x * x)\n    else\n        x * x\n    end\nend",
    );
    assert_eq!(eval_i64(&mut s, "gpow(3)"), 9);
    assert!(matches!(
        eval(&mut s, "gpow(1.5)"),
        Value::F64(v) if v == 2.25
    ));
}

#[test]
fn test_at_dot_fuses_whole_expression() {
    let mut s = session();
    eval(&mut s, "a = [1.0, 2.0, 3.0]");
    let r = eval(&mut s, "@. a * 2 + 1");
    let Value::Array(arr) = r else { panic!("expected array") };
    assert_eq!(arr.borrow().to_f64_vec().unwrap(), vec![3.0, 5.0, 7.0]);
}

#[test]
fn test_assert_and_show() {
    let mut s = session();
    assert!(s.eval("@assert 1 < 2").is_ok());
    let err = s.eval("@assert 2 < 1").unwrap_err();
    assert_eq!(err.error.kind(), "ErrorException");

    let (value, printed) = s.eval_capture("@show 1 + 2");
    assert!(matches!(value.unwrap(), Value::I64(3)));
    assert!(printed.contains("= 3"), "got: {:?}", printed);
}

#[test]
fn test_parse_expr_round_trip() {
    let mut s = session();
    assert_eq!(eval_i64(&mut s, "eval(parse_expr(\"6 * 7\"))"), 42);
}
