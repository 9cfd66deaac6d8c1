//! Multiple-dispatch behavior from source: specificity, ambiguity,
//! parametric methods, kwargs binding, and cache invalidation on
//! method addition.

use mjulia::{Session, Value};

fn session() -> Session {
    Session::new().expect("session startup")
}

fn eval(s: &mut Session, src: &str) -> Value {
    s.eval(src).unwrap_or_else(|e| panic!("eval failed for {:?}: {}", src, e))
}

fn eval_str(s: &mut Session, src: &str) -> String {
    match eval(s, src) {
        Value::Str(v) => v.to_string(),
        other => panic!("expected String from {:?}, got {:?}", src, other),
    }
}

#[test]
fn test_specificity_ordering() {
    let mut s = session();
    eval(&mut s, "describe(x) = \"any\"");
    eval(&mut s, "describe(x::Number) = \"number\"");
    eval(&mut s, "describe(x::Integer) = \"integer\"");
    eval(&mut s, "describe(x::Int64) = \"int64\"");
    assert_eq!(eval_str(&mut s, "describe(1)"), "int64");
    assert_eq!(eval_str(&mut s, "describe(Int8(1))"), "integer");
    assert_eq!(eval_str(&mut s, "describe(1.5)"), "number");
    assert_eq!(eval_str(&mut s, "describe(\"hi\")"), "any");
}

#[test]
fn test_exact_concrete_beats_subtype() {
    let mut s = session();
    eval(&mut s, "pick(x::Integer) = \"integer\"");
    eval(&mut s, "pick(x::Bool) = \"bool\"");
    assert_eq!(eval_str(&mut s, "pick(true)"), "bool");
    assert_eq!(eval_str(&mut s, "pick(1)"), "integer");
}

#[test]
fn test_dispatch_determinism() {
    let mut s = session();
    eval(&mut s, "f(x::Number, y) = 1");
    eval(&mut s, "f(x, y::Number) = 2");
    eval(&mut s, "f(x::Number, y::Number) = 3");
    // Identical calls always pick the same method.
    for _ in 0..10 {
        assert!(matches!(eval(&mut s, "f(1, 2)"), Value::I64(3)));
        assert!(matches!(eval(&mut s, "f(1, \"a\")"), Value::I64(1)));
        assert!(matches!(eval(&mut s, "f(\"a\", 2)"), Value::I64(2)));
    }
}

#[test]
fn test_true_ambiguity_raises() {
    let mut s = session();
    eval(&mut s, "amb(x::Int64, y::Number) = 1");
    eval(&mut s, "amb(x::Number, y::Int64) = 2");
    let err = s.eval("amb(1, 2)").unwrap_err();
    assert_eq!(err.error.kind(), "MethodError");
    assert!(err.to_string().contains("ambiguous"), "got: {}", err);
    // The unambiguous corners still work.
    assert!(matches!(eval(&mut s, "amb(1, 2.0)"), Value::I64(1)));
    assert!(matches!(eval(&mut s, "amb(2.0, 1)"), Value::I64(2)));
}

#[test]
fn test_adding_more_specific_method_wins_later_calls() {
    let mut s = session();
    eval(&mut s, "g(x) = \"generic\"");
    assert_eq!(eval_str(&mut s, "g(1)"), "generic");
    // The dispatch cache must be invalidated by the new method.
    eval(&mut s, "g(x::Int64) = \"specific\"");
    assert_eq!(eval_str(&mut s, "g(1)"), "specific");
    // Specificity monotonicity: unrelated calls keep their pick.
    assert_eq!(eval_str(&mut s, "g(1.5)"), "generic");
}

#[test]
fn test_parametric_methods_bind_type_variables() {
    let mut s = session();
    eval(&mut s, "pairup(x::T, y::T) where T = T");
    let shown = mjulia::values::display_value(&eval(&mut s, "pairup(1, 2)"));
    assert_eq!(shown, "Int64");
    let shown = mjulia::values::display_value(&eval(&mut s, "pairup(\"a\", \"b\")"));
    assert_eq!(shown, "String");

    // Bounded variables reject out-of-bound arguments.
    eval(&mut s, "numeric_only(x::T) where T <: Number = x");
    assert!(matches!(eval(&mut s, "numeric_only(1)"), Value::I64(1)));
    let err = s.eval("numeric_only(\"nope\")").unwrap_err();
    assert_eq!(err.error.kind(), "MethodError");
}

#[test]
fn test_type_constructor_dispatch() {
    let mut s = session();
    assert!(matches!(eval(&mut s, "Int64(3.0)"), Value::I64(3)));
    assert!(matches!(eval(&mut s, "Float64(3)"), Value::F64(x) if x == 3.0));
    assert!(matches!(eval(&mut s, "Char(65)"), Value::Char('A')));
    assert!(matches!(eval(&mut s, "Bool(1)"), Value::Bool(true)));
    // T(x) through a bound type variable.
    eval(&mut s, "convert_via(T, x) = T(x)");
    assert!(matches!(eval(&mut s, "convert_via(Int64, 2.0)"), Value::I64(2)));
}

#[test]
fn test_vararg_and_mixed_splat() {
    let mut s = session();
    eval(&mut s, "tally(prefix, xs...) = (prefix, length(xs))");
    let r = eval(&mut s, "tally(\"p\", 1, 2, 3)");
    let Value::Tuple(t) = r else { panic!() };
    assert!(matches!(t[1], Value::I64(3)));
    // Splats mix with fixed arguments, multiple times.
    let r = eval(&mut s, "a = (1, 2)\nb = [3, 4]\ntally(\"p\", a..., 0, b...)");
    let Value::Tuple(t) = r else { panic!() };
    assert!(matches!(t[1], Value::I64(5)));
}

#[test]
fn test_typed_vararg_element_constraint() {
    let mut s = session();
    eval(&mut s, "intsum(xs::Int64...) = sum(xs)");
    assert!(matches!(eval(&mut s, "intsum(1, 2, 3)"), Value::I64(6)));
    let err = s.eval("intsum(1, 2.5)").unwrap_err();
    assert_eq!(err.error.kind(), "MethodError");
}

#[test]
fn test_method_replacement_same_signature() {
    let mut s = session();
    eval(&mut s, "version() = 1");
    assert!(matches!(eval(&mut s, "version()"), Value::I64(1)));
    eval(&mut s, "version() = 2");
    assert!(matches!(eval(&mut s, "version()"), Value::I64(2)));
}

#[test]
fn test_sum_over_tuple_from_vararg() {
    let mut s = session();
    // The spec's kwargs-vararg interaction: extra keywords collect.
    eval(
        &mut s,
        "described(x; kws...) = string(x, \":\", length(kws))",
    );
    assert_eq!(eval_str(&mut s, "described(1)"), "1:0");
    assert_eq!(eval_str(&mut s, "described(1, a = 1, b = 2)"), "1:2");
}
