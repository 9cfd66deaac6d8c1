//! End-to-end scenarios driving full source text through the pipeline.

use mjulia::ir::Instr;
use mjulia::values::display_value;
use mjulia::{Session, Value};

fn session() -> Session {
    Session::new().expect("session startup")
}

fn eval(session: &mut Session, src: &str) -> Value {
    session.eval(src).unwrap_or_else(|e| panic!("eval failed for {:?}: {}", src, e))
}

#[test]
fn test_broadcast_fusion_scenario() {
    let mut s = session();
    eval(&mut s, "x = [0.0, 1.0, 2.0]");
    let r = eval(&mut s, "r = sin.(x) .+ cos.(x)");

    let Value::Array(arr) = &r else { panic!("expected an array, got {:?}", r) };
    let data = arr.borrow().to_f64_vec().unwrap();
    assert_eq!(data.len(), 3);
    for (i, &x) in [0.0f64, 1.0, 2.0].iter().enumerate() {
        assert!(
            (data[i] - (x.sin() + x.cos())).abs() < 1e-12,
            "r[{}] = {}, expected sin+cos of {}",
            i + 1,
            data[i],
            x
        );
    }
    // Fresh Vector{Float64}, not aliased to x.
    assert_eq!(
        display_value(&eval(&mut s, "typeof(r)")),
        "Vector{Float64}"
    );
    eval(&mut s, "r[1] = 99.0");
    let x1 = eval(&mut s, "x[1]");
    assert!(matches!(x1, Value::F64(v) if v == 0.0));
}

#[test]
fn test_dispatch_and_diagonal_rule_scenario() {
    let mut s = session();
    eval(&mut s, "same_type(x::T, y::T) where T = (x, y)");

    let ok = eval(&mut s, "same_type(1, 2)");
    let Value::Tuple(t) = &ok else { panic!("expected tuple") };
    assert!(matches!(t[0], Value::I64(1)));
    assert!(matches!(t[1], Value::I64(2)));

    let err = s.eval("same_type(1, 2.0)").unwrap_err();
    assert_eq!(err.error.kind(), "MethodError");
}

#[test]
fn test_compound_field_assignment_scenario() {
    let mut s = session();
    eval(&mut s, "mutable struct C\n    n::Int64\nend");
    eval(&mut s, "c = C(0)");
    eval(&mut s, "c.n += 5");
    eval(&mut s, "c.n *= 3");
    let n = eval(&mut s, "c.n");
    assert!(matches!(n, Value::I64(15)));

    // The compound statement loads the object once and stores the
    // field once: the lowered chunk carries exactly one FieldLoad and
    // one FieldStore.
    s.eval("c.n += 0").unwrap();
    let chunk = s.vm.program.chunks.last().expect("statement chunk");
    let loads = chunk
        .code
        .iter()
        .filter(|i| matches!(i, Instr::FieldLoad(_)))
        .count();
    let stores = chunk
        .code
        .iter()
        .filter(|i| matches!(i, Instr::FieldStore(_)))
        .count();
    assert_eq!((loads, stores), (1, 1));
}

#[test]
fn test_missing_arithmetic_scenario() {
    let mut s = session();
    assert!(matches!(eval(&mut s, "missing + 1"), Value::Missing));
    assert!(matches!(eval(&mut s, "1 + missing"), Value::Missing));
    assert!(matches!(eval(&mut s, "missing == missing"), Value::Missing));
    assert!(matches!(
        eval(&mut s, "isequal(missing, missing)"),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut s, "missing === missing"),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut s, "coalesce(missing, missing, 7)"),
        Value::I64(7)
    ));
}

#[test]
fn test_shape_mismatch_scenario() {
    let mut s = session();
    eval(&mut s, "a = [1, 2]");
    eval(&mut s, "b = [1, 2, 3]");
    let err = s.eval("a .+ b").unwrap_err();
    assert_eq!(err.error.kind(), "DimensionMismatch");
    let msg = err.to_string();
    assert!(
        msg.contains("[2]") && msg.contains("[3]"),
        "message must mention both shapes, got: {}",
        msg
    );
}

#[test]
fn test_macro_hygiene_scenario() {
    let mut s = session();
    eval(
        &mut s,
        "macro swap(a, b)\n    quote\n        local t = $a\n        $a = $b\n        $b = t\n    end\nend",
    );
    eval(&mut s, "t = 99");
    eval(&mut s, "x = 1");
    eval(&mut s, "y = 2");
    eval(&mut s, "@swap(x, y)");
    assert!(matches!(eval(&mut s, "x"), Value::I64(2)));
    assert!(matches!(eval(&mut s, "y"), Value::I64(1)));
    // The macro's `t` must not collide with the caller's `t`.
    assert!(matches!(eval(&mut s, "t"), Value::I64(99)));
}
