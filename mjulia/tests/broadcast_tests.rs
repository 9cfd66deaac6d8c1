//! Broadcast engine behavior driven from source: laziness, fusion
//! equivalence, shape rules, in-place forms, aliasing, Ref shielding.

use mjulia::{Session, Value};

fn session() -> Session {
    Session::new().expect("session startup")
}

fn eval(s: &mut Session, src: &str) -> Value {
    s.eval(src).unwrap_or_else(|e| panic!("eval failed for {:?}: {}", src, e))
}

fn eval_f64s(s: &mut Session, src: &str) -> Vec<f64> {
    match eval(s, src) {
        Value::Array(a) => a.borrow().to_f64_vec().unwrap(),
        other => panic!("expected array from {:?}, got {:?}", src, other),
    }
}

#[test]
fn test_broadcasted_is_lazy_until_materialize() {
    let mut s = session();
    eval(&mut s, "bc = broadcasted(+, [1.0, 2.0], 10.0)");
    assert!(matches!(
        eval(&mut s, "bc isa Broadcasted"),
        Value::Bool(true)
    ));
    assert_eq!(
        eval_f64s(&mut s, "materialize(bc)"),
        vec![11.0, 12.0]
    );
}

#[test]
fn test_broadcast_correctness_elementwise() {
    let mut s = session();
    // materialize(bc)[I] == f(args...[I]) for every index.
    eval(&mut s, "a = [1.0, 2.0, 3.0]");
    eval(&mut s, "b = [10.0, 20.0, 30.0]");
    assert_eq!(
        eval_f64s(&mut s, "a .* b .+ 1.0"),
        vec![11.0, 41.0, 91.0]
    );
}

#[test]
fn test_fusion_equivalence() {
    let mut s = session();
    // copy(flatten(bc)) == copy(bc) elementwise: the dot-syntax chain
    // (which flattens) must agree with the step-by-step computation.
    eval(&mut s, "x = [0.5, 1.5, 2.5]");
    let fused = eval_f64s(&mut s, "exp.(sin.(x) .+ cos.(x))");
    let staged = eval_f64s(
        &mut s,
        "s1 = map(sin, x)\ns2 = map(cos, x)\nmap((p, q) -> exp(p + q), s1, s2)",
    );
    for (a, b) in fused.iter().zip(&staged) {
        assert!((a - b).abs() < 1e-12, "fused {} vs staged {}", a, b);
    }
}

#[test]
fn test_scalar_and_shape_stretching() {
    let mut s = session();
    assert_eq!(eval_f64s(&mut s, "[1.0, 2.0] .+ 10"), vec![11.0, 12.0]);
    assert_eq!(eval_f64s(&mut s, "10 .- [1.0, 2.0]"), vec![9.0, 8.0]);
    // Singleton dimensions stretch: column .* row → matrix.
    eval(&mut s, "col = [1.0 ; 2.0]");
    eval(&mut s, "row = [10.0 20.0 30.0]");
    let m = eval(&mut s, "col .* row");
    let Value::Array(m) = m else { panic!() };
    assert_eq!(m.borrow().shape, vec![2, 3]);
    assert_eq!(
        m.borrow().to_f64_vec().unwrap(),
        vec![10.0, 20.0, 20.0, 40.0, 30.0, 60.0]
    );
}

#[test]
fn test_integer_broadcast_keeps_element_type() {
    let mut s = session();
    let shown = mjulia::values::display_value(&eval(
        &mut s,
        "typeof([1, 2] .+ [3, 4])",
    ));
    assert_eq!(shown, "Vector{Int64}");
    let shown = mjulia::values::display_value(&eval(&mut s, "typeof([1, 2] ./ 2)"));
    assert_eq!(shown, "Vector{Float64}");
    let shown = mjulia::values::display_value(&eval(&mut s, "typeof([1, 2] .< 2)"));
    assert_eq!(shown, "Vector{Bool}");
}

#[test]
fn test_in_place_forms_and_aliasing() {
    let mut s = session();
    eval(&mut s, "dest = [0.0, 0.0, 0.0]");
    eval(&mut s, "dest .= [1.0, 2.0, 3.0] .* 2");
    assert_eq!(eval_f64s(&mut s, "dest"), vec![2.0, 4.0, 6.0]);

    // Destination aliasing a source must read pre-write values.
    eval(&mut s, "a = [1.0, 2.0, 3.0]");
    eval(&mut s, "a .= a .+ a");
    assert_eq!(eval_f64s(&mut s, "a"), vec![2.0, 4.0, 6.0]);

    // Compound dot-assign.
    eval(&mut s, "a .+= 1");
    assert_eq!(eval_f64s(&mut s, "a"), vec![3.0, 5.0, 7.0]);

    // broadcast!/broadcast function forms.
    eval(&mut s, "out = [0.0, 0.0]");
    eval(&mut s, "broadcast!(+, out, [1.0, 2.0], [10.0, 20.0])");
    assert_eq!(eval_f64s(&mut s, "out"), vec![11.0, 22.0]);
    assert_eq!(
        eval_f64s(&mut s, "broadcast(*, [1.0, 2.0], 3)"),
        vec![3.0, 6.0]
    );
    // All-scalar broadcast returns the scalar result directly.
    assert!(matches!(eval(&mut s, "broadcast(+, 1, 2)"), Value::I64(3)));
}

#[test]
fn test_dot_assign_shape_check() {
    let mut s = session();
    eval(&mut s, "dest = [0.0, 0.0]");
    let err = s.eval("dest .= [1.0, 2.0, 3.0]").unwrap_err();
    assert_eq!(err.error.kind(), "DimensionMismatch");
}

#[test]
fn test_ref_shields_indexables() {
    let mut s = session();
    eval(&mut s, "needle = Ref([1, 2])");
    // The wrapped array participates as one scalar value.
    let r = eval(&mut s, "isequal.([[1, 2], [3, 4]], needle)");
    let Value::Array(r) = r else { panic!("expected array") };
    let flags: Vec<Value> = r.borrow().iter_values().collect();
    assert!(matches!(flags[0], Value::Bool(true)));
    assert!(matches!(flags[1], Value::Bool(false)));
}

#[test]
fn test_broadcast_over_tuples_and_ranges() {
    let mut s = session();
    let r = eval(&mut s, "(1, 2, 3) .+ 1");
    let Value::Tuple(t) = r else { panic!("tuple broadcast yields a tuple, got something else") };
    assert!(matches!(t[2], Value::I64(4)));

    assert_eq!(
        eval_f64s(&mut s, "(1:3) .* 2.0"),
        vec![2.0, 4.0, 6.0]
    );
}

#[test]
fn test_user_function_broadcasts() {
    let mut s = session();
    eval(&mut s, "double_plus(x) = 2x + 1");
    assert_eq!(
        eval_f64s(&mut s, "double_plus.([1.0, 2.0])"),
        vec![3.0, 5.0]
    );
}
