//! General language coverage: control flow, functions, closures,
//! structs, collections, strings, and tasks — all from source text.

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
fn test_control_flow() {
    let mut s = session();
    assert_eq!(eval_i64(&mut s, "if 1 < 2\n    10\nelse\n    20\nend"), 10);
    assert_eq!(
        eval_i64(&mut s, "x = 5\nif x < 0\n    -1\nelseif x == 0\n    0\nelse\n    1\nend"),
        1
    );
    assert_eq!(eval_i64(&mut s, "x > 0 ? 100 : 200"), 100);

    let total = eval_i64(
        &mut s,
        "total = 0\nfor i in 1:10\n    total += i\nend\ntotal",
    );
    assert_eq!(total, 55);

    let n = eval_i64(
        &mut s,
        "n = 0\nwhile n < 7\n    n += 1\nend\nn",
    );
    assert_eq!(n, 7);

    // break / continue
    let r = eval_i64(
        &mut s,
        "acc = 0\nfor i in 1:100\n    if i % 2 == 0\n        continue\n    end\n    if i > 10\n        break\n    end\n    acc += i\nend\nacc",
    );
    assert_eq!(r, 1 + 3 + 5 + 7 + 9);
}

#[test]
fn test_short_circuit_values() {
    let mut s = session();
    assert!(matches!(eval(&mut s, "true && false"), Value::Bool(false)));
    assert!(matches!(eval(&mut s, "false || true"), Value::Bool(true)));
    // Short-circuit must not evaluate the right side.
    assert!(matches!(
        eval(&mut s, "false && error(\"not reached\")"),
        Value::Bool(false)
    ));
    assert!(matches!(
        eval(&mut s, "true || error(\"not reached\")"),
        Value::Bool(true)
    ));
}

#[test]
fn test_functions_kwargs_defaults_varargs() {
    let mut s = session();
    eval(&mut s, "f(x; scale = 2) = x * scale");
    assert_eq!(eval_i64(&mut s, "f(3)"), 6);
    assert_eq!(eval_i64(&mut s, "f(3, scale = 10)"), 30);

    // Required keyword.
    eval(&mut s, "g(; n) = n + 1");
    assert_eq!(eval_i64(&mut s, "g(n = 4)"), 5);
    let err = s.eval("g()").unwrap_err();
    assert_eq!(err.error.kind(), "UndefKeywordError");

    // Optional positional expands into reduced-arity methods.
    eval(&mut s, "h(a, b = a + 1) = (a, b)");
    let r = eval(&mut s, "h(10)");
    let Value::Tuple(t) = r else { panic!() };
    assert!(matches!(t[1], Value::I64(11)));

    // Varargs and call-site splat.
    eval(&mut s, "count_args(xs...) = length(xs)");
    assert_eq!(eval_i64(&mut s, "count_args(1, 2, 3)"), 3);
    eval(&mut s, "add3(a, b, c) = a + b + c");
    assert_eq!(eval_i64(&mut s, "t = (1, 2, 3)\nadd3(t...)"), 6);
    assert_eq!(eval_i64(&mut s, "add3(0, [4, 5]...)"), 9);

    // kwargs... collected into the catch-all.
    eval(&mut s, "kwcount(; kws...) = length(kws)");
    assert_eq!(eval_i64(&mut s, "kwcount(a = 1, b = 2)"), 2);
}

#[test]
fn test_closures_capture_bindings_not_values() {
    let mut s = session();
    eval(
        &mut s,
        "function make_counter()\n    n = 0\n    inc() = begin\n        n += 1\n        n\n    end\n    inc\nend",
    );
    eval(&mut s, "c = make_counter()");
    assert_eq!(eval_i64(&mut s, "c()"), 1);
    assert_eq!(eval_i64(&mut s, "c()"), 2);
    // A second counter is independent.
    eval(&mut s, "d = make_counter()");
    assert_eq!(eval_i64(&mut s, "d()"), 1);
    assert_eq!(eval_i64(&mut s, "c()"), 3);

    // Rebinding a captured variable is observable through the closure.
    eval(
        &mut s,
        "function observe()\n    v = 1\n    get() = v\n    v = 42\n    get\nend",
    );
    assert_eq!(eval_i64(&mut s, "observe()()"), 42);

    // Anonymous functions.
    assert_eq!(eval_i64(&mut s, "(x -> x * 2)(21)"), 42);
    assert_eq!(eval_i64(&mut s, "((a, b) -> a + b)(40, 2)"), 42);
}

#[test]
fn test_structs_and_identity() {
    let mut s = session();
    eval(&mut s, "struct Point\n    x::Float64\n    y::Float64\nend");
    eval(&mut s, "p = Point(1, 2.5)");
    assert!(matches!(eval(&mut s, "p.x"), Value::F64(x) if x == 1.0));
    // Immutable structs reject field writes.
    let err = s.eval("p.x = 3.0").unwrap_err();
    assert_eq!(err.error.kind(), "TypeError");

    eval(&mut s, "mutable struct Box\n    v\nend");
    eval(&mut s, "a = Box(1)");
    eval(&mut s, "b = a");
    eval(&mut s, "b.v = 2");
    assert_eq!(eval_i64(&mut s, "a.v"), 2);
    assert!(matches!(eval(&mut s, "a === b"), Value::Bool(true)));
    assert!(matches!(
        eval(&mut s, "Box(1) === Box(1)"),
        Value::Bool(false)
    ));

    // Parametric struct with inferred parameter.
    eval(&mut s, "struct Wrap{T}\n    inner::T\nend");
    let shown =
        mjulia::values::display_value(&eval(&mut s, "typeof(Wrap(1.0))"));
    assert_eq!(shown, "Wrap{Float64}");

    // Field access on an unknown field.
    let err = s.eval("p.zzz").unwrap_err();
    assert_eq!(err.error.kind(), "UndefFieldError");
}

#[test]
fn test_abstract_types_and_dispatch() {
    let mut s = session();
    eval(&mut s, "abstract type Animal end");
    eval(&mut s, "struct Dog <: Animal end");
    eval(&mut s, "struct Cat <: Animal end");
    eval(&mut s, "speak(a::Animal) = \"...\"");
    eval(&mut s, "speak(d::Dog) = \"woof\"");
    assert!(matches!(
        eval(&mut s, "speak(Dog())"),
        Value::Str(v) if &*v == "woof"
    ));
    assert!(matches!(
        eval(&mut s, "speak(Cat())"),
        Value::Str(v) if &*v == "..."
    ));
    assert!(matches!(eval(&mut s, "Dog() isa Animal"), Value::Bool(true)));
    assert!(matches!(eval(&mut s, "Dog <: Animal"), Value::Bool(true)));
    assert!(matches!(
        eval(&mut s, "Vector{Int64} <: Vector{Number}"),
        Value::Bool(false)
    ));
    assert!(matches!(
        eval(&mut s, "Tuple{Int64} <: Tuple{Number}"),
        Value::Bool(true)
    ));
}

#[test]
fn test_collections() {
    let mut s = session();
    // Arrays.
    assert_eq!(eval_i64(&mut s, "xs = [10, 20, 30]\nxs[2]"), 20);
    assert_eq!(eval_i64(&mut s, "xs[end]"), 30);
    eval(&mut s, "push!(xs, 40)");
    assert_eq!(eval_i64(&mut s, "length(xs)"), 4);
    assert_eq!(eval_i64(&mut s, "pop!(xs)"), 40);
    assert_eq!(eval_i64(&mut s, "sum(xs)"), 60);
    assert_eq!(eval_i64(&mut s, "sum(x -> x * 2, xs)"), 120);

    // Matrix shape and column-major indexing.
    eval(&mut s, "m = [1 2; 3 4]");
    assert_eq!(eval_i64(&mut s, "m[2, 1]"), 3);
    assert_eq!(eval_i64(&mut s, "size(m, 1)"), 2);

    // Ranges are lazy but indexable.
    assert_eq!(eval_i64(&mut s, "r = 1:2:9\nlength(r)"), 5);
    assert_eq!(eval_i64(&mut s, "r[3]"), 5);
    assert_eq!(eval_i64(&mut s, "sum(1:100)"), 5050);

    // Comprehensions.
    assert_eq!(eval_i64(&mut s, "sum([x^2 for x in 1:4])"), 30);
    assert_eq!(
        eval_i64(&mut s, "length([x for x in 1:10 if x % 3 == 0])"),
        3
    );

    // Tuples and named tuples.
    assert_eq!(eval_i64(&mut s, "t = (1, \"two\", 3.0)\nt[1]"), 1);
    assert_eq!(eval_i64(&mut s, "nt = (a = 1, b = 2)\nnt.b"), 2);

    // Dicts keyed by isequal/hash.
    eval(&mut s, "d = Dict(\"a\" => 1, \"b\" => 2)");
    assert_eq!(eval_i64(&mut s, "d[\"a\"]"), 1);
    eval(&mut s, "d[\"c\"] = 3");
    assert!(matches!(eval(&mut s, "haskey(d, \"c\")"), Value::Bool(true)));
    assert_eq!(eval_i64(&mut s, "length(d)"), 3);
    let err = s.eval("d[\"zzz\"]").unwrap_err();
    assert_eq!(err.error.kind(), "KeyError");

    // Sets.
    eval(&mut s, "set = Set([1, 2, 2, 3])");
    assert_eq!(eval_i64(&mut s, "length(set)"), 3);
    assert!(matches!(eval(&mut s, "2 in set"), Value::Bool(true)));

    // Views share storage with the parent.
    eval(&mut s, "base = [1, 2, 3, 4]");
    eval(&mut s, "v = view(base, 2:3)");
    eval(&mut s, "v[1] = 99");
    assert_eq!(eval_i64(&mut s, "base[2]"), 99);

    // Destructuring.
    assert_eq!(eval_i64(&mut s, "(p, q) = (8, 9)\np + q"), 17);

    // Higher-order functions.
    assert_eq!(eval_i64(&mut s, "sum(map(x -> x + 1, [1, 2, 3]))"), 9);
    assert_eq!(
        eval_i64(&mut s, "length(filter(iseven, [1, 2, 3, 4]))"),
        2
    );
    assert_eq!(eval_i64(&mut s, "reduce(+, [1, 2, 3], init = 10)"), 16);
}

#[test]
fn test_strings() {
    let mut s = session();
    assert!(matches!(
        eval(&mut s, "name = \"world\"\n\"hello $name\""),
        Value::Str(v) if &*v == "hello world"
    ));
    assert!(matches!(
        eval(&mut s, "\"1 + 1 = $(1 + 1)\""),
        Value::Str(v) if &*v == "1 + 1 = 2"
    ));
    assert!(matches!(
        eval(&mut s, "\"ab\" * \"cd\""),
        Value::Str(v) if &*v == "abcd"
    ));
    assert_eq!(eval_i64(&mut s, "length(\"añc\")"), 3);
    assert_eq!(eval_i64(&mut s, "ncodeunits(\"añc\")"), 4);
    assert!(matches!(eval(&mut s, "\"añc\"[2]"), Value::Char('ñ')));
    assert_eq!(eval_i64(&mut s, "nextind(\"añc\", 2)"), 4);
    assert_eq!(eval_i64(&mut s, "prevind(\"añc\", 4)"), 2);
    assert!(matches!(
        eval(&mut s, "isvalid(\"añc\", 3)"),
        Value::Bool(false)
    ));
    assert!(matches!(
        eval(&mut s, "occursin(\"ñ\", \"añc\")"),
        Value::Bool(true)
    ));
    assert!(matches!(
        eval(&mut s, "replace(\"aaa\", \"a\" => \"b\", count = 2)"),
        Value::Str(v) if &*v == "bba"
    ));
    assert_eq!(eval_i64(&mut s, "parse(Int64, \"42\")"), 42);
    assert!(matches!(
        eval(&mut s, "tryparse(Int64, \"xy\")"),
        Value::Nothing
    ));
    assert!(matches!(
        eval(&mut s, "join([1, 2, 3], \", \")"),
        Value::Str(v) if &*v == "1, 2, 3"
    ));
    assert!(matches!(
        eval(&mut s, "uppercase(\"abc\")"),
        Value::Str(v) if &*v == "ABC"
    ));
    // IOBuffer / take! idiom.
    assert!(matches!(
        eval(
            &mut s,
            "buf = IOBuffer()\nprint(buf, \"a\")\nprint(buf, 1)\nString(take!(buf))"
        ),
        Value::Str(v) if &*v == "a1"
    ));
}

#[test]
fn test_regex_surface() {
    let mut s = session();
    eval(&mut s, "re = Regex(\"[0-9]+\")");
    assert!(matches!(
        eval(&mut s, "occursin(re, \"abc 123\")"),
        Value::Bool(true)
    ));
    eval(&mut s, "m = match(re, \"abc 123 xyz\")");
    assert!(matches!(
        eval(&mut s, "m.match"),
        Value::Str(v) if &*v == "123"
    ));
    assert_eq!(eval_i64(&mut s, "m.offset"), 5);
    assert!(matches!(
        eval(&mut s, "match(re, \"nope\")"),
        Value::Nothing
    ));
}

#[test]
fn test_tasks_run_to_completion() {
    let mut s = session();
    eval(&mut s, "t = Task(() -> 41 + 1)");
    assert!(matches!(
        eval(&mut s, "istaskdone(t)"),
        Value::Bool(false)
    ));
    eval(&mut s, "schedule(t)");
    assert!(matches!(eval(&mut s, "istaskdone(t)"), Value::Bool(true)));
    assert_eq!(eval_i64(&mut s, "fetch(t)"), 42);
    assert!(matches!(eval(&mut s, "yield()"), Value::Nothing));

    // A failing task surfaces through wait/fetch.
    eval(&mut s, "bad = Task(() -> error(\"boom\"))");
    eval(&mut s, "schedule(bad)");
    let err = s.eval("wait(bad)").unwrap_err();
    assert_eq!(err.error.kind(), "TaskFailedException");

    let err = s.eval("current_task()").unwrap_err();
    assert_eq!(err.error.kind(), "ArgumentError");
}

#[test]
fn test_timing_macros() {
    let mut s = session();
    let v = eval(&mut s, "@elapsed sum(1:1000)");
    assert!(matches!(v, Value::F64(x) if x >= 0.0));
    assert_eq!(eval_i64(&mut s, "@allocated sum(1:1000)"), 0);
    let v = eval(&mut s, "@timed 21 * 2");
    let Value::NamedTuple(nt) = v else { panic!("expected NamedTuple") };
    assert!(matches!(
        nt.get_by_name(mjulia::Symbol::intern("value")),
        Some(Value::I64(42))
    ));
}

#[test]
fn test_stdlib_loaded_methods() {
    let mut s = session();
    assert_eq!(eval_i64(&mut s, "clamp(15, 1, 10)"), 10);
    assert_eq!(eval_i64(&mut s, "clamp(-3, 1, 10)"), 1);
    assert_eq!(eval_i64(&mut s, "argmax([3, 9, 4])"), 2);
    let r = eval(&mut s, "extrema([5, 1, 9])");
    let Value::Tuple(t) = r else { panic!() };
    assert!(matches!(t[0], Value::I64(1)));
    assert!(matches!(t[1], Value::I64(9)));
    assert_eq!(eval_i64(&mut s, "length(unique([1, 1, 2, 3, 3]))"), 3);
    assert_eq!(eval_i64(&mut s, "length(skipmissing([1, missing, 3]))"), 2);
    // User methods can shadow stdlib methods through normal dispatch.
    eval(&mut s, "clamp(x::Int64, lo::Int64, hi::Int64) = -1");
    assert_eq!(eval_i64(&mut s, "clamp(15, 1, 10)"), -1);
    assert!(matches!(
        eval(&mut s, "clamp(1.5, 0.0, 1.0)"),
        Value::F64(x) if x == 1.0
    ));
}
