//! End-to-end parser tests: source text in, surface tree shape out.

use mjulia_parser::{parse_expression, parse_program, SynNode};
use pretty_assertions::assert_eq;

fn head_of(node: &SynNode) -> &str {
    match node {
        SynNode::Expr(e) => &e.head,
        _ => panic!("expected Expr node, got {:?}", node),
    }
}

fn expr_args(node: &SynNode) -> &[SynNode] {
    match node {
        SynNode::Expr(e) => &e.args,
        _ => panic!("expected Expr node, got {:?}", node),
    }
}

#[test]
fn test_call_with_positional_args() {
    let node = parse_expression("f(x, 1)").unwrap();
    assert_eq!(head_of(&node), "call");
    let args = expr_args(&node);
    assert_eq!(args.len(), 3);
    assert_eq!(args[0].as_ident(), Some("f"));
    assert_eq!(args[2], SynNode::Int(1));
}

#[test]
fn test_operator_precedence() {
    // 1 + 2 * 3 → +(1, *(2, 3))
    let node = parse_expression("1 + 2 * 3").unwrap();
    let args = expr_args(&node);
    assert_eq!(args[0].as_ident(), Some("+"));
    assert_eq!(args[1], SynNode::Int(1));
    assert_eq!(expr_args(&args[2])[0].as_ident(), Some("*"));
}

#[test]
fn test_power_is_right_associative() {
    // 2 ^ 3 ^ 2 → ^(2, ^(3, 2))
    let node = parse_expression("2 ^ 3 ^ 2").unwrap();
    let args = expr_args(&node);
    assert_eq!(args[0].as_ident(), Some("^"));
    assert_eq!(args[1], SynNode::Int(2));
    let inner = expr_args(&args[2]);
    assert_eq!(inner[0].as_ident(), Some("^"));
}

#[test]
fn test_unary_minus_binds_below_power() {
    // -x^2 → -(x^2)
    let node = parse_expression("-x^2").unwrap();
    let args = expr_args(&node);
    assert_eq!(args[0].as_ident(), Some("-"));
    assert_eq!(head_of(&args[1]), "call");
}

#[test]
fn test_negative_literal_folds() {
    assert_eq!(parse_expression("-3").unwrap(), SynNode::Int(-3));
    assert_eq!(parse_expression("-2.5").unwrap(), SynNode::Float(-2.5));
}

#[test]
fn test_range_syntax() {
    let node = parse_expression("1:10").unwrap();
    let args = expr_args(&node);
    assert_eq!(args[0].as_ident(), Some(":"));
    assert_eq!(args.len(), 3);

    let node = parse_expression("1:2:9").unwrap();
    assert_eq!(expr_args(&node).len(), 4);
}

#[test]
fn test_ternary_does_not_eat_range_colon() {
    let node = parse_expression("x > 0 ? 1 : 2").unwrap();
    assert_eq!(head_of(&node), "if");
    assert_eq!(expr_args(&node).len(), 3);
}

#[test]
fn test_assignment_and_compound_assignment() {
    let node = parse_expression("x = 1").unwrap();
    assert_eq!(head_of(&node), "=");
    let node = parse_expression("x += 1").unwrap();
    assert_eq!(head_of(&node), "+=");
    let node = parse_expression("c.n *= 3").unwrap();
    assert_eq!(head_of(&node), "*=");
    assert_eq!(head_of(&expr_args(&node)[0]), ".");
}

#[test]
fn test_tuple_destructuring_statement() {
    let node = parse_expression("x, y = 1, 2").unwrap();
    assert_eq!(head_of(&node), "=");
    let args = expr_args(&node);
    assert_eq!(head_of(&args[0]), "tuple");
    assert_eq!(head_of(&args[1]), "tuple");
}

#[test]
fn test_dot_call_and_dot_operator() {
    // sin.(x) → Expr(:., sin, (x,))
    let node = parse_expression("sin.(x)").unwrap();
    assert_eq!(head_of(&node), ".");
    let args = expr_args(&node);
    assert_eq!(args[0].as_ident(), Some("sin"));
    assert_eq!(head_of(&args[1]), "tuple");

    // a .+ b → call(.+, a, b)
    let node = parse_expression("a .+ b").unwrap();
    assert_eq!(expr_args(&node)[0].as_ident(), Some(".+"));
}

#[test]
fn test_field_access_produces_quoted_symbol() {
    let node = parse_expression("p.x").unwrap();
    assert_eq!(head_of(&node), ".");
    let args = expr_args(&node);
    assert_eq!(head_of(&args[1]), "symbol");
}

#[test]
fn test_index_with_end_keyword() {
    let node = parse_expression("a[end]").unwrap();
    assert_eq!(head_of(&node), "ref");
    assert_eq!(head_of(&expr_args(&node)[1]), "end");
}

#[test]
fn test_array_and_matrix_literals() {
    let node = parse_expression("[1, 2, 3]").unwrap();
    assert_eq!(head_of(&node), "vect");
    assert_eq!(expr_args(&node).len(), 3);

    let node = parse_expression("[1 2; 3 4]").unwrap();
    assert_eq!(head_of(&node), "vcat");
    let rows = expr_args(&node);
    assert_eq!(rows.len(), 2);
    assert_eq!(head_of(&rows[0]), "row");
}

#[test]
fn test_comprehension() {
    let node = parse_expression("[x^2 for x in 1:3]").unwrap();
    assert_eq!(head_of(&node), "comprehension");
    let gen = &expr_args(&node)[0];
    assert_eq!(head_of(gen), "generator");
}

#[test]
fn test_string_interpolation() {
    let node = parse_expression(r#""x is $x and $(y + 1)""#).unwrap();
    assert_eq!(head_of(&node), "string");
    let parts = expr_args(&node);
    assert_eq!(parts[0], SynNode::Str("x is ".to_string()));
    assert_eq!(parts[1].as_ident(), Some("x"));
    assert_eq!(head_of(&parts[3]), "call");
}

#[test]
fn test_plain_string_stays_literal() {
    assert_eq!(
        parse_expression(r#""hello\nworld""#).unwrap(),
        SynNode::Str("hello\nworld".to_string())
    );
}

#[test]
fn test_function_definition() {
    let prog = parse_program("function f(x::Int64, y=2; verbose=false)\n    x + y\nend").unwrap();
    assert_eq!(prog.len(), 1);
    assert_eq!(head_of(&prog[0]), "function");
    let sig = &expr_args(&prog[0])[0];
    assert_eq!(head_of(sig), "call");
}

#[test]
fn test_short_form_function_with_where() {
    let prog = parse_program("same_type(x::T, y::T) where T = (x, y)").unwrap();
    assert_eq!(head_of(&prog[0]), "=");
    let sig = &expr_args(&prog[0])[0];
    assert_eq!(head_of(sig), "where");
}

#[test]
fn test_struct_definitions() {
    let prog = parse_program("mutable struct C\n    n::Int64\nend").unwrap();
    let node = &prog[0];
    assert_eq!(head_of(node), "struct");
    assert_eq!(expr_args(node)[0], SynNode::Bool(true));

    let prog = parse_program("struct Point{T} <: Shape\n    x::T\n    y::T\nend").unwrap();
    assert_eq!(expr_args(&prog[0])[0], SynNode::Bool(false));
    assert_eq!(head_of(&expr_args(&prog[0])[1]), "<:");
}

#[test]
fn test_macro_call_forms() {
    let node = parse_expression("@swap(x, y)").unwrap();
    assert_eq!(head_of(&node), "macrocall");
    assert_eq!(expr_args(&node)[0].as_ident(), Some("@swap"));

    let prog = parse_program("@assert x == y").unwrap();
    assert_eq!(head_of(&prog[0]), "macrocall");
    assert_eq!(expr_args(&prog[0]).len(), 2);
}

#[test]
fn test_at_dot_macro() {
    let node = parse_expression("@. a + b").unwrap();
    assert_eq!(expr_args(&node)[0].as_ident(), Some("@__dot__"));
}

#[test]
fn test_quote_forms() {
    let node = parse_expression(":(x + 1)").unwrap();
    assert_eq!(head_of(&node), "quote");

    let node = parse_expression(":foo").unwrap();
    assert_eq!(head_of(&node), "symbol");

    let prog = parse_program("quote\n    local t = 1\nend").unwrap();
    assert_eq!(head_of(&prog[0]), "quote");
}

#[test]
fn test_unquote_and_splat_in_quote() {
    let node = parse_expression(":(f($x, $(xs...)))").unwrap();
    let inner = &expr_args(&node)[0];
    let call_args = expr_args(inner);
    assert_eq!(head_of(&call_args[1]), "$");
    assert_eq!(head_of(&call_args[2]), "$");
    assert_eq!(head_of(&expr_args(&call_args[2])[0]), "...");
}

#[test]
fn test_try_catch_finally() {
    let prog = parse_program("try\n    f()\ncatch e\n    g(e)\nfinally\n    h()\nend").unwrap();
    let args = expr_args(&prog[0]);
    assert_eq!(args.len(), 4);
    assert_eq!(args[1].as_ident(), Some("e"));
}

#[test]
fn test_for_while_loops() {
    let prog = parse_program("for i in 1:3\n    f(i)\nend").unwrap();
    assert_eq!(head_of(&prog[0]), "for");
    assert_eq!(head_of(&expr_args(&prog[0])[0]), "=");

    let prog = parse_program("while x > 0\n    x -= 1\nend").unwrap();
    assert_eq!(head_of(&prog[0]), "while");
}

#[test]
fn test_anonymous_function() {
    let node = parse_expression("x -> x + 1").unwrap();
    assert_eq!(head_of(&node), "->");
}

#[test]
fn test_named_tuple_literal() {
    let node = parse_expression("(a = 1, b = 2)").unwrap();
    assert_eq!(head_of(&node), "tuple");
    assert_eq!(head_of(&expr_args(&node)[0]), "=");
}

#[test]
fn test_pair_operator() {
    let node = parse_expression(r#""k" => 1"#).unwrap();
    assert_eq!(expr_args(&node)[0].as_ident(), Some("=>"));
}

#[test]
fn test_parse_error_reports_position() {
    let err = parse_program("f(x,").unwrap_err();
    assert!(err.to_string().contains("expected"));
}

#[test]
fn test_keyword_call_sections() {
    let node = parse_expression("plot(x; color = :red)").unwrap();
    let args = expr_args(&node);
    // parameters group comes right after the callee
    assert_eq!(head_of(&args[1]), "parameters");
}

#[test]
fn test_splat_argument() {
    let node = parse_expression("f(xs...)").unwrap();
    assert_eq!(head_of(&expr_args(&node)[1]), "...");
}

#[test]
fn test_typed_and_curly() {
    let node = parse_expression("x::Vector{Int64}").unwrap();
    assert_eq!(head_of(&node), "::");
    assert_eq!(head_of(&expr_args(&node)[1]), "curly");
}

#[test]
fn test_adjoint_postfix() {
    let node = parse_expression("A'").unwrap();
    assert_eq!(expr_args(&node)[0].as_ident(), Some("adjoint"));
}

#[test]
fn test_block_program_statements() {
    let prog = parse_program("x = 1\ny = 2; z = 3\n").unwrap();
    assert_eq!(prog.len(), 3);
}
