use test_case::test_case;

use crate::error::Error;
use crate::{BasicSet, LinExpr, parse_constraints};

#[test]
fn test_parse_params_and_dims() {
    let set = BasicSet::parse("[n, m] -> { [i, j] : 0 <= i < n and 0 <= j < m }").unwrap();
    assert_eq!(set.dims(), ["i", "j"]);
    assert!(set.params().contains("n"));
    assert!(set.params().contains("m"));
    assert_eq!(set.constraints().len(), 4);
}

#[test]
fn test_undeclared_names_become_params() {
    let set = BasicSet::parse("{ [i] : 0 <= i < len }").unwrap();
    assert!(set.params().contains("len"));
}

#[test]
fn test_chained_lists() {
    let set = BasicSet::parse("[n] -> { [i, j] : 0 <= i, j < n }").unwrap();
    let expected = [
        LinExpr::var("i").at_least(0i64),
        LinExpr::var("j").at_least(0i64),
        LinExpr::var("i").less_than("n"),
        LinExpr::var("j").less_than("n"),
    ];
    for constraint in expected {
        assert!(set.constraints().contains(&constraint), "missing {constraint}");
    }
}

#[test]
fn test_implicit_and_explicit_multiplication() {
    let implicit = BasicSet::parse("{ [i] : 0 <= 2i <= 10 }").unwrap();
    let explicit = BasicSet::parse("{ [i] : 0 <= 2*i and i*2 <= 10 }").unwrap();
    assert_eq!(implicit.simplify().constraints(), explicit.simplify().constraints());
}

#[test]
fn test_parenthesized_and_negated() {
    let set = BasicSet::parse("[n] -> { [i] : -(i - n) >= 1 }").unwrap();
    assert_eq!(set.constraints(), [LinExpr::from("n").greater_than("i")]);
}

#[test]
fn test_no_constraints() {
    let set = BasicSet::parse("{ [i] }").unwrap();
    assert!(set.constraints().is_empty());
    assert!(set.params().is_empty());
}

#[test_case("{ [i] : 0 <= i < }" ; "missing operand")]
#[test_case("{ [i] : i }" ; "missing comparison")]
#[test_case("{ [i] : i * i < 4 }" ; "non affine product")]
#[test_case("[n] -> { [n] : 0 <= n }" ; "param dim clash")]
#[test_case("{ [i, i] }" ; "duplicate dim")]
#[test_case("{ [i] : 0 <= i } extra" ; "trailing input")]
#[test_case("{ [i] : 0 <= i # 3 }" ; "bad character")]
fn test_parse_errors(text: &str) {
    assert!(matches!(BasicSet::parse(text), Err(Error::Parse { .. })));
}

#[test]
fn test_parse_error_position() {
    let Err(Error::Parse { position, .. }) = BasicSet::parse("{ [i] : 0 <= i ? 3 }") else {
        panic!("expected a parse error");
    };
    assert_eq!(position, 15);
}

#[test]
fn test_parse_constraints() {
    let constraints = parse_constraints("n, m >= 1 and n <= 1024").unwrap();
    assert_eq!(constraints.len(), 3);
    assert!(constraints.contains(&LinExpr::var("m").at_least(1i64)));
    assert!(parse_constraints("  ").unwrap().is_empty());
}
