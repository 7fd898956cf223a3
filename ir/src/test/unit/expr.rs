use std::collections::BTreeSet;

use tally_poly::{LinExpr, QPoly, Rational};
use test_case::test_case;

use crate::{CmpOp, Expr, ReduceOp};

fn var(name: &str) -> Expr {
    Expr::var(name)
}

#[test]
fn test_sum_and_product_flatten() {
    let sum = var("x") + var("y") + var("z");
    assert_eq!(sum, Expr::Sum(vec![var("x"), var("y"), var("z")]));

    let product = var("x") * (var("y") * var("z"));
    assert_eq!(product, Expr::Product(vec![var("x"), var("y"), var("z")]));
}

#[test]
fn test_negation() {
    assert_eq!(-var("x"), Expr::Product(vec![Expr::Int(-1), var("x")]));
    assert_eq!(-Expr::int(3), Expr::Int(-3));
    assert_eq!((-var("x")).to_string(), "-x");
}

#[test_case(var("a") * 2 + var("b"), "a*2 + b" ; "sum of product")]
#[test_case((var("a") + var("b")) * var("c"), "(a + b)*c" ; "parenthesized sum")]
#[test_case(var("a") - (var("b") - var("c")), "a - (b - c)" ; "right associated difference")]
#[test_case(var("a") / 2.0, "a/2.0" ; "float literal")]
#[test_case(var("a").floor_div(4) % 3, "a // 4 % 3" ; "floor division and remainder")]
#[test_case(var("i").less_than(var("n") - 1), "i < n - 1" ; "comparison")]
#[test_case(var("a") & var("b") | var("c"), "a & b | c" ; "bitwise")]
#[test_case(var("a") << 2, "a << 2" ; "shift")]
#[test_case(!var("a"), "~a" ; "complement")]
#[test_case(Expr::call("exp", [var("x")]), "exp(x)" ; "call")]
#[test_case(Expr::if_then_else(var("c").greater_than(0), 1, 2), "if(c > 0, 1, 2)" ; "conditional")]
#[test_case(Expr::max([var("x"), Expr::int(0)]), "max(x, 0)" ; "max")]
fn test_display(expr: Expr, expected: &str) {
    assert_eq!(expr.to_string(), expected);
}

#[test]
fn test_reduce_display_and_free_variables() {
    let body = Expr::subscript("a", [var("i"), var("k")]) * Expr::subscript("b", [var("k"), var("j")]);
    let reduce = Expr::reduce(ReduceOp::Sum, ["k"], body);
    assert_eq!(reduce.to_string(), "sum(k, a[i, k]*b[k, j])");

    let expected: BTreeSet<String> = ["i", "j"].into_iter().map(String::from).collect();
    assert_eq!(reduce.free_variables(), expected);
    assert_eq!(reduce.reduction_axes().into_iter().collect::<Vec<_>>(), vec!["k".to_string()]);
    assert_eq!(reduce.arrays().len(), 2);
}

#[test]
fn test_to_lin_expr() {
    let e = var("i") * 2 + var("j") - 3;
    assert_eq!(e.to_lin_expr(), Some(LinExpr::term("i", 2) + LinExpr::var("j") - LinExpr::constant(3)));
    assert_eq!((var("i") * var("j")).to_lin_expr(), None);
    assert_eq!(var("i").floor_div(4).to_lin_expr(), None);
    assert_eq!((var("i") / 2).to_lin_expr(), None);
}

#[test]
fn test_to_qpoly_floor_and_remainder() {
    let q = var("i").floor_div(4).to_qpoly().unwrap();
    assert_eq!(q.eval(&[("i", 9)]).unwrap(), Rational::int(2));

    let r = (var("i") % 4).to_qpoly().unwrap();
    assert_eq!(r.eval(&[("i", 9)]).unwrap(), Rational::int(1));
    assert_eq!(r.eval(&[("i", -1)]).unwrap(), Rational::int(3));

    assert!(var("i").floor_div(var("n")).to_qpoly().is_none());
}

#[test]
fn test_linear_in_symbolic_coefficient() {
    let index = var("n") * var("i") + var("j") + 5;
    let form = index.linear_in(&["i", "j"]).unwrap();
    assert_eq!(form.coefficient("i"), QPoly::param("n"));
    assert_eq!(form.coefficient("j"), QPoly::one());
    assert_eq!(form.coefficient("k"), QPoly::zero());
    assert_eq!(form.offset, QPoly::from(5));
}

#[test]
fn test_linear_in_rejects_cross_terms() {
    assert!((var("i") * var("j")).linear_in(&["i", "j"]).is_none());
    assert!((var("i") * var("i")).linear_in(&["i"]).is_none());
    assert!(var("i").floor_div(2).linear_in(&["i"]).is_none());
}

#[test]
fn test_cmp_op_from_str() {
    assert_eq!("<=".parse::<CmpOp>().unwrap(), CmpOp::Le);
    assert_eq!(CmpOp::Ne.to_string(), "!=");
}
