use test_case::test_case;

use tally_dtype::DType;
use tally_ir::Expr;

use crate::Error;
use crate::test::helpers::*;
use crate::types::{TypeOracle, is_builtin};

#[test_case(at("a", [var("i"), var("j"), var("k")]) * 2, DType::Float32 ; "int literal adopts float")]
#[test_case(at("a", [var("i"), var("j"), var("k")]) * 2.0, DType::Float32 ; "float literal keeps single precision")]
#[test_case(at("g", [var("i"), var("k")]) + at("a", [var("i"), var("j"), var("k")]), DType::Float64 ; "promotion")]
#[test_case(var("k") + 1, DType::Int32 ; "index arithmetic")]
#[test_case(var("k") * 0.5, DType::Float64 ; "float literal promotes integers")]
#[test_case(var("k") / 2, DType::Float64 ; "true division of integers")]
#[test_case(var("k").less_than(3), DType::Bool ; "comparison")]
#[test_case(Expr::call("sqrt", [var("k")]), DType::Float64 ; "integer argument to float function")]
#[test_case(Expr::call("abs", [var("k")]), DType::Int32 ; "abs keeps integers")]
fn test_inferred_dtype(expr: Expr, expected: DType) {
    let kernel = basic();
    assert_eq!(TypeOracle::new(&kernel).dtype(&expr).unwrap(), expected);
}

#[test]
fn test_unresolved_variable() {
    let kernel = basic();
    let err = TypeOracle::new(&kernel).dtype(&(var("mystery") + 1)).unwrap_err();
    assert_eq!(err, Error::UnresolvedType { variable: "mystery".into() });
}

#[test]
fn test_literals_default_types() {
    let kernel = basic();
    let oracle = TypeOracle::new(&kernel);
    assert_eq!(oracle.dtype(&Expr::int(1)).unwrap(), DType::Int32);
    assert_eq!(oracle.dtype(&Expr::float(1.0)).unwrap(), DType::Float64);
}

#[test]
fn test_builtins() {
    assert!(is_builtin("rsqrt"));
    assert!(!is_builtin("frobnicate"));
}
