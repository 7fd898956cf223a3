use std::str::FromStr;

use itertools::Itertools;
use test_case::test_case;

use crate::error::Error;
use crate::{
    BasicSet, BoundingBoxCounter, Cardinality, CardinalityMode, ExactCounter, FallbackCounter, LinExpr,
    exact_counting_available,
};

const NO_PARAMS: [(&str, i64); 0] = [];

fn triangle() -> BasicSet {
    BasicSet::parse("[n, m] -> { [i, j] : 0 <= i < n and 0 <= j < m and i < j }").unwrap()
}

#[test_case(3, 4, 5, 60 ; "general")]
#[test_case(1, 1, 1, 1 ; "unit")]
#[test_case(0, 4, 5, 0 ; "empty")]
fn test_box(n: i64, m: i64, ell: i64, expected: i64) {
    let set = BasicSet::parse("[n, m, ell] -> { [i, k, j] : 0 <= i < n and 0 <= k < m and 0 <= j < ell }").unwrap();
    let params = [("n", n), ("m", m), ("ell", ell)];
    assert_eq!(ExactCounter.card(&set).unwrap().eval(&params).unwrap(), expected);
    assert_eq!(BoundingBoxCounter.card(&set).unwrap().eval(&params).unwrap(), expected);
}

#[test]
fn test_triangle_exact() {
    let count = ExactCounter.card(&triangle()).unwrap();
    assert_eq!(count.eval(&[("n", 200), ("m", 13)]).unwrap(), 78);
    assert_eq!(count.eval(&[("n", 3), ("m", 13)]).unwrap(), 33);
}

#[test]
fn test_triangle_bounding_box() {
    let count = BoundingBoxCounter.card(&triangle()).unwrap();
    assert_eq!(count.eval(&[("n", 200), ("m", 13)]).unwrap(), 144);
}

#[test]
fn test_triangle_mode_dependent() {
    let count = CardinalityMode::Auto.counter().card(&triangle()).unwrap();
    let expected = if exact_counting_available() { 78 } else { 144 };
    assert_eq!(count.eval(&[("n", 200), ("m", 13)]).unwrap(), expected);
}

#[test]
fn test_projection_counts_outer_points() {
    let projected = triangle().project_onto(&["i"]).unwrap();
    let count = ExactCounter.card(&projected).unwrap();
    assert_eq!(count.eval(&[("n", 200), ("m", 13)]).unwrap(), 12);
}

#[test]
fn test_zero_dimensional_set() {
    let set = BasicSet::parse("[n] -> { [i] : 0 <= i < n }").unwrap().project_onto::<&str>(&[]).unwrap();
    let count = ExactCounter.card(&set).unwrap();
    assert_eq!(count.eval(&[("n", 5)]).unwrap(), 1);
    assert_eq!(count.eval(&[("n", 0)]).unwrap(), 0);
}

#[test]
fn test_strided_image() {
    // c[2*i] touches n distinct cells.
    let base = BasicSet::parse("[n] -> { [i] : 0 <= i < n }").unwrap();
    let image = base.apply_access(&[LinExpr::var("i") * 2], &["a"]).unwrap();
    assert_eq!(ExactCounter.card(&image).unwrap().eval(&[("n", 17)]).unwrap(), 17);
    let relaxed = ExactCounter.card(&image.remove_divisive_terms()).unwrap();
    assert_eq!(relaxed.eval(&[("n", 17)]).unwrap(), 33);
}

#[test]
fn test_exact_is_strict_and_auto_falls_back() {
    let set = BasicSet::parse("[n] -> { [i, e] : 0 <= i < n and 3e <= i <= 3e + 1 }").unwrap();
    let projected = set.project_onto(&["i"]).unwrap();
    assert!(matches!(ExactCounter.card(&projected), Err(Error::Unsupported { .. })));
    assert!(matches!(CardinalityMode::Exact.counter().card(&projected), Err(Error::Unsupported { .. })));
    // Exact would be 6; the box is [0, n).
    assert_eq!(FallbackCounter.card(&projected).unwrap().eval(&[("n", 9)]).unwrap(), 9);
}

#[test_case(0, 1, 1)]
#[test_case(3, 3, 4)]
#[test_case(7, 8, 12)]
#[test_case(10, 14, 24)]
fn test_weighted_simplex(n: i64, exact: i64, bbox: i64) {
    let set = BasicSet::parse("[n] -> { [i, j] : 0 <= i and 0 <= j and 2i + 3j <= n }").unwrap();
    let params = [("n", n)];
    assert_eq!(ExactCounter.card(&set).unwrap().eval(&params).unwrap(), exact);
    assert_eq!(CardinalityMode::Exact.counter().card(&set).unwrap().eval(&params).unwrap(), exact);
    assert_eq!(BoundingBoxCounter.card(&set).unwrap().eval(&params).unwrap(), bbox);
}

#[test]
fn test_equality_in_domain() {
    let set = BasicSet::parse("[n] -> { [i, j] : 0 <= i < n and j = 2i + 1 }").unwrap();
    assert_eq!(ExactCounter.card(&set).unwrap().eval(&[("n", 6)]).unwrap(), 6);
}

#[test]
fn test_parametric_floor_bounds() {
    let set = BasicSet::parse("[n] -> { [i] : 0 <= 4i < n }").unwrap();
    let count = ExactCounter.card(&set).unwrap();
    for (n, expected) in [(1, 1), (4, 1), (5, 2), (8, 2), (9, 3)] {
        assert_eq!(count.eval(&[("n", n)]).unwrap(), expected, "n = {n}");
    }
}

#[test]
fn test_tiled_domain() {
    let set = BasicSet::parse("[n] -> { [o, l] : 0 <= l < 16 and 0 <= o and 16o + l < n }").unwrap();
    let count = ExactCounter.card(&set).unwrap();
    for n in [1, 15, 16, 17, 40, 64] {
        assert_eq!(count.eval(&[("n", n)]).unwrap(), n, "n = {n}");
    }
}

#[test]
fn test_unbounded() {
    let set = BasicSet::parse("[n] -> { [i] : i < n }").unwrap();
    assert_eq!(
        ExactCounter.card(&set),
        Err(Error::Unbounded { dim: "i".into(), side: "lower" })
    );
}

#[test]
fn test_union_of_overlapping_parts() {
    let lhs = BasicSet::parse("{ [i] : 0 <= i < 10 }").unwrap();
    let rhs = BasicSet::parse("{ [i] : 5 <= i < 15 }").unwrap();
    let disjoint = BasicSet::parse("{ [i] : 20 <= i < 23 }").unwrap();
    let count = ExactCounter.card_union(&[lhs.clone(), rhs, disjoint]).unwrap();
    assert_eq!(count.eval(&NO_PARAMS).unwrap(), 18);
    assert_eq!(ExactCounter.card_union(&[lhs.clone(), lhs]).unwrap().eval(&NO_PARAMS).unwrap(), 10);
    assert!(ExactCounter.card_union(&[]).unwrap().is_zero());
}

fn shifted_windows(taps: i64) -> Vec<BasicSet> {
    (0..taps)
        .map(|k| BasicSet::parse(&format!("[n] -> {{ [a] : {k} <= a < n + {k} }}")).unwrap())
        .collect()
}

#[test_case(2, 1001 ; "two taps")]
#[test_case(7, 1006 ; "seven taps")]
#[test_case(12, 1011 ; "twelve taps")]
fn test_union_of_many_windows(taps: i64, expected: i64) {
    let windows = shifted_windows(taps);
    let params = [("n", 1000)];
    assert_eq!(ExactCounter.card_union(&windows).unwrap().eval(&params).unwrap(), expected);
    assert_eq!(BoundingBoxCounter.card_union(&windows).unwrap().eval(&params).unwrap(), expected);
}

#[test]
fn test_union_of_interleaved_strides() {
    let base = BasicSet::parse("[n] -> { [i] : 0 <= i < n }").unwrap();
    let strided = |k: i64, taps: i64| -> Vec<BasicSet> {
        (0..taps).map(|t| base.apply_access(&[LinExpr::var("i") * 2 + LinExpr::constant(k + t)], &["a"]).unwrap()).collect()
    };
    // Even and odd cells never meet.
    let count = ExactCounter.card_union(&strided(0, 2)).unwrap();
    assert_eq!(count.eval(&[("n", 10)]).unwrap(), 20);

    // Seven strided parts are beyond exact union counting; boxes cover [0, 2n + 4].
    let parts = strided(0, 7);
    assert!(matches!(ExactCounter.card_union(&parts), Err(Error::Unsupported { .. })));
    assert_eq!(FallbackCounter.card_union(&parts).unwrap().eval(&[("n", 10)]).unwrap(), 25);
}

#[test]
fn test_subtract_is_disjoint() {
    let lhs = BasicSet::parse("[n] -> { [i, j] : 0 <= i < n and 0 <= j < n }").unwrap();
    let rhs = BasicSet::parse("[n] -> { [i, j] : 2 <= i < n and 1 <= j <= 3 }").unwrap();
    let pieces = lhs.subtract(&rhs).unwrap();
    let params = [("n", 6)];
    let total: i64 = pieces.iter().map(|p| ExactCounter.card(p).unwrap().eval(&params).unwrap()).sum();
    assert_eq!(total, 36 - 12);
    for (a, b) in pieces.iter().tuple_combinations() {
        assert!(a.intersect(b).is_rationally_empty(), "{a} overlaps {b}");
    }
}

#[test_case("auto", CardinalityMode::Auto)]
#[test_case("exact", CardinalityMode::Exact)]
#[test_case("bbox", CardinalityMode::BoundingBox)]
#[test_case("BBox", CardinalityMode::BoundingBox ; "case insensitive")]
fn test_mode_from_str(text: &str, expected: CardinalityMode) {
    assert_eq!(CardinalityMode::from_str(text).unwrap(), expected);
}

#[test]
fn test_mode_resolution() {
    assert_eq!(CardinalityMode::BoundingBox.to_string(), "bbox");
    assert_eq!(CardinalityMode::Exact.resolve(), CardinalityMode::Exact);
    assert_ne!(CardinalityMode::Auto.resolve(), CardinalityMode::Auto);
    assert!(CardinalityMode::from_str("fast").is_err());
}
