use test_case::test_case;

use tally_poly::CardinalityMode;

use crate::{CountGranularity, CountingPolicy, DEFAULT_SUBGROUP_SIZE, SubgroupSize};

#[test]
fn test_builder_defaults_match_default() {
    assert_eq!(CountingPolicy::builder().build(), CountingPolicy::default());
}

#[test]
fn test_builder_overrides() {
    let policy = CountingPolicy::builder()
        .count_redundant_work(true)
        .subgroup_size(SubgroupSize::fixed(64).unwrap())
        .cardinality(CardinalityMode::BoundingBox)
        .coalesced_granularity(CountGranularity::SubGroup)
        .build();
    assert!(policy.count_redundant_work);
    assert_eq!(policy.subgroup_size.resolve(), 64);
    assert_eq!(policy.cardinality, CardinalityMode::BoundingBox);
    assert_eq!(policy.coalesced_granularity, CountGranularity::SubGroup);
    assert!(policy.count_within_subscripts);
}

#[test_case("32", SubgroupSize::fixed(32) ; "fixed")]
#[test_case("guess", Some(SubgroupSize::Infer) ; "guess")]
#[test_case(" infer ", Some(SubgroupSize::Infer) ; "infer")]
#[test_case("0", None ; "zero")]
#[test_case("wide", None ; "garbage")]
fn test_subgroup_size_parse(text: &str, expected: Option<SubgroupSize>) {
    assert_eq!(text.parse::<SubgroupSize>().ok(), expected);
}

#[test]
fn test_inferred_subgroup_size() {
    assert_eq!(SubgroupSize::Infer.resolve(), DEFAULT_SUBGROUP_SIZE);
    assert_eq!(SubgroupSize::fixed(0), None);
    assert_eq!(SubgroupSize::Infer.to_string(), "infer");
}
