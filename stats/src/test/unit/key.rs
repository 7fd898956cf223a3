use std::collections::HashSet;

use test_case::test_case;

use tally_dtype::DType;

use crate::{CountGranularity, CountKey, Direction, Error, FieldValue, MemAccess, MemoryType, Op, OpName, SyncKind};

#[test_case("workitem", CountGranularity::WorkItem ; "lowercase")]
#[test_case("SUBGROUP", CountGranularity::SubGroup ; "uppercase")]
#[test_case("work-group", CountGranularity::WorkGroup ; "dashed")]
#[test_case("sub_group", CountGranularity::SubGroup ; "underscored")]
fn test_granularity_parse(text: &str, expected: CountGranularity) {
    assert_eq!(text.parse::<CountGranularity>().unwrap(), expected);
}

#[test]
fn test_invalid_granularity() {
    assert_eq!("bushel".parse::<CountGranularity>().unwrap_err(), Error::InvalidGranularity { value: "bushel".into() });
    assert_eq!(
        Op::try_new(None, None, Some("bushel")).unwrap_err(),
        Error::InvalidGranularity { value: "bushel".into() }
    );
    assert_eq!(
        MemAccess::try_new(None, None, None, None, Some("bushel")).unwrap_err(),
        Error::InvalidGranularity { value: "bushel".into() }
    );
}

#[test]
fn test_valid_granularities_construct() {
    for text in ["workitem", "subgroup", "workgroup"] {
        assert!(Op::try_new(None, None, Some(text)).is_ok());
        assert!(MemAccess::try_new(Some(MemoryType::Global), None, None, Some("a"), Some(text)).is_ok());
    }
    let unspecified = Op::try_new(Some(DType::Float32), Some("add"), None).unwrap();
    assert_eq!(unspecified.granularity, None);
}

#[test_case("add", OpName::Add ; "add")]
#[test_case("bw", OpName::Bitwise ; "bitwise")]
#[test_case("maxmin", OpName::MaxMin ; "maxmin")]
#[test_case("func:sin", OpName::Func("sin".into()) ; "function")]
fn test_op_name_round_trip(text: &str, expected: OpName) {
    let name: OpName = text.parse().unwrap();
    assert_eq!(name, expected);
    assert_eq!(name.to_string(), text);
}

#[test_case("modulo" ; "unknown")]
#[test_case("func:" ; "empty function")]
fn test_unknown_op_name(text: &str) {
    assert_eq!(text.parse::<OpName>().unwrap_err(), Error::UnclassifiedOperation { name: text.into() });
}

#[test]
fn test_keys_compare_by_present_fields() {
    let built = Op::builder().granularity(CountGranularity::WorkItem).dtype(DType::Float32).name(OpName::Mul).build();
    let direct = Op::new(DType::Float32, OpName::Mul, CountGranularity::WorkItem);
    assert_eq!(built, direct);
    assert_eq!(HashSet::from([built.clone(), direct]).len(), 1);

    // a wildcard is not equal to a concrete value
    let wildcard = Op { granularity: None, ..built.clone() };
    assert_ne!(wildcard, built);
}

#[test]
fn test_project_keeps_listed_fields() {
    let key = MemAccess::builder()
        .mtype(MemoryType::Local)
        .dtype(DType::Float32)
        .direction(Direction::Load)
        .variable("tile".to_string())
        .granularity(CountGranularity::WorkItem)
        .build();
    let projected = key.project(&["variable", "count_granularity"]);
    assert_eq!(projected.variable.as_deref(), Some("tile"));
    assert_eq!(projected.granularity, Some(CountGranularity::WorkItem));
    assert_eq!(projected.mtype, None);
    assert_eq!(projected.dtype, None);
}

#[test]
fn test_field_lookup() {
    let op = Op::builder().name(OpName::Add).build();
    assert_eq!(op.field("name"), Some(Some(FieldValue::Name(OpName::Add))));
    assert_eq!(op.field("dtype"), Some(None));
    assert_eq!(op.field("variable"), None);
    assert_eq!(SyncKind::BarrierLocal.field("kind"), Some(Some(FieldValue::Sync(SyncKind::BarrierLocal))));
}

#[test]
fn test_text_field_values() {
    assert!(FieldValue::from("float32").matches(&FieldValue::from(DType::Float32)));
    assert!(FieldValue::from(OpName::Func("exp".into())).matches(&FieldValue::from("func:exp")));
    assert!(!FieldValue::from("load").matches(&FieldValue::from(Direction::Store)));
}

#[test]
fn test_display() {
    let op = Op::builder().dtype(DType::Float64).name(OpName::Pow).build();
    assert_eq!(op.to_string(), "Op(float64, pow, *)");
    assert_eq!(SyncKind::BarrierGlobal.to_string(), "barrier_global");
    assert_eq!(CountGranularity::SubGroup.to_string(), "subgroup");
}
