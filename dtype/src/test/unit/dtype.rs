use std::str::FromStr;

use test_case::test_case;

use crate::DType;

#[test_case(DType::Bool, 1)]
#[test_case(DType::Int8, 1)]
#[test_case(DType::UInt16, 2)]
#[test_case(DType::Float16, 2)]
#[test_case(DType::Int32, 4)]
#[test_case(DType::Float32, 4)]
#[test_case(DType::Int64, 8)]
#[test_case(DType::Float64, 8)]
fn test_bytes(dtype: DType, bytes: usize) {
    assert_eq!(dtype.bytes(), bytes);
}

#[test_case(&[DType::Int32, DType::Float32], DType::Float32 ; "int and float")]
#[test_case(&[DType::Float32, DType::Float64], DType::Float64 ; "float widening")]
#[test_case(&[DType::Int32, DType::Int64], DType::Int64 ; "int widening")]
#[test_case(&[DType::UInt8, DType::Int8], DType::Int16 ; "mixed sign")]
#[test_case(&[DType::Bool, DType::Int32], DType::Int32 ; "bool promotes")]
fn test_least_upper_dtype(dtypes: &[DType], expected: DType) {
    assert_eq!(DType::least_upper_dtype(dtypes), Some(expected));
}

#[test]
fn test_least_upper_dtype_empty() {
    assert_eq!(DType::least_upper_dtype(&[]), None);
}

#[test_case(DType::Int32, DType::Float64)]
#[test_case(DType::Bool, DType::Float64)]
#[test_case(DType::Float32, DType::Float32)]
fn test_true_division_result(dtype: DType, expected: DType) {
    assert_eq!(dtype.true_division_result(), expected);
}

#[test]
fn test_names_round_trip() {
    assert_eq!(DType::Float32.to_string(), "float32");
    assert_eq!(DType::from_str("int64").unwrap(), DType::Int64);
    assert_eq!(DType::UInt8.short_name(), "u8");
    assert!(DType::from_str("float128").is_err());
}
