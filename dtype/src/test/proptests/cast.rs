use proptest::prelude::*;

use crate::DType;

proptest! {
    #[test]
    fn least_upper_dtype_is_upper_bound(lhs in DType::scalar_generator(), rhs in DType::scalar_generator()) {
        let lub = DType::least_upper_dtype(&[lhs, rhs]);
        prop_assert!(lub.is_some());
        let lub = lub.unwrap();
        prop_assert!(lub >= lhs.min(rhs));
        prop_assert_eq!(DType::least_upper_dtype(&[lub, lhs]), Some(lub));
        prop_assert_eq!(DType::least_upper_dtype(&[lub, rhs]), Some(lub));
    }

    #[test]
    fn least_upper_dtype_is_symmetric(lhs in DType::scalar_generator(), rhs in DType::scalar_generator()) {
        prop_assert_eq!(DType::least_upper_dtype(&[lhs, rhs]), DType::least_upper_dtype(&[rhs, lhs]));
    }

    #[test]
    fn true_division_never_yields_int(dtype in DType::scalar_generator()) {
        prop_assert!(dtype.true_division_result().is_float());
    }

    #[test]
    fn arithmetic_promotion_stays_numeric((lhs, rhs) in DType::arithmetic_pair_generator()) {
        let lub = DType::least_upper_dtype(&[lhs, rhs]).unwrap();
        prop_assert!(!lub.is_bool());
        if lhs.is_float() || rhs.is_float() {
            prop_assert!(lub.is_float());
        }
    }

    #[test]
    fn int_and_float_generators_are_disjoint(int in DType::int_generator(), float in DType::float_generator()) {
        prop_assert!(int.is_int() && !int.is_float());
        prop_assert!(float.is_float() && !float.is_int());
    }
}
