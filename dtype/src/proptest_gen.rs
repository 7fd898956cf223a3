use crate::*;
use proptest::prelude::*;
use proptest::sample::select;
use strum::VariantArray;

impl DType {
    fn generator_where(keep: fn(&DType) -> bool) -> impl Strategy<Value = Self> {
        select(DType::VARIANTS.iter().copied().filter(keep).collect::<Vec<_>>())
    }

    pub fn int_generator() -> impl Strategy<Value = Self> {
        Self::generator_where(DType::is_int)
    }

    pub fn float_generator() -> impl Strategy<Value = Self> {
        Self::generator_where(DType::is_float)
    }

    pub fn scalar_generator() -> impl Strategy<Value = Self> {
        select(DType::VARIANTS)
    }

    /// Operand types of a binary arithmetic operation, never boolean.
    pub fn arithmetic_pair_generator() -> impl Strategy<Value = (Self, Self)> {
        let numeric = || Self::generator_where(|d| !d.is_bool());
        (numeric(), numeric())
    }
}
