//! Counting policy.
//!
//! Typed configuration with a bon builder and environment fallbacks. A policy
//! is resolved once per counting request and never changes mid-computation.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use bon::bon;
use tally_poly::CardinalityMode;

use crate::key::CountGranularity;

/// Subgroup size assumed when none is configured.
pub const DEFAULT_SUBGROUP_SIZE: u32 = 32;

// ============================================================================
// SUBGROUP SIZE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubgroupSize {
    Fixed(NonZeroU32),
    /// Use [`DEFAULT_SUBGROUP_SIZE`] and warn about it.
    #[default]
    Infer,
}

impl SubgroupSize {
    pub fn fixed(size: u32) -> Option<Self> {
        NonZeroU32::new(size).map(Self::Fixed)
    }

    pub fn resolve(self) -> u32 {
        match self {
            Self::Fixed(size) => size.get(),
            Self::Infer => {
                tracing::warn!(
                    subgroup_size = DEFAULT_SUBGROUP_SIZE,
                    "subgroup size not given, guessing; pass a fixed size for accurate subgroup counts"
                );
                DEFAULT_SUBGROUP_SIZE
            }
        }
    }
}

impl FromStr for SubgroupSize {
    type Err = std::num::ParseIntError;

    /// A positive integer, or `guess` / `infer`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim() {
            "guess" | "infer" => Ok(Self::Infer),
            size => size.parse().map(Self::Fixed),
        }
    }
}

impl fmt::Display for SubgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "{size}"),
            Self::Infer => write!(f, "infer"),
        }
    }
}

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CountingPolicy {
    /// Count every hardware-parallel replica instead of unique work.
    pub count_redundant_work: bool,
    pub subgroup_size: SubgroupSize,
    pub cardinality: CardinalityMode,
    /// Granularity of arithmetic operations.
    pub op_granularity: CountGranularity,
    /// Granularity of unit-stride global accesses. `SubGroup` bills them as
    /// coalesced transactions.
    pub coalesced_granularity: CountGranularity,
    /// Count arithmetic inside array index expressions.
    pub count_within_subscripts: bool,
}

impl Default for CountingPolicy {
    fn default() -> Self {
        Self {
            count_redundant_work: false,
            subgroup_size: SubgroupSize::Infer,
            cardinality: CardinalityMode::Auto,
            op_granularity: CountGranularity::WorkItem,
            coalesced_granularity: CountGranularity::WorkItem,
            count_within_subscripts: true,
        }
    }
}

#[bon]
impl CountingPolicy {
    #[builder]
    pub fn builder(
        #[builder(default = false)] count_redundant_work: bool,
        #[builder(default)] subgroup_size: SubgroupSize,
        #[builder(default)] cardinality: CardinalityMode,
        #[builder(default = CountGranularity::WorkItem)] op_granularity: CountGranularity,
        #[builder(default = CountGranularity::WorkItem)] coalesced_granularity: CountGranularity,
        #[builder(default = true)] count_within_subscripts: bool,
    ) -> Self {
        Self {
            count_redundant_work,
            subgroup_size,
            cardinality,
            op_granularity,
            coalesced_granularity,
            count_within_subscripts,
        }
    }

    /// Create a policy from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TALLY_REDUNDANT_WORK=1` - Count redundant work
    /// * `TALLY_SUBGROUP_SIZE=N` - Fixed subgroup size (default: infer)
    /// * `TALLY_CARDINALITY=exact|bbox|auto` - Counting mode (default: auto)
    /// * `TALLY_COUNT_SUBSCRIPTS=0` - Skip arithmetic inside subscripts
    pub fn from_env() -> Self {
        let flag = |name: &str| std::env::var(name).ok().map(|s| !matches!(s.trim(), "" | "0" | "false"));
        let defaults = Self::default();
        Self {
            count_redundant_work: flag("TALLY_REDUNDANT_WORK").unwrap_or(defaults.count_redundant_work),
            subgroup_size: std::env::var("TALLY_SUBGROUP_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.subgroup_size),
            cardinality: std::env::var("TALLY_CARDINALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cardinality),
            count_within_subscripts: flag("TALLY_COUNT_SUBSCRIPTS").unwrap_or(defaults.count_within_subscripts),
            ..defaults
        }
    }
}
