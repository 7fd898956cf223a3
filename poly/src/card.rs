//! Counting integer points of sets.
//!
//! [`ExactCounter`] returns the true lattice-point count as a piecewise
//! quasi-polynomial or fails with `Unsupported`. [`BoundingBoxCounter`] returns
//! the volume of the box spanned by each dimension's rational shadow, which is
//! never below the exact count. [`FallbackCounter`] tries the former and settles
//! for the latter. Callers pick one through [`CardinalityMode`].

use std::fmt;

use itertools::Itertools;
use once_cell::sync::Lazy;
use snafu::ensure;
use tracing::{debug, warn};

use crate::count::{Guard, PwQPoly};
use crate::error::{Error, Result, UnsupportedSnafu};
use crate::qpoly::QPoly;
use crate::set::{BasicSet, Set};
use crate::summation::sum_out;

/// Unions larger than this are not counted by inclusion-exclusion.
pub const MAX_INCLUSION_EXCLUSION: usize = 6;

/// Upper bound on the pieces of a disjoint decomposition.
const MAX_DISJOINT_PIECES: usize = 4096;

pub trait Cardinality: Send + Sync + fmt::Debug {
    /// Number of integer points of `set` as a function of its parameters.
    fn card(&self, set: &BasicSet) -> Result<PwQPoly>;

    /// Number of integer points in the union.
    ///
    /// The union is split into disjoint pieces when the parts allow it, and
    /// counted by inclusion-exclusion otherwise.
    fn card_union(&self, sets: &[BasicSet]) -> Result<PwQPoly> {
        let sets: Vec<&BasicSet> = sets.iter().filter(|s| !s.is_obviously_empty()).collect();
        match sets.as_slice() {
            [] => return Ok(PwQPoly::zero()),
            [single] => return self.card(single),
            _ => {}
        }
        match disjoint_pieces(&sets) {
            Ok(pieces) => {
                debug!(parts = sets.len(), pieces = pieces.len(), "counting union as disjoint pieces");
                pieces.iter().try_fold(PwQPoly::zero(), |acc, piece| Ok(acc + self.card(piece)?))
            }
            Err(Error::Unsupported { reason }) if sets.len() <= MAX_INCLUSION_EXCLUSION => {
                debug!(%reason, parts = sets.len(), "counting union by inclusion-exclusion");
                inclusion_exclusion(self, &sets)
            }
            Err(err) => Err(err),
        }
    }

    fn card_set(&self, set: &Set) -> Result<PwQPoly> {
        self.card_union(set.parts())
    }
}

fn inclusion_exclusion<C: Cardinality + ?Sized>(counter: &C, sets: &[&BasicSet]) -> Result<PwQPoly> {
    let mut total = PwQPoly::zero();
    for size in 1..=sets.len() {
        let sign = if size % 2 == 1 { 1 } else { -1 };
        for subset in sets.iter().combinations(size) {
            let Some((first, rest)) = subset.split_first() else {
                continue;
            };
            let meet = rest.iter().fold((**first).clone(), |acc, s| acc.intersect(s));
            if meet.is_rationally_empty() {
                continue;
            }
            total += &counter.card(&meet)?.scale(sign);
        }
    }
    Ok(total)
}

/// Splits a union into pairwise disjoint sets: each part minus every part
/// before it.
///
/// Every part but the last must be expressible without existentials, so at
/// most one part may keep them; that part is moved to the end.
fn disjoint_pieces(sets: &[&BasicSet]) -> Result<Vec<BasicSet>> {
    let mut plain = Vec::with_capacity(sets.len());
    let mut last = None;
    for set in sets {
        match set.without_existentials() {
            Ok(free) => plain.push(free),
            Err(Error::Unsupported { .. }) if last.is_none() => last = Some((*set).clone()),
            Err(err) => return Err(err),
        }
    }

    let mut pieces = Vec::new();
    for (idx, set) in plain.iter().chain(&last).enumerate() {
        let mut remaining = vec![set.clone()];
        for earlier in &plain[..idx.min(plain.len())] {
            remaining = remaining.iter().map(|r| r.subtract(earlier)).flatten_ok().collect::<Result<_>>()?;
            ensure!(
                remaining.len() + pieces.len() <= MAX_DISJOINT_PIECES,
                UnsupportedSnafu { reason: "disjoint decomposition too large" }
            );
            if remaining.is_empty() {
                break;
            }
        }
        pieces.extend(remaining);
    }
    Ok(pieces)
}

fn guards_of(set: &BasicSet) -> Vec<Guard> {
    set.constraints().iter().map(Guard::from).collect()
}

/// Exact lattice-point counting. Sets it cannot count fail with `Unsupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactCounter;

impl Cardinality for ExactCounter {
    fn card(&self, set: &BasicSet) -> Result<PwQPoly> {
        if set.is_obviously_empty() {
            return Ok(PwQPoly::zero());
        }
        let set = set.eliminate_existentials_exact()?;
        sum_out(set.dims(), guards_of(&set), QPoly::one())
    }
}

/// Product of per-dimension extents from rational shadows.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxCounter;

impl Cardinality for BoundingBoxCounter {
    fn card(&self, set: &BasicSet) -> Result<PwQPoly> {
        if set.is_obviously_empty() {
            return Ok(PwQPoly::zero());
        }
        let relaxed = set.remove_divisive_terms();
        let mut guards: Vec<Guard> = relaxed
            .constraints()
            .iter()
            .filter(|c| !set.dims().iter().any(|d| c.mentions(d)))
            .map(Guard::from)
            .collect();
        for dim in set.dims() {
            guards.extend(set.shadow_on(dim).iter().map(Guard::from));
        }
        sum_out(set.dims(), guards, QPoly::one())
    }

    /// Boxes of disjoint pieces of the relaxed parts, so overlapping parts are
    /// billed once.
    fn card_union(&self, sets: &[BasicSet]) -> Result<PwQPoly> {
        let relaxed: Vec<BasicSet> =
            sets.iter().filter(|s| !s.is_obviously_empty()).map(BasicSet::remove_divisive_terms).collect();
        let parts: Vec<&BasicSet> = relaxed.iter().collect();
        match disjoint_pieces(&parts) {
            Ok(pieces) => pieces.iter().try_fold(PwQPoly::zero(), |acc, piece| Ok(acc + self.card(piece)?)),
            Err(Error::Unsupported { reason }) => {
                warn!(%reason, parts = parts.len(), "summing boxes of overlapping parts");
                parts.iter().try_fold(PwQPoly::zero(), |acc, part| Ok(acc + self.card(part)?))
            }
            Err(err) => Err(err),
        }
    }
}

/// Exact counting that degrades to [`BoundingBoxCounter`], with a warning,
/// where exact counting is `Unsupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackCounter;

impl Cardinality for FallbackCounter {
    fn card(&self, set: &BasicSet) -> Result<PwQPoly> {
        match ExactCounter.card(set) {
            Err(Error::Unsupported { reason }) => {
                warn!(%reason, %set, "exact counting unavailable, using bounding box");
                BoundingBoxCounter.card(set)
            }
            other => other,
        }
    }

    fn card_union(&self, sets: &[BasicSet]) -> Result<PwQPoly> {
        match ExactCounter.card_union(sets) {
            Err(Error::Unsupported { reason }) => {
                warn!(%reason, parts = sets.len(), "exact union count unavailable, using bounding boxes");
                BoundingBoxCounter.card_union(sets)
            }
            other => other,
        }
    }
}

// ============================================================================
// MODE SELECTION
// ============================================================================

static EXACT_AVAILABLE: Lazy<bool> = Lazy::new(|| {
    let available = cfg!(feature = "exact-count");
    debug!(available, "exact counting capability");
    available
});

/// Whether [`CardinalityMode::Auto`] resolves to exact counting.
pub fn exact_counting_available() -> bool {
    *EXACT_AVAILABLE
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CardinalityMode {
    /// Exact when available, falling back to bounding boxes per set.
    #[default]
    Auto,
    Exact,
    #[strum(to_string = "bbox", serialize = "boundingbox")]
    BoundingBox,
}

static EXACT: ExactCounter = ExactCounter;
static FALLBACK: FallbackCounter = FallbackCounter;
static BOUNDING_BOX: BoundingBoxCounter = BoundingBoxCounter;

impl CardinalityMode {
    /// Replaces `Auto` by the concrete mode.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if exact_counting_available() => Self::Exact,
            Self::Auto => Self::BoundingBox,
            mode => mode,
        }
    }

    /// `Exact` never falls back; `Auto` does when exact counting is available.
    pub fn counter(self) -> &'static dyn Cardinality {
        match self {
            Self::Exact => &EXACT,
            Self::Auto if exact_counting_available() => &FALLBACK,
            Self::Auto | Self::BoundingBox => &BOUNDING_BOX,
        }
    }
}
