//! Count maps and their query algebra.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::ops::{Add, Index};

use snafu::OptionExt;
use tally_poly::error::OverflowSnafu;
use tally_poly::{ParamSource, PwQPoly};

use crate::error::*;
use crate::key::{CountKey, FieldValue, MemAccess};

static ZERO: PwQPoly = PwQPoly::zero();

// ============================================================================
// FILTER
// ============================================================================

/// Field constraints for [`CountMap::filter_by`].
///
/// ```
/// use tally_stats::{CountGranularity, Filter};
/// use tally_dtype::DType;
///
/// let filter = Filter::new()
///     .field("dtype", DType::Float32)
///     .one_of("name", ["add", "mul"])
///     .field("granularity", CountGranularity::WorkItem);
/// # let _ = filter;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    constraints: Vec<(String, Vec<FieldValue>)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The field must equal `value`.
    pub fn field(self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.one_of(name, [value])
    }

    /// The field must equal one of `values`.
    pub fn one_of<V: Into<FieldValue>>(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.constraints.push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Unknown field names match nothing. Wildcard key fields match anything.
    pub fn matches<K: CountKey>(&self, key: &K) -> bool {
        self.constraints.iter().all(|(name, allowed)| match key.field(name) {
            None => false,
            Some(None) => true,
            Some(Some(value)) => allowed.iter().any(|a| a.matches(&value)),
        })
    }
}

// ============================================================================
// COUNT MAP
// ============================================================================

/// Classification key → symbolic count.
///
/// Querying operations never mutate the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMap<K: CountKey> {
    counts: BTreeMap<K, PwQPoly>,
}

impl<K: CountKey> Default for CountMap<K> {
    fn default() -> Self {
        Self { counts: BTreeMap::new() }
    }
}

impl<K: CountKey> CountMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to the entry for `key`. Zero counts leave no entry.
    pub fn accumulate(&mut self, key: K, count: &PwQPoly) {
        if count.is_zero() {
            return;
        }
        let total = self.get(&key) + count;
        if total.is_zero() {
            self.counts.remove(&key);
        } else {
            self.counts.insert(key, total);
        }
    }

    /// Merges every entry of `other` into `self`.
    pub fn extend_from(&mut self, other: &CountMap<K>) {
        for (key, count) in &other.counts {
            self.accumulate(key.clone(), count);
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count for exactly `key`, or zero.
    pub fn get(&self, key: &K) -> &PwQPoly {
        self.counts.get(key).unwrap_or(&ZERO)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.counts.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.counts.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, PwQPoly> {
        self.counts.iter()
    }

    pub fn filter_by(&self, filter: &Filter) -> Self {
        self.filter_by_func(|key| filter.matches(key))
    }

    pub fn filter_by_func(&self, predicate: impl Fn(&K) -> bool) -> Self {
        self.counts.iter().filter(|(key, _)| predicate(key)).map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Keeps only the listed fields and sums entries that agree on them.
    ///
    /// Names that are not fields of `K` are ignored.
    pub fn group_by(&self, fields: &[&str]) -> Self {
        self.counts.iter().map(|(key, count)| (key.project(fields), count.clone())).collect()
    }

    /// Total over all entries.
    pub fn sum(&self) -> PwQPoly {
        self.counts.values().fold(PwQPoly::zero(), |acc, v| acc + v.clone())
    }

    /// Evaluates every entry at `params` and adds the results.
    pub fn eval_and_sum(&self, params: &impl ParamSource) -> Result<i64> {
        self.counts.values().try_fold(0i64, |acc, count| -> Result<i64> {
            Ok(acc.checked_add(count.eval(params)?).context(OverflowSnafu { during: "summing counts" })?)
        })
    }

    /// Evaluates every entry at `params`.
    pub fn eval(&self, params: &impl ParamSource) -> Result<BTreeMap<K, i64>> {
        self.counts.iter().map(|(key, count)| Ok((key.clone(), count.eval(params)?))).collect::<Result<_>>()
    }
}

impl CountMap<MemAccess> {
    /// Byte counts: each count times the width of its dtype, with the dtype
    /// collapsed out of the key.
    pub fn to_bytes(&self) -> Result<Self> {
        let mut out = Self::new();
        for (key, count) in &self.counts {
            let dtype = key
                .dtype
                .context(UnresolvedTypeSnafu { variable: key.variable.clone().unwrap_or_default() })?;
            let key = MemAccess { dtype: None, ..key.clone() };
            out.accumulate(key, &count.scale(dtype.bytes() as i64));
        }
        Ok(out)
    }
}

impl<K: CountKey> Index<&K> for CountMap<K> {
    type Output = PwQPoly;

    fn index(&self, key: &K) -> &PwQPoly {
        self.get(key)
    }
}

impl<K: CountKey> Add for CountMap<K> {
    type Output = CountMap<K>;

    fn add(mut self, rhs: CountMap<K>) -> CountMap<K> {
        self.extend_from(&rhs);
        self
    }
}

impl<K: CountKey> FromIterator<(K, PwQPoly)> for CountMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, PwQPoly)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (key, count) in iter {
            out.accumulate(key, &count);
        }
        out
    }
}

impl<K: CountKey> IntoIterator for CountMap<K> {
    type Item = (K, PwQPoly);
    type IntoIter = btree_map::IntoIter<K, PwQPoly>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

impl<'a, K: CountKey> IntoIterator for &'a CountMap<K> {
    type Item = (&'a K, &'a PwQPoly);
    type IntoIter = btree_map::Iter<'a, K, PwQPoly>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.iter()
    }
}

impl<K: CountKey> fmt::Display for CountMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, count) in &self.counts {
            writeln!(f, "{key}: {count}")?;
        }
        Ok(())
    }
}
