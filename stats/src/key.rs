//! Classification keys: what a count counts.
//!
//! Every field is optional. A present field is concrete data; an absent field
//! is a wildcard, produced by [`CountKey::project`] (and therefore by
//! `group_by`) or left out when building a lookup key by hand. Storage equality
//! is plain structural equality; query matching in [`crate::Filter`] treats
//! absent fields as "any".

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use itertools::Itertools;
use strum::IntoEnumIterator;
use tally_dtype::DType;
use tally_poly::QPoly;

use crate::error::*;

// ============================================================================
// FIELD ENUMS
// ============================================================================

/// Level at which one counted unit is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CountGranularity {
    WorkItem,
    SubGroup,
    WorkGroup,
}

impl FromStr for CountGranularity {
    type Err = Error;

    /// Accepts `workitem`, `subgroup` and `workgroup` in any case; anything else
    /// is [`Error::InvalidGranularity`].
    fn from_str(text: &str) -> Result<Self> {
        let normalized = text.trim().replace(['-', '_'], "");
        Self::iter()
            .find(|g| <&'static str>::from(*g).eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| Error::InvalidGranularity { value: text.to_string() })
    }
}

fn parse_granularity(text: Option<&str>) -> Result<Option<CountGranularity>> {
    text.map(str::parse).transpose()
}

/// Operation vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpName {
    Add,
    Sub,
    Mul,
    /// True division, floor division and remainder.
    Div,
    Pow,
    Shift,
    /// `&`, `|`, `^` and `~`.
    Bitwise,
    MaxMin,
    /// Builtin function call, e.g. `func:sin`.
    Func(String),
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Sub => write!(f, "sub"),
            Self::Mul => write!(f, "mul"),
            Self::Div => write!(f, "div"),
            Self::Pow => write!(f, "pow"),
            Self::Shift => write!(f, "shift"),
            Self::Bitwise => write!(f, "bw"),
            Self::MaxMin => write!(f, "maxmin"),
            Self::Func(name) => write!(f, "func:{name}"),
        }
    }
}

impl FromStr for OpName {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Ok(match text {
            "add" => Self::Add,
            "sub" => Self::Sub,
            "mul" => Self::Mul,
            "div" => Self::Div,
            "pow" => Self::Pow,
            "shift" => Self::Shift,
            "bw" => Self::Bitwise,
            "maxmin" => Self::MaxMin,
            _ => match text.strip_prefix("func:") {
                Some(name) if !name.is_empty() => Self::Func(name.to_string()),
                _ => return UnclassifiedOperationSnafu { name: text }.fail(),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryType {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Load,
    Store,
}

/// Synchronization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncKind {
    KernelLaunch,
    BarrierLocal,
    BarrierGlobal,
}

/// Hardware dimension → element stride. Dimensions the access does not vary
/// along are absent.
pub type StrideMap = BTreeMap<u8, QPoly>;

fn fmt_strides(strides: &StrideMap) -> String {
    format!("{{{}}}", strides.iter().map(|(dim, stride)| format!("{dim}: {stride}")).join(", "))
}

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Value of one key field, as seen by filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    DType(DType),
    Name(OpName),
    Granularity(CountGranularity),
    MemoryType(MemoryType),
    Direction(Direction),
    Strides(StrideMap),
    Sync(SyncKind),
    /// Compared against the display form of the other side, so `"add"`,
    /// `"float32"` or a variable name can be used for any field.
    Text(String),
}

impl FieldValue {
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Text(text), value) | (value, Self::Text(text)) => value.to_string() == *text,
            (lhs, rhs) => lhs == rhs,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DType(dtype) => write!(f, "{dtype}"),
            Self::Name(name) => write!(f, "{name}"),
            Self::Granularity(granularity) => write!(f, "{granularity}"),
            Self::MemoryType(mtype) => write!(f, "{mtype}"),
            Self::Direction(direction) => write!(f, "{direction}"),
            Self::Strides(strides) => write!(f, "{}", fmt_strides(strides)),
            Self::Sync(kind) => write!(f, "{kind}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

field_value_from! {
    DType => DType,
    OpName => Name,
    CountGranularity => Granularity,
    MemoryType => MemoryType,
    Direction => Direction,
    StrideMap => Strides,
    SyncKind => Sync,
    String => Text,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// ============================================================================
// KEYS
// ============================================================================

/// A classification key of a [`crate::CountMap`].
pub trait CountKey: Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync {
    /// Names accepted by `filter_by` and `group_by`.
    const FIELDS: &'static [&'static str];

    /// `None` if the key type has no such field, `Some(None)` for a wildcard.
    fn field(&self, name: &str) -> Option<Option<FieldValue>>;

    /// Keeps the listed fields and turns every other field into a wildcard.
    fn project(&self, fields: &[&str]) -> Self;
}

fn keep<T: Clone>(value: &Option<T>, name: &str, fields: &[&str]) -> Option<T> {
    if fields.contains(&name) { value.clone() } else { None }
}

fn fmt_field<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "*".to_string(), ToString::to_string)
}

/// An arithmetic operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, bon::Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Op {
    pub dtype: Option<DType>,
    pub name: Option<OpName>,
    pub granularity: Option<CountGranularity>,
}

impl Op {
    pub fn new(dtype: DType, name: OpName, granularity: CountGranularity) -> Self {
        Self { dtype: Some(dtype), name: Some(name), granularity: Some(granularity) }
    }

    /// Builds a key from text, rejecting unknown operation names and
    /// granularities.
    pub fn try_new(dtype: Option<DType>, name: Option<&str>, granularity: Option<&str>) -> Result<Self> {
        let name = name.map(str::parse).transpose()?;
        Ok(Self { dtype, name, granularity: parse_granularity(granularity)? })
    }
}

impl CountKey for Op {
    const FIELDS: &'static [&'static str] = &["dtype", "name", "granularity"];

    fn field(&self, name: &str) -> Option<Option<FieldValue>> {
        match name {
            "dtype" => Some(self.dtype.map(FieldValue::from)),
            "name" => Some(self.name.clone().map(FieldValue::from)),
            "granularity" | "count_granularity" => Some(self.granularity.map(FieldValue::from)),
            _ => None,
        }
    }

    fn project(&self, fields: &[&str]) -> Self {
        Self {
            dtype: keep(&self.dtype, "dtype", fields),
            name: keep(&self.name, "name", fields),
            granularity: keep(&self.granularity, "granularity", fields)
                .or_else(|| keep(&self.granularity, "count_granularity", fields)),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({}, {}, {})", fmt_field(&self.dtype), fmt_field(&self.name), fmt_field(&self.granularity))
    }
}

/// A memory transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, bon::Builder)]
#[builder(on(String, into))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemAccess {
    pub mtype: Option<MemoryType>,
    pub dtype: Option<DType>,
    pub direction: Option<Direction>,
    pub variable: Option<String>,
    pub lid_strides: Option<StrideMap>,
    pub gid_strides: Option<StrideMap>,
    pub granularity: Option<CountGranularity>,
}

impl MemAccess {
    /// [`MemAccess::builder`] with a textual granularity.
    pub fn try_new(
        mtype: Option<MemoryType>,
        dtype: Option<DType>,
        direction: Option<Direction>,
        variable: Option<&str>,
        granularity: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            mtype,
            dtype,
            direction,
            variable: variable.map(str::to_string),
            lid_strides: None,
            gid_strides: None,
            granularity: parse_granularity(granularity)?,
        })
    }
}

impl CountKey for MemAccess {
    const FIELDS: &'static [&'static str] =
        &["mtype", "dtype", "direction", "variable", "lid_strides", "gid_strides", "granularity"];

    fn field(&self, name: &str) -> Option<Option<FieldValue>> {
        match name {
            "mtype" => Some(self.mtype.map(FieldValue::from)),
            "dtype" => Some(self.dtype.map(FieldValue::from)),
            "direction" => Some(self.direction.map(FieldValue::from)),
            "variable" => Some(self.variable.clone().map(FieldValue::from)),
            "lid_strides" => Some(self.lid_strides.clone().map(FieldValue::from)),
            "gid_strides" => Some(self.gid_strides.clone().map(FieldValue::from)),
            "granularity" | "count_granularity" => Some(self.granularity.map(FieldValue::from)),
            _ => None,
        }
    }

    fn project(&self, fields: &[&str]) -> Self {
        Self {
            mtype: keep(&self.mtype, "mtype", fields),
            dtype: keep(&self.dtype, "dtype", fields),
            direction: keep(&self.direction, "direction", fields),
            variable: keep(&self.variable, "variable", fields),
            lid_strides: keep(&self.lid_strides, "lid_strides", fields),
            gid_strides: keep(&self.gid_strides, "gid_strides", fields),
            granularity: keep(&self.granularity, "granularity", fields)
                .or_else(|| keep(&self.granularity, "count_granularity", fields)),
        }
    }
}

impl fmt::Display for MemAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strides = |s: &Option<StrideMap>| s.as_ref().map_or_else(|| "*".to_string(), fmt_strides);
        write!(
            f,
            "MemAccess({}, {}, {}, {}, lid={}, gid={}, {})",
            fmt_field(&self.mtype),
            fmt_field(&self.dtype),
            fmt_field(&self.direction),
            fmt_field(&self.variable),
            strides(&self.lid_strides),
            strides(&self.gid_strides),
            fmt_field(&self.granularity),
        )
    }
}

impl CountKey for SyncKind {
    const FIELDS: &'static [&'static str] = &["kind"];

    fn field(&self, name: &str) -> Option<Option<FieldValue>> {
        (name == "kind").then(|| Some(FieldValue::from(*self)))
    }

    fn project(&self, _fields: &[&str]) -> Self {
        *self
    }
}
