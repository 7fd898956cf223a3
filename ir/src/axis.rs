//! Hardware roles of loop axes.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a loop axis is executed.
///
/// Every axis has exactly one role; untagged axes are [`AxisRole::Sequential`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisRole {
    #[default]
    Sequential,
    Unrolled,
    Vectorized,
    /// Work-item lane within a group, along hardware dimension `.0`.
    Local(u8),
    /// Workgroup index along hardware dimension `.0`.
    Group(u8),
}

impl AxisRole {
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub const fn is_hardware_parallel(self) -> bool {
        matches!(self, Self::Local(_) | Self::Group(_))
    }

    /// Axes that become loops in the schedule.
    pub const fn is_loop(self) -> bool {
        matches!(self, Self::Sequential | Self::Unrolled)
    }

    pub const fn local_dim(self) -> Option<u8> {
        match self {
            Self::Local(dim) => Some(dim),
            _ => None,
        }
    }

    pub const fn group_dim(self) -> Option<u8> {
        match self {
            Self::Group(dim) => Some(dim),
            _ => None,
        }
    }
}

impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Unrolled => write!(f, "unrolled"),
            Self::Vectorized => write!(f, "vectorized"),
            Self::Local(dim) => write!(f, "local:{dim}"),
            Self::Group(dim) => write!(f, "group:{dim}"),
        }
    }
}

impl FromStr for AxisRole {
    type Err = Error;

    /// Accepts `sequential`, `unrolled`, `vectorized`, `local:<d>`, `group:<d>`
    /// and the short forms `seq`, `unr`, `vec`, `l.<d>`, `g.<d>`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidRole { text: text.to_string() };
        let trimmed = text.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => return Ok(Self::Sequential),
            "unrolled" | "unr" => return Ok(Self::Unrolled),
            "vectorized" | "vec" => return Ok(Self::Vectorized),
            _ => {}
        }
        let (kind, dim) = trimmed
            .split_once(':')
            .or_else(|| trimmed.split_once('.'))
            .ok_or_else(invalid)?;
        let dim: u8 = dim.trim().parse().map_err(|_| invalid())?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "local" | "l" => Ok(Self::Local(dim)),
            "group" | "g" => Ok(Self::Group(dim)),
            _ => Err(invalid()),
        }
    }
}
