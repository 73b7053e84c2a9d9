//! Btrfs multi-device volume geometry

use crate::disk::size::Size;
use crate::utils::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtrfsLevel {
    Single,
    Dup,
    Raid0,
    Raid1,
    Raid10,
}

impl BtrfsLevel {
    pub fn min_members(self) -> usize {
        match self {
            Self::Single | Self::Dup => 1,
            Self::Raid0 | Self::Raid1 => 2,
            Self::Raid10 => 4,
        }
    }

    /// Bytes of data a volume at this level can hold on `members`.
    pub fn usable_size(self, members: &[Size]) -> Size {
        let total: Size = members.iter().sum();
        let smallest = members.iter().min().copied().unwrap_or(Size::ZERO);
        let largest = members.iter().max().copied().unwrap_or(Size::ZERO);
        match self {
            Self::Single => total,
            Self::Dup | Self::Raid10 => total / 2,
            Self::Raid0 => smallest * members.len() as u64,
            // every chunk needs a copy on a second device
            Self::Raid1 => (total / 2).min(total - largest),
        }
    }
}

impl fmt::Display for BtrfsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Single => "single",
            Self::Dup => "dup",
            Self::Raid0 => "raid0",
            Self::Raid1 => "raid1",
            Self::Raid10 => "raid10",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BtrfsLevel {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "dup" => Ok(Self::Dup),
            "raid0" | "0" => Ok(Self::Raid0),
            "raid1" | "1" => Ok(Self::Raid1),
            "raid10" | "10" => Ok(Self::Raid10),
            _ => Err(LayoutError::ConfigError(format!("unknown btrfs level '{}'", s))),
        }
    }
}

/// Default data level for a volume of `members` devices.
pub fn default_data_level(members: usize) -> BtrfsLevel {
    if members > 1 {
        BtrfsLevel::Raid0
    } else {
        BtrfsLevel::Single
    }
}

/// Default metadata level for a volume of `members` devices.
pub fn default_metadata_level(members: usize) -> BtrfsLevel {
    if members > 1 {
        BtrfsLevel::Raid1
    } else {
        BtrfsLevel::Dup
    }
}

/// Subvolume name for a mountpoint (`/` is `root`, `/home` is `home`).
pub fn subvolume_name_for(mountpoint: &str) -> String {
    match mountpoint.trim_matches('/') {
        "" => "root".to_string(),
        other => other.replace('/', "_"),
    }
}
