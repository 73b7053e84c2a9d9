//! MD RAID geometry

use crate::disk::size::{Size, MIB};
use crate::utils::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaidLevel {
    Linear,
    Raid0,
    Raid1,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
}

impl RaidLevel {
    pub fn min_members(self) -> usize {
        match self {
            Self::Linear => 1,
            Self::Raid0 | Self::Raid1 => 2,
            Self::Raid4 | Self::Raid5 => 3,
            Self::Raid6 | Self::Raid10 => 4,
        }
    }

    /// Usable array size from `members` members of `member` bytes each.
    pub fn array_size(self, member: Size, members: usize) -> Size {
        let n = members as u64;
        match self {
            Self::Linear | Self::Raid0 => member * n,
            Self::Raid1 => member,
            Self::Raid4 | Self::Raid5 => member * n.saturating_sub(1),
            Self::Raid6 => member * n.saturating_sub(2),
            Self::Raid10 => member.mul_ratio(n, 2),
        }
    }

    /// Member size needed for an array of `array` bytes, rounded up.
    pub fn member_size(self, array: Size, members: usize) -> Size {
        let n = (members as u64).max(1);
        let per = |parts: u64| Size::from_bytes(array.bytes().div_ceil(parts.max(1)));
        match self {
            Self::Linear | Self::Raid0 => per(n),
            Self::Raid1 => array,
            Self::Raid4 | Self::Raid5 => per(n - 1),
            Self::Raid6 => per(n.saturating_sub(2)),
            Self::Raid10 => Size::from_bytes((array.bytes() * 2).div_ceil(n)),
        }
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Linear => "linear",
            Self::Raid0 => "raid0",
            Self::Raid1 => "raid1",
            Self::Raid4 => "raid4",
            Self::Raid5 => "raid5",
            Self::Raid6 => "raid6",
            Self::Raid10 => "raid10",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RaidLevel {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.trim_start_matches("raid") {
            "linear" => Ok(Self::Linear),
            "0" | "stripe" => Ok(Self::Raid0),
            "1" | "mirror" => Ok(Self::Raid1),
            "4" => Ok(Self::Raid4),
            "5" => Ok(Self::Raid5),
            "6" => Ok(Self::Raid6),
            "10" => Ok(Self::Raid10),
            _ => Err(LayoutError::ConfigError(format!("unknown RAID level '{}'", s))),
        }
    }
}

/// Space mdadm keeps for the superblock and bitmap on each member.
///
/// Starts at 128 MiB and halves for small members, never below 1 MiB.
pub fn superblock_headroom(member: Size) -> Size {
    let mut headroom = 128 * MIB;
    while headroom * 1024 > member.bytes() && headroom > MIB {
        headroom /= 2;
    }
    Size::from_bytes(headroom)
}

/// Data capacity of one member after the superblock.
pub fn member_data_size(member: Size) -> Size {
    member.saturating_sub(superblock_headroom(member))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_sizes_by_level() {
        let m = Size::gib(10);
        assert_eq!(RaidLevel::Raid0.array_size(m, 2), Size::gib(20));
        assert_eq!(RaidLevel::Raid1.array_size(m, 2), Size::gib(10));
        assert_eq!(RaidLevel::Raid5.array_size(m, 3), Size::gib(20));
        assert_eq!(RaidLevel::Raid6.array_size(m, 4), Size::gib(20));
        assert_eq!(RaidLevel::Raid10.array_size(m, 4), Size::gib(20));
    }

    #[test]
    fn member_size_inverts_array_size() {
        for (level, n) in [
            (RaidLevel::Raid0, 2),
            (RaidLevel::Raid1, 2),
            (RaidLevel::Raid5, 3),
            (RaidLevel::Raid6, 5),
            (RaidLevel::Raid10, 4),
        ] {
            let member = level.member_size(Size::gib(30), n);
            assert!(level.array_size(member, n) >= Size::gib(30), "{}", level);
        }
    }

    #[test]
    fn levels_parse_loosely() {
        assert_eq!("raid1".parse::<RaidLevel>().unwrap(), RaidLevel::Raid1);
        assert_eq!("1".parse::<RaidLevel>().unwrap(), RaidLevel::Raid1);
        assert_eq!("RAID10".parse::<RaidLevel>().unwrap(), RaidLevel::Raid10);
        assert!("raid7".parse::<RaidLevel>().is_err());
        assert_eq!(RaidLevel::Raid6.min_members(), 4);
    }

    #[test]
    fn headroom_shrinks_for_small_members() {
        assert_eq!(superblock_headroom(Size::tib(1)), Size::mib(128));
        assert_eq!(superblock_headroom(Size::gib(64)), Size::mib(64));
        assert_eq!(superblock_headroom(Size::mib(100)), Size::mib(1));
        assert_eq!(member_data_size(Size::gib(128)), Size::gib(128) - Size::mib(128));
    }
}
