//! Install classes
//!
//! Product-level defaults layered on top of the platform: which scheme and
//! filesystem autopart uses, what the volume group is called, and the limits
//! applied to the default requests.

use crate::disk::size::Size;
use crate::layout::requests::Scheme;
use crate::layout::swap::DEFAULT_SWAP_CAP;
use crate::utils::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallClass {
    #[default]
    Default,
    Server,
    Workstation,
    /// Older products that capped swap at 4 GiB.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallClassProfile {
    pub class: InstallClass,
    pub default_scheme: Scheme,
    pub default_fs: &'static str,
    pub vg_name: &'static str,
    pub root_base: Size,
    pub root_max: Size,
    pub home_base: Size,
    pub home_required_space: Size,
    pub swap_cap: Size,
    pub thin_pool_name: &'static str,
}

impl InstallClass {
    pub fn profile(self) -> InstallClassProfile {
        let base = InstallClassProfile {
            class: self,
            default_scheme: Scheme::Lvm,
            default_fs: "ext4",
            vg_name: "vg0",
            root_base: Size::gib(1),
            root_max: Size::gib(50),
            home_base: Size::mib(500),
            home_required_space: Size::gib(50),
            swap_cap: DEFAULT_SWAP_CAP,
            thin_pool_name: "pool00",
        };
        match self {
            Self::Default => base,
            Self::Server => InstallClassProfile {
                default_fs: "xfs",
                vg_name: "server",
                root_max: Size::gib(70),
                ..base
            },
            Self::Workstation => InstallClassProfile {
                default_scheme: Scheme::Btrfs,
                default_fs: "btrfs",
                root_max: Size::gib(70),
                ..base
            },
            Self::Legacy => InstallClassProfile {
                swap_cap: Size::gib(4),
                ..base
            },
        }
    }
}

impl fmt::Display for InstallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Server => write!(f, "server"),
            Self::Workstation => write!(f, "workstation"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for InstallClass {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "server" => Ok(Self::Server),
            "workstation" => Ok(Self::Workstation),
            "legacy" => Ok(Self::Legacy),
            other => Err(LayoutError::ConfigError(format!(
                "unknown install class '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_override_defaults() {
        let default = InstallClass::Default.profile();
        assert_eq!(default.swap_cap, Size::gib(32));
        assert_eq!(default.root_max, Size::gib(50));
        assert_eq!(InstallClass::Legacy.profile().swap_cap, Size::gib(4));
        assert_eq!(InstallClass::Server.profile().default_fs, "xfs");
        assert_eq!(InstallClass::Workstation.profile().default_scheme, Scheme::Btrfs);
    }
}
