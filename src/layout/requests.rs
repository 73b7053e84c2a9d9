//! Declarative partition, container and volume requests
//!
//! Requests are what the caller (autopart, kickstart or a layout file) asks
//! for. The allocator fills in the placement fields of partition requests and
//! the growth solver fills in final sizes; nothing else mutates them.

use crate::disk::disklabel::{Geometry, PartType};
use crate::disk::size::Size;
use crate::utils::error::{LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Partitioning scheme for automatic layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Plain,
    #[default]
    Lvm,
    Thinp,
    Btrfs,
}

impl Scheme {
    pub fn all() -> [Scheme; 4] {
        [Self::Plain, Self::Lvm, Self::Thinp, Self::Btrfs]
    }

    /// Format each scheme needs beyond plain filesystems.
    pub fn member_format(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Lvm | Self::Thinp => Some("lvmpv"),
            Self::Btrfs => Some("btrfs"),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Lvm => write!(f, "lvm"),
            Self::Thinp => write!(f, "thinp"),
            Self::Btrfs => write!(f, "btrfs"),
        }
    }
}

impl FromStr for Scheme {
    type Err = LayoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "partition" => Ok(Self::Plain),
            "lvm" => Ok(Self::Lvm),
            "thinp" | "lvm-thin" => Ok(Self::Thinp),
            "btrfs" => Ok(Self::Btrfs),
            other => Err(LayoutError::ConfigError(format!(
                "unknown partitioning scheme '{}'",
                other
            ))),
        }
    }
}

/// LUKS settings shared by every encrypted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Recorded on the format spec only; never written back out.
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub cipher: Option<String>,
    #[serde(default)]
    pub escrow_cert: Option<String>,
    #[serde(default = "default_luks_version")]
    pub luks_version: String,
    #[serde(default)]
    pub pbkdf: Option<String>,
    #[serde(default)]
    pub pbkdf_memory: Option<u32>,
    #[serde(default)]
    pub pbkdf_iterations: Option<u32>,
}

fn default_luks_version() -> String {
    "luks2".to_string()
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            passphrase: None,
            cipher: None,
            escrow_cert: None,
            luks_version: default_luks_version(),
            pbkdf: None,
            pbkdf_memory: None,
            pbkdf_iterations: None,
        }
    }
}

impl EncryptionSettings {
    /// Space the LUKS header takes from the start of the backing device.
    pub fn header_size(&self) -> Size {
        if self.luks_version == "luks1" {
            Size::mib(2)
        } else {
            Size::mib(16)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionRequest {
    /// Unique request id: the mountpoint, or a member name like `pv.sda`.
    pub name: String,
    pub mountpoint: Option<String>,
    pub fs_type: String,
    pub base_size: Size,
    pub max_size: Option<Size>,
    pub grow: bool,
    pub primary_only: bool,
    pub weight: i32,
    /// Only honoured when the caller has this much disk space; zero ignores it.
    pub required_space: Size,
    pub encrypted: bool,
    /// Empty means any disk.
    pub required_disks: Vec<String>,
    /// Firmware limit on where the partition may end, as a byte offset.
    pub max_end: Option<Size>,

    pub disk: Option<String>,
    pub geometry: Option<Geometry>,
    pub part_type: Option<PartType>,
}

impl PartitionRequest {
    pub fn new(name: impl Into<String>, fs_type: impl Into<String>, base_size: Size) -> Self {
        Self {
            name: name.into(),
            mountpoint: None,
            fs_type: fs_type.into(),
            base_size,
            max_size: None,
            grow: false,
            primary_only: false,
            weight: 0,
            required_space: Size::ZERO,
            encrypted: false,
            required_disks: Vec::new(),
            max_end: None,
            disk: None,
            geometry: None,
            part_type: None,
        }
    }

    /// A request for a mounted filesystem named after its mountpoint.
    pub fn mounted(mountpoint: &str, fs_type: &str, base_size: Size) -> Self {
        let mut req = Self::new(mountpoint, fs_type, base_size);
        req.mountpoint = Some(mountpoint.to_string());
        req
    }

    pub fn grow(mut self, max_size: Option<Size>) -> Self {
        self.grow = true;
        self.max_size = max_size;
        self
    }

    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn on_disk(mut self, disk: &str) -> Self {
        self.required_disks = vec![disk.to_string()];
        self
    }

    /// A request whose max equals its base cannot grow.
    pub fn is_growable(&self) -> bool {
        self.grow && self.max_size.is_none_or(|m| m > self.base_size)
    }

    /// Firmware and /boot partitions carry weights above 1000.
    pub fn is_bootable(&self) -> bool {
        self.weight > 1000
    }

    pub fn label(&self) -> &str {
        self.mountpoint.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Lvm,
    Md,
    Btrfs,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lvm => write!(f, "lvm"),
            Self::Md => write!(f, "md"),
            Self::Btrfs => write!(f, "btrfs"),
        }
    }
}

/// A VG, md array or btrfs volume built from member partitions (or arrays).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRequest {
    pub name: String,
    pub kind: ContainerKind,
    /// Partition request names or md container names.
    pub members: Vec<String>,
    /// md level, or btrfs data level.
    pub level: Option<String>,
    /// btrfs metadata level.
    pub metadata_level: Option<String>,
    /// Fixed container size; members are trimmed to reach it.
    pub size: Option<Size>,
    pub pe_size: Option<Size>,
    /// md arrays and btrfs volumes can carry a filesystem directly.
    pub fs_type: Option<String>,
    pub mountpoint: Option<String>,
    pub encrypted: bool,
}

impl ContainerRequest {
    pub fn new(name: impl Into<String>, kind: ContainerKind, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            members,
            level: None,
            metadata_level: None,
            size: None,
            pe_size: None,
            fs_type: None,
            mountpoint: None,
            encrypted: false,
        }
    }
}

/// An LV, thin pool, thin LV or btrfs subvolume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRequest {
    pub name: String,
    pub container: String,
    pub mountpoint: Option<String>,
    pub fs_type: String,
    pub base_size: Size,
    pub max_size: Option<Size>,
    pub grow: bool,
    /// Fixed share of the container, in percent.
    pub percent: Option<u32>,
    pub thin_pool: bool,
    pub thin: bool,
    pub pool: Option<String>,
    pub raid_level: Option<String>,
    pub encrypted: bool,
    pub required_space: Size,

    pub size: Option<Size>,
}

impl VolumeRequest {
    pub fn new(
        name: impl Into<String>,
        container: impl Into<String>,
        fs_type: impl Into<String>,
        base_size: Size,
    ) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            mountpoint: None,
            fs_type: fs_type.into(),
            base_size,
            max_size: None,
            grow: false,
            percent: None,
            thin_pool: false,
            thin: false,
            pool: None,
            raid_level: None,
            encrypted: false,
            required_space: Size::ZERO,
            size: None,
        }
    }

    pub fn mounted(mut self, mountpoint: &str) -> Self {
        self.mountpoint = Some(mountpoint.to_string());
        self
    }

    pub fn grow(mut self, max_size: Option<Size>) -> Self {
        self.grow = true;
        self.max_size = max_size;
        self
    }

    pub fn is_growable(&self) -> bool {
        self.grow && self.max_size.is_none_or(|m| m > self.base_size)
    }

    pub fn label(&self) -> &str {
        self.mountpoint.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeSetKind {
    Total,
    Same,
}

/// Caller-supplied size constraint over partition requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSetSpec {
    pub kind: SizeSetKind,
    pub devices: Vec<String>,
    #[serde(default)]
    pub size: Option<Size>,
}

/// Everything one solve is asked to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub partitions: Vec<PartitionRequest>,
    pub containers: Vec<ContainerRequest>,
    pub volumes: Vec<VolumeRequest>,
    pub size_sets: Vec<SizeSetSpec>,
}

impl Layout {
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty() && self.containers.is_empty() && self.volumes.is_empty()
    }

    pub fn container(&self, name: &str) -> Option<&ContainerRequest> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn partition(&self, name: &str) -> Option<&PartitionRequest> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Every mountpoint requested anywhere in the layout.
    pub fn mountpoints(&self) -> Vec<&str> {
        self.partitions
            .iter()
            .filter_map(|p| p.mountpoint.as_deref())
            .chain(self.containers.iter().filter_map(|c| c.mountpoint.as_deref()))
            .chain(self.volumes.iter().filter_map(|v| v.mountpoint.as_deref()))
            .collect()
    }

    /// Reject duplicate mountpoints and dangling references.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for mp in self.mountpoints() {
            if !seen.insert(mp) {
                return Err(LayoutError::RequestConflicts(format!(
                    "mountpoint {} is requested twice",
                    mp
                )));
            }
        }

        let mut names = BTreeSet::new();
        for name in self
            .partitions
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.containers.iter().map(|c| c.name.as_str()))
        {
            if !names.insert(name) {
                return Err(LayoutError::RequestConflicts(format!(
                    "device name {} is used twice",
                    name
                )));
            }
        }

        let mut claimed = BTreeSet::new();
        for c in &self.containers {
            if c.members.is_empty() {
                return Err(LayoutError::RequestConflicts(format!(
                    "{} {} has no members",
                    c.kind, c.name
                )));
            }
            for m in &c.members {
                let member_ok = self.partition(m).is_some()
                    || self.container(m).is_some_and(|mc| mc.kind == ContainerKind::Md);
                if !member_ok {
                    return Err(LayoutError::RequestConflicts(format!(
                        "{} references missing member {}",
                        c.name, m
                    )));
                }
                if !claimed.insert(m.as_str()) {
                    return Err(LayoutError::RequestConflicts(format!(
                        "{} is a member of more than one container",
                        m
                    )));
                }
            }
        }

        for v in &self.volumes {
            let Some(c) = self.container(&v.container) else {
                return Err(LayoutError::RequestConflicts(format!(
                    "volume {} references missing container {}",
                    v.label(),
                    v.container
                )));
            };
            if c.kind == ContainerKind::Md {
                return Err(LayoutError::RequestConflicts(format!(
                    "md array {} cannot hold volumes",
                    c.name
                )));
            }
            if c.kind == ContainerKind::Lvm && v.raid_level.is_some() {
                return Err(LayoutError::RequestConflicts(format!(
                    "RAID level on logical volume {} is not supported",
                    v.label()
                )));
            }
            if v.thin {
                let pool_ok = v.pool.as_ref().is_some_and(|p| {
                    self.volumes
                        .iter()
                        .any(|o| o.thin_pool && &o.name == p && o.container == v.container)
                });
                if !pool_ok {
                    return Err(LayoutError::RequestConflicts(format!(
                        "thin volume {} references a missing pool",
                        v.label()
                    )));
                }
            }
        }

        for set in &self.size_sets {
            for d in &set.devices {
                if self.partition(d).is_none() {
                    return Err(LayoutError::RequestConflicts(format!(
                        "size set references missing partition {}",
                        d
                    )));
                }
            }
        }
        Ok(())
    }
}
