//! Firmware platform profiles
//!
//! Each platform decides which disklabels it can boot from, which firmware
//! partition (stage 1) the bootloader needs, and how mountpoints are weighted
//! so firmware partitions land at the front of the disk.

pub mod installclass;

use crate::disk::device::Disk;
use crate::disk::disklabel::DiskLabelKind;
use crate::disk::size::Size;
use crate::layout::requests::PartitionRequest;
use crate::utils::error::{LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use installclass::{InstallClass, InstallClassProfile};

/// Weight of firmware partitions.
pub const STAGE1_WEIGHT: i32 = 5000;
/// Weight of /boot.
pub const BOOT_WEIGHT: i32 = 2000;
/// Weight of / on ARM images.
pub const ARM_ROOT_WEIGHT: i32 = -100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    #[default]
    X86Bios,
    X86Efi,
    MacEfi,
    #[serde(rename = "ppc64-ipseries")]
    PPC64IPSeries,
    #[serde(rename = "ppc64-powernv")]
    PPC64PowerNV,
    Mac,
    S390,
    Sparc,
    Arm,
    ArmOmap,
}

/// What the bootloader's firmware-visible partition must look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage1Constraints {
    /// Formats that can serve as stage 1; empty when the firmware reads /boot.
    pub format_types: Vec<&'static str>,
    pub mountpoints: Vec<&'static str>,
    pub disklabel_types: Vec<DiskLabelKind>,
    /// Stage 1 must end below this offset.
    pub max_end: Option<Size>,
}

/// Per-platform constants the resolver and allocator consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub arch: &'static str,
    pub disklabel_priority: Vec<DiskLabelKind>,
    pub stage1: Option<Stage1Constraints>,
    /// Firmware partition to schedule, if any.
    pub stage1_partition: Option<PartitionRequest>,
    /// Size of the /boot partition.
    pub boot_size: Size,
}

impl Platform {
    pub fn all() -> [Platform; 10] {
        [
            Self::X86Bios,
            Self::X86Efi,
            Self::MacEfi,
            Self::PPC64IPSeries,
            Self::PPC64PowerNV,
            Self::Mac,
            Self::S390,
            Self::Sparc,
            Self::Arm,
            Self::ArmOmap,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::X86Bios => "x86-bios",
            Self::X86Efi => "x86-efi",
            Self::MacEfi => "mac-efi",
            Self::PPC64IPSeries => "ppc64-ipseries",
            Self::PPC64PowerNV => "ppc64-powernv",
            Self::Mac => "mac",
            Self::S390 => "s390",
            Self::Sparc => "sparc",
            Self::Arm => "arm",
            Self::ArmOmap => "arm-omap",
        }
    }

    pub fn arch(self) -> &'static str {
        match self {
            Self::X86Bios | Self::X86Efi | Self::MacEfi => "x86_64",
            Self::PPC64IPSeries | Self::PPC64PowerNV => "ppc64le",
            Self::Mac => "ppc",
            Self::S390 => "s390x",
            Self::Sparc => "sparc64",
            Self::Arm | Self::ArmOmap => "aarch64",
        }
    }

    /// Disklabel kinds in order of preference.
    pub fn disklabel_priority(self) -> Vec<DiskLabelKind> {
        use DiskLabelKind::*;
        match self {
            Self::X86Bios => vec![Gpt, Msdos],
            Self::X86Efi | Self::MacEfi => vec![Gpt],
            Self::PPC64IPSeries => vec![Msdos, Gpt],
            Self::PPC64PowerNV => vec![Gpt, Msdos],
            Self::Mac => vec![Mac],
            Self::S390 => vec![Msdos, Dasd],
            Self::Sparc => vec![Sun],
            Self::Arm | Self::ArmOmap => vec![Msdos],
        }
    }

    pub fn stage1_constraints(self) -> Stage1Constraints {
        use DiskLabelKind::*;
        let (format_types, mountpoints, disklabel_types, max_end) = match self {
            Self::X86Bios => (vec!["biosboot"], vec![], vec![Gpt, Msdos], Some(Size::tib(2))),
            Self::X86Efi => (vec!["efi"], vec!["/boot/efi"], vec![Gpt], None),
            Self::MacEfi => (vec!["macefi"], vec!["/boot/efi"], vec![Gpt], None),
            Self::PPC64IPSeries => (vec!["prepboot"], vec![], vec![Msdos, Gpt], Some(Size::gib(4))),
            Self::PPC64PowerNV => (vec![], vec!["/boot"], vec![Gpt, Msdos], None),
            Self::Mac => (vec!["appleboot"], vec![], vec![Mac], None),
            Self::S390 => (vec![], vec!["/boot"], vec![Msdos, Dasd], None),
            Self::Sparc => (vec![], vec!["/boot"], vec![Sun], None),
            Self::Arm => (vec![], vec!["/boot"], vec![Msdos], None),
            Self::ArmOmap => (vec!["vfat"], vec!["/boot/uboot"], vec![Msdos], None),
        };
        Stage1Constraints {
            format_types,
            mountpoints,
            disklabel_types,
            max_end,
        }
    }

    /// Firmware partition the bootloader needs, if the platform has one.
    pub fn stage1_partition(self) -> Option<PartitionRequest> {
        let req = match self {
            Self::X86Bios => PartitionRequest::new("biosboot", "biosboot", Size::mib(1)),
            Self::X86Efi => PartitionRequest::mounted("/boot/efi", "efi", Size::mib(20))
                .grow(Some(Size::mib(200))),
            Self::MacEfi => PartitionRequest::mounted("/boot/efi", "macefi", Size::mib(20))
                .grow(Some(Size::mib(200))),
            Self::PPC64IPSeries => PartitionRequest::new("prepboot", "prepboot", Size::mib(4)),
            Self::Mac => PartitionRequest::new("appleboot", "appleboot", Size::mib(1)),
            Self::ArmOmap => PartitionRequest::mounted("/boot/uboot", "vfat", Size::mib(20))
                .grow(Some(Size::mib(200))),
            Self::PPC64PowerNV | Self::S390 | Self::Sparc | Self::Arm => return None,
        };
        let weight = self.weight(&req.fs_type, req.mountpoint.as_deref());
        let mut req = req.weight(weight);
        req.primary_only = true;
        req.max_end = self.stage1_constraints().max_end;
        Some(req)
    }

    /// Sort bias for a request with this format and mountpoint.
    pub fn weight(self, fs_type: &str, mountpoint: Option<&str>) -> i32 {
        match (self, fs_type, mountpoint) {
            (Self::X86Bios, "biosboot", _) => STAGE1_WEIGHT,
            (Self::X86Efi, "efi", Some("/boot/efi")) => STAGE1_WEIGHT,
            (Self::MacEfi, "macefi", Some("/boot/efi")) => STAGE1_WEIGHT,
            (Self::PPC64IPSeries, "prepboot", _) => STAGE1_WEIGHT,
            (Self::Mac, "appleboot", _) => STAGE1_WEIGHT,
            // zipl reads the kernel straight from /boot
            (Self::S390, _, Some("/boot")) => STAGE1_WEIGHT,
            (Self::ArmOmap, _, Some("/boot/uboot")) => STAGE1_WEIGHT,
            (Self::Arm | Self::ArmOmap, _, Some("/")) => ARM_ROOT_WEIGHT,
            (_, _, Some("/boot")) => BOOT_WEIGHT,
            _ => 0,
        }
    }

    /// Label kind mandated for a transport, e.g. DASD on s390.
    pub fn required_label_for(self, transport: Option<&str>) -> Option<DiskLabelKind> {
        match (self, transport) {
            (Self::S390, Some("dasd")) => Some(DiskLabelKind::Dasd),
            _ => None,
        }
    }

    pub fn profile(self) -> PlatformProfile {
        PlatformProfile {
            platform: self,
            arch: self.arch(),
            disklabel_priority: self.disklabel_priority(),
            stage1: Some(self.stage1_constraints()),
            stage1_partition: self.stage1_partition(),
            boot_size: Size::gib(1),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = LayoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Platform::all()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LayoutError::ConfigError(format!("unknown platform '{}'", s)))
    }
}

impl PlatformProfile {
    /// Refuse profiles the solver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.disklabel_priority.is_empty() {
            return Err(LayoutError::PlatformUnsupported(format!(
                "{} has no usable disklabel types",
                self.platform
            )));
        }
        let Some(stage1) = &self.stage1 else {
            return Err(LayoutError::PlatformUnsupported(format!(
                "{} has no stage-1 bootloader constraints",
                self.platform
            )));
        };
        if stage1.format_types.is_empty() && stage1.mountpoints.is_empty() {
            return Err(LayoutError::PlatformUnsupported(format!(
                "{} stage-1 constraints name neither a format nor a mountpoint",
                self.platform
            )));
        }
        if !stage1
            .disklabel_types
            .iter()
            .any(|k| self.disklabel_priority.contains(k))
        {
            return Err(LayoutError::PlatformUnsupported(format!(
                "{} cannot boot from any of its disklabel types",
                self.platform
            )));
        }
        Ok(())
    }

    pub fn weight(&self, fs_type: &str, mountpoint: Option<&str>) -> i32 {
        self.platform.weight(fs_type, mountpoint)
    }

    /// Best label for a disk: the transport's mandatory kind, else the first
    /// priority entry that can address every sector.
    pub fn best_disklabel_for(&self, disk: &Disk) -> Result<DiskLabelKind> {
        if let Some(kind) = self.platform.required_label_for(disk.transport.as_deref()) {
            return Ok(kind);
        }
        self.disklabel_priority
            .iter()
            .copied()
            .find(|k| k.is_compatible_with(disk.length))
            .ok_or_else(|| LayoutError::LabelTooSmall {
                disk: disk.name.clone(),
                length: disk.length,
            })
    }

    /// Whether the bootloader can live on a disk with this label.
    pub fn boot_label_ok(&self, kind: DiskLabelKind) -> bool {
        self.stage1
            .as_ref()
            .is_some_and(|s| s.disklabel_types.contains(&kind))
    }
}
