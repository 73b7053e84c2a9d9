//! Layout configuration file
//!
//! A TOML description of the machine (platform, RAM, disks and what is
//! already on them) and of what to build on it (autopart choices and/or a
//! manual layout). [`LayoutConfig::to_solve_input`] turns it into the
//! solver's input, probing the host for anything the file leaves out.

use crate::disk::detection::{get_ram, probe_disks};
use crate::disk::device::Disk;
use crate::disk::disklabel::{DiskLabel, DiskLabelKind, Geometry, LabelPartition, PartType};
use crate::disk::size::{size_to_sectors, Size};
use crate::layout::requests::{
    ContainerKind, ContainerRequest, EncryptionSettings, Layout, PartitionRequest, Scheme,
    SizeSetSpec, VolumeRequest,
};
use crate::layout::resolver::{supported_schemes, AutopartOptions};
use crate::partitioning::clear::{ClearPartSettings, ClearPolicy};
use crate::platform::{InstallClass, Platform};
use crate::solve::{ExistingDevice, SolveInput};
use crate::utils::command::command_exists;
use crate::utils::error::{Diagnostics, LayoutError, Result};
use crate::utils::prompt::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Main layout configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub clearpart: ClearPartSettings,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    /// Disks to plan for; empty probes the host.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<DiskConfig>,
    /// Stacked devices already built on the disks' partitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub existing: Vec<ExistingDevice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub size_sets: Vec<SizeSetSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Firmware/architecture combination
    #[serde(default)]
    pub arch: Platform,
    /// Product defaults (scheme, filesystem, VG name, limits)
    #[serde(default)]
    pub class: InstallClass,
    /// Replaces the platform's disklabel preference when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disklabel_priority: Option<Vec<DiskLabelKind>>,
    /// Upper bound for the suggested swap size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_cap: Option<Size>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Installed memory; read from /proc/meminfo when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<Size>,
    /// Size swap for suspend-to-disk
    #[serde(default)]
    pub hibernation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Lay out the default requests automatically
    #[serde(default = "default_true")]
    pub autopart: bool,
    /// Autopart scheme; the install class picks one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstype: Option<String>,
    #[serde(default)]
    pub nohome: bool,
    #[serde(default)]
    pub noswap: bool,
    #[serde(default)]
    pub noboot: bool,
    /// Keep swap within 10 % of the disk space
    #[serde(default)]
    pub clamp_swap: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_disk: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_disks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only_use: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            autopart: default_true(),
            scheme: None,
            encrypted: false,
            fstype: None,
            nohome: false,
            noswap: false,
            noboot: false,
            clamp_swap: false,
            boot_disk: None,
            ignored_disks: Vec::new(),
            only_use: Vec::new(),
        }
    }
}

/// A disk as it is now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    pub name: String,
    pub size: Size,
    #[serde(default = "default_sector_size")]
    pub sector_size: u64,
    /// Current disklabel; absent for a blank disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<DiskLabelKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default)]
    pub removable: bool,
    /// Read-only disks are never written to
    #[serde(default)]
    pub protected: bool,
    /// Whole-disk format, when the disk has no label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<ExistingPartition>,
}

/// A partition already in a disk's label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingPartition {
    pub number: u32,
    /// First sector
    pub start: u64,
    pub size: Size,
    #[serde(default = "default_part_type", rename = "type")]
    pub part_type: PartType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<String>,
}

/// A `[[partitions]]` entry of a manual layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Request id; defaults to the mountpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default = "default_fstype")]
    pub fstype: String,
    pub size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Size>,
    #[serde(default)]
    pub grow: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub encrypted: bool,
    /// Disks the partition may go on; empty means any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<String>,
    /// Overrides the platform weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

/// A `[[containers]]` entry: VG, md array or btrfs volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub kind: ContainerKind,
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_level: Option<String>,
    /// Fixed container size; members share it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fstype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
}

/// A `[[volumes]]` entry: LV, thin pool, thin LV or btrfs subvolume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default = "default_fstype")]
    pub fstype: String,
    #[serde(default)]
    pub size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Size>,
    #[serde(default)]
    pub grow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u32>,
    #[serde(default)]
    pub thin_pool: bool,
    #[serde(default)]
    pub thin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_level: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
}

fn default_true() -> bool {
    true
}

fn default_sector_size() -> u64 {
    512
}

fn default_part_type() -> PartType {
    PartType::Normal
}

fn default_fstype() -> String {
    "ext4".to_string()
}

impl PartitionSpec {
    pub fn to_request(&self) -> Result<PartitionRequest> {
        let name = self
            .name
            .clone()
            .or_else(|| self.mountpoint.clone())
            .ok_or_else(|| {
                LayoutError::ConfigError("partition needs a name or a mountpoint".to_string())
            })?;
        let mut req = PartitionRequest::new(name, self.fstype.clone(), self.size);
        req.mountpoint = self.mountpoint.clone();
        req.grow = self.grow;
        req.max_size = self.max_size;
        req.primary_only = self.primary;
        req.encrypted = self.encrypted;
        req.required_disks = self.disks.clone();
        req.weight = self.weight.unwrap_or(0);
        Ok(req)
    }
}

impl ContainerSpec {
    pub fn to_request(&self) -> ContainerRequest {
        let mut req = ContainerRequest::new(self.name.clone(), self.kind, self.members.clone());
        req.level = self.level.clone();
        req.metadata_level = self.metadata_level.clone();
        req.size = self.size;
        req.pe_size = self.pe_size;
        req.fs_type = self.fstype.clone();
        req.mountpoint = self.mountpoint.clone();
        req.encrypted = self.encrypted;
        req
    }
}

impl VolumeSpec {
    pub fn to_request(&self) -> VolumeRequest {
        let mut req = VolumeRequest::new(
            self.name.clone(),
            self.container.clone(),
            self.fstype.clone(),
            self.size,
        );
        req.mountpoint = self.mountpoint.clone();
        req.grow = self.grow;
        req.max_size = self.max_size;
        req.percent = self.percent;
        req.thin_pool = self.thin_pool;
        req.thin = self.thin;
        req.pool = self.pool.clone();
        req.raid_level = self.raid_level.clone();
        req.encrypted = self.encrypted;
        req
    }
}

impl DiskConfig {
    /// Build the disk model, with its current label and partitions.
    pub fn to_disk(&self) -> Result<Disk> {
        let mut disk = Disk::new(self.name.clone(), self.sector_size, self.size);
        disk.transport = self.transport.clone();
        disk.removable = self.removable;
        disk.protected = self.protected;
        disk.format = self.format.clone();

        let Some(kind) = self.label else {
            if !self.partitions.is_empty() {
                return Err(LayoutError::ConfigError(format!(
                    "{} lists partitions but has no label",
                    self.name
                )));
            }
            return Ok(disk);
        };
        let mut label = DiskLabel::new(kind, self.sector_size, disk.length);
        label.fresh = false;
        for part in &self.partitions {
            let length = size_to_sectors(part.size, self.sector_size);
            let geometry = Geometry::from_length(part.start, length.max(1));
            if geometry.end >= disk.length {
                return Err(LayoutError::ConfigError(format!(
                    "{}{} ends past the end of the disk",
                    self.name, part.number
                )));
            }
            let clash = label.partitions.iter().find(|p| {
                let nested = matches!(
                    (p.part_type, part.part_type),
                    (PartType::Extended, PartType::Logical) | (PartType::Logical, PartType::Extended)
                );
                !nested && p.geometry.overlaps(&geometry)
            });
            if let Some(other) = clash {
                return Err(LayoutError::ConfigError(format!(
                    "{}{} overlaps {}{}",
                    self.name, part.number, self.name, other.number
                )));
            }
            label.add_partition(LabelPartition {
                number: part.number,
                geometry,
                part_type: part.part_type,
                request: None,
                exists: true,
                fs_type: part.fs.clone(),
            });
        }
        Ok(disk.with_label(label))
    }
}

impl LayoutConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LayoutConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The manual layout section as solver requests.
    pub fn layout(&self) -> Result<Layout> {
        Ok(Layout {
            partitions: self
                .partitions
                .iter()
                .map(PartitionSpec::to_request)
                .collect::<Result<_>>()?,
            containers: self.containers.iter().map(ContainerSpec::to_request).collect(),
            volumes: self.volumes.iter().map(VolumeSpec::to_request).collect(),
            size_sets: self.size_sets.clone(),
        })
    }

    pub fn autopart_options(&self) -> Option<AutopartOptions> {
        let s = &self.storage;
        s.autopart.then(|| AutopartOptions {
            scheme: s.scheme,
            encrypted: s.encrypted,
            fs_type: s.fstype.clone(),
            no_home: s.nohome,
            no_swap: s.noswap,
            no_boot: s.noboot,
            hibernation: self.system.hibernation,
            clamp_swap: s.clamp_swap,
            exclude_mountpoints: Vec::new(),
        })
    }

    /// Build the solver input, probing the host for disks and RAM when the
    /// file does not list them.
    pub fn to_solve_input(&self) -> Result<SolveInput> {
        let disks = if self.disks.is_empty() {
            info!("No disks configured, probing the host");
            probe_disks(false)?
        } else {
            self.disks
                .iter()
                .map(DiskConfig::to_disk)
                .collect::<Result<Vec<_>>>()?
        };
        let ram = self.system.ram.unwrap_or_else(get_ram);
        debug!("{} disk(s), {} of RAM", disks.len(), ram);

        let mut input = SolveInput::new(self.platform.arch, disks, ram);
        if let Some(priority) = &self.platform.disklabel_priority {
            input.platform.disklabel_priority = priority.clone();
        }
        input.class = self.platform.class.profile();
        if let Some(cap) = self.platform.swap_cap {
            input.class.swap_cap = cap;
        }
        input.autopart = self.autopart_options();
        input.layout = self.layout()?;
        input.existing = self.existing.clone();
        input.clearpart = self.clearpart.clone();
        input.boot_disk = self.storage.boot_disk.clone();
        input.ignored_disks = self.storage.ignored_disks.clone();
        input.only_use = self.storage.only_use.clone();
        input.encryption = self.encryption.clone();
        Ok(input)
    }

    /// Create configuration interactively
    pub fn from_wizard(all: bool) -> Result<Self> {
        println!("\nautopart layout wizard\n");

        let disks = probe_disks(all)?;
        if disks.is_empty() {
            return Err(LayoutError::ConfigError(
                "No suitable disks found".to_string(),
            ));
        }
        let items: Vec<String> = disks
            .iter()
            .map(|d| {
                format!(
                    "{} - {} {}",
                    d.name,
                    d.size(),
                    d.model.as_deref().unwrap_or("")
                )
            })
            .collect();
        let chosen = prompt_multi_select("Disks to use", &items)?;
        if chosen.is_empty() {
            return Err(LayoutError::ValidationError(
                "At least one disk must be selected".to_string(),
            ));
        }
        let only_use: Vec<String> = chosen.iter().map(|&i| disks[i].name.clone()).collect();

        let platforms = Platform::all();
        let default_platform = if Path::new("/sys/firmware/efi").exists() {
            Platform::X86Efi
        } else {
            Platform::X86Bios
        };
        let default_idx = platforms
            .iter()
            .position(|p| *p == default_platform)
            .unwrap_or(0);
        let arch = platforms[prompt_fuzzy_select("Platform", &platforms, default_idx)?];

        let classes = [
            InstallClass::Default,
            InstallClass::Server,
            InstallClass::Workstation,
            InstallClass::Legacy,
        ];
        let class = classes[prompt_select("Install class", &classes, 0)?];

        let mut diag = Diagnostics::default();
        let schemes = supported_schemes(|f| f.tool.is_none_or(command_exists), &mut diag);
        let class_scheme = class.profile().default_scheme;
        let scheme_default = schemes.iter().position(|s| *s == class_scheme).unwrap_or(0);
        let scheme = schemes[prompt_select("Partitioning scheme", &schemes, scheme_default)?];

        // the passphrase is never written out, so it is not asked for here
        let encrypted = prompt_confirm("Encrypt the new devices?", false)?;
        let hibernation = prompt_confirm("Size swap for hibernation?", false)?;

        let clear_all = warn_confirm(&format!(
            "Remove every partition on {}?",
            only_use.join(", ")
        ))?;
        let clearpart = ClearPartSettings {
            policy: if clear_all {
                ClearPolicy::All
            } else {
                ClearPolicy::None
            },
            drives: only_use.clone(),
            initlabel: clear_all,
            ..ClearPartSettings::default()
        };

        Ok(LayoutConfig {
            platform: PlatformConfig {
                arch,
                class,
                ..PlatformConfig::default()
            },
            system: SystemConfig {
                ram: None,
                hibernation,
            },
            storage: StorageConfig {
                scheme: Some(scheme),
                encrypted,
                boot_disk: only_use.first().cloned(),
                only_use,
                ..StorageConfig::default()
            },
            clearpart,
            ..LayoutConfig::default()
        })
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        LayoutConfig {
            platform: PlatformConfig {
                arch: Platform::X86Efi,
                ..PlatformConfig::default()
            },
            system: SystemConfig {
                ram: Some(Size::gib(8)),
                hibernation: false,
            },
            storage: StorageConfig {
                scheme: Some(Scheme::Lvm),
                boot_disk: Some("sda".to_string()),
                ..StorageConfig::default()
            },
            clearpart: ClearPartSettings {
                policy: ClearPolicy::All,
                initlabel: true,
                ..ClearPartSettings::default()
            },
            disks: vec![DiskConfig {
                name: "sda".to_string(),
                size: Size::gib(64),
                sector_size: default_sector_size(),
                label: Some(DiskLabelKind::Gpt),
                transport: Some("sata".to_string()),
                removable: false,
                protected: false,
                format: None,
                partitions: vec![ExistingPartition {
                    number: 1,
                    start: 2048,
                    size: Size::gib(16),
                    part_type: PartType::Normal,
                    fs: Some("ntfs".to_string()),
                }],
            }],
            ..LayoutConfig::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut profile = self.platform.arch.profile();
        if let Some(priority) = &self.platform.disklabel_priority {
            profile.disklabel_priority = priority.clone();
        }
        profile.validate()?;

        let mut names = BTreeSet::new();
        for disk in &self.disks {
            if !names.insert(disk.name.as_str()) {
                return Err(LayoutError::ValidationError(format!(
                    "Disk {} is listed twice",
                    disk.name
                )));
            }
            if disk.size.is_zero() {
                return Err(LayoutError::ValidationError(format!(
                    "Disk {} has no size",
                    disk.name
                )));
            }
            if disk.sector_size < 512 || !disk.sector_size.is_power_of_two() {
                return Err(LayoutError::ValidationError(format!(
                    "Disk {} has an invalid sector size {}",
                    disk.name, disk.sector_size
                )));
            }
            disk.to_disk()?;
        }

        if !self.disks.is_empty() {
            let referenced = self
                .storage
                .boot_disk
                .iter()
                .chain(&self.storage.only_use)
                .chain(&self.clearpart.drives);
            for name in referenced {
                if !names.contains(name.as_str()) {
                    return Err(LayoutError::DeviceNotFound(name.clone()));
                }
            }
        }

        for vol in &self.volumes {
            if vol.percent.is_some_and(|p| p == 0 || p > 100) {
                return Err(LayoutError::ValidationError(format!(
                    "Volume {} must use between 1 and 100 percent",
                    vol.name
                )));
            }
        }

        let layout = self.layout()?;
        if !self.storage.autopart && layout.is_empty() {
            return Err(LayoutError::ValidationError(
                "Autopart is off and no partitions are listed".to_string(),
            ));
        }
        layout.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solve::solve;

    fn sample_config() -> LayoutConfig {
        LayoutConfig::sample()
    }

    #[test]
    fn sample_survives_toml() {
        let config = sample_config();
        config.validate().unwrap();
        let text = config.to_toml().unwrap();
        let back: LayoutConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn sample_solves() {
        let input = sample_config().to_solve_input().unwrap();
        assert_eq!(input.disks[0].label.as_ref().unwrap().partitions.len(), 1);
        let plan = solve(&input).unwrap();
        assert!(plan.layout.partition("/boot/efi").is_some());
        assert!(plan.containers.iter().any(|c| c.kind == ContainerKind::Lvm));
    }

    #[test]
    fn manual_layout_from_toml() {
        let config: LayoutConfig = toml::from_str(
            r#"
            [platform]
            arch = "x86-bios"

            [system]
            ram = "2 GiB"

            [storage]
            autopart = false

            [[disks]]
            name = "vda"
            size = "20 GiB"
            label = "msdos"

            [[partitions]]
            mountpoint = "/boot"
            size = "1 GiB"

            [[partitions]]
            name = "pv.01"
            fstype = "lvmpv"
            size = "1 GiB"
            grow = true

            [[containers]]
            name = "sys"
            kind = "lvm"
            members = ["pv.01"]

            [[volumes]]
            name = "root"
            container = "sys"
            mountpoint = "/"
            fstype = "xfs"
            size = "4 GiB"
            grow = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let input = config.to_solve_input().unwrap();
        assert!(input.autopart.is_none());
        assert_eq!(input.ram, Size::gib(2));
        assert_eq!(input.layout.partition("/boot").unwrap().fs_type, "ext4");

        let plan = solve(&input).unwrap();
        assert_eq!(plan.disklabels.get("vda"), Some(&DiskLabelKind::Msdos));
        let root = plan.layout.volumes.iter().find(|v| v.name == "root").unwrap();
        assert!(root.size.unwrap() > Size::gib(4));
    }

    #[test]
    fn rejects_bad_disks() {
        let mut config = sample_config();
        config.disks[0].partitions[0].start = config.disks[0].size.bytes();
        assert!(matches!(
            config.validate(),
            Err(LayoutError::ConfigError(_))
        ));

        let mut config = sample_config();
        let mut second = config.disks[0].partitions[0].clone();
        second.number = 2;
        second.start = 4096;
        config.disks[0].partitions.push(second);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sda2 overlaps sda1"));

        let mut config = sample_config();
        config.storage.boot_disk = Some("sdz".to_string());
        assert!(matches!(
            config.validate(),
            Err(LayoutError::DeviceNotFound(_))
        ));

        let mut config = sample_config();
        config.disks.push(config.disks[0].clone());
        assert!(matches!(
            config.validate(),
            Err(LayoutError::ValidationError(_))
        ));
    }

    #[test]
    fn platform_overrides_apply() {
        let mut config = sample_config();
        config.platform.disklabel_priority = Some(vec![DiskLabelKind::Msdos]);
        config.platform.swap_cap = Some(Size::gib(2));
        let input = config.to_solve_input().unwrap();
        assert_eq!(input.platform.disklabel_priority, vec![DiskLabelKind::Msdos]);
        assert_eq!(input.class.swap_cap, Size::gib(2));

        config.platform.disklabel_priority = Some(Vec::new());
        assert!(matches!(
            config.validate(),
            Err(LayoutError::PlatformUnsupported(_))
        ));
    }
}
