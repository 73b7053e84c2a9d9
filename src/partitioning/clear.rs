//! Clearing existing partitions
//!
//! Applies a clearpart policy to the candidate disks before anything is
//! allocated: matching partitions and every device built on them are marked
//! for destruction, and disks that need it get a fresh label of the best kind
//! for the platform.

use crate::disk::detection::partition_prefix;
use crate::disk::device::{DeviceId, DeviceTree, Disk};
use crate::disk::disklabel::{DiskLabel, DiskLabelKind, PartType};
use crate::disk::formats;
use crate::platform::PlatformProfile;
use crate::utils::error::{Diagnostics, LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearPolicy {
    /// Keep everything
    #[default]
    None,
    /// Remove every partition
    All,
    /// Remove partitions holding Linux formats
    Linux,
    /// Remove the partitions named in `devices`
    List,
}

impl fmt::Display for ClearPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::All => write!(f, "all"),
            Self::Linux => write!(f, "linux"),
            Self::List => write!(f, "list"),
        }
    }
}

impl FromStr for ClearPolicy {
    type Err = LayoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            "linux" => Ok(Self::Linux),
            "list" => Ok(Self::List),
            other => Err(LayoutError::ConfigError(format!(
                "unknown clearpart policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPartSettings {
    #[serde(default)]
    pub policy: ClearPolicy,
    /// Disks the policy applies to; empty means every candidate disk.
    #[serde(default)]
    pub drives: Vec<String>,
    /// Partition names removed under [`ClearPolicy::List`].
    #[serde(default)]
    pub devices: Vec<String>,
    /// Write a new label on every cleared disk.
    #[serde(default)]
    pub initlabel: bool,
    /// Label kind for fresh labels, overriding the platform's choice.
    #[serde(default)]
    pub disklabel: Option<DiskLabelKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearOutcome {
    /// Pre-existing devices scheduled for removal.
    pub destroyed: BTreeSet<DeviceId>,
    /// Disks that receive a new label, with the kind they had before.
    pub reinitialized: Vec<(String, Option<DiskLabelKind>)>,
}

impl ClearOutcome {
    pub fn is_reinitialized(&self, disk: &str) -> bool {
        self.reinitialized.iter().any(|(d, _)| d == disk)
    }
}

fn should_clear(settings: &ClearPartSettings, name: &str, format: Option<&str>) -> bool {
    match settings.policy {
        ClearPolicy::None => false,
        ClearPolicy::All => true,
        ClearPolicy::Linux => format.is_some_and(formats::is_linux_native),
        ClearPolicy::List => settings.devices.iter().any(|d| d == name),
    }
}

/// Label kind a fresh label on `disk` should get.
fn fresh_label_kind(
    disk: &Disk,
    settings: &ClearPartSettings,
    profile: &PlatformProfile,
) -> Result<DiskLabelKind> {
    if let Some(kind) = settings.disklabel {
        if kind.is_compatible_with(disk.length) {
            return Ok(kind);
        }
        debug!(
            "{}: requested {} label cannot address the disk, using platform default",
            disk.name, kind
        );
    }
    profile.best_disklabel_for(disk)
}

fn label_unusable(disk: &Disk, kind: DiskLabelKind, profile: &PlatformProfile) -> bool {
    if let Some(required) = profile.platform.required_label_for(disk.transport.as_deref()) {
        return kind != required;
    }
    !profile.disklabel_priority.contains(&kind) || !kind.is_compatible_with(disk.length)
}

/// Replace the label of `disk`, destroying everything on it.
fn reinitialize(
    disk: &mut Disk,
    disk_id: Option<DeviceId>,
    kind: DiskLabelKind,
    tree: &DeviceTree,
    outcome: &mut ClearOutcome,
) {
    let old = disk.label.as_ref().map(|l| l.kind);
    info!(
        "Reinitializing {} with a {} label (was {})",
        disk.name,
        kind,
        old.map_or("none".to_string(), |k| k.to_string())
    );
    if let Some(id) = disk_id {
        outcome.destroyed.extend(tree.descendants(id));
    }
    disk.label = Some(DiskLabel::new(kind, disk.sector_size, disk.length));
    disk.format = None;
    outcome.reinitialized.push((disk.name.clone(), old));
}

/// Apply `settings` to `disks`.
///
/// `boot_disk` must end up with a label the bootloader can live on; it is
/// relabelled when nothing survives on it and rejected otherwise.
pub fn clear_partitions(
    disks: &mut [Disk],
    tree: &DeviceTree,
    settings: &ClearPartSettings,
    profile: &PlatformProfile,
    boot_disk: Option<&str>,
    diag: &mut Diagnostics,
) -> Result<ClearOutcome> {
    let mut outcome = ClearOutcome::default();
    for disk in disks.iter_mut() {
        if !disk.usable() {
            continue;
        }
        let in_scope = settings.policy != ClearPolicy::None
            && (settings.drives.is_empty() || settings.drives.contains(&disk.name));
        let disk_id = tree.find(&disk.name);
        let prefix = partition_prefix(&disk.name);

        let Some(label) = disk.label.as_mut() else {
            // whole-disk format or blank disk
            let cleared =
                in_scope && should_clear(settings, &disk.name, disk.format.as_deref());
            if disk.format.is_none() || cleared {
                let kind = fresh_label_kind(disk, settings, profile)?;
                reinitialize(disk, disk_id, kind, tree, &mut outcome);
            } else {
                debug!(
                    "{} holds {} and is left alone",
                    disk.name,
                    disk.format.as_deref().unwrap_or("data")
                );
            }
            continue;
        };

        if in_scope {
            let mut removed = BTreeSet::new();
            for part in label.partitions.iter().filter(|p| p.exists) {
                if part.part_type == PartType::Extended {
                    continue;
                }
                let name = format!("{}{}", prefix, part.number);
                if should_clear(settings, &name, part.fs_type.as_deref()) {
                    debug!(
                        "clearing {} ({})",
                        name,
                        part.fs_type.as_deref().unwrap_or("no format")
                    );
                    removed.insert(part.number);
                    if let Some(id) = tree.find(&name) {
                        outcome.destroyed.insert(id);
                        outcome.destroyed.extend(tree.descendants(id));
                    }
                }
            }
            label
                .partitions
                .retain(|p| !removed.contains(&p.number) || p.part_type == PartType::Extended);

            let has_logicals = label
                .partitions
                .iter()
                .any(|p| p.part_type == PartType::Logical);
            if !has_logicals && settings.policy != ClearPolicy::None {
                if let Some(ext) = label.extended().filter(|e| e.exists) {
                    let name = format!("{}{}", prefix, ext.number);
                    debug!("removing empty extended partition {}", name);
                    if let Some(id) = tree.find(&name) {
                        outcome.destroyed.insert(id);
                    }
                }
                label.partitions.retain(|p| p.part_type != PartType::Extended);
            }
        }

        let kind = label.kind;
        let empty = label.partitions.is_empty();
        let unusable = label_unusable(disk, kind, profile);
        if (in_scope && settings.initlabel) || (unusable && empty) {
            let kind = fresh_label_kind(disk, settings, profile)?;
            reinitialize(disk, disk_id, kind, tree, &mut outcome);
        } else if unusable {
            diag.warn(format!(
                "{} carries a {} label this platform cannot use and still holds partitions",
                disk.name, kind
            ));
        }
    }

    if let Some(boot) = boot_disk {
        ensure_boot_label(disks, boot, tree, profile, &mut outcome)?;
    }
    Ok(outcome)
}

fn ensure_boot_label(
    disks: &mut [Disk],
    boot: &str,
    tree: &DeviceTree,
    profile: &PlatformProfile,
    outcome: &mut ClearOutcome,
) -> Result<()> {
    let Some(disk) = disks.iter_mut().find(|d| d.name == boot) else {
        return Ok(());
    };
    let Some(label) = &disk.label else {
        return Ok(());
    };
    if profile.boot_label_ok(label.kind) {
        return Ok(());
    }
    if label.partitions.iter().any(|p| p.exists) {
        return Err(LayoutError::PlatformUnsupported(format!(
            "boot disk {} has a {} label, which {} cannot boot from",
            disk.name, label.kind, profile.platform
        )));
    }
    let kind = profile
        .disklabel_priority
        .iter()
        .copied()
        .find(|k| profile.boot_label_ok(*k) && k.is_compatible_with(disk.length))
        .ok_or_else(|| LayoutError::LabelTooSmall {
            disk: disk.name.clone(),
            length: disk.length,
        })?;
    let disk_id = tree.find(&disk.name);
    outcome.reinitialized.retain(|(d, _)| d != &disk.name);
    reinitialize(disk, disk_id, kind, tree, outcome);
    Ok(())
}
