//! Disks and the device tree
//!
//! Devices live in an arena and refer to each other by [`DeviceId`]. Edges
//! point from a device to the devices it is built on (`parents`); children are
//! found by scanning, which is cheap at installer scale.

use crate::disk::detection::partition_prefix;
use crate::disk::disklabel::{DiskLabel, PartType};
use crate::disk::size::{sectors_to_size, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Disk,
    Partition,
    Luks,
    Lvmvg,
    Lvmlv,
    Lvmthinpool,
    Lvmthinlv,
    Mdarray,
    Btrfs,
    Btrfssubvol,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disk => "disk",
            Self::Partition => "partition",
            Self::Luks => "luks/dm-crypt",
            Self::Lvmvg => "lvmvg",
            Self::Lvmlv => "lvmlv",
            Self::Lvmthinpool => "lvmthinpool",
            Self::Lvmthinlv => "lvmthinlv",
            Self::Mdarray => "mdarray",
            Self::Btrfs => "btrfs volume",
            Self::Btrfssubvol => "btrfs subvolume",
        };
        write!(f, "{}", s)
    }
}

/// A block device that can carry a disklabel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    /// Kernel name (e.g., sda, nvme0n1)
    pub name: String,
    pub sector_size: u64,
    pub length: u64,
    pub label: Option<DiskLabel>,
    pub removable: bool,
    pub protected: bool,
    pub media_present: bool,
    /// False for loop devices and other disk-like targets.
    pub is_disk: bool,
    /// Format hidden from the installer (multipath member, firmware RAID member).
    pub hidden: bool,
    pub transport: Option<String>,
    pub model: Option<String>,
    /// Whole-disk format when there is no label.
    pub format: Option<String>,
}

impl Disk {
    pub fn new(name: impl Into<String>, sector_size: u64, size: Size) -> Self {
        Self {
            name: name.into(),
            sector_size,
            length: size.bytes() / sector_size,
            label: None,
            removable: false,
            protected: false,
            media_present: true,
            is_disk: true,
            hidden: false,
            transport: None,
            model: None,
            format: None,
        }
    }

    pub fn with_label(mut self, label: DiskLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn size(&self) -> Size {
        sectors_to_size(self.length, self.sector_size)
    }

    pub fn usable(&self) -> bool {
        self.media_present && !self.protected && !self.hidden
    }

    pub fn partitionable(&self) -> bool {
        self.usable() && self.label.is_some()
    }

    /// Kernel name of partition `number` on this disk.
    pub fn partition_name(&self, number: u32) -> String {
        format!("{}{}", partition_prefix(&self.name), number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub parents: Vec<DeviceId>,
    pub size: Size,
    pub format: Option<String>,
    /// Partition slot number, for partitions.
    pub number: Option<u32>,
    pub part_type: Option<PartType>,
}

/// Arena of pre-existing devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceTree {
    devices: Vec<Device>,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        name: impl Into<String>,
        device_type: DeviceType,
        parents: Vec<DeviceId>,
        size: Size,
        format: Option<String>,
    ) -> DeviceId {
        let id = DeviceId(self.devices.len());
        self.devices.push(Device {
            id,
            name: name.into(),
            device_type,
            parents,
            size,
            format,
            number: None,
            part_type: None,
        });
        id
    }

    /// Register a disk together with the partitions its label already holds.
    pub fn add_disk(&mut self, disk: &Disk) -> DeviceId {
        let disk_id = self.add(
            disk.name.clone(),
            DeviceType::Disk,
            Vec::new(),
            disk.size(),
            disk.format.clone(),
        );
        if let Some(label) = &disk.label {
            for part in label.partitions.iter().filter(|p| p.exists) {
                let id = self.add(
                    disk.partition_name(part.number),
                    DeviceType::Partition,
                    vec![disk_id],
                    sectors_to_size(part.geometry.length(), disk.sector_size),
                    part.fs_type.clone(),
                );
                let dev = &mut self.devices[id.0];
                dev.number = Some(part.number);
                dev.part_type = Some(part.part_type);
            }
        }
        disk_id
    }

    pub fn get(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    pub fn find(&self, name: &str) -> Option<DeviceId> {
        self.devices.iter().find(|d| d.name == name).map(|d| d.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn children(&self, id: DeviceId) -> Vec<DeviceId> {
        self.devices
            .iter()
            .filter(|d| d.parents.contains(&id))
            .map(|d| d.id)
            .collect()
    }

    /// Every device built on top of `id`, breadth first.
    pub fn descendants(&self, id: DeviceId) -> Vec<DeviceId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut work = vec![id];
        while let Some(next) = work.pop() {
            for child in self.children(next) {
                if seen.insert(child) {
                    out.push(child);
                    work.push(child);
                }
            }
        }
        out
    }

    /// Order `ids` so every device comes before all of its ancestors.
    pub fn leaves_first(&self, ids: &BTreeSet<DeviceId>) -> Vec<DeviceId> {
        fn visit(
            tree: &DeviceTree,
            id: DeviceId,
            ids: &BTreeSet<DeviceId>,
            done: &mut BTreeSet<DeviceId>,
            out: &mut Vec<DeviceId>,
        ) {
            if !done.insert(id) {
                return;
            }
            for child in tree.children(id) {
                if ids.contains(&child) {
                    visit(tree, child, ids, done, out);
                }
            }
            out.push(id);
        }

        let mut done = BTreeSet::new();
        let mut out = Vec::new();
        for id in ids {
            visit(self, *id, ids, &mut done, &mut out);
        }
        out
    }
}
