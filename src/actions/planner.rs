//! Action planning
//!
//! Turns a solved layout into the ordered action list: removals first (leaves
//! first, partitions in descending number), new labels, new partitions in
//! allocation order, containers and their volumes, then the boot flag, GPT
//! names and finally swap formats.

use crate::actions::{stable_uuid, Action, PlannedDevice};
use crate::disk::device::{DeviceId, DeviceTree, DeviceType, Disk};
use crate::disk::disklabel::{DiskLabelKind, LabelPartition, PartType};
use crate::disk::formats;
use crate::disk::lvm::{lv_dm_name, LvmToolContext};
use crate::disk::size::{sectors_to_size, Size};
use crate::layout::requests::{ContainerKind, EncryptionSettings, Layout, VolumeRequest};
use crate::partitioning::clear::ClearOutcome;
use crate::partitioning::containers::ContainerPlan;
use crate::platform::PlatformProfile;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Everything the planner reads. Nothing here is mutated.
pub struct PlanContext<'a> {
    pub disks: &'a [Disk],
    pub tree: &'a DeviceTree,
    pub clear: &'a ClearOutcome,
    pub layout: &'a Layout,
    /// Allocation order of `layout.partitions`.
    pub order: &'a [usize],
    pub containers: &'a [ContainerPlan],
    pub profile: &'a PlatformProfile,
    pub encryption: &'a EncryptionSettings,
    pub lvm: &'a LvmToolContext,
    /// Partition request that carries the boot flag.
    pub boot_request: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlannerOutput {
    pub actions: Vec<Action>,
    pub devices: Vec<PlannedDevice>,
}

/// Flag that marks a partition as the one firmware boots from.
pub fn boot_flag(fs_type: &str, label: DiskLabelKind) -> &'static str {
    match (fs_type, label) {
        ("biosboot", _) => "bios_grub",
        ("efi" | "macefi", DiskLabelKind::Gpt) => "esp",
        ("prepboot", _) => "prep",
        (_, DiskLabelKind::Gpt) => "legacy_boot",
        _ => "boot",
    }
}

struct Planner<'a> {
    ctx: &'a PlanContext<'a>,
    out: PlannerOutput,
    /// Deferred so swap is only activated once everything else exists.
    swaps: Vec<Action>,
    /// Request or container name to the device that carries its format.
    carriers: BTreeMap<String, String>,
}

impl<'a> Planner<'a> {
    fn new(ctx: &'a PlanContext<'a>) -> Self {
        Self {
            ctx,
            out: PlannerOutput::default(),
            swaps: Vec::new(),
            carriers: BTreeMap::new(),
        }
    }

    fn push(&mut self, action: Action) {
        debug!("plan: {}", action);
        self.out.actions.push(action);
    }

    fn create_format(
        &mut self,
        device: &str,
        fs_type: &str,
        mountpoint: Option<&str>,
        options: Vec<String>,
    ) {
        let action = Action::CreateFormat {
            device: device.to_string(),
            fs_type: fs_type.to_string(),
            options,
            mountpoint: mountpoint.map(str::to_string),
            uuid: Some(stable_uuid("format", device).to_string()),
            encryption: None,
        };
        if fs_type == "swap" {
            self.swaps.push(action);
        } else {
            self.push(action);
        }
    }

    /// Put LUKS on `backing` and return the name of the opened mapping.
    fn encrypt(&mut self, backing: &str, size: Size) -> String {
        let uuid = stable_uuid("luks", backing);
        let name = format!("luks-{}", uuid);
        self.push(Action::CreateFormat {
            device: backing.to_string(),
            fs_type: "luks".to_string(),
            options: Vec::new(),
            mountpoint: None,
            uuid: Some(uuid.to_string()),
            encryption: Some(self.ctx.encryption.clone()),
        });
        let size = size.saturating_sub(self.ctx.encryption.header_size());
        self.push(Action::CreateDevice {
            name: name.clone(),
            device_type: DeviceType::Luks,
            parents: vec![backing.to_string()],
            size,
            geometry: None,
            part_type: None,
            type_guid: None,
            uuid: None,
            options: Vec::new(),
        });
        let mut dev = PlannedDevice::new(name.clone(), DeviceType::Luks, size);
        dev.parents = vec![backing.to_string()];
        self.out.devices.push(dev);
        name
    }

    fn destroy_existing(&mut self) {
        let ctx = self.ctx;
        let tree = ctx.tree;
        let destroyed = &ctx.clear.destroyed;
        let (partitions, stacked): (BTreeSet<DeviceId>, BTreeSet<DeviceId>) = destroyed
            .iter()
            .partition(|id| tree.get(**id).device_type == DeviceType::Partition);

        let mut partitions: Vec<DeviceId> = partitions.into_iter().collect();
        // descending numbers keep the remaining numbers stable while we go
        partitions.sort_by_key(|id| {
            let dev = tree.get(*id);
            let disk = dev.parents.first().map(|p| tree.get(*p).name.clone());
            (disk, std::cmp::Reverse(dev.number))
        });

        for id in tree.leaves_first(&stacked).into_iter().chain(partitions) {
            let dev = tree.get(id);
            if let Some(fs) = &dev.format {
                self.push(Action::DestroyFormat {
                    device: dev.name.clone(),
                    fs_type: Some(fs.clone()),
                });
            }
            self.push(Action::DestroyDevice {
                name: dev.name.clone(),
                device_type: dev.device_type,
            });
        }
    }

    fn relabel_disks(&mut self) {
        let ctx = self.ctx;
        for (disk_name, old) in &ctx.clear.reinitialized {
            let Some(disk) = ctx.disks.iter().find(|d| &d.name == disk_name) else {
                continue;
            };
            let Some(label) = &disk.label else { continue };
            let old_format = match old {
                Some(_) => Some("disklabel".to_string()),
                None => ctx
                    .tree
                    .find(disk_name)
                    .and_then(|id| ctx.tree.get(id).format.clone()),
            };
            if let Some(fs) = old_format {
                self.push(Action::DestroyFormat {
                    device: disk_name.clone(),
                    fs_type: Some(fs),
                });
            }
            self.push(Action::CreateFormat {
                device: disk_name.clone(),
                fs_type: "disklabel".to_string(),
                options: vec![format!("type={}", label.kind)],
                mountpoint: None,
                uuid: (label.kind == DiskLabelKind::Gpt)
                    .then(|| stable_uuid("disklabel", disk_name).to_string()),
                encryption: None,
            });
        }
    }

    fn create_partition(&mut self, disk: &Disk, part: &LabelPartition) -> String {
        let Some(label) = &disk.label else {
            return String::new();
        };
        let name = disk.partition_name(part.number);
        let size = sectors_to_size(part.geometry.length(), disk.sector_size);
        let ctx = self.ctx;
        let req = part.request.map(|i| &ctx.layout.partitions[i]);
        let gpt = label.kind == DiskLabelKind::Gpt && part.part_type != PartType::Extended;
        let type_guid = req.filter(|_| gpt).map(|r| {
            formats::type_guid_for(&r.fs_type, r.mountpoint.as_deref(), ctx.profile.arch)
                .to_string()
        });
        self.push(Action::CreateDevice {
            name: name.clone(),
            device_type: DeviceType::Partition,
            parents: vec![disk.name.clone()],
            size,
            geometry: Some(part.geometry),
            part_type: Some(part.part_type),
            type_guid,
            uuid: gpt.then(|| stable_uuid("partition", &name).to_string()),
            options: Vec::new(),
        });

        let mut dev = PlannedDevice::new(name.clone(), DeviceType::Partition, size);
        dev.parents = vec![disk.name.clone()];
        dev.disk = Some(disk.name.clone());
        dev.geometry = Some(part.geometry);
        dev.number = Some(part.number);
        if let Some(r) = req {
            dev.request = Some(r.name.clone());
            dev.fs_type = Some(r.fs_type.clone());
            dev.mountpoint = r.mountpoint.clone();
            dev.encrypted = r.encrypted;
        }
        self.out.devices.push(dev);
        name
    }

    fn partitions(&mut self) {
        let ctx = self.ctx;
        let mut extended_done = BTreeSet::new();
        for &idx in ctx.order {
            let req = &ctx.layout.partitions[idx];
            let Some(disk) = ctx
                .disks
                .iter()
                .find(|d| req.disk.as_deref() == Some(d.name.as_str()))
            else {
                continue;
            };
            let Some(label) = &disk.label else { continue };
            let Some(part) = label.partition_for_request(idx) else {
                continue;
            };

            if part.part_type == PartType::Logical && extended_done.insert(disk.name.clone()) {
                if let Some(ext) = label.extended().filter(|e| !e.exists) {
                    self.create_partition(disk, ext);
                }
            }

            let name = self.create_partition(disk, part);
            let carrier = if req.encrypted {
                let size = sectors_to_size(part.geometry.length(), disk.sector_size);
                self.encrypt(&name, size)
            } else {
                name
            };
            self.create_format(&carrier, &req.fs_type, req.mountpoint.as_deref(), Vec::new());
            self.carriers.insert(req.name.clone(), carrier);
        }
    }

    fn parents_of(&self, plan: &ContainerPlan) -> Vec<String> {
        plan.members
            .iter()
            .map(|m| self.carriers.get(m).cloned().unwrap_or_else(|| m.clone()))
            .collect()
    }

    fn create_container_device(
        &mut self,
        plan: &ContainerPlan,
        device_type: DeviceType,
        options: Vec<String>,
    ) {
        let parents = self.parents_of(plan);
        self.push(Action::CreateDevice {
            name: plan.name.clone(),
            device_type,
            parents: parents.clone(),
            size: plan.size,
            geometry: None,
            part_type: None,
            type_guid: None,
            uuid: Some(stable_uuid("container", &plan.name).to_string()),
            options,
        });
        let mut dev = PlannedDevice::new(plan.name.clone(), device_type, plan.size);
        dev.parents = parents;
        dev.request = Some(plan.name.clone());
        dev.level = plan.level.clone();
        self.out.devices.push(dev);
    }

    fn md_array(&mut self, plan: &ContainerPlan) {
        let ctx = self.ctx;
        let options = plan
            .level
            .iter()
            .map(|l| format!("level={}", l))
            .collect();
        self.create_container_device(plan, DeviceType::Mdarray, options);

        let req = ctx.layout.container(&plan.name);
        let carrier = if req.is_some_and(|r| r.encrypted) {
            self.encrypt(&plan.name, plan.size)
        } else {
            plan.name.clone()
        };
        let outer = ctx
            .layout
            .containers
            .iter()
            .find(|c| c.members.contains(&plan.name));
        match (outer.map(|c| c.kind), req) {
            (Some(ContainerKind::Lvm), _) => {
                self.create_format(&carrier, "lvmpv", None, ctx.lvm.command_args())
            }
            (Some(_), _) => self.create_format(&carrier, "btrfs", None, Vec::new()),
            (None, Some(r)) => {
                if let Some(fs) = &r.fs_type {
                    self.create_format(&carrier, fs, r.mountpoint.as_deref(), Vec::new());
                }
            }
            (None, None) => {}
        }
        if let Some(dev) = self.out.devices.iter_mut().rev().find(|d| d.name == plan.name) {
            dev.fs_type = req.and_then(|r| r.fs_type.clone());
            dev.mountpoint = req.and_then(|r| r.mountpoint.clone());
        }
        self.carriers.insert(plan.name.clone(), carrier);
    }

    fn logical_volume(&mut self, vg: &str, vol: &VolumeRequest) {
        let name = lv_dm_name(vg, &vol.name);
        let (device_type, parent) = if vol.thin {
            let pool = vol.pool.as_deref().unwrap_or_default();
            (DeviceType::Lvmthinlv, lv_dm_name(vg, pool))
        } else if vol.thin_pool {
            (DeviceType::Lvmthinpool, vg.to_string())
        } else {
            (DeviceType::Lvmlv, vg.to_string())
        };
        let size = vol.size.unwrap_or(vol.base_size);
        self.push(Action::CreateDevice {
            name: name.clone(),
            device_type,
            parents: vec![parent.clone()],
            size,
            geometry: None,
            part_type: None,
            type_guid: None,
            uuid: None,
            options: Vec::new(),
        });
        let mut dev = PlannedDevice::new(name.clone(), device_type, size);
        dev.parents = vec![parent];
        dev.request = Some(vol.name.clone());
        dev.encrypted = vol.encrypted;
        if !vol.thin_pool {
            dev.fs_type = Some(vol.fs_type.clone());
            dev.mountpoint = vol.mountpoint.clone();
        }
        self.out.devices.push(dev);

        if vol.thin_pool {
            return;
        }
        let carrier = if vol.encrypted {
            self.encrypt(&name, size)
        } else {
            name
        };
        self.create_format(&carrier, &vol.fs_type, vol.mountpoint.as_deref(), Vec::new());
    }

    fn volume_group(&mut self, plan: &ContainerPlan) {
        let ctx = self.ctx;
        let mut options: Vec<String> = plan
            .pe_size
            .iter()
            .map(|pe| format!("pe_size={}", pe))
            .collect();
        options.extend(ctx.lvm.command_args());
        self.create_container_device(plan, DeviceType::Lvmvg, options);

        let volumes: Vec<&VolumeRequest> = ctx
            .layout
            .volumes
            .iter()
            .filter(|v| v.container == plan.name)
            .collect();
        // pools must exist before their thin volumes
        for vol in volumes.iter().filter(|v| !v.thin) {
            self.logical_volume(&plan.name, vol);
        }
        for vol in volumes.iter().filter(|v| v.thin) {
            self.logical_volume(&plan.name, vol);
        }
    }

    fn btrfs_volume(&mut self, plan: &ContainerPlan) {
        let ctx = self.ctx;
        let mut options = Vec::new();
        if let Some(l) = &plan.level {
            options.push(format!("data={}", l));
        }
        if let Some(l) = &plan.metadata_level {
            options.push(format!("metadata={}", l));
        }
        self.create_container_device(plan, DeviceType::Btrfs, options.clone());
        let mountpoint = ctx
            .layout
            .container(&plan.name)
            .and_then(|c| c.mountpoint.clone());
        self.create_format(&plan.name, "btrfs", mountpoint.as_deref(), options);

        for vol in ctx.layout.volumes.iter().filter(|v| v.container == plan.name) {
            let size = vol.size.unwrap_or(vol.base_size);
            self.push(Action::CreateDevice {
                name: vol.name.clone(),
                device_type: DeviceType::Btrfssubvol,
                parents: vec![plan.name.clone()],
                size,
                geometry: None,
                part_type: None,
                type_guid: None,
                uuid: None,
                options: Vec::new(),
            });
            let mut dev = PlannedDevice::new(vol.name.clone(), DeviceType::Btrfssubvol, size);
            dev.parents = vec![plan.name.clone()];
            dev.request = Some(vol.name.clone());
            dev.fs_type = Some("btrfs".to_string());
            dev.mountpoint = vol.mountpoint.clone();
            self.out.devices.push(dev);
            self.create_format(
                &vol.name,
                "btrfs",
                vol.mountpoint.as_deref(),
                vec![format!("subvol={}", vol.name)],
            );
        }
    }

    fn containers(&mut self) {
        let ctx = self.ctx;
        let md = ctx.containers.iter().filter(|c| c.kind == ContainerKind::Md);
        let rest = ctx.containers.iter().filter(|c| c.kind != ContainerKind::Md);
        for plan in md.chain(rest) {
            match plan.kind {
                ContainerKind::Md => self.md_array(plan),
                ContainerKind::Lvm => self.volume_group(plan),
                ContainerKind::Btrfs => self.btrfs_volume(plan),
            }
        }
    }

    fn new_partition(&self, idx: usize) -> Option<(&'a Disk, &'a LabelPartition)> {
        let req = &self.ctx.layout.partitions[idx];
        let disk = self
            .ctx
            .disks
            .iter()
            .find(|d| req.disk.as_deref() == Some(d.name.as_str()))?;
        let part = disk.label.as_ref()?.partition_for_request(idx)?;
        Some((disk, part))
    }

    fn boot_flag(&mut self) {
        let ctx = self.ctx;
        let Some(idx) = ctx.boot_request else { return };
        let Some((disk, part)) = self.new_partition(idx) else {
            return;
        };
        let Some(label) = &disk.label else { return };
        let fs = &ctx.layout.partitions[idx].fs_type;
        self.push(Action::SetPartitionFlag {
            device: disk.partition_name(part.number),
            flag: boot_flag(fs, label.kind).to_string(),
        });
    }

    fn partition_names(&mut self) {
        let ctx = self.ctx;
        for &idx in ctx.order {
            let Some((disk, part)) = self.new_partition(idx) else {
                continue;
            };
            if !disk.label.as_ref().is_some_and(|l| l.kind.supports_names()) {
                continue;
            }
            let req = &ctx.layout.partitions[idx];
            self.push(Action::SetPartitionName {
                device: disk.partition_name(part.number),
                name: formats::partition_name_for(&req.fs_type, req.mountpoint.as_deref()),
            });
        }
    }
}

/// Emit the ordered action list for a solved layout.
pub fn plan_actions(ctx: &PlanContext<'_>) -> PlannerOutput {
    let mut planner = Planner::new(ctx);
    planner.destroy_existing();
    planner.relabel_disks();
    planner.partitions();
    planner.containers();
    planner.boot_flag();
    planner.partition_names();
    let swaps = std::mem::take(&mut planner.swaps);
    planner.out.actions.extend(swaps);
    planner.out
}
