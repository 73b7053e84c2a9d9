//! The layout solver
//!
//! One call takes the disks, the pre-existing devices and what the caller
//! asked for, and returns an ordered action list plus the residual free space
//! on every disk. Inputs are copied; nothing outside the returned [`Plan`] is
//! changed and no device is touched.

use crate::actions::{plan_actions, stable_uuid, Action, PlanContext, PlannedDevice};
use crate::disk::device::{DeviceId, DeviceTree, DeviceType, Disk};
use crate::disk::disklabel::DiskLabelKind;
use crate::disk::freespace::{largest_free, total_free};
use crate::disk::lvm::LvmToolContext;
use crate::disk::size::{sectors_to_size, Size};
use crate::layout::ordering::partition_order;
use crate::layout::requests::{
    ContainerKind, EncryptionSettings, Layout, PartitionRequest, SizeSetSpec,
};
use crate::layout::resolver::{resolve, AutopartOptions, ResolverContext, IMPLICIT_MEMBER_SIZE};
use crate::partitioning::allocator::allocate_partitions;
use crate::partitioning::clear::{clear_partitions, ClearOutcome, ClearPartSettings};
use crate::partitioning::containers::{implicit_size_sets, size_containers, ContainerPlan};
use crate::partitioning::growth::{build_disk_chunks, grow_chunks, relayout};
use crate::partitioning::numbering::number_partitions;
use crate::partitioning::sizesets::{manage_size_sets, SizeSet};
use crate::platform::{
    InstallClass, InstallClassProfile, Platform, PlatformProfile, STAGE1_WEIGHT,
};
use crate::utils::error::{Diagnostics, LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A stacked device that already exists (VG, LV, md array, LUKS mapping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingDevice {
    pub name: String,
    pub device_type: DeviceType,
    /// Names of the devices this one is built on; they must be listed first.
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub format: Option<String>,
}

/// Everything one solve reads.
#[derive(Debug, Clone)]
pub struct SolveInput {
    pub platform: PlatformProfile,
    pub class: InstallClassProfile,
    pub disks: Vec<Disk>,
    pub existing: Vec<ExistingDevice>,
    pub ram: Size,
    /// Automatic partitioning; `None` builds only `layout`.
    pub autopart: Option<AutopartOptions>,
    /// Caller-supplied requests, laid out alongside autopart when both exist.
    pub layout: Layout,
    pub clearpart: ClearPartSettings,
    pub boot_disk: Option<String>,
    pub ignored_disks: Vec<String>,
    /// When non-empty, only these disks are used.
    pub only_use: Vec<String>,
    pub encryption: EncryptionSettings,
}

impl SolveInput {
    /// Default autopart on `disks` for `platform`.
    pub fn new(platform: Platform, disks: Vec<Disk>, ram: Size) -> Self {
        Self {
            platform: platform.profile(),
            class: InstallClass::Default.profile(),
            disks,
            existing: Vec::new(),
            ram,
            autopart: Some(AutopartOptions::default()),
            layout: Layout::default(),
            clearpart: ClearPartSettings::default(),
            boot_disk: None,
            ignored_disks: Vec::new(),
            only_use: Vec::new(),
            encryption: EncryptionSettings::default(),
        }
    }

    /// Build `layout` instead of an automatic layout.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.autopart = None;
        self.layout = layout;
        self
    }
}

/// The result of a successful solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub platform: Platform,
    pub boot_disk: String,
    pub actions: Vec<Action>,
    pub devices: Vec<PlannedDevice>,
    pub containers: Vec<ContainerPlan>,
    /// Final requests, with placement and sizes filled in.
    pub layout: Layout,
    pub partition_numbers: BTreeMap<String, u32>,
    pub disklabels: BTreeMap<String, DiskLabelKind>,
    pub free_space: BTreeMap<String, Size>,
    pub diagnostics: Diagnostics,
    /// Candidate disks with their final labels.
    #[serde(skip)]
    pub disks: Vec<Disk>,
}

impl Plan {
    pub fn total_free(&self) -> Size {
        self.free_space.values().copied().sum()
    }

    /// Planned device realising the request `name`.
    pub fn device_for(&self, name: &str) -> Option<&PlannedDevice> {
        self.devices
            .iter()
            .find(|d| d.request.as_deref() == Some(name))
    }
}

/// A solve outcome that never fails: errors land in `diagnostics.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub plan: Option<Plan>,
    pub diagnostics: Diagnostics,
}

pub fn solve(input: &SolveInput) -> Result<Plan> {
    let mut diag = Diagnostics::default();
    solve_with(input, &mut diag)
}

pub fn report(input: &SolveInput) -> Report {
    let mut diagnostics = Diagnostics::default();
    match solve_with(input, &mut diagnostics) {
        Ok(plan) => Report {
            plan: Some(plan),
            diagnostics,
        },
        Err(err) => {
            diagnostics.error(&err);
            Report {
                plan: None,
                diagnostics,
            }
        }
    }
}

/// Solve, recording warnings in `diag` even when the solve fails.
pub fn solve_with(input: &SolveInput, diag: &mut Diagnostics) -> Result<Plan> {
    let profile = &input.platform;
    profile.validate()?;
    info!("Solving storage layout for {}", profile.platform);

    let mut disks = candidate_disks(input, diag);
    if disks.is_empty() {
        return Err(LayoutError::NoUsableDisks);
    }
    let tree = build_tree(&input.disks, &input.existing)?;
    let boot_disk = pick_boot_disk(input, &disks)?;
    debug!("boot disk is {}", boot_disk);

    let outcome = clear_partitions(
        &mut disks,
        &tree,
        &input.clearpart,
        profile,
        Some(&boot_disk),
        diag,
    )?;
    let disk_space = available_space(&disks, &outcome);
    debug!("{} of disk space available", disk_space);

    let candidate_names: BTreeSet<&str> = disks.iter().map(|d| d.name.as_str()).collect();
    let mut lvm = LvmToolContext::new();
    for vg in foreign_vgs(&tree, &candidate_names) {
        debug!("volume group {} spans a disk outside the solve", vg);
        lvm.blacklist_vg(&vg);
    }

    let mut layout = match &input.autopart {
        Some(opts) => {
            let taken = surviving_names(&tree, &outcome);
            let container_name = lvm.suggest_vg_name(input.class.vg_name, &taken);
            let member_disks = member_disks(&disks, &boot_disk);
            let mut opts = opts.clone();
            opts.exclude_mountpoints.extend(
                input.layout.mountpoints().into_iter().map(str::to_string),
            );
            let ctx = ResolverContext {
                platform: profile,
                class: &input.class,
                ram: input.ram,
                disk_space,
                disks: &member_disks,
                container_name,
            };
            let mut layout = resolve(&opts, &ctx, diag)?;
            merge_manual(&mut layout, &input.layout, disk_space);
            layout
        }
        None => {
            let mut layout = Layout::default();
            merge_manual(&mut layout, &input.layout, disk_space);
            add_stage1(&mut layout, profile);
            layout
        }
    };
    if layout.is_empty() {
        return Err(LayoutError::RequestConflicts(
            "nothing to lay out".to_string(),
        ));
    }

    for req in layout.partitions.iter_mut().filter(|r| r.weight == 0) {
        req.weight = profile.weight(&req.fs_type, req.mountpoint.as_deref());
    }
    let boot_label = disks
        .iter()
        .find(|d| d.name == boot_disk)
        .and_then(|d| d.label.as_ref())
        .map(|l| l.kind);
    let stage1_end = profile.stage1.as_ref().and_then(|s| s.max_end);
    place_stage1(&mut layout, &boot_disk, boot_label, stage1_end);
    layout.validate()?;

    let order = partition_order(&layout.partitions);
    allocate_partitions(&mut disks, &mut layout.partitions, &order, Some(&boot_disk))?;

    info!("Growing partitions");
    let mut chunks = build_disk_chunks(&disks, &layout.partitions, &order);
    grow_chunks(&mut chunks);
    let mut specs: Vec<SizeSetSpec> = implicit_size_sets(&layout, &input.encryption)?;
    specs.extend(layout.size_sets.iter().cloned());
    let sets = specs
        .iter()
        .map(|spec| SizeSet::from_spec(spec, &layout.partitions))
        .collect::<Result<Vec<_>>>()?;
    manage_size_sets(&sets, &mut chunks)?;
    relayout(&mut disks, &mut layout.partitions, &chunks)?;

    let sizes = partition_sizes(&disks, &layout.partitions);
    let containers = size_containers(&mut layout, &sizes, &input.encryption, diag)?;
    let partition_numbers = number_partitions(&mut disks, &layout.partitions, diag);
    allow_members(&mut lvm, &layout, &disks, &partition_numbers);

    let boot_request = boot_request(&layout, &disks, &boot_disk);
    let output = plan_actions(&PlanContext {
        disks: &disks,
        tree: &tree,
        clear: &outcome,
        layout: &layout,
        order: &order,
        containers: &containers,
        profile,
        encryption: &input.encryption,
        lvm: &lvm,
        boot_request,
    });

    let mut free_space = BTreeMap::new();
    let mut disklabels = BTreeMap::new();
    for disk in &disks {
        if let Some(label) = &disk.label {
            free_space.insert(disk.name.clone(), total_free(label));
            disklabels.insert(disk.name.clone(), label.kind);
        }
    }
    info!(
        "Planned {} actions, {} left unallocated",
        output.actions.len(),
        free_space.values().copied().sum::<Size>()
    );

    Ok(Plan {
        platform: profile.platform,
        boot_disk,
        actions: output.actions,
        devices: output.devices,
        containers,
        layout,
        partition_numbers,
        disklabels,
        free_space,
        diagnostics: diag.clone(),
        disks,
    })
}

/// Usable disks that are neither ignored nor excluded by `only_use`.
fn candidate_disks(input: &SolveInput, diag: &mut Diagnostics) -> Vec<Disk> {
    let mut disks: Vec<Disk> = input
        .disks
        .iter()
        .filter(|d| {
            if input.ignored_disks.contains(&d.name) {
                debug!("{} is ignored", d.name);
                return false;
            }
            if !input.only_use.is_empty() && !input.only_use.contains(&d.name) {
                debug!("{} is not in the disk selection", d.name);
                return false;
            }
            if !d.usable() {
                diag.warn(format!("{} cannot be used for installation", d.name));
                return false;
            }
            true
        })
        .cloned()
        .collect();
    disks.sort_by(|a, b| a.name.cmp(&b.name));
    disks
}

fn build_tree(disks: &[Disk], existing: &[ExistingDevice]) -> Result<DeviceTree> {
    let mut tree = DeviceTree::new();
    for disk in disks {
        tree.add_disk(disk);
    }
    for dev in existing {
        let parents = dev
            .parents
            .iter()
            .map(|p| {
                tree.find(p).ok_or_else(|| {
                    LayoutError::DeviceNotFound(format!("{} (parent of {})", p, dev.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tree.add(
            dev.name.clone(),
            dev.device_type,
            parents,
            dev.size,
            dev.format.clone(),
        );
    }
    Ok(tree)
}

fn pick_boot_disk(input: &SolveInput, disks: &[Disk]) -> Result<String> {
    match &input.boot_disk {
        Some(name) => disks
            .iter()
            .find(|d| &d.name == name)
            .map(|d| d.name.clone())
            .ok_or_else(|| LayoutError::DeviceNotFound(format!("boot disk {}", name))),
        None => disks
            .first()
            .map(|d| d.name.clone())
            .ok_or(LayoutError::NoUsableDisks),
    }
}

/// Full size of reinitialised disks plus the free space of every other one.
fn available_space(disks: &[Disk], outcome: &ClearOutcome) -> Size {
    disks
        .iter()
        .map(|d| match &d.label {
            _ if outcome.is_reinitialized(&d.name) => d.size(),
            Some(label) => total_free(label),
            None => Size::ZERO,
        })
        .sum()
}

/// Disks `id` ultimately sits on.
fn ancestor_disks(tree: &DeviceTree, id: DeviceId) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut work = vec![id];
    let mut seen = BTreeSet::new();
    while let Some(next) = work.pop() {
        if !seen.insert(next) {
            continue;
        }
        let dev = tree.get(next);
        if dev.device_type == DeviceType::Disk {
            out.insert(dev.name.clone());
        }
        work.extend(dev.parents.iter().copied());
    }
    out
}

/// Existing VGs with a physical volume outside the candidate disks.
fn foreign_vgs(tree: &DeviceTree, candidates: &BTreeSet<&str>) -> Vec<String> {
    tree.iter()
        .filter(|d| d.device_type == DeviceType::Lvmvg)
        .filter(|d| {
            ancestor_disks(tree, d.id)
                .iter()
                .any(|disk| !candidates.contains(disk.as_str()))
        })
        .map(|d| d.name.clone())
        .collect()
}

/// Container names still in use once clearing is done.
fn surviving_names(tree: &DeviceTree, outcome: &ClearOutcome) -> BTreeSet<String> {
    tree.iter()
        .filter(|d| matches!(d.device_type, DeviceType::Lvmvg | DeviceType::Btrfs))
        .filter(|d| !outcome.destroyed.contains(&d.id))
        .map(|d| d.name.clone())
        .collect()
}

/// Disks with room for an implicit member partition, boot disk first.
fn member_disks(disks: &[Disk], boot_disk: &str) -> Vec<String> {
    let mut out: Vec<&Disk> = disks
        .iter()
        .filter(|d| d.partitionable())
        .filter(|d| {
            d.label.as_ref().and_then(largest_free).is_some_and(|r| {
                r.size(d.sector_size) >= IMPLICIT_MEMBER_SIZE
            })
        })
        .collect();
    out.sort_by_key(|d| (d.name != boot_disk, d.name.clone()));
    out.into_iter().map(|d| d.name.clone()).collect()
}

/// Append the caller's requests, skipping those that need more disk space
/// than there is.
fn merge_manual(layout: &mut Layout, manual: &Layout, disk_space: Size) {
    let fits = |required: Size, label: &str| {
        if required > Size::ZERO && disk_space < required {
            debug!(
                "dropping {}: needs {} of disk space, have {}",
                label, required, disk_space
            );
            return false;
        }
        true
    };
    layout.partitions.extend(
        manual
            .partitions
            .iter()
            .filter(|p| fits(p.required_space, p.label()))
            .cloned(),
    );
    layout.containers.extend(manual.containers.iter().cloned());
    layout.volumes.extend(
        manual
            .volumes
            .iter()
            .filter(|v| fits(v.required_space, v.label()))
            .cloned(),
    );
    layout.size_sets.extend(manual.size_sets.iter().cloned());
}

/// Schedule the platform's firmware partition unless the layout has one.
fn add_stage1(layout: &mut Layout, profile: &PlatformProfile) {
    let Some(stage1) = &profile.stage1_partition else {
        return;
    };
    let present = layout
        .partitions
        .iter()
        .any(|p| p.fs_type == stage1.fs_type && p.mountpoint == stage1.mountpoint);
    if !present {
        debug!("adding {} for the bootloader", stage1.label());
        layout.partitions.push(stage1.clone());
    }
}

/// Pin firmware partitions to the boot disk and below the firmware's reach.
/// BIOS boot partitions only make sense on GPT.
fn place_stage1(
    layout: &mut Layout,
    boot_disk: &str,
    boot_label: Option<DiskLabelKind>,
    max_end: Option<Size>,
) {
    layout.partitions.retain(|p| {
        let keep = p.fs_type != "biosboot" || boot_label == Some(DiskLabelKind::Gpt);
        if !keep {
            debug!("{} has no GPT label, dropping {}", boot_disk, p.label());
        }
        keep
    });
    for req in layout
        .partitions
        .iter_mut()
        .filter(|r| r.weight >= STAGE1_WEIGHT)
    {
        if req.required_disks.is_empty() {
            req.required_disks = vec![boot_disk.to_string()];
        }
        if req.max_end.is_none() {
            req.max_end = max_end;
        }
    }
}

fn partition_sizes(disks: &[Disk], requests: &[PartitionRequest]) -> BTreeMap<String, Size> {
    requests
        .iter()
        .filter_map(|r| {
            let disk = disks.iter().find(|d| Some(&d.name) == r.disk.as_ref())?;
            let geometry = r.geometry?;
            Some((
                r.name.clone(),
                sectors_to_size(geometry.length(), disk.sector_size),
            ))
        })
        .collect()
}

/// Restrict LVM commands to the devices the new volume groups are built on.
fn allow_members(
    lvm: &mut LvmToolContext,
    layout: &Layout,
    disks: &[Disk],
    numbers: &BTreeMap<String, u32>,
) {
    for c in layout
        .containers
        .iter()
        .filter(|c| c.kind == ContainerKind::Lvm)
    {
        for member in &c.members {
            let Some(req) = layout.partition(member) else {
                // md array member
                lvm.allow_device(member);
                continue;
            };
            let (Some(disk), Some(n)) = (
                disks.iter().find(|d| Some(&d.name) == req.disk.as_ref()),
                numbers.get(member),
            ) else {
                continue;
            };
            let name = disk.partition_name(*n);
            if req.encrypted {
                lvm.allow_device(&format!("mapper/luks-{}", stable_uuid("luks", &name)));
            } else {
                lvm.allow_device(&name);
            }
        }
    }
}

/// Partition that gets the boot flag: the firmware partition, or on msdos
/// labels /boot (falling back to /).
fn boot_request(layout: &Layout, disks: &[Disk], boot_disk: &str) -> Option<usize> {
    let on_boot = |r: &PartitionRequest| r.disk.as_deref() == Some(boot_disk);
    if let Some(idx) = layout
        .partitions
        .iter()
        .position(|r| r.weight >= STAGE1_WEIGHT && on_boot(r))
    {
        return Some(idx);
    }
    let msdos = disks
        .iter()
        .find(|d| d.name == boot_disk)
        .and_then(|d| d.label.as_ref())
        .is_some_and(|l| l.kind == DiskLabelKind::Msdos);
    if !msdos {
        return None;
    }
    ["/boot", "/"].iter().find_map(|mp| {
        layout
            .partitions
            .iter()
            .position(|r| on_boot(r) && r.mountpoint.as_deref() == Some(*mp))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disklabel::{DiskLabel, Geometry, LabelPartition, PartType};
    use crate::layout::requests::Scheme;

    fn disk(name: &str, gib: u64) -> Disk {
        Disk::new(name, 512, Size::gib(gib))
    }

    fn msdos_disk(name: &str, gib: u64, parts: &[(u64, u64, u32)]) -> Disk {
        let d = disk(name, gib);
        let mut label = DiskLabel::new(DiskLabelKind::Msdos, 512, d.length);
        for &(start, len, number) in parts {
            label.add_partition(LabelPartition {
                number,
                geometry: Geometry::from_length(start, len),
                part_type: PartType::Normal,
                request: None,
                exists: true,
                fs_type: Some("ext4".to_string()),
            });
        }
        d.with_label(label)
    }

    fn plain(mut input: SolveInput) -> SolveInput {
        input.autopart = Some(AutopartOptions {
            scheme: Some(Scheme::Plain),
            ..AutopartOptions::default()
        });
        input
    }

    fn geometry(plan: &Plan, request: &str) -> Geometry {
        plan.layout.partition(request).unwrap().geometry.unwrap()
    }

    fn size_of(plan: &Plan, request: &str) -> Size {
        plan.device_for(request).unwrap().size
    }

    /// Checks that hold for every plan.
    fn assert_well_formed(plan: &Plan) {
        for disk in &plan.disks {
            let Some(label) = &disk.label else { continue };
            let parts = &label.partitions;
            for pair in parts.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                let nested = a.part_type == PartType::Extended && b.part_type == PartType::Logical;
                assert!(
                    nested || a.geometry.end < b.geometry.start,
                    "{} overlaps on {}",
                    b.geometry,
                    disk.name
                );
            }
            let ext = label.extended();
            for p in parts.iter().filter(|p| !p.exists) {
                assert!(label.alignment.is_aligned(p.geometry.start), "{}", p.geometry);
                assert!(label.is_end_aligned(p.geometry.end), "{}", p.geometry);
                assert!(p.geometry.start <= label.max_partition_start_sector());
                if p.part_type == PartType::Logical {
                    let ext = ext.unwrap().geometry;
                    assert!(ext.start < p.geometry.start && p.geometry.end <= ext.end);
                }
            }
        }
        for req in &plan.layout.partitions {
            if let (Some(max), Some(dev)) = (req.max_size, plan.device_for(&req.name)) {
                assert!(dev.size <= max, "{} exceeds its maximum", req.name);
            }
        }
    }

    #[test]
    fn plain_autopart_on_one_bios_disk() {
        let input = plain(SolveInput::new(
            Platform::X86Bios,
            vec![disk("sda", 20)],
            Size::gib(4),
        ));
        let plan = solve(&input).unwrap();
        assert_well_formed(&plan);

        assert_eq!(plan.disklabels["sda"], DiskLabelKind::Gpt);
        let biosboot = geometry(&plan, "biosboot");
        assert_eq!(biosboot.start, 2048);
        assert_eq!(biosboot.length(), 2048);
        let boot = geometry(&plan, "/boot");
        assert_eq!(boot.start, biosboot.end + 1);
        assert_eq!(size_of(&plan, "/boot"), Size::gib(1));
        assert_eq!(size_of(&plan, "swap"), Size::gib(4));
        assert_eq!(size_of(&plan, "/"), Size::mib(15357));
        assert!(plan.layout.partition("/home").is_none());
        assert_eq!(plan.free_space["sda"], Size::ZERO);

        assert!(plan.actions.iter().any(|a| matches!(
            a,
            Action::SetPartitionFlag { device, flag } if device == "sda1" && flag == "bios_grub"
        )));
        let last = plan.actions.last().unwrap();
        assert!(matches!(last, Action::CreateFormat { fs_type, .. } if fs_type == "swap"));
    }

    #[test]
    fn lvm_autopart_on_one_efi_disk() {
        let input = SolveInput::new(Platform::X86Efi, vec![disk("sda", 50)], Size::gib(8));
        let plan = solve(&input).unwrap();
        assert_well_formed(&plan);

        assert_eq!(size_of(&plan, "/boot/efi"), Size::mib(200));
        assert_eq!(size_of(&plan, "/boot"), Size::gib(1));
        assert_eq!(plan.containers.len(), 1);
        let vg = &plan.containers[0];
        assert_eq!(vg.kind, ContainerKind::Lvm);
        assert_eq!(vg.name, "vg0");
        assert_eq!(vg.members, vec!["pv.sda".to_string()]);

        let volume = |mp: &str| {
            plan.layout
                .volumes
                .iter()
                .find(|v| v.mountpoint.as_deref() == Some(mp))
                .unwrap()
                .size
                .unwrap()
        };
        let swap = plan
            .layout
            .volumes
            .iter()
            .find(|v| v.fs_type == "swap")
            .unwrap();
        assert_eq!(swap.size, Some(Size::gib(4)));
        assert!(volume("/") > Size::gib(1) && volume("/") <= Size::gib(50));
        assert!(volume("/home") > Size::mib(500));

        let flag = plan.actions.iter().find_map(|a| match a {
            Action::SetPartitionFlag { device, flag } => Some((device.as_str(), flag.as_str())),
            _ => None,
        });
        assert_eq!(flag, Some(("sda1", "esp")));
    }

    #[test]
    fn two_msdos_disks_cleared() {
        let mut input = plain(SolveInput::new(
            Platform::X86Bios,
            vec![
                msdos_disk("sda", 10, &[(2048, 2048 * 1024, 1)]),
                msdos_disk("sdb", 10, &[(2048, 2048 * 1024, 1)]),
            ],
            Size::gib(2),
        ));
        input.clearpart.policy = crate::partitioning::ClearPolicy::All;
        let plan = solve(&input).unwrap();
        assert_well_formed(&plan);

        assert_eq!(plan.disklabels["sda"], DiskLabelKind::Msdos);
        assert!(plan.layout.partition("biosboot").is_none());
        let disk_of = |name: &str| plan.layout.partition(name).unwrap().disk.clone().unwrap();
        assert_eq!(disk_of("/boot"), "sda");
        assert_eq!(disk_of("swap"), "sda");
        assert_eq!(disk_of("/"), "sdb");
        assert_eq!(size_of(&plan, "swap"), Size::gib(2));
        // 20 GiB is short of the 50 GiB /home asks for
        assert!(plan.layout.partition("/home").is_none());

        let first_create = plan
            .actions
            .iter()
            .position(|a| !a.is_destructive())
            .unwrap();
        assert!(plan.actions[first_create..].iter().all(|a| !a.is_destructive()));
        assert!(plan.actions[..first_create]
            .iter()
            .any(|a| matches!(a, Action::DestroyDevice { name, .. } if name == "sdb1")));
        assert!(plan.actions.iter().any(|a| matches!(
            a,
            Action::SetPartitionFlag { device, flag } if device == "sda1" && flag == "boot"
        )));
    }

    #[test]
    fn oversized_fixed_request_is_fatal() {
        let mut layout = Layout::default();
        layout
            .partitions
            .push(PartitionRequest::mounted("/", "ext4", Size::gib(2)));
        let input =
            SolveInput::new(Platform::X86Bios, vec![disk("sda", 1)], Size::gib(1)).with_layout(layout);

        let err = solve(&input).unwrap_err();
        assert_eq!(err.kind(), "InsufficientSpace");
        assert!(err.to_string().contains("for /"));

        let report = report(&input);
        assert!(report.plan.is_none());
        assert_eq!(report.diagnostics.errors.len(), 1);
    }

    #[test]
    fn full_primary_table_moves_new_requests_into_an_extended() {
        let gib = 2048 * 1024;
        let sda = msdos_disk(
            "sda",
            20,
            &[(2048, gib, 1), (2048 + gib, gib, 2), (2048 + 2 * gib, gib, 3)],
        );
        let mut layout = Layout::default();
        layout
            .partitions
            .push(PartitionRequest::mounted("/", "ext4", Size::gib(4)));
        layout
            .partitions
            .push(PartitionRequest::mounted("/home", "ext4", Size::gib(2)).grow(None));
        let input = SolveInput::new(Platform::X86Bios, vec![sda], Size::gib(4)).with_layout(layout);

        let plan = solve(&input).unwrap();
        assert_well_formed(&plan);
        for name in ["/", "/home"] {
            assert_eq!(
                plan.layout.partition(name).unwrap().part_type,
                Some(PartType::Logical),
                "{}",
                name
            );
        }
        assert!(plan.actions.iter().any(|a| matches!(
            a,
            Action::CreateDevice { part_type: Some(PartType::Extended), name, .. } if name == "sda4"
        )));
        let mut numbers: Vec<u32> = vec![plan.partition_numbers["/"], plan.partition_numbers["/home"]];
        numbers.sort();
        assert_eq!(numbers, vec![5, 6]);
    }

    #[test]
    fn hibernation_doubles_swap() {
        let mut input = plain(SolveInput::new(
            Platform::X86Bios,
            vec![disk("sda", 200)],
            Size::gib(4),
        ));
        if let Some(opts) = input.autopart.as_mut() {
            opts.hibernation = true;
        }
        let plan = solve(&input).unwrap();
        assert_eq!(size_of(&plan, "swap"), Size::gib(8));
        assert!(plan.layout.partition("/home").is_some());
    }

    #[test]
    fn equal_inputs_give_identical_actions() {
        let input = SolveInput::new(
            Platform::X86Bios,
            vec![disk("sda", 30), disk("sdb", 30)],
            Size::gib(4),
        );
        let a = solve(&input).unwrap();
        let b = solve(&input).unwrap();
        assert_eq!(
            serde_json::to_string(&a.actions).unwrap(),
            serde_json::to_string(&b.actions).unwrap()
        );
        assert_well_formed(&a);
    }

    #[test]
    fn ignored_and_missing_disks() {
        let mut input = SolveInput::new(
            Platform::X86Bios,
            vec![disk("sda", 30), disk("sdb", 30)],
            Size::gib(4),
        );
        input.ignored_disks = vec!["sda".to_string()];
        let plan = solve(&input).unwrap();
        assert_eq!(plan.boot_disk, "sdb");
        assert!(!plan.disklabels.contains_key("sda"));

        input.boot_disk = Some("sda".to_string());
        assert!(matches!(solve(&input), Err(LayoutError::DeviceNotFound(_))));

        input.only_use = vec!["sdc".to_string()];
        assert!(matches!(solve(&input), Err(LayoutError::NoUsableDisks)));
    }

    #[test]
    fn vg_name_avoids_surviving_groups() {
        let mut sdb = msdos_disk("sdb", 20, &[(2048, 2048 * 4096, 1)]);
        if let Some(label) = sdb.label.as_mut() {
            label.partitions[0].fs_type = Some("lvmpv".to_string());
        }
        let mut input = SolveInput::new(Platform::X86Bios, vec![disk("sda", 30), sdb], Size::gib(4));
        input.existing = vec![ExistingDevice {
            name: "vg0".to_string(),
            device_type: DeviceType::Lvmvg,
            parents: vec!["sdb1".to_string()],
            size: Size::gib(4),
            format: None,
        }];
        input.ignored_disks = vec!["sdb".to_string()];

        let plan = solve(&input).unwrap();
        assert_eq!(plan.containers[0].name, "vg000");
        let vg = plan
            .actions
            .iter()
            .find_map(|a| match a {
                Action::CreateDevice { device_type: DeviceType::Lvmvg, options, .. } => Some(options),
                _ => None,
            })
            .unwrap();
        assert!(vg.iter().any(|o| o.contains("a|/dev/sda")));
    }

    #[test]
    fn warnings_survive_a_failed_solve() {
        let mut layout = Layout::default();
        layout
            .partitions
            .push(PartitionRequest::mounted("/", "ext4", Size::gib(8)));
        let mut gone = disk("sdb", 10);
        gone.media_present = false;
        let input = SolveInput::new(Platform::X86Bios, vec![disk("sda", 1), gone], Size::gib(1))
            .with_layout(layout);

        let mut diag = Diagnostics::default();
        assert!(solve_with(&input, &mut diag).is_err());
        assert_eq!(diag.warnings.len(), 1);
        assert!(diag.warnings[0].contains("sdb"));
    }

    fn ppc_root_only(front_gib: u64) -> SolveInput {
        let sda = msdos_disk("sda", 100, &[(2048, front_gib * 2048 * 1024, 1)]);
        let mut layout = Layout::default();
        layout
            .partitions
            .push(PartitionRequest::mounted("/", "ext4", Size::gib(8)).grow(None));
        SolveInput::new(Platform::PPC64IPSeries, vec![sda], Size::gib(4)).with_layout(layout)
    }

    #[test]
    fn prep_boot_stays_within_firmware_reach() {
        let plan = solve(&ppc_root_only(1)).unwrap();
        assert_well_formed(&plan);
        let prep = plan.layout.partition("prepboot").unwrap();
        assert_eq!(prep.max_end, Some(Size::gib(4)));
        let geometry = prep.geometry.unwrap();
        assert!(geometry.start > 2048 * 1024);
        assert!(sectors_to_size(geometry.end + 1, 512) <= Size::gib(4));
    }

    #[test]
    fn prep_boot_behind_a_large_partition_is_fatal() {
        let err = solve(&ppc_root_only(20)).unwrap_err();
        assert_eq!(err.kind(), "InsufficientSpace");
        assert!(err.to_string().contains("for prepboot"));
    }
}
