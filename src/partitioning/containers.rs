//! Container sizing
//!
//! Once member partitions have their final geometry, md arrays, volume groups
//! and btrfs volumes are sized from them and their volumes are grown inside:
//! logical volumes and thin pools in extents, thin volumes in their pool's
//! extents, subvolumes in bytes.

use crate::disk::btrfs::{self, BtrfsLevel};
use crate::disk::formats;
use crate::disk::lvm::{
    extents_for, extents_to_size, thin_pool_overhead, vg_extents, DEFAULT_PE_SIZE, PV_DATA_START,
};
use crate::disk::raid::{member_data_size, superblock_headroom, RaidLevel};
use crate::disk::size::Size;
use crate::layout::ordering::compare_volumes;
use crate::layout::requests::{
    ContainerKind, ContainerRequest, EncryptionSettings, Layout, SizeSetKind, SizeSetSpec,
};
use crate::partitioning::chunk::{Chunk, ChunkRequest, ChunkUnit};
use crate::utils::error::{Diagnostics, LayoutError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Final geometry of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPlan {
    pub name: String,
    pub kind: ContainerKind,
    pub members: Vec<String>,
    pub size: Size,
    /// Space no volume claimed.
    pub free: Size,
    pub pe_size: Option<Size>,
    pub level: Option<String>,
    pub metadata_level: Option<String>,
}

fn raid_level(c: &ContainerRequest) -> Result<RaidLevel> {
    c.level
        .as_deref()
        .map(str::parse)
        .transpose()
        .map(|l| l.unwrap_or(RaidLevel::Raid1))
}

fn btrfs_levels(c: &ContainerRequest) -> Result<(BtrfsLevel, BtrfsLevel)> {
    let n = c.members.len();
    let data = c
        .level
        .as_deref()
        .map(str::parse)
        .transpose()?
        .unwrap_or_else(|| btrfs::default_data_level(n));
    let metadata = c
        .metadata_level
        .as_deref()
        .map(str::parse)
        .transpose()?
        .unwrap_or_else(|| btrfs::default_metadata_level(n));
    Ok((data, metadata))
}

/// Partition members of `c`, in member order.
fn partition_members(layout: &Layout, c: &ContainerRequest) -> Vec<String> {
    c.members
        .iter()
        .filter(|m| layout.partition(m).is_some())
        .cloned()
        .collect()
}

/// Size sets the containers imply on their member partitions.
///
/// md members always end up the same size. A volume group or btrfs volume of
/// fixed size caps the total of its members.
pub fn implicit_size_sets(
    layout: &Layout,
    encryption: &EncryptionSettings,
) -> Result<Vec<SizeSetSpec>> {
    let mut sets = Vec::new();
    for c in &layout.containers {
        let devices = partition_members(layout, c);
        if devices.is_empty() {
            continue;
        }
        match c.kind {
            ContainerKind::Md => {
                let level = raid_level(c)?;
                let target_each = c.size.map(|size| {
                    let member = level.member_size(size, c.members.len());
                    member + superblock_headroom(member)
                });
                if devices.len() > 1 || target_each.is_some() {
                    sets.push(SizeSetSpec {
                        kind: SizeSetKind::Same,
                        devices,
                        size: target_each,
                    });
                }
            }
            ContainerKind::Lvm => {
                if let Some(size) = c.size {
                    let overhead: Size = devices
                        .iter()
                        .map(|d| {
                            let encrypted = layout.partition(d).is_some_and(|p| p.encrypted);
                            PV_DATA_START
                                + if encrypted {
                                    encryption.header_size()
                                } else {
                                    Size::ZERO
                                }
                        })
                        .sum();
                    sets.push(SizeSetSpec {
                        kind: SizeSetKind::Total,
                        devices,
                        size: Some(size + overhead),
                    });
                }
            }
            ContainerKind::Btrfs => {
                if let Some(size) = c.size {
                    sets.push(SizeSetSpec {
                        kind: SizeSetKind::Total,
                        devices,
                        size: Some(size),
                    });
                }
            }
        }
    }
    Ok(sets)
}

/// Usable size of member `name`: a partition's final size or an md array's,
/// less the LUKS header when it is encrypted.
fn member_size(
    layout: &Layout,
    name: &str,
    partition_sizes: &BTreeMap<String, Size>,
    array_sizes: &BTreeMap<String, Size>,
    encryption: &EncryptionSettings,
) -> Result<Size> {
    let (raw, encrypted) = if let Some(p) = layout.partition(name) {
        let size = partition_sizes
            .get(name)
            .copied()
            .ok_or_else(|| LayoutError::DeviceNotFound(name.to_string()))?;
        (size, p.encrypted)
    } else if let Some(c) = layout.container(name) {
        let size = array_sizes
            .get(name)
            .copied()
            .ok_or_else(|| LayoutError::DeviceNotFound(name.to_string()))?;
        (size, c.encrypted)
    } else {
        return Err(LayoutError::DeviceNotFound(name.to_string()));
    };
    Ok(if encrypted {
        raw.saturating_sub(encryption.header_size())
    } else {
        raw
    })
}

fn volume_request(
    index: usize,
    name: &str,
    base: u64,
    grow: bool,
    percent: Option<u32>,
    max: Option<u64>,
) -> ChunkRequest {
    let mut cr = ChunkRequest::new(index, name, base, grow || percent.is_some());
    cr.percent = percent;
    if let Some(max) = max {
        cr.cap(max.saturating_sub(base));
    }
    cr
}

/// Largest unit count a volume may reach: its own max and its format's.
fn volume_max(unit: ChunkUnit, max_size: Option<Size>, fs_type: &str) -> Option<u64> {
    let own = max_size.map(|m| unit.from_size(m));
    let fs = formats::max_size(fs_type).map(|m| unit.from_size(m));
    match (own, fs) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn size_md(
    layout: &Layout,
    c: &ContainerRequest,
    partition_sizes: &BTreeMap<String, Size>,
) -> Result<ContainerPlan> {
    let level = raid_level(c)?;
    if c.members.len() < level.min_members() {
        return Err(LayoutError::RequestConflicts(format!(
            "{} needs at least {} members, got {}",
            level,
            level.min_members(),
            c.members.len()
        )));
    }
    let mut smallest: Option<Size> = None;
    for m in &c.members {
        if layout.partition(m).is_none() {
            return Err(LayoutError::RequestConflicts(format!(
                "md array {} can only be built from partitions, not {}",
                c.name, m
            )));
        }
        let size = partition_sizes
            .get(m)
            .copied()
            .ok_or_else(|| LayoutError::DeviceNotFound(m.clone()))?;
        smallest = Some(smallest.map_or(size, |s| s.min(size)));
    }
    let data = member_data_size(smallest.unwrap_or(Size::ZERO));
    let size = level.array_size(data, c.members.len());
    debug!(
        "md array {}: {} x {} members at {} -> {}",
        c.name,
        level,
        c.members.len(),
        data,
        size
    );
    Ok(ContainerPlan {
        name: c.name.clone(),
        kind: ContainerKind::Md,
        members: c.members.clone(),
        size,
        free: Size::ZERO,
        pe_size: None,
        level: Some(level.to_string()),
        metadata_level: None,
    })
}

fn size_vg(
    layout: &mut Layout,
    c: &ContainerRequest,
    member_sizes: &[Size],
) -> Result<ContainerPlan> {
    let pe = c.pe_size.unwrap_or(DEFAULT_PE_SIZE);
    let unit = ChunkUnit::Extents(pe);
    let mut extents = vg_extents(member_sizes, pe);
    if let Some(fixed) = c.size {
        extents = extents.min(fixed / pe);
    }
    let vg_size = extents_to_size(extents, pe);
    let overhead = thin_pool_overhead(vg_size, pe);

    let mut indices: Vec<usize> = (0..layout.volumes.len())
        .filter(|&i| layout.volumes[i].container == c.name && !layout.volumes[i].thin)
        .collect();
    indices.sort_by(|&a, &b| compare_volumes(&layout.volumes[a], &layout.volumes[b]));

    let mut chunk = Chunk::new(c.name.clone(), unit, extents);
    for &vi in &indices {
        let vol = &layout.volumes[vi];
        let extra = if vol.thin_pool { overhead } else { 0 };
        let base = extents_for(vol.base_size, pe) + extra;
        let max = volume_max(unit, vol.max_size, &vol.fs_type).map(|m| m + extra);
        chunk.add_request(volume_request(
            vi,
            &vol.name,
            base,
            vol.is_growable(),
            vol.percent,
            if vol.is_growable() { max } else { None },
        ));
    }
    if chunk.is_overcommitted() {
        return Err(LayoutError::InsufficientSpace {
            request: format!("volume group {}", c.name),
            needed: chunk.to_size(chunk.committed()).to_string(),
            largest_free: vg_size.to_string(),
            disk_summary: format!(" across {}", c.members.join(", ")),
        });
    }
    chunk.grow_requests();
    debug!(
        "volume group {}: {} extents of {}, {} free",
        c.name, extents, pe, chunk.pool
    );

    for cr in &chunk.requests {
        let vol = &mut layout.volumes[cr.index];
        let extra = if vol.thin_pool { overhead } else { 0 };
        vol.size = Some(extents_to_size(cr.total().saturating_sub(extra), pe));
    }

    let pools: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|&i| layout.volumes[i].thin_pool)
        .collect();
    for pi in pools {
        size_thin_pool(layout, pi, pe);
    }

    Ok(ContainerPlan {
        name: c.name.clone(),
        kind: ContainerKind::Lvm,
        members: c.members.clone(),
        size: vg_size,
        free: chunk.to_size(chunk.pool),
        pe_size: Some(pe),
        level: None,
        metadata_level: None,
    })
}

/// Grow the thin volumes of pool `pi` inside the pool's data extents. Thin
/// volumes may oversubscribe the pool.
fn size_thin_pool(layout: &mut Layout, pi: usize, pe: Size) {
    let unit = ChunkUnit::Extents(pe);
    let pool = &layout.volumes[pi];
    let pool_name = pool.name.clone();
    let container = pool.container.clone();
    let data = pool.size.map(|s| s / pe).unwrap_or(0);

    let mut indices: Vec<usize> = (0..layout.volumes.len())
        .filter(|&i| {
            let v = &layout.volumes[i];
            v.thin && v.container == container && v.pool.as_deref() == Some(pool_name.as_str())
        })
        .collect();
    indices.sort_by(|&a, &b| compare_volumes(&layout.volumes[a], &layout.volumes[b]));

    let mut chunk = Chunk::new(pool_name.clone(), unit, data);
    for &vi in &indices {
        let vol = &layout.volumes[vi];
        let base = extents_for(vol.base_size, pe);
        let max = volume_max(unit, vol.max_size, &vol.fs_type);
        chunk.add_request(volume_request(
            vi,
            &vol.name,
            base,
            vol.is_growable(),
            vol.percent,
            if vol.is_growable() { max } else { None },
        ));
    }
    if chunk.is_overcommitted() {
        debug!(
            "thin pool {} is oversubscribed: {} of {} extents",
            pool_name,
            chunk.committed(),
            data
        );
    }
    chunk.grow_requests();
    for cr in &chunk.requests {
        layout.volumes[cr.index].size = Some(extents_to_size(cr.total(), pe));
    }
}

fn size_btrfs(
    layout: &mut Layout,
    c: &ContainerRequest,
    member_sizes: &[Size],
    diag: &mut Diagnostics,
) -> Result<ContainerPlan> {
    let (data, metadata) = btrfs_levels(c)?;
    if member_sizes.len() < data.min_members() {
        return Err(LayoutError::RequestConflicts(format!(
            "btrfs {} data needs at least {} devices, got {}",
            data,
            data.min_members(),
            member_sizes.len()
        )));
    }
    let mut usable = data.usable_size(member_sizes);
    if let Some(fixed) = c.size {
        usable = usable.min(fixed);
    }
    let unit = ChunkUnit::Bytes;

    let mut indices: Vec<usize> = (0..layout.volumes.len())
        .filter(|&i| layout.volumes[i].container == c.name)
        .collect();
    indices.sort_by(|&a, &b| compare_volumes(&layout.volumes[a], &layout.volumes[b]));

    let mut chunk = Chunk::new(c.name.clone(), unit, usable.bytes());
    for &vi in &indices {
        let vol = &layout.volumes[vi];
        let max = vol.max_size.map(|m| m.bytes());
        chunk.add_request(volume_request(
            vi,
            &vol.name,
            vol.base_size.bytes(),
            vol.is_growable(),
            vol.percent,
            if vol.is_growable() { max } else { None },
        ));
    }
    if chunk.is_overcommitted() {
        diag.warn(format!(
            "subvolumes of {} ask for {} but the volume holds {}",
            c.name,
            Size::from_bytes(chunk.committed()),
            usable
        ));
    }
    chunk.grow_requests();
    for cr in &chunk.requests {
        layout.volumes[cr.index].size = Some(Size::from_bytes(cr.total()));
    }

    Ok(ContainerPlan {
        name: c.name.clone(),
        kind: ContainerKind::Btrfs,
        members: c.members.clone(),
        size: usable,
        free: Size::from_bytes(chunk.pool),
        pe_size: None,
        level: Some(data.to_string()),
        metadata_level: Some(metadata.to_string()),
    })
}

/// Size every container from its members and grow the volumes inside.
///
/// `partition_sizes` maps partition request names to their final size. md
/// arrays are sized first so they can serve as volume group members.
pub fn size_containers(
    layout: &mut Layout,
    partition_sizes: &BTreeMap<String, Size>,
    encryption: &EncryptionSettings,
    diag: &mut Diagnostics,
) -> Result<Vec<ContainerPlan>> {
    if layout.containers.is_empty() {
        return Ok(Vec::new());
    }
    info!("Sizing {} containers", layout.containers.len());

    let containers = layout.containers.clone();
    let mut array_sizes = BTreeMap::new();
    let mut plans = Vec::new();

    for c in containers.iter().filter(|c| c.kind == ContainerKind::Md) {
        let plan = size_md(layout, c, partition_sizes)?;
        array_sizes.insert(c.name.clone(), plan.size);
        plans.push(plan);
    }

    for c in containers.iter().filter(|c| c.kind != ContainerKind::Md) {
        let sizes = c
            .members
            .iter()
            .map(|m| member_size(layout, m, partition_sizes, &array_sizes, encryption))
            .collect::<Result<Vec<_>>>()?;
        let plan = match c.kind {
            ContainerKind::Lvm => size_vg(layout, c, &sizes)?,
            _ => size_btrfs(layout, c, &sizes, diag)?,
        };
        plans.push(plan);
    }

    // keep the layout's container order
    plans.sort_by_key(|p| containers.iter().position(|c| c.name == p.name));
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::requests::{PartitionRequest, VolumeRequest};

    fn pv(name: &str) -> PartitionRequest {
        PartitionRequest::new(name, "lvmpv", Size::mib(500)).grow(None)
    }

    fn sizes(entries: &[(&str, Size)]) -> BTreeMap<String, Size> {
        entries.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    fn vg_layout() -> Layout {
        Layout {
            partitions: vec![pv("pv.sda")],
            containers: vec![ContainerRequest::new(
                "vg0",
                ContainerKind::Lvm,
                vec!["pv.sda".to_string()],
            )],
            volumes: vec![
                VolumeRequest::new("root", "vg0", "ext4", Size::gib(1))
                    .mounted("/")
                    .grow(Some(Size::gib(50))),
                VolumeRequest::new("swap", "vg0", "swap", Size::gib(2)),
            ],
            size_sets: Vec::new(),
        }
    }

    #[test]
    fn volumes_fill_the_volume_group() {
        let mut layout = vg_layout();
        let plans = size_containers(
            &mut layout,
            &sizes(&[("pv.sda", Size::gib(10))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap();
        // 10 GiB less 1 MiB of PV header is 2559 extents
        assert_eq!(plans[0].size, Size::mib(2559 * 4));
        assert_eq!(layout.volumes[1].size, Some(Size::gib(2)));
        assert_eq!(layout.volumes[0].size, Some(Size::mib(2047 * 4)));
        assert_eq!(plans[0].free, Size::ZERO);
    }

    #[test]
    fn encrypted_members_lose_the_luks_header() {
        let mut layout = vg_layout();
        layout.partitions[0].encrypted = true;
        let plans = size_containers(
            &mut layout,
            &sizes(&[("pv.sda", Size::gib(10))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap();
        // 10240 - 16 - 1 MiB, in 4 MiB extents
        assert_eq!(plans[0].size, Size::mib(2555 * 4));
    }

    #[test]
    fn overcommitted_volume_group_fails() {
        let mut layout = vg_layout();
        let err = size_containers(
            &mut layout,
            &sizes(&[("pv.sda", Size::gib(2))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InsufficientSpace");
        assert!(err.to_string().contains("volume group vg0"));
    }

    #[test]
    fn thin_volumes_share_the_pool() {
        let mut layout = vg_layout();
        layout.volumes = vec![
            VolumeRequest::new("swap", "vg0", "swap", Size::gib(1)),
            {
                let mut v = VolumeRequest::new("pool00", "vg0", "", Size::mib(1524));
                v.thin_pool = true;
                v.grow = true;
                v
            },
            {
                let mut v = VolumeRequest::new("root", "vg0", "ext4", Size::gib(1)).grow(None);
                v.thin = true;
                v.pool = Some("pool00".to_string());
                v
            },
            {
                let mut v = VolumeRequest::new("home", "vg0", "ext4", Size::mib(500)).grow(None);
                v.thin = true;
                v.pool = Some("pool00".to_string());
                v
            },
        ];
        size_containers(
            &mut layout,
            &sizes(&[("pv.sda", Size::gib(10))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap();
        let pool = layout.volumes[1].size.unwrap();
        let root = layout.volumes[2].size.unwrap();
        let home = layout.volumes[3].size.unwrap();
        assert_eq!(root + home, pool);
        assert!(root > home);
        // pool data plus metadata and spare plus swap fill the VG
        let overhead = thin_pool_overhead(Size::mib(2559 * 4), DEFAULT_PE_SIZE);
        assert_eq!(pool / DEFAULT_PE_SIZE + overhead + 256, 2559);
    }

    #[test]
    fn md_array_can_back_a_volume_group() {
        let mut layout = Layout {
            partitions: vec![
                PartitionRequest::new("raid.01", "mdmember", Size::gib(2)),
                PartitionRequest::new("raid.02", "mdmember", Size::gib(2)),
            ],
            containers: vec![
                {
                    let mut md = ContainerRequest::new(
                        "md0",
                        ContainerKind::Md,
                        vec!["raid.01".to_string(), "raid.02".to_string()],
                    );
                    md.level = Some("raid1".to_string());
                    md
                },
                ContainerRequest::new("vg0", ContainerKind::Lvm, vec!["md0".to_string()]),
            ],
            volumes: vec![VolumeRequest::new("data", "vg0", "xfs", Size::gib(1)).grow(None)],
            size_sets: Vec::new(),
        };
        let plans = size_containers(
            &mut layout,
            &sizes(&[("raid.01", Size::gib(2)), ("raid.02", Size::gib(2))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(plans[0].name, "md0");
        // 2 MiB of superblock headroom on a 2 GiB member
        assert_eq!(plans[0].size, Size::mib(2046));
        assert_eq!(plans[1].size, Size::mib(511 * 4));
        assert_eq!(layout.volumes[0].size, Some(Size::mib(511 * 4)));
    }

    #[test]
    fn md_level_needs_enough_members() {
        let mut layout = Layout {
            partitions: vec![PartitionRequest::new("raid.01", "mdmember", Size::gib(2))],
            containers: vec![{
                let mut md =
                    ContainerRequest::new("md0", ContainerKind::Md, vec!["raid.01".to_string()]);
                md.level = Some("raid5".to_string());
                md
            }],
            ..Layout::default()
        };
        let err = size_containers(
            &mut layout,
            &sizes(&[("raid.01", Size::gib(2))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "RequestConflicts");
    }

    #[test]
    fn btrfs_subvolumes_split_the_volume() {
        let mut layout = Layout {
            partitions: vec![pv("btrfs.sda"), pv("btrfs.sdb")],
            containers: vec![ContainerRequest::new(
                "fedora",
                ContainerKind::Btrfs,
                vec!["btrfs.sda".to_string(), "btrfs.sdb".to_string()],
            )],
            volumes: vec![
                VolumeRequest::new("root", "fedora", "btrfs", Size::gib(1)).grow(None),
                VolumeRequest::new("home", "fedora", "btrfs", Size::gib(1)).grow(None),
            ],
            size_sets: Vec::new(),
        };
        let plans = size_containers(
            &mut layout,
            &sizes(&[("btrfs.sda", Size::gib(5)), ("btrfs.sdb", Size::gib(5))]),
            &EncryptionSettings::default(),
            &mut Diagnostics::default(),
        )
        .unwrap();
        assert_eq!(plans[0].size, Size::gib(10));
        assert_eq!(plans[0].level.as_deref(), Some("raid0"));
        assert_eq!(plans[0].metadata_level.as_deref(), Some("raid1"));
        assert_eq!(layout.volumes[0].size, Some(Size::gib(5)));
        assert_eq!(layout.volumes[1].size, Some(Size::gib(5)));
    }

    #[test]
    fn implicit_sets_for_md_and_fixed_vg() {
        let mut layout = vg_layout();
        layout.containers[0].size = Some(Size::gib(4));
        layout.partitions.push(PartitionRequest::new("raid.01", "mdmember", Size::gib(1)));
        layout.partitions.push(PartitionRequest::new("raid.02", "mdmember", Size::gib(1)));
        layout.containers.push(ContainerRequest::new(
            "md0",
            ContainerKind::Md,
            vec!["raid.01".to_string(), "raid.02".to_string()],
        ));
        let sets = implicit_size_sets(&layout, &EncryptionSettings::default()).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].kind, SizeSetKind::Total);
        assert_eq!(sets[0].size, Some(Size::gib(4) + PV_DATA_START));
        assert_eq!(sets[1].kind, SizeSetKind::Same);
        assert_eq!(sets[1].devices.len(), 2);
    }
}
