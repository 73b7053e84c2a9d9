//! Partition allocation
//!
//! Requests are placed one at a time in request order. Each placement works on
//! a clone of the candidate disk's label and is only committed once a slot is
//! found, so a failed request leaves every label untouched.

use crate::disk::device::Disk;
use crate::disk::disklabel::{DiskLabel, Geometry, LabelPartition, PartType};
use crate::disk::freespace::{free_regions, largest_free, FreeRegion, RegionKind};
use crate::disk::size::{sectors_to_size, Size};
use crate::layout::requests::PartitionRequest;
use crate::partitioning::growth::{build_disk_chunks, end_limit, grow_chunks, total_growth};
use crate::utils::error::{LayoutError, Result};
use tracing::{debug, info};

/// Slot type the next partition on `label` should use.
///
/// With one primary slot left an msdos label spends it on an extended
/// partition so later requests can still be placed as logicals.
pub fn next_partition_type(label: &DiskLabel, no_primary: bool) -> Option<PartType> {
    let max = label.max_primary();
    let primaries = label.primary_count();
    let has_extended = label.extended().is_some();
    let logical_ok = has_extended && label.logical_count() < label.max_logical();

    let primary_or_logical = || {
        if !no_primary {
            Some(PartType::Normal)
        } else if logical_ok {
            Some(PartType::Logical)
        } else {
            None
        }
    };

    if primaries < max {
        if primaries + 1 == max && !has_extended {
            if label.supports_extended() {
                Some(PartType::Extended)
            } else if no_primary {
                None
            } else {
                Some(PartType::Normal)
            }
        } else {
            primary_or_logical()
        }
    } else if logical_ok {
        Some(PartType::Logical)
    } else {
        None
    }
}

/// Pick the free region a request of `sectors` should go in.
///
/// Growable requests and extended partitions take the largest region; fixed
/// ones take the smallest that fits. Requests with an `end_limit` (in
/// sectors) take the first region where they fit entirely below it.
pub fn best_free_region(
    label: &DiskLabel,
    part_type: PartType,
    sectors: u64,
    end_limit: Option<u64>,
    growable: bool,
) -> Option<FreeRegion> {
    let max_start = label.max_partition_start_sector();
    // logical partitions need a grain for their EBR; so does the first
    // logical inside a new extended
    let extra = match part_type {
        PartType::Logical | PartType::Extended => label.grain(),
        PartType::Normal => 0,
    };
    let want_logical = part_type == PartType::Logical;

    let mut best: Option<FreeRegion> = None;
    for region in free_regions(label) {
        if (region.kind == RegionKind::Logical) != want_logical {
            continue;
        }
        if region.geometry.start > max_start {
            continue;
        }
        if region.length() < sectors + extra {
            continue;
        }
        if let Some(limit) = end_limit {
            if region.geometry.start + extra + sectors > limit {
                continue;
            }
            return Some(region);
        }
        best = match best {
            None => Some(region),
            Some(b) if growable || part_type == PartType::Extended => {
                Some(if region.length() > b.length() { region } else { b })
            }
            Some(b) => Some(if region.length() < b.length() { region } else { b }),
        };
    }
    best
}

/// Disks a request may go on: its required disks, or every partitionable
/// disk, boot disk first and then by name.
pub fn candidate_disks(
    req: &PartitionRequest,
    disks: &[Disk],
    boot_disk: Option<&str>,
) -> Vec<usize> {
    let mut out: Vec<usize> = disks
        .iter()
        .enumerate()
        .filter(|(_, d)| {
            d.partitionable()
                && (req.required_disks.is_empty() || req.required_disks.contains(&d.name))
        })
        .map(|(i, _)| i)
        .collect();
    out.sort_by_key(|&i| (Some(disks[i].name.as_str()) != boot_disk, disks[i].name.clone()));
    out
}

/// Try to put request `index` on `label`. `Ok(None)` means the disk has no
/// room for it.
fn place(
    label: &mut DiskLabel,
    disk_name: &str,
    index: usize,
    req: &PartitionRequest,
) -> Result<Option<Geometry>> {
    let sectors = req.base_size.bytes().div_ceil(label.sector_size).max(1);
    let limit = end_limit(req, label.sector_size);
    let growable = req.is_growable();
    let mut no_primary = false;

    loop {
        let Some(mut part_type) = next_partition_type(label, no_primary) else {
            debug!("{}: no partition slots left", disk_name);
            return Ok(None);
        };
        if req.primary_only {
            match part_type {
                PartType::Extended => part_type = PartType::Normal,
                PartType::Logical => return Ok(None),
                PartType::Normal => {}
            }
        }

        let Some(mut region) = best_free_region(label, part_type, sectors, limit, growable)
        else {
            // all the free space may sit inside the extended partition
            if part_type == PartType::Normal
                && !no_primary
                && !req.primary_only
                && label.extended().is_some()
            {
                no_primary = true;
                continue;
            }
            return Ok(None);
        };

        if part_type == PartType::Extended {
            debug!(
                "{}: creating extended partition at {}",
                disk_name, region.geometry
            );
            label.add_partition(LabelPartition {
                number: 0,
                geometry: region.geometry,
                part_type: PartType::Extended,
                request: None,
                exists: false,
                fs_type: None,
            });
            part_type = PartType::Logical;
            match best_free_region(label, part_type, sectors, limit, growable) {
                Some(r) => region = r,
                None => return Ok(None),
            }
        }

        let start = region.geometry.start
            + if part_type == PartType::Logical {
                label.grain()
            } else {
                0
            };
        let end = label
            .align_end_down(start + sectors - 1)
            .filter(|end| *end >= start)
            .ok_or_else(|| LayoutError::AlignmentImpossible {
                disk: disk_name.to_string(),
                request: req.label().to_string(),
            })?;
        let geometry = Geometry::new(start, end);

        let max_len = label.max_partition_length();
        if max_len > 0 && geometry.length() > max_len {
            debug!(
                "{}: {} sectors for {} exceeds the label's maximum partition length",
                disk_name,
                geometry.length(),
                req.label()
            );
            return Ok(None);
        }
        if start > label.max_partition_start_sector() {
            return Ok(None);
        }

        label.add_partition(LabelPartition {
            number: 0,
            geometry,
            part_type,
            request: Some(index),
            exists: false,
            fs_type: Some(req.fs_type.clone()),
        });
        return Ok(Some(geometry));
    }
}

/// Growth the whole layout would get with `label` standing in for disk `di`.
fn growth_with(
    disks: &[Disk],
    requests: &[PartitionRequest],
    order: &[usize],
    di: usize,
    label: &DiskLabel,
) -> Size {
    let mut trial: Vec<Disk> = disks.to_vec();
    trial[di].label = Some(label.clone());
    let mut chunks = build_disk_chunks(&trial, requests, order);
    grow_chunks(&mut chunks);
    total_growth(&chunks)
}

fn insufficient_space(req: &PartitionRequest, disks: &[Disk], candidates: &[usize]) -> LayoutError {
    let free: Vec<(String, Size)> = candidates
        .iter()
        .filter_map(|&i| {
            let disk = &disks[i];
            let label = disk.label.as_ref()?;
            let largest = largest_free(label)
                .map(|r| sectors_to_size(r.length(), disk.sector_size))
                .unwrap_or(Size::ZERO);
            Some((disk.name.clone(), largest))
        })
        .collect();
    let best = free.iter().max_by_key(|(_, s)| *s);
    let largest_free = best.map(|(_, s)| *s).unwrap_or(Size::ZERO);
    let mut disk_summary = best.map(|(n, _)| format!(" on {}", n)).unwrap_or_default();
    if free.len() > 1 {
        let parts: Vec<String> = free.iter().map(|(n, s)| format!("{}={}", n, s)).collect();
        disk_summary.push_str(&format!("; free: {}", parts.join(", ")));
    }
    LayoutError::InsufficientSpace {
        request: req.label().to_string(),
        needed: req.base_size.to_string(),
        largest_free: largest_free.to_string(),
        disk_summary,
    }
}

/// Place every request in `order` on a disk.
///
/// Fixed requests go on the first candidate disk with room. A growable request
/// is tried on every candidate and kept where the whole layout grows the most;
/// ties go to the earlier candidate.
pub fn allocate_partitions(
    disks: &mut [Disk],
    requests: &mut [PartitionRequest],
    order: &[usize],
    boot_disk: Option<&str>,
) -> Result<()> {
    info!("Allocating {} partition requests", order.len());
    for (placed, &idx) in order.iter().enumerate() {
        let req = requests[idx].clone();
        let candidates = candidate_disks(&req, disks, boot_disk);
        if candidates.is_empty() {
            return Err(if req.required_disks.is_empty() {
                LayoutError::NoUsableDisks
            } else {
                LayoutError::DeviceNotFound(req.required_disks.join(","))
            });
        }

        let mut best: Option<(usize, DiskLabel, Size)> = None;
        let mut alignment_error = None;
        for &di in &candidates {
            let disk = &disks[di];
            let Some(label) = &disk.label else { continue };
            let mut trial = label.clone();
            match place(&mut trial, &disk.name, idx, &req) {
                Ok(Some(geometry)) => {
                    if !req.is_growable() {
                        best = Some((di, trial, Size::ZERO));
                        break;
                    }
                    let growth = growth_with(disks, requests, &order[..=placed], di, &trial);
                    debug!(
                        "{} at {} on {} leaves {} of growth",
                        req.label(),
                        geometry,
                        disk.name,
                        growth
                    );
                    if best.as_ref().is_none_or(|(_, _, g)| growth > *g) {
                        best = Some((di, trial, growth));
                    }
                }
                Ok(None) => debug!("no room for {} on {}", req.label(), disk.name),
                Err(e) if e.is_retryable_on_next_disk() => {
                    debug!("{}; trying the next disk", e);
                    alignment_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let Some((di, label, _)) = best else {
            return Err(alignment_error.unwrap_or_else(|| insufficient_space(&req, disks, &candidates)));
        };
        let slot = label
            .partition_for_request(idx)
            .map(|p| (p.geometry, p.part_type))
            .ok_or_else(|| LayoutError::AlignmentImpossible {
                disk: disks[di].name.clone(),
                request: req.label().to_string(),
            })?;

        debug!(
            "allocated {} on {} at {} as {}",
            req.label(),
            disks[di].name,
            slot.0,
            slot.1
        );
        let request = &mut requests[idx];
        request.disk = Some(disks[di].name.clone());
        request.geometry = Some(slot.0);
        request.part_type = Some(slot.1);
        disks[di].label = Some(label);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disklabel::DiskLabelKind;
    use crate::layout::ordering::partition_order;
    use crate::disk::size::size_to_sectors;
    use crate::partitioning::growth::BOOTABLE_LIMIT;

    fn disk(name: &str, gib: u64, kind: DiskLabelKind) -> Disk {
        let d = Disk::new(name, 512, Size::gib(gib));
        let label = DiskLabel::new(kind, 512, d.length);
        d.with_label(label)
    }

    fn primary(start_mib: u64, len_mib: u64, number: u32) -> LabelPartition {
        LabelPartition {
            number,
            geometry: Geometry::from_length(start_mib * 2048, len_mib * 2048),
            part_type: PartType::Normal,
            request: None,
            exists: true,
            fs_type: Some("ext4".to_string()),
        }
    }

    fn allocate(disks: &mut [Disk], reqs: &mut [PartitionRequest]) -> Result<()> {
        let order = partition_order(reqs);
        allocate_partitions(disks, reqs, &order, Some("sda"))
    }

    #[test]
    fn slot_types_on_msdos() {
        let mut label = DiskLabel::new(DiskLabelKind::Msdos, 512, 1 << 24);
        assert_eq!(next_partition_type(&label, false), Some(PartType::Normal));
        for n in 1..=3 {
            label.add_partition(primary(n, 1, n as u32));
        }
        assert_eq!(next_partition_type(&label, false), Some(PartType::Extended));
        label.add_partition(LabelPartition {
            part_type: PartType::Extended,
            ..primary(10, 100, 4)
        });
        assert_eq!(next_partition_type(&label, false), Some(PartType::Logical));
        assert_eq!(next_partition_type(&label, true), Some(PartType::Logical));
    }

    #[test]
    fn gpt_never_needs_extended() {
        let mut label = DiskLabel::new(DiskLabelKind::Gpt, 512, 1 << 24);
        for n in 1..=127 {
            label.add_partition(primary(n, 1, n as u32));
        }
        assert_eq!(next_partition_type(&label, false), Some(PartType::Normal));
        assert_eq!(next_partition_type(&label, true), None);
        label.add_partition(primary(200, 1, 128));
        assert_eq!(next_partition_type(&label, false), None);
    }

    #[test]
    fn fixed_requests_take_the_smallest_fit() {
        let mut label = DiskLabel::new(DiskLabelKind::Gpt, 512, Size::gib(10).bytes() / 512);
        // leaves a 99 MiB hole at 1 MiB and a large one after 200 MiB
        label.add_partition(primary(100, 100, 1));
        let small = best_free_region(&label, PartType::Normal, 50 * 2048, None, false).unwrap();
        assert_eq!(small.geometry.start, 2048);
        let large = best_free_region(&label, PartType::Normal, 50 * 2048, None, true).unwrap();
        assert_eq!(large.geometry.start, 200 * 2048);
    }

    #[test]
    fn places_fixed_requests_in_order() {
        let mut disks = vec![disk("sda", 20, DiskLabelKind::Gpt)];
        let mut reqs = vec![
            PartitionRequest::new("swap", "swap", Size::gib(4)),
            PartitionRequest::mounted("/boot", "ext4", Size::gib(1)).weight(2000),
        ];
        allocate(&mut disks, &mut reqs).unwrap();
        let boot = reqs[1].geometry.unwrap();
        let swap = reqs[0].geometry.unwrap();
        assert_eq!(boot.start, 2048);
        assert_eq!(swap.start, boot.end + 1);
        assert_eq!(reqs[0].disk.as_deref(), Some("sda"));
        assert_eq!(reqs[0].part_type, Some(PartType::Normal));
    }

    #[test]
    fn last_msdos_slot_becomes_extended() {
        let mut sda = disk("sda", 10, DiskLabelKind::Msdos);
        {
            let label = sda.label.as_mut().unwrap();
            label.fresh = false;
            label.add_partition(primary(1, 1024, 1));
            label.add_partition(primary(1025, 1024, 2));
            label.add_partition(primary(2049, 1024, 3));
        }
        let mut disks = vec![sda];
        let mut reqs = vec![
            PartitionRequest::mounted("/data", "ext4", Size::gib(1)),
            PartitionRequest::mounted("/srv", "ext4", Size::gib(1)),
        ];
        allocate(&mut disks, &mut reqs).unwrap();

        let label = disks[0].label.as_ref().unwrap();
        let ext = label.extended().unwrap();
        assert!(!ext.exists);
        for req in &reqs {
            assert_eq!(req.part_type, Some(PartType::Logical));
            let g = req.geometry.unwrap();
            assert!(ext.geometry.start < g.start && g.end <= ext.geometry.end);
        }
        assert_eq!(label.logical_count(), 2);
    }

    #[test]
    fn primary_only_request_uses_last_slot() {
        let mut sda = disk("sda", 10, DiskLabelKind::Msdos);
        {
            let label = sda.label.as_mut().unwrap();
            label.add_partition(primary(1, 1024, 1));
            label.add_partition(primary(1025, 1024, 2));
            label.add_partition(primary(2049, 1024, 3));
        }
        let mut disks = vec![sda];
        let mut req = PartitionRequest::new("prepboot", "prepboot", Size::mib(4));
        req.primary_only = true;
        let mut reqs = vec![req];
        allocate(&mut disks, &mut reqs).unwrap();
        assert_eq!(reqs[0].part_type, Some(PartType::Normal));
        assert!(disks[0].label.as_ref().unwrap().extended().is_none());
    }

    #[test]
    fn required_disk_is_honoured() {
        let mut disks = vec![
            disk("sda", 10, DiskLabelKind::Gpt),
            disk("sdb", 10, DiskLabelKind::Gpt),
        ];
        let mut reqs = vec![PartitionRequest::mounted("/home", "ext4", Size::gib(1)).on_disk("sdb")];
        allocate(&mut disks, &mut reqs).unwrap();
        assert_eq!(reqs[0].disk.as_deref(), Some("sdb"));
    }

    #[test]
    fn growable_request_goes_where_growth_is_largest() {
        let mut disks = vec![
            disk("sda", 4, DiskLabelKind::Gpt),
            disk("sdb", 10, DiskLabelKind::Gpt),
        ];
        let mut reqs = vec![PartitionRequest::mounted("/", "ext4", Size::gib(1)).grow(None)];
        allocate(&mut disks, &mut reqs).unwrap();
        assert_eq!(reqs[0].disk.as_deref(), Some("sdb"));
    }

    #[test]
    fn growth_ties_go_to_the_boot_disk() {
        let mut disks = vec![
            disk("sdb", 10, DiskLabelKind::Gpt),
            disk("sda", 10, DiskLabelKind::Gpt),
        ];
        let mut reqs = vec![PartitionRequest::mounted("/", "ext4", Size::gib(1)).grow(None)];
        allocate(&mut disks, &mut reqs).unwrap();
        assert_eq!(reqs[0].disk.as_deref(), Some("sda"));
    }

    #[test]
    fn insufficient_space_names_the_request() {
        let mut disks = vec![disk("sda", 1, DiskLabelKind::Gpt)];
        let mut reqs = vec![PartitionRequest::mounted("/", "ext4", Size::gib(2))];
        let err = allocate(&mut disks, &mut reqs).unwrap_err();
        assert_eq!(err.kind(), "InsufficientSpace");
        let msg = err.to_string();
        assert!(msg.contains("for /"));
        assert!(msg.contains("need 2 GiB"));
        assert!(msg.contains("on sda"));
        // nothing was recorded
        assert!(disks[0].label.as_ref().unwrap().partitions.is_empty());
        assert!(reqs[0].geometry.is_none());
    }

    fn prep(grow: bool) -> PartitionRequest {
        let mut req = PartitionRequest::new("prepboot", "prepboot", Size::mib(4)).weight(5000);
        if grow {
            req = req.grow(Some(Size::mib(8)));
        }
        req.primary_only = true;
        req.max_end = Some(Size::gib(4));
        req
    }

    #[test]
    fn firmware_limit_skips_the_larger_region_beyond_it() {
        let mut disks = vec![disk("sda", 100, DiskLabelKind::Msdos)];
        let label = disks[0].label.as_mut().unwrap();
        // a 16 MiB hole at 1025 MiB, then everything after 9 GiB
        label.add_partition(primary(1, 1024, 1));
        label.add_partition(primary(1041, 8192, 2));
        let mut reqs = vec![prep(true)];
        allocate(&mut disks, &mut reqs).unwrap();
        let geometry = reqs[0].geometry.unwrap();
        assert_eq!(geometry.start, 1025 * 2048);
        assert!(sectors_to_size(geometry.end + 1, 512) <= Size::gib(4));
    }

    #[test]
    fn firmware_limit_leaves_no_room() {
        let mut disks = vec![disk("sda", 100, DiskLabelKind::Msdos)];
        disks[0]
            .label
            .as_mut()
            .unwrap()
            .add_partition(primary(1, 20 * 1024, 1));
        let mut reqs = vec![prep(false)];
        let err = allocate(&mut disks, &mut reqs).unwrap_err();
        assert_eq!(err.kind(), "InsufficientSpace");
        assert!(err.to_string().contains("for prepboot"));
        assert!(reqs[0].geometry.is_none());
        assert_eq!(disks[0].label.as_ref().unwrap().partitions.len(), 1);

        // without the limit the same disk has plenty of room
        let mut reqs = vec![prep(false)];
        reqs[0].max_end = None;
        allocate(&mut disks, &mut reqs).unwrap();
        assert!(reqs[0].geometry.unwrap().start > 20 * 1024 * 2048);
    }

    #[test]
    fn no_disks_is_an_error() {
        let mut disks: Vec<Disk> = Vec::new();
        let mut reqs = vec![PartitionRequest::mounted("/", "ext4", Size::gib(2))];
        let err = allocate(&mut disks, &mut reqs).unwrap_err();
        assert_eq!(err.kind(), "NoUsableDisks");
    }

    #[test]
    fn bootable_requests_stay_below_two_tib() {
        let mut label = DiskLabel::new(DiskLabelKind::Gpt, 512, Size::tib(3).bytes() / 512);
        // fill the first 2 TiB
        label.add_partition(LabelPartition {
            geometry: Geometry::new(2048, size_to_sectors(Size::tib(2), 512) - 1),
            ..primary(1, 1, 1)
        });
        let limit = Some(size_to_sectors(BOOTABLE_LIMIT, 512));
        assert!(best_free_region(&label, PartType::Normal, 2048, limit, false).is_none());
        assert!(best_free_region(&label, PartType::Normal, 2048, None, false).is_some());
    }
}
