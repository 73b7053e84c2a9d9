//! Partition growth
//!
//! Disk chunks are built from the free space a disk would have without any of
//! the partitions this solve added, so growing one partition can slide the
//! ones after it along the region. After growth the partitions of each chunk
//! are laid out again from the chunk start.

use crate::disk::device::Disk;
use crate::disk::disklabel::{DiskLabel, Geometry, LabelPartition, PartType};
use crate::disk::formats;
use crate::disk::freespace::free_regions;
use crate::disk::size::{size_to_sectors, Size};
use crate::layout::requests::PartitionRequest;
use crate::partitioning::chunk::{Chunk, ChunkRequest, ChunkUnit};
use crate::utils::error::{LayoutError, Result};
use tracing::debug;

/// Partitions above this offset cannot be booted from by BIOS firmware.
pub const BOOTABLE_LIMIT: Size = Size::tib(2);

/// Sector a request must end before: its own firmware limit, and
/// [`BOOTABLE_LIMIT`] when it is bootable.
pub fn end_limit(req: &PartitionRequest, sector_size: u64) -> Option<u64> {
    let bios = req.is_bootable().then_some(BOOTABLE_LIMIT);
    let limit = match (req.max_end, bios) {
        (Some(own), Some(bios)) => own.min(bios),
        (own, bios) => own.or(bios)?,
    };
    Some(size_to_sectors(limit, sector_size))
}

/// A free region on one disk together with the new partitions placed in it.
#[derive(Debug, Clone)]
pub struct DiskChunk {
    /// Index into the solver's disk list.
    pub disk: usize,
    pub region: Geometry,
    pub chunk: Chunk,
}

fn chunk_request(
    index: usize,
    req: &PartitionRequest,
    part: &LabelPartition,
    label: &DiskLabel,
) -> ChunkRequest {
    let ss = label.sector_size;
    let base = part.geometry.length();
    let mut cr = ChunkRequest::new(index, req.name.clone(), base, req.is_growable());
    cr.start = part.geometry.start;

    if req.is_growable() {
        if let Some(max) = req.max_size {
            cr.cap(size_to_sectors(max, ss).saturating_sub(base));
        }
        if let Some(fs_max) = formats::max_size(&req.fs_type) {
            cr.cap(size_to_sectors(fs_max, ss).saturating_sub(base));
        }
        let max_len = label.max_partition_length();
        if max_len > 0 {
            cr.cap(max_len.saturating_sub(base));
        }
    }

    let mut limit = label.max_partition_start_sector();
    if let Some(end) = end_limit(req, ss) {
        limit = limit.min(end.saturating_sub(1));
    }
    if limit != u64::MAX {
        cr.end_limit = Some(limit);
    }
    cr
}

/// Build one chunk per free region that received new partitions.
///
/// `order` is the request order; requests join their chunk in that order so
/// growth rounding is deterministic.
pub fn build_disk_chunks(
    disks: &[Disk],
    requests: &[PartitionRequest],
    order: &[usize],
) -> Vec<DiskChunk> {
    let mut chunks = Vec::new();
    for (di, disk) in disks.iter().enumerate() {
        let Some(label) = &disk.label else { continue };
        let new: Vec<&LabelPartition> = label
            .partitions
            .iter()
            .filter(|p| !p.exists && p.part_type != PartType::Extended && p.request.is_some())
            .collect();
        if new.is_empty() {
            continue;
        }

        let mut base_label = label.clone();
        base_label.remove_new_partitions();
        let grain = label.grain();

        for region in free_regions(&base_label) {
            let members: Vec<&LabelPartition> = new
                .iter()
                .copied()
                .filter(|p| region.geometry.contains_sector(p.geometry.start))
                .collect();
            if members.is_empty() {
                continue;
            }
            let logicals = members
                .iter()
                .filter(|p| p.part_type == PartType::Logical)
                .count() as u64;
            let length = region.length().saturating_sub(grain * logicals);
            let mut chunk = Chunk::new(
                format!("{}@{}", disk.name, region.geometry.start),
                ChunkUnit::Sectors(disk.sector_size),
                length,
            );
            for &idx in order {
                let Some(part) = members.iter().find(|p| p.request == Some(idx)) else {
                    continue;
                };
                chunk.add_request(chunk_request(idx, &requests[idx], part, label));
            }
            debug!(
                "chunk {}: {} sectors, {} requests, {} free",
                chunk.name,
                chunk.length,
                chunk.requests.len(),
                chunk.pool
            );
            chunks.push(DiskChunk {
                disk: di,
                region: region.geometry,
                chunk,
            });
        }
    }
    chunks
}

pub fn grow_chunks(chunks: &mut [DiskChunk]) {
    for dc in chunks {
        dc.chunk.grow_requests();
    }
}

/// Bytes of growth handed out across every chunk.
pub fn total_growth(chunks: &[DiskChunk]) -> Size {
    chunks
        .iter()
        .map(|dc| {
            let units: u64 = dc.chunk.requests.iter().map(|r| r.growth).sum();
            dc.chunk.to_size(units)
        })
        .sum()
}

/// Move the grown partitions into place.
///
/// Partitions of a chunk are packed from the region start in their original
/// order, with one grain ahead of every logical partition. A new extended
/// partition is stretched from just before its first logical to the end of
/// the region.
pub fn relayout(
    disks: &mut [Disk],
    requests: &mut [PartitionRequest],
    chunks: &[DiskChunk],
) -> Result<()> {
    for dc in chunks {
        let disk = &mut disks[dc.disk];
        let disk_name = disk.name.clone();
        let Some(label) = disk.label.as_mut() else { continue };
        let grain = label.grain();

        let mut members: Vec<&ChunkRequest> = dc.chunk.requests.iter().collect();
        members.sort_by_key(|r| r.start);

        let mut cursor = dc.region.start;
        let mut first_logical = None;
        for cr in members {
            let Some(pos) = label
                .partitions
                .iter()
                .position(|p| p.request == Some(cr.index))
            else {
                continue;
            };
            if label.partitions[pos].part_type == PartType::Logical {
                cursor += grain;
                first_logical.get_or_insert(cursor);
            }
            let start = cursor;
            let end = label
                .align_end_down(start + cr.total().max(1) - 1)
                .filter(|end| *end >= start)
                .ok_or_else(|| LayoutError::AlignmentImpossible {
                    disk: disk_name.clone(),
                    request: requests[cr.index].label().to_string(),
                })?;
            let geometry = Geometry::new(start, end);
            debug!(
                "{} on {}: {} -> {}",
                requests[cr.index].label(),
                disk_name,
                label.partitions[pos].geometry,
                geometry
            );
            label.partitions[pos].geometry = geometry;
            requests[cr.index].geometry = Some(geometry);
            cursor = end + 1;
        }

        if let Some(first) = first_logical {
            if let Some(ext) = label.partitions.iter_mut().find(|p| {
                p.part_type == PartType::Extended
                    && !p.exists
                    && dc.region.contains_sector(p.geometry.start)
            }) {
                ext.geometry = Geometry::new(first - grain, dc.region.end);
            }
        }
        label.partitions.sort_by_key(|p| p.geometry.start);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disklabel::DiskLabelKind;
    use crate::disk::size::{sectors_to_size, GIB};
    use crate::layout::ordering::partition_order;

    fn gpt_disk(name: &str, gib: u64) -> Disk {
        let disk = Disk::new(name, 512, Size::gib(gib));
        let label = DiskLabel::new(DiskLabelKind::Gpt, 512, disk.length);
        disk.with_label(label)
    }

    fn grow_partitions(
        disks: &mut [Disk],
        requests: &mut [PartitionRequest],
        order: &[usize],
    ) -> Result<Vec<DiskChunk>> {
        let mut chunks = build_disk_chunks(disks, requests, order);
        grow_chunks(&mut chunks);
        relayout(disks, requests, &chunks)?;
        Ok(chunks)
    }

    /// Place requests back to back from the first free sector.
    fn place(disk: &mut Disk, requests: &mut [PartitionRequest]) {
        let label = disk.label.as_mut().unwrap();
        let mut cursor = free_regions(label)[0].geometry.start;
        for (i, req) in requests.iter_mut().enumerate() {
            let len = size_to_sectors(req.base_size, 512);
            let geometry = Geometry::from_length(cursor, len);
            label.add_partition(LabelPartition {
                number: 0,
                geometry,
                part_type: PartType::Normal,
                request: Some(i),
                exists: false,
                fs_type: Some(req.fs_type.clone()),
            });
            req.geometry = Some(geometry);
            req.disk = Some(disk.name.clone());
            cursor += len;
        }
    }

    #[test]
    fn growth_splits_by_base_size() {
        let mut disks = vec![gpt_disk("sda", 10)];
        let mut reqs = vec![
            PartitionRequest::mounted("/", "ext4", Size::gib(1)).grow(None),
            PartitionRequest::mounted("/var", "ext4", Size::gib(3)).grow(None),
        ];
        place(&mut disks[0], &mut reqs);
        let order = partition_order(&reqs);
        let chunks = grow_partitions(&mut disks, &mut reqs, &order).unwrap();
        assert_eq!(chunks.len(), 1);

        let root = sectors_to_size(reqs[0].geometry.unwrap().length(), 512);
        let var = sectors_to_size(reqs[1].geometry.unwrap().length(), 512);
        // 10 GiB minus label overhead split 1:3, less end alignment
        assert_eq!(root, Size::mib(2559));
        assert_eq!(var, Size::mib(7678));
        assert!(root + var <= Size::gib(10));
        assert!(root + var > Size::from_bytes(10 * GIB - 4 * 1024 * 1024));
    }

    #[test]
    fn max_size_caps_growth_and_layout_stays_packed() {
        let mut disks = vec![gpt_disk("sda", 10)];
        let mut reqs = vec![
            PartitionRequest::mounted("/boot/efi", "efi", Size::mib(20)).grow(Some(Size::mib(100))),
            PartitionRequest::mounted("/", "ext4", Size::gib(1)).grow(None),
        ];
        place(&mut disks[0], &mut reqs);
        let order = partition_order(&reqs);
        grow_partitions(&mut disks, &mut reqs, &order).unwrap();

        let efi = reqs[0].geometry.unwrap();
        let root = reqs[1].geometry.unwrap();
        assert_eq!(sectors_to_size(efi.length(), 512), Size::mib(100));
        assert_eq!(root.start, efi.end + 1);
        let label = disks[0].label.as_ref().unwrap();
        assert!(label.alignment.is_aligned(root.start));
        assert!(label.is_end_aligned(root.end));
        assert!(free_regions(label).is_empty());
    }

    #[test]
    fn fixed_requests_keep_their_size() {
        let mut disks = vec![gpt_disk("sda", 4)];
        let mut reqs = vec![PartitionRequest::new("swap", "swap", Size::gib(1))];
        place(&mut disks[0], &mut reqs);
        let order = partition_order(&reqs);
        let chunks = grow_partitions(&mut disks, &mut reqs, &order).unwrap();
        assert_eq!(total_growth(&chunks), Size::ZERO);
        assert_eq!(sectors_to_size(reqs[0].geometry.unwrap().length(), 512), Size::gib(1));
    }

    #[test]
    fn bootable_requests_stop_below_two_tib() {
        let mut disks = vec![gpt_disk("sda", 3 * 1024)];
        let mut reqs = vec![PartitionRequest::mounted("/boot", "ext4", Size::gib(1))
            .grow(None)
            .weight(2000)];
        place(&mut disks[0], &mut reqs);
        let order = partition_order(&reqs);
        grow_partitions(&mut disks, &mut reqs, &order).unwrap();
        let boot = reqs[0].geometry.unwrap();
        assert!(sectors_to_size(boot.end + 1, 512) <= BOOTABLE_LIMIT);
    }

    #[test]
    fn firmware_limit_caps_growth() {
        let mut disks = vec![gpt_disk("sda", 16)];
        let mut boot = PartitionRequest::mounted("/boot", "ext4", Size::mib(512))
            .grow(None)
            .weight(2000);
        boot.max_end = Some(Size::gib(4));
        let mut reqs = vec![boot];
        place(&mut disks[0], &mut reqs);
        let order = partition_order(&reqs);
        grow_partitions(&mut disks, &mut reqs, &order).unwrap();
        let boot = reqs[0].geometry.unwrap();
        assert!(sectors_to_size(boot.end + 1, 512) <= Size::gib(4));
        assert!(sectors_to_size(boot.length(), 512) > Size::gib(3));
    }

    #[test]
    fn end_limit_takes_the_tighter_bound() {
        let mut req = PartitionRequest::new("prepboot", "prepboot", Size::mib(4)).weight(5000);
        assert_eq!(end_limit(&req, 512), Some(size_to_sectors(BOOTABLE_LIMIT, 512)));
        req.max_end = Some(Size::gib(4));
        assert_eq!(end_limit(&req, 512), Some(size_to_sectors(Size::gib(4), 512)));
        let root = PartitionRequest::mounted("/", "ext4", Size::gib(1));
        assert_eq!(end_limit(&root, 512), None);
    }
}
