//! Partition numbering
//!
//! Existing partitions keep their slot numbers. New primary and extended
//! partitions take the lowest free slot; logical partitions are numbered from
//! 5 in disk order, which can shift surviving logicals.

use crate::disk::detection::partition_prefix;
use crate::disk::device::Disk;
use crate::disk::disklabel::PartType;
use crate::layout::requests::PartitionRequest;
use crate::utils::error::Diagnostics;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// First logical partition number on msdos labels.
pub const FIRST_LOGICAL: u32 = 5;

/// Number every partition on every label and return the number each request
/// ended up with.
pub fn number_partitions(
    disks: &mut [Disk],
    requests: &[PartitionRequest],
    diag: &mut Diagnostics,
) -> BTreeMap<String, u32> {
    let mut numbers = BTreeMap::new();
    for disk in disks.iter_mut() {
        let prefix = partition_prefix(&disk.name);
        let Some(label) = disk.label.as_mut() else { continue };

        let mut used: BTreeSet<u32> = label
            .partitions
            .iter()
            .filter(|p| p.exists && p.part_type != PartType::Logical && p.number > 0)
            .map(|p| p.number)
            .collect();
        let magic = label.magic_partition_number();
        if magic != 0 {
            used.insert(magic);
        }
        let max_primary = label.max_primary();

        for part in label
            .partitions
            .iter_mut()
            .filter(|p| !p.exists && p.part_type != PartType::Logical)
        {
            let Some(n) = (1..=max_primary).find(|n| !used.contains(n))
            else {
                continue;
            };
            used.insert(n);
            part.number = n;
        }

        // partitions are kept in start order, so this is disk order
        let mut next = FIRST_LOGICAL;
        for part in label
            .partitions
            .iter_mut()
            .filter(|p| p.part_type == PartType::Logical)
        {
            if part.exists && part.number != next {
                diag.warn(format!(
                    "logical partition {}{} will be renumbered to {}{}",
                    prefix, part.number, prefix, next
                ));
            }
            part.number = next;
            next += 1;
        }

        for part in label.partitions.iter().filter(|p| !p.exists) {
            if let Some(idx) = part.request {
                debug!("{} is {}{}", requests[idx].label(), prefix, part.number);
                numbers.insert(requests[idx].name.clone(), part.number);
            }
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::disklabel::{DiskLabel, DiskLabelKind, Geometry, LabelPartition};
    use crate::disk::size::Size;

    fn part(start: u64, part_type: PartType, number: u32, request: Option<usize>) -> LabelPartition {
        LabelPartition {
            number,
            geometry: Geometry::from_length(start, 2048),
            part_type,
            request,
            exists: request.is_none(),
            fs_type: None,
        }
    }

    fn disk_with(kind: DiskLabelKind, parts: Vec<LabelPartition>) -> Disk {
        let disk = Disk::new("sda", 512, Size::gib(10));
        let mut label = DiskLabel::new(kind, 512, disk.length);
        for p in parts {
            label.add_partition(p);
        }
        disk.with_label(label)
    }

    fn requests(n: usize) -> Vec<PartitionRequest> {
        (0..n)
            .map(|i| PartitionRequest::new(format!("r{}", i), "ext4", Size::mib(1)))
            .collect()
    }

    #[test]
    fn new_primaries_fill_the_lowest_gaps() {
        let mut disks = vec![disk_with(
            DiskLabelKind::Gpt,
            vec![
                part(2048, PartType::Normal, 2, None),
                part(8192, PartType::Normal, 0, Some(0)),
                part(16384, PartType::Normal, 0, Some(1)),
            ],
        )];
        let mut diag = Diagnostics::default();
        let numbers = number_partitions(&mut disks, &requests(2), &mut diag);
        assert_eq!(numbers["r0"], 1);
        assert_eq!(numbers["r1"], 3);
        assert!(diag.is_clean());
    }

    #[test]
    fn logicals_follow_disk_order() {
        let mut disks = vec![disk_with(
            DiskLabelKind::Msdos,
            vec![
                part(2048, PartType::Normal, 1, None),
                part(4096, PartType::Extended, 0, Some(2)),
                part(8192, PartType::Logical, 0, Some(0)),
                part(16384, PartType::Logical, 0, Some(1)),
            ],
        )];
        let numbers = number_partitions(&mut disks, &requests(3), &mut Diagnostics::default());
        assert_eq!(numbers["r2"], 2);
        assert_eq!(numbers["r0"], 5);
        assert_eq!(numbers["r1"], 6);
    }

    #[test]
    fn shifted_logical_is_reported() {
        let mut disks = vec![disk_with(
            DiskLabelKind::Msdos,
            vec![
                part(2048, PartType::Extended, 1, None),
                part(4096, PartType::Logical, 0, Some(0)),
                part(8192, PartType::Logical, 5, None),
            ],
        )];
        let mut diag = Diagnostics::default();
        number_partitions(&mut disks, &requests(1), &mut diag);
        let label = disks[0].label.as_ref().unwrap();
        assert_eq!(label.partitions[2].number, 6);
        assert_eq!(diag.warnings.len(), 1);
        assert!(diag.warnings[0].contains("sda5 will be renumbered to sda6"));
    }

    #[test]
    fn magic_slots_are_skipped() {
        let mut disks = vec![disk_with(
            DiskLabelKind::Sun,
            vec![
                part(2048, PartType::Normal, 0, Some(0)),
                part(8192, PartType::Normal, 0, Some(1)),
                part(16384, PartType::Normal, 0, Some(2)),
            ],
        )];
        let numbers = number_partitions(&mut disks, &requests(3), &mut Diagnostics::default());
        assert_eq!(numbers["r0"], 1);
        assert_eq!(numbers["r1"], 2);
        assert_eq!(numbers["r2"], 4);
    }
}
