//! Free region scanning
//!
//! A free region is a maximal run of unallocated sectors, trimmed so that its
//! start and end are aligned for the label. Runs inside an extended partition
//! are only usable for logical partitions.

use crate::disk::disklabel::{DiskLabel, Geometry, PartType};
use crate::disk::size::{sectors_to_size, Size};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Primary,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeRegion {
    pub geometry: Geometry,
    pub kind: RegionKind,
}

impl FreeRegion {
    pub fn length(&self) -> u64 {
        self.geometry.length()
    }

    pub fn size(&self, sector_size: u64) -> Size {
        sectors_to_size(self.length(), sector_size)
    }
}

/// Gaps between `occupied` ranges inside `[lo, hi]`, unaligned.
fn gaps(lo: u64, hi: u64, occupied: &[Geometry], reserve_before: u64) -> Vec<Geometry> {
    let mut out = Vec::new();
    if hi < lo {
        return out;
    }
    let mut cursor = lo;
    for g in occupied {
        // leave room for the metadata preceding the next slot
        let limit = g.start.saturating_sub(reserve_before);
        if limit > cursor {
            out.push(Geometry::new(cursor, limit - 1));
        }
        cursor = cursor.max(g.end + 1);
    }
    if cursor <= hi {
        out.push(Geometry::new(cursor, hi));
    }
    out
}

/// Unaligned free runs, primary level first then inside the extended.
pub fn raw_free_regions(label: &DiskLabel) -> Vec<FreeRegion> {
    let mut primaries: Vec<Geometry> = label
        .partitions
        .iter()
        .filter(|p| p.part_type != PartType::Logical)
        .map(|p| p.geometry)
        .collect();
    primaries.sort_by_key(|g| g.start);

    let mut regions: Vec<FreeRegion> = gaps(
        label.first_usable_sector(),
        label.last_usable_sector(),
        &primaries,
        0,
    )
    .into_iter()
    .map(|geometry| FreeRegion {
        geometry,
        kind: RegionKind::Primary,
    })
    .collect();

    if let Some(ext) = label.extended() {
        let mut logicals: Vec<Geometry> = label
            .partitions
            .iter()
            .filter(|p| p.part_type == PartType::Logical)
            .map(|p| p.geometry)
            .collect();
        logicals.sort_by_key(|g| g.start);
        regions.extend(
            gaps(ext.geometry.start, ext.geometry.end, &logicals, label.grain())
                .into_iter()
                .map(|geometry| FreeRegion {
                    geometry,
                    kind: RegionKind::Logical,
                }),
        );
    }

    regions.sort_by_key(|r| r.geometry.start);
    regions
}

/// Maximal aligned free regions of a label.
pub fn free_regions(label: &DiskLabel) -> Vec<FreeRegion> {
    raw_free_regions(label)
        .into_iter()
        .filter_map(|r| {
            let start = label.alignment.align_up(r.geometry.start);
            let end = label.align_end_down(r.geometry.end)?;
            (end >= start).then(|| FreeRegion {
                geometry: Geometry::new(start, end),
                kind: r.kind,
            })
        })
        .collect()
}

/// Total free bytes on a label, aligned.
pub fn total_free(label: &DiskLabel) -> Size {
    free_regions(label)
        .iter()
        .map(|r| r.size(label.sector_size))
        .sum()
}

/// Largest aligned free region.
pub fn largest_free(label: &DiskLabel) -> Option<FreeRegion> {
    free_regions(label).into_iter().max_by_key(|r| r.length())
}
