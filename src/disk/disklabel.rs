//! Disklabel (partition table) model
//!
//! Geometry is always in logical sectors of the owning disk. The solver only
//! ever works on clones of these labels; the originals describe what is on
//! disk before any action runs.

use crate::disk::size::MIB;
use crate::utils::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GPT partition entry array size in bytes (128 entries of 128 bytes).
const GPT_ENTRY_ARRAY_BYTES: u64 = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskLabelKind {
    Msdos,
    Gpt,
    Dasd,
    Mac,
    Sun,
    Loop,
}

impl DiskLabelKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Msdos => "msdos",
            Self::Gpt => "gpt",
            Self::Dasd => "dasd",
            Self::Mac => "mac",
            Self::Sun => "sun",
            Self::Loop => "loop",
        }
    }

    pub fn max_primary(self) -> u32 {
        match self {
            Self::Msdos => 4,
            Self::Gpt => 128,
            Self::Dasd => 3,
            Self::Mac => 64,
            Self::Sun => 8,
            Self::Loop => 1,
        }
    }

    pub fn supports_extended(self) -> bool {
        matches!(self, Self::Msdos)
    }

    pub fn max_logical(self) -> u32 {
        match self {
            Self::Msdos => 60,
            _ => 0,
        }
    }

    /// Slot the label reserves for itself (Mac partition map, Sun whole-disk slice).
    pub fn magic_partition_number(self) -> u32 {
        match self {
            Self::Mac => 1,
            Self::Sun => 3,
            _ => 0,
        }
    }

    /// Highest sector a partition may start at. 32-bit labels top out at
    /// 2^32 - 1 sectors, which is 2 TiB with 512 byte sectors.
    pub fn max_partition_start_sector(self) -> u64 {
        match self {
            Self::Msdos | Self::Mac | Self::Sun | Self::Dasd => u32::MAX as u64,
            Self::Gpt | Self::Loop => u64::MAX,
        }
    }

    /// Longest partition in sectors; 0 means unlimited.
    pub fn max_partition_length(self) -> u64 {
        match self {
            Self::Msdos | Self::Mac | Self::Sun => u32::MAX as u64,
            Self::Gpt | Self::Dasd | Self::Loop => 0,
        }
    }

    /// Whether partitions carry a name the label can store.
    pub fn supports_names(self) -> bool {
        matches!(self, Self::Gpt | Self::Mac)
    }

    fn reserved_head_sectors(self, sector_size: u64) -> u64 {
        match self {
            Self::Msdos | Self::Sun => 1,
            Self::Gpt => 2 + GPT_ENTRY_ARRAY_BYTES.div_ceil(sector_size),
            Self::Dasd => 2,
            Self::Mac => 64,
            Self::Loop => 0,
        }
    }

    fn reserved_tail_sectors(self, sector_size: u64) -> u64 {
        match self {
            Self::Gpt => 1 + GPT_ENTRY_ARRAY_BYTES.div_ceil(sector_size),
            _ => 0,
        }
    }

    /// A label kind can describe a device iff every sector is addressable.
    pub fn is_compatible_with(self, device_length: u64) -> bool {
        self.max_partition_start_sector() >= device_length
    }
}

impl fmt::Display for DiskLabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DiskLabelKind {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msdos" | "dos" | "mbr" => Ok(Self::Msdos),
            "gpt" => Ok(Self::Gpt),
            "dasd" => Ok(Self::Dasd),
            "mac" => Ok(Self::Mac),
            "sun" => Ok(Self::Sun),
            "loop" => Ok(Self::Loop),
            other => Err(LayoutError::ConfigError(format!(
                "unknown disklabel type '{}'",
                other
            ))),
        }
    }
}

/// Inclusive sector range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub start: u64,
    pub end: u64,
}

impl Geometry {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn from_length(start: u64, length: u64) -> Self {
        Self {
            start,
            end: start + length - 1,
        }
    }

    pub fn length(&self) -> u64 {
        self.end + 1 - self.start
    }

    pub fn contains(&self, other: &Geometry) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_sector(&self, sector: u64) -> bool {
        self.start <= sector && sector <= self.end
    }

    pub fn overlaps(&self, other: &Geometry) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({} sectors)", self.start, self.end, self.length())
    }
}

/// Sector alignment: a sector `s` is aligned iff `(s - offset) mod grain == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub offset: u64,
    pub grain: u64,
}

impl Alignment {
    pub fn new(offset: u64, grain: u64) -> Self {
        let grain = grain.max(1);
        Self {
            offset: offset % grain,
            grain,
        }
    }

    fn phase(&self, sector: u64) -> u64 {
        (sector % self.grain + self.grain - self.offset) % self.grain
    }

    pub fn is_aligned(&self, sector: u64) -> bool {
        self.phase(sector) == 0
    }

    pub fn align_up(&self, sector: u64) -> u64 {
        match self.phase(sector) {
            0 => sector,
            p => sector + (self.grain - p),
        }
    }

    /// Largest aligned sector not above `sector`, if any.
    pub fn align_down(&self, sector: u64) -> Option<u64> {
        sector.checked_sub(self.phase(sector))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartType {
    Normal,
    Extended,
    Logical,
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "primary"),
            Self::Extended => write!(f, "extended"),
            Self::Logical => write!(f, "logical"),
        }
    }
}

/// One slot in a label: either already on disk or added during this solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPartition {
    /// 0 until numbered.
    pub number: u32,
    pub geometry: Geometry,
    pub part_type: PartType,
    /// Index of the partition request this slot was allocated for.
    pub request: Option<usize>,
    pub exists: bool,
    /// Format found on a pre-existing partition.
    pub fs_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLabel {
    pub kind: DiskLabelKind,
    pub sector_size: u64,
    pub device_length: u64,
    pub alignment: Alignment,
    pub partitions: Vec<LabelPartition>,
    /// Created by this solve rather than read from disk.
    pub fresh: bool,
}

impl DiskLabel {
    /// A new, empty label with 1 MiB alignment.
    pub fn new(kind: DiskLabelKind, sector_size: u64, device_length: u64) -> Self {
        Self {
            kind,
            sector_size,
            device_length,
            alignment: Alignment::new(0, (MIB / sector_size).max(1)),
            partitions: Vec::new(),
            fresh: true,
        }
    }

    pub fn grain(&self) -> u64 {
        self.alignment.grain
    }

    /// Alignment for the last sector of a partition: `end + 1` must be aligned.
    pub fn end_alignment(&self) -> Alignment {
        Alignment::new(
            self.alignment.offset + self.alignment.grain - 1,
            self.alignment.grain,
        )
    }

    pub fn is_end_aligned(&self, end: u64) -> bool {
        self.end_alignment().is_aligned(end)
    }

    pub fn align_end_down(&self, end: u64) -> Option<u64> {
        self.end_alignment().align_down(end)
    }

    pub fn max_partition_start_sector(&self) -> u64 {
        self.kind.max_partition_start_sector()
    }

    pub fn max_partition_length(&self) -> u64 {
        self.kind.max_partition_length()
    }

    pub fn supports_extended(&self) -> bool {
        self.kind.supports_extended()
    }

    pub fn magic_partition_number(&self) -> u32 {
        self.kind.magic_partition_number()
    }

    pub fn first_usable_sector(&self) -> u64 {
        self.kind.reserved_head_sectors(self.sector_size)
    }

    pub fn last_usable_sector(&self) -> u64 {
        self.device_length
            .saturating_sub(1 + self.kind.reserved_tail_sectors(self.sector_size))
    }

    pub fn extended(&self) -> Option<&LabelPartition> {
        self.partitions
            .iter()
            .find(|p| p.part_type == PartType::Extended)
    }

    /// Normal and extended partitions both occupy primary slots.
    pub fn primary_count(&self) -> u32 {
        let used = self
            .partitions
            .iter()
            .filter(|p| p.part_type != PartType::Logical)
            .count() as u32;
        // the magic slot is never available to us
        used + u32::from(self.magic_partition_number() != 0)
    }

    pub fn logical_count(&self) -> u32 {
        self.partitions
            .iter()
            .filter(|p| p.part_type == PartType::Logical)
            .count() as u32
    }

    pub fn max_primary(&self) -> u32 {
        self.kind.max_primary()
    }

    pub fn max_logical(&self) -> u32 {
        self.kind.max_logical()
    }

    /// Insert keeping the list ordered by start sector.
    pub fn add_partition(&mut self, partition: LabelPartition) {
        let idx = self
            .partitions
            .iter()
            .position(|p| p.geometry.start > partition.geometry.start)
            .unwrap_or(self.partitions.len());
        self.partitions.insert(idx, partition);
    }

    pub fn partition_for_request(&self, request: usize) -> Option<&LabelPartition> {
        self.partitions.iter().find(|p| p.request == Some(request))
    }

    /// Drop every partition that does not exist yet.
    pub fn remove_new_partitions(&mut self) {
        self.partitions.retain(|p| p.exists);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_in_both_directions() {
        let a = Alignment::new(0, 2048);
        assert!(a.is_aligned(4096));
        assert_eq!(a.align_up(1), 2048);
        assert_eq!(a.align_up(2048), 2048);
        assert_eq!(a.align_down(4095), Some(2048));
        assert_eq!(a.align_down(0), Some(0));

        let shifted = Alignment::new(7, 8);
        assert!(shifted.is_aligned(15));
        assert_eq!(shifted.align_up(9), 15);
        assert_eq!(shifted.align_down(3), None);
    }

    #[test]
    fn end_alignment_is_one_before_grain() {
        let label = DiskLabel::new(DiskLabelKind::Gpt, 512, 1 << 22);
        assert!(label.is_end_aligned(2047));
        assert!(!label.is_end_aligned(2048));
        assert_eq!(label.align_end_down(5000), Some(4095));
    }

    #[test]
    fn gpt_reserves_entry_arrays() {
        let label = DiskLabel::new(DiskLabelKind::Gpt, 512, 41_943_040);
        assert_eq!(label.first_usable_sector(), 34);
        assert_eq!(label.last_usable_sector(), 41_943_040 - 34);

        let big_sectors = DiskLabel::new(DiskLabelKind::Gpt, 4096, 1 << 20);
        assert_eq!(big_sectors.first_usable_sector(), 6);
        assert_eq!(big_sectors.grain(), 256);
    }

    #[test]
    fn msdos_cannot_address_past_2_tib() {
        let three_tib = 3 * (1u64 << 40) / 512;
        assert!(!DiskLabelKind::Msdos.is_compatible_with(three_tib));
        assert!(DiskLabelKind::Gpt.is_compatible_with(three_tib));
        assert!(DiskLabelKind::Msdos.is_compatible_with(1 << 30));
    }

    #[test]
    fn label_names_parse() {
        assert_eq!("dos".parse::<DiskLabelKind>().unwrap(), DiskLabelKind::Msdos);
        assert_eq!("GPT".parse::<DiskLabelKind>().unwrap(), DiskLabelKind::Gpt);
        assert!("zfs".parse::<DiskLabelKind>().is_err());
        assert_eq!(DiskLabelKind::Sun.to_string(), "sun");
    }

    #[test]
    fn magic_slot_counts_as_primary() {
        let mac = DiskLabel::new(DiskLabelKind::Mac, 512, 1 << 22);
        assert_eq!(mac.primary_count(), 1);
        let gpt = DiskLabel::new(DiskLabelKind::Gpt, 512, 1 << 22);
        assert_eq!(gpt.primary_count(), 0);
    }

    #[test]
    fn add_partition_keeps_start_order() {
        let mut label = DiskLabel::new(DiskLabelKind::Gpt, 512, 1 << 22);
        for start in [8192u64, 2048, 4096] {
            label.add_partition(LabelPartition {
                number: 0,
                geometry: Geometry::from_length(start, 2048),
                part_type: PartType::Normal,
                request: None,
                exists: false,
                fs_type: None,
            });
        }
        let starts: Vec<u64> = label.partitions.iter().map(|p| p.geometry.start).collect();
        assert_eq!(starts, vec![2048, 4096, 8192]);
    }
}
