//! LVM sizing rules
//!
//! Extent arithmetic for volume groups and thin pools, naming helpers, and the
//! tool context that carries the device filter and VG blacklist into every
//! LVM invocation the executor makes.

use crate::disk::size::{RoundMode, Size};
use std::collections::BTreeSet;

/// Default physical extent size.
pub const DEFAULT_PE_SIZE: Size = Size::mib(4);

/// Space before the first extent on a PV (label, metadata area).
pub const PV_DATA_START: Size = Size::mib(1);

/// Thin pool chunk size used for metadata estimation.
pub const THIN_CHUNK_SIZE: Size = Size::kib(64);

const THIN_META_MIN: Size = Size::mib(2);
const THIN_META_MAX: Size = Size::gib(16);

/// Extents needed to hold `size`, rounded up.
pub fn extents_for(size: Size, pe: Size) -> u64 {
    size.bytes().div_ceil(pe.bytes())
}

pub fn extents_to_size(extents: u64, pe: Size) -> Size {
    pe * extents
}

/// Whole extents a PV of `member` bytes contributes.
pub fn pv_extents(member: Size, pe: Size) -> u64 {
    member.saturating_sub(PV_DATA_START) / pe
}

/// Total extents of a VG built on `members`.
pub fn vg_extents(members: &[Size], pe: Size) -> u64 {
    members.iter().map(|m| pv_extents(*m, pe)).sum()
}

/// Metadata LV size for a thin pool: 64 bytes per chunk, clamped.
pub fn thin_metadata_size(pool: Size) -> Size {
    let chunks = pool / THIN_CHUNK_SIZE;
    let raw = Size::from_bytes(chunks * 64).round_to_nearest(Size::mib(1), RoundMode::Up);
    raw.clamp(THIN_META_MIN, THIN_META_MAX)
}

/// Extents a thin pool of `pool` bytes consumes beyond its data: the metadata
/// LV and an equally sized spare.
pub fn thin_pool_overhead(pool: Size, pe: Size) -> u64 {
    2 * extents_for(thin_metadata_size(pool), pe)
}

/// LV name for a mountpoint: `/` is root, `/var/log` is var_log.
pub fn lv_name_for(mountpoint: Option<&str>, fs_type: &str) -> String {
    match mountpoint {
        Some("/") => "root".to_string(),
        Some(mp) => mp.trim_matches('/').replace('/', "_"),
        None if fs_type == "swap" => "swap".to_string(),
        None => fs_type.to_string(),
    }
}

/// Device-mapper name; dashes inside names are doubled.
pub fn lv_dm_name(vg_name: &str, lv_name: &str) -> String {
    format!("{}-{}", vg_name.replace('-', "--"), lv_name.replace('-', "--"))
}

/// Device filter and VG blacklist for LVM commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LvmToolContext {
    /// Devices LVM may look at; empty means no filter.
    pub devices: BTreeSet<String>,
    pub vg_blacklist: BTreeSet<String>,
}

impl LvmToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_device(&mut self, name: &str) {
        self.devices.insert(name.trim_start_matches("/dev/").to_string());
    }

    pub fn blacklist_vg(&mut self, vg: &str) {
        self.vg_blacklist.insert(vg.to_string());
    }

    pub fn is_blacklisted(&self, vg: &str) -> bool {
        self.vg_blacklist.contains(vg)
    }

    /// `--config` payload restricting LVM to the planned devices.
    pub fn config_string(&self) -> Option<String> {
        if self.devices.is_empty() {
            return None;
        }
        let accept: Vec<String> = self
            .devices
            .iter()
            .map(|d| format!("\"a|/dev/{}$|\"", d))
            .collect();
        Some(format!(
            "devices {{ filter=[{},\"r|.*|\"] }}",
            accept.join(",")
        ))
    }

    /// Arguments to append to an LVM command line.
    pub fn command_args(&self) -> Vec<String> {
        match self.config_string() {
            Some(cfg) => vec!["--config".to_string(), cfg],
            None => Vec::new(),
        }
    }

    /// First free VG name derived from `base`.
    pub fn suggest_vg_name(&self, base: &str, taken: &BTreeSet<String>) -> String {
        let free = |n: &str| !taken.contains(n) && !self.is_blacklisted(n);
        if free(base) {
            return base.to_string();
        }
        (0..100)
            .map(|i| format!("{}{:02}", base, i))
            .find(|n| free(n.as_str()))
            .unwrap_or_else(|| format!("{}_new", base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pv_loses_data_start() {
        assert_eq!(pv_extents(Size::gib(1), DEFAULT_PE_SIZE), 255);
        assert_eq!(vg_extents(&[Size::gib(1), Size::gib(1)], DEFAULT_PE_SIZE), 510);
        assert_eq!(pv_extents(Size::kib(512), DEFAULT_PE_SIZE), 0);
    }

    #[test]
    fn extents_round_up() {
        assert_eq!(extents_for(Size::mib(5), DEFAULT_PE_SIZE), 2);
        assert_eq!(extents_for(Size::mib(8), DEFAULT_PE_SIZE), 2);
        assert_eq!(extents_to_size(3, DEFAULT_PE_SIZE), Size::mib(12));
    }

    #[test]
    fn thin_metadata_is_clamped() {
        assert_eq!(thin_metadata_size(Size::gib(1)), Size::mib(2));
        // 1 TiB / 64 KiB * 64 B = 1 GiB
        assert_eq!(thin_metadata_size(Size::tib(1)), Size::gib(1));
        assert_eq!(thin_metadata_size(Size::tib(64)), Size::gib(16));
        assert_eq!(thin_pool_overhead(Size::gib(1), DEFAULT_PE_SIZE), 2);
    }

    #[test]
    fn lv_names() {
        assert_eq!(lv_name_for(Some("/"), "ext4"), "root");
        assert_eq!(lv_name_for(Some("/var/log"), "ext4"), "var_log");
        assert_eq!(lv_name_for(None, "swap"), "swap");
        assert_eq!(lv_dm_name("my-vg", "root"), "my--vg-root");
    }

    #[test]
    fn tool_context_renders_filter() {
        let mut ctx = LvmToolContext::new();
        assert!(ctx.command_args().is_empty());
        ctx.allow_device("/dev/sda2");
        ctx.allow_device("sdb1");
        let args = ctx.command_args();
        assert_eq!(args[0], "--config");
        assert_eq!(
            args[1],
            "devices { filter=[\"a|/dev/sda2$|\",\"a|/dev/sdb1$|\",\"r|.*|\"] }"
        );
    }

    #[test]
    fn vg_name_avoids_taken_and_blacklisted() {
        let mut ctx = LvmToolContext::new();
        let taken: BTreeSet<String> = ["vg0".to_string()].into_iter().collect();
        assert_eq!(ctx.suggest_vg_name("system", &taken), "system");
        assert_eq!(ctx.suggest_vg_name("vg0", &taken), "vg000");
        ctx.blacklist_vg("vg000");
        assert_eq!(ctx.suggest_vg_name("vg0", &taken), "vg001");
    }
}
