//! Disk detection and enumeration
//!
//! Reads `/sys/block` for geometry and flags and asks `blkid` for labels and
//! existing formats. Attribute reads go through [`SysfsCache`], which lives for
//! a single probe so repeated lookups during one scan hit memory.

use crate::disk::device::Disk;
use crate::disk::disklabel::{DiskLabel, DiskLabelKind, Geometry, LabelPartition, PartType};
use crate::disk::size::{Size, GIB, KIB};
use crate::utils::command::run_command_output;
use crate::utils::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// sysfs always reports `start` and `size` in 512 byte units.
const SYSFS_UNIT: u64 = 512;

/// Memoised sysfs attribute reader.
#[derive(Debug)]
pub struct SysfsCache {
    root: PathBuf,
    cache: HashMap<String, Option<String>>,
}

impl Default for SysfsCache {
    fn default() -> Self {
        Self::new("/sys/block")
    }
}

impl SysfsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    /// Read a sysfs attribute, returning None if not available
    pub fn attr(&mut self, device: &str, attr: &str) -> Option<String> {
        let key = format!("{}/{}", device, attr);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let value = fs::read_to_string(self.root.join(&key))
            .ok()
            .map(|s| s.trim().to_string());
        self.cache.insert(key, value.clone());
        value
    }

    /// Read a numeric sysfs attribute
    pub fn attr_u64(&mut self, device: &str, attr: &str) -> Option<u64> {
        self.attr(device, attr).and_then(|s| s.parse().ok())
    }

    pub fn block_devices(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    /// Partition directories below a disk (`sda1`, `nvme0n1p2`, ...).
    pub fn partitions(&mut self, device: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.root.join(device)) else {
            return Vec::new();
        };
        let mut parts: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(device) && n != device)
            .collect();
        parts.sort();
        parts
            .into_iter()
            .filter(|p| self.attr(&format!("{}/{}", device, p), "partition").is_some())
            .collect()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

/// Information about a block device
#[derive(Debug, Clone)]
pub struct BlockDevice {
    /// Device name (e.g., sda)
    pub name: String,
    pub size: Size,
    pub sector_size: u64,
    pub model: Option<String>,
    /// Transport class (nvme, mmc, usb, ssd, hdd, loop, dasd)
    pub transport: String,
    pub removable: bool,
    pub read_only: bool,
}

impl BlockDevice {
    pub fn path(&self) -> String {
        format!("/dev/{}", self.name)
    }
}

/// Determine device transport from its name and sysfs
fn determine_transport(cache: &mut SysfsCache, device: &str) -> String {
    if device.starts_with("nvme") {
        return "nvme".to_string();
    }
    if device.starts_with("mmcblk") {
        return "mmc".to_string();
    }
    if device.starts_with("loop") {
        return "loop".to_string();
    }
    if device.starts_with("dasd") {
        return "dasd".to_string();
    }
    if cache.attr_u64(device, "removable").unwrap_or(0) == 1 {
        return "usb".to_string();
    }
    match cache.attr_u64(device, "queue/rotational") {
        Some(0) => "ssd".to_string(),
        Some(_) => "hdd".to_string(),
        None => "disk".to_string(),
    }
}

fn is_device_mounted(device: &str) -> bool {
    let mounts = fs::read_to_string("/proc/mounts").unwrap_or_default();
    mounts
        .lines()
        .any(|line| line.split_whitespace().next().is_some_and(|d| d.starts_with(device)))
}

/// List block devices
///
/// If `all` is false, filters to only show suitable installation targets
/// (excludes mounted devices, read-only devices, loop devices, etc.)
pub fn list_block_devices(cache: &mut SysfsCache, all: bool) -> Result<Vec<BlockDevice>> {
    let mut devices = Vec::new();

    for name in cache.block_devices()? {
        let transport = determine_transport(cache, &name);
        if !all && (transport == "loop" || name.starts_with("ram") || name.starts_with("zram")) {
            continue;
        }

        let size_units = cache.attr_u64(&name, "size").unwrap_or(0);
        if size_units == 0 {
            continue;
        }
        let sector_size = cache
            .attr_u64(&name, "queue/logical_block_size")
            .unwrap_or(512);
        let size = Size::from_bytes(size_units * SYSFS_UNIT);

        if !all && size.bytes() < GIB {
            continue;
        }

        let removable = cache.attr_u64(&name, "removable").unwrap_or(0) == 1;
        let read_only = cache.attr_u64(&name, "ro").unwrap_or(0) == 1;
        if !all && read_only {
            continue;
        }
        if !all && is_device_mounted(&format!("/dev/{}", name)) {
            continue;
        }

        let model = cache
            .attr(&name, "device/model")
            .or_else(|| cache.attr(&name, "device/name"));

        devices.push(BlockDevice {
            name,
            size,
            sector_size,
            model,
            transport,
            removable,
            read_only,
        });
    }

    Ok(devices)
}

/// Parse `blkid -o export` output into a key/value map.
pub fn parse_blkid_export(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn blkid(path: &str) -> BTreeMap<String, String> {
    match run_command_output("blkid", &["-p", "-o", "export", path]) {
        Ok(out) => parse_blkid_export(&out),
        Err(e) => {
            debug!("blkid {}: {}", path, e);
            BTreeMap::new()
        }
    }
}

/// Map a blkid PART_ENTRY_TYPE to the slot kind on an msdos label.
pub fn msdos_part_type(entry_type: Option<&str>, number: u32) -> PartType {
    match entry_type {
        Some("0x5" | "0xf" | "0x85") => PartType::Extended,
        _ if number > 4 => PartType::Logical,
        _ => PartType::Normal,
    }
}

/// Build a [`Disk`] from sysfs and blkid, including its existing partitions.
pub fn probe_disk(cache: &mut SysfsCache, dev: &BlockDevice) -> Disk {
    let mut disk = Disk::new(dev.name.clone(), dev.sector_size, dev.size);
    disk.removable = dev.removable;
    disk.protected = dev.read_only;
    disk.is_disk = dev.transport != "loop";
    disk.transport = Some(dev.transport.clone());
    disk.model = dev.model.clone();

    let info = blkid(&dev.path());
    let Some(kind) = info.get("PTTYPE") else {
        disk.format = info.get("TYPE").cloned();
        // members of multipath or firmware RAID sets are not ours to touch
        disk.hidden = disk
            .format
            .as_deref()
            .is_some_and(|t| t.ends_with("_raid_member") || t == "mpath_member");
        return disk;
    };
    let kind = match kind.as_str() {
        "dos" => DiskLabelKind::Msdos,
        other => match other.parse() {
            Ok(k) => k,
            Err(_) => {
                warn!("{}: unsupported disklabel '{}'", dev.name, other);
                disk.hidden = true;
                return disk;
            }
        },
    };

    let mut label = DiskLabel::new(kind, dev.sector_size, disk.length);
    label.fresh = false;
    let ratio = dev.sector_size / SYSFS_UNIT;
    for part in cache.partitions(&dev.name) {
        let key = format!("{}/{}", dev.name, part);
        let (Some(number), Some(start), Some(size)) = (
            cache.attr_u64(&key, "partition"),
            cache.attr_u64(&key, "start"),
            cache.attr_u64(&key, "size"),
        ) else {
            continue;
        };
        let number = number as u32;
        let pinfo = blkid(&format!("/dev/{}", part));
        let part_type = if kind == DiskLabelKind::Msdos {
            msdos_part_type(pinfo.get("PART_ENTRY_TYPE").map(String::as_str), number)
        } else {
            PartType::Normal
        };
        // the kernel exposes an extended partition as a 1 KiB stub
        let length = if part_type == PartType::Extended {
            pinfo
                .get("PART_ENTRY_SIZE")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(size)
        } else {
            size
        };
        label.add_partition(LabelPartition {
            number,
            geometry: Geometry::from_length(start / ratio.max(1), (length / ratio.max(1)).max(1)),
            part_type,
            request: None,
            exists: true,
            fs_type: pinfo.get("TYPE").map(|t| normalise_fs_type(t, &pinfo)),
        });
    }
    disk.label = Some(label);
    disk
}

/// blkid calls an ESP "vfat"; the planner wants "efi" for stage-1 matching.
fn normalise_fs_type(blkid_type: &str, info: &BTreeMap<String, String>) -> String {
    let esp = info
        .get("PART_ENTRY_TYPE")
        .is_some_and(|t| t.eq_ignore_ascii_case(crate::disk::formats::partition_types::EFI));
    match blkid_type {
        "vfat" if esp => "efi".to_string(),
        "LVM2_member" => "lvmpv".to_string(),
        "linux_raid_member" => "mdmember".to_string(),
        "crypto_LUKS" => "luks".to_string(),
        other => other.to_string(),
    }
}

/// Probe every suitable disk on this host.
pub fn probe_disks(all: bool) -> Result<Vec<Disk>> {
    let mut cache = SysfsCache::default();
    let devices = list_block_devices(&mut cache, all)?;
    let disks = devices.iter().map(|d| probe_disk(&mut cache, d)).collect();
    debug!("sysfs cache held {} attributes", cache.cached_entries());
    Ok(disks)
}

/// Get the partition naming prefix for a device
/// e.g., sda -> sda, nvme0n1 -> nvme0n1p
pub fn partition_prefix(device: &str) -> String {
    if device.contains("nvme") || device.contains("mmcblk") || device.contains("loop") {
        format!("{}p", device)
    } else {
        device.to_string()
    }
}

/// Parse the MemTotal line of /proc/meminfo.
pub fn parse_meminfo(meminfo: &str) -> Option<Size> {
    meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| Size::from_bytes(kb * KIB))
}

/// Get the amount of RAM
pub fn get_ram() -> Size {
    let meminfo = fs::read_to_string("/proc/meminfo").unwrap_or_default();
    // Fallback: 8GB
    parse_meminfo(&meminfo).unwrap_or(Size::gib(8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_rules() {
        assert_eq!(partition_prefix("sda"), "sda");
        assert_eq!(partition_prefix("nvme0n1"), "nvme0n1p");
        assert_eq!(partition_prefix("loop0"), "loop0p");
    }

    #[test]
    fn meminfo_is_read_in_kib() {
        let sample = "MemTotal:        4194304 kB\nMemFree:  100 kB\n";
        assert_eq!(parse_meminfo(sample), Some(Size::gib(4)));
        assert_eq!(parse_meminfo("nothing here"), None);
    }

    #[test]
    fn blkid_export_parsing() {
        let out = "DEVNAME=/dev/sda\nPTUUID=1234\nPTTYPE=gpt\n";
        let map = parse_blkid_export(out);
        assert_eq!(map.get("PTTYPE").map(String::as_str), Some("gpt"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn extended_entry_types() {
        assert_eq!(msdos_part_type(Some("0x5"), 2), PartType::Extended);
        assert_eq!(msdos_part_type(Some("0x83"), 5), PartType::Logical);
        assert_eq!(msdos_part_type(Some("0x83"), 1), PartType::Normal);
    }

    #[test]
    fn cache_reads_fake_sysfs_once() {
        let root = std::env::temp_dir().join(format!("autopart-sysfs-{}", std::process::id()));
        let dev = root.join("vdb");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("size"), "2097152\n").unwrap();

        let mut cache = SysfsCache::new(&root);
        assert_eq!(cache.attr_u64("vdb", "size"), Some(2_097_152));
        fs::write(dev.join("size"), "1\n").unwrap();
        // memoised value survives the change on disk
        assert_eq!(cache.attr_u64("vdb", "size"), Some(2_097_152));
        assert_eq!(cache.attr("vdb", "ro"), None);
        assert_eq!(cache.cached_entries(), 2);
        assert_eq!(cache.block_devices().unwrap(), vec!["vdb".to_string()]);

        fs::remove_dir_all(&root).unwrap();
    }
}
