//! Format type table
//!
//! Size limits, stage-1 flags and GPT identities for every format type the
//! planner can schedule.

use crate::disk::size::Size;
use crate::utils::error::Diagnostics;

/// GPT partition type GUIDs
pub mod partition_types {
    pub const EFI: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
    pub const BIOS_BOOT: &str = "21686148-6449-6E6F-744E-656564454649";
    pub const PREP_BOOT: &str = "9E1A2D38-C612-4316-AA26-8B49521E5A8B";
    pub const APPLE_BOOT: &str = "426F6F74-0000-11AA-AA11-00306543ECAC";
    pub const APPLE_HFS: &str = "48465300-0000-11AA-AA11-00306543ECAC";
    pub const XBOOTLDR: &str = "BC13C2FF-59E6-4262-A352-B275FD6F7172";
    pub const LINUX_SWAP: &str = "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F";
    pub const LINUX_ROOT_X86_64: &str = "4F68BCE3-E8CD-4DB1-96E7-FBCAF984B709";
    pub const LINUX_ROOT_ARM64: &str = "B921B045-1DF0-41C3-AF44-4C6F280D3FAE";
    pub const LINUX_ROOT_PPC64LE: &str = "C31C45E6-3F39-412E-80FB-4809C4980599";
    pub const LINUX_HOME: &str = "933AC7E1-2EB4-4F13-B844-0E14E2AEF915";
    pub const LINUX_LVM: &str = "E6D6D379-F507-44C2-A23C-238F2A3DF928";
    pub const LINUX_RAID: &str = "A19D880F-05FC-4D3B-A006-743F0F84911E";
    pub const LINUX_LUKS: &str = "CA7D7CCB-63ED-4C53-861C-1742536059CC";
    pub const LINUX_FILESYSTEM: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub name: &'static str,
    pub min_size: Size,
    /// Largest device the format can span; `None` when effectively unbounded.
    pub max_size: Option<Size>,
    pub mountable: bool,
    /// Firmware-visible bootloader partition.
    pub stage1: bool,
    /// Counts as Linux for `clearpart --linux`.
    pub linux_native: bool,
    pub type_guid: &'static str,
    /// Tool whose presence means the format can be created on this host.
    pub tool: Option<&'static str>,
}

use partition_types as pt;

static FORMATS: &[FormatInfo] = &[
    FormatInfo {
        name: "ext2",
        min_size: Size::mib(1),
        max_size: Some(Size::tib(8)),
        mountable: true,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_FILESYSTEM,
        tool: Some("mkfs.ext2"),
    },
    FormatInfo {
        name: "ext3",
        min_size: Size::mib(1),
        max_size: Some(Size::tib(16)),
        mountable: true,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_FILESYSTEM,
        tool: Some("mkfs.ext3"),
    },
    FormatInfo {
        name: "ext4",
        min_size: Size::mib(1),
        max_size: Some(Size::tib(16)),
        mountable: true,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_FILESYSTEM,
        tool: Some("mkfs.ext4"),
    },
    FormatInfo {
        name: "xfs",
        min_size: Size::mib(16),
        max_size: Some(Size::tib(16 * 1024)),
        mountable: true,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_FILESYSTEM,
        tool: Some("mkfs.xfs"),
    },
    FormatInfo {
        name: "btrfs",
        min_size: Size::mib(256),
        max_size: Some(Size::tib(16 * 1024)),
        mountable: true,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_FILESYSTEM,
        tool: Some("mkfs.btrfs"),
    },
    FormatInfo {
        name: "vfat",
        min_size: Size::mib(1),
        max_size: Some(Size::tib(2)),
        mountable: true,
        stage1: false,
        linux_native: false,
        type_guid: pt::LINUX_FILESYSTEM,
        tool: Some("mkfs.vfat"),
    },
    FormatInfo {
        name: "efi",
        min_size: Size::mib(20),
        max_size: Some(Size::tib(2)),
        mountable: true,
        stage1: true,
        linux_native: false,
        type_guid: pt::EFI,
        tool: Some("mkfs.vfat"),
    },
    FormatInfo {
        name: "macefi",
        min_size: Size::mib(20),
        max_size: Some(Size::tib(2)),
        mountable: true,
        stage1: true,
        linux_native: false,
        type_guid: pt::APPLE_HFS,
        tool: Some("mkfs.hfsplus"),
    },
    FormatInfo {
        name: "biosboot",
        min_size: Size::kib(512),
        max_size: Some(Size::mib(1)),
        mountable: false,
        stage1: true,
        linux_native: true,
        type_guid: pt::BIOS_BOOT,
        tool: None,
    },
    FormatInfo {
        name: "prepboot",
        min_size: Size::mib(4),
        max_size: Some(Size::mib(10)),
        mountable: false,
        stage1: true,
        linux_native: true,
        type_guid: pt::PREP_BOOT,
        tool: None,
    },
    FormatInfo {
        name: "appleboot",
        min_size: Size::kib(800),
        max_size: Some(Size::mib(1)),
        mountable: false,
        stage1: true,
        linux_native: false,
        type_guid: pt::APPLE_BOOT,
        tool: Some("mkfs.hfs"),
    },
    FormatInfo {
        name: "swap",
        min_size: Size::kib(40),
        max_size: Some(Size::tib(16)),
        mountable: false,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_SWAP,
        tool: Some("mkswap"),
    },
    FormatInfo {
        name: "lvmpv",
        min_size: Size::mib(4),
        max_size: None,
        mountable: false,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_LVM,
        tool: Some("lvm"),
    },
    FormatInfo {
        name: "mdmember",
        min_size: Size::mib(1),
        max_size: None,
        mountable: false,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_RAID,
        tool: Some("mdadm"),
    },
    FormatInfo {
        name: "luks",
        min_size: Size::mib(2),
        max_size: None,
        mountable: false,
        stage1: false,
        linux_native: true,
        type_guid: pt::LINUX_LUKS,
        tool: Some("cryptsetup"),
    },
    FormatInfo {
        name: "ntfs",
        min_size: Size::mib(1),
        max_size: Some(Size::tib(256)),
        mountable: true,
        stage1: false,
        linux_native: false,
        type_guid: "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7",
        tool: None,
    },
];

pub fn lookup(name: &str) -> Option<&'static FormatInfo> {
    FORMATS.iter().find(|f| f.name == name)
}

pub fn max_size(name: &str) -> Option<Size> {
    lookup(name).and_then(|f| f.max_size)
}

pub fn is_stage1(name: &str) -> bool {
    lookup(name).is_some_and(|f| f.stage1)
}

/// `clearpart --linux` treats unknown formats as foreign.
pub fn is_linux_native(name: &str) -> bool {
    lookup(name).is_some_and(|f| f.linux_native)
}

/// GPT type for a new partition.
pub fn type_guid_for(fs_type: &str, mountpoint: Option<&str>, arch: &str) -> &'static str {
    match (fs_type, mountpoint) {
        (_, Some("/")) if !is_stage1(fs_type) => match arch {
            "x86_64" => pt::LINUX_ROOT_X86_64,
            "aarch64" => pt::LINUX_ROOT_ARM64,
            "ppc64le" => pt::LINUX_ROOT_PPC64LE,
            _ => pt::LINUX_FILESYSTEM,
        },
        (_, Some("/home")) => pt::LINUX_HOME,
        (_, Some("/boot")) if fs_type != "efi" => pt::XBOOTLDR,
        _ => lookup(fs_type)
            .map(|f| f.type_guid)
            .unwrap_or(pt::LINUX_FILESYSTEM),
    }
}

/// GPT partition name for a new partition.
pub fn partition_name_for(fs_type: &str, mountpoint: Option<&str>) -> String {
    match (fs_type, mountpoint) {
        ("efi" | "macefi", _) => "EFI".to_string(),
        ("biosboot", _) => "BIOSBOOT".to_string(),
        ("prepboot", _) => "PREP".to_string(),
        ("appleboot", _) => "APPLEBOOT".to_string(),
        ("swap", _) => "SWAP".to_string(),
        ("lvmpv", _) => "LVM".to_string(),
        ("mdmember", _) => "RAID".to_string(),
        (_, Some("/")) => "ROOT".to_string(),
        (_, Some(mp)) => mp
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("DATA")
            .to_uppercase(),
        (fs, None) => fs.to_uppercase(),
    }
}

/// Keep the format types the host can create, skipping unknown ones.
pub fn supported_formats<'a>(
    wanted: &[&'a str],
    available: impl Fn(&FormatInfo) -> bool,
    diag: &mut Diagnostics,
) -> Vec<&'a str> {
    let mut out = Vec::new();
    for name in wanted {
        match lookup(name) {
            Some(info) if available(info) => out.push(*name),
            Some(_) => diag.warn(format!("format '{}' is not available, skipping", name)),
            None => diag.warn(format!("unknown format '{}', skipping", name)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage1_formats() {
        for fs in ["efi", "biosboot", "prepboot", "appleboot", "macefi"] {
            assert!(is_stage1(fs), "{} should be stage-1", fs);
        }
        assert!(!is_stage1("ext4"));
        assert!(!is_stage1("nonsense"));
    }

    #[test]
    fn root_type_depends_on_arch() {
        assert_eq!(
            type_guid_for("ext4", Some("/"), "x86_64"),
            partition_types::LINUX_ROOT_X86_64
        );
        assert_eq!(
            type_guid_for("xfs", Some("/"), "s390x"),
            partition_types::LINUX_FILESYSTEM
        );
        assert_eq!(type_guid_for("efi", Some("/boot/efi"), "x86_64"), partition_types::EFI);
        assert_eq!(type_guid_for("swap", None, "x86_64"), partition_types::LINUX_SWAP);
        assert_eq!(type_guid_for("ext4", Some("/boot"), "x86_64"), partition_types::XBOOTLDR);
    }

    #[test]
    fn partition_names() {
        assert_eq!(partition_name_for("ext4", Some("/")), "ROOT");
        assert_eq!(partition_name_for("ext4", Some("/var/log")), "LOG");
        assert_eq!(partition_name_for("efi", Some("/boot/efi")), "EFI");
        assert_eq!(partition_name_for("lvmpv", None), "LVM");
    }

    #[test]
    fn unsupported_formats_are_skipped_with_warning() {
        let mut diag = Diagnostics::default();
        let kept = supported_formats(&["ext4", "zfs", "btrfs"], |f| f.name != "btrfs", &mut diag);
        assert_eq!(kept, vec!["ext4"]);
        assert_eq!(diag.warnings.len(), 2);
        assert!(diag.errors.is_empty());
    }
}
