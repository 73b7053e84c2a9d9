//! Kickstart storage commands
//!
//! Reads `autopart`, `part`, `volgroup`, `logvol`, `raid`, `btrfs`,
//! `clearpart`, `ignoredisk`, `reqpart` and `bootloader --boot-drive` into a
//! solve input, and writes a finished plan back out as fixed-size commands.

pub mod parse;
pub mod render;

use crate::layout::requests::{EncryptionSettings, Layout};
use crate::layout::resolver::AutopartOptions;
use crate::layout::swap::{swap_suggestion, SwapPolicy};
use crate::partitioning::clear::ClearPartSettings;
use crate::solve::SolveInput;
use crate::utils::error::{Diagnostics, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub use parse::{parse_kickstart, tokenize};
pub use render::render_plan;

/// The storage commands of one kickstart file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KickstartStorage {
    pub autopart: Option<AutopartOptions>,
    pub layout: Layout,
    pub clearpart: Option<ClearPartSettings>,
    pub ignored_disks: Vec<String>,
    pub only_use: Vec<String>,
    pub boot_drive: Option<String>,
    pub encryption: Option<EncryptionSettings>,
    /// Swap requests sized from RAM, with their hibernation flag.
    pub recommended_swap: BTreeMap<String, bool>,
}

impl KickstartStorage {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        parse_kickstart(&text)
    }

    /// Replace the storage choices of `input` with these commands.
    pub fn apply(self, input: &mut SolveInput) {
        let mut layout = self.layout;
        for (name, hibernation) in &self.recommended_swap {
            let policy = SwapPolicy {
                cap: input.class.swap_cap,
                hibernation: *hibernation,
                clamp_to_disk: false,
            };
            let size = swap_suggestion(input.ram, None, &policy, &mut Diagnostics::default());
            debug!("recommended swap {} is {}", name, size);
            for p in layout.partitions.iter_mut().filter(|p| &p.name == name) {
                p.base_size = size;
            }
            for v in layout.volumes.iter_mut().filter(|v| &v.name == name) {
                v.base_size = size;
            }
        }

        input.autopart = self.autopart;
        input.layout = layout;
        if let Some(clear) = self.clearpart {
            input.clearpart = clear;
        }
        input.ignored_disks.extend(self.ignored_disks);
        input.only_use.extend(self.only_use);
        if self.boot_drive.is_some() {
            input.boot_disk = self.boot_drive;
        }
        if let Some(enc) = self.encryption {
            input.encryption = enc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::device::Disk;
    use crate::disk::size::Size;
    use crate::platform::Platform;

    #[test]
    fn applying_replaces_autopart() {
        let ks = parse_kickstart(
            "ignoredisk --drives=sdc\n\
             bootloader --boot-drive=/dev/sdb\n\
             part / --size=8192\n\
             part swap --recommended\n",
        )
        .unwrap();
        let mut input = SolveInput::new(
            Platform::X86Bios,
            vec![Disk::new("sda", 512, Size::gib(20))],
            Size::gib(4),
        );
        ks.apply(&mut input);

        assert!(input.autopart.is_none());
        assert_eq!(input.ignored_disks, vec!["sdc"]);
        assert_eq!(input.boot_disk.as_deref(), Some("sdb"));
        assert_eq!(input.layout.partition("swap").unwrap().base_size, Size::gib(4));
        assert_eq!(input.layout.partition("/").unwrap().base_size, Size::gib(8));
    }
}
