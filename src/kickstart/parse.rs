//! Kickstart storage command parsing
//!
//! Each storage command is a `clap` parser of its own; lines are split with a
//! small shell-like tokenizer first. Commands outside storage are skipped, as
//! are `%pre`, `%post` and `%packages` sections.

use crate::disk::btrfs::BtrfsLevel;
use crate::disk::disklabel::DiskLabelKind;
use crate::disk::raid::RaidLevel;
use crate::disk::size::Size;
use crate::kickstart::KickstartStorage;
use crate::layout::requests::{
    ContainerKind, ContainerRequest, EncryptionSettings, PartitionRequest, Scheme, VolumeRequest,
};
use crate::layout::resolver::AutopartOptions;
use crate::partitioning::clear::{ClearPartSettings, ClearPolicy};
use crate::utils::error::{LayoutError, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:"[^"]*"|'[^']*'|[^\s"'])+"#).expect("token pattern is valid")
});

/// Split a line into words, honouring single and double quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let quotes = line.chars().filter(|c| *c == '"').count();
    if quotes % 2 != 0 {
        return Err(LayoutError::Kickstart {
            line: 0,
            message: "unterminated quote".to_string(),
        });
    }
    Ok(TOKEN_RE
        .find_iter(line)
        .map(|m| m.as_str().replace(['"', '\''], ""))
        .collect())
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_start_matches("/dev/").to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Parser, Debug)]
#[command(name = "autopart")]
struct AutopartCmd {
    #[arg(long = "type")]
    scheme: Option<String>,
    #[arg(long)]
    fstype: Option<String>,
    #[arg(long)]
    nohome: bool,
    #[arg(long)]
    noboot: bool,
    #[arg(long)]
    noswap: bool,
    #[arg(long)]
    hibernation: bool,
    #[arg(long)]
    encrypted: bool,
    #[arg(long)]
    passphrase: Option<String>,
    #[arg(long)]
    cipher: Option<String>,
    #[arg(long)]
    escrowcert: Option<String>,
    #[arg(long = "luks-version")]
    luks_version: Option<String>,
    #[arg(long)]
    pbkdf: Option<String>,
    #[arg(long = "pbkdf-memory")]
    pbkdf_memory: Option<u32>,
    #[arg(long = "pbkdf-iterations")]
    pbkdf_iterations: Option<u32>,
}

/// Options shared by every command that can encrypt.
#[derive(clap::Args, Debug, Default)]
struct LuksArgs {
    #[arg(long)]
    encrypted: bool,
    #[arg(long)]
    passphrase: Option<String>,
    #[arg(long)]
    cipher: Option<String>,
    #[arg(long = "luks-version")]
    luks_version: Option<String>,
}

// label, fsoptions: accepted, not part of the layout
#[allow(dead_code)]
#[derive(Parser, Debug)]
#[command(name = "part")]
struct PartCmd {
    mountpoint: String,
    /// MiB
    #[arg(long)]
    size: Option<u64>,
    #[arg(long)]
    maxsize: Option<u64>,
    #[arg(long)]
    grow: bool,
    #[arg(long)]
    fstype: Option<String>,
    #[arg(long, alias = "ondrive")]
    ondisk: Option<String>,
    #[arg(long)]
    asprimary: bool,
    #[arg(long)]
    recommended: bool,
    #[arg(long)]
    hibernation: bool,
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    fsoptions: Option<String>,
    #[arg(long)]
    onpart: Option<String>,
    #[command(flatten)]
    luks: LuksArgs,
}

#[derive(Parser, Debug)]
#[command(name = "volgroup")]
struct VolgroupCmd {
    name: String,
    members: Vec<String>,
    /// KiB
    #[arg(long)]
    pesize: Option<u64>,
    #[arg(long)]
    useexisting: bool,
}

#[derive(Parser, Debug)]
#[command(name = "logvol")]
struct LogvolCmd {
    mountpoint: String,
    #[arg(long)]
    vgname: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    size: Option<u64>,
    #[arg(long)]
    maxsize: Option<u64>,
    #[arg(long)]
    grow: bool,
    #[arg(long)]
    percent: Option<u32>,
    #[arg(long)]
    fstype: Option<String>,
    #[arg(long)]
    thinpool: bool,
    #[arg(long)]
    thin: bool,
    #[arg(long)]
    poolname: Option<String>,
    #[arg(long)]
    recommended: bool,
    #[arg(long)]
    hibernation: bool,
    #[command(flatten)]
    luks: LuksArgs,
}

#[derive(Parser, Debug)]
#[command(name = "raid")]
struct RaidCmd {
    mountpoint: String,
    members: Vec<String>,
    #[arg(long)]
    device: String,
    #[arg(long)]
    level: String,
    #[arg(long)]
    fstype: Option<String>,
    #[command(flatten)]
    luks: LuksArgs,
}

#[derive(Parser, Debug)]
#[command(name = "btrfs")]
struct BtrfsCmd {
    mountpoint: String,
    members: Vec<String>,
    #[arg(long)]
    data: Option<String>,
    #[arg(long)]
    metadata: Option<String>,
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    subvol: bool,
    #[arg(long)]
    name: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "clearpart")]
struct ClearpartCmd {
    #[arg(long)]
    all: bool,
    #[arg(long)]
    linux: bool,
    #[arg(long)]
    none: bool,
    #[arg(long)]
    list: Option<String>,
    #[arg(long)]
    drives: Option<String>,
    #[arg(long)]
    initlabel: bool,
    #[arg(long)]
    disklabel: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "ignoredisk")]
struct IgnorediskCmd {
    #[arg(long)]
    drives: Option<String>,
    #[arg(long = "only-use")]
    only_use: Option<String>,
}

#[allow(dead_code)]
#[derive(Parser, Debug)]
#[command(name = "bootloader")]
struct BootloaderCmd {
    #[arg(long = "boot-drive")]
    boot_drive: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    append: Option<String>,
    #[arg(long)]
    driveorder: Option<String>,
    #[arg(long)]
    timeout: Option<u32>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    iscrypted: bool,
    #[arg(long)]
    leavebootorder: bool,
}

#[derive(Parser, Debug)]
#[command(name = "reqpart")]
struct ReqpartCmd {
    #[arg(long = "add-boot")]
    add_boot: bool,
}

fn mib(n: u64) -> Size {
    Size::mib(n)
}

fn encryption_from(luks: &LuksArgs) -> Option<EncryptionSettings> {
    if luks.passphrase.is_none() && luks.cipher.is_none() && luks.luks_version.is_none() {
        return None;
    }
    let mut settings = EncryptionSettings {
        passphrase: luks.passphrase.clone(),
        cipher: luks.cipher.clone(),
        ..EncryptionSettings::default()
    };
    if let Some(v) = &luks.luks_version {
        settings.luks_version = v.clone();
    }
    Some(settings)
}

/// Parser state across lines.
#[derive(Default)]
struct KickstartParser {
    out: KickstartStorage,
    /// `pv.01`-style names standing for md arrays.
    aliases: BTreeMap<String, String>,
    /// btrfs labels to their container names.
    btrfs_volumes: BTreeMap<String, String>,
}

fn level_string<T: std::str::FromStr<Err = LayoutError> + std::fmt::Display>(
    level: &str,
) -> Result<String> {
    Ok(level.parse::<T>()?.to_string())
}

impl KickstartParser {
    fn merge_encryption(&mut self, settings: Option<EncryptionSettings>) {
        if let Some(s) = settings {
            if self.out.encryption.is_none() {
                self.out.encryption = Some(s);
            }
        }
    }

    fn autopart(&mut self, cmd: AutopartCmd) -> Result<()> {
        if !self.out.layout.is_empty() {
            debug!("autopart combined with explicit requests");
        }
        let scheme = cmd.scheme.as_deref().map(str::parse::<Scheme>).transpose()?;
        self.out.autopart = Some(AutopartOptions {
            scheme,
            encrypted: cmd.encrypted,
            fs_type: cmd.fstype,
            no_home: cmd.nohome,
            no_swap: cmd.noswap,
            no_boot: cmd.noboot,
            hibernation: cmd.hibernation,
            ..AutopartOptions::default()
        });
        if cmd.encrypted {
            let mut settings = EncryptionSettings {
                passphrase: cmd.passphrase,
                cipher: cmd.cipher,
                escrow_cert: cmd.escrowcert,
                pbkdf: cmd.pbkdf,
                pbkdf_memory: cmd.pbkdf_memory,
                pbkdf_iterations: cmd.pbkdf_iterations,
                ..EncryptionSettings::default()
            };
            if let Some(v) = cmd.luks_version {
                settings.luks_version = v;
            }
            self.out.encryption = Some(settings);
        }
        Ok(())
    }

    fn part(&mut self, cmd: PartCmd) -> Result<()> {
        if let Some(existing) = cmd.onpart {
            return Err(LayoutError::Kickstart {
                line: 0,
                message: format!("--onpart={} reuses an existing partition", existing),
            });
        }
        let token = cmd.mountpoint.as_str();
        let fs_type = match (&cmd.fstype, token) {
            (Some(fs), _) => fs.clone(),
            (None, "swap") => "swap".to_string(),
            (None, "biosboot") => "biosboot".to_string(),
            (None, "prepboot") => "prepboot".to_string(),
            (None, t) if t.starts_with("pv.") => "lvmpv".to_string(),
            (None, t) if t.starts_with("raid.") => "mdmember".to_string(),
            (None, t) if t.starts_with("btrfs.") => "btrfs".to_string(),
            (None, _) => "ext4".to_string(),
        };
        let mut req = if token.starts_with('/') {
            PartitionRequest::mounted(token, &fs_type, mib(cmd.size.unwrap_or(1)))
        } else {
            PartitionRequest::new(self.unique_name(token), fs_type, mib(cmd.size.unwrap_or(1)))
        };
        if cmd.grow {
            req = req.grow(cmd.maxsize.map(mib));
        }
        req.primary_only = cmd.asprimary;
        req.encrypted = cmd.luks.encrypted;
        if let Some(disks) = &cmd.ondisk {
            req.required_disks = comma_list(disks);
        }
        if cmd.recommended || cmd.hibernation {
            self.out.recommended_swap.insert(req.name.clone(), cmd.hibernation);
        }
        self.merge_encryption(encryption_from(&cmd.luks));
        self.out.layout.partitions.push(req);
        Ok(())
    }

    /// `swap` may be requested more than once.
    fn unique_name(&self, base: &str) -> String {
        let taken = |n: &str| self.out.layout.partitions.iter().any(|p| p.name == n);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}.{}", base, i))
            .find(|n| !taken(n))
            .unwrap_or_else(|| base.to_string())
    }

    fn member(&self, name: &str) -> String {
        self.aliases.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    fn volgroup(&mut self, cmd: VolgroupCmd) -> Result<()> {
        if cmd.useexisting {
            return Err(LayoutError::Kickstart {
                line: 0,
                message: format!("volgroup {} --useexisting reuses an existing group", cmd.name),
            });
        }
        let members = cmd.members.iter().map(|m| self.member(m)).collect();
        let mut vg = ContainerRequest::new(cmd.name, ContainerKind::Lvm, members);
        vg.pe_size = cmd.pesize.map(Size::kib);
        self.out.layout.containers.push(vg);
        Ok(())
    }

    fn logvol(&mut self, cmd: LogvolCmd) -> Result<()> {
        let fs_type = match (&cmd.fstype, cmd.mountpoint.as_str()) {
            _ if cmd.thinpool => String::new(),
            (Some(fs), _) => fs.clone(),
            (None, "swap") => "swap".to_string(),
            (None, _) => "ext4".to_string(),
        };
        let mut vol = VolumeRequest::new(
            cmd.name,
            cmd.vgname,
            fs_type,
            mib(cmd.size.unwrap_or(0)),
        );
        if cmd.mountpoint.starts_with('/') {
            vol.mountpoint = Some(cmd.mountpoint.clone());
        }
        if cmd.grow {
            vol = vol.grow(cmd.maxsize.map(mib));
        }
        vol.percent = cmd.percent;
        vol.thin_pool = cmd.thinpool;
        vol.thin = cmd.thin;
        vol.pool = cmd.poolname;
        vol.encrypted = cmd.luks.encrypted;
        if vol.thin && vol.pool.is_none() {
            return Err(LayoutError::Kickstart {
                line: 0,
                message: format!("thin volume {} needs --poolname", vol.name),
            });
        }
        if cmd.recommended || cmd.hibernation {
            self.out.recommended_swap.insert(vol.name.clone(), cmd.hibernation);
        }
        self.merge_encryption(encryption_from(&cmd.luks));
        self.out.layout.volumes.push(vol);
        Ok(())
    }

    fn raid(&mut self, cmd: RaidCmd) -> Result<()> {
        let name = cmd.device.trim_start_matches("/dev/").to_string();
        let mut md = ContainerRequest::new(name.clone(), ContainerKind::Md, cmd.members);
        md.level = Some(level_string::<RaidLevel>(&cmd.level)?);
        md.encrypted = cmd.luks.encrypted;
        let token = cmd.mountpoint.as_str();
        if token.starts_with("pv.") || token.starts_with("btrfs.") {
            self.aliases.insert(token.to_string(), name);
        } else {
            md.fs_type = Some(cmd.fstype.unwrap_or_else(|| {
                if token == "swap" {
                    "swap".to_string()
                } else {
                    "ext4".to_string()
                }
            }));
            md.mountpoint = token.starts_with('/').then(|| token.to_string());
        }
        self.merge_encryption(encryption_from(&cmd.luks));
        self.out.layout.containers.push(md);
        Ok(())
    }

    fn btrfs(&mut self, cmd: BtrfsCmd) -> Result<()> {
        let mountpoint = cmd
            .mountpoint
            .starts_with('/')
            .then(|| cmd.mountpoint.clone());
        if cmd.subvol {
            let [parent] = cmd.members.as_slice() else {
                return Err(LayoutError::Kickstart {
                    line: 0,
                    message: "btrfs --subvol takes exactly one parent volume".to_string(),
                });
            };
            let container = self
                .btrfs_volumes
                .get(parent)
                .cloned()
                .unwrap_or_else(|| parent.clone());
            let name = cmd
                .name
                .ok_or_else(|| LayoutError::Kickstart {
                    line: 0,
                    message: "btrfs --subvol needs --name".to_string(),
                })?;
            let mut vol = VolumeRequest::new(name, container, "btrfs", Size::ZERO);
            vol.mountpoint = mountpoint;
            self.out.layout.volumes.push(vol);
            return Ok(());
        }

        let name = cmd
            .label
            .clone()
            .unwrap_or_else(|| format!("btrfs{}", self.btrfs_volumes.len()));
        let members = cmd.members.iter().map(|m| self.member(m)).collect();
        let mut volume = ContainerRequest::new(name.clone(), ContainerKind::Btrfs, members);
        volume.level = cmd.data.as_deref().map(level_string::<BtrfsLevel>).transpose()?;
        volume.metadata_level = cmd
            .metadata
            .as_deref()
            .map(level_string::<BtrfsLevel>)
            .transpose()?;
        volume.fs_type = Some("btrfs".to_string());
        volume.mountpoint = mountpoint;
        if cmd.mountpoint != "none" && !cmd.mountpoint.starts_with('/') {
            self.btrfs_volumes.insert(cmd.mountpoint.clone(), name.clone());
        }
        self.btrfs_volumes.insert(name.clone(), name);
        self.out.layout.containers.push(volume);
        Ok(())
    }

    fn clearpart(&mut self, cmd: ClearpartCmd) -> Result<()> {
        let policy = match (cmd.all, cmd.linux, cmd.none, &cmd.list) {
            (true, _, _, _) => ClearPolicy::All,
            (_, true, _, _) => ClearPolicy::Linux,
            (_, _, _, Some(_)) => ClearPolicy::List,
            _ => ClearPolicy::None,
        };
        self.out.clearpart = Some(ClearPartSettings {
            policy,
            drives: cmd.drives.as_deref().map(comma_list).unwrap_or_default(),
            devices: cmd.list.as_deref().map(comma_list).unwrap_or_default(),
            initlabel: cmd.initlabel,
            disklabel: cmd
                .disklabel
                .as_deref()
                .map(str::parse::<DiskLabelKind>)
                .transpose()?,
        });
        Ok(())
    }

    fn ignoredisk(&mut self, cmd: IgnorediskCmd) {
        if let Some(d) = cmd.drives {
            self.out.ignored_disks.extend(comma_list(&d));
        }
        if let Some(d) = cmd.only_use {
            self.out.only_use.extend(comma_list(&d));
        }
    }

    fn command(&mut self, words: &[String]) -> Result<()> {
        macro_rules! parsed {
            ($cmd:ty) => {
                <$cmd>::try_parse_from(words).map_err(|e| LayoutError::Kickstart {
                    line: 0,
                    message: e.to_string().lines().next().unwrap_or_default().to_string(),
                })?
            };
        }
        match words[0].as_str() {
            "autopart" => self.autopart(parsed!(AutopartCmd)),
            "part" | "partition" => self.part(parsed!(PartCmd)),
            "volgroup" => self.volgroup(parsed!(VolgroupCmd)),
            "logvol" => self.logvol(parsed!(LogvolCmd)),
            "raid" => self.raid(parsed!(RaidCmd)),
            "btrfs" => self.btrfs(parsed!(BtrfsCmd)),
            "clearpart" => self.clearpart(parsed!(ClearpartCmd)),
            "zerombr" => Ok(()),
            "ignoredisk" => {
                self.ignoredisk(parsed!(IgnorediskCmd));
                Ok(())
            }
            "bootloader" => {
                let cmd = parsed!(BootloaderCmd);
                if cmd.boot_drive.is_some() {
                    self.out.boot_drive = cmd.boot_drive.map(|d| d.trim_start_matches("/dev/").to_string());
                }
                Ok(())
            }
            "reqpart" => {
                let cmd = parsed!(ReqpartCmd);
                if cmd.add_boot {
                    self.out
                        .layout
                        .partitions
                        .push(PartitionRequest::mounted("/boot", "ext4", Size::gib(1)));
                }
                Ok(())
            }
            other => {
                debug!("skipping kickstart command {}", other);
                Ok(())
            }
        }
    }
}

/// Parse the storage part of a kickstart file.
pub fn parse_kickstart(text: &str) -> Result<KickstartStorage> {
    let mut parser = KickstartParser::default();
    let mut in_section = false;
    for (i, raw) in text.lines().enumerate() {
        let lineno = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('%') {
            in_section = !line.starts_with("%end");
            continue;
        }
        if in_section {
            continue;
        }
        let at_line = |e: LayoutError| match e {
            LayoutError::Kickstart { message, .. } => LayoutError::Kickstart {
                line: lineno,
                message,
            },
            other => LayoutError::Kickstart {
                line: lineno,
                message: other.to_string(),
            },
        };
        let words = tokenize(line).map_err(at_line)?;
        if words.is_empty() {
            continue;
        }
        parser.command(&words).map_err(at_line)?;
    }

    if parser.out.autopart.is_some() && !parser.out.layout.partitions.is_empty() {
        let mountpoints: Vec<String> = parser
            .out
            .layout
            .mountpoints()
            .into_iter()
            .map(str::to_string)
            .collect();
        if let Some(opts) = parser.out.autopart.as_mut() {
            opts.exclude_mountpoints = mountpoints;
        }
    }
    Ok(parser.out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_keeps_quoted_words() {
        let words = tokenize(r#"part / --fstype="ext4" --label 'my root'"#).unwrap();
        assert_eq!(words, vec!["part", "/", "--fstype=ext4", "--label", "my root"]);
        assert!(tokenize(r#"part / --label "oops"#).is_err());
    }

    #[test]
    fn autopart_with_encryption() {
        let ks = parse_kickstart(
            "autopart --type=thinp --nohome --encrypted --passphrase=secret --luks-version=luks1\n",
        )
        .unwrap();
        let opts = ks.autopart.unwrap();
        assert_eq!(opts.scheme, Some(Scheme::Thinp));
        assert!(opts.no_home && opts.encrypted);
        let enc = ks.encryption.unwrap();
        assert_eq!(enc.passphrase.as_deref(), Some("secret"));
        assert_eq!(enc.luks_version, "luks1");
    }

    #[test]
    fn manual_lvm_layout() {
        let ks = parse_kickstart(
            "# storage\n\
             clearpart --all --initlabel --drives=sda,sdb --disklabel=gpt\n\
             ignoredisk --only-use=sda,sdb\n\
             bootloader --location=mbr --boot-drive=sda\n\
             part biosboot --fstype=biosboot --size=1 --ondisk=sda\n\
             part /boot --fstype=xfs --size=1024 --asprimary\n\
             part pv.01 --size=500 --grow --ondisk=sda\n\
             part swap --size=2048\n\
             volgroup vg0 pv.01 --pesize=8192\n\
             logvol / --vgname=vg0 --name=root --size=4096 --grow --maxsize=51200\n\
             logvol /var --vgname=vg0 --name=var --percent=20\n\
             %packages\n\
             part /ignored --size=1\n\
             %end\n",
        )
        .unwrap();

        let clear = ks.clearpart.unwrap();
        assert_eq!(clear.policy, ClearPolicy::All);
        assert_eq!(clear.drives, vec!["sda", "sdb"]);
        assert!(clear.initlabel);
        assert_eq!(clear.disklabel, Some(DiskLabelKind::Gpt));
        assert_eq!(ks.only_use, vec!["sda", "sdb"]);
        assert_eq!(ks.boot_drive.as_deref(), Some("sda"));

        let layout = &ks.layout;
        assert_eq!(layout.partitions.len(), 4);
        let boot = layout.partition("/boot").unwrap();
        assert_eq!(boot.fs_type, "xfs");
        assert!(boot.primary_only);
        let pv = layout.partition("pv.01").unwrap();
        assert_eq!(pv.fs_type, "lvmpv");
        assert!(pv.grow && pv.max_size.is_none());
        assert_eq!(pv.required_disks, vec!["sda"]);
        assert_eq!(layout.partition("swap").unwrap().fs_type, "swap");

        let vg = layout.container("vg0").unwrap();
        assert_eq!(vg.members, vec!["pv.01"]);
        assert_eq!(vg.pe_size, Some(Size::mib(8)));
        let root = &layout.volumes[0];
        assert_eq!(root.mountpoint.as_deref(), Some("/"));
        assert_eq!(root.max_size, Some(Size::gib(50)));
        assert_eq!(layout.volumes[1].percent, Some(20));
        assert!(layout.partition("/ignored").is_none());
    }

    #[test]
    fn raid_as_physical_volume() {
        let ks = parse_kickstart(
            "part raid.01 --size=1024 --ondisk=sda\n\
             part raid.02 --size=1024 --ondisk=sdb\n\
             raid pv.md --device=md0 --level=RAID1 raid.01 raid.02\n\
             volgroup vg0 pv.md\n\
             logvol / --vgname=vg0 --name=root --size=512 --grow\n",
        )
        .unwrap();
        let md = ks.layout.container("md0").unwrap();
        assert_eq!(md.level.as_deref(), Some("raid1"));
        assert!(md.fs_type.is_none());
        assert_eq!(ks.layout.container("vg0").unwrap().members, vec!["md0"]);
        assert!(ks.layout.validate().is_ok());
    }

    #[test]
    fn btrfs_volume_and_subvolumes() {
        let ks = parse_kickstart(
            "part btrfs.01 --size=1000 --grow\n\
             btrfs none --label=fedora --data=single btrfs.01\n\
             btrfs / --subvol --name=root fedora\n\
             btrfs /home --subvol --name=home fedora\n",
        )
        .unwrap();
        let vol = ks.layout.container("fedora").unwrap();
        assert_eq!(vol.kind, ContainerKind::Btrfs);
        assert_eq!(vol.level.as_deref(), Some("single"));
        assert_eq!(ks.layout.volumes.len(), 2);
        assert!(ks.layout.volumes.iter().all(|v| v.container == "fedora"));
    }

    #[test]
    fn errors_carry_the_line_number() {
        let err = parse_kickstart("part / --size=1024\npart /home --bogus\n").unwrap_err();
        assert!(matches!(err, LayoutError::Kickstart { line: 2, .. }));
        let err = parse_kickstart("\n\nlogvol / --vgname=vg0 --name=root --thin\n").unwrap_err();
        assert!(matches!(err, LayoutError::Kickstart { line: 3, .. }));
    }

    #[test]
    fn repeated_swap_gets_distinct_names() {
        let ks = parse_kickstart("part swap --size=1024\npart swap --recommended\n").unwrap();
        let names: Vec<&str> = ks.layout.partitions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["swap", "swap.1"]);
        assert_eq!(ks.recommended_swap.get("swap.1"), Some(&false));
    }
}
