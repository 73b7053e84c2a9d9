//! Default layout resolution
//!
//! Turns a platform, an install class and the autopart choices into a request
//! list: the base requests (`/`, `/home`, swap), the containers the scheme
//! needs, and the firmware partitions the platform mandates.

use crate::disk::formats::{self, FormatInfo};
use crate::disk::size::Size;
use crate::layout::requests::{
    ContainerKind, ContainerRequest, Layout, PartitionRequest, Scheme, VolumeRequest,
};
use crate::layout::swap::{swap_suggestion, SwapPolicy};
use crate::platform::{InstallClassProfile, PlatformProfile};
use crate::utils::error::{Diagnostics, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Base size of the implicit member partition scheduled on every disk.
pub const IMPLICIT_MEMBER_SIZE: Size = Size::mib(500);

/// Autopart choices, as given by `autopart` in kickstart or the layout file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutopartOptions {
    #[serde(default)]
    pub scheme: Option<Scheme>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub fs_type: Option<String>,
    #[serde(default)]
    pub no_home: bool,
    #[serde(default)]
    pub no_swap: bool,
    #[serde(default)]
    pub no_boot: bool,
    #[serde(default)]
    pub hibernation: bool,
    #[serde(default)]
    pub clamp_swap: bool,
    /// Mountpoints the caller lays out itself.
    #[serde(default)]
    pub exclude_mountpoints: Vec<String>,
}

/// Facts about the machine the resolver needs.
#[derive(Debug, Clone)]
pub struct ResolverContext<'a> {
    pub platform: &'a PlatformProfile,
    pub class: &'a InstallClassProfile,
    pub ram: Size,
    pub disk_space: Size,
    /// Disks that get an implicit member partition.
    pub disks: &'a [String],
    /// Name for the VG or btrfs volume, already checked against existing ones.
    pub container_name: String,
}

/// One of the default requests before it is bound to a partition or volume.
#[derive(Debug, Clone)]
struct BaseSpec {
    mountpoint: Option<&'static str>,
    fs_type: String,
    size: Size,
    max_size: Option<Size>,
    grow: bool,
    required_space: Size,
}

impl BaseSpec {
    fn name(&self) -> String {
        self.mountpoint.unwrap_or("swap").to_string()
    }
}

fn base_specs(
    opts: &AutopartOptions,
    ctx: &ResolverContext<'_>,
    fs: &str,
    diag: &mut Diagnostics,
) -> Vec<BaseSpec> {
    let class = ctx.class;
    let mut specs = vec![BaseSpec {
        mountpoint: Some("/"),
        fs_type: fs.to_string(),
        size: class.root_base,
        max_size: Some(class.root_max),
        grow: true,
        required_space: Size::ZERO,
    }];
    if !opts.no_home {
        specs.push(BaseSpec {
            mountpoint: Some("/home"),
            fs_type: fs.to_string(),
            size: class.home_base,
            max_size: None,
            grow: true,
            required_space: class.home_required_space,
        });
    }
    if !opts.no_swap {
        let policy = SwapPolicy {
            cap: class.swap_cap,
            hibernation: opts.hibernation,
            // off unless `clamp_swap` is set; see `swap_suggestion`
            clamp_to_disk: opts.clamp_swap,
        };
        specs.push(BaseSpec {
            mountpoint: None,
            fs_type: "swap".to_string(),
            size: swap_suggestion(ctx.ram, Some(ctx.disk_space), &policy, diag),
            max_size: None,
            grow: false,
            required_space: Size::ZERO,
        });
    }

    specs.retain(|s| {
        if s.required_space > Size::ZERO && ctx.disk_space < s.required_space {
            debug!(
                "dropping {}: needs {} of disk space, have {}",
                s.name(),
                s.required_space,
                ctx.disk_space
            );
            return false;
        }
        if let Some(mp) = s.mountpoint {
            if opts.exclude_mountpoints.iter().any(|e| e == mp) {
                debug!("dropping {}: laid out by the caller", mp);
                return false;
            }
        }
        true
    });
    specs
}

fn as_partition(spec: &BaseSpec, encrypted: bool) -> PartitionRequest {
    let mut req = PartitionRequest::new(spec.name(), spec.fs_type.clone(), spec.size);
    req.mountpoint = spec.mountpoint.map(str::to_string);
    req.grow = spec.grow;
    req.max_size = spec.max_size;
    req.required_space = spec.required_space;
    req.encrypted = encrypted;
    req
}

fn as_volume(spec: &BaseSpec, container: &str) -> VolumeRequest {
    let name = crate::disk::lvm::lv_name_for(spec.mountpoint, &spec.fs_type);
    let mut vol = VolumeRequest::new(name, container, spec.fs_type.clone(), spec.size);
    vol.mountpoint = spec.mountpoint.map(str::to_string);
    vol.grow = spec.grow;
    vol.max_size = spec.max_size;
    vol.required_space = spec.required_space;
    vol
}

/// Produce the request list for automatic partitioning.
pub fn resolve(
    opts: &AutopartOptions,
    ctx: &ResolverContext<'_>,
    diag: &mut Diagnostics,
) -> Result<Layout> {
    ctx.platform.validate()?;
    let scheme = opts.scheme.unwrap_or(ctx.class.default_scheme);
    let fs = match (scheme, opts.fs_type.as_deref()) {
        (Scheme::Btrfs, _) => "btrfs".to_string(),
        (_, Some(fs)) => fs.to_string(),
        (_, None) => ctx.class.default_fs.to_string(),
    };
    info!(
        "Resolving {} autopart layout for {} ({} RAM, {} disk space)",
        scheme, ctx.platform.platform, ctx.ram, ctx.disk_space
    );

    let specs = base_specs(opts, ctx, &fs, diag);
    let mut layout = Layout::default();

    match scheme {
        Scheme::Plain => {
            layout
                .partitions
                .extend(specs.iter().map(|s| as_partition(s, opts.encrypted)));
        }
        Scheme::Lvm | Scheme::Thinp => {
            let vg = ctx.container_name.clone();
            let mut volumes: Vec<VolumeRequest> = specs.iter().map(|s| as_volume(s, &vg)).collect();
            if scheme == Scheme::Thinp {
                let pool_name = ctx.class.thin_pool_name.to_string();
                let mut pool_base = Size::ZERO;
                for v in volumes.iter_mut().filter(|v| v.fs_type != "swap") {
                    v.thin = true;
                    v.pool = Some(pool_name.clone());
                    pool_base += v.base_size;
                }
                let mut pool = VolumeRequest::new(pool_name, vg.clone(), "", pool_base);
                pool.thin_pool = true;
                pool.grow = true;
                volumes.push(pool);
            }
            layout.volumes = volumes;
            layout.containers.push(ContainerRequest::new(
                vg,
                ContainerKind::Lvm,
                implicit_members(ctx.disks, "pv", "lvmpv", opts.encrypted, &mut layout.partitions),
            ));
        }
        Scheme::Btrfs => {
            let name = ctx.container_name.clone();
            for spec in &specs {
                if spec.fs_type == "swap" {
                    layout.partitions.push(as_partition(spec, opts.encrypted));
                } else {
                    let mut vol = as_volume(spec, &name);
                    vol.name = crate::disk::btrfs::subvolume_name_for(spec.mountpoint.unwrap_or("/"));
                    layout.volumes.push(vol);
                }
            }
            let mut volume = ContainerRequest::new(
                name,
                ContainerKind::Btrfs,
                implicit_members(ctx.disks, "btrfs", "btrfs", opts.encrypted, &mut layout.partitions),
            );
            volume.fs_type = Some("btrfs".to_string());
            layout.containers.push(volume);
        }
    }

    extend_for_platform(opts, ctx, &fs, &mut layout, diag);

    for req in &mut layout.partitions {
        req.weight = ctx.platform.weight(&req.fs_type, req.mountpoint.as_deref());
    }
    debug!(
        "resolved {} partitions, {} containers, {} volumes",
        layout.partitions.len(),
        layout.containers.len(),
        layout.volumes.len()
    );
    Ok(layout)
}

/// One growable member partition per disk, returning their names.
fn implicit_members(
    disks: &[String],
    prefix: &str,
    fs_type: &str,
    encrypted: bool,
    partitions: &mut Vec<PartitionRequest>,
) -> Vec<String> {
    disks
        .iter()
        .map(|disk| {
            let name = format!("{}.{}", prefix, disk);
            let mut req = PartitionRequest::new(name.clone(), fs_type, IMPLICIT_MEMBER_SIZE)
                .grow(None)
                .on_disk(disk);
            req.encrypted = encrypted;
            partitions.push(req);
            name
        })
        .collect()
}

/// Add /boot and the firmware partition.
fn extend_for_platform(
    opts: &AutopartOptions,
    ctx: &ResolverContext<'_>,
    fs: &str,
    layout: &mut Layout,
    diag: &mut Diagnostics,
) {
    let firmware_reads_boot = ctx
        .platform
        .stage1
        .as_ref()
        .is_some_and(|s| s.format_types.is_empty() && s.mountpoints.contains(&"/boot"));
    let boot_fs = if fs == "btrfs" { "ext4" } else { fs };

    if opts.no_boot && firmware_reads_boot {
        diag.warn(format!(
            "{} boots from /boot; keeping /boot despite --noboot",
            ctx.platform.platform
        ));
    }
    if (!opts.no_boot || firmware_reads_boot)
        && !opts.exclude_mountpoints.iter().any(|m| m == "/boot")
    {
        layout.partitions.push(PartitionRequest::mounted(
            "/boot",
            boot_fs,
            ctx.platform.boot_size,
        ));
    }

    if let Some(stage1) = &ctx.platform.stage1_partition {
        let excluded = stage1
            .mountpoint
            .as_ref()
            .is_some_and(|mp| opts.exclude_mountpoints.contains(mp));
        if !excluded {
            layout.partitions.push(stage1.clone());
        }
    }
}

/// Schemes whose member formats the host can create. Unknown or missing
/// formats are skipped with a warning.
pub fn supported_schemes(
    available: impl Fn(&FormatInfo) -> bool,
    diag: &mut Diagnostics,
) -> Vec<Scheme> {
    Scheme::all()
        .into_iter()
        .filter(|s| match s.member_format() {
            None => true,
            Some(fmt) => !formats::supported_formats(&[fmt], &available, diag).is_empty(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{InstallClass, Platform};

    fn resolve_for(
        platform: Platform,
        scheme: Scheme,
        ram: Size,
        disk_space: Size,
        disks: &[String],
    ) -> Layout {
        let profile = platform.profile();
        let class = InstallClass::Default.profile();
        let ctx = ResolverContext {
            platform: &profile,
            class: &class,
            ram,
            disk_space,
            disks,
            container_name: "vg0".to_string(),
        };
        let opts = AutopartOptions {
            scheme: Some(scheme),
            ..Default::default()
        };
        resolve(&opts, &ctx, &mut Diagnostics::default()).unwrap()
    }

    fn sda() -> Vec<String> {
        vec!["sda".to_string()]
    }

    #[test]
    fn plain_bios_drops_home_on_small_disk() {
        let layout = resolve_for(Platform::X86Bios, Scheme::Plain, Size::gib(4), Size::gib(20), &sda());
        let names: Vec<&str> = layout.partitions.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"/"));
        assert!(names.contains(&"swap"));
        assert!(names.contains(&"/boot"));
        assert!(names.contains(&"biosboot"));
        assert!(!names.contains(&"/home"));

        let swap = layout.partition("swap").unwrap();
        assert_eq!(swap.base_size, Size::gib(4));
        assert_eq!(layout.partition("biosboot").unwrap().weight, 5000);
        assert_eq!(layout.partition("/boot").unwrap().weight, 2000);
        let root = layout.partition("/").unwrap();
        assert!(root.grow);
        assert_eq!(root.max_size, Some(Size::gib(50)));
    }

    #[test]
    fn lvm_efi_keeps_home_with_enough_space() {
        let layout = resolve_for(Platform::X86Efi, Scheme::Lvm, Size::gib(8), Size::gib(50), &sda());
        assert!(layout.partition("/boot/efi").is_some());
        assert!(layout.partition("pv.sda").is_some());
        assert_eq!(layout.containers.len(), 1);
        assert_eq!(layout.containers[0].members, vec!["pv.sda".to_string()]);
        let vols: Vec<&str> = layout.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(vols, vec!["root", "home", "swap"]);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn thinp_puts_filesystems_in_a_pool() {
        let layout = resolve_for(Platform::X86Efi, Scheme::Thinp, Size::gib(8), Size::gib(100), &sda());
        let pool = layout.volumes.iter().find(|v| v.thin_pool).unwrap();
        assert_eq!(pool.name, "pool00");
        assert_eq!(pool.base_size, Size::gib(1) + Size::mib(500));
        let swap = layout.volumes.iter().find(|v| v.fs_type == "swap").unwrap();
        assert!(!swap.thin);
        assert!(layout.volumes.iter().filter(|v| v.thin).count() == 2);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn btrfs_keeps_swap_as_partition() {
        let disks = vec!["sda".to_string(), "sdb".to_string()];
        let layout = resolve_for(Platform::X86Bios, Scheme::Btrfs, Size::gib(4), Size::gib(200), &disks);
        assert!(layout.partition("swap").is_some());
        assert_eq!(layout.containers[0].kind, ContainerKind::Btrfs);
        assert_eq!(layout.containers[0].members.len(), 2);
        assert_eq!(layout.partition("/boot").unwrap().fs_type, "ext4");
        let subvols: Vec<&str> = layout.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(subvols, vec!["root", "home"]);
    }

    #[test]
    fn arm_root_sinks() {
        let layout = resolve_for(Platform::Arm, Scheme::Plain, Size::gib(2), Size::gib(8), &sda());
        assert_eq!(layout.partition("/").unwrap().weight, -100);
        assert!(layout.partition("/boot").is_some());
    }

    #[test]
    fn unsupported_platform_fails() {
        let mut profile = Platform::X86Bios.profile();
        profile.disklabel_priority.clear();
        let class = InstallClass::Default.profile();
        let disks = sda();
        let ctx = ResolverContext {
            platform: &profile,
            class: &class,
            ram: Size::gib(4),
            disk_space: Size::gib(20),
            disks: &disks,
            container_name: "vg0".to_string(),
        };
        let err = resolve(&AutopartOptions::default(), &ctx, &mut Diagnostics::default()).unwrap_err();
        assert_eq!(err.kind(), "PlatformUnsupported");
    }

    #[test]
    fn schemes_without_tools_are_skipped() {
        let mut diag = Diagnostics::default();
        let schemes = supported_schemes(|f| f.name != "btrfs", &mut diag);
        assert_eq!(schemes, vec![Scheme::Plain, Scheme::Lvm, Scheme::Thinp]);
        assert_eq!(diag.warnings.len(), 1);
    }
}
