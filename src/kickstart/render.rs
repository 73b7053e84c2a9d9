//! Kickstart output
//!
//! Writes a solved plan as kickstart commands with every size fixed at its
//! final value in MiB, so parsing the output gives the same requests back.

use crate::layout::requests::{ContainerKind, ContainerRequest, Layout};
use crate::solve::Plan;

fn token(mountpoint: Option<&str>, fs_type: &str) -> String {
    match mountpoint {
        Some(mp) => mp.to_string(),
        None if fs_type == "swap" => "swap".to_string(),
        None => "none".to_string(),
    }
}

/// Name an md array goes by when it is a member of `outer`.
fn member_alias(layout: &Layout, member: &str) -> String {
    let Some(outer) = layout.containers.iter().find(|c| c.members.iter().any(|m| m == member))
    else {
        return member.to_string();
    };
    if layout.container(member).is_none() {
        return member.to_string();
    }
    match outer.kind {
        ContainerKind::Btrfs => format!("btrfs.{}", member),
        _ => format!("pv.{}", member),
    }
}

fn md_line(layout: &Layout, md: &ContainerRequest) -> String {
    let nested = layout.containers.iter().any(|c| c.members.contains(&md.name));
    let mut line = if nested {
        format!("raid {}", member_alias(layout, &md.name))
    } else {
        let fs = md.fs_type.as_deref().unwrap_or("ext4");
        format!("raid {} --fstype={}", token(md.mountpoint.as_deref(), fs), fs)
    };
    line.push_str(&format!(" --device={}", md.name));
    line.push_str(&format!(" --level={}", md.level.as_deref().unwrap_or("raid1")));
    if md.encrypted {
        line.push_str(" --encrypted");
    }
    for m in &md.members {
        line.push(' ');
        line.push_str(m);
    }
    line
}

/// Kickstart storage commands reproducing `plan`.
pub fn render_plan(plan: &Plan) -> String {
    let layout = &plan.layout;
    let mut lines = vec![format!("# storage layout for {}", plan.platform)];
    let disks: Vec<&str> = plan.disklabels.keys().map(String::as_str).collect();
    lines.push(format!("ignoredisk --only-use={}", disks.join(",")));
    lines.push(format!("bootloader --boot-drive={}", plan.boot_disk));

    let mut parts: Vec<_> = layout
        .partitions
        .iter()
        .filter_map(|r| {
            let disk = r.disk.as_deref()?;
            let size = plan.device_for(&r.name)?.size;
            let number = plan.partition_numbers.get(&r.name).copied().unwrap_or(0);
            Some((disk, number, r, size))
        })
        .collect();
    parts.sort_by_key(|(disk, number, _, _)| (*disk, *number));
    for (disk, _, req, size) in parts {
        let name = if req.mountpoint.is_some() {
            token(req.mountpoint.as_deref(), &req.fs_type)
        } else {
            req.name.clone()
        };
        let mut line = format!(
            "part {} --fstype={} --size={} --ondisk={}",
            name,
            req.fs_type,
            size.to_mib(),
            disk
        );
        if req.primary_only {
            line.push_str(" --asprimary");
        }
        if req.encrypted {
            line.push_str(" --encrypted");
        }
        lines.push(line);
    }

    for md in layout.containers.iter().filter(|c| c.kind == ContainerKind::Md) {
        lines.push(md_line(layout, md));
    }

    for plan_c in plan.containers.iter().filter(|c| c.kind != ContainerKind::Md) {
        let members: Vec<String> = plan_c
            .members
            .iter()
            .map(|m| member_alias(layout, m))
            .collect();
        let volumes = layout.volumes.iter().filter(|v| v.container == plan_c.name);
        match plan_c.kind {
            ContainerKind::Lvm => {
                let mut line = format!("volgroup {} {}", plan_c.name, members.join(" "));
                if let Some(pe) = plan_c.pe_size {
                    line.push_str(&format!(" --pesize={}", pe.bytes() / 1024));
                }
                lines.push(line);
                let mut volumes: Vec<_> = volumes.collect();
                volumes.sort_by_key(|v| v.thin);
                for vol in volumes {
                    let size = vol.size.unwrap_or(vol.base_size).to_mib();
                    let mut line = format!(
                        "logvol {} --vgname={} --name={}",
                        token(vol.mountpoint.as_deref(), &vol.fs_type),
                        plan_c.name,
                        vol.name
                    );
                    if vol.thin_pool {
                        line.push_str(" --thinpool");
                    } else {
                        line.push_str(&format!(" --fstype={}", vol.fs_type));
                    }
                    line.push_str(&format!(" --size={}", size));
                    if let (true, Some(pool)) = (vol.thin, &vol.pool) {
                        line.push_str(&format!(" --thin --poolname={}", pool));
                    }
                    if vol.encrypted {
                        line.push_str(" --encrypted");
                    }
                    lines.push(line);
                }
            }
            ContainerKind::Btrfs => {
                let mountpoint = layout
                    .container(&plan_c.name)
                    .and_then(|c| c.mountpoint.as_deref());
                let mut line = format!(
                    "btrfs {} --label={}",
                    token(mountpoint, "btrfs"),
                    plan_c.name
                );
                if let Some(l) = &plan_c.level {
                    line.push_str(&format!(" --data={}", l));
                }
                if let Some(l) = &plan_c.metadata_level {
                    line.push_str(&format!(" --metadata={}", l));
                }
                line.push(' ');
                line.push_str(&members.join(" "));
                lines.push(line);
                for vol in volumes {
                    lines.push(format!(
                        "btrfs {} --subvol --name={} {}",
                        token(vol.mountpoint.as_deref(), "btrfs"),
                        vol.name,
                        plan_c.name
                    ));
                }
            }
            ContainerKind::Md => {}
        }
    }

    lines.push(String::new());
    lines.join("\n")
}
