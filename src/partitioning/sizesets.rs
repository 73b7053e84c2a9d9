//! Size sets
//!
//! Constraints over several partitions that growth alone cannot express:
//! a fixed total (the members of a fixed-size volume group) or equal sizes
//! (md RAID members). Both only ever take growth back; the chunks that lost
//! space are grown again so their other requests can absorb it.

use crate::disk::size::Size;
use crate::layout::requests::{PartitionRequest, SizeSetKind, SizeSetSpec};
use crate::partitioning::growth::DiskChunk;
use crate::utils::error::{LayoutError, Result};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeSet {
    /// Members must add up to no more than `target`.
    Total { devices: Vec<usize>, target: Size },
    /// Members end at the same size, the smallest feasible one up to
    /// `target_each`.
    Same {
        devices: Vec<usize>,
        target_each: Option<Size>,
    },
}

impl SizeSet {
    /// Resolve a spec's device names against the request list.
    pub fn from_spec(spec: &SizeSetSpec, requests: &[PartitionRequest]) -> Result<Self> {
        let devices = spec
            .devices
            .iter()
            .map(|name| {
                requests
                    .iter()
                    .position(|r| &r.name == name)
                    .ok_or_else(|| {
                        LayoutError::RequestConflicts(format!(
                            "size set references missing partition {}",
                            name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        match spec.kind {
            SizeSetKind::Total => {
                let target = spec.size.ok_or_else(|| {
                    LayoutError::RequestConflicts(format!(
                        "total size set over {} has no size",
                        spec.devices.join(", ")
                    ))
                })?;
                Ok(Self::Total { devices, target })
            }
            SizeSetKind::Same => Ok(Self::Same {
                devices,
                target_each: spec.size,
            }),
        }
    }

    pub fn devices(&self) -> &[usize] {
        match self {
            Self::Total { devices, .. } | Self::Same { devices, .. } => devices,
        }
    }
}

/// (chunk, position) of every member that was allocated.
fn locate(devices: &[usize], chunks: &[DiskChunk]) -> Vec<(usize, usize)> {
    devices
        .iter()
        .filter_map(|&idx| {
            chunks
                .iter()
                .enumerate()
                .find_map(|(ci, dc)| dc.chunk.find(idx).map(|pos| (ci, pos)))
        })
        .collect()
}

fn member_size(chunks: &[DiskChunk], (ci, pos): (usize, usize)) -> Size {
    let chunk = &chunks[ci].chunk;
    chunk.to_size(chunk.requests[pos].total())
}

fn member_growth(chunks: &[DiskChunk], (ci, pos): (usize, usize)) -> Size {
    let chunk = &chunks[ci].chunk;
    chunk.to_size(chunk.requests[pos].growth)
}

fn names(members: &[(usize, usize)], chunks: &[DiskChunk]) -> String {
    members
        .iter()
        .map(|&(ci, pos)| chunks[ci].chunk.requests[pos].name.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

fn apply_total(
    members: &[(usize, usize)],
    target: Size,
    chunks: &mut [DiskChunk],
    regrow: &mut BTreeSet<usize>,
) {
    let allocated: Size = members.iter().map(|&m| member_size(chunks, m)).sum();
    if allocated <= target {
        return;
    }
    let mut need = allocated - target;
    debug!(
        "total size set [{}]: {} allocated, target {}, reclaiming {}",
        names(members, chunks),
        allocated,
        target,
        need
    );

    let mut by_growth = members.to_vec();
    by_growth.sort_by_key(|&m| Reverse(member_growth(chunks, m)));
    for (ci, pos) in by_growth {
        if need.is_zero() {
            break;
        }
        let chunk = &mut chunks[ci].chunk;
        let units = chunk.unit.from_size_up(need).min(chunk.requests[pos].growth);
        if units == 0 {
            continue;
        }
        chunk.reclaim(pos, units);
        need = need.saturating_sub(chunk.to_size(units));
        regrow.insert(ci);
    }
}

fn apply_same(
    members: &[(usize, usize)],
    target_each: Option<Size>,
    chunks: &mut [DiskChunk],
    regrow: &mut BTreeSet<usize>,
) -> Result<()> {
    if let Some(target) = target_each {
        let all_capped_below = members.iter().all(|&(ci, pos)| {
            let chunk = &chunks[ci].chunk;
            let req = &chunk.requests[pos];
            req.own_cap
                .is_some_and(|cap| chunk.to_size(req.base + cap) < target)
        });
        if all_capped_below {
            return Err(LayoutError::OverCommittedSet {
                devices: names(members, chunks),
                target: target.to_string(),
            });
        }
    }

    let Some(mut size) = members.iter().map(|&m| member_size(chunks, m)).min() else {
        return Ok(());
    };
    if let Some(target) = target_each {
        size = size.min(target);
    }
    debug!(
        "same size set [{}]: evening members out at {}",
        names(members, chunks),
        size
    );

    for &(ci, pos) in members {
        let chunk = &mut chunks[ci].chunk;
        let desired = chunk.unit.from_size(size).max(chunk.requests[pos].base);
        let total = chunk.requests[pos].total();
        if total > desired {
            chunk.reclaim(pos, total - desired);
            regrow.insert(ci);
        }
        chunk.requests[pos].done = true;
    }
    Ok(())
}

/// Enforce every size set, regrowing the chunks that gave space back.
///
/// Reclaiming only ever shrinks members, so two passes settle the sets.
pub fn manage_size_sets(sets: &[SizeSet], chunks: &mut [DiskChunk]) -> Result<()> {
    if sets.is_empty() {
        return Ok(());
    }
    for pass in 0..2 {
        let mut regrow = BTreeSet::new();
        for set in sets {
            let members = locate(set.devices(), chunks);
            if members.is_empty() {
                continue;
            }
            match set {
                SizeSet::Total { target, .. } => {
                    apply_total(&members, *target, chunks, &mut regrow)
                }
                SizeSet::Same { target_each, .. } => {
                    apply_same(&members, *target_each, chunks, &mut regrow)?
                }
            }
        }
        if regrow.is_empty() {
            break;
        }
        debug!("size set pass {}: regrowing {} chunks", pass + 1, regrow.len());
        for ci in regrow {
            chunks[ci].chunk.grow_requests();
        }
    }
    Ok(())
}
