//! Total orders over requests
//!
//! Allocation and growth both walk requests in these orders, which is what
//! makes two solves over equal inputs produce identical plans.

use crate::layout::requests::{PartitionRequest, VolumeRequest};
use std::cmp::{Ordering, Reverse};

/// Fewer required disks first; "any disk" last.
fn disk_specificity(req: &PartitionRequest) -> usize {
    match req.required_disks.len() {
        0 => usize::MAX,
        n => n,
    }
}

pub fn compare_partitions(a: &PartitionRequest, b: &PartitionRequest) -> Ordering {
    let key = |r: &PartitionRequest| {
        (
            Reverse(r.weight),
            disk_specificity(r),
            !r.primary_only,
            r.is_growable(),
            Reverse(r.base_size),
        )
    };
    key(a)
        .cmp(&key(b))
        .then_with(|| a.mountpoint.cmp(&b.mountpoint))
        .then_with(|| a.name.cmp(&b.name))
}

/// Volumes: larger first so rounding favours them.
pub fn compare_volumes(a: &VolumeRequest, b: &VolumeRequest) -> Ordering {
    Reverse(a.base_size)
        .cmp(&Reverse(b.base_size))
        .then_with(|| a.is_growable().cmp(&b.is_growable()))
        .then_with(|| a.mountpoint.cmp(&b.mountpoint))
        .then_with(|| a.name.cmp(&b.name))
}

/// Indices of `requests` in allocation order.
pub fn partition_order(requests: &[PartitionRequest]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| compare_partitions(&requests[a], &requests[b]));
    order
}
