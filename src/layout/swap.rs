//! Swap size suggestion

use crate::disk::size::{Size, GIB};
use crate::utils::error::Diagnostics;
use tracing::debug;

/// Swap for machines with at least 64 GiB of RAM, unless an install class
/// overrides it.
pub const DEFAULT_SWAP_CAP: Size = Size::gib(32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPolicy {
    pub cap: Size,
    pub hibernation: bool,
    /// Clamp to 10% of `disk_space` when it is known.
    pub clamp_to_disk: bool,
}

impl Default for SwapPolicy {
    fn default() -> Self {
        Self {
            cap: DEFAULT_SWAP_CAP,
            hibernation: false,
            clamp_to_disk: false,
        }
    }
}

/// Suggested swap size for `ram`.
///
/// | RAM          | swap      |
/// |--------------|-----------|
/// | < 2 GiB      | 2 × RAM   |
/// | 2 – 8 GiB    | RAM       |
/// | 8 – 64 GiB   | RAM / 2   |
/// | ≥ 64 GiB     | cap       |
///
/// Hibernation adds RAM on top for machines up to 64 GiB.
pub fn swap_suggestion(
    ram: Size,
    disk_space: Option<Size>,
    policy: &SwapPolicy,
    diag: &mut Diagnostics,
) -> Size {
    let m = ram.bytes();
    let mut swap = if m < 2 * GIB {
        ram * 2
    } else if m < 8 * GIB {
        ram
    } else if m < 64 * GIB {
        ram / 2
    } else {
        policy.cap
    };

    if policy.hibernation && m <= 64 * GIB {
        debug!("adding {} of hibernation space to swap", ram);
        swap += ram;
    }

    // Opt-in: a 20 GiB disk with 4 GiB of RAM keeps its full 4 GiB swap
    // unless the caller asks for the clamp.
    if let (Some(space), false, true) = (disk_space, policy.hibernation, policy.clamp_to_disk) {
        let limit = space / 10;
        if swap > limit {
            diag.warn(format!(
                "requested size {} > 10 % of disk space, clamped to {}",
                swap, limit
            ));
            swap = limit;
        }
    }

    debug!("suggested swap size for {} of RAM: {}", ram, swap);
    swap
}
