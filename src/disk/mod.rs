//! Disk, label and storage geometry models

pub mod btrfs;
pub mod detection;
pub mod device;
pub mod disklabel;
pub mod formats;
pub mod freespace;
pub mod lvm;
pub mod raid;
pub mod size;

pub use device::{DeviceId, DeviceTree, DeviceType, Disk};
pub use disklabel::{DiskLabel, DiskLabelKind, Geometry, PartType};
pub use size::Size;
