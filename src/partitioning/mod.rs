//! Allocation, growth and container sizing
//!
//! The passes run in this order for one solve: [`clear`] the candidate disks,
//! [`allocator`] places every partition request, [`growth`] spreads the free
//! sectors of each region, [`sizesets`] enforces cross-request constraints,
//! [`containers`] sizes what is built on the partitions and [`numbering`]
//! assigns slot numbers.

pub mod allocator;
pub mod chunk;
pub mod clear;
pub mod containers;
pub mod growth;
pub mod numbering;
pub mod sizesets;

pub use clear::{ClearOutcome, ClearPartSettings, ClearPolicy};
pub use containers::ContainerPlan;
pub use growth::DiskChunk;
