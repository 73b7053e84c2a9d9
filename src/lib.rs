//! autopart - storage layout planning for Linux installers

pub mod actions;
pub mod config;
pub mod disk;
pub mod kickstart;
pub mod layout;
pub mod partitioning;
pub mod platform;
pub mod solve;
pub mod utils;

pub use config::LayoutConfig;
pub use solve::{report, solve, solve_with, Plan, Report, SolveInput};
pub use utils::error::{Diagnostics, LayoutError};
