//! Utility modules

pub mod command;
pub mod error;
pub mod progress;
pub mod prompt;
