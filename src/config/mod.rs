//! Configuration module

pub mod layout;

pub use layout::LayoutConfig;
