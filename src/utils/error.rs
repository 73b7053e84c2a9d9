//! Error types for autopart

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error(
        "Insufficient free space for {request} (need {needed}, largest free region {largest_free}{disk_summary})"
    )]
    InsufficientSpace {
        request: String,
        needed: String,
        largest_free: String,
        /// Rendered as ` on sda; free: sda=1 GiB, sdb=0 B`
        disk_summary: String,
    },

    #[error("No usable disks available for partitioning")]
    NoUsableDisks,

    #[error("No supported disklabel can address all {length} sectors of {disk}")]
    LabelTooSmall { disk: String, length: u64 },

    #[error("Cannot align partition for {request} on {disk}")]
    AlignmentImpossible { disk: String, request: String },

    #[error("Platform unsupported: {0}")]
    PlatformUnsupported(String),

    #[error("Size set {devices} cannot reach {target}: every member is capped below it")]
    OverCommittedSet { devices: String, target: String },

    #[error("Conflicting requests: {0}")]
    RequestConflicts(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Kickstart line {line}: {message}")]
    Kickstart { line: usize, message: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LayoutError {
    /// Errors the allocator absorbs by moving on to the next candidate disk.
    pub fn is_retryable_on_next_disk(&self) -> bool {
        matches!(self, Self::AlignmentImpossible { .. })
    }

    /// Short machine-readable kind name, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientSpace { .. } => "InsufficientSpace",
            Self::NoUsableDisks => "NoUsableDisks",
            Self::LabelTooSmall { .. } => "LabelTooSmall",
            Self::AlignmentImpossible { .. } => "AlignmentImpossible",
            Self::PlatformUnsupported(_) => "PlatformUnsupported",
            Self::OverCommittedSet { .. } => "OverCommittedSet",
            Self::RequestConflicts(_) => "RequestConflicts",
            _ => "Other",
        }
    }
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Errors and warnings gathered over one solve. Warnings never abort.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn error(&mut self, err: &LayoutError) {
        self.errors.push(err.to_string());
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}
