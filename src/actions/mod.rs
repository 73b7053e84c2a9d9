//! Storage actions
//!
//! The solver's output is an ordered list of independent action records. An
//! executor applies them serially; nothing here touches a device.

pub mod planner;

use crate::disk::device::DeviceType;
use crate::disk::disklabel::{Geometry, PartType};
use crate::disk::size::Size;
use crate::layout::requests::EncryptionSettings;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

pub use planner::{plan_actions, PlanContext, PlannerOutput};

static AUTOPART_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"autopart"));

/// Name-based UUID, so equal inputs always yield the same identifiers.
pub fn stable_uuid(kind: &str, name: &str) -> Uuid {
    Uuid::new_v5(&AUTOPART_NAMESPACE, format!("{}:{}", kind, name).as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    DestroyFormat {
        device: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fs_type: Option<String>,
    },
    DestroyDevice {
        name: String,
        device_type: DeviceType,
    },
    CreateFormat {
        device: String,
        fs_type: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mountpoint: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        encryption: Option<EncryptionSettings>,
    },
    CreateDevice {
        name: String,
        device_type: DeviceType,
        parents: Vec<String>,
        size: Size,
        #[serde(skip_serializing_if = "Option::is_none")]
        geometry: Option<Geometry>,
        #[serde(skip_serializing_if = "Option::is_none")]
        part_type: Option<PartType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        type_guid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        uuid: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        options: Vec<String>,
    },
    SetPartitionFlag {
        device: String,
        flag: String,
    },
    SetPartitionName {
        device: String,
        name: String,
    },
}

impl Action {
    /// Device the action operates on.
    pub fn device(&self) -> &str {
        match self {
            Self::DestroyFormat { device, .. }
            | Self::CreateFormat { device, .. }
            | Self::SetPartitionFlag { device, .. }
            | Self::SetPartitionName { device, .. } => device,
            Self::DestroyDevice { name, .. } | Self::CreateDevice { name, .. } => name,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DestroyFormat { .. } | Self::DestroyDevice { .. })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DestroyFormat { device, fs_type } => write!(
                f,
                "destroy format {} on {}",
                fs_type.as_deref().unwrap_or("(unknown)"),
                device
            ),
            Self::DestroyDevice { name, device_type } => {
                write!(f, "destroy device {} {}", device_type, name)
            }
            Self::CreateFormat {
                device,
                fs_type,
                mountpoint,
                ..
            } => {
                write!(f, "create format {} on {}", fs_type, device)?;
                if let Some(mp) = mountpoint {
                    write!(f, " mounted at {}", mp)?;
                }
                Ok(())
            }
            Self::CreateDevice {
                name,
                device_type,
                size,
                geometry,
                ..
            } => {
                write!(f, "create device {} {} ({})", device_type, name, size)?;
                if let Some(g) = geometry {
                    write!(f, " at {}", g)?;
                }
                Ok(())
            }
            Self::SetPartitionFlag { device, flag } => {
                write!(f, "set flag {} on {}", flag, device)
            }
            Self::SetPartitionName { device, name } => {
                write!(f, "name {} \"{}\"", device, name)
            }
        }
    }
}

/// A device as it will exist once the actions have run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDevice {
    pub name: String,
    pub device_type: DeviceType,
    pub parents: Vec<String>,
    pub size: Size,
    /// Request this device realises.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl PlannedDevice {
    pub fn new(name: impl Into<String>, device_type: DeviceType, size: Size) -> Self {
        Self {
            name: name.into(),
            device_type,
            parents: Vec::new(),
            size,
            request: None,
            fs_type: None,
            mountpoint: None,
            encrypted: false,
            disk: None,
            geometry: None,
            number: None,
            level: None,
        }
    }
}
