//! Request model and default layout resolution

pub mod ordering;
pub mod requests;
pub mod resolver;
pub mod swap;

pub use requests::{
    ContainerKind, ContainerRequest, EncryptionSettings, Layout, PartitionRequest, Scheme,
    SizeSetKind, SizeSetSpec, VolumeRequest,
};
pub use resolver::{AutopartOptions, ResolverContext};
