//! # Platform Collaborators
//!
//! Contracts for the federation platform: per-node service control, the
//! administrative command surface, and the version-selected metadata strategy.

pub mod admin;
pub mod metadata;
pub mod service_control;

pub use admin::{ClusterMember, FarmInformation, FarmProperties, PlatformAdmin, PlatformVersion};
pub use metadata::{FarmFacts, MetadataStrategy, PlatformGeneration};
pub use service_control::{ScServiceControl, ServiceControl};
