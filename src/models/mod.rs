//! # Data Models
//!
//! Farm topology and the persisted configuration object.

pub mod configuration;
pub mod farm;

pub use configuration::{Configuration, ConnectionDescriptor, Dataset, HostsConfig};
pub use farm::{Farm, FarmNode, HostDescriptor, NodeName};
