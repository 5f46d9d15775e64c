//! Administrative-command collaborator
//!
//! Black-box access to the federation platform's management surface: farm and
//! cluster properties, the active authentication provider list and web theme
//! settings. Every call either returns structured data or fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::HostDescriptor;

/// Operating system version of the platform host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

/// Farm-wide properties available on every platform generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmProperties {
    pub identifier: String,
    pub host_name: String,
}

/// One member of the platform's live cluster view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub fqdn: String,
    pub behavior_level: i32,
    pub role: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Farm behavior and membership, not available on legacy platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmInformation {
    pub behavior_level: i32,
    pub members: Vec<ClusterMember>,
}

#[async_trait]
pub trait PlatformAdmin: Send + Sync {
    /// Version probe used once to choose the metadata strategy
    async fn platform_version(&self) -> Result<PlatformVersion>;

    /// Canonical name of the machine this engine runs on
    async fn local_node_name(&self) -> Result<String>;

    /// Resolve a host name to its canonical fully-qualified form
    async fn resolve_node(&self, name: &str) -> Result<String>;

    async fn host_descriptor(&self, fqdn: &str) -> Result<HostDescriptor>;

    async fn farm_properties(&self) -> Result<FarmProperties>;

    async fn farm_information(&self) -> Result<FarmInformation>;

    async fn active_providers(&self) -> Result<Vec<String>>;

    async fn set_active_providers(&self, providers: &[String]) -> Result<()>;

    async fn paginated_authentication(&self) -> Result<bool>;

    async fn set_paginated_authentication(&self, enabled: bool) -> Result<()>;
}
