//! Node and farm metadata acquisition
//!
//! Three platform generations expose different amounts of cluster data. The
//! generation is probed once and mapped to a [`MetadataStrategy`]; callers
//! never branch on the version themselves.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::admin::{ClusterMember, PlatformAdmin, PlatformVersion};
use crate::constants::{platform_builds, LEGACY_FARM_BEHAVIOR};
use crate::error::{FarmError, Result};
use crate::models::FarmNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformGeneration {
    /// No farm information query, single behavior level
    Legacy,
    /// Farm information and cluster membership
    Standard,
    /// Cluster membership with heartbeat timestamps
    Extended,
}

impl PlatformGeneration {
    pub fn from_version(version: &PlatformVersion) -> Self {
        match version.build {
            b if b >= platform_builds::EXTENDED => Self::Extended,
            b if b >= platform_builds::STANDARD => Self::Standard,
            _ => Self::Legacy,
        }
    }

    /// Probe the platform once
    pub async fn detect(admin: &dyn PlatformAdmin) -> Result<Self> {
        let version = admin.platform_version().await?;
        let generation = Self::from_version(&version);
        info!(
            major = version.major,
            minor = version.minor,
            build = version.build,
            generation = %generation,
            "Platform generation detected"
        );
        Ok(generation)
    }

    pub fn strategy(&self) -> Arc<dyn MetadataStrategy> {
        match self {
            Self::Legacy => Arc::new(LegacyMetadata),
            Self::Standard => Arc::new(StandardMetadata),
            Self::Extended => Arc::new(ExtendedMetadata),
        }
    }
}

impl fmt::Display for PlatformGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Standard => write!(f, "standard"),
            Self::Extended => write!(f, "extended"),
        }
    }
}

/// Farm-level facts gathered during initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmFacts {
    pub identifier: String,
    pub behavior_level: i32,
}

#[async_trait]
pub trait MetadataStrategy: Send + Sync {
    fn generation(&self) -> PlatformGeneration;

    async fn farm_facts(&self, admin: &dyn PlatformAdmin) -> Result<FarmFacts>;

    /// Build the node entry for an already-canonical identity
    async fn node_metadata(&self, admin: &dyn PlatformAdmin, fqdn: &str) -> Result<FarmNode>;
}

pub struct LegacyMetadata;

#[async_trait]
impl MetadataStrategy for LegacyMetadata {
    fn generation(&self) -> PlatformGeneration {
        PlatformGeneration::Legacy
    }

    async fn farm_facts(&self, admin: &dyn PlatformAdmin) -> Result<FarmFacts> {
        let properties = admin.farm_properties().await?;
        Ok(FarmFacts {
            identifier: properties.identifier,
            behavior_level: LEGACY_FARM_BEHAVIOR,
        })
    }

    async fn node_metadata(&self, admin: &dyn PlatformAdmin, fqdn: &str) -> Result<FarmNode> {
        let host = admin.host_descriptor(fqdn).await?;
        Ok(FarmNode {
            fqdn: fqdn.to_string(),
            behavior_level: LEGACY_FARM_BEHAVIOR,
            node_type: "Primary".to_string(),
            heartbeat: Utc::now(),
            host,
        })
    }
}

pub struct StandardMetadata;

async fn cluster_member(admin: &dyn PlatformAdmin, fqdn: &str) -> Result<ClusterMember> {
    let information = admin.farm_information().await?;
    information
        .members
        .into_iter()
        .find(|m| m.fqdn.eq_ignore_ascii_case(fqdn))
        .ok_or_else(|| {
            FarmError::platform(
                "farm_information",
                format!("node {fqdn} is not a member of the federation cluster"),
            )
        })
}

#[async_trait]
impl MetadataStrategy for StandardMetadata {
    fn generation(&self) -> PlatformGeneration {
        PlatformGeneration::Standard
    }

    async fn farm_facts(&self, admin: &dyn PlatformAdmin) -> Result<FarmFacts> {
        let properties = admin.farm_properties().await?;
        let information = admin.farm_information().await?;
        Ok(FarmFacts {
            identifier: properties.identifier,
            behavior_level: information.behavior_level,
        })
    }

    async fn node_metadata(&self, admin: &dyn PlatformAdmin, fqdn: &str) -> Result<FarmNode> {
        let member = cluster_member(admin, fqdn).await?;
        let host = admin.host_descriptor(fqdn).await?;
        Ok(FarmNode {
            fqdn: fqdn.to_string(),
            behavior_level: member.behavior_level,
            node_type: member.role,
            heartbeat: Utc::now(),
            host,
        })
    }
}

pub struct ExtendedMetadata;

#[async_trait]
impl MetadataStrategy for ExtendedMetadata {
    fn generation(&self) -> PlatformGeneration {
        PlatformGeneration::Extended
    }

    async fn farm_facts(&self, admin: &dyn PlatformAdmin) -> Result<FarmFacts> {
        StandardMetadata.farm_facts(admin).await
    }

    async fn node_metadata(&self, admin: &dyn PlatformAdmin, fqdn: &str) -> Result<FarmNode> {
        let member = cluster_member(admin, fqdn).await?;
        let host = admin.host_descriptor(fqdn).await?;
        Ok(FarmNode {
            fqdn: fqdn.to_string(),
            behavior_level: member.behavior_level,
            node_type: member.role,
            heartbeat: member.last_heartbeat.unwrap_or_else(Utc::now),
            host,
        })
    }
}
