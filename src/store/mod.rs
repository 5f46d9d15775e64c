//! # Configuration Persistence
//!
//! The engine never serialises configuration itself; it goes through a
//! [`ConfigurationStore`]. Implementations must be idempotent on re-read and
//! must not drop fields they do not understand.

pub mod json_file;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Configuration;

pub use json_file::JsonFileStore;

/// Persistence collaborator for the farm configuration
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn read(&self) -> Result<Configuration>;

    async fn write(&self, configuration: &Configuration) -> Result<()>;
}
