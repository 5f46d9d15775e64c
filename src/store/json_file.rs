use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ConfigurationStore;
use crate::error::{FarmError, Result};
use crate::models::Configuration;

/// Configuration stored as pretty-printed JSON on a shared path
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never sees a half-written document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigurationStore for JsonFileStore {
    async fn read(&self) -> Result<Configuration> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No configuration file yet, starting empty");
                return Ok(Configuration::default());
            }
            Err(e) => {
                return Err(FarmError::persistence(
                    "read",
                    format!("{}: {e}", self.path.display()),
                ))
            }
        };

        serde_json::from_str(&raw).map_err(|e| {
            FarmError::persistence("read", format!("{} is not valid: {e}", self.path.display()))
        })
    }

    async fn write(&self, configuration: &Configuration) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let document = serde_json::to_vec_pretty(configuration)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, document).await.map_err(|e| {
            FarmError::persistence("write", format!("{}: {e}", temp.display()))
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            FarmError::persistence("write", format!("{}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "Configuration written");
        Ok(())
    }
}
