//! Settings Loader
//!
//! Environment-aware settings loading. Sources, lowest precedence first:
//! built-in defaults, `farm.yaml`, `farm.<environment>.yaml`, then `FARM__*`
//! environment variables.

use config::{Config, Environment, File, FileFormat, FileSourceFile};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::FarmSettings;
use crate::error::{FarmError, Result};

pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings with environment auto-detection
    pub fn load() -> Result<FarmSettings> {
        Self::load_from_directory(None)
    }

    /// Load settings from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<FarmSettings> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load settings from a directory with an explicit environment name,
    /// useful for tests that must not touch process-wide variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<FarmSettings> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading farm settings"
        );

        let settings = Config::builder()
            .add_source(Self::yaml_source(&config_directory, "farm.yaml"))
            .add_source(Self::yaml_source(
                &config_directory,
                &format!("farm.{environment}.yaml"),
            ))
            .add_source(
                Environment::with_prefix("FARM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|built| built.try_deserialize::<FarmSettings>())
            .map_err(|e| FarmError::settings(e.to_string()))?;

        settings.validate()?;

        debug!(
            service_name = %settings.service_name,
            provider_name = %settings.provider_name,
            timeout_seconds = settings.service_timeout_seconds,
            channel = %settings.channel.name,
            "Farm settings loaded"
        );

        Ok(settings)
    }

    fn yaml_source(directory: &Path, file_name: &str) -> File<FileSourceFile, FileFormat> {
        File::from(directory.join(file_name))
            .format(FileFormat::Yaml)
            .required(false)
    }

    fn detect_environment() -> String {
        env::var("FARM_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
