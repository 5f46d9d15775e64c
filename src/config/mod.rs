//! # Farm Engine Settings
//!
//! Settings that shape how the engine talks to the platform: service name,
//! wait bounds, notification channel location and provisioning defaults.
//! These are distinct from the persisted farm [`Configuration`](crate::models::Configuration),
//! which is owned by the persistence collaborator.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mfa_farm_core::config::SettingsLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::load()?;
//! let timeout = settings.service_timeout();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;
use crate::error::{FarmError, Result};

pub use loader::SettingsLoader;

/// Root settings structure mirroring `config/farm.yaml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FarmSettings {
    /// Federation service name as known to the service-control facility
    pub service_name: String,

    /// Provider name registered in the platform's active provider list
    pub provider_name: String,

    /// Overrides the local node identity reported by the platform
    pub local_node: Option<String>,

    /// Upper bound for a start or stop wait
    pub service_timeout_seconds: u64,

    /// Delay between two status probes while waiting
    pub service_poll_interval_ms: u64,

    /// Notification channel settings
    pub channel: ChannelSettings,

    /// Location of the JSON configuration store
    pub store_path: PathBuf,

    /// Location of the machine certificate store
    pub certificate_store_path: PathBuf,

    /// Default validity of generated certificates
    pub certificate_validity_years: u32,

    /// RSA modulus size for generated certificates
    pub rsa_key_bits: usize,

    /// Log filter and file destination
    pub logging: LoggingSettings,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// JSON log directory; console only when unset
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "farm-engine.log".to_string(),
        }
    }
}

/// Notification channel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub name: String,
    pub directory: PathBuf,
    pub max_payload_bytes: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            name: constants::channel::DEFAULT_NAME.to_string(),
            directory: std::env::temp_dir().join("mfa-farm"),
            max_payload_bytes: constants::channel::MAX_PAYLOAD_BYTES,
        }
    }
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            service_name: constants::DEFAULT_SERVICE_NAME.to_string(),
            provider_name: constants::DEFAULT_PROVIDER_NAME.to_string(),
            local_node: None,
            service_timeout_seconds: constants::DEFAULT_SERVICE_TIMEOUT.as_secs(),
            service_poll_interval_ms: constants::DEFAULT_SERVICE_POLL_INTERVAL.as_millis() as u64,
            channel: ChannelSettings::default(),
            store_path: PathBuf::from("config/farm-configuration.json"),
            certificate_store_path: PathBuf::from("certificates"),
            certificate_validity_years: constants::DEFAULT_CERTIFICATE_VALIDITY_YEARS,
            rsa_key_bits: constants::MIN_RSA_KEY_BITS,
            logging: LoggingSettings::default(),
        }
    }
}

impl FarmSettings {
    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_seconds)
    }

    pub fn service_poll_interval(&self) -> Duration {
        Duration::from_millis(self.service_poll_interval_ms)
    }

    /// Validate settings before the engine is built
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(FarmError::settings("service_name must not be empty"));
        }

        if self.provider_name.trim().is_empty() {
            return Err(FarmError::settings("provider_name must not be empty"));
        }

        if self.service_timeout_seconds == 0 {
            return Err(FarmError::settings(
                "service_timeout_seconds must be greater than 0",
            ));
        }

        if self.service_poll_interval_ms == 0 {
            return Err(FarmError::settings(
                "service_poll_interval_ms must be greater than 0",
            ));
        }

        if self.channel.name.trim().is_empty() {
            return Err(FarmError::settings("channel.name must not be empty"));
        }

        if self.channel.max_payload_bytes == 0
            || self.channel.max_payload_bytes > constants::channel::MAX_PAYLOAD_BYTES
        {
            return Err(FarmError::settings(format!(
                "channel.max_payload_bytes must be between 1 and {}",
                constants::channel::MAX_PAYLOAD_BYTES
            )));
        }

        if self.certificate_validity_years == 0
            || self.certificate_validity_years > constants::MAX_CERTIFICATE_VALIDITY_YEARS
        {
            return Err(FarmError::settings(format!(
                "certificate_validity_years must be between 1 and {}",
                constants::MAX_CERTIFICATE_VALIDITY_YEARS
            )));
        }

        if self.logging.level.trim().is_empty() || self.logging.file_prefix.trim().is_empty() {
            return Err(FarmError::settings(
                "logging.level and logging.file_prefix must not be empty",
            ));
        }

        if self.rsa_key_bits < constants::MIN_RSA_KEY_BITS {
            return Err(FarmError::settings(format!(
                "rsa_key_bits must be at least {}",
                constants::MIN_RSA_KEY_BITS
            )));
        }

        Ok(())
    }
}
