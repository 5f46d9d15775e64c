//! # Persisted Configuration
//!
//! Root object owned by the persistence collaborator. The engine only reasons
//! about the dirty flag, the farm, and the connection descriptors written by
//! database provisioning; everything else is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::farm::Farm;

/// Which logical dataset a connection descriptor points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// User registrations (general configuration store)
    Registrations,
    /// Per-user secret keys
    SecretKeys,
}

impl Dataset {
    /// Table holding the dataset's rows
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Registrations => "REGISTRATIONS",
            Self::SecretKeys => "KEYS",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registrations => write!(f, "registrations"),
            Self::SecretKeys => write!(f, "secret_keys"),
        }
    }
}

/// Connection to a provisioned database, with its column encryption handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConnectionDescriptor {
    pub connection_string: String,
    pub is_encrypted: bool,
    /// Column encryption key name, present for encrypted databases
    pub key_name: Option<String>,
    /// Thumbprint of the certificate protecting the column master key
    pub thumbprint: Option<String>,
}

/// Hosting sub-configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HostsConfig {
    pub registrations: Option<ConnectionDescriptor>,
    pub secret_keys: Option<ConnectionDescriptor>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl HostsConfig {
    pub fn descriptor(&self, dataset: Dataset) -> Option<&ConnectionDescriptor> {
        match dataset {
            Dataset::Registrations => self.registrations.as_ref(),
            Dataset::SecretKeys => self.secret_keys.as_ref(),
        }
    }

    pub fn set_descriptor(&mut self, dataset: Dataset, descriptor: ConnectionDescriptor) {
        match dataset {
            Dataset::Registrations => self.registrations = Some(descriptor),
            Dataset::SecretKeys => self.secret_keys = Some(descriptor),
        }
    }
}

/// Root persisted configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default)]
    pub farm: Farm,
    #[serde(default)]
    pub hosts: HostsConfig,
    /// Thumbprint of the certificate used to protect user secrets
    #[serde(default)]
    pub certificate_thumbprint: Option<String>,
    /// Provider sub-configurations, opaque to the engine
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}
