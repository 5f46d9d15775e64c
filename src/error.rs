//! # Farm Error Types
//!
//! Structured error handling for the farm engine using thiserror. Messages are
//! surfaced verbatim by administration consoles, so every variant names the
//! thing that failed (node, thumbprint, step, operation).

use thiserror::Error;

/// Errors raised by the farm orchestration engine
#[derive(Error, Debug)]
pub enum FarmError {
    #[error("Farm is not initialized: {message}")]
    FarmNotInitialized { message: String },

    #[error("Configuration is not loaded: {message}")]
    ConfigurationNotLoaded { message: String },

    #[error("Federation service on node {node} is unreachable: {reason}")]
    ServiceUnreachable { node: String, reason: String },

    #[error("Invalid node name '{value}': {reason}")]
    InvalidNodeName { value: String, reason: String },

    #[error("Platform operation {operation} failed: {message}")]
    Platform { operation: String, message: String },

    #[error("Configuration {operation} failed: {message}")]
    Persistence { operation: String, message: String },

    #[error("Certificate {thumbprint}: {message}")]
    Certificate { thumbprint: String, message: String },

    #[error("Database provisioning step {step} failed: {message}")]
    Provisioning { step: String, message: String },

    #[error("Notification channel error: {message}")]
    Messaging { message: String },

    #[error("Settings error: {message}")]
    Settings { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FarmError {
    /// Create a farm-not-initialized error
    pub fn farm_not_initialized(message: impl Into<String>) -> Self {
        Self::FarmNotInitialized {
            message: message.into(),
        }
    }

    /// Create a configuration-not-loaded error
    pub fn configuration_not_loaded(message: impl Into<String>) -> Self {
        Self::ConfigurationNotLoaded {
            message: message.into(),
        }
    }

    /// Create a service-unreachable error
    pub fn service_unreachable(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnreachable {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid node name error
    pub fn invalid_node_name(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeName {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a platform call error
    pub fn platform(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Platform {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a certificate error
    pub fn certificate(thumbprint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Certificate {
            thumbprint: thumbprint.into(),
            message: message.into(),
        }
    }

    /// Create a provisioning error
    pub fn provisioning(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a notification channel error
    pub fn messaging(message: impl Into<String>) -> Self {
        Self::Messaging {
            message: message.into(),
        }
    }

    /// Create a settings error
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    /// True for the "something required is absent" class of failures
    pub fn is_not_initialized(&self) -> bool {
        matches!(
            self,
            Self::FarmNotInitialized { .. } | Self::ConfigurationNotLoaded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FarmError>;
