use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::states::{ConfigStatus, ServiceStatus};

/// Where a status change originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    /// Driven by an operation on this engine instance
    Local,
    /// Replayed from a notification sent by another process
    Remote,
}

/// Status-changed notification delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Service {
        status: ServiceStatus,
        node: String,
        error: Option<String>,
        source: TransitionSource,
        at: DateTime<Utc>,
    },
    Config {
        status: ConfigStatus,
        error: Option<String>,
        source: TransitionSource,
        at: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn service(
        status: ServiceStatus,
        node: impl Into<String>,
        error: Option<String>,
        source: TransitionSource,
    ) -> Self {
        Self::Service {
            status,
            node: node.into(),
            error,
            source,
            at: Utc::now(),
        }
    }

    pub fn config(status: ConfigStatus, error: Option<String>, source: TransitionSource) -> Self {
        Self::Config {
            status,
            error,
            source,
            at: Utc::now(),
        }
    }

    /// Get a string representation of the event for logging
    pub fn event_type(&self) -> String {
        match self {
            Self::Service { status, .. } => format!("service.{status}"),
            Self::Config { status, .. } => format!("config.{status}"),
        }
    }

    /// Extract the error message carried by a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Service { error, .. } | Self::Config { error, .. } => error.as_deref(),
        }
    }

    pub fn source(&self) -> TransitionSource {
        match self {
            Self::Service { source, .. } | Self::Config { source, .. } => *source,
        }
    }
}
