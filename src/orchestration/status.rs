//! Current service and configuration status held by one orchestrator
//!
//! The board is the orchestrator's own view of state. It is always updated
//! before any observer is notified, and it decides whether a request is a
//! real transition or a repeat of the current value.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::state_machine::{ConfigStatus, ServiceStatus, TransitionSource};

/// Point-in-time copy of the board
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Status of the most recent service transition on any node
    pub service: ServiceStatus,
    pub config: ConfigStatus,
    /// Per-node service status, keyed by lowercase node identity
    pub nodes: BTreeMap<String, ServiceStatus>,
    pub last_service_error: Option<String>,
    pub last_config_error: Option<String>,
}

impl StatusSnapshot {
    pub fn node_status(&self, node: &str) -> ServiceStatus {
        self.nodes
            .get(&node.to_ascii_lowercase())
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    inner: RwLock<StatusSnapshot>,
}

impl StatusBoard {
    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }

    pub(crate) fn config(&self) -> ConfigStatus {
        self.inner.read().config
    }

    /// Apply a service status for a node; false when nothing changed
    pub(crate) fn set_service(
        &self,
        node: &str,
        status: ServiceStatus,
        error: Option<&str>,
        source: TransitionSource,
    ) -> bool {
        let mut board = self.inner.write();
        let key = node.to_ascii_lowercase();
        let previous = board.nodes.get(&key).copied().unwrap_or_default();

        if previous == status && board.service == status {
            return false;
        }
        if previous != status && !previous.can_transition_to(status) {
            warn!(
                node = %node,
                from = %previous,
                to = %status,
                source = ?source,
                "Service transition outside the status table"
            );
        }

        board.nodes.insert(key, status);
        board.service = status;
        if status == ServiceStatus::InError {
            board.last_service_error = error.map(str::to_string);
        }
        true
    }

    /// Apply a configuration status; false when nothing changed
    pub(crate) fn set_config(
        &self,
        status: ConfigStatus,
        error: Option<&str>,
        source: TransitionSource,
    ) -> bool {
        let mut board = self.inner.write();
        let previous = board.config;

        if previous == status {
            return false;
        }
        if !previous.can_transition_to(status) {
            warn!(
                from = %previous,
                to = %status,
                source = ?source,
                "Configuration transition outside the status table"
            );
        }

        board.config = status;
        if status == ConfigStatus::InError {
            board.last_config_error = error.map(str::to_string);
        }
        true
    }
}
