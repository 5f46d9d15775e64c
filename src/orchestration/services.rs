//! Service start, stop and restart against farm nodes
//!
//! These operations never return an error: a failed or timed-out platform
//! call becomes `false` plus an `InError` status, with the status board
//! updated before the caller sees the result.

use std::fmt;
use tracing::{debug, warn};

use super::orchestrator::FarmOrchestrator;
use super::progress::{ProgressSink, RestartSummary};
use crate::error::Result;
use crate::logging::{log_error, log_service_operation};
use crate::messaging::Opcode;
use crate::models::NodeName;
use crate::state_machine::{ServiceStatus, TransitionSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceVerb {
    Start,
    Stop,
}

impl ServiceVerb {
    fn target(&self) -> ServiceStatus {
        match self {
            Self::Start => ServiceStatus::Running,
            Self::Stop => ServiceStatus::Stopped,
        }
    }

    fn pending_opcode(&self) -> Opcode {
        match self {
            Self::Start => Opcode::StartPending,
            Self::Stop => Opcode::StopPending,
        }
    }

    fn complete_opcode(&self) -> Opcode {
        match self {
            Self::Start => Opcode::StartComplete,
            Self::Stop => Opcode::StopComplete,
        }
    }
}

impl fmt::Display for ServiceVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

impl FarmOrchestrator {
    /// True when the node reports a running service; probe failures read as false
    pub async fn is_running(&self, node: Option<&str>) -> Result<bool> {
        let target = self.resolve_target(node)?;
        match self.services.query_status(&target).await {
            Ok(status) => Ok(status == ServiceStatus::Running),
            Err(e) => {
                debug!(node = %target, error = %e, "Service status probe failed");
                Ok(false)
            }
        }
    }

    /// True when the node's service-control facility answers at all
    pub async fn is_reachable(&self, node: Option<&str>) -> Result<bool> {
        let target = self.resolve_target(node)?;
        match self.services.query_status(&target).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!(node = %target, error = %e, "Service reachability probe failed");
                Ok(false)
            }
        }
    }

    pub async fn start(&self, node: Option<&str>) -> bool {
        match self.resolve_target(node) {
            Ok(target) => self.drive(&target, ServiceVerb::Start).await,
            Err(e) => {
                log_error("orchestrator", "start", &e.to_string(), node);
                false
            }
        }
    }

    pub async fn stop(&self, node: Option<&str>) -> bool {
        match self.resolve_target(node) {
            Ok(target) => self.drive(&target, ServiceVerb::Stop).await,
            Err(e) => {
                log_error("orchestrator", "stop", &e.to_string(), node);
                false
            }
        }
    }

    /// Stop then start every farm entry matching `node`
    ///
    /// The local node and its aliases are restarted without consulting the
    /// farm. Any other name must match at least one registered entry.
    pub async fn restart_node(&self, node: Option<&str>) -> bool {
        let name = match node.map(NodeName::parse).transpose() {
            Ok(name) => name,
            Err(e) => {
                log_error("orchestrator", "restart", &e.to_string(), node);
                return false;
            }
        };

        let name = match name {
            Some(name) if !name.is_local_alias() && !name.matches(&self.local_node) => name,
            _ => {
                let local = self.local_node.clone();
                return self.restart_one(&local).await;
            }
        };

        let matching: Vec<String> = match self.nodes().await {
            Ok(nodes) => nodes
                .into_iter()
                .filter(|n| name.matches(&n.fqdn))
                .map(|n| n.fqdn)
                .collect(),
            Err(e) => {
                log_error("orchestrator", "restart", &e.to_string(), Some(name.as_str()));
                return false;
            }
        };

        if matching.is_empty() {
            warn!(node = %name, "Restart requested for a node that is not registered in the farm");
            return false;
        }

        let mut restarted = true;
        for fqdn in &matching {
            restarted &= self.restart_one(fqdn).await;
        }
        restarted
    }

    /// Restart every farm node, one at a time, in registration order
    ///
    /// A failed node does not stop the loop. Fails only when the farm
    /// configuration itself is unavailable.
    pub async fn restart_farm(&self, progress: Option<&dyn ProgressSink>) -> Result<RestartSummary> {
        let nodes: Vec<String> = self.nodes().await?.into_iter().map(|n| n.fqdn).collect();
        let emit = |line: String| {
            if let Some(sink) = progress {
                sink.write_line(&line);
            }
        };

        let total = nodes.len();
        emit(format!("Restarting {total} farm node(s)"));

        let mut summary = RestartSummary::default();
        for (index, fqdn) in nodes.into_iter().enumerate() {
            emit(format!("[{}/{total}] Restarting {fqdn}", index + 1));
            let restarted = self.restart_one(&fqdn).await;
            if restarted {
                emit(format!("[{}/{total}] {fqdn} restarted", index + 1));
            } else {
                let reason = self
                    .status
                    .snapshot()
                    .last_service_error
                    .unwrap_or_else(|| "unknown error".to_string());
                emit(format!("[{}/{total}] {fqdn} failed: {reason}", index + 1));
                summary.failed.push(fqdn.clone());
            }
            summary.attempted.push(fqdn);
        }

        emit(format!(
            "Farm restart finished: {} of {total} node(s) restarted",
            summary.succeeded()
        ));
        Ok(summary)
    }

    async fn restart_one(&self, node: &str) -> bool {
        log_service_operation("restart", node, "started", None);
        // Starting after a failed stop would hide the failure
        self.drive(node, ServiceVerb::Stop).await && self.drive(node, ServiceVerb::Start).await
    }

    async fn drive(&self, node: &str, verb: ServiceVerb) -> bool {
        let target = verb.target();
        log_service_operation(&verb.to_string(), node, "pending", None);
        self.transition_service(node, ServiceStatus::Pending, None, TransitionSource::Local);
        self.broadcast(verb.pending_opcode(), node).await;

        let timeout = self.settings.service_timeout();
        let error = match tokio::time::timeout(timeout, self.reach(node, verb)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "service on node {node} did not reach {target} within {}s",
                timeout.as_secs()
            )),
        };

        match error {
            None => {
                log_service_operation(&verb.to_string(), node, &target.to_string(), None);
                self.transition_service(node, target, None, TransitionSource::Local);
                self.broadcast(verb.complete_opcode(), node).await;
                true
            }
            Some(message) => {
                log_error("orchestrator", &verb.to_string(), &message, Some(node));
                self.transition_service(
                    node,
                    ServiceStatus::InError,
                    Some(message),
                    TransitionSource::Local,
                );
                self.broadcast(Opcode::Error, node).await;
                false
            }
        }
    }

    async fn reach(&self, node: &str, verb: ServiceVerb) -> Result<()> {
        let target = verb.target();
        if self.services.query_status(node).await? != target {
            match verb {
                ServiceVerb::Start => self.services.start(node).await?,
                ServiceVerb::Stop => self.services.stop(node).await?,
            }
        }
        self.services
            .wait_for_status(node, target, self.settings.service_poll_interval())
            .await
    }
}
