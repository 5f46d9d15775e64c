//! Service-control collaborator
//!
//! Per-node status query, start and stop of the federation service. The
//! default [`ServiceControl::wait_for_status`] polls `query_status`; callers
//! bound it with a timeout.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{FarmError, Result};
use crate::state_machine::ServiceStatus;

#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn query_status(&self, node: &str) -> Result<ServiceStatus>;

    /// Issue a start request; returns once the request is accepted
    async fn start(&self, node: &str) -> Result<()>;

    /// Issue a stop request; returns once the request is accepted
    async fn stop(&self, node: &str) -> Result<()>;

    /// Resolve once the node reports `target`; never returns on its own otherwise
    async fn wait_for_status(
        &self,
        node: &str,
        target: ServiceStatus,
        poll_interval: Duration,
    ) -> Result<()> {
        loop {
            let status = self.query_status(node).await?;
            if status == target {
                return Ok(());
            }
            debug!(node = %node, current = %status, target = %target, "Waiting for service status");
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Service control through the Windows `sc.exe` tool
#[derive(Debug, Clone)]
pub struct ScServiceControl {
    service_name: String,
}

impl ScServiceControl {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    async fn sc(&self, node: &str, verb: &str) -> Result<String> {
        let output = Command::new("sc.exe")
            .arg(format!(r"\\{node}"))
            .arg(verb)
            .arg(&self.service_name)
            .output()
            .await
            .map_err(|e| FarmError::platform(format!("sc {verb}"), e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(FarmError::platform(
                format!("sc {verb} {}", self.service_name),
                format!("node {node}: {}", stdout.trim()),
            ));
        }
        Ok(stdout)
    }
}

/// Map the `STATE` line of `sc query` output to a service status
pub fn parse_sc_state(output: &str) -> ServiceStatus {
    let state = output
        .lines()
        .find(|line| line.trim_start().starts_with("STATE"))
        .and_then(|line| line.split_whitespace().nth(3));

    match state {
        Some("RUNNING") => ServiceStatus::Running,
        Some("STOPPED") => ServiceStatus::Stopped,
        Some("START_PENDING") | Some("STOP_PENDING") | Some("CONTINUE_PENDING")
        | Some("PAUSE_PENDING") => ServiceStatus::Pending,
        _ => ServiceStatus::Unknown,
    }
}

#[async_trait]
impl ServiceControl for ScServiceControl {
    async fn query_status(&self, node: &str) -> Result<ServiceStatus> {
        let output = self.sc(node, "query").await?;
        Ok(parse_sc_state(&output))
    }

    async fn start(&self, node: &str) -> Result<()> {
        self.sc(node, "start").await.map(|_| ())
    }

    async fn stop(&self, node: &str) -> Result<()> {
        self.sc(node, "stop").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sc_state() {
        let running = "\nSERVICE_NAME: adfssrv\n        TYPE               : 20  WIN32_SHARE_PROCESS\n        STATE              : 4  RUNNING\n";
        assert_eq!(parse_sc_state(running), ServiceStatus::Running);

        let pending = "        STATE              : 2  START_PENDING\n";
        assert_eq!(parse_sc_state(pending), ServiceStatus::Pending);

        let stopped = "        STATE              : 1  STOPPED\n";
        assert_eq!(parse_sc_state(stopped), ServiceStatus::Stopped);

        assert_eq!(parse_sc_state("garbage"), ServiceStatus::Unknown);
    }
}
