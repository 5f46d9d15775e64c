//! Applying other processes' notifications to this orchestrator

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::warn;

use super::orchestrator::FarmOrchestrator;
use crate::error::{FarmError, Result};
use crate::messaging::{ListenerHandle, NotificationHandler, NotificationMessage};
use crate::models::NodeName;
use crate::state_machine::{ServiceStatus, TransitionSource};

/// Routes channel messages into the orchestrator's transition logic
///
/// Holds a weak reference so a running listener never keeps a dropped
/// orchestrator alive.
struct RemoteTransitionHandler {
    orchestrator: Weak<FarmOrchestrator>,
}

#[async_trait]
impl NotificationHandler for RemoteTransitionHandler {
    async fn handle_message(&self, message: NotificationMessage) -> Result<()> {
        if let Some(orchestrator) = self.orchestrator.upgrade() {
            orchestrator.apply_notification(message).await;
        }
        Ok(())
    }
}

impl FarmOrchestrator {
    /// Bind this instance to the notification channel and start receiving
    pub async fn listen(self: &Arc<Self>) -> Result<ListenerHandle> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| FarmError::messaging("notifications are disabled for this orchestrator"))?;

        let listener = channel.bind(self.origin).await?;
        let handler = Arc::new(RemoteTransitionHandler {
            orchestrator: Arc::downgrade(self),
        });
        Ok(listener.spawn(handler))
    }

    /// Apply one received notification as a remote transition
    pub async fn apply_notification(&self, message: NotificationMessage) {
        let Some(status) = message.opcode.service_status() else {
            self.reload_after_remote_change().await;
            return;
        };

        let node = match NodeName::parse(&message.payload) {
            Ok(node) => node,
            Err(e) => {
                warn!(opcode = %message.opcode, error = %e, "Ignoring notification without a node identity");
                return;
            }
        };

        let error = (status == ServiceStatus::InError)
            .then(|| format!("service on node {node} reported an error"));
        self.transition_service(node.as_str(), status, error, TransitionSource::Remote);
    }
}
