//! # Farm Watch
//!
//! Console listener for the farm notification channel. Logs every service
//! transition and configuration change broadcast by engines on this host.
//!
//! ## Usage
//!
//! ```bash
//! # Watch the default channel
//! cargo run --bin farm-watch
//!
//! # Watch a channel in another directory
//! FARM__CHANNEL__DIRECTORY=/var/run/mfa-farm cargo run --bin farm-watch
//! ```

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use mfa_farm_core::config::SettingsLoader;
use mfa_farm_core::logging;
use mfa_farm_core::messaging::{NotificationChannel, NotificationHandler, NotificationMessage};

struct LogNotifications;

#[async_trait]
impl NotificationHandler for LogNotifications {
    async fn handle_message(&self, message: NotificationMessage) -> mfa_farm_core::Result<()> {
        let status = message
            .opcode
            .service_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "configuration reload".to_string());
        info!(
            opcode = %message.opcode,
            origin = %format!("{:08x}", message.origin),
            node = %message.payload,
            status = %status,
            "NOTIFICATION"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = SettingsLoader::load().context("failed to load farm settings")?;
    let _log_guard = logging::init_logging(&settings.logging);

    let channel = NotificationChannel::new(&settings.channel);
    let listener = channel
        .bind(rand::random())
        .await
        .with_context(|| format!("failed to bind channel {}", channel.name()))?;

    info!(
        channel = %channel.name(),
        directory = %channel.directory().display(),
        "Watching farm notifications, press Ctrl+C to stop"
    );

    let handle = listener.spawn(Arc::new(LogNotifications));
    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;

    let stats = handle.stats();
    handle.shutdown().await;
    info!(
        received = stats.messages_received,
        decode_errors = stats.decode_errors,
        "Farm watch stopped"
    );
    Ok(())
}
