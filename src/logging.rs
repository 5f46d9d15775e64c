//! # Structured Logging Module
//!
//! Console logging plus an optional daily JSON file, so a farm-wide restart
//! can be reconstructed node by node. The `log_*` helpers emit the structured
//! records the engine's operations share.

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingSettings;

fn filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install console logging, plus a daily JSON file when a directory is configured
///
/// `RUST_LOG` overrides `settings.level`. The returned guard flushes the file
/// writer and must be held for the life of the process. A host process that
/// already owns the global subscriber keeps it.
pub fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(filter(settings));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(filter(settings)),
        )
        .with(file_layer);

    if subscriber.try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized, keeping it");
        return None;
    }

    tracing::info!(
        level = %settings.level,
        directory = ?settings.directory,
        "Logging initialized"
    );
    guard
}

/// Log structured data for service start/stop/restart operations
pub fn log_service_operation(operation: &str, node: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        node = %node,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "SERVICE_OPERATION"
    );
}

/// Log structured data for configuration load/save operations
pub fn log_config_operation(operation: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "CONFIG_OPERATION"
    );
}

/// Log structured data for certificate and database provisioning
pub fn log_provisioning_operation(
    operation: &str,
    target: Option<&str>,
    thumbprint: Option<&str>,
    status: &str,
) {
    tracing::info!(
        operation = %operation,
        target = target,
        thumbprint = thumbprint,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "PROVISIONING_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
