//! # Orchestration Engine
//!
//! The farm orchestrator owns current status and the cached configuration,
//! drives start/stop/restart against nodes, and registers the farm and its
//! nodes with the platform.
//!
//! ## Core Components
//!
//! - **FarmOrchestrator**: the hub; built with its collaborators injected
//! - **StatusBoard**: aggregate and per-node status, updated before observers run
//! - **ProgressSink**: line output for farm-wide restarts
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mfa_farm_core::config::FarmSettings;
//! use mfa_farm_core::orchestration::{FarmOrchestrator, TracingProgressSink};
//! use mfa_farm_core::platform::PlatformAdmin;
//!
//! # async fn run(admin: Arc<dyn PlatformAdmin>) -> mfa_farm_core::Result<()> {
//! let orchestrator = Arc::new(
//!     FarmOrchestrator::builder(FarmSettings::default())
//!         .with_platform_admin(admin)
//!         .build()
//!         .await?,
//! );
//! let _listener = orchestrator.listen().await?;
//!
//! let summary = orchestrator.restart_farm(Some(&TracingProgressSink)).await?;
//! println!("{} node(s) failed", summary.failed.len());
//! # Ok(())
//! # }
//! ```

pub mod notifications;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod services;
pub mod status;

pub use orchestrator::{FarmOrchestrator, FarmOrchestratorBuilder};
pub use progress::{ProgressSink, RestartSummary, TracingProgressSink};
pub use status::StatusSnapshot;
