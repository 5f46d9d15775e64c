#![allow(clippy::doc_markdown)] // Allow technical terms like SHA-1, T-SQL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MFA Farm Core
//!
//! Farm orchestration and configuration state engine for the federation
//! nodes that host a multi-factor authentication provider.
//!
//! ## Overview
//!
//! The engine keeps authoritative status for the farm's federation services
//! and for its configuration object, starts and stops services on individual
//! nodes and across the farm with bounded waits, tells other processes on the
//! same machine about state changes, and provisions the column-encrypted
//! databases that hold user registrations and secret keys.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - The farm orchestrator: service control, farm registry, configuration access
//! - [`state_machine`] - Service and configuration status with their transition tables
//! - [`events`] - Observer list and async event stream
//! - [`messaging`] - Best-effort host-local notification channel
//! - [`models`] - Farm, nodes and the persisted configuration
//! - [`platform`] - Service-control and administration collaborators, metadata strategies
//! - [`store`] - Configuration persistence
//! - [`provisioning`] - Certificates, key wrapping and database setup
//! - [`config`] - Engine settings
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mfa_farm_core::config::SettingsLoader;
//! use mfa_farm_core::orchestration::FarmOrchestrator;
//! use mfa_farm_core::platform::PlatformAdmin;
//!
//! # async fn example(admin: Arc<dyn PlatformAdmin>) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::load()?;
//! let _log_guard = mfa_farm_core::logging::init_logging(&settings.logging);
//!
//! let orchestrator = FarmOrchestrator::builder(settings)
//!     .with_platform_admin(admin)
//!     .build()
//!     .await?;
//!
//! orchestrator.observe_fn(|event| println!("{}", event.event_type()));
//!
//! if !orchestrator.start(None).await {
//!     eprintln!("{:?}", orchestrator.status().last_service_error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod platform;
pub mod provisioning;
pub mod state_machine;
pub mod store;

pub use config::{FarmSettings, SettingsLoader};
pub use error::{FarmError, Result};
pub use models::{Configuration, Farm, FarmNode};
pub use orchestration::{FarmOrchestrator, ProgressSink, RestartSummary};
pub use state_machine::{ConfigStatus, ServiceStatus, StatusEvent};
