//! # Farm Orchestrator
//!
//! The hub of the engine. One instance owns the cached [`Configuration`], the
//! current service and configuration status, and the observer list. All
//! collaborators are injected through [`FarmOrchestratorBuilder`], so several
//! instances in one process never share state.
//!
//! ## Locking
//!
//! A single `tokio` mutex guards the cached configuration and is held across
//! the load, so only one load can ever populate the cache. Every status
//! transition, local or replayed from another process, applies to the board
//! and reaches observers under one transition lock, so observers see the
//! same order the board applied. Observers run synchronously and must not
//! call back into the orchestrator's async operations.

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::status::{StatusBoard, StatusSnapshot};
use crate::config::FarmSettings;
use crate::error::{FarmError, Result};
use crate::events::{StatusEventPublisher, StatusObserver, SubscriptionId};
use crate::logging::{log_config_operation, log_error};
use crate::messaging::{NotificationChannel, NotificationMessage, Opcode};
use crate::models::{Configuration, FarmNode, NodeName};
use crate::platform::{
    MetadataStrategy, PlatformAdmin, PlatformGeneration, ScServiceControl, ServiceControl,
};
use crate::state_machine::{ConfigStatus, ServiceStatus, StatusEvent, TransitionSource};
use crate::store::{ConfigurationStore, JsonFileStore};

pub struct FarmOrchestrator {
    pub(super) settings: FarmSettings,
    pub(super) origin: u32,
    pub(super) local_node: String,
    pub(super) store: Arc<dyn ConfigurationStore>,
    pub(super) services: Arc<dyn ServiceControl>,
    pub(super) admin: Arc<dyn PlatformAdmin>,
    pub(super) metadata: Arc<dyn MetadataStrategy>,
    pub(super) channel: Option<NotificationChannel>,
    pub(super) publisher: StatusEventPublisher,
    pub(super) status: StatusBoard,
    /// Held across a board update and its publication
    pub(super) transitions: parking_lot::Mutex<()>,
    pub(super) configuration: Mutex<Option<Configuration>>,
}

impl FarmOrchestrator {
    pub fn builder(settings: FarmSettings) -> FarmOrchestratorBuilder {
        FarmOrchestratorBuilder::new(settings)
    }

    pub fn settings(&self) -> &FarmSettings {
        &self.settings
    }

    /// Identity stamped on this instance's broadcasts
    pub fn origin(&self) -> u32 {
        self.origin
    }

    /// Canonical identity of the node this engine runs on
    pub fn local_node(&self) -> &str {
        &self.local_node
    }

    pub fn generation(&self) -> PlatformGeneration {
        self.metadata.generation()
    }

    pub fn notification_channel(&self) -> Option<&NotificationChannel> {
        self.channel.as_ref()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.status.snapshot().service
    }

    pub fn config_status(&self) -> ConfigStatus {
        self.status.config()
    }

    /// Register an observer; the orchestrator's own state is always updated first
    pub fn observe(&self, observer: Arc<dyn StatusObserver>) -> SubscriptionId {
        self.publisher.observe(observer)
    }

    pub fn observe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.publisher.observe_fn(f)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    pub fn subscribe_stream(&self) -> broadcast::Receiver<StatusEvent> {
        self.publisher.subscribe_stream()
    }

    // ---------------------------------------------------------------------
    // Transitions and broadcast
    // ---------------------------------------------------------------------

    pub(super) fn transition_service(
        &self,
        node: &str,
        status: ServiceStatus,
        error: Option<String>,
        source: TransitionSource,
    ) {
        let _ordered = self.transitions.lock();
        if self
            .status
            .set_service(node, status, error.as_deref(), source)
        {
            debug!(node = %node, status = %status, source = ?source, "Service status changed");
            self.publisher
                .publish(&StatusEvent::service(status, node, error, source));
        }
    }

    pub(super) fn transition_config(
        &self,
        status: ConfigStatus,
        error: Option<String>,
        source: TransitionSource,
    ) {
        let _ordered = self.transitions.lock();
        if self.status.set_config(status, error.as_deref(), source) {
            debug!(status = %status, source = ?source, "Configuration status changed");
            self.publisher
                .publish(&StatusEvent::config(status, error, source));
        }
    }

    /// Move configuration status to `status` only while it is still `from`
    pub(super) fn transition_config_from(
        &self,
        from: ConfigStatus,
        status: ConfigStatus,
        source: TransitionSource,
    ) {
        let _ordered = self.transitions.lock();
        if self.status.config() == from && self.status.set_config(status, None, source) {
            debug!(from = %from, status = %status, source = ?source, "Configuration status changed");
            self.publisher
                .publish(&StatusEvent::config(status, None, source));
        }
    }

    /// Best-effort broadcast to other processes; never fails
    pub(super) async fn broadcast(&self, opcode: Opcode, payload: &str) {
        if let Some(channel) = &self.channel {
            channel
                .send(&NotificationMessage::new(opcode, self.origin, payload))
                .await;
        }
    }

    /// Map a caller-supplied node to a concrete identity; `None` and local aliases mean this node
    pub(super) fn resolve_target(&self, node: Option<&str>) -> Result<String> {
        match node {
            None => Ok(self.local_node.clone()),
            Some(raw) => {
                let name = NodeName::parse(raw)?;
                if name.is_local_alias() {
                    Ok(self.local_node.clone())
                } else {
                    Ok(name.to_string())
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Configuration access
    // ---------------------------------------------------------------------

    /// Record a configuration failure before it reaches the caller
    fn config_failure(&self, operation: &str, error: FarmError) -> FarmError {
        log_error("orchestrator", operation, &error.to_string(), None);
        self.transition_config(
            ConfigStatus::InError,
            Some(error.to_string()),
            TransitionSource::Local,
        );
        error
    }

    fn require_initialized(configuration: &Configuration) -> Result<()> {
        if configuration.farm.is_initialized {
            Ok(())
        } else {
            Err(FarmError::farm_not_initialized(
                "the farm configuration has not been initialized; initialize the farm from a federation node first",
            ))
        }
    }

    pub(super) fn loaded_mut(
        cached: &mut Option<Configuration>,
    ) -> Result<&mut Configuration> {
        cached
            .as_mut()
            .ok_or_else(|| FarmError::configuration_not_loaded("no configuration is cached"))
    }

    /// Lock the cache, loading it first when empty
    pub(super) async fn lock_loaded(&self) -> Result<MutexGuard<'_, Option<Configuration>>> {
        let mut cached = self.configuration.lock().await;
        if let Some(configuration) = cached.as_ref() {
            Self::require_initialized(configuration)
                .map_err(|e| self.config_failure("ensure_configuration", e))?;
            return Ok(cached);
        }

        self.services
            .query_status(&self.local_node)
            .await
            .map_err(|e| {
                self.config_failure(
                    "ensure_configuration",
                    FarmError::service_unreachable(&self.local_node, e.to_string()),
                )
            })?;

        let configuration = self
            .store
            .read()
            .await
            .map_err(|e| self.config_failure("ensure_configuration", e))?;
        Self::require_initialized(&configuration)
            .map_err(|e| self.config_failure("ensure_configuration", e))?;

        *cached = Some(configuration);
        log_config_operation("ensure", "loaded", None);
        self.transition_config(ConfigStatus::Loaded, None, TransitionSource::Local);
        Ok(cached)
    }

    /// Load the configuration unless it is already cached
    ///
    /// Fails with a not-initialized error when the persisted farm has never
    /// been initialized, and with [`FarmError::ServiceUnreachable`] when the
    /// local federation service cannot be queried.
    pub async fn ensure_configuration(&self) -> Result<()> {
        self.lock_loaded().await.map(|_| ())
    }

    /// Snapshot of the cached configuration, loading it if necessary
    pub async fn configuration(&self) -> Result<Configuration> {
        let mut cached = self.lock_loaded().await?;
        Self::loaded_mut(&mut cached).map(|c| c.clone())
    }

    /// Cached configuration without triggering a load
    pub async fn cached_configuration(&self) -> Option<Configuration> {
        self.configuration.lock().await.clone()
    }

    pub async fn nodes(&self) -> Result<Vec<FarmNode>> {
        let mut cached = self.lock_loaded().await?;
        Ok(Self::loaded_mut(&mut cached)?.farm.nodes.clone())
    }

    /// Set the dirty flag; marking dirty notifies observers once
    pub async fn set_dirty(&self, dirty: bool) -> Result<()> {
        let mut cached = self.lock_loaded().await?;
        let configuration = Self::loaded_mut(&mut cached)?;
        configuration.is_dirty = dirty;
        if dirty {
            self.transition_config(ConfigStatus::Dirty, None, TransitionSource::Local);
        }
        Ok(())
    }

    /// Mutate the cached configuration in place and mark it dirty
    pub async fn update_configuration<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Configuration) -> R,
    {
        let mut cached = self.lock_loaded().await?;
        let configuration = Self::loaded_mut(&mut cached)?;
        let result = f(configuration);
        configuration.is_dirty = true;
        self.transition_config(ConfigStatus::Dirty, None, TransitionSource::Local);
        Ok(result)
    }

    pub(super) async fn load_into(
        &self,
        cached: &mut Option<Configuration>,
        source: TransitionSource,
    ) -> Result<Configuration> {
        match self.store.read().await {
            Ok(configuration) => {
                *cached = Some(configuration.clone());
                log_config_operation("read", "loaded", None);
                self.transition_config(ConfigStatus::Loaded, None, source);
                Ok(configuration)
            }
            Err(e) => {
                log_error("orchestrator", "read_configuration", &e.to_string(), None);
                self.transition_config(ConfigStatus::InError, Some(e.to_string()), source);
                Err(e)
            }
        }
    }

    /// Replace the cache with the persisted configuration
    ///
    /// Unlike [`ensure_configuration`](Self::ensure_configuration) this does not
    /// require an initialized farm.
    pub async fn read_configuration(&self) -> Result<Configuration> {
        let mut cached = self.configuration.lock().await;
        self.load_into(&mut cached, TransitionSource::Local).await
    }

    /// Persist the cached configuration and tell other processes to reload
    pub async fn write_configuration(&self) -> Result<()> {
        let mut cached = self.lock_loaded().await?;
        let configuration = Self::loaded_mut(&mut cached)?;
        self.transition_config(ConfigStatus::Dirty, None, TransitionSource::Local);

        let was_dirty = configuration.is_dirty;
        configuration.is_dirty = false;
        if let Err(e) = self.store.write(configuration).await {
            configuration.is_dirty = was_dirty;
            log_error("orchestrator", "write_configuration", &e.to_string(), None);
            self.transition_config(ConfigStatus::InError, Some(e.to_string()), TransitionSource::Local);
            return Err(e);
        }

        log_config_operation("write", "saved", None);
        self.transition_config(ConfigStatus::Saved, None, TransitionSource::Local);
        drop(cached);

        self.broadcast(Opcode::ConfigurationChanged, &self.local_node)
            .await;
        Ok(())
    }

    /// Mutate, mark dirty and persist in one step
    pub async fn update_and_write<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Configuration) -> R,
    {
        let result = self.update_configuration(f).await?;
        self.write_configuration().await?;
        Ok(result)
    }

    /// Another process saved the configuration; reload unless ours has unsaved edits
    ///
    /// A dirty cache is kept as is and stays `Dirty`. Its next successful
    /// write replaces the other process's version.
    pub(super) async fn reload_after_remote_change(&self) {
        let mut cached = self.configuration.lock().await;
        match cached.as_ref() {
            None => {
                debug!("Configuration change notified before first load, nothing cached");
                return;
            }
            Some(configuration) if configuration.is_dirty => {
                warn!("Configuration changed by another process while local edits are unsaved, keeping local copy");
                return;
            }
            Some(_) => {}
        }
        *cached = None;
        // Failure is recorded as InError by load_into
        let _ = self.load_into(&mut cached, TransitionSource::Remote).await;
    }
}

impl std::fmt::Debug for FarmOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FarmOrchestrator")
            .field("origin", &format_args!("{:08x}", self.origin))
            .field("local_node", &self.local_node)
            .field("generation", &self.generation())
            .field("status", &self.status.snapshot())
            .finish()
    }
}

/// Builder for [`FarmOrchestrator`]
///
/// Only the platform administration collaborator is mandatory. The store
/// defaults to a [`JsonFileStore`] at `settings.store_path`, service control to
/// [`ScServiceControl`], and the notification channel to `settings.channel`.
pub struct FarmOrchestratorBuilder {
    settings: FarmSettings,
    store: Option<Arc<dyn ConfigurationStore>>,
    services: Option<Arc<dyn ServiceControl>>,
    admin: Option<Arc<dyn PlatformAdmin>>,
    generation: Option<PlatformGeneration>,
    origin: Option<u32>,
    notifications: bool,
}

impl FarmOrchestratorBuilder {
    pub fn new(settings: FarmSettings) -> Self {
        Self {
            settings,
            store: None,
            services: None,
            admin: None,
            generation: None,
            origin: None,
            notifications: true,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConfigurationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_service_control(mut self, services: Arc<dyn ServiceControl>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_platform_admin(mut self, admin: Arc<dyn PlatformAdmin>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Skip the version probe
    pub fn with_generation(mut self, generation: PlatformGeneration) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_origin(mut self, origin: u32) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Disable the inter-process notification channel
    pub fn without_notifications(mut self) -> Self {
        self.notifications = false;
        self
    }

    pub async fn build(self) -> Result<FarmOrchestrator> {
        self.settings.validate()?;

        let admin = self.admin.ok_or_else(|| {
            FarmError::settings("a platform administration collaborator is required")
        })?;

        let generation = match self.generation {
            Some(generation) => generation,
            None => PlatformGeneration::detect(admin.as_ref()).await?,
        };

        let local_node = match &self.settings.local_node {
            Some(name) => NodeName::parse(name)?.to_string(),
            None => admin.local_node_name().await?,
        };

        let store = self.store.unwrap_or_else(|| {
            Arc::new(JsonFileStore::new(self.settings.store_path.clone()))
        });
        let services = self.services.unwrap_or_else(|| {
            Arc::new(ScServiceControl::new(self.settings.service_name.clone()))
        });
        let channel = self
            .notifications
            .then(|| NotificationChannel::new(&self.settings.channel));
        let origin = self.origin.unwrap_or_else(rand::random);

        info!(
            local_node = %local_node,
            generation = %generation,
            origin = %format!("{origin:08x}"),
            notifications = channel.is_some(),
            "Farm orchestrator created"
        );

        Ok(FarmOrchestrator {
            settings: self.settings,
            origin,
            local_node,
            store,
            services,
            admin,
            metadata: generation.strategy(),
            channel,
            publisher: StatusEventPublisher::default(),
            status: StatusBoard::default(),
            transitions: parking_lot::Mutex::new(()),
            configuration: Mutex::new(None),
        })
    }
}
