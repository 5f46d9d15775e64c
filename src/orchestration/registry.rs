//! Farm and node registration, provider activation and theme settings

use tracing::{debug, info};

use super::orchestrator::FarmOrchestrator;
use crate::error::Result;
use crate::logging::log_error;
use crate::models::{Configuration, FarmNode, NodeName};
use crate::state_machine::{ConfigStatus, TransitionSource};

impl FarmOrchestrator {
    async fn canonical_identity(&self, identity: &str) -> Result<String> {
        let name = NodeName::parse(identity)?;
        if name.is_local_alias() {
            return Ok(self.local_node.clone());
        }
        self.admin.resolve_node(name.as_str()).await
    }

    /// Add or refresh a node entry; the farm must already be initialized
    pub async fn register_node(&self, identity: &str) -> Result<FarmNode> {
        let mut cached = self.lock_loaded().await?;
        let configuration = Self::loaded_mut(&mut cached)?;

        let fqdn = self.canonical_identity(identity).await?;
        let node = self
            .metadata
            .node_metadata(self.admin.as_ref(), &fqdn)
            .await?;
        let node = configuration.farm.upsert_node(node).clone();

        configuration.is_dirty = true;
        self.transition_config(ConfigStatus::Dirty, None, TransitionSource::Local);
        info!(
            node = %node.fqdn,
            behavior_level = node.behavior_level,
            node_type = %node.node_type,
            "Node registered"
        );
        Ok(node)
    }

    /// Remove every entry for the node; returns how many were removed
    pub async fn unregister_node(&self, identity: &str) -> Result<usize> {
        let name = NodeName::parse(identity)?;
        let fqdn = if name.is_local_alias() {
            self.local_node.clone()
        } else {
            // A decommissioned host may no longer resolve
            match self.admin.resolve_node(name.as_str()).await {
                Ok(fqdn) => fqdn,
                Err(e) => {
                    debug!(node = %name, error = %e, "Name resolution failed, matching as given");
                    name.to_string()
                }
            }
        };

        let mut cached = self.lock_loaded().await?;
        let configuration = Self::loaded_mut(&mut cached)?;
        let removed = configuration.farm.remove_node(&fqdn);
        if removed > 0 {
            configuration.is_dirty = true;
            self.transition_config(ConfigStatus::Dirty, None, TransitionSource::Local);
            info!(node = %fqdn, removed, "Node unregistered");
        }
        Ok(removed)
    }

    /// Mark the farm initialized and register this node
    ///
    /// On any failure the farm is left marked uninitialized and the error is
    /// returned.
    pub async fn initialize_farm(&self) -> Result<FarmNode> {
        let mut cached = self.configuration.lock().await;
        if cached.is_none() {
            self.load_into(&mut cached, TransitionSource::Local).await?;
        }
        let configuration = Self::loaded_mut(&mut cached)?;

        match self.populate_farm(configuration).await {
            Ok(node) => {
                configuration.is_dirty = true;
                self.transition_config(ConfigStatus::Dirty, None, TransitionSource::Local);
                info!(
                    farm = %configuration.farm.farm_identifier,
                    behavior = configuration.farm.current_farm_behavior,
                    generation = %self.metadata.generation(),
                    "Farm initialized"
                );
                Ok(node)
            }
            Err(e) => {
                configuration.farm.is_initialized = false;
                log_error("orchestrator", "initialize_farm", &e.to_string(), None);
                Err(e)
            }
        }
    }

    async fn populate_farm(&self, configuration: &mut Configuration) -> Result<FarmNode> {
        let facts = self.metadata.farm_facts(self.admin.as_ref()).await?;
        configuration.farm.farm_identifier = facts.identifier;
        configuration.farm.current_farm_behavior = facts.behavior_level;
        configuration.farm.is_initialized = true;

        let node = self
            .metadata
            .node_metadata(self.admin.as_ref(), &self.local_node)
            .await?;
        Ok(configuration.farm.upsert_node(node).clone())
    }

    /// Add the provider to the platform's active list; true when the list changed
    pub async fn enable_provider(&self) -> Result<bool> {
        self.ensure_configuration().await?;

        let provider = &self.settings.provider_name;
        let mut providers = self.admin.active_providers().await?;
        let changed = if providers.iter().any(|p| p.eq_ignore_ascii_case(provider)) {
            false
        } else {
            providers.push(provider.clone());
            self.admin.set_active_providers(&providers).await?;
            true
        };

        self.transition_config_from(
            ConfigStatus::Stopped,
            ConfigStatus::Loaded,
            TransitionSource::Local,
        );
        info!(provider = %provider, changed, "Provider enabled");
        Ok(changed)
    }

    /// Remove the provider from the platform's active list; true when the list changed
    pub async fn disable_provider(&self) -> Result<bool> {
        let provider = &self.settings.provider_name;
        let providers = self.admin.active_providers().await?;
        let remaining: Vec<String> = providers
            .iter()
            .filter(|p| !p.eq_ignore_ascii_case(provider))
            .cloned()
            .collect();

        let changed = remaining.len() != providers.len();
        if changed {
            self.admin.set_active_providers(&remaining).await?;
        }

        self.transition_config(ConfigStatus::Stopped, None, TransitionSource::Local);
        info!(provider = %provider, changed, "Provider disabled");
        Ok(changed)
    }

    pub async fn is_provider_enabled(&self) -> Result<bool> {
        let provider = &self.settings.provider_name;
        Ok(self
            .admin
            .active_providers()
            .await?
            .iter()
            .any(|p| p.eq_ignore_ascii_case(provider)))
    }

    /// Set the platform's paginated-authentication theme option; true when it changed
    pub async fn set_paginated_authentication(&self, enabled: bool) -> Result<bool> {
        if self.admin.paginated_authentication().await? == enabled {
            return Ok(false);
        }
        self.admin.set_paginated_authentication(enabled).await?;
        info!(enabled, "Paginated authentication updated");
        Ok(true)
    }
}
