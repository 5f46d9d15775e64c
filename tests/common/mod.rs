//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use mfa_farm_core::config::FarmSettings;
use mfa_farm_core::error::{FarmError, Result};
use mfa_farm_core::models::{Configuration, FarmNode, HostDescriptor};
use mfa_farm_core::orchestration::{FarmOrchestrator, ProgressSink};
use mfa_farm_core::platform::{
    ClusterMember, FarmInformation, FarmProperties, PlatformAdmin, PlatformGeneration,
    PlatformVersion, ServiceControl,
};
use mfa_farm_core::provisioning::SqlExecutor;
use mfa_farm_core::state_machine::{ServiceStatus, StatusEvent};
use mfa_farm_core::store::ConfigurationStore;

pub const LOCAL_NODE: &str = "adfs01.corp.local";

// ---------------------------------------------------------------------------
// Service control
// ---------------------------------------------------------------------------

/// Records every start/stop in order; nodes can be told to fail, hang or vanish
#[derive(Default)]
pub struct FakeServiceControl {
    statuses: Mutex<HashMap<String, ServiceStatus>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    stuck: Mutex<HashSet<String>>,
    unreachable: Mutex<HashSet<String>>,
}

impl FakeServiceControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, node: &str, status: ServiceStatus) {
        self.statuses.lock().insert(node.to_ascii_lowercase(), status);
    }

    /// Start and stop requests for the node are rejected
    pub fn fail_node(&self, node: &str) {
        self.failing.lock().insert(node.to_ascii_lowercase());
    }

    /// Requests are accepted but the node never changes state
    pub fn hang_node(&self, node: &str) {
        self.stuck.lock().insert(node.to_ascii_lowercase());
    }

    pub fn make_unreachable(&self, node: &str) {
        self.unreachable.lock().insert(node.to_ascii_lowercase());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn request(&self, verb: &str, node: &str, target: ServiceStatus) -> Result<()> {
        let key = node.to_ascii_lowercase();
        self.calls.lock().push(format!("{verb}:{key}"));
        if self.failing.lock().contains(&key) {
            return Err(FarmError::platform(
                format!("sc {verb}"),
                format!("node {node}: access denied"),
            ));
        }
        if !self.stuck.lock().contains(&key) {
            self.statuses.lock().insert(key, target);
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceControl for FakeServiceControl {
    async fn query_status(&self, node: &str) -> Result<ServiceStatus> {
        let key = node.to_ascii_lowercase();
        if self.unreachable.lock().contains(&key) {
            return Err(FarmError::platform(
                "sc query",
                format!("node {node}: RPC server unavailable"),
            ));
        }
        Ok(self
            .statuses
            .lock()
            .get(&key)
            .copied()
            .unwrap_or(ServiceStatus::Running))
    }

    async fn start(&self, node: &str) -> Result<()> {
        self.request("start", node, ServiceStatus::Running)
    }

    async fn stop(&self, node: &str) -> Result<()> {
        self.request("stop", node, ServiceStatus::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Platform administration
// ---------------------------------------------------------------------------

pub struct FakeAdmin {
    pub build: Mutex<u32>,
    pub providers: Mutex<Vec<String>>,
    pub provider_writes: AtomicUsize,
    pub paginated: Mutex<bool>,
    pub members: Mutex<Vec<ClusterMember>>,
    pub fail_farm_information: AtomicBool,
}

impl FakeAdmin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            build: Mutex::new(17763),
            providers: Mutex::new(vec!["FormsAuthentication".to_string()]),
            provider_writes: AtomicUsize::new(0),
            paginated: Mutex::new(false),
            members: Mutex::new(
                ["adfs01", "adfs02", "adfs03"]
                    .iter()
                    .enumerate()
                    .map(|(i, host)| ClusterMember {
                        fqdn: format!("{host}.corp.local"),
                        behavior_level: 4,
                        role: if i == 0 { "PrimaryComputer" } else { "SecondaryComputer" }
                            .to_string(),
                        last_heartbeat: Some(Utc::now()),
                    })
                    .collect(),
            ),
            fail_farm_information: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PlatformAdmin for FakeAdmin {
    async fn platform_version(&self) -> Result<PlatformVersion> {
        Ok(PlatformVersion {
            major: 10,
            minor: 0,
            build: *self.build.lock(),
        })
    }

    async fn local_node_name(&self) -> Result<String> {
        Ok(LOCAL_NODE.to_string())
    }

    async fn resolve_node(&self, name: &str) -> Result<String> {
        let name = name.to_ascii_lowercase();
        if name.contains('.') {
            Ok(name)
        } else {
            Ok(format!("{name}.corp.local"))
        }
    }

    async fn host_descriptor(&self, _fqdn: &str) -> Result<HostDescriptor> {
        Ok(HostDescriptor {
            product_name: "Windows Server 2019 Datacenter".to_string(),
            major_version: 10,
            minor_version: 0,
            build: *self.build.lock(),
            installation_type: "Server".to_string(),
        })
    }

    async fn farm_properties(&self) -> Result<FarmProperties> {
        Ok(FarmProperties {
            identifier: "sts.corp.local".to_string(),
            host_name: "sts.corp.local".to_string(),
        })
    }

    async fn farm_information(&self) -> Result<FarmInformation> {
        if self.fail_farm_information.load(Ordering::SeqCst) {
            return Err(FarmError::platform(
                "Get-AdfsFarmInformation",
                "the farm information service is unavailable",
            ));
        }
        Ok(FarmInformation {
            behavior_level: 4,
            members: self.members.lock().clone(),
        })
    }

    async fn active_providers(&self) -> Result<Vec<String>> {
        Ok(self.providers.lock().clone())
    }

    async fn set_active_providers(&self, providers: &[String]) -> Result<()> {
        self.provider_writes.fetch_add(1, Ordering::SeqCst);
        *self.providers.lock() = providers.to_vec();
        Ok(())
    }

    async fn paginated_authentication(&self) -> Result<bool> {
        Ok(*self.paginated.lock())
    }

    async fn set_paginated_authentication(&self, enabled: bool) -> Result<()> {
        *self.paginated.lock() = enabled;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub configuration: Mutex<Configuration>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with(configuration: Configuration) -> Arc<Self> {
        Arc::new(Self {
            configuration: Mutex::new(configuration),
            ..Self::default()
        })
    }

    pub fn stored(&self) -> Configuration {
        self.configuration.lock().clone()
    }
}

#[async_trait]
impl ConfigurationStore for MemoryStore {
    async fn read(&self) -> Result<Configuration> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which a second load could sneak in
        tokio::task::yield_now().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(FarmError::persistence("read", "configuration database is offline"));
        }
        Ok(self.configuration.lock().clone())
    }

    async fn write(&self, configuration: &Configuration) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FarmError::persistence("write", "configuration database is read-only"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.configuration.lock() = configuration.clone();
        Ok(())
    }
}

pub fn node(fqdn: &str) -> FarmNode {
    FarmNode {
        fqdn: fqdn.to_string(),
        behavior_level: 4,
        node_type: "SecondaryComputer".to_string(),
        heartbeat: Utc::now(),
        host: HostDescriptor::default(),
    }
}

/// An initialized farm with the given nodes in registration order
pub fn initialized_configuration(nodes: &[&str]) -> Configuration {
    let mut configuration = Configuration::default();
    configuration.farm.is_initialized = true;
    configuration.farm.farm_identifier = "sts.corp.local".to_string();
    configuration.farm.current_farm_behavior = 4;
    configuration.farm.nodes = nodes.iter().map(|fqdn| node(fqdn)).collect();
    configuration
}

// ---------------------------------------------------------------------------
// Provisioning and progress
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSqlExecutor {
    statements: Mutex<Vec<String>>,
    fail_containing: Mutex<Vec<String>>,
}

impl RecordingSqlExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every batch containing `fragment`
    pub fn fail_on(&self, fragment: &str) {
        self.fail_containing.lock().push(fragment.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }
}

#[async_trait]
impl SqlExecutor for RecordingSqlExecutor {
    async fn execute(&self, batch: &str) -> Result<()> {
        self.statements.lock().push(batch.to_string());
        if let Some(fragment) = self
            .fail_containing
            .lock()
            .iter()
            .find(|fragment| batch.contains(fragment.as_str()))
        {
            return Err(FarmError::platform("execute", format!("statement rejected near '{fragment}'")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn test_settings() -> FarmSettings {
    FarmSettings {
        service_timeout_seconds: 1,
        service_poll_interval_ms: 10,
        ..FarmSettings::default()
    }
}

pub fn channel_settings(directory: &Path) -> FarmSettings {
    let mut settings = test_settings();
    settings.channel.name = "farm-test".to_string();
    settings.channel.directory = directory.to_path_buf();
    settings
}

pub struct Harness {
    pub orchestrator: Arc<FarmOrchestrator>,
    pub services: Arc<FakeServiceControl>,
    pub admin: Arc<FakeAdmin>,
    pub store: Arc<MemoryStore>,
    pub events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl Harness {
    pub async fn new(configuration: Configuration) -> Self {
        Self::with_generation(configuration, PlatformGeneration::Extended).await
    }

    pub async fn with_generation(configuration: Configuration, generation: PlatformGeneration) -> Self {
        let services = FakeServiceControl::new();
        let admin = FakeAdmin::new();
        let store = MemoryStore::with(configuration);
        let orchestrator = FarmOrchestrator::builder(test_settings())
            .with_store(store.clone())
            .with_service_control(services.clone())
            .with_platform_admin(admin.clone())
            .with_generation(generation)
            .without_notifications()
            .build()
            .await
            .expect("orchestrator builds");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        orchestrator.observe_fn(move |event| sink.lock().push(event.clone()));

        Self {
            orchestrator: Arc::new(orchestrator),
            services,
            admin,
            store,
            events,
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type()).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}
