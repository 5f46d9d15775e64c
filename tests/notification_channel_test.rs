//! Two engine instances on one host exchanging status over the notification channel

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use common::{
    channel_settings, initialized_configuration, FakeAdmin, FakeServiceControl, Harness, MemoryStore,
    LOCAL_NODE,
};
use mfa_farm_core::messaging::{NotificationMessage, Opcode};
use mfa_farm_core::orchestration::FarmOrchestrator;
use mfa_farm_core::platform::PlatformGeneration;
use mfa_farm_core::state_machine::{ConfigStatus, ServiceStatus, StatusEvent, TransitionSource};

async fn instance(dir: &std::path::Path, store: Arc<MemoryStore>, origin: u32) -> Arc<FarmOrchestrator> {
    let orchestrator = FarmOrchestrator::builder(channel_settings(dir))
        .with_store(store)
        .with_service_control(FakeServiceControl::new())
        .with_platform_admin(FakeAdmin::new())
        .with_generation(PlatformGeneration::Extended)
        .with_origin(origin)
        .build()
        .await
        .unwrap();
    Arc::new(orchestrator)
}

/// Next remote service event for `status`, skipping anything else
async fn next_remote(events: &mut broadcast::Receiver<StatusEvent>, status: ServiceStatus) -> StatusEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if let StatusEvent::Service { status: s, source: TransitionSource::Remote, .. } = &event {
                if *s == status {
                    return event;
                }
            }
        }
    })
    .await
    .expect("remote event arrives")
}

#[tokio::test]
async fn test_remote_start_is_replayed_on_other_instance() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::with(initialized_configuration(&[LOCAL_NODE]));
    let a = instance(dir.path(), Arc::clone(&store), 0xA).await;
    let b = instance(dir.path(), Arc::clone(&store), 0xB).await;

    let listener_a = a.listen().await.unwrap();
    let listener_b = b.listen().await.unwrap();
    let mut events = b.subscribe_stream();

    assert!(a.start(Some("adfs02.corp.local")).await);

    let event = next_remote(&mut events, ServiceStatus::Running).await;
    assert!(matches!(event, StatusEvent::Service { ref node, .. } if node == "adfs02.corp.local"));
    assert_eq!(b.status().node_status("adfs02.corp.local"), ServiceStatus::Running);

    // Own broadcasts never come back as remote transitions
    assert_eq!(listener_a.stats().messages_received, 0);
    assert!(listener_b.stats().messages_received >= 2);

    listener_a.shutdown().await;
    listener_b.shutdown().await;
}

#[tokio::test]
async fn test_configuration_write_triggers_reload_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::with(initialized_configuration(&[LOCAL_NODE]));
    let a = instance(dir.path(), Arc::clone(&store), 0xA).await;
    let b = instance(dir.path(), Arc::clone(&store), 0xB).await;
    let listener_b = b.listen().await.unwrap();

    a.ensure_configuration().await.unwrap();
    b.ensure_configuration().await.unwrap();

    let thumbprint = "C0FFEE".repeat(6) + "C0FF";
    let expected = Some(thumbprint.clone());
    a.update_and_write(move |c| c.certificate_thumbprint = Some(thumbprint))
        .await
        .unwrap();

    let reloaded = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(cached) = b.cached_configuration().await {
                if cached.certificate_thumbprint == expected {
                    return cached;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("other instance reloads");

    assert!(!reloaded.is_dirty);
    listener_b.shutdown().await;
}

#[tokio::test]
async fn test_listener_registration_is_removed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::with(initialized_configuration(&[LOCAL_NODE]));
    let a = instance(dir.path(), store, 0xA).await;

    let listener = a.listen().await.unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    listener.shutdown().await;
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_listen_fails_when_notifications_are_disabled() {
    let h = Harness::new(initialized_configuration(&[LOCAL_NODE])).await;
    assert!(h.orchestrator.listen().await.is_err());
}

#[tokio::test]
async fn test_remote_error_carries_node_in_message() {
    let h = Harness::new(initialized_configuration(&[LOCAL_NODE])).await;

    h.orchestrator
        .apply_notification(NotificationMessage::new(Opcode::Error, 7, "adfs03.corp.local"))
        .await;

    let events = h.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source(), TransitionSource::Remote);
    assert_eq!(
        events[0].error_message(),
        Some("service on node adfs03.corp.local reported an error")
    );
}

#[tokio::test]
async fn test_notification_without_node_identity_is_ignored() {
    let h = Harness::new(initialized_configuration(&[LOCAL_NODE])).await;

    h.orchestrator
        .apply_notification(NotificationMessage::new(Opcode::StartComplete, 7, "not a node"))
        .await;
    assert!(h.events.lock().is_empty());
}

#[tokio::test]
async fn test_configuration_change_before_first_load_does_nothing() {
    let h = Harness::new(initialized_configuration(&[LOCAL_NODE])).await;

    h.orchestrator
        .apply_notification(NotificationMessage::new(Opcode::ConfigurationChanged, 7, "adfs02"))
        .await;
    assert!(h.orchestrator.cached_configuration().await.is_none());
    assert_eq!(h.store.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_remote_save_keeps_unsaved_local_edits() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::with(initialized_configuration(&[LOCAL_NODE]));
    let a = instance(dir.path(), Arc::clone(&store), 0xA).await;
    let b = instance(dir.path(), Arc::clone(&store), 0xB).await;
    let listener_b = b.listen().await.unwrap();

    a.ensure_configuration().await.unwrap();
    b.update_configuration(|c| c.certificate_thumbprint = Some("LOCAL-EDIT".to_string()))
        .await
        .unwrap();
    assert_eq!(b.config_status(), ConfigStatus::Dirty);

    a.update_and_write(|c| c.certificate_thumbprint = Some("REMOTE-EDIT".to_string()))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while listener_b.stats().messages_received == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("change notification arrives");
    // Let the handler finish with the message
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(b.config_status(), ConfigStatus::Dirty);
    let cached = b.cached_configuration().await.unwrap();
    assert!(cached.is_dirty);
    assert_eq!(cached.certificate_thumbprint.as_deref(), Some("LOCAL-EDIT"));

    b.write_configuration().await.unwrap();
    assert_eq!(b.config_status(), ConfigStatus::Saved);
    assert_eq!(store.stored().certificate_thumbprint.as_deref(), Some("LOCAL-EDIT"));
    listener_b.shutdown().await;
}

#[tokio::test]
async fn test_configuration_change_reloads_only_a_clean_cache() {
    let h = Harness::new(initialized_configuration(&[LOCAL_NODE])).await;
    let changed = || NotificationMessage::new(Opcode::ConfigurationChanged, 7, "adfs02");

    h.orchestrator
        .update_configuration(|c| c.certificate_thumbprint = Some("LOCAL".to_string()))
        .await
        .unwrap();
    h.store.configuration.lock().certificate_thumbprint = Some("REMOTE".to_string());

    h.orchestrator.apply_notification(changed()).await;
    assert_eq!(h.orchestrator.config_status(), ConfigStatus::Dirty);
    assert_eq!(h.store.reads.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.orchestrator.cached_configuration().await.unwrap().certificate_thumbprint.as_deref(),
        Some("LOCAL")
    );

    h.orchestrator.write_configuration().await.unwrap();
    h.store.configuration.lock().certificate_thumbprint = Some("REMOTE".to_string());

    h.orchestrator.apply_notification(changed()).await;
    assert_eq!(h.orchestrator.config_status(), ConfigStatus::Loaded);
    assert_eq!(h.store.reads.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.orchestrator.cached_configuration().await.unwrap().certificate_thumbprint.as_deref(),
        Some("REMOTE")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observers_see_transitions_in_board_order() {
    const NODE: &str = "adfs02.corp.local";
    let h = Harness::new(initialized_configuration(&[LOCAL_NODE, NODE])).await;

    let local = Arc::clone(&h.orchestrator);
    let remote = Arc::clone(&h.orchestrator);
    let (driven, replayed) = tokio::join!(
        tokio::spawn(async move {
            for _ in 0..50 {
                local.stop(Some(NODE)).await;
                local.start(Some(NODE)).await;
            }
        }),
        tokio::spawn(async move {
            for round in 0..200u32 {
                let opcode = if round % 2 == 0 { Opcode::Error } else { Opcode::StartPending };
                remote
                    .apply_notification(NotificationMessage::new(opcode, 7, NODE))
                    .await;
                tokio::task::yield_now().await;
            }
        }),
    );
    driven.unwrap();
    replayed.unwrap();

    let last_observed = h
        .events
        .lock()
        .iter()
        .rev()
        .find_map(|event| match event {
            StatusEvent::Service { status, node, .. } if node == NODE => Some(*status),
            _ => None,
        })
        .unwrap();
    assert_eq!(h.orchestrator.status().node_status(NODE), last_observed);
}
