use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state_machine::{ConfigStatus, ServiceStatus, StatusEvent};

/// Receives status changes synchronously on the thread that caused them
pub trait StatusObserver: Send + Sync {
    fn on_service_status(&self, _status: ServiceStatus, _node: &str, _error: Option<&str>) {}

    fn on_config_status(&self, _status: ConfigStatus, _error: Option<&str>) {}

    /// Entry point used by the publisher; dispatches to the typed callbacks
    fn on_event(&self, event: &StatusEvent) {
        match event {
            StatusEvent::Service {
                status, node, error, ..
            } => self.on_service_status(*status, node, error.as_deref()),
            StatusEvent::Config { status, error, .. } => {
                self.on_config_status(*status, error.as_deref())
            }
        }
    }
}

/// Adapter that lets a plain closure observe every event
struct FnObserver<F>(F);

impl<F> StatusObserver for FnObserver<F>
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_event(&self, event: &StatusEvent) {
        (self.0)(event)
    }
}

/// Handle returned by [`StatusEventPublisher::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fan-out of status events to synchronous observers and async stream subscribers
pub struct StatusEventPublisher {
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn StatusObserver>)>>,
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusEventPublisher {
    /// Create a new publisher with the specified stream capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            observers: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Register an observer; observers fire in registration order
    pub fn observe(&self, observer: Arc<dyn StatusObserver>) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.observers.write().push((id, observer));
        id
    }

    /// Register a closure receiving every event
    pub fn observe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.observe(Arc::new(FnObserver(f)))
    }

    /// Remove an observer, returns false when the id is unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Async stream of events; lagging receivers lose the oldest events
    pub fn subscribe_stream(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Deliver an event to every observer before returning
    pub fn publish(&self, event: &StatusEvent) {
        // Snapshot so observers may subscribe or unsubscribe re-entrantly
        let observers: Vec<Arc<dyn StatusObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer.on_event(event);
        }

        // No stream subscribers is fine
        let _ = self.sender.send(event.clone());
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for StatusEventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for StatusEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusEventPublisher")
            .field("observers", &self.observer_count())
            .field("stream_subscribers", &self.sender.receiver_count())
            .finish()
    }
}
