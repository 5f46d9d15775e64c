pub mod publisher;

pub use publisher::{StatusEventPublisher, StatusObserver, SubscriptionId};
