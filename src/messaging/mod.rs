//! # Messaging Module
//!
//! Host-local notification channel used to tell other engine instances about
//! service transitions and configuration changes. Messages are small framed
//! datagrams; see [`message`] for the wire format.

pub mod channel;
pub mod message;

pub use channel::{
    ListenerHandle, ListenerStats, NotificationChannel, NotificationHandler, NotificationListener,
};
pub use message::{NotificationMessage, Opcode};
