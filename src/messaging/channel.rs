//! # Notification Channel
//!
//! Best-effort, host-local broadcast between engine instances. Each listener
//! binds a loopback UDP socket and registers its port as a file named
//! `<channel>.<pid>.<origin>.port` in the channel directory. A sender
//! enumerates the registrations and sends one datagram to each.
//!
//! A spawned listener refreshes its registration's modification time on a
//! heartbeat. Registrations that stop being refreshed belong to processes
//! that died without cleaning up; senders and new listeners delete them, so
//! a port later reused by an unrelated process stops being addressed.
//!
//! Delivery is never guaranteed: send failures are swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::NotificationMessage;
use crate::config::ChannelSettings;
use crate::constants::channel;
use crate::error::{FarmError, Result};

/// Receives decoded messages from other engine instances
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle_message(&self, message: NotificationMessage) -> Result<()>;

    async fn handle_decode_error(&self, peer: SocketAddr, error: FarmError) {
        warn!(peer = %peer, error = %error, "Discarding malformed notification frame");
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListenerStats {
    pub messages_received: u64,
    pub own_messages_ignored: u64,
    pub decode_errors: u64,
    pub handler_errors: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NotificationChannel {
    name: String,
    directory: PathBuf,
    max_payload_bytes: usize,
}

impl NotificationChannel {
    pub fn new(settings: &ChannelSettings) -> Self {
        Self {
            name: settings.name.clone(),
            directory: settings.directory.clone(),
            max_payload_bytes: settings.max_payload_bytes.min(channel::MAX_PAYLOAD_BYTES),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn registration_path(&self, origin: u32) -> PathBuf {
        self.directory.join(format!(
            "{}.{}.{origin:08x}{}",
            self.name,
            std::process::id(),
            channel::REGISTRATION_SUFFIX
        ))
    }

    /// Ports of every live listener on this channel; stale registrations are removed
    async fn registered_ports(&self) -> Vec<u16> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let prefix = format!("{}.", self.name);
        let mut ports = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.starts_with(&prefix) || !file_name.ends_with(channel::REGISTRATION_SUFFIX)
            {
                continue;
            }
            if is_stale(&entry).await {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => info!(file = %file_name, "Removed stale listener registration"),
                    Err(e) => debug!(file = %file_name, error = %e, "Stale registration already gone"),
                }
                continue;
            }
            match tokio::fs::read_to_string(entry.path()).await {
                Ok(contents) => match contents.trim().parse::<u16>() {
                    Ok(port) => ports.push(port),
                    Err(_) => debug!(file = %file_name, "Ignoring unreadable registration"),
                },
                Err(_) => continue,
            }
        }
        ports
    }

    /// Broadcast a message to every registered listener
    ///
    /// Never fails; returns how many datagrams were handed to the OS.
    pub async fn send(&self, message: &NotificationMessage) -> usize {
        let ports = self.registered_ports().await;
        if ports.is_empty() {
            debug!(channel = %self.name, opcode = %message.opcode, "No listeners registered");
            return 0;
        }

        let socket = match UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(channel = %self.name, error = %e, "Notification send socket unavailable");
                return 0;
            }
        };

        let frame = message.encode(self.max_payload_bytes);
        let mut delivered = 0;
        for port in ports {
            match socket.send_to(&frame, (Ipv4Addr::LOCALHOST, port)).await {
                Ok(_) => delivered += 1,
                Err(e) => debug!(port, error = %e, "Notification datagram dropped"),
            }
        }

        debug!(
            channel = %self.name,
            opcode = %message.opcode,
            payload = %message.payload,
            delivered,
            "Notification broadcast"
        );
        delivered
    }

    /// Bind a listener for the given sender identity and register it
    pub async fn bind(&self, origin: u32) -> Result<NotificationListener> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let live = self.registered_ports().await.len();

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let port = socket.local_addr()?.port();

        let registration = self.registration_path(origin);
        write_registration(&registration, port).await?;

        info!(
            channel = %self.name,
            port,
            peers = live,
            registration = %registration.display(),
            "Notification listener registered"
        );

        Ok(NotificationListener {
            socket,
            port,
            registration,
            origin,
            stats: Arc::new(Mutex::new(ListenerStats::default())),
        })
    }
}

/// A bound, registered receiving endpoint
///
/// Dropping the listener removes its registration.
#[derive(Debug)]
pub struct NotificationListener {
    socket: UdpSocket,
    port: u16,
    registration: PathBuf,
    origin: u32,
    stats: Arc<Mutex<ListenerStats>>,
}

impl NotificationListener {
    pub fn origin(&self) -> u32 {
        self.origin
    }

    pub fn registration(&self) -> &Path {
        &self.registration
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats.lock().clone()
    }

    /// Next message from another instance; own broadcasts are skipped
    pub async fn recv(&self) -> Result<NotificationMessage> {
        let mut buf = [0u8; channel::HEADER_LEN + channel::MAX_PAYLOAD_BYTES];
        loop {
            let (len, _peer) = self.socket.recv_from(&mut buf).await?;
            let message = NotificationMessage::decode(&buf[..len])?;
            if message.origin == self.origin {
                self.stats.lock().own_messages_ignored += 1;
                continue;
            }
            self.record_received();
            return Ok(message);
        }
    }

    fn record_received(&self) {
        let mut stats = self.stats.lock();
        stats.messages_received += 1;
        stats.last_message_at = Some(Utc::now());
    }

    /// Run the receive loop in a background task until the handle shuts it down
    pub fn spawn<H>(self, handler: Arc<H>) -> ListenerHandle
    where
        H: NotificationHandler + ?Sized + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);

        let join = tokio::spawn(async move {
            let mut buf = [0u8; channel::HEADER_LEN + channel::MAX_PAYLOAD_BYTES];
            let mut heartbeat = tokio::time::interval_at(
                tokio::time::Instant::now() + channel::REGISTRATION_HEARTBEAT,
                channel::REGISTRATION_HEARTBEAT,
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = heartbeat.tick() => {
                        if let Err(e) = write_registration(&self.registration, self.port).await {
                            warn!(registration = %self.registration.display(), error = %e, "Registration refresh failed");
                        }
                    }
                    received = self.socket.recv_from(&mut buf) => {
                        let (len, peer) = match received {
                            Ok(received) => received,
                            Err(e) => {
                                // Windows reports ICMP port-unreachable on the receiving socket
                                warn!(error = %e, "Notification receive error");
                                continue;
                            }
                        };

                        let message = match NotificationMessage::decode(&buf[..len]) {
                            Ok(message) => message,
                            Err(e) => {
                                self.stats.lock().decode_errors += 1;
                                handler.handle_decode_error(peer, e).await;
                                continue;
                            }
                        };

                        if message.origin == self.origin {
                            self.stats.lock().own_messages_ignored += 1;
                            continue;
                        }

                        self.record_received();
                        debug!(opcode = %message.opcode, payload = %message.payload, "Notification received");
                        if let Err(e) = handler.handle_message(message).await {
                            self.stats.lock().handler_errors += 1;
                            error!(error = %e, "Notification handler failed");
                        }
                    }
                }
            }
            info!(registration = %self.registration.display(), "Notification listener stopped");
        });

        ListenerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

/// Write the port atomically so senders never read a partial file
async fn write_registration(registration: &Path, port: u16) -> Result<()> {
    let staging = registration.with_extension("tmp");
    tokio::fs::write(&staging, port.to_string()).await?;
    tokio::fs::rename(&staging, registration).await?;
    Ok(())
}

async fn is_stale(entry: &tokio::fs::DirEntry) -> bool {
    let modified = match entry.metadata().await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > channel::REGISTRATION_STALE_AFTER)
        .unwrap_or(false)
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.registration);
    }
}

/// Handle to a spawned listener task
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<ListenerStats>>,
}

impl ListenerHandle {
    pub fn stats(&self) -> ListenerStats {
        self.stats.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the receive loop and wait for the registration to be removed
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Notification listener task panicked");
        }
    }
}
