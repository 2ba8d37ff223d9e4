//! Registry of live realtime connections.
//!
//! Each connection id moves `Unregistered -> Active -> Closed`. At most one Active
//! connection exists per identity: registering a second one for the same identity
//! force-closes the first (last writer wins). Every insertion and removal publishes
//! a `client-update` snapshot to all remaining connections from inside the same
//! critical section as the mutation, so no connection ever observes a snapshot that
//! predates its own registration.
//!
//! The lock is a synchronous `parking_lot::Mutex` and is never held across an
//! `.await`; identity resolution happens before [`SessionRegistry::register`] is called.
//! Publishing pushes onto unbounded per-connection channels and never blocks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::principal::Identity;

pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";
pub const EVENT_CLIENT_UPDATE: &str = "client-update";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

impl OutboundEvent {
    pub fn new(event: &str, payload: serde_json::Value) -> Self {
        Self { event: event.to_string(), payload }
    }
}

/// Signals delivered to a connection's transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(OutboundEvent),
    /// Forced disconnect; the transport closes the socket without further frames.
    Close,
}

pub type OutboundTx = mpsc::UnboundedSender<Outbound>;
pub type OutboundRx = mpsc::UnboundedReceiver<Outbound>;

#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: String,
    pub identity: Identity,
    pub established_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry inconsistent: {0}")]
    Inconsistent(String),
}

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub connection: Connection,
    /// Connection id that was force-closed to make room, if any.
    pub evicted: Option<String>,
    pub snapshot: Vec<String>,
}

struct Entry {
    connection: Connection,
    seq: u64,
    tx: OutboundTx,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<String, Entry>,
    by_identity: HashMap<String, String>,
    next_seq: u64,
}

impl Inner {
    fn snapshot(&self) -> Vec<String> {
        let mut live: Vec<(&u64, &String)> = self.connections.iter().map(|(id, e)| (&e.seq, id)).collect();
        live.sort_unstable();
        live.into_iter().map(|(_, id)| id.clone()).collect()
    }

    fn publish_snapshot(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let event = OutboundEvent::new(EVENT_CLIENT_UPDATE, serde_json::json!(snapshot));
        for entry in self.connections.values() {
            // A closed receiver means the transport is already going away; its
            // disconnect callback will remove the entry.
            let _ = entry.tx.send(Outbound::Event(event.clone()));
        }
        snapshot
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self { Self::default() }

    /// Admit an already-resolved identity as a live connection.
    ///
    /// Any prior connection bound to the same identity is removed and sent
    /// [`Outbound::Close`] before the new one is inserted. On error nothing is applied.
    pub fn register(&self, connection_id: &str, identity: Identity, tx: OutboundTx) -> Result<Registration, RegistryError> {
        let mut g = self.inner.lock();

        if g.connections.contains_key(connection_id) {
            error!(target: "session", "refusing registration: connection id {} already active", connection_id);
            return Err(RegistryError::Inconsistent(format!("connection id {connection_id} already registered")));
        }
        let prior = g.by_identity.get(&identity.id).cloned();
        if let Some(prior_id) = &prior {
            match g.connections.get(prior_id) {
                Some(entry) if entry.connection.identity.id == identity.id => {}
                _ => {
                    error!(target: "session", "refusing registration: identity index for {} points at {} which is not live", identity.id, prior_id);
                    return Err(RegistryError::Inconsistent(format!("dangling identity index for {}", identity.id)));
                }
            }
        }

        // Evict before insert
        let evicted = match prior {
            Some(prior_id) => {
                g.by_identity.remove(&identity.id);
                if let Some(old) = g.connections.remove(&prior_id) {
                    let _ = old.tx.send(Outbound::Close);
                    info!(target: "session", "evicted connection {} for user {}", prior_id, identity.id);
                }
                Some(prior_id)
            }
            None => None,
        };

        let seq = g.next_seq;
        g.next_seq += 1;
        let connection = Connection {
            connection_id: connection_id.to_string(),
            identity,
            established_at: Utc::now(),
        };
        g.by_identity.insert(connection.identity.id.clone(), connection.connection_id.clone());
        g.connections.insert(connection.connection_id.clone(), Entry { connection: connection.clone(), seq, tx });

        let snapshot = g.publish_snapshot();
        info!(target: "session", "client registered: {} user={} live={}", connection.connection_id, connection.identity.id, snapshot.len());
        Ok(Registration { connection, evicted, snapshot })
    }

    /// Close a connection. Returns the post-removal snapshot, or `None` when the id
    /// was not registered (already closed or evicted); that case publishes nothing.
    pub fn remove(&self, connection_id: &str) -> Option<Vec<String>> {
        let mut g = self.inner.lock();
        let entry = g.connections.remove(connection_id)?;
        let identity_id = &entry.connection.identity.id;
        if g.by_identity.get(identity_id).map(String::as_str) == Some(connection_id) {
            g.by_identity.remove(identity_id);
        }
        let snapshot = g.publish_snapshot();
        info!(target: "session", "client removed: {} user={} live={}", connection_id, identity_id, snapshot.len());
        Some(snapshot)
    }

    /// Live connection ids in admission order.
    pub fn snapshot(&self) -> Vec<String> { self.inner.lock().snapshot() }

    /// Best-effort label for chat relays; never fails.
    pub fn display_name_for(&self, connection_id: &str) -> String {
        self.inner
            .lock()
            .connections
            .get(connection_id)
            .map(|e| e.connection.identity.display_name().to_string())
            .unwrap_or_else(|| UNKNOWN_DISPLAY_NAME.to_string())
    }

    pub fn connection_for_identity(&self, identity_id: &str) -> Option<String> {
        self.inner.lock().by_identity.get(identity_id).cloned()
    }

    pub fn len(&self) -> usize { self.inner.lock().connections.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Deliver to every live connection. Returns the number of connections queued.
    pub fn broadcast(&self, event: OutboundEvent) -> usize {
        let g = self.inner.lock();
        g.connections
            .values()
            .filter(|e| e.tx.send(Outbound::Event(event.clone())).is_ok())
            .count()
    }

    /// Deliver to every live connection except `sender`.
    pub fn broadcast_except(&self, sender: &str, event: OutboundEvent) -> usize {
        let g = self.inner.lock();
        g.connections
            .iter()
            .filter(|(id, _)| id.as_str() != sender)
            .filter(|(_, e)| e.tx.send(Outbound::Event(event.clone())).is_ok())
            .count()
    }
}
