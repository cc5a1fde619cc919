//! Client Channel Registry
//!
//! Tracks which client connections are live. Each registered connection gets
//! its own keepalive task; a missed ack removes the connection immediately.
//! Delivery is best-effort: it never fails the caller and makes no attempt at
//! all when nobody is listening.

use crate::error::ApiError;
use crate::protocol::PushMessage;
use crate::types::ConnectionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod stdio;

pub use stdio::StdoutConnection;

/// A client that can receive pushed messages and answer keepalive probes.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    /// Human-readable name for logs
    fn label(&self) -> &str;

    /// Push one message to the client
    async fn send(&self, message: &PushMessage) -> Result<(), ApiError>;

    /// Send a keepalive probe and wait for the ack
    async fn keepalive(&self) -> Result<(), ApiError>;
}

/// Channel timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_keepalive_ack_timeout_ms")]
    pub keepalive_ack_timeout_ms: u64,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

fn default_keepalive_interval_ms() -> u64 {
    30_000
}

fn default_keepalive_ack_timeout_ms() -> u64 {
    5_000
}

fn default_delivery_timeout_ms() -> u64 {
    5_000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: default_keepalive_interval_ms(),
            keepalive_ack_timeout_ms: default_keepalive_ack_timeout_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.keepalive_interval_ms == 0 {
            return Err("keepalive_interval_ms must be greater than zero".to_string());
        }
        if self.keepalive_ack_timeout_ms == 0 {
            return Err("keepalive_ack_timeout_ms must be greater than zero".to_string());
        }
        if self.delivery_timeout_ms == 0 {
            return Err("delivery_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn keepalive_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_ack_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Keepalive state of a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepaliveState {
    Connected,
    AwaitingAck,
}

/// Point-in-time view of a registered connection
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub label: String,
    pub state: KeepaliveState,
    pub last_keepalive: DateTime<Utc>,
}

struct ConnectionEntry {
    connection: Arc<dyn ClientConnection>,
    state: KeepaliveState,
    last_keepalive: DateTime<Utc>,
    keepalive_task: Option<JoinHandle<()>>,
}

struct RegistryInner {
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    config: ChannelConfig,
}

/// Registry of live client connections. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

impl ChannelRegistry {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Add a connection and start its keepalive cycle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, connection: Arc<dyn ClientConnection>) -> ConnectionId {
        let id = ConnectionId::next();
        let label = connection.label().to_string();
        {
            let mut connections = self.inner.connections.lock();
            connections.insert(
                id,
                ConnectionEntry {
                    connection,
                    state: KeepaliveState::Connected,
                    last_keepalive: Utc::now(),
                    keepalive_task: None,
                },
            );
        }

        let task = tokio::spawn(keepalive_loop(Arc::downgrade(&self.inner), id));
        {
            let mut connections = self.inner.connections.lock();
            match connections.get_mut(&id) {
                Some(entry) => entry.keepalive_task = Some(task),
                None => task.abort(),
            }
        }

        info!(connection_id = %id, label = %label, "Client connection registered");
        id
    }

    /// Remove a connection and stop its keepalive cycle. Idempotent.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.inner.connections.lock().remove(&id);
        match removed {
            Some(entry) => {
                if let Some(task) = entry.keepalive_task {
                    task.abort();
                }
                info!(connection_id = %id, "Client connection unregistered");
                true
            }
            None => false,
        }
    }

    pub fn is_anyone_listening(&self) -> bool {
        !self.inner.connections.lock().is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn snapshot(&self, id: ConnectionId) -> Option<ConnectionSnapshot> {
        let connections = self.inner.connections.lock();
        connections.get(&id).map(|entry| ConnectionSnapshot {
            id,
            label: entry.connection.label().to_string(),
            state: entry.state,
            last_keepalive: entry.last_keepalive,
        })
    }

    /// Push a message to every registered connection.
    ///
    /// Returns whether at least one delivery succeeded. Each attempt is capped by
    /// the delivery timeout; failures are logged and swallowed.
    pub async fn deliver(&self, message: &PushMessage) -> bool {
        let targets: Vec<(ConnectionId, Arc<dyn ClientConnection>)> = {
            let connections = self.inner.connections.lock();
            connections
                .iter()
                .map(|(id, entry)| (*id, entry.connection.clone()))
                .collect()
        };
        if targets.is_empty() {
            return false;
        }

        let timeout = self.inner.config.delivery_timeout();
        let attempts = targets.iter().map(|(id, connection)| async move {
            match tokio::time::timeout(timeout, connection.send(message)).await {
                Ok(Ok(())) => true,
                Ok(Err(err)) => {
                    let err = ApiError::DeliveryFailure(err.to_string());
                    debug!(connection_id = %id, error = %err, "Delivery failed");
                    false
                }
                Err(_) => {
                    debug!(
                        connection_id = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Delivery timed out"
                    );
                    false
                }
            }
        });
        let results = futures::future::join_all(attempts).await;
        results.into_iter().any(|delivered| delivered)
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for entry in self.connections.get_mut().values_mut() {
            if let Some(task) = entry.keepalive_task.take() {
                task.abort();
            }
        }
    }
}

/// Connected -> AwaitingAck -> Connected | removed.
async fn keepalive_loop(registry: std::sync::Weak<RegistryInner>, id: ConnectionId) {
    let (interval, ack_timeout) = match registry.upgrade() {
        Some(inner) => (
            inner.config.keepalive_interval(),
            inner.config.keepalive_ack_timeout(),
        ),
        None => return,
    };

    loop {
        tokio::time::sleep(interval).await;

        let connection = {
            let Some(inner) = registry.upgrade() else {
                return;
            };
            let mut connections = inner.connections.lock();
            let Some(entry) = connections.get_mut(&id) else {
                return;
            };
            entry.state = KeepaliveState::AwaitingAck;
            entry.connection.clone()
        };

        let acked = matches!(
            tokio::time::timeout(ack_timeout, connection.keepalive()).await,
            Ok(Ok(()))
        );

        let still_connected = {
            let Some(inner) = registry.upgrade() else {
                return;
            };
            let mut connections = inner.connections.lock();
            if acked {
                // The entry may have been unregistered while we waited.
                match connections.get_mut(&id) {
                    Some(entry) => {
                        entry.state = KeepaliveState::Connected;
                        entry.last_keepalive = Utc::now();
                        true
                    }
                    None => false,
                }
            } else {
                // Dropping our own JoinHandle detaches this task; it ends on return.
                if connections.remove(&id).is_some() {
                    warn!(connection_id = %id, "Keepalive ack missed; connection dropped");
                }
                false
            }
        };
        if !still_connected {
            return;
        }
    }
}
