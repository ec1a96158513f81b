//! Live chat connections per assessment.
//!
//! Each connection task registers a channel on connect and must call
//! [`ConnectionRegistry::disconnect`] on every exit path. Background work
//! reaches connected clients through [`ConnectionRegistry::broadcast`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::OutboundFrame;

/// Frames a single slow connection may have queued before new ones are dropped.
const CONNECTION_BUFFER: usize = 32;

/// Identifier of one WebSocket connection.
pub type ConnectionId = Uuid;

type Connections = HashMap<Uuid, HashMap<ConnectionId, mpsc::Sender<OutboundFrame>>>;

/// Registry of open chat connections, keyed by assessment.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<Connections>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its id and frame receiver.
    pub async fn connect(
        &self,
        assessment_id: Uuid,
    ) -> (ConnectionId, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let connection_id = Uuid::new_v4();
        self.connections
            .write()
            .await
            .entry(assessment_id)
            .or_default()
            .insert(connection_id, tx);
        debug!(%assessment_id, %connection_id, "Chat connection registered");
        (connection_id, rx)
    }

    /// Removes a connection. Unknown ids are ignored.
    pub async fn disconnect(&self, assessment_id: Uuid, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(by_id) = connections.get_mut(&assessment_id) {
            by_id.remove(&connection_id);
            if by_id.is_empty() {
                connections.remove(&assessment_id);
            }
        }
        debug!(%assessment_id, %connection_id, "Chat connection removed");
    }

    /// Sends `frame` to every connection of an assessment and returns how
    /// many accepted it.
    pub async fn broadcast(&self, assessment_id: Uuid, frame: &OutboundFrame) -> usize {
        let connections = self.connections.read().await;
        let Some(by_id) = connections.get(&assessment_id) else {
            return 0;
        };
        let mut delivered = 0;
        for (connection_id, tx) in by_id {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(%assessment_id, %connection_id, error = %e, "Dropped frame for chat connection"),
            }
        }
        delivered
    }

    /// Number of open connections for an assessment.
    pub async fn connection_count(&self, assessment_id: Uuid) -> usize {
        self.connections
            .read()
            .await
            .get(&assessment_id)
            .map_or(0, HashMap::len)
    }
}
