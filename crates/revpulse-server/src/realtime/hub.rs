//! Connection registry and topic fan-out.
//!
//! The hub maps connection ids to outbound senders and topic sets. Pipeline
//! events arrive on a broadcast receiver and are pushed to every connection
//! subscribed to the event's entity topic. Sends go through per-connection
//! unbounded channels, so one slow socket never blocks publishing or other
//! connections, and each connection sees its events in publish order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use revpulse_etl::{ReviewEvent, ReviewEventKind};

use super::protocol::{ErrorData, ServerMessage};

struct Client {
    sender: mpsc::UnboundedSender<ServerMessage>,
    topics: HashSet<String>,
}

/// Shared state for all live WebSocket connections.
#[derive(Default)]
pub struct Hub {
    clients: RwLock<HashMap<Uuid, Client>>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Hub::default()
    }

    /// Registers a connection and returns its id plus the receiving end of
    /// its outbound message channel.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.clients.write().await.insert(
            id,
            Client {
                sender: tx,
                topics: HashSet::new(),
            },
        );
        (id, rx)
    }

    /// Drops a connection and all its subscriptions.
    pub async fn remove(&self, id: Uuid) {
        self.clients.write().await.remove(&id);
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Adds a topic subscription and acknowledges it on the connection's
    /// own channel.
    pub async fn subscribe(&self, id: Uuid, place_id: &str) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(&id) {
            client.topics.insert(place_id.to_owned());
            let _ = client.sender.send(ServerMessage::Subscribed {
                place_id: place_id.to_owned(),
            });
        }
    }

    pub async fn unsubscribe(&self, id: Uuid, place_id: &str) {
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(&id) {
            client.topics.remove(place_id);
            let _ = client.sender.send(ServerMessage::Unsubscribed {
                place_id: place_id.to_owned(),
            });
        }
    }

    /// Pushes one pipeline event to every connection subscribed to its
    /// topic. Connections whose receive side is gone are skipped; the socket
    /// task removes them on exit.
    pub async fn publish(&self, event: &ReviewEvent) {
        let frame = match &event.kind {
            ReviewEventKind::New(enriched) => ServerMessage::ReviewNew {
                place_id: event.entity_id.clone(),
                data: serde_json::to_value(enriched).unwrap_or_default(),
            },
            ReviewEventKind::Error { message } => ServerMessage::ReviewError {
                place_id: event.entity_id.clone(),
                data: ErrorData {
                    message: message.clone(),
                },
            },
        };

        let clients = self.clients.read().await;
        for client in clients.values() {
            if client.topics.contains(&event.entity_id) {
                let _ = client.sender.send(frame.clone());
            }
        }
    }

    /// Bridges the orchestrator's event stream into the hub until the
    /// sender side closes. Lagged receivers log and continue; the realtime
    /// channel is best-effort.
    pub fn spawn_publisher(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ReviewEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => hub.publish(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "realtime publisher lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
