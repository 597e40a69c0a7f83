//! WebSocket endpoint for the realtime channel.
//!
//! One task per connection. The task owns the socket, relays outbound hub
//! messages, parses inbound subscribe/unsubscribe frames, and enforces the
//! ping/pong heartbeat: the server pings on an interval and drops the
//! connection when no pong (or other traffic) arrives within the timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;

use super::hub::Hub;
use super::protocol::ClientMessage;
use crate::api::AppState;

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    let heartbeat = state.heartbeat;
    ws.on_upgrade(move |socket| handle_socket(socket, hub, heartbeat))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, heartbeat: HeartbeatConfig) {
    let (conn_id, mut outbound) = hub.register().await;
    tracing::debug!(%conn_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let mut ping_interval = tokio::time::interval(heartbeat.interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(%conn_id, error = %e, "unserializable frame, dropping");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { place_id }) => {
                                hub.subscribe(conn_id, &place_id).await;
                            }
                            Ok(ClientMessage::Unsubscribe { place_id }) => {
                                hub.unsubscribe(conn_id, &place_id).await;
                            }
                            Err(e) => {
                                tracing::debug!(%conn_id, error = %e, "ignoring malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Ping(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(%conn_id, "ignoring binary frame");
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%conn_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_seen.elapsed() > heartbeat.timeout {
                    tracing::debug!(%conn_id, "heartbeat timeout, dropping connection");
                    break;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.remove(conn_id).await;
    tracing::debug!(%conn_id, "websocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use async_trait::async_trait;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite;

    use revpulse_etl::{MemoryStore, ReviewEvent, ReviewEventKind};
    use revpulse_sentiment::{
        EngineConfig, MemoryCache, RawSentiment, SentimentEngine, SentimentError, SentimentModel,
    };

    use crate::api::build_app;

    struct NullModel;

    #[async_trait]
    impl SentimentModel for NullModel {
        async fn analyze(&self, _text: &str) -> Result<RawSentiment, SentimentError> {
            Err(SentimentError::InvalidRequest("no model in tests".to_owned()))
        }
    }

    async fn serve(heartbeat: HeartbeatConfig) -> (Arc<Hub>, SocketAddr) {
        let hub = Arc::new(Hub::new());
        let app = build_app(AppState {
            hub: Arc::clone(&hub),
            heartbeat,
            store: Arc::new(MemoryStore::new()),
            engine: Arc::new(SentimentEngine::new(
                Arc::new(NullModel),
                Arc::new(MemoryCache::new()),
                EngineConfig {
                    batch_size: 10,
                    processing_interval: Duration::from_secs(1),
                    max_attempts: 1,
                    backoff_base_ms: 0,
                    cache_ttl_secs: 60,
                },
            )),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (hub, addr)
    }

    async fn wait_for_connections(hub: &Hub, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while hub.connection_count().await != expected {
            assert!(
                Instant::now() < deadline,
                "hub never reached {expected} connections"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn lazy_heartbeat() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn dropped_socket_is_purged_and_publish_still_succeeds() {
        let (hub, addr) = serve(lazy_heartbeat()).await;

        let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        socket
            .send(tungstenite::Message::Text(
                r#"{"type":"subscribe","placeId":"e1"}"#.into(),
            ))
            .await
            .unwrap();

        // Skip heartbeat pings: the server's first ping can race the ack.
        let ack = loop {
            match socket.next().await.unwrap().unwrap() {
                tungstenite::Message::Text(text) => break text,
                _ => continue,
            }
        };
        let ack: serde_json::Value = serde_json::from_str(ack.as_str()).unwrap();
        assert_eq!(ack["type"], "subscribed");
        assert_eq!(hub.connection_count().await, 1);

        drop(socket);
        wait_for_connections(&hub, 0).await;

        // Publishing to the now-empty topic must be a quiet no-op.
        hub.publish(&ReviewEvent {
            entity_id: "e1".to_owned(),
            kind: ReviewEventKind::Error {
                message: "collector offline".to_owned(),
            },
        })
        .await;
    }

    #[tokio::test]
    async fn silent_connection_is_dropped_after_heartbeat_timeout() {
        let (hub, addr) = serve(HeartbeatConfig {
            interval: Duration::from_millis(25),
            timeout: Duration::from_millis(50),
        })
        .await;

        // Connect but never read: the client library only answers pings
        // while the socket is being polled, so the server sees no pongs.
        let (_socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        wait_for_connections(&hub, 1).await;
        wait_for_connections(&hub, 0).await;
    }
}

