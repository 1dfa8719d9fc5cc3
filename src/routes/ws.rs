//! WebSocket push channel.
//!
//! Every socket receives the global `mesas-actualizadas` feed. A client may
//! additionally join per-table topics by sending `{"join": "<table>"}`; joined
//! topics deliver targeted `pedido-eliminado` events for that table only.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::topics::TableEvent;

use super::AppState;

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Fans a broadcast receiver into the socket's single outbound queue.
async fn forward(mut rx: broadcast::Receiver<TableEvent>, tx: mpsc::Sender<TableEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "cliente websocket atrasado, eventos descartados");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<TableEvent>(32);

    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();
    forwarders.push(tokio::spawn(forward(state.topics.subscribe_all(), tx.clone())));

    let mut joined: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "evento websocket no serializable");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(table) = parse_join(&text) {
                            if joined.insert(table.clone()) {
                                debug!(table = %table, "cliente unido a mesa");
                                forwarders.push(tokio::spawn(forward(
                                    state.topics.subscribe_table(&table),
                                    tx.clone(),
                                )));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    for handle in forwarders {
        handle.abort();
    }
}

fn parse_join(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value
        .get("join")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::parse_join;

    #[test]
    fn parse_join_extracts_table_name() {
        assert_eq!(parse_join(r#"{"join": "Mesa 4"}"#).as_deref(), Some("Mesa 4"));
    }

    #[test]
    fn parse_join_rejects_noise() {
        assert!(parse_join("not json").is_none());
        assert!(parse_join(r#"{"join": ""}"#).is_none());
        assert!(parse_join(r#"{"ping": true}"#).is_none());
    }
}
