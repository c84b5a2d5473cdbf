//! Websocket endpoint

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use pyr_core::ipc::ServerEvent;

use super::client::{ClientSession, OUTBOUND_CAPACITY};
use crate::state::AppState;

/// Upgrade to a websocket carrying JSON [`ServerEvent`]s and requests
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(conn_id = %sender_conn_id, "Failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let _ = tx
        .send(ServerEvent::Connected {
            hostname: state.hostname.clone(),
        })
        .await;

    let shutdown = state.shutdown_token();
    let mut client = ClientSession::new(state, tx);

    loop {
        let result = tokio::select! {
            next = stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };

        match result {
            Ok(Message::Text(text)) => client.handle_text(text.as_str()).await,
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => client.handle_text(text).await,
                Err(_) => client.send(ServerEvent::error("Frames must be UTF-8 JSON")).await,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Subscriptions end with the connection; running scripts keep running
    client.close();
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
