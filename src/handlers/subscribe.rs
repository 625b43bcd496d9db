//! `com.atproto.label.subscribeLabels` (§4.E join protocol, §4.H framing).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::broadcaster::LABELS_STREAM;
use crate::frame;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    pub cursor: Option<String>,
}

pub async fn subscribe_labels(
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.cursor))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, cursor: Option<String>) {
    let cursor = cursor.and_then(|raw| raw.parse::<i64>().ok());

    // Register for the live tail before replaying history: anything
    // appended from this point on is guaranteed to reach `rx`, so the
    // catch-up scan below can never leave a gap between its last row and
    // the first live message (§5 ordering guarantees).
    let mut rx = state.broadcaster.subscribe(LABELS_STREAM);
    let mut last_delivered = 0i64;

    if let Some(cursor) = cursor {
        match state.store.max_id().await {
            Ok(max_id) if cursor > max_id => {
                send_error(&mut socket, "FutureCursor", "cursor exceeds current maximum id").await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                send_error(&mut socket, "InternalServerError", &e.to_string()).await;
                return;
            }
        }

        match state.store.scan(cursor).await {
            Ok(rows) => {
                for row in rows {
                    let id = row.id;
                    let bytes = match frame::encode_labels(id, vec![row.label]) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            send_error(&mut socket, "InternalServerError", &e.to_string()).await;
                            return;
                        }
                    };
                    if socket.send(Message::Binary(bytes)).await.is_err() {
                        return;
                    }
                    last_delivered = id;
                }
            }
            Err(e) => {
                send_error(&mut socket, "InternalServerError", &e.to_string()).await;
                return;
            }
        }
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                // Already covered by the catch-up scan above; the live
                // channel may have buffered it before we started scanning.
                if msg.seq <= last_delivered {
                    continue;
                }
                let bytes = match frame::encode_labels(msg.seq, vec![msg.label]) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        send_error(&mut socket, "InternalServerError", &e.to_string()).await;
                        return;
                    }
                };
                if socket.send(Message::Binary(bytes)).await.is_err() {
                    return;
                }
                last_delivered = msg.seq;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "subscriber fell behind live tail");
                send_error(
                    &mut socket,
                    "ConsumerTooSlow",
                    "subscriber could not keep up with the stream",
                )
                .await;
                return;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn send_error(socket: &mut WebSocket, kind: &str, message: &str) {
    if let Ok(bytes) = frame::encode_error(kind, message) {
        let _ = socket.send(Message::Binary(bytes)).await;
    }
}
