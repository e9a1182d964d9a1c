//! WebSocket handler for live listeners.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::time::timeout;

use super::AppState;
use crate::live::LiveHub;
use crate::protocol_constants::LIVE_WRITE_DEADLINE_SECS;

/// Upgrade handler for `/live`.
pub async fn live_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_live(socket, app.hub))
}

/// Per-client writer task. Owns the socket: the hub only ever touches the
/// queue. Ends on socket error, client close, hub queue closure, or a
/// write exceeding the deadline; every exit path unregisters.
async fn handle_live(socket: WebSocket, hub: Arc<LiveHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut queue) = hub.register();
    let deadline = Duration::from_secs(LIVE_WRITE_DEADLINE_SECS);

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(frame) = frame else { break };
                match timeout(deadline, sender.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        log::debug!("[Live] Client {} write failed: {}", id, e);
                        break;
                    }
                    Err(_) => {
                        log::warn!("[Live] Client {} missed the write deadline", id);
                        break;
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    // Listeners send nothing meaningful; drain and ignore.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    hub.unregister(id);
}
