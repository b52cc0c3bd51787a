//! Push socket: fans dashboard events out to UI clients.
//!
//! On connect the server sends one `state_change` with the current snapshot,
//! then forwards every broadcast. A client that lags behind the broadcast
//! buffer is resynced with a fresh snapshot instead of stalling the loop.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::api::ApiContext;
use crate::models::{Event, EventKind};

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<Arc<ApiContext>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, ctx: Arc<ApiContext>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = ctx.dashboard.subscribe();
    let dashboard = ctx.dashboard.clone();

    // Greet with the current snapshot.
    let hello = Event::new(EventKind::StateChange, dashboard.state_json());
    if send_event(&mut sender, &hello).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Socket client lagged; resyncing snapshot");
                    let resync = Event::new(EventKind::StateChange, dashboard.state_json());
                    if send_event(&mut sender, &resync).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Drain client frames for ping/pong and close.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => {
                    tracing::debug!("Client requested close");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    tracing::debug!("WebSocket connection closed");
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &Event,
) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket event");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
