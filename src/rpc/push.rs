//! Resilient push client.
//!
//! One logical long-lived WebSocket connection to the currently selected push
//! endpoint. Monitors register `(filter, handler)` subscriptions; after any
//! reconnect every registered subscription is replayed against the fresh
//! transport. Only live events are delivered — missed ranges are the ledger
//! scanner's job, not this client's.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use alloy::rpc::types::Log as RpcLog;

/// Callback invoked for every log delivered on a subscription.
pub type LogHandler = Arc<dyn Fn(RpcLog) + Send + Sync>;

/// Initial reconnect delay; doubles up to [`MAX_RECONNECT_DELAY`].
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
/// Budget for establishing the transport.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An immutable subscription record: subject plus a stable handler identity.
#[derive(Clone)]
pub struct LogSubscription {
    pub label: String,
    /// The filter object passed as the second `eth_subscribe` parameter.
    pub params: serde_json::Value,
    pub handler: LogHandler,
}

/// Handle to the background connection task.
pub struct PushClient {
    cmd_tx: mpsc::UnboundedSender<LogSubscription>,
    cancel: CancellationToken,
}

impl PushClient {
    /// Spawn the connection task against the given endpoint list.
    ///
    /// `connected` is flipped on every connect/disconnect so the pool's
    /// health snapshot can report push state.
    pub fn connect(endpoints: Vec<String>, connected: Arc<AtomicBool>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run_loop(endpoints, connected, cmd_rx, cancel.clone()));
        Self { cmd_tx, cancel }
    }

    /// Register a log subscription. It attaches to the current transport
    /// immediately and re-attaches automatically after every reconnect.
    pub fn subscribe_logs(
        &self,
        label: impl Into<String>,
        params: serde_json::Value,
        handler: LogHandler,
    ) {
        let sub = LogSubscription {
            label: label.into(),
            params,
            handler,
        };
        if self.cmd_tx.send(sub).is_err() {
            tracing::warn!("Push client task is gone; subscription dropped");
        }
    }

    /// Disable reconnect, detach all handlers and close the transport.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum ConnectionEnd {
    Cancelled,
    Disconnected,
}

async fn run_loop(
    endpoints: Vec<String>,
    connected: Arc<AtomicBool>,
    mut cmd_rx: mpsc::UnboundedReceiver<LogSubscription>,
    cancel: CancellationToken,
) {
    let mut subs: Vec<LogSubscription> = Vec::new();
    let mut delay = INITIAL_RECONNECT_DELAY;
    let mut endpoint_idx = 0usize;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let url = endpoints[endpoint_idx % endpoints.len()].clone();
        match timeout(CONNECT_TIMEOUT, connect_async(&url)).await {
            Ok(Ok((ws, _))) => {
                tracing::info!(endpoint = %url, subscriptions = subs.len(), "Push transport connected");
                connected.store(true, Ordering::SeqCst);
                delay = INITIAL_RECONNECT_DELAY;
                let end = serve_connection(ws, &mut subs, &mut cmd_rx, &cancel).await;
                connected.store(false, Ordering::SeqCst);
                if matches!(end, ConnectionEnd::Cancelled) {
                    break;
                }
                tracing::warn!(endpoint = %url, "Push transport closed; scheduling reconnect");
            }
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %url, error = %e, "Push connect failed");
                endpoint_idx += 1;
            }
            Err(_) => {
                tracing::warn!(endpoint = %url, "Push connect timed out");
                endpoint_idx += 1;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }

    connected.store(false, Ordering::SeqCst);
    tracing::debug!("Push client task exited");
}

async fn serve_connection(
    ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    subs: &mut Vec<LogSubscription>,
    cmd_rx: &mut mpsc::UnboundedReceiver<LogSubscription>,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let (mut sink, mut stream) = ws.split();
    let mut next_id: u64 = 1;
    // request id -> subscription index, until the server acks with a sub id
    let mut pending: HashMap<u64, usize> = HashMap::new();
    // server subscription id -> subscription index
    let mut active: HashMap<String, usize> = HashMap::new();

    // Replay every registered subscription on the fresh transport.
    for idx in 0..subs.len() {
        if send_subscribe(&mut sink, next_id, &subs[idx]).await.is_err() {
            return ConnectionEnd::Disconnected;
        }
        pending.insert(next_id, idx);
        next_id += 1;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return ConnectionEnd::Cancelled;
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(sub) => {
                        subs.push(sub);
                        let idx = subs.len() - 1;
                        if send_subscribe(&mut sink, next_id, &subs[idx]).await.is_err() {
                            return ConnectionEnd::Disconnected;
                        }
                        pending.insert(next_id, idx);
                        next_id += 1;
                    }
                    None => return ConnectionEnd::Cancelled,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_message(&text, &mut pending, &mut active, subs);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return ConnectionEnd::Disconnected;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_subscribe<S>(sink: &mut S, id: u64, sub: &LogSubscription) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "eth_subscribe",
        "params": ["logs", sub.params],
    });
    sink.send(Message::Text(request.to_string().into()))
        .await
        .map_err(|_| ())
}

/// Route one inbound frame: subscription acks map request ids to server
/// subscription ids; notifications go to the matching handler.
fn dispatch_message(
    text: &str,
    pending: &mut HashMap<u64, usize>,
    active: &mut HashMap<String, usize>,
    subs: &[LogSubscription],
) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
        if let Some(idx) = pending.remove(&id) {
            match value.get("result").and_then(|v| v.as_str()) {
                Some(sub_id) => {
                    tracing::debug!(
                        subscription = %subs[idx].label,
                        sub_id,
                        "Subscription established"
                    );
                    active.insert(sub_id.to_string(), idx);
                }
                None => {
                    tracing::warn!(
                        subscription = %subs[idx].label,
                        response = %value,
                        "Subscription request rejected"
                    );
                }
            }
        }
        return;
    }

    if value.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
        return;
    }
    let Some(params) = value.get("params") else {
        return;
    };
    let Some(sub_id) = params.get("subscription").and_then(|s| s.as_str()) else {
        return;
    };
    let Some(&idx) = active.get(sub_id) else {
        return;
    };
    let Some(result) = params.get("result") else {
        return;
    };
    match serde_json::from_value::<RpcLog>(result.clone()) {
        Ok(log) => (subs[idx].handler)(log),
        Err(e) => {
            tracing::debug!(
                subscription = %subs[idx].label,
                error = %e,
                "Dropped undecodable log notification"
            );
        }
    }
}
