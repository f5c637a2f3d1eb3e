use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use futures_util::{stream::Stream, SinkExt, StreamExt};
use meshsentinel_common::config::HubConfig;
use meshsentinel_common::{MeshError, MeshResult};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use crate::types::HubEvent;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 512;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<MeshResult<Value>>>>>;

/// Authenticated bidirectional JSON-RPC-over-WebSocket channel to the
/// home-automation hub (spec §4.3). The handshake
/// (`auth_required`/`auth`/`auth_ok`) runs once in `connect`; after that,
/// every outbound request carries a monotonically increasing `id` and a
/// background task demultiplexes responses back to the right caller and
/// fans unsolicited `event` frames out to subscribers.
pub struct HubClient {
    outbound: mpsc::UnboundedSender<WsMessage>,
    pending: Pending,
    next_id: AtomicU64,
    events: broadcast::Sender<HubEvent>,
    http: reqwest::Client,
    base_url: String,
}

impl HubClient {
    pub async fn connect(config: &HubConfig) -> MeshResult<Self> {
        let scheme = if config.use_ssl { "wss" } else { "ws" };
        let http_scheme = if config.use_ssl { "https" } else { "http" };
        let ws_url = format!("{scheme}://{}:{}/api/websocket", config.host, config.port);
        let base_url = format!("{http_scheme}://{}:{}", config.host, config.port);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let first = read
            .next()
            .await
            .ok_or_else(|| MeshError::Unavailable("hub closed before auth_required".into()))?
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;
        expect_frame_type(&first, "auth_required")?;

        let auth_msg = json!({ "type": "auth", "access_token": config.access_token }).to_string();
        write
            .send(WsMessage::Text(auth_msg))
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;

        let second = read
            .next()
            .await
            .ok_or_else(|| MeshError::Auth("hub closed during auth".into()))?
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;
        let frame_type = frame_type(&second)?;
        if frame_type != "auth_ok" {
            return Err(MeshError::Auth(format!("hub rejected auth: {frame_type}")));
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();

        let pending_bg = pending.clone();
        let events_bg = events_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        match outgoing {
                            Some(msg) => {
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Text(text))) => {
                                handle_incoming(&text, &pending_bg, &events_bg);
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "hub socket read error");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            drain_pending(&pending_bg);
        });

        Ok(Self {
            outbound: out_tx,
            pending,
            next_id: AtomicU64::new(1),
            events: events_tx,
            http: reqwest::Client::new(),
            base_url,
        })
    }

    /// Correlate a request by id and await its response, bounded by a
    /// 30s deadline (spec §4.3). Cancelling the returned future removes
    /// the correlation slot via `PendingSlotGuard`, discarding any late
    /// response.
    pub async fn call(&self, method: &str, args: Value) -> MeshResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        let _guard = PendingSlotGuard {
            id,
            pending: self.pending.clone(),
        };

        let mut payload = match args {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("args".to_string(), other);
                map
            }
        };
        payload.insert("id".to_string(), json!(id));
        payload.insert("type".to_string(), json!(method));

        debug!(method, id, "hub call");
        self.outbound
            .send(WsMessage::Text(Value::Object(payload).to_string()))
            .map_err(|_| MeshError::Unavailable("hub socket closed".into()))?;

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MeshError::Unavailable("hub socket closed".into())),
            Err(_) => Err(MeshError::Timeout(CALL_TIMEOUT)),
        }
    }

    /// Cold lazy sequence of events of the given type. Finite only on
    /// disconnect.
    pub fn subscribe(&self, event_type: impl Into<String>) -> impl Stream<Item = HubEvent> {
        let event_type = event_type.into();
        let mut rx = self.events.subscribe();
        stream! {
            loop {
                match rx.recv().await {
                    Ok(event) if event.event_type == event_type => yield event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    pub async fn list_entities(&self) -> MeshResult<Value> {
        self.call("get_states", Value::Null).await
    }

    pub async fn get_zigbee_devices(&self) -> MeshResult<Value> {
        self.call("zha/devices", Value::Null).await
    }

    pub async fn get_zigbee_network(&self) -> MeshResult<Value> {
        self.call("zha/network/info", Value::Null).await
    }

    pub async fn get_zigbee_topology(&self) -> MeshResult<Value> {
        self.call("zha/network/topology", Value::Null).await
    }

    pub async fn invoke_service(&self, domain: &str, service: &str, args: Value) -> MeshResult<Value> {
        self.call(
            "call_service",
            json!({ "domain": domain, "service": service, "service_data": args }),
        )
        .await
    }

    /// Fetch a single floor-plan/map image by URL — the one map-related
    /// feature this spec keeps (spec §1 Non-goals exclude a tile
    /// rendering pipeline, not a single image fetch).
    pub async fn fetch_map_image(&self, path: &str) -> MeshResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MeshError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MeshError::Unavailable(format!(
                "map image fetch failed: {}",
                resp.status()
            )));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| MeshError::Unavailable(e.to_string()))
    }
}

struct PendingSlotGuard {
    id: u64,
    pending: Pending,
}

impl Drop for PendingSlotGuard {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.id);
    }
}

fn drain_pending(pending: &Pending) {
    let mut guard = pending.lock().unwrap();
    for (_, tx) in guard.drain() {
        let _ = tx.send(Err(MeshError::Unavailable("hub socket disconnected".into())));
    }
}

fn handle_incoming(text: &str, pending: &Pending, events: &broadcast::Sender<HubEvent>) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            let err = MeshError::parse(text);
            warn!(%err, "malformed hub frame");
            return;
        }
    };

    if let Some(event_type) = value.get("type").and_then(|t| t.as_str()) {
        if event_type == "event" {
            let event = HubEvent {
                event_type: value
                    .get("event")
                    .and_then(|e| e.get("event_type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                data: value.get("event").cloned().unwrap_or(Value::Null),
            };
            let _ = events.send(event);
            return;
        }
    }

    if let Some(id) = value.get("id").and_then(|i| i.as_u64()) {
        if let Some(tx) = pending.lock().unwrap().remove(&id) {
            let success = value
                .get("success")
                .and_then(|s| s.as_bool())
                .unwrap_or(true);
            let result = if success {
                Ok(value.get("result").cloned().unwrap_or(Value::Null))
            } else {
                Err(MeshError::Invariant(format!(
                    "hub call {id} failed: {}",
                    value.get("error").cloned().unwrap_or(Value::Null)
                )))
            };
            let _ = tx.send(result);
        }
    }
}

fn frame_type(msg: &WsMessage) -> MeshResult<String> {
    let WsMessage::Text(text) = msg else {
        return Err(MeshError::Unavailable("expected text frame".into()));
    };
    let value: Value =
        serde_json::from_str(text).map_err(|_| MeshError::parse(text.as_str()))?;
    Ok(value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string())
}

fn expect_frame_type(msg: &WsMessage, expected: &str) -> MeshResult<()> {
    let got = frame_type(msg)?;
    if got == expected {
        Ok(())
    } else {
        Err(MeshError::Auth(format!(
            "expected {expected} frame, got {got}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_incoming_routes_response_by_id() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(7, tx);
        let (events, _) = broadcast::channel(8);

        handle_incoming(r#"{"id":7,"success":true,"result":{"ok":true}}"#, &pending, &events);

        let result = rx.try_recv().unwrap();
        assert_eq!(result.unwrap(), json!({"ok": true}));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn handle_incoming_fans_out_events() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, mut rx) = broadcast::channel(8);

        handle_incoming(
            r#"{"type":"event","event":{"event_type":"state_changed","data":{}}}"#,
            &pending,
            &events,
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, "state_changed");
    }

    #[test]
    fn drain_pending_fails_all_slots() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(1, tx);
        drain_pending(&pending);
        assert!(rx.try_recv().unwrap().is_err());
    }
}
