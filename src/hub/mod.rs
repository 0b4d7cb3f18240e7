// src/hub/mod.rs

pub mod bridge;
pub mod message;

pub use bridge::ServiceBridge;
pub use message::{Command, ConnectionInfo, Event, ListenerInfo};

use crate::constants::WS_PATH;
use crate::error::{Error, Result};
use crate::events::{emit_hub_event, model::LogLevel};
use crate::registry::ConnectionRegistry;
use futures_util::{SinkExt, StreamExt};
use message::{int_field, string_field};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as WsRequest, Response as WsResponse,
};
use tokio_tungstenite::tungstenite::Message as WsMessage;

type ClientTx = mpsc::UnboundedSender<WsMessage>;

/// One-to-many push channel to operator UIs plus the inbound command
/// dispatcher. Clients are held as outbound channel handles; a failed send
/// drops the client, so the set is self-healing and a broadcast never
/// blocks on a stuck peer.
pub struct WsHub {
    port: u16,
    registry: Arc<ConnectionRegistry>,
    clients: Mutex<HashMap<u64, ClientTx>>,
    next_client_id: AtomicU64,
    bridge: OnceCell<Arc<dyn ServiceBridge>>,
}

impl WsHub {
    pub fn new(port: u16, registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            port,
            registry,
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            bridge: OnceCell::new(),
        })
    }

    /// Wire the service bridge. Called once at startup; commands arriving
    /// before this are answered with a log line only.
    pub fn register_bridge(&self, bridge: Arc<dyn ServiceBridge>) {
        let _ = self.bridge.set(bridge);
        emit_hub_event(
            LogLevel::Info,
            "bridge_registered",
            Some("listener service attached".into()),
        );
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Bind the control port and accept UI clients until the task is
    /// dropped. One task per connected client.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| Error::Bind {
                port: self.port.to_string(),
                source: e,
            })?;
        emit_hub_event(
            LogLevel::Info,
            "hub_listening",
            Some(format!("port={} path={}", self.port, WS_PATH)),
        );
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let hub = self.clone();
                    tokio::spawn(async move {
                        hub.handle_client(stream, peer).await;
                    });
                }
                Err(e) => {
                    emit_hub_event(LogLevel::Error, "accept_failed", Some(e.to_string()));
                }
            }
        }
    }

    async fn handle_client(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let check_path = |req: &WsRequest, resp: WsResponse| {
            if req.uri().path() == WS_PATH {
                Ok(resp)
            } else {
                let mut reject = ErrorResponse::new(Some("not found".to_string()));
                *reject.status_mut() = http::StatusCode::NOT_FOUND;
                Err(reject)
            }
        };
        let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
            Ok(ws) => ws,
            Err(e) => {
                emit_hub_event(
                    LogLevel::Warn,
                    "upgrade_failed",
                    Some(format!("peer={} err={}", peer, e)),
                );
                return;
            }
        };
        let (mut sink, mut reader) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        // All writes to this socket funnel through one writer task.
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(client_id, tx.clone());
        emit_hub_event(
            LogLevel::Info,
            "client_connected",
            Some(format!("peer={}", peer)),
        );

        send_event(&tx, &Event::Welcome("Connected to Pyre control channel".into()));
        self.send_listeners_snapshot(&tx);
        self.send_connections_snapshot(&tx);

        while let Some(frame) = reader.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.process_command(&tx, &text).await,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {} // pings are answered by the protocol layer; binary is ignored
                Err(e) => {
                    emit_hub_event(
                        LogLevel::Warn,
                        "client_read_error",
                        Some(format!("peer={} err={}", peer, e)),
                    );
                    break;
                }
            }
        }

        self.clients.lock().remove(&client_id);
        drop(tx);
        let _ = writer.await;
        emit_hub_event(
            LogLevel::Info,
            "client_disconnected",
            Some(format!("peer={}", peer)),
        );
    }

    /// Send a state-change event to every registered client, dropping any
    /// whose channel has gone away.
    pub fn broadcast(&self, event: &Event) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                emit_hub_event(LogLevel::Error, "encode_failed", Some(e.to_string()));
                return;
            }
        };
        self.clients
            .lock()
            .retain(|_, tx| tx.send(WsMessage::Text(json.clone())).is_ok());
    }

    fn send_listeners_snapshot(&self, tx: &ClientTx) {
        let Some(bridge) = self.bridge.get() else {
            emit_hub_event(
                LogLevel::Warn,
                "snapshot_unavailable",
                Some("service bridge not registered".into()),
            );
            return;
        };
        let infos: Vec<ListenerInfo> = bridge
            .get_all_listeners()
            .iter()
            .map(|l| ListenerInfo::from_listener(l))
            .collect();
        send_event(tx, &Event::ListenersSnapshot(infos));
    }

    fn send_connections_snapshot(&self, tx: &ClientTx) {
        let Some(bridge) = self.bridge.get() else {
            emit_hub_event(
                LogLevel::Warn,
                "snapshot_unavailable",
                Some("service bridge not registered".into()),
            );
            return;
        };
        let infos: Vec<ConnectionInfo> = bridge
            .get_all_connections()
            .iter()
            .map(|c| ConnectionInfo::from_connection(c, &self.registry))
            .collect();
        send_event(tx, &Event::ConnectionsSnapshot(infos));
    }

    async fn process_command(&self, tx: &ClientTx, raw: &str) {
        let cmd: Command = match serde_json::from_str(raw) {
            Ok(cmd) => cmd,
            Err(e) => {
                // Malformed frames are logged and the client stays connected.
                emit_hub_event(LogLevel::Warn, "bad_command_frame", Some(e.to_string()));
                return;
            }
        };
        let Some(bridge) = self.bridge.get() else {
            emit_hub_event(
                LogLevel::Warn,
                "command_dropped",
                Some("service bridge not registered".into()),
            );
            return;
        };

        match cmd.action.as_str() {
            "get_listeners" => self.send_listeners_snapshot(tx),
            "get_connections" => self.send_connections_snapshot(tx),
            "stop_listener" => {
                let Some(id) = string_field(&cmd.payload, "id") else {
                    emit_hub_event(
                        LogLevel::Warn,
                        "bad_payload",
                        Some("stop_listener requires 'id'".into()),
                    );
                    return;
                };
                match bridge.stop_listener(&id).await {
                    Ok(()) => emit_hub_event(
                        LogLevel::Info,
                        "listener_stopped",
                        Some(format!("id={}", id)),
                    ),
                    Err(e) => emit_hub_event(
                        LogLevel::Warn,
                        "stop_listener_failed",
                        Some(format!("id={} err={}", id, e)),
                    ),
                }
            }
            "stop_connection" => {
                let Some(id) = string_field(&cmd.payload, "id") else {
                    emit_hub_event(
                        LogLevel::Warn,
                        "bad_payload",
                        Some("stop_connection requires 'id'".into()),
                    );
                    return;
                };
                match bridge.stop_connection(&id).await {
                    Ok(()) => emit_hub_event(
                        LogLevel::Info,
                        "connection_stopped",
                        Some(format!("id={}", id)),
                    ),
                    Err(e) => emit_hub_event(
                        LogLevel::Warn,
                        "stop_connection_failed",
                        Some(format!("id={} err={}", id, e)),
                    ),
                }
            }
            "check_port" => {
                let Some(port) = string_field(&cmd.payload, "port") else {
                    emit_hub_event(
                        LogLevel::Warn,
                        "bad_payload",
                        Some("check_port requires 'port'".into()),
                    );
                    return;
                };
                let is_available = bridge.is_port_available(&port).await;
                send_event(
                    tx,
                    &Event::PortCheckResult {
                        port,
                        is_available,
                    },
                );
            }
            "create_listener" => {
                let id = string_field(&cmd.payload, "id");
                let Some(protocol) = int_field(&cmd.payload, "protocol") else {
                    send_event(
                        tx,
                        &Event::ListenerCreationError {
                            message: "missing or invalid 'protocol' in payload".into(),
                        },
                    );
                    return;
                };
                let Some(port) = string_field(&cmd.payload, "port") else {
                    send_event(
                        tx,
                        &Event::ListenerCreationError {
                            message: "missing or invalid 'port' in payload".into(),
                        },
                    );
                    return;
                };
                match bridge.create_listener(id, protocol, port).await {
                    // Success is broadcast by the service as listener_created.
                    Ok(listener) => emit_hub_event(
                        LogLevel::Info,
                        "listener_created",
                        Some(format!("id={}", listener.id())),
                    ),
                    Err(e) => send_event(
                        tx,
                        &Event::ListenerCreationError {
                            message: e.to_string(),
                        },
                    ),
                }
            }
            other => {
                emit_hub_event(
                    LogLevel::Warn,
                    "unknown_command",
                    Some(format!("action={}", other)),
                );
            }
        }
    }
}

fn send_event(tx: &ClientTx, event: &Event) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = tx.send(WsMessage::Text(json));
    }
}
