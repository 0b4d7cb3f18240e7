// src/hub/message.rs

use crate::connections::tracked::TrackedConnection;
use crate::listeners::Listener;
use crate::registry::ConnectionRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Listener projection sent to operator UIs. `protocol` carries the display
/// name, `createdAt` serializes as RFC3339 UTC.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerInfo {
    pub id: String,
    pub port: String,
    pub protocol: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl ListenerInfo {
    pub fn from_listener(listener: &Listener) -> Self {
        Self {
            id: listener.id().to_string(),
            port: listener.port().to_string(),
            protocol: listener.protocol().display_name().to_string(),
            created_at: listener.created_at(),
        }
    }
}

/// Connection projection sent to operator UIs.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub port: String,
    pub protocol: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "remoteAddr")]
    pub remote_addr: String,
    #[serde(rename = "agentUUID")]
    pub agent_uuid: String,
}

impl ConnectionInfo {
    pub fn from_connection(conn: &TrackedConnection, registry: &ConnectionRegistry) -> Self {
        Self {
            id: conn.id().to_string(),
            port: conn.port().to_string(),
            protocol: conn.protocol().display_name().to_string(),
            created_at: conn.created_at(),
            remote_addr: registry
                .remote_addr_by_conn_id(conn.id())
                .unwrap_or_else(|| "Unknown".to_string()),
            agent_uuid: conn.agent_uuid(),
        }
    }
}

/// Aggregate live-connection figures pushed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusPayload {
    #[serde(rename = "totalConnections")]
    pub total_connections: usize,
    #[serde(rename = "byProtocol")]
    pub by_protocol: HashMap<String, usize>,
    #[serde(rename = "averageAgeSeconds")]
    pub average_age_seconds: f64,
}

/// Outbound frame envelope: `{"type": <tag>, "payload": <value>}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    Welcome(String),
    ListenerCreated(ListenerInfo),
    ListenerStopped(ListenerInfo),
    ListenersSnapshot(Vec<ListenerInfo>),
    ConnectionCreated(ConnectionInfo),
    ConnectionStopped(ConnectionInfo),
    ConnectionsSnapshot(Vec<ConnectionInfo>),
    PortCheckResult {
        port: String,
        #[serde(rename = "isAvailable")]
        is_available: bool,
    },
    ListenerCreationError {
        message: String,
    },
    ConnectionStatus(ConnectionStatusPayload),
}

/// Inbound frame from an operator UI. The action stays a free string so an
/// unknown action is logged and ignored rather than failing the decode.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// Field accessor that coerces JSON strings and numbers to a string, the
/// way the UI schema allows ports to arrive either way.
pub fn string_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Field accessor that coerces JSON numbers and numeric strings to an
/// integer (protocol discriminators arrive either way too).
pub fn int_field(payload: &Value, key: &str) -> Option<i64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_shape() {
        let evt = Event::PortCheckResult {
            port: "9999".into(),
            is_available: false,
        };
        let json: Value = serde_json::from_str(&serde_json::to_string(&evt).unwrap()).unwrap();
        assert_eq!(json["type"], "port_check_result");
        assert_eq!(json["payload"]["port"], "9999");
        assert_eq!(json["payload"]["isAvailable"], false);
    }

    #[test]
    fn welcome_envelope_shape() {
        let evt = Event::Welcome("hello".into());
        let json: Value = serde_json::from_str(&serde_json::to_string(&evt).unwrap()).unwrap();
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["payload"], "hello");
    }

    #[test]
    fn command_payload_coercion() {
        let cmd: Command = serde_json::from_str(
            r#"{"action":"create_listener","payload":{"protocol":"3","port":8888}}"#,
        )
        .unwrap();
        assert_eq!(cmd.action, "create_listener");
        assert_eq!(int_field(&cmd.payload, "protocol"), Some(3));
        assert_eq!(string_field(&cmd.payload, "port").as_deref(), Some("8888"));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let cmd: Command = serde_json::from_str(r#"{"action":"get_listeners"}"#).unwrap();
        assert!(cmd.payload.is_null());
        assert!(string_field(&cmd.payload, "id").is_none());
    }
}
