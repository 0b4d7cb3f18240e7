use serde::Serialize;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub ts: SystemTime,
    pub level: LogLevel,
    pub corr_id: Option<String>,
    pub session_id: String,
    pub component: &'static str,
    pub suppress_console: bool,
}

/// Transport-layer happenings: binds, accepts, handshakes, closes.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEvent {
    pub meta: EventMeta,
    pub action: String,
    pub addr: Option<String>,
    pub detail: Option<String>,
}

/// Tracked-connection lifecycle and identity binding.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEvent {
    pub meta: EventMeta,
    pub action: String,
    pub conn_id: String,
    pub detail: Option<String>,
}

/// Operator control-channel happenings (commands, client churn).
#[derive(Debug, Clone, Serialize)]
pub struct HubEvent {
    pub meta: EventMeta,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub meta: EventMeta,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    Network(NetworkEvent),
    Connection(ConnectionEvent),
    Hub(HubEvent),
    System(SystemEvent),
}
