// src/connections/tracked.rs

use crate::events::{emit_connection_event, model::LogLevel};
use crate::protocol::ProtocolKind;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// One accepted transport-layer connection.
///
/// A single record type covers all five protocols; the variants differ only
/// in the `protocol` tag and in the handle used to force-close the
/// transport. The agent UUID arrives late (first request header) and is
/// stable once set.
pub struct TrackedConnection {
    id: String,
    protocol: ProtocolKind,
    port: String,
    created_at: DateTime<Utc>,
    agent_uuid: RwLock<String>,
    closed: AtomicBool,
    handle: CloseHandle,
}

enum CloseHandle {
    /// Stream transports: wakes the serving task, which drops the socket.
    Stream(Arc<Notify>),
    /// QUIC sessions: closed directly on the session handle.
    Quic(quinn::Connection),
}

impl TrackedConnection {
    /// Record for a stream-oriented (TCP) transport.
    pub fn new_stream(protocol: ProtocolKind, port: &str) -> Arc<Self> {
        Arc::new(Self {
            id: generate_connection_id(),
            protocol,
            port: port.to_string(),
            created_at: Utc::now(),
            agent_uuid: RwLock::new(String::new()),
            closed: AtomicBool::new(false),
            handle: CloseHandle::Stream(Arc::new(Notify::new())),
        })
    }

    /// Record for a QUIC session.
    pub fn new_quic(conn: quinn::Connection, port: &str) -> Arc<Self> {
        Arc::new(Self {
            id: generate_connection_id(),
            protocol: ProtocolKind::H3,
            port: port.to_string(),
            created_at: Utc::now(),
            agent_uuid: RwLock::new(String::new()),
            closed: AtomicBool::new(false),
            handle: CloseHandle::Quic(conn),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Empty string while the agent has not identified itself yet.
    pub fn agent_uuid(&self) -> String {
        self.agent_uuid.read().clone()
    }

    /// Late-bind the agent UUID. Empty strings and identical repeats are
    /// ignored; once a non-empty value is set it stays for the connection's
    /// life, so a disagreeing later value is dropped with a log line.
    /// Returns true when the value was newly bound.
    pub fn set_agent_uuid(&self, uuid: &str) -> bool {
        if uuid.is_empty() {
            return false;
        }
        let mut current = self.agent_uuid.write();
        if current.is_empty() {
            *current = uuid.to_string();
            emit_connection_event(
                LogLevel::Info,
                "agent_uuid_bound",
                &self.id,
                Some(format!("uuid={}", uuid)),
            );
            return true;
        }
        if current.as_str() != uuid {
            emit_connection_event(
                LogLevel::Warn,
                "agent_uuid_conflict_ignored",
                &self.id,
                Some(format!("bound={} offered={}", current, uuid)),
            );
        }
        false
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Force-close the underlying transport. Idempotent: the first call wins
    /// and later calls return without action.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.handle {
            CloseHandle::Stream(notify) => notify.notify_one(),
            CloseHandle::Quic(conn) => conn.close(0u32.into(), b"closed by server"),
        }
        emit_connection_event(LogLevel::Info, "connection_close_requested", &self.id, None);
    }

    /// Signal consumed by the stream serving task; fires once `close` ran.
    pub(crate) fn stream_close_signal(&self) -> Option<Arc<Notify>> {
        match &self.handle {
            CloseHandle::Stream(notify) => Some(notify.clone()),
            CloseHandle::Quic(_) => None,
        }
    }
}

/// Server-minted connection ID, unique per process.
pub fn generate_connection_id() -> String {
    use rand::Rng;
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    let suffix: u32 = rand::thread_rng().gen();
    format!("conn_{}_{:08x}", nanos, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_binds_once() {
        let conn = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
        assert_eq!(conn.agent_uuid(), "");
        assert!(!conn.set_agent_uuid(""));
        assert!(conn.set_agent_uuid("aaaa-bbbb"));
        assert!(!conn.set_agent_uuid("aaaa-bbbb"));
        assert!(!conn.set_agent_uuid("cccc-dddd"));
        assert_eq!(conn.agent_uuid(), "aaaa-bbbb");
    }

    #[test]
    fn close_is_idempotent() {
        let conn = TrackedConnection::new_stream(ProtocolKind::H2Clear, "8888");
        assert!(!conn.is_closed());
        conn.close();
        conn.close();
        assert!(conn.is_closed());
    }

    #[test]
    fn ids_are_unique() {
        let a = generate_connection_id();
        let b = generate_connection_id();
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }
}
