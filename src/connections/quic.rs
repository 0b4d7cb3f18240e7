// src/connections/quic.rs

use crate::connections::manager::ConnectionManager;
use crate::connections::tracked::TrackedConnection;
use crate::events::{emit_connection_event, model::LogLevel};
use crate::registry::ConnectionRegistry;
use std::sync::Arc;

/// Observes QUIC session lifetimes the way the stream wrapper tracks TCP
/// connections. QUIC gives no per-stream I/O hook, so the record is created
/// on session establishment and removed when the session's done-signal
/// fires.
#[derive(Clone)]
pub struct QuicConnectionObserver {
    manager: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
}

impl QuicConnectionObserver {
    pub fn new(manager: ConnectionManager, registry: Arc<ConnectionRegistry>) -> Self {
        Self { manager, registry }
    }

    /// Track a freshly accepted session and schedule its removal on close.
    /// The remote address goes through the same registry pathway as TCP, so
    /// UUID binding works identically for HTTP/3.
    pub fn on_connection_established(
        &self,
        conn: quinn::Connection,
        port: &str,
    ) -> Arc<TrackedConnection> {
        let remote_addr = conn.remote_address().to_string();
        let tracked = TrackedConnection::new_quic(conn.clone(), port);
        self.registry.register_connection(&remote_addr, tracked.id());
        self.manager.add(tracked.clone());

        let manager = self.manager.clone();
        let id = tracked.id().to_string();
        tokio::spawn(async move {
            let reason = conn.closed().await;
            emit_connection_event(
                LogLevel::Info,
                "quic_session_closed",
                &id,
                Some(reason.to_string()),
            );
            manager.remove(&id);
        });

        tracked
    }
}
