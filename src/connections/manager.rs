// src/connections/manager.rs

use crate::connections::tracked::TrackedConnection;
use crate::events::{emit_connection_event, model::LogLevel};
use crate::hub::message::{ConnectionInfo, Event};
use crate::hub::WsHub;
use crate::protocol::ProtocolKind;
use crate::registry::ConnectionRegistry;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns the set of currently-live tracked connections and the append-only
/// per-agent connection history, and emits lifecycle events to the hub.
///
/// Cheap to clone; all clones share state. Lock order throughout the crate
/// is registry before manager, never the reverse.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    state: RwLock<State>,
    registry: Arc<ConnectionRegistry>,
    hub: OnceCell<Arc<WsHub>>,
    history_cap: usize,
}

#[derive(Default)]
struct State {
    live: HashMap<String, Arc<TrackedConnection>>,
    created: HashMap<String, DateTime<Utc>>,
    // agent UUID -> connection IDs, oldest first. Entries survive connection
    // close so reconnect queries stay answerable.
    history: HashMap<String, Vec<String>>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<ConnectionRegistry>, history_cap: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                registry,
                hub: OnceCell::new(),
                history_cap: history_cap.max(1),
            }),
        }
    }

    /// Wire the hub for lifecycle broadcasts. Called once at startup.
    pub fn attach_hub(&self, hub: Arc<WsHub>) {
        let _ = self.inner.hub.set(hub);
    }

    /// Store a record and broadcast `connection_created`. The agent UUID is
    /// typically still empty here; history catches up in `bind_agent_uuid`.
    pub fn add(&self, conn: Arc<TrackedConnection>) {
        let info = self.connection_info(&conn);
        {
            let mut state = self.inner.state.write();
            state.live.insert(conn.id().to_string(), conn.clone());
            state
                .created
                .insert(conn.id().to_string(), conn.created_at());
            let uuid = conn.agent_uuid();
            if !uuid.is_empty() {
                push_history(&mut state, &uuid, conn.id(), self.inner.history_cap);
            }
        }
        emit_connection_event(
            LogLevel::Info,
            "connection_tracked",
            conn.id(),
            Some(format!("protocol={} port={}", conn.protocol(), conn.port())),
        );
        if let Some(hub) = self.inner.hub.get() {
            hub.broadcast(&Event::ConnectionCreated(info));
        }
    }

    /// Delete from the live map (history is preserved) and broadcast
    /// `connection_stopped`. Idempotent: a second call is a no-op with no
    /// event.
    pub fn remove(&self, id: &str) -> bool {
        let conn = { self.inner.state.read().live.get(id).cloned() };
        let Some(conn) = conn else {
            return false;
        };
        let info = self.connection_info(&conn);
        let removed = {
            let mut state = self.inner.state.write();
            state.created.remove(id);
            state.live.remove(id).is_some()
        };
        if !removed {
            return false;
        }
        emit_connection_event(LogLevel::Info, "connection_removed", id, None);
        if let Some(hub) = self.inner.hub.get() {
            hub.broadcast(&Event::ConnectionStopped(info));
        }
        true
    }

    /// Apply a late-observed agent UUID to the live record and, when it is
    /// newly bound, append to history. No second `connection_created` is
    /// emitted; the UI picks the UUID up from the next snapshot.
    pub fn bind_agent_uuid(&self, conn_id: &str, uuid: &str) {
        let conn = { self.inner.state.read().live.get(conn_id).cloned() };
        let Some(conn) = conn else {
            emit_connection_event(
                LogLevel::Warn,
                "uuid_for_unknown_connection",
                conn_id,
                Some(format!("uuid={}", uuid)),
            );
            return;
        };
        if conn.set_agent_uuid(uuid) {
            let mut state = self.inner.state.write();
            push_history(&mut state, uuid, conn_id, self.inner.history_cap);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<TrackedConnection>> {
        self.inner.state.read().live.get(id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<TrackedConnection>> {
        self.inner.state.read().live.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.state.read().live.len()
    }

    pub fn created_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.state.read().created.get(id).copied()
    }

    pub fn by_protocol(&self, kind: ProtocolKind) -> Vec<Arc<TrackedConnection>> {
        self.inner
            .state
            .read()
            .live
            .values()
            .filter(|c| c.protocol() == kind)
            .cloned()
            .collect()
    }

    pub fn by_agent_uuid(&self, uuid: &str) -> Vec<Arc<TrackedConnection>> {
        self.inner
            .state
            .read()
            .live
            .values()
            .filter(|c| c.agent_uuid() == uuid)
            .cloned()
            .collect()
    }

    pub fn unique_agent_uuids(&self) -> Vec<String> {
        let state = self.inner.state.read();
        let mut uuids: Vec<String> = state
            .live
            .values()
            .map(|c| c.agent_uuid())
            .filter(|u| !u.is_empty())
            .collect();
        uuids.sort();
        uuids.dedup();
        uuids
    }

    pub fn count_by_agent_uuid(&self) -> HashMap<String, usize> {
        let state = self.inner.state.read();
        let mut counts = HashMap::new();
        for conn in state.live.values() {
            let uuid = conn.agent_uuid();
            if !uuid.is_empty() {
                *counts.entry(uuid).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Full connection-ID history for an agent, oldest first. Survives
    /// connection close; bounded by the configured cap.
    pub fn history_by_agent_uuid(&self, uuid: &str) -> Vec<String> {
        self.inner
            .state
            .read()
            .history
            .get(uuid)
            .cloned()
            .unwrap_or_default()
    }

    /// True once the agent UUID has been observed on more than one transport
    /// connection, even after earlier connections have closed.
    pub fn is_reconnection(&self, uuid: &str) -> bool {
        self.inner
            .state
            .read()
            .history
            .get(uuid)
            .map(|ids| ids.len() >= 2)
            .unwrap_or(false)
    }

    /// UI-facing projection of one record; remote address comes from the
    /// registry, `"Unknown"` when it has no mapping.
    pub fn connection_info(&self, conn: &TrackedConnection) -> ConnectionInfo {
        ConnectionInfo::from_connection(conn, &self.inner.registry)
    }
}

fn push_history(state: &mut State, uuid: &str, conn_id: &str, cap: usize) {
    let entries = state.history.entry(uuid.to_string()).or_default();
    entries.push(conn_id.to_string());
    if entries.len() > cap {
        let overflow = entries.len() - cap;
        entries.drain(..overflow);
    }
}
