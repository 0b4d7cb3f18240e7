// src/registry.rs

use crate::connections::manager::ConnectionManager;
use crate::events::{emit_network_event, model::LogLevel};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Maps transport-level identity to tracked-connection identity.
///
/// Three maps live under one lock: remote address -> connection ID (written
/// on accept), connection ID -> agent UUID (written on the first header
/// observation), and a dedup set of already-processed (remote address, UUID)
/// pairs. One instance exists per process; it is wired to the connection
/// manager at startup and holds only string keys, never transport handles.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    manager: OnceCell<ConnectionManager>,
}

#[derive(Default)]
struct RegistryState {
    conn_map: HashMap<String, String>,
    uuid_map: HashMap<String, String>,
    processed_pairs: HashSet<(String, String)>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            manager: OnceCell::new(),
        }
    }

    /// Wire the registry to the connection manager. Called once at startup.
    pub fn link_manager(&self, manager: ConnectionManager) {
        let _ = self.manager.set(manager);
        emit_network_event(
            "registry",
            LogLevel::Info,
            "registry_linked",
            None,
            Some("connection manager attached".into()),
        );
    }

    /// Associate a transport connection's remote address with a connection ID.
    /// Unconditionally overwrites: address/port tuples are reused as kernel
    /// ports recycle.
    pub fn register_connection(&self, remote_addr: &str, conn_id: &str) {
        self.state
            .write()
            .conn_map
            .insert(remote_addr.to_string(), conn_id.to_string());
        emit_network_event(
            "registry",
            LogLevel::Debug,
            "remote_addr_mapped",
            Some(remote_addr.to_string()),
            Some(format!("conn_id={}", conn_id)),
        );
    }

    /// Bind an agent UUID to whatever connection currently owns `remote_addr`.
    ///
    /// The (remote address, UUID) pair is probed under the read lock first;
    /// redundant calls return silently after the write-lock double check.
    /// When a manager is wired, the live record's UUID setter is invoked too.
    pub fn register_uuid(&self, remote_addr: &str, agent_uuid: &str) {
        if agent_uuid.is_empty() {
            return;
        }
        let pair = (remote_addr.to_string(), agent_uuid.to_string());
        {
            let state = self.state.read();
            if state.processed_pairs.contains(&pair) {
                return;
            }
        }

        let conn_id = {
            let mut state = self.state.write();
            // Check, upgrade, double-check.
            if !state.processed_pairs.insert(pair) {
                return;
            }
            let Some(conn_id) = state.conn_map.get(remote_addr).cloned() else {
                emit_network_event(
                    "registry",
                    LogLevel::Warn,
                    "unknown_remote_addr",
                    Some(remote_addr.to_string()),
                    Some(format!("uuid={}", agent_uuid)),
                );
                return;
            };
            if let Some(existing) = state.uuid_map.get(&conn_id) {
                if existing != agent_uuid {
                    // The first binding wins; disagreement is logged, not applied.
                    emit_network_event(
                        "registry",
                        LogLevel::Warn,
                        "uuid_conflict_ignored",
                        Some(remote_addr.to_string()),
                        Some(format!("bound={} offered={}", existing, agent_uuid)),
                    );
                    return;
                }
            }
            state
                .uuid_map
                .insert(conn_id.clone(), agent_uuid.to_string());
            conn_id
        };

        emit_network_event(
            "registry",
            LogLevel::Info,
            "uuid_associated",
            Some(remote_addr.to_string()),
            Some(format!("conn_id={} uuid={}", conn_id, agent_uuid)),
        );

        if let Some(manager) = self.manager.get() {
            manager.bind_agent_uuid(&conn_id, agent_uuid);
        }
    }

    /// Current agent UUID bound to a connection ID, if any.
    pub fn agent_uuid_by_conn_id(&self, conn_id: &str) -> Option<String> {
        self.state.read().uuid_map.get(conn_id).cloned()
    }

    /// Reverse lookup used by the snapshot assembler. Linear scan is fine:
    /// the call site is operator-paced, not data-path.
    pub fn remote_addr_by_conn_id(&self, conn_id: &str) -> Option<String> {
        let state = self.state.read();
        state
            .conn_map
            .iter()
            .find(|(_, id)| id.as_str() == conn_id)
            .map(|(addr, _)| addr.clone())
    }
}
