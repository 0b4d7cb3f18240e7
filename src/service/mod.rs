// src/service/mod.rs

pub mod monitor;

use crate::connections::manager::ConnectionManager;
use crate::connections::tracked::TrackedConnection;
use crate::error::{Error, Result};
use crate::events::{emit_network_event, model::LogLevel};
use crate::hub::bridge::ServiceBridge;
use crate::hub::message::{ConnectionStatusPayload, Event, ListenerInfo};
use crate::hub::WsHub;
use crate::listeners::{AbstractFactory, Listener, ListenerManager};
use crate::protocol::ProtocolKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Statistics over the currently-live connection set.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub connections_by_protocol: HashMap<ProtocolKind, usize>,
    pub oldest_connection: Option<DateTime<Utc>>,
    pub newest_connection: Option<DateTime<Utc>>,
    pub average_age_seconds: f64,
}

/// Orchestrates listener lifecycle: the factory builds, the listener manager
/// keys, the connection manager tracks, and state changes go out through
/// the hub.
pub struct ListenerService {
    factory: AbstractFactory,
    listeners: ListenerManager,
    connections: ConnectionManager,
    hub: OnceCell<Arc<WsHub>>,
}

impl ListenerService {
    pub fn new(
        factory: AbstractFactory,
        listeners: ListenerManager,
        connections: ConnectionManager,
    ) -> Self {
        Self {
            factory,
            listeners,
            connections,
            hub: OnceCell::new(),
        }
    }

    /// Wire the hub for listener lifecycle broadcasts. Called once at startup.
    pub fn attach_hub(&self, hub: Arc<WsHub>) {
        let _ = self.hub.set(hub);
    }

    fn broadcast(&self, event: &Event) {
        if let Some(hub) = self.hub.get() {
            hub.broadcast(event);
        }
    }

    /// Build, register, and start a listener. On start failure the listener
    /// is retracted from the manager and the error propagates to the caller
    /// (the hub turns it into a targeted `listener_creation_error`).
    pub async fn create_and_start_listener(
        &self,
        protocol: ProtocolKind,
        port: &str,
        custom_id: Option<&str>,
    ) -> Result<Arc<Listener>> {
        let listener = self.factory.create_listener(protocol, port, custom_id)?;
        self.listeners.add(listener.clone())?;
        if let Err(e) = listener.start().await {
            let _ = self.listeners.remove(listener.id());
            return Err(e);
        }
        self.broadcast(&Event::ListenerCreated(ListenerInfo::from_listener(
            &listener,
        )));
        Ok(listener)
    }

    /// Stop a listener and drop it from the inventory.
    pub async fn stop_listener(&self, id: &str) -> Result<()> {
        let listener = self.listeners.get(id)?;
        self.broadcast(&Event::ListenerStopped(ListenerInfo::from_listener(
            &listener,
        )));
        listener.stop().await?;
        self.listeners.remove(id)?;
        Ok(())
    }

    /// Stop every listener, each under its own drain deadline.
    pub async fn stop_all_listeners(&self) {
        emit_network_event(
            "service",
            LogLevel::Info,
            "stopping_all_listeners",
            None,
            Some(format!("count={}", self.listeners.count())),
        );
        for listener in self.listeners.list() {
            self.broadcast(&Event::ListenerStopped(ListenerInfo::from_listener(
                &listener,
            )));
            if let Err(e) = listener.stop().await {
                emit_network_event(
                    "service",
                    LogLevel::Error,
                    "stop_failed",
                    None,
                    Some(format!("id={} err={}", listener.id(), e)),
                );
            }
            let _ = self.listeners.remove(listener.id());
        }
        emit_network_event(
            "service",
            LogLevel::Info,
            "all_listeners_stopped",
            None,
            None,
        );
    }

    pub fn get_all_listeners(&self) -> Vec<Arc<Listener>> {
        self.listeners.list()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.count()
    }

    pub fn get_all_connections(&self) -> Vec<Arc<TrackedConnection>> {
        self.connections.all()
    }

    pub fn get_connection_count(&self) -> usize {
        self.connections.count()
    }

    pub fn get_connections_by_protocol(&self, protocol: ProtocolKind) -> Vec<Arc<TrackedConnection>> {
        self.connections.by_protocol(protocol)
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Close a tracked connection's transport, then remove it defensively:
    /// the close normally triggers removal through the tracking wrapper, but
    /// the extra remove keeps the UI consistent if the transport lacks a
    /// close hook. A repeat call for an unknown ID is a successful no-op.
    pub async fn stop_connection(&self, id: &str) -> Result<()> {
        match self.connections.get(id) {
            Some(conn) => {
                emit_network_event(
                    "service",
                    LogLevel::Info,
                    "connection_stop_requested",
                    None,
                    Some(format!(
                        "id={} protocol={} agent={}",
                        id,
                        conn.protocol(),
                        conn.agent_uuid()
                    )),
                );
                conn.close();
                self.connections.remove(id);
                Ok(())
            }
            None => {
                emit_network_event(
                    "service",
                    LogLevel::Debug,
                    "connection_stop_noop",
                    None,
                    Some(format!("id={}", id)),
                );
                Ok(())
            }
        }
    }

    /// Advisory probe: try a transient bind and release it. Not race-free by
    /// construction.
    pub async fn is_port_available(&self, port: &str) -> bool {
        let Ok(port) = port.parse::<u16>() else {
            return false;
        };
        match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get_connection_stats(&self) -> ConnectionStats {
        let connections = self.connections.all();
        let mut stats = ConnectionStats {
            total_connections: connections.len(),
            connections_by_protocol: HashMap::new(),
            oldest_connection: None,
            newest_connection: None,
            average_age_seconds: 0.0,
        };
        if connections.is_empty() {
            return stats;
        }
        let now = Utc::now();
        let mut total_age_seconds = 0.0;
        for conn in &connections {
            *stats
                .connections_by_protocol
                .entry(conn.protocol())
                .or_insert(0) += 1;
            let created = conn.created_at();
            if stats.oldest_connection.map(|o| created < o).unwrap_or(true) {
                stats.oldest_connection = Some(created);
            }
            if stats.newest_connection.map(|n| created > n).unwrap_or(true) {
                stats.newest_connection = Some(created);
            }
            total_age_seconds += (now - created).num_milliseconds() as f64 / 1000.0;
        }
        stats.average_age_seconds = total_age_seconds / connections.len() as f64;
        stats
    }

    /// Push aggregate connection figures to every hub client.
    pub fn broadcast_connection_status(&self) {
        let stats = self.get_connection_stats();
        let by_protocol = stats
            .connections_by_protocol
            .iter()
            .map(|(kind, count)| (kind.display_name().to_string(), *count))
            .collect();
        self.broadcast(&Event::ConnectionStatus(ConnectionStatusPayload {
            total_connections: stats.total_connections,
            by_protocol,
            average_age_seconds: stats.average_age_seconds,
        }));
    }
}

#[async_trait]
impl ServiceBridge for ListenerService {
    fn get_all_listeners(&self) -> Vec<Arc<Listener>> {
        self.listeners.list()
    }

    fn get_all_connections(&self) -> Vec<Arc<TrackedConnection>> {
        self.connections.all()
    }

    async fn stop_listener(&self, id: &str) -> Result<()> {
        ListenerService::stop_listener(self, id).await
    }

    async fn stop_connection(&self, id: &str) -> Result<()> {
        ListenerService::stop_connection(self, id).await
    }

    async fn is_port_available(&self, port: &str) -> bool {
        ListenerService::is_port_available(self, port).await
    }

    async fn create_listener(
        &self,
        id: Option<String>,
        protocol: i64,
        port: String,
    ) -> Result<Arc<Listener>> {
        let kind = ProtocolKind::from_discriminant(protocol)?;
        if port.trim().is_empty() {
            return Err(Error::Config("port must not be empty".into()));
        }
        self.create_and_start_listener(kind, &port, id.as_deref())
            .await
    }
}
