// src/listeners/mod.rs

pub mod factory;
pub mod h3;
pub mod manager;
pub mod tcp;

pub use factory::AbstractFactory;
pub use manager::ListenerManager;

use crate::connections::manager::ConnectionManager;
use crate::error::{Error, Result};
use crate::events::{emit_network_event, model::LogLevel};
use crate::protocol::ProtocolKind;
use crate::registry::ConnectionRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Transport glue installed by the per-protocol factories. At the transport
/// layer the four TCP variants differ only in their TLS configuration; HTTP
/// framing is chosen later from the protocol tag.
pub(crate) enum Transport {
    Tcp {
        tls: Option<Arc<rustls::ServerConfig>>,
    },
    Quic {
        tls: Arc<rustls::ServerConfig>,
    },
}

struct ListenerRuntime {
    shutdown: watch::Sender<bool>,
    /// Accept-loop task; resolves true when the stop drained cleanly.
    accept_task: JoinHandle<bool>,
}

/// A server-side endpoint bound to (protocol, port). Lifecycle: created ->
/// running (bound, accepting) -> stopping (draining, 10s deadline) ->
/// terminated (removed from the manager).
pub struct Listener {
    id: String,
    port: String,
    protocol: ProtocolKind,
    created_at: DateTime<Utc>,
    transport: Transport,
    manager: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
    runtime: Mutex<Option<ListenerRuntime>>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl Listener {
    pub(crate) fn new(
        id: String,
        port: String,
        protocol: ProtocolKind,
        transport: Transport,
        manager: ConnectionManager,
        registry: Arc<ConnectionRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            port,
            protocol,
            created_at: Utc::now(),
            transport,
            manager,
            registry,
            runtime: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    fn bind_addr(&self) -> Result<SocketAddr> {
        let port: u16 = self
            .port
            .parse()
            .map_err(|_| Error::Config(format!("invalid port '{}'", self.port)))?;
        Ok(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    /// Bind the transport and spawn the accept loop. Bind failures surface
    /// here synchronously so a UI command gets its targeted error reply.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let addr = self.bind_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_task = match &self.transport {
            Transport::Tcp { tls } => {
                let socket = TcpListener::bind(addr).await.map_err(|e| Error::Bind {
                    port: self.port.clone(),
                    source: e,
                })?;
                tokio::spawn(tcp::accept_loop(
                    socket,
                    self.protocol,
                    self.port.clone(),
                    tls.clone(),
                    self.manager.clone(),
                    self.registry.clone(),
                    shutdown_rx,
                ))
            }
            Transport::Quic { tls } => {
                let endpoint = h3::bind_endpoint(tls, addr, &self.port)?;
                tokio::spawn(h3::accept_loop(
                    endpoint,
                    self.port.clone(),
                    self.manager.clone(),
                    self.registry.clone(),
                    shutdown_rx,
                ))
            }
        };

        *self.runtime.lock() = Some(ListenerRuntime {
            shutdown: shutdown_tx,
            accept_task,
        });
        emit_network_event(
            "listener",
            LogLevel::Info,
            "listener_bind",
            Some(addr.to_string()),
            Some(format!("id={} protocol={}", self.id, self.protocol)),
        );
        Ok(())
    }

    /// Graceful shutdown: stop accepting, drain inflight handlers up to the
    /// 10s deadline, then force close. A second stop (or a stop before
    /// start) returns "server not started".
    pub async fn stop(&self) -> Result<()> {
        let runtime = self.runtime.lock().take().ok_or(Error::NotStarted)?;
        emit_network_event(
            "listener",
            LogLevel::Info,
            "listener_stopping",
            None,
            Some(format!("id={} port={}", self.id, self.port)),
        );
        let _ = runtime.shutdown.send(true);
        match runtime.accept_task.await {
            Ok(true) => {}
            Ok(false) => {
                // Deadline expired; inflight handlers were aborted. The stop
                // itself still succeeds.
                emit_network_event(
                    "listener",
                    LogLevel::Warn,
                    "shutdown_deadline_exceeded",
                    None,
                    Some(Error::ShutdownExceeded(self.id.clone()).to_string()),
                );
            }
            Err(e) => {
                emit_network_event(
                    "listener",
                    LogLevel::Error,
                    "accept_task_failed",
                    None,
                    Some(e.to_string()),
                );
            }
        }
        emit_network_event(
            "listener",
            LogLevel::Info,
            "listener_stopped",
            None,
            Some(format!("id={} port={}", self.id, self.port)),
        );
        Ok(())
    }
}
