// src/listeners/factory.rs

use crate::connections::manager::ConnectionManager;
use crate::error::{Error, Result};
use crate::events::{emit_network_event, model::LogLevel};
use crate::listeners::{Listener, Transport};
use crate::protocol::ProtocolKind;
use crate::registry::ConnectionRegistry;
use crate::security::FileCertificateProvider;
use rand::Rng;
use std::sync::Arc;

/// Dispatches a protocol kind to the matching transport glue, forwarding the
/// connection manager and injecting TLS configuration where applicable.
///
/// The certificate provider is optional: without one the factory still
/// builds H1C and H2C listeners and refuses the TLS/H3 variants.
pub struct AbstractFactory {
    manager: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
    tls: Option<TlsConfigs>,
}

struct TlsConfigs {
    h1: Arc<rustls::ServerConfig>,
    h2: Arc<rustls::ServerConfig>,
    h3: Arc<rustls::ServerConfig>,
}

impl AbstractFactory {
    pub fn new(
        manager: ConnectionManager,
        registry: Arc<ConnectionRegistry>,
        provider: Option<FileCertificateProvider>,
    ) -> Self {
        let tls = provider.and_then(|p| match build_tls_configs(&p) {
            Ok(configs) => {
                emit_network_event(
                    "factory",
                    LogLevel::Info,
                    "factory_ready",
                    None,
                    Some("all protocols available".into()),
                );
                Some(configs)
            }
            Err(e) => {
                emit_network_event(
                    "factory",
                    LogLevel::Warn,
                    "tls_load_failed",
                    None,
                    Some(e.to_string()),
                );
                None
            }
        });
        if tls.is_none() {
            emit_network_event(
                "factory",
                LogLevel::Warn,
                "tls_listeners_unavailable",
                None,
                Some("only H1C and H2C listeners can be created".into()),
            );
        }
        Self {
            manager,
            registry,
            tls,
        }
    }

    pub fn tls_available(&self) -> bool {
        self.tls.is_some()
    }

    /// Build a listener for the given protocol and port. The caller may
    /// supply a human-memorable ID; otherwise one is minted.
    pub fn create_listener(
        &self,
        protocol: ProtocolKind,
        port: &str,
        custom_id: Option<&str>,
    ) -> Result<Arc<Listener>> {
        let id = match custom_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_listener_id(),
        };
        let transport = match protocol {
            ProtocolKind::H1Clear | ProtocolKind::H2Clear => Transport::Tcp { tls: None },
            ProtocolKind::H1Tls => Transport::Tcp {
                tls: Some(self.tls_configs()?.h1.clone()),
            },
            ProtocolKind::H2Tls => Transport::Tcp {
                tls: Some(self.tls_configs()?.h2.clone()),
            },
            ProtocolKind::H3 => Transport::Quic {
                tls: self.tls_configs()?.h3.clone(),
            },
        };
        emit_network_event(
            "factory",
            LogLevel::Info,
            "listener_created",
            None,
            Some(format!("id={} port={} protocol={}", id, port, protocol)),
        );
        Ok(Listener::new(
            id,
            port.to_string(),
            protocol,
            transport,
            self.manager.clone(),
            self.registry.clone(),
        ))
    }

    fn tls_configs(&self) -> Result<&TlsConfigs> {
        self.tls.as_ref().ok_or(Error::TlsUnavailable)
    }
}

fn build_tls_configs(provider: &FileCertificateProvider) -> Result<TlsConfigs> {
    Ok(TlsConfigs {
        h1: provider.server_config()?,
        h2: provider.server_config_h2()?,
        h3: Arc::new(provider.server_config_h3()?),
    })
}

/// Server-minted listener IDs: six random decimal digits.
fn generate_listener_id() -> String {
    format!("listener_{:06}", rand::thread_rng().gen_range(0..1_000_000))
}
