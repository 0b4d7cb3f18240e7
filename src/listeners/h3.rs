// src/listeners/h3.rs

use crate::connections::manager::ConnectionManager;
use crate::connections::quic::QuicConnectionObserver;
use crate::error::{Error, Result};
use crate::events::{emit_network_event, model::LogLevel};
use crate::registry::ConnectionRegistry;
use crate::router;
use bytes::Bytes;
use http::Request;
use quinn::crypto::rustls::QuicServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Open the UDP socket and build the QUIC endpoint for an HTTP/3 listener.
pub(crate) fn bind_endpoint(
    tls: &Arc<rustls::ServerConfig>,
    addr: SocketAddr,
    port: &str,
) -> Result<quinn::Endpoint> {
    let crypto = QuicServerConfig::try_from((**tls).clone())
        .map_err(|e| Error::Config(format!("QUIC TLS configuration rejected: {}", e)))?;
    let server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
    quinn::Endpoint::server(server_config, addr).map_err(|e| Error::Bind {
        port: port.to_string(),
        source: e,
    })
}

/// Accept loop for HTTP/3 sessions. Each accepted session is handed to the
/// QUIC observer for tracking, then served requests until it closes. Returns
/// true when the stop drained cleanly.
pub(crate) async fn accept_loop(
    endpoint: quinn::Endpoint,
    port: String,
    manager: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> bool {
    let observer = QuicConnectionObserver::new(manager, registry.clone());
    let mut tasks: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            incoming = endpoint.accept() => match incoming {
                Some(incoming) => {
                    let observer = observer.clone();
                    let registry = registry.clone();
                    let port = port.clone();
                    tasks.spawn(async move {
                        match incoming.await {
                            Ok(conn) => {
                                emit_network_event(
                                    "listener",
                                    LogLevel::Info,
                                    "incoming_connection",
                                    Some(conn.remote_address().to_string()),
                                    Some(format!("protocol=HTTP/3 port={}", port)),
                                );
                                observer.on_connection_established(conn.clone(), &port);
                                serve_session(conn, registry).await;
                            }
                            Err(e) => {
                                emit_network_event(
                                    "listener",
                                    LogLevel::Warn,
                                    "quic_handshake_failed",
                                    None,
                                    Some(e.to_string()),
                                );
                            }
                        }
                    });
                }
                None => break, // endpoint closed underneath us
            },
            _ = shutdown.changed() => break,
        }
        while tasks.try_join_next().is_some() {}
    }

    // Refuse new sessions and tear down live ones; the UDP socket closes
    // with the endpoint.
    endpoint.close(0u32.into(), b"shutdown");
    super::tcp::drain(tasks).await
}

/// Drive one QUIC session through the HTTP/3 request loop. H3 has no
/// stream-level accept hook, so the agent header is harvested per request
/// and routed through the same registry pathway the TCP protocols use.
async fn serve_session(conn: quinn::Connection, registry: Arc<ConnectionRegistry>) {
    let remote_addr = conn.remote_address().to_string();
    let mut h3_conn: h3::server::Connection<h3_quinn::Connection, Bytes> =
        match h3::server::Connection::new(h3_quinn::Connection::new(conn)).await {
            Ok(c) => c,
            Err(e) => {
                emit_network_event(
                    "listener",
                    LogLevel::Warn,
                    "h3_setup_failed",
                    Some(remote_addr),
                    Some(e.to_string()),
                );
                return;
            }
        };

    loop {
        match h3_conn.accept().await {
            Ok(Some(resolver)) => {
                let registry = registry.clone();
                let remote_addr = remote_addr.clone();
                tokio::spawn(async move {
                    match resolver.resolve_request().await {
                        Ok((req, stream)) => {
                            handle_request(req, stream, remote_addr, registry).await;
                        }
                        Err(e) => {
                            emit_network_event(
                                "listener",
                                LogLevel::Debug,
                                "h3_request_resolve_failed",
                                Some(remote_addr.clone()),
                                Some(e.to_string()),
                            );
                        }
                    }
                });
            }
            Ok(None) => break, // peer closed the session
            Err(e) => {
                emit_network_event(
                    "listener",
                    LogLevel::Debug,
                    "h3_session_ended",
                    Some(remote_addr.clone()),
                    Some(e.to_string()),
                );
                break;
            }
        }
    }
}

async fn handle_request(
    req: Request<()>,
    mut stream: h3::server::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>,
    remote_addr: String,
    registry: Arc<ConnectionRegistry>,
) {
    if let Some(uuid) = router::agent_uuid_from_headers(req.headers()) {
        registry.register_uuid(&remote_addr, &uuid);
    }
    let (status, body) = router::route(req.method(), req.uri().path());
    let response = http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(())
        .expect("static response");
    if let Err(e) = stream.send_response(response).await {
        emit_network_event(
            "listener",
            LogLevel::Debug,
            "h3_response_failed",
            Some(remote_addr),
            Some(e.to_string()),
        );
        return;
    }
    let _ = stream.send_data(Bytes::from_static(body.as_bytes())).await;
    let _ = stream.finish().await;
}
