// src/listeners/tcp.rs

use crate::connections::manager::ConnectionManager;
use crate::connections::stream::TrackedStream;
use crate::connections::tracked::TrackedConnection;
use crate::constants::{SHUTDOWN_DEADLINE, TCP_KEEPALIVE_INTERVAL};
use crate::events::{emit_network_event, model::LogLevel};
use crate::protocol::ProtocolKind;
use crate::registry::ConnectionRegistry;
use crate::router;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Accept loop for the four TCP-based protocols. Returns true when the stop
/// drained all inflight handlers inside the deadline.
pub(crate) async fn accept_loop(
    socket: TcpListener,
    protocol: ProtocolKind,
    port: String,
    tls: Option<Arc<rustls::ServerConfig>>,
    manager: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> bool {
    let mut tasks: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            accepted = socket.accept() => match accepted {
                Ok((stream, peer)) => {
                    emit_network_event(
                        "listener",
                        LogLevel::Info,
                        "incoming_connection",
                        Some(peer.to_string()),
                        Some(format!("protocol={} port={}", protocol, port)),
                    );
                    tasks.spawn(serve_connection(
                        stream,
                        peer,
                        protocol,
                        port.clone(),
                        tls.clone(),
                        manager.clone(),
                        registry.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    emit_network_event(
                        "listener",
                        LogLevel::Error,
                        "accept_failed",
                        None,
                        Some(e.to_string()),
                    );
                }
            },
            _ = shutdown.changed() => break,
        }
        // Reap finished handlers so the set stays small on long uptimes.
        while tasks.try_join_next().is_some() {}
    }

    drop(socket);
    drain(tasks).await
}

/// Await the remaining handler tasks, bounded by the stop deadline; abort
/// whatever is left when it expires.
pub(crate) async fn drain(mut tasks: JoinSet<()>) -> bool {
    let drained = tokio::time::timeout(SHUTDOWN_DEADLINE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_ok();
    if !drained {
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
    drained
}

/// Serve one accepted TCP connection. Every wait distinguishes three
/// outcomes: the peer side finishing, the operator force-closing this
/// connection, and the listener draining (idle connections close at once,
/// inflight requests run to completion).
#[allow(clippy::too_many_arguments)]
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    protocol: ProtocolKind,
    port: String,
    tls: Option<Arc<rustls::ServerConfig>>,
    manager: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    configure_keepalive(&stream);

    // Tracking sits beneath TLS and HTTP framing: one record per TCP
    // connection no matter how many streams it carries.
    let conn = TrackedConnection::new_stream(protocol, &port);
    let Some(close_signal) = conn.stream_close_signal() else {
        return;
    };
    let tracked = TrackedStream::new(stream, conn, manager, &registry);

    let svc_registry = registry.clone();
    let service = service_fn(move |req| {
        let registry = svc_registry.clone();
        async move { router::handle_request(req, peer, registry).await }
    });

    match tls {
        None => match protocol {
            // Prior-knowledge HTTP/2 for cleartext h2c.
            ProtocolKind::H2Clear => {
                let conn_fut = hyper::server::conn::http2::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(tracked), service);
                tokio::pin!(conn_fut);
                tokio::select! {
                    result = conn_fut.as_mut() => log_serve_result(&peer, result),
                    _ = close_signal.notified() => log_force_close(&peer),
                    _ = shutdown.changed() => {
                        conn_fut.as_mut().graceful_shutdown();
                        tokio::select! {
                            result = conn_fut.as_mut() => log_serve_result(&peer, result),
                            _ = close_signal.notified() => log_force_close(&peer),
                        }
                    }
                }
            }
            _ => {
                let conn_fut = hyper::server::conn::http1::Builder::new()
                    .keep_alive(true)
                    .header_read_timeout(None)
                    .serve_connection(TokioIo::new(tracked), service);
                tokio::pin!(conn_fut);
                tokio::select! {
                    result = conn_fut.as_mut() => log_serve_result(&peer, result),
                    _ = close_signal.notified() => log_force_close(&peer),
                    _ = shutdown.changed() => {
                        conn_fut.as_mut().graceful_shutdown();
                        tokio::select! {
                            result = conn_fut.as_mut() => log_serve_result(&peer, result),
                            _ = close_signal.notified() => log_force_close(&peer),
                        }
                    }
                }
            }
        },
        Some(cfg) => {
            // The tracking wrapper is already in place when the handshake
            // runs, so a failed handshake still counted one connection.
            let acceptor = TlsAcceptor::from(cfg);
            let tls_stream = tokio::select! {
                accepted = acceptor.accept(tracked) => match accepted {
                    Ok(s) => s,
                    Err(e) => {
                        emit_network_event(
                            "listener",
                            LogLevel::Error,
                            "tls_inbound_failure",
                            Some(peer.to_string()),
                            Some(e.to_string()),
                        );
                        return;
                    }
                },
                _ = close_signal.notified() => {
                    log_force_close(&peer);
                    return;
                }
            };
            match protocol {
                // ALPN advertised h2 with an http/1.1 fallback; serve
                // whichever the handshake settled on.
                ProtocolKind::H2Tls => {
                    let mut builder = auto::Builder::new(TokioExecutor::new());
                    builder.http1().header_read_timeout(None);
                    let conn_fut = builder.serve_connection(TokioIo::new(tls_stream), service);
                    tokio::pin!(conn_fut);
                    tokio::select! {
                        result = conn_fut.as_mut() => {
                            if let Err(e) = result {
                                emit_network_event(
                                    "listener",
                                    LogLevel::Debug,
                                    "request_stream_error",
                                    Some(peer.to_string()),
                                    Some(e.to_string()),
                                );
                            }
                        }
                        _ = close_signal.notified() => log_force_close(&peer),
                        _ = shutdown.changed() => {
                            conn_fut.as_mut().graceful_shutdown();
                            tokio::select! {
                                result = conn_fut.as_mut() => {
                                    if let Err(e) = result {
                                        emit_network_event(
                                            "listener",
                                            LogLevel::Debug,
                                            "request_stream_error",
                                            Some(peer.to_string()),
                                            Some(e.to_string()),
                                        );
                                    }
                                }
                                _ = close_signal.notified() => log_force_close(&peer),
                            }
                        }
                    }
                }
                _ => {
                    let conn_fut = hyper::server::conn::http1::Builder::new()
                        .keep_alive(true)
                        .header_read_timeout(None)
                        .serve_connection(TokioIo::new(tls_stream), service);
                    tokio::pin!(conn_fut);
                    tokio::select! {
                        result = conn_fut.as_mut() => log_serve_result(&peer, result),
                        _ = close_signal.notified() => log_force_close(&peer),
                        _ = shutdown.changed() => {
                            conn_fut.as_mut().graceful_shutdown();
                            tokio::select! {
                                result = conn_fut.as_mut() => log_serve_result(&peer, result),
                                _ = close_signal.notified() => log_force_close(&peer),
                            }
                        }
                    }
                }
            }
        }
    }
    // The tracking wrapper drops here: the record leaves the manager and the
    // socket closes.
}

fn log_serve_result(peer: &SocketAddr, result: hyper::Result<()>) {
    // Per-request I/O failures stay local to the handler.
    if let Err(e) = result {
        emit_network_event(
            "listener",
            LogLevel::Debug,
            "request_stream_error",
            Some(peer.to_string()),
            Some(e.to_string()),
        );
    }
}

fn log_force_close(peer: &SocketAddr) {
    emit_network_event(
        "listener",
        LogLevel::Info,
        "connection_force_closed",
        Some(peer.to_string()),
        None,
    );
}

/// Agents are long-poll clients: enable kernel keep-alive with a 5-minute
/// probe cadence instead of relying on HTTP-level timeouts (there are none).
fn configure_keepalive(stream: &TcpStream) {
    use socket2::{SockRef, TcpKeepalive};
    let keepalive = TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        emit_network_event(
            "listener",
            LogLevel::Warn,
            "keepalive_config_failed",
            None,
            Some(e.to_string()),
        );
    }
}
