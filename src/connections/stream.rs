// src/connections/stream.rs

use crate::connections::manager::ConnectionManager;
use crate::connections::tracked::TrackedConnection;
use crate::registry::ConnectionRegistry;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Decorator over an accepted TCP stream that manages its own tracking
/// lifecycle: construction registers the remote-address mapping and the
/// manager record, drop removes the record and closes the socket. All I/O
/// is delegated untouched, so TLS and HTTP framing sit on top of it and one
/// record is counted per TCP connection regardless of stream multiplexing.
pub struct TrackedStream {
    io: TcpStream,
    conn: Arc<TrackedConnection>,
    manager: ConnectionManager,
}

impl TrackedStream {
    pub fn new(
        io: TcpStream,
        conn: Arc<TrackedConnection>,
        manager: ConnectionManager,
        registry: &ConnectionRegistry,
    ) -> Self {
        let remote_addr = io
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "Unknown".to_string());
        registry.register_connection(&remote_addr, conn.id());
        manager.add(conn.clone());
        Self { io, conn, manager }
    }

    pub fn connection(&self) -> &Arc<TrackedConnection> {
        &self.conn
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        // Dropping `io` closes the socket; the record leaves the live set
        // exactly once because remove is idempotent.
        self.conn.close();
        self.manager.remove(self.conn.id());
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }
}
