//! # Pyre Core Library
//!
//! Server-side listener-and-connection fabric for long-lived agents. One
//! process runs many HTTP listeners, each bound to its own port and speaking
//! one of five wire protocols (HTTP/1.1 clear, HTTP/1.1 TLS, HTTP/2 clear,
//! HTTP/2 TLS, HTTP/3 over QUIC). Every accepted transport connection is
//! tracked as a first-class entity, and once an agent identifies itself via
//! the `X-Agent-UUID` request header, later transport connections correlate
//! back to the same logical agent. A WebSocket control channel exposes the
//! inventory to operator UIs and accepts commands.
//!
//! ## Design Principles
//! * Async-first: all I/O paths are non-blocking (Tokio).
//! * Tracking interposes at the transport layer, beneath TLS and HTTP
//!   framing, so one record is counted per connection.
//! * Late-bound process-wide state (registry, hub, service bridge) is wired
//!   with explicit dependency injection at startup.
//! * Event-driven instrumentation (JSON line audit log + console).
//!
//! ## Key Modules
//! * `protocol` – The closed set of five wire protocols.
//! * `registry` – Remote-address to connection-ID to agent-UUID mapping.
//! * `connections` – Tracked records, the live-set manager, transport glue.
//! * `listeners` – Per-protocol listeners, the abstract factory, inventory.
//! * `service` – The orchestration facade the control channel drives.
//! * `hub` – WebSocket push channel and command dispatcher.
//! * `security` – TLS keypair loading.
//! * `events` – Structured logging/events dispatcher.

pub mod config;
pub mod connections;
pub mod constants;
pub mod error;
pub mod events;
pub mod hub;
pub mod listeners;
pub mod prelude; // curated stable-intent re-exports
pub mod protocol;
pub mod registry;
pub mod router;
pub mod security;
pub mod service;
