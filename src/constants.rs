//! Central place for application-wide constants and default values.

use std::time::Duration;

/// Default application name (can be overridden in config)
pub const DEFAULT_APP_NAME: &str = "Pyre";

/// Left padding used to align log lines with those that include emoji prefixes.
/// Keep this to a fixed width matching the emoji prefix you use elsewhere.
pub const ICON_PLACEHOLDER: &str = "   "; // Three spaces for alignment

/// Port the operator WebSocket server listens on unless overridden.
pub const DEFAULT_WS_PORT: u16 = 8080;
/// Upgrade endpoint for operator UI clients.
pub const WS_PATH: &str = "/ws";

/// Canonical wire name of the agent identity header. Lookups go through
/// `http::HeaderMap`, which is case-insensitive, so the lowercase form
/// HTTP/2 and HTTP/3 deliver is matched as well.
pub const AGENT_UUID_HEADER: &str = "X-Agent-UUID";

/// Directory searched for the TLS keypair unless overridden.
pub const DEFAULT_CERTS_DIR: &str = "certs";
/// Certificate file name inside the certs directory.
pub const CERT_FILE: &str = "server.crt";
/// Private key file name inside the certs directory.
pub const KEY_FILE: &str = "server.key";

/// Deadline for draining inflight handlers on listener stop.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Kernel keep-alive probe interval for accepted TCP connections. Agents are
/// long-poll clients, so this is deliberately much longer than OS defaults.
pub const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default cap on per-agent connection history entries.
pub const DEFAULT_HISTORY_CAP: usize = 64;

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
