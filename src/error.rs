use thiserror::Error;

/// Crate-wide error type. Locally-recoverable errors stay local; anything
/// surfaced to an operator command produces exactly one targeted reply.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing value in configuration or a command payload.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Numeric protocol discriminator outside 1..=5.
    #[error("invalid protocol type: {0}")]
    InvalidProtocol(i64),

    /// The port could not be bound (in use, interface unavailable, ...).
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// A TLS or HTTP/3 listener was requested but no keypair loaded.
    #[error("TLS unavailable: certificates were not loaded")]
    TlsUnavailable,

    /// Malformed frame or unknown action on the control channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Per-request or per-connection I/O failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The 10s graceful-stop deadline expired; the caller proceeds anyway.
    #[error("graceful stop of listener {0} exceeded its deadline")]
    ShutdownExceeded(String),

    /// Lookup by ID came up empty.
    #[error("no listener found with ID {0}")]
    ListenerNotFound(String),

    /// `add` was called with an ID the manager already holds.
    #[error("listener with ID {0} already exists")]
    DuplicateListener(String),

    /// Operation on a listener whose transport is not bound.
    #[error("server not started")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
