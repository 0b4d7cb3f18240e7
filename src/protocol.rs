// src/protocol.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// The five wire protocols a listener can speak. The numeric discriminators
/// are part of the UI command schema and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[serde(rename = "h1c")]
    H1Clear,
    #[serde(rename = "h1tls")]
    H1Tls,
    #[serde(rename = "h2c")]
    H2Clear,
    #[serde(rename = "h2tls")]
    H2Tls,
    #[serde(rename = "h3")]
    H3,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 5] = [
        ProtocolKind::H1Clear,
        ProtocolKind::H1Tls,
        ProtocolKind::H2Clear,
        ProtocolKind::H2Tls,
        ProtocolKind::H3,
    ];

    /// Display name shown in the operator UI and in logs.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProtocolKind::H1Clear => "HTTP/1.1 Clear",
            ProtocolKind::H1Tls => "HTTP/1.1 TLS",
            ProtocolKind::H2Clear => "HTTP/2 Clear",
            ProtocolKind::H2Tls => "HTTP/2 TLS",
            ProtocolKind::H3 => "HTTP/3",
        }
    }

    /// Stable numeric tag used by the UI command schema (1..=5).
    pub fn discriminant(&self) -> u8 {
        match self {
            ProtocolKind::H1Clear => 1,
            ProtocolKind::H1Tls => 2,
            ProtocolKind::H2Clear => 3,
            ProtocolKind::H2Tls => 4,
            ProtocolKind::H3 => 5,
        }
    }

    /// Inverse of [`discriminant`](Self::discriminant). Unknown tags from the
    /// UI are a hard error, never a silent default.
    pub fn from_discriminant(value: i64) -> Result<Self, Error> {
        match value {
            1 => Ok(ProtocolKind::H1Clear),
            2 => Ok(ProtocolKind::H1Tls),
            3 => Ok(ProtocolKind::H2Clear),
            4 => Ok(ProtocolKind::H2Tls),
            5 => Ok(ProtocolKind::H3),
            other => Err(Error::InvalidProtocol(other)),
        }
    }

    /// True for the variants that require a loaded TLS keypair.
    pub fn requires_tls(&self) -> bool {
        matches!(
            self,
            ProtocolKind::H1Tls | ProtocolKind::H2Tls | ProtocolKind::H3
        )
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
