//! OCPP protocol version
//!
//! Identifies a protocol both on the wire (websocket subprotocol) and in
//! the protocol registry (slug).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OCPP protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
    /// OCPP 2.0.1
    V201,
    /// OCPP 2.1
    V21,
}

impl OcppVersion {
    /// All known versions, ordered from newest to oldest.
    pub const ALL: &'static [OcppVersion] = &[Self::V21, Self::V201, Self::V16];

    /// WebSocket subprotocol identifier (`Sec-WebSocket-Protocol`).
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp1.6",
            Self::V201 => "ocpp2.0.1",
            Self::V21 => "ocpp2.1",
        }
    }

    pub fn from_subprotocol(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.subprotocol() == s.trim())
    }

    /// Registry key for this protocol (`ocpp16`, `ocpp201`, `ocpp21`).
    pub fn slug(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp16",
            Self::V201 => "ocpp201",
            Self::V21 => "ocpp21",
        }
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.slug() == s.trim())
    }

    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V16 => "1.6",
            Self::V201 => "2.0.1",
            Self::V21 => "2.1",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}
