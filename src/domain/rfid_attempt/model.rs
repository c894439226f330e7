//! RfidAttempt domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of an RFID presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    #[default]
    Scanned,
    Accepted,
    Rejected,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanned => "scanned",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Unknown values read back from storage fall back to `Scanned`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            _ => Self::Scanned,
        }
    }

    /// Authentication flag implied by this status when none is supplied.
    pub fn implied_authentication(&self) -> Option<bool> {
        match self {
            Self::Accepted => Some(true),
            Self::Rejected => Some(false),
            Self::Scanned => None,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsystem that observed the RFID presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptSource {
    #[serde(rename = "service")]
    Service,
    #[serde(rename = "browser")]
    Browser,
    #[serde(rename = "camera")]
    Camera,
    #[serde(rename = "on-demand")]
    OnDemand,
    #[serde(rename = "ocpp")]
    Ocpp,
}

impl AttemptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Browser => "browser",
            Self::Camera => "camera",
            Self::OnDemand => "on-demand",
            Self::Ocpp => "ocpp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service" => Some(Self::Service),
            "browser" => Some(Self::Browser),
            "camera" => Some(Self::Camera),
            "on-demand" => Some(Self::OnDemand),
            "ocpp" => Some(Self::Ocpp),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted RFID presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfidAttempt {
    pub id: i64,
    /// Upper-cased, trimmed tag identifier
    pub rfid: String,
    pub status: AttemptStatus,
    pub authenticated: Option<bool>,
    pub allowed: Option<bool>,
    pub source: AttemptSource,
    /// Raw triggering payload
    pub payload: Value,
    pub label_id: Option<i64>,
    pub charger_id: Option<String>,
    pub account_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub attempted_at: DateTime<Utc>,
}

/// Attempt data ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewRfidAttempt {
    pub rfid: String,
    pub status: AttemptStatus,
    pub authenticated: Option<bool>,
    pub allowed: Option<bool>,
    pub source: AttemptSource,
    pub payload: Value,
    pub label_id: Option<i64>,
    pub charger_id: Option<String>,
    pub account_id: Option<i64>,
    pub transaction_id: Option<i64>,
}

impl NewRfidAttempt {
    pub fn into_attempt(self, id: i64, attempted_at: DateTime<Utc>) -> RfidAttempt {
        RfidAttempt {
            id,
            rfid: self.rfid,
            status: self.status,
            authenticated: self.authenticated,
            allowed: self.allowed,
            source: self.source,
            payload: self.payload,
            label_id: self.label_id,
            charger_id: self.charger_id,
            account_id: self.account_id,
            transaction_id: self.transaction_id,
            attempted_at,
        }
    }
}

/// Coerce a raw `rfid` value to its canonical form.
///
/// Absent, null and `false` values normalize to an empty string; numbers use
/// their decimal text.
pub fn normalize_rfid(value: Option<&Value>) -> String {
    let raw = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    };
    raw.trim().to_uppercase()
}
