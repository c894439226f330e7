//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport envelope, which is
//! identical across OCPP versions:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! Decoding never panics; every rejected input maps to a [`DecodeError`]
//! variant so callers can log and discard the frame.

use serde_json::{Map, Value};
use thiserror::Error;

// ── Message-type constants ─────────────────────────────────────

pub const MSG_TYPE_CALL: u64 = 2;
pub const MSG_TYPE_CALL_RESULT: u64 = 3;
pub const MSG_TYPE_CALL_ERROR: u64 = 4;

/// Error code reported when a CallError frame carries none.
pub const DEFAULT_ERROR_CODE: &str = "UnknownError";

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame (version-agnostic transport envelope).
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Decoding ───────────────────────────────────────────

    /// Decode a text websocket message.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a binary websocket message carrying UTF-8 JSON.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build a frame from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Array(arr) = value else {
            return Err(DecodeError::NotAnArray);
        };

        let Some(first) = arr.first() else {
            return Err(DecodeError::EmptyArray);
        };
        let msg_type = first.as_u64().ok_or(DecodeError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::decode_call(arr),
            MSG_TYPE_CALL_RESULT => Self::decode_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::decode_call_error(arr),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }

    fn decode_call(arr: Vec<Value>) -> Result<Self, DecodeError> {
        if arr.len() < 4 {
            return Err(DecodeError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }
        let mut fields = arr.into_iter().skip(1);
        let unique_id = unique_id_of(fields.next())?;
        let action = match fields.next() {
            Some(Value::String(action)) => action,
            _ => return Err(DecodeError::FieldTypeMismatch("action must be a string")),
        };
        let payload = object_or_empty(fields.next());

        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn decode_call_result(arr: Vec<Value>) -> Result<Self, DecodeError> {
        if arr.len() < 2 {
            return Err(DecodeError::MissingFields {
                expected: 2,
                got: arr.len(),
            });
        }
        let mut fields = arr.into_iter().skip(1);
        let unique_id = unique_id_of(fields.next())?;
        let payload = object_or_empty(fields.next());

        Ok(Self::CallResult { unique_id, payload })
    }

    fn decode_call_error(arr: Vec<Value>) -> Result<Self, DecodeError> {
        if arr.len() < 2 {
            return Err(DecodeError::MissingFields {
                expected: 2,
                got: arr.len(),
            });
        }
        let mut fields = arr.into_iter().skip(1);
        let unique_id = unique_id_of(fields.next())?;
        let error_code = match fields.next() {
            Some(Value::String(code)) if !code.is_empty() => code,
            _ => DEFAULT_ERROR_CODE.to_string(),
        };
        let error_description = match fields.next() {
            Some(Value::String(description)) => description,
            _ => String::new(),
        };
        let error_details = object_or_empty(fields.next());

        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    // ── Encoding ───────────────────────────────────────────

    /// Convert this frame into its JSON array representation.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::from(MSG_TYPE_CALL),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::from(MSG_TYPE_CALL_RESULT),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::from(MSG_TYPE_CALL_ERROR),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        }
    }

    /// Serialize this frame to its wire text.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    // ── Constructors ───────────────────────────────────────

    pub fn call(unique_id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self::Call {
            unique_id: unique_id.into(),
            action: action.into(),
            payload,
        }
    }

    pub fn result(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Map::new()),
        }
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Action name for `Call` frames.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Call { action, .. } => Some(action),
            _ => None,
        }
    }

    pub fn message_type(&self) -> u64 {
        match self {
            Self::Call { .. } => MSG_TYPE_CALL,
            Self::CallResult { .. } => MSG_TYPE_CALL_RESULT,
            Self::CallError { .. } => MSG_TYPE_CALL_ERROR,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    pub fn is_call_result(&self) -> bool {
        matches!(self, Self::CallResult { .. })
    }

    pub fn is_call_error(&self) -> bool {
        matches!(self, Self::CallError { .. })
    }
}

fn unique_id_of(value: Option<Value>) -> Result<String, DecodeError> {
    match value {
        Some(Value::String(id)) => Ok(id),
        _ => Err(DecodeError::FieldTypeMismatch("uniqueId must be a string")),
    }
}

/// Missing or null payloads decode as an empty object.
fn object_or_empty(value: Option<Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v,
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when decoding an OCPP-J frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message is not a JSON array")]
    NotAnArray,
    #[error("Empty OCPP message array")]
    EmptyArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}
