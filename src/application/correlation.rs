//! Call correlation engine
//!
//! Waits for the `CallResult` / `CallError` answering one outstanding
//! `Call`, while inbound `Call` frames that arrive in the meantime are
//! handed to a caller-supplied handler so the peer is never starved.
//!
//! ```text
//!            ┌───────────── recv() ◄────────────┐
//!            ▼                                  │
//!   WAITING ──► decode error ───── discard ─────┤
//!      │    ──► Call ──────────── on_call() ────┤
//!      │    ──► other id / type ─ discard ──────┘
//!      ├──► CallResult(expected) ─► DONE (Ok payload)
//!      └──► CallError(expected) ──► DONE (Err Remote)
//! ```
//!
//! The only suspension point is [`FrameSource::recv`]. There is no timeout
//! here. Callers bound the wait with [`DeadlineSource`], which expires only
//! between frames, so an inbound call that was already taken off the socket
//! is always answered.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::shared::ocpp_frame::OcppFrame;

/// Ordered stream of inbound websocket text for one connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound message, or `None` once the connection is closed.
    async fn recv(&mut self) -> Option<String>;
}

/// Reads from `inner` until `deadline`, then reports closure and remembers
/// that it expired.
pub struct DeadlineSource<'a, S: ?Sized> {
    inner: &'a mut S,
    deadline: Instant,
    expired: bool,
}

impl<'a, S: FrameSource + ?Sized> DeadlineSource<'a, S> {
    pub fn new(inner: &'a mut S, deadline: Instant) -> Self {
        Self {
            inner,
            deadline,
            expired: false,
        }
    }

    /// `true` once a read ran into the deadline.
    pub fn expired(&self) -> bool {
        self.expired
    }
}

#[async_trait]
impl<'a, S> FrameSource for DeadlineSource<'a, S>
where
    S: FrameSource + ?Sized,
{
    async fn recv(&mut self) -> Option<String> {
        match tokio::time::timeout_at(self.deadline, self.inner.recv()).await {
            Ok(text) => text,
            Err(_) => {
                self.expired = true;
                None
            }
        }
    }
}

/// Services inbound `Call` frames that arrive while a response is awaited.
#[async_trait]
pub trait InboundCallHandler: Send {
    /// Returns `true` when the call was handled.
    async fn on_call(&mut self, frame: &OcppFrame) -> bool;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The peer answered the awaited call with a `CallError` frame.
    #[error("{code}: {description}")]
    Remote {
        code: String,
        description: String,
        details: Value,
    },

    #[error("Connection closed while awaiting response to {0}")]
    ConnectionClosed(String),
}

/// Wait for the result of the call identified by `expected_id`.
///
/// Malformed frames and frames for other ids are discarded. Inbound `Call`
/// frames go to `on_call` when supplied and are otherwise ignored.
pub async fn await_result<S>(
    source: &mut S,
    expected_id: &str,
    mut on_call: Option<&mut dyn InboundCallHandler>,
) -> Result<Value, CallError>
where
    S: FrameSource + ?Sized,
{
    loop {
        let Some(text) = source.recv().await else {
            return Err(CallError::ConnectionClosed(expected_id.to_string()));
        };

        let frame = match OcppFrame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(expected_id, error = %e, "Discarding malformed frame");
                metrics::counter!("ocpp_frames_discarded_total", "reason" => "decode")
                    .increment(1);
                continue;
            }
        };

        match frame {
            OcppFrame::Call { .. } => {
                let handled = match on_call.as_deref_mut() {
                    Some(handler) => handler.on_call(&frame).await,
                    None => false,
                };
                if !handled {
                    debug!(
                        expected_id,
                        message_id = frame.unique_id(),
                        "Inbound call ignored while awaiting response"
                    );
                }
            }
            OcppFrame::CallResult { unique_id, payload } if unique_id == expected_id => {
                return Ok(match payload {
                    Value::Null => Value::Object(Map::new()),
                    other => other,
                });
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } if unique_id == expected_id => {
                return Err(CallError::Remote {
                    code: error_code,
                    description: error_description,
                    details: error_details,
                });
            }
            other => {
                debug!(
                    expected_id,
                    message_id = other.unique_id(),
                    "Discarding unrelated response"
                );
                metrics::counter!("ocpp_frames_discarded_total", "reason" => "unmatched")
                    .increment(1);
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
