//! Outbound commands: CSMS → charge point calls
//!
//! ## Architecture
//!
//! ```text
//! Deployer / relay / consumption task
//!          │
//!          ▼
//!   CommandSender ──► SessionRegistry ──► connection task queue
//!          ▲                                      │
//!          │                           send CALL, await_result()
//!          └──────── oneshot reply ◄──────────────┘
//! ```
//!
//! The connection task owns the socket, so it is the only place frames are
//! written and correlated. Callers get a [`PendingCommand`] back and wait on
//! its channels.

pub mod network_profile;
pub mod trigger_message;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use super::correlation::CallError;
use super::session::SharedSessionRegistry;

pub use network_profile::{DeploymentOutcome, NetworkProfileDeployer};

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Charge point not connected: {0}")]
    NotConnected(String),

    #[error("Failed to send: {0}")]
    SendFailed(String),

    #[error("Response timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },

    #[error("Connection closed before the command completed")]
    ConnectionClosed,
}

impl From<CallError> for CommandError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Remote {
                code, description, ..
            } => Self::CallError { code, description },
            CallError::ConnectionClosed(_) => Self::ConnectionClosed,
        }
    }
}

/// Who queued a command; decides bookkeeping in the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    Api,
    /// Periodic meter-value trigger
    Consumption,
    /// Call relayed from a forwarding peer
    Relay,
}

impl CommandOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Consumption => "consumption",
            Self::Relay => "relay",
        }
    }
}

/// A call queued for execution by a connection task
#[derive(Debug)]
pub struct OutboundCommand {
    pub message_id: String,
    pub action: String,
    pub payload: Value,
    pub origin: CommandOrigin,
    sent: Option<oneshot::Sender<()>>,
    reply: Option<oneshot::Sender<Result<Value, CommandError>>>,
}

impl OutboundCommand {
    pub fn new(
        message_id: impl Into<String>,
        action: impl Into<String>,
        payload: Value,
        origin: CommandOrigin,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            action: action.into(),
            payload,
            origin,
            sent: None,
            reply: None,
        }
    }

    pub fn api(message_id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self::new(message_id, action, payload, CommandOrigin::Api)
    }

    /// Attach a reply channel for the charger's answer.
    pub fn with_reply(mut self) -> (Self, oneshot::Receiver<Result<Value, CommandError>>) {
        let (tx, rx) = oneshot::channel();
        self.reply = Some(tx);
        (self, rx)
    }

    /// Attach a channel that fires once the CALL frame has been written.
    pub fn with_sent_notice(mut self) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        self.sent = Some(tx);
        (self, rx)
    }

    pub fn notify_sent(&mut self) {
        if let Some(tx) = self.sent.take() {
            let _ = tx.send(());
        }
    }

    /// Deliver the outcome. A caller that stopped waiting is ignored.
    pub fn complete(mut self, result: Result<Value, CommandError>) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(result);
        }
    }
}

/// Handle to a submitted command
pub struct PendingCommand {
    pub message_id: String,
    sent: oneshot::Receiver<()>,
    response: oneshot::Receiver<Result<Value, CommandError>>,
    timeout: Duration,
}

impl PendingCommand {
    /// Resolves once the CALL frame left for the charger.
    pub async fn transmitted(&mut self) -> Result<(), CommandError> {
        match timeout(self.timeout, &mut self.sent).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CommandError::ConnectionClosed),
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// The charger's answer, bounded by the command timeout.
    pub async fn response(self) -> Result<Value, CommandError> {
        match timeout(self.timeout, self.response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CommandError::ConnectionClosed),
            Err(_) => Err(CommandError::Timeout),
        }
    }
}

/// Command sender for sending OCPP commands to charge points
pub struct CommandSender {
    session_registry: SharedSessionRegistry,
    timeout: Duration,
}

pub type SharedCommandSender = Arc<CommandSender>;

impl CommandSender {
    pub fn new(session_registry: SharedSessionRegistry, timeout: Duration) -> Self {
        Self {
            session_registry,
            timeout,
        }
    }

    pub fn next_message_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Queue `action` on the charger's connection without waiting.
    pub fn submit(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<PendingCommand, CommandError> {
        let message_id = Self::next_message_id();
        let (command, sent) =
            OutboundCommand::api(message_id.clone(), action, payload).with_sent_notice();
        let (command, response) = command.with_reply();

        info!(
            charge_point_id,
            action,
            message_id = message_id.as_str(),
            "Queueing command"
        );
        self.session_registry.submit(charge_point_id, command)?;

        Ok(PendingCommand {
            message_id,
            sent,
            response,
            timeout: self.timeout,
        })
    }

    /// Send an OCPP command and wait for the charger's answer payload.
    pub async fn send_command(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let pending = self.submit(charge_point_id, action, payload)?;
        let message_id = pending.message_id.clone();
        let result = pending.response().await;
        if let Err(e) = &result {
            warn!(
                charge_point_id,
                action,
                message_id = message_id.as_str(),
                error = %e,
                "Command failed"
            );
        }
        result
    }
}

pub fn create_command_sender(
    session_registry: SharedSessionRegistry,
    timeout: Duration,
) -> SharedCommandSender {
    Arc::new(CommandSender::new(session_registry, timeout))
}

// ── Tests ──────────────────────────────────────────────────────
