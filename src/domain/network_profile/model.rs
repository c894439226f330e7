//! NetworkProfileDeployment domain entity and its status state machine
//!
//! ```text
//! requested ──► sent ──► accepted
//!     │           ├────► rejected
//!     └───────────┴────► failed
//! ```
//!
//! `accepted`, `rejected` and `failed` are terminal. A transition out of a
//! terminal state is an orchestration bug and is reported as
//! [`DeploymentError::Terminal`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::shared::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Requested,
    Sent,
    Accepted,
    Rejected,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "sent" => Some(Self::Sent),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Failed)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Sent)
                | (Self::Requested, Self::Failed)
                | (Self::Sent, Self::Accepted)
                | (Self::Sent, Self::Rejected)
                | (Self::Sent, Self::Failed)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Deployment {id} is already {status}; no further transitions are allowed")]
    Terminal { id: i64, status: DeploymentStatus },

    #[error("Deployment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("Deployment {id} was modified concurrently (expected status {expected})")]
    Conflict { id: i64, expected: DeploymentStatus },

    #[error("Deployment {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] DomainError),
}

/// Rollout of a network profile to a charger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkProfileDeployment {
    pub id: i64,
    pub network_profile_id: i64,
    pub charger_id: String,
    pub status: DeploymentStatus,
    /// Detail from the charger's answer or the transport failure
    pub status_info: String,
    pub status_timestamp: DateTime<Utc>,
    pub requested_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// uniqueId of the SetNetworkProfile call
    pub message_id: Option<String>,
    pub response_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Deployment data ready to be inserted (always starts as `requested`)
#[derive(Debug, Clone, PartialEq)]
pub struct NewNetworkProfileDeployment {
    pub network_profile_id: i64,
    pub charger_id: String,
}

impl NewNetworkProfileDeployment {
    pub fn into_deployment(self, id: i64, now: DateTime<Utc>) -> NetworkProfileDeployment {
        NetworkProfileDeployment {
            id,
            network_profile_id: self.network_profile_id,
            charger_id: self.charger_id,
            status: DeploymentStatus::Requested,
            status_info: String::new(),
            status_timestamp: now,
            requested_at: None,
            completed_at: None,
            message_id: None,
            response_payload: None,
            created_at: now,
        }
    }
}

impl NetworkProfileDeployment {
    fn check_transition(&self, next: DeploymentStatus) -> Result<(), DeploymentError> {
        if self.status.is_terminal() {
            return Err(DeploymentError::Terminal {
                id: self.id,
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(DeploymentError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        Ok(())
    }

    /// `requested → sent`: the SetNetworkProfile call left for the charger.
    pub fn mark_sent(
        &mut self,
        message_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DeploymentError> {
        self.check_transition(DeploymentStatus::Sent)?;
        self.status = DeploymentStatus::Sent;
        self.status_timestamp = now;
        self.message_id = Some(message_id.into());
        if self.requested_at.is_none() {
            self.requested_at = Some(now);
        }
        Ok(())
    }

    /// `sent → accepted | rejected`: the charger answered.
    pub fn mark_response(
        &mut self,
        accepted: bool,
        status_info: impl Into<String>,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<(), DeploymentError> {
        let next = if accepted {
            DeploymentStatus::Accepted
        } else {
            DeploymentStatus::Rejected
        };
        self.check_transition(next)?;
        self.status = next;
        self.status_info = status_info.into();
        self.status_timestamp = now;
        self.completed_at = Some(now);
        self.response_payload = Some(payload);
        Ok(())
    }

    /// `requested | sent → failed`: transport failure or timeout.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DeploymentError> {
        self.check_transition(DeploymentStatus::Failed)?;
        self.status = DeploymentStatus::Failed;
        self.status_info = reason.into();
        self.status_timestamp = now;
        self.completed_at = Some(now);
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────
