//! Network profile deployment tracker
//!
//! Every transition loads the row, applies the state machine and writes it
//! back with a compare-and-swap on the previous status.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{
    DeploymentError, NetworkProfileDeployment, NetworkProfileDeploymentRepository,
    NewNetworkProfileDeployment,
};

pub struct DeploymentTracker {
    repo: Arc<dyn NetworkProfileDeploymentRepository>,
}

impl DeploymentTracker {
    pub fn new(repo: Arc<dyn NetworkProfileDeploymentRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        network_profile_id: i64,
        charger_id: &str,
    ) -> Result<NetworkProfileDeployment, DeploymentError> {
        let deployment = self
            .repo
            .insert(NewNetworkProfileDeployment {
                network_profile_id,
                charger_id: charger_id.to_string(),
            })
            .await?;
        info!(
            deployment_id = deployment.id,
            network_profile_id,
            charger_id,
            "Network profile deployment requested"
        );
        Ok(deployment)
    }

    pub async fn get(&self, id: i64) -> Result<NetworkProfileDeployment, DeploymentError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(DeploymentError::NotFound(id))
    }

    pub async fn list_for_charger(
        &self,
        charger_id: &str,
    ) -> Result<Vec<NetworkProfileDeployment>, DeploymentError> {
        Ok(self.repo.list_for_charger(charger_id).await?)
    }

    pub async fn mark_sent(
        &self,
        id: i64,
        message_id: &str,
    ) -> Result<NetworkProfileDeployment, DeploymentError> {
        self.transition(id, |d| d.mark_sent(message_id, Utc::now()))
            .await
    }

    /// Record the charger's answer; `accepted` selects the terminal state.
    pub async fn record_response(
        &self,
        id: i64,
        accepted: bool,
        status_info: &str,
        payload: Value,
    ) -> Result<NetworkProfileDeployment, DeploymentError> {
        self.transition(id, |d| d.mark_response(accepted, status_info, payload, Utc::now()))
            .await
    }

    pub async fn mark_failed(
        &self,
        id: i64,
        reason: &str,
    ) -> Result<NetworkProfileDeployment, DeploymentError> {
        self.transition(id, |d| d.mark_failed(reason, Utc::now()))
            .await
    }

    async fn transition<F>(
        &self,
        id: i64,
        apply: F,
    ) -> Result<NetworkProfileDeployment, DeploymentError>
    where
        F: FnOnce(&mut NetworkProfileDeployment) -> Result<(), DeploymentError>,
    {
        let mut deployment = self.get(id).await?;
        let expected = deployment.status;

        if let Err(e) = apply(&mut deployment) {
            warn!(deployment_id = id, status = %expected, error = %e, "Rejected deployment transition");
            return Err(e);
        }

        if !self.repo.update_if_status(&deployment, expected).await? {
            warn!(deployment_id = id, expected = %expected, "Deployment changed concurrently");
            return Err(DeploymentError::Conflict { id, expected });
        }

        info!(
            deployment_id = id,
            from = %expected,
            to = %deployment.status,
            "Deployment status updated"
        );
        Ok(deployment)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeploymentStatus;
    use crate::infrastructure::storage::InMemoryDeploymentRepository;
    use serde_json::json;

    fn tracker() -> DeploymentTracker {
        DeploymentTracker::new(Arc::new(InMemoryDeploymentRepository::new()))
    }

    #[tokio::test]
    async fn full_rollout_is_persisted() {
        let tracker = tracker();
        let d = tracker.create(5, "CP001").await.unwrap();
        assert_eq!(d.status, DeploymentStatus::Requested);

        tracker.mark_sent(d.id, "msg-1").await.unwrap();
        let done = tracker
            .record_response(d.id, true, "Accepted", json!({"status": "Accepted"}))
            .await
            .unwrap();
        assert_eq!(done.status, DeploymentStatus::Accepted);

        let stored = tracker.get(d.id).await.unwrap();
        assert_eq!(stored, done);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.message_id.as_deref(), Some("msg-1"));
        assert_eq!(tracker.list_for_charger("CP001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_deployment_rejects_mutation() {
        let tracker = tracker();
        let d = tracker.create(5, "CP001").await.unwrap();
        tracker.mark_sent(d.id, "msg-1").await.unwrap();
        tracker
            .record_response(d.id, false, "Rejected", json!({"status": "Rejected"}))
            .await
            .unwrap();

        let err = tracker.mark_failed(d.id, "late timeout").await.unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::Terminal {
                status: DeploymentStatus::Rejected,
                ..
            }
        ));
        assert_eq!(tracker.get(d.id).await.unwrap().status, DeploymentStatus::Rejected);
    }

    #[tokio::test]
    async fn response_before_send_is_invalid() {
        let tracker = tracker();
        let d = tracker.create(5, "CP001").await.unwrap();
        let err = tracker
            .record_response(d.id, true, "Accepted", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn transmission_failure_from_requested() {
        let tracker = tracker();
        let d = tracker.create(5, "CP001").await.unwrap();
        let failed = tracker.mark_failed(d.id, "not connected").await.unwrap();
        assert_eq!(failed.status, DeploymentStatus::Failed);
        assert_eq!(failed.status_info, "not connected");
    }

    #[tokio::test]
    async fn unknown_deployment() {
        assert!(matches!(
            tracker().mark_sent(99, "m").await,
            Err(DeploymentError::NotFound(99))
        ));
    }
}
