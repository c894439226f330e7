//! SetNetworkProfile rollout
//!
//! Drives one deployment through its state machine from the outcome of the
//! SetNetworkProfile call.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::{CommandError, SharedCommandSender};
use crate::application::services::DeploymentTracker;
use crate::domain::{DeploymentError, NetworkProfileDeployment};

pub const ACTION: &str = "SetNetworkProfile";

/// Final state of a rollout plus the command error, if the call failed.
#[derive(Debug)]
pub struct DeploymentOutcome {
    pub deployment: NetworkProfileDeployment,
    pub error: Option<CommandError>,
}

pub struct NetworkProfileDeployer {
    sender: SharedCommandSender,
    tracker: Arc<DeploymentTracker>,
}

impl NetworkProfileDeployer {
    pub fn new(sender: SharedCommandSender, tracker: Arc<DeploymentTracker>) -> Self {
        Self { sender, tracker }
    }

    pub async fn deploy(
        &self,
        charger_id: &str,
        network_profile_id: i64,
        configuration_slot: i32,
        connection_data: Value,
    ) -> Result<DeploymentOutcome, DeploymentError> {
        let deployment = self.tracker.create(network_profile_id, charger_id).await?;
        let payload = json!({
            "configurationSlot": configuration_slot,
            "connectionData": connection_data,
        });

        let mut pending = match self.sender.submit(charger_id, ACTION, payload) {
            Ok(pending) => pending,
            Err(e) => return self.fail(deployment.id, e).await,
        };
        if let Err(e) = pending.transmitted().await {
            return self.fail(deployment.id, e).await;
        }
        self.tracker
            .mark_sent(deployment.id, &pending.message_id)
            .await?;

        let response = match pending.response().await {
            Ok(response) => response,
            Err(e) => return self.fail(deployment.id, e).await,
        };

        let status = response
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let accepted = status == "Accepted";
        let deployment = self
            .tracker
            .record_response(deployment.id, accepted, &status, response)
            .await?;
        info!(
            deployment_id = deployment.id,
            charger_id,
            status = status.as_str(),
            "Network profile deployment answered"
        );
        Ok(DeploymentOutcome {
            deployment,
            error: None,
        })
    }

    async fn fail(
        &self,
        id: i64,
        error: CommandError,
    ) -> Result<DeploymentOutcome, DeploymentError> {
        warn!(deployment_id = id, error = %error, "Network profile deployment failed");
        let deployment = self.tracker.mark_failed(id, &error.to_string()).await?;
        Ok(DeploymentOutcome {
            deployment,
            error: Some(error),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::tests::spawn_fake_charger;
    use crate::application::commands::CommandSender;
    use crate::application::session::SessionRegistry;
    use crate::domain::DeploymentStatus;
    use crate::infrastructure::storage::InMemoryDeploymentRepository;
    use std::time::Duration;

    fn deployer(registry: Arc<SessionRegistry>, timeout: Duration) -> NetworkProfileDeployer {
        let sender = Arc::new(CommandSender::new(registry, timeout));
        let tracker = Arc::new(DeploymentTracker::new(Arc::new(
            InMemoryDeploymentRepository::new(),
        )));
        NetworkProfileDeployer::new(sender, tracker)
    }

    #[tokio::test]
    async fn accepted_rollout() {
        let registry = SessionRegistry::shared();
        let charger = spawn_fake_charger(&registry, "CP001", |_, _| {
            Some(Ok(json!({"status": "Accepted"})))
        });
        let deployer = deployer(registry.clone(), Duration::from_secs(1));

        let outcome = deployer
            .deploy("CP001", 3, 1, json!({"ocppVersion": "OCPP16"}))
            .await
            .unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.deployment.status, DeploymentStatus::Accepted);
        assert_eq!(outcome.deployment.status_info, "Accepted");
        assert!(outcome.deployment.message_id.is_some());

        registry.unregister("CP001", 1);
        let seen = charger.await.unwrap();
        assert_eq!(seen[0].0, "SetNetworkProfile");
        assert_eq!(seen[0].1["configurationSlot"], 1);
    }

    #[tokio::test]
    async fn rejected_status_is_recorded() {
        let registry = SessionRegistry::shared();
        spawn_fake_charger(&registry, "CP001", |_, _| {
            Some(Ok(json!({"status": "RebootRequired"})))
        });
        let outcome = deployer(registry, Duration::from_secs(1))
            .deploy("CP001", 3, 1, json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.deployment.status, DeploymentStatus::Rejected);
        assert_eq!(outcome.deployment.status_info, "RebootRequired");
    }

    #[tokio::test]
    async fn offline_charger_fails_from_requested() {
        let outcome = deployer(SessionRegistry::shared(), Duration::from_secs(1))
            .deploy("CP404", 3, 1, json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.deployment.status, DeploymentStatus::Failed);
        assert!(outcome.deployment.requested_at.is_none());
        assert!(matches!(outcome.error, Some(CommandError::NotConnected(_))));
    }

    #[tokio::test]
    async fn call_error_fails_after_send() {
        let registry = SessionRegistry::shared();
        spawn_fake_charger(&registry, "CP001", |_, _| {
            Some(Err(CommandError::CallError {
                code: "NotSupported".into(),
                description: "no slots".into(),
            }))
        });
        let outcome = deployer(registry, Duration::from_secs(1))
            .deploy("CP001", 3, 1, json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.deployment.status, DeploymentStatus::Failed);
        assert!(outcome.deployment.requested_at.is_some());
        assert!(outcome.deployment.status_info.contains("NotSupported"));
    }
}
