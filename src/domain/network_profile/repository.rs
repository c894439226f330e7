//! NetworkProfileDeployment repository interface

use async_trait::async_trait;

use super::model::{DeploymentStatus, NetworkProfileDeployment, NewNetworkProfileDeployment};
use crate::shared::DomainResult;

#[async_trait]
pub trait NetworkProfileDeploymentRepository: Send + Sync {
    async fn insert(
        &self,
        deployment: NewNetworkProfileDeployment,
    ) -> DomainResult<NetworkProfileDeployment>;

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<NetworkProfileDeployment>>;

    /// All deployments for a charger, most recent first
    async fn list_for_charger(&self, charger_id: &str)
        -> DomainResult<Vec<NetworkProfileDeployment>>;

    /// Persist `deployment` only if the stored row still has status
    /// `expected`. Returns `false` when another writer got there first.
    async fn update_if_status(
        &self,
        deployment: &NetworkProfileDeployment,
        expected: DeploymentStatus,
    ) -> DomainResult<bool>;
}
