//! SeaORM implementation of NetworkProfileDeploymentRepository

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use super::db_err;
use crate::domain::{
    DeploymentStatus, DomainError, DomainResult, NetworkProfileDeployment,
    NetworkProfileDeploymentRepository, NewNetworkProfileDeployment,
};
use crate::infrastructure::database::entities::network_profile_deployment;

pub struct SeaOrmDeploymentRepository {
    db: DatabaseConnection,
}

impl SeaOrmDeploymentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: network_profile_deployment::Model) -> DomainResult<NetworkProfileDeployment> {
    let status = DeploymentStatus::parse(&m.status)
        .ok_or_else(|| DomainError::Storage(format!("Unknown deployment status: {}", m.status)))?;
    Ok(NetworkProfileDeployment {
        id: m.id,
        network_profile_id: m.network_profile_id,
        charger_id: m.charger_id,
        status,
        status_info: m.status_info,
        status_timestamp: m.status_timestamp,
        requested_at: m.requested_at,
        completed_at: m.completed_at,
        message_id: m.message_id,
        response_payload: m.response_payload,
        created_at: m.created_at,
    })
}

/// Every mutable column of `d`; the id is left to the query filter.
fn mutable_columns(d: &NetworkProfileDeployment) -> network_profile_deployment::ActiveModel {
    network_profile_deployment::ActiveModel {
        id: NotSet,
        network_profile_id: NotSet,
        charger_id: NotSet,
        status: Set(d.status.as_str().to_string()),
        status_info: Set(d.status_info.clone()),
        status_timestamp: Set(d.status_timestamp),
        requested_at: Set(d.requested_at),
        completed_at: Set(d.completed_at),
        message_id: Set(d.message_id.clone()),
        response_payload: Set(d.response_payload.clone()),
        created_at: NotSet,
    }
}

// ── NetworkProfileDeploymentRepository impl ─────────────────────

#[async_trait]
impl NetworkProfileDeploymentRepository for SeaOrmDeploymentRepository {
    async fn insert(
        &self,
        deployment: NewNetworkProfileDeployment,
    ) -> DomainResult<NetworkProfileDeployment> {
        debug!(
            charger_id = deployment.charger_id.as_str(),
            network_profile_id = deployment.network_profile_id,
            "Creating network profile deployment"
        );
        let now = Utc::now();
        let model = network_profile_deployment::ActiveModel {
            id: NotSet,
            network_profile_id: Set(deployment.network_profile_id),
            charger_id: Set(deployment.charger_id),
            status: Set(DeploymentStatus::Requested.as_str().to_string()),
            status_info: Set(String::new()),
            status_timestamp: Set(now),
            requested_at: Set(None),
            completed_at: Set(None),
            message_id: Set(None),
            response_payload: Set(None),
            created_at: Set(now),
        };
        let saved = model.insert(&self.db).await.map_err(db_err)?;
        model_to_domain(saved)
    }

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<NetworkProfileDeployment>> {
        let model = network_profile_deployment::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn list_for_charger(
        &self,
        charger_id: &str,
    ) -> DomainResult<Vec<NetworkProfileDeployment>> {
        let models = network_profile_deployment::Entity::find()
            .filter(network_profile_deployment::Column::ChargerId.eq(charger_id))
            .order_by_desc(network_profile_deployment::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn update_if_status(
        &self,
        deployment: &NetworkProfileDeployment,
        expected: DeploymentStatus,
    ) -> DomainResult<bool> {
        let result = network_profile_deployment::Entity::update_many()
            .set(mutable_columns(deployment))
            .filter(network_profile_deployment::Column::Id.eq(deployment.id))
            .filter(network_profile_deployment::Column::Status.eq(expected.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 1 {
            return Ok(true);
        }
        match self.find_by_id(deployment.id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::NotFound {
                entity: "NetworkProfileDeployment",
                field: "id",
                value: deployment.id.to_string(),
            }),
        }
    }
}
