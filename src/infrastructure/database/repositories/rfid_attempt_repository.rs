//! SeaORM implementation of RfidAttemptRepository

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::debug;

use super::db_err;
use crate::domain::{
    AttemptSource, AttemptStatus, DomainError, DomainResult, NewRfidAttempt, RfidAttempt,
    RfidAttemptRepository,
};
use crate::infrastructure::database::entities::rfid_attempt;

pub struct SeaOrmRfidAttemptRepository {
    db: DatabaseConnection,
}

impl SeaOrmRfidAttemptRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: rfid_attempt::Model) -> DomainResult<RfidAttempt> {
    let source = AttemptSource::parse(&m.source)
        .ok_or_else(|| DomainError::Storage(format!("Unknown attempt source: {}", m.source)))?;
    Ok(RfidAttempt {
        id: m.id,
        rfid: m.rfid,
        status: AttemptStatus::from_str(&m.status),
        authenticated: m.authenticated,
        allowed: m.allowed,
        source,
        payload: m.payload,
        label_id: m.label_id,
        charger_id: m.charger_id,
        account_id: m.account_id,
        transaction_id: m.transaction_id,
        attempted_at: m.attempted_at,
    })
}

fn models_to_domain(models: Vec<rfid_attempt::Model>) -> DomainResult<Vec<RfidAttempt>> {
    models.into_iter().map(model_to_domain).collect()
}

// ── RfidAttemptRepository impl ──────────────────────────────────

#[async_trait]
impl RfidAttemptRepository for SeaOrmRfidAttemptRepository {
    async fn insert(&self, a: NewRfidAttempt) -> DomainResult<RfidAttempt> {
        debug!(rfid = a.rfid.as_str(), source = %a.source, "Saving RFID attempt");

        let model = rfid_attempt::ActiveModel {
            id: NotSet,
            rfid: Set(a.rfid),
            status: Set(a.status.as_str().to_string()),
            authenticated: Set(a.authenticated),
            allowed: Set(a.allowed),
            source: Set(a.source.as_str().to_string()),
            payload: Set(a.payload),
            label_id: Set(a.label_id),
            charger_id: Set(a.charger_id),
            account_id: Set(a.account_id),
            transaction_id: Set(a.transaction_id),
            attempted_at: Set(Utc::now()),
        };
        let saved = model.insert(&self.db).await.map_err(db_err)?;
        model_to_domain(saved)
    }

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<RfidAttempt>> {
        let model = rfid_attempt::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        model.map(model_to_domain).transpose()
    }

    async fn list_recent(&self, limit: u64) -> DomainResult<Vec<RfidAttempt>> {
        let models = rfid_attempt::Entity::find()
            .order_by_desc(rfid_attempt::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models_to_domain(models)
    }

    async fn list_for_rfid(&self, rfid: &str) -> DomainResult<Vec<RfidAttempt>> {
        let models = rfid_attempt::Entity::find()
            .filter(rfid_attempt::Column::Rfid.eq(rfid))
            .order_by_desc(rfid_attempt::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models_to_domain(models)
    }
}
