//! RfidAttempt entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One RFID presentation. Rows are append-only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rfid_attempts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Normalized tag (trimmed, upper-case)
    pub rfid: String,

    /// scanned, accepted, rejected
    pub status: String,

    pub authenticated: Option<bool>,
    pub allowed: Option<bool>,

    /// service, browser, camera, on-demand, ocpp
    pub source: String,

    /// Triggering payload
    pub payload: Json,

    pub label_id: Option<i64>,
    pub charger_id: Option<String>,
    pub account_id: Option<i64>,
    pub transaction_id: Option<i64>,

    pub attempted_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
