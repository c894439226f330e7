//! NetworkProfileDeployment entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "network_profile_deployments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub network_profile_id: i64,
    pub charger_id: String,

    /// requested, sent, accepted, rejected, failed
    pub status: String,
    pub status_info: String,
    pub status_timestamp: DateTimeUtc,

    pub requested_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,

    /// uniqueId of the SetNetworkProfile call
    pub message_id: Option<String>,

    /// Charger response to the SetNetworkProfile call
    pub response_payload: Option<Json>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
