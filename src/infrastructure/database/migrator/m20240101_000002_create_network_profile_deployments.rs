//! Create network_profile_deployments table
//!
//! One row per SetNetworkProfile rollout to a charger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NetworkProfileDeployments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::NetworkProfileId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::ChargerId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::Status)
                            .string()
                            .not_null()
                            .default("requested"),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::StatusInfo)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::StatusTimestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::RequestedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::CompletedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(NetworkProfileDeployments::MessageId).string())
                    .col(ColumnDef::new(NetworkProfileDeployments::ResponsePayload).json())
                    .col(
                        ColumnDef::new(NetworkProfileDeployments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_network_profile_deployments_charger")
                    .table(NetworkProfileDeployments::Table)
                    .col(NetworkProfileDeployments::ChargerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(NetworkProfileDeployments::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
pub enum NetworkProfileDeployments {
    Table,
    Id,
    NetworkProfileId,
    ChargerId,
    Status,
    StatusInfo,
    StatusTimestamp,
    RequestedAt,
    CompletedAt,
    MessageId,
    ResponsePayload,
    CreatedAt,
}
