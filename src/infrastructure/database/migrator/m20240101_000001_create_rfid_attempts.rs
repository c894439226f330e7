//! Create rfid_attempts table
//!
//! Audit trail of RFID presentations from every subsystem.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RfidAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RfidAttempts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RfidAttempts::Rfid).string().not_null())
                    .col(
                        ColumnDef::new(RfidAttempts::Status)
                            .string()
                            .not_null()
                            .default("scanned"),
                    )
                    .col(ColumnDef::new(RfidAttempts::Authenticated).boolean())
                    .col(ColumnDef::new(RfidAttempts::Allowed).boolean())
                    .col(ColumnDef::new(RfidAttempts::Source).string().not_null())
                    .col(
                        ColumnDef::new(RfidAttempts::Payload)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RfidAttempts::LabelId).big_integer())
                    .col(ColumnDef::new(RfidAttempts::ChargerId).string())
                    .col(ColumnDef::new(RfidAttempts::AccountId).big_integer())
                    .col(ColumnDef::new(RfidAttempts::TransactionId).big_integer())
                    .col(
                        ColumnDef::new(RfidAttempts::AttemptedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rfid_attempts_rfid")
                    .table(RfidAttempts::Table)
                    .col(RfidAttempts::Rfid)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rfid_attempts_attempted_at")
                    .table(RfidAttempts::Table)
                    .col(RfidAttempts::AttemptedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RfidAttempts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum RfidAttempts {
    Table,
    Id,
    Rfid,
    Status,
    Authenticated,
    Allowed,
    Source,
    Payload,
    LabelId,
    ChargerId,
    AccountId,
    TransactionId,
    AttemptedAt,
}
