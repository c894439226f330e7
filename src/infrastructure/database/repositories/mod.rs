//! Database repository implementations
//!
//! Per-aggregate SeaORM repositories.

pub mod deployment_repository;
pub mod rfid_attempt_repository;

pub use deployment_repository::SeaOrmDeploymentRepository;
pub use rfid_attempt_repository::SeaOrmRfidAttemptRepository;

fn db_err(e: sea_orm::DbErr) -> crate::domain::DomainError {
    crate::domain::DomainError::Storage(format!("Database error: {}", e))
}

#[cfg(test)]
pub(crate) async fn test_db() -> sea_orm::DatabaseConnection {
    use sea_orm_migration::MigratorTrait;

    let db = super::init_database(&super::DatabaseConfig {
        url: "sqlite::memory:".to_string(),
    })
    .await
    .unwrap();
    super::migrator::Migrator::up(&db, None).await.unwrap();
    db
}
