//! RfidAttempt repository interface

use async_trait::async_trait;

use super::model::{NewRfidAttempt, RfidAttempt};
use crate::shared::DomainResult;

#[async_trait]
pub trait RfidAttemptRepository: Send + Sync {
    /// Insert a new attempt row. Attempts are never updated or merged.
    async fn insert(&self, attempt: NewRfidAttempt) -> DomainResult<RfidAttempt>;

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<RfidAttempt>>;

    /// Most recent attempts first
    async fn list_recent(&self, limit: u64) -> DomainResult<Vec<RfidAttempt>>;

    /// All attempts for a normalized tag, most recent first
    async fn list_for_rfid(&self, rfid: &str) -> DomainResult<Vec<RfidAttempt>>;
}
