//! In-memory storage for development and testing

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::domain::{
    DeploymentStatus, DomainError, DomainResult, NetworkProfileDeployment,
    NetworkProfileDeploymentRepository, NewNetworkProfileDeployment, NewRfidAttempt,
    RfidAttempt, RfidAttemptRepository,
};

pub struct InMemoryRfidAttemptRepository {
    attempts: DashMap<i64, RfidAttempt>,
    id_counter: AtomicI64,
}

impl InMemoryRfidAttemptRepository {
    pub fn new() -> Self {
        Self {
            attempts: DashMap::new(),
            id_counter: AtomicI64::new(1),
        }
    }

    fn sorted_desc(mut rows: Vec<RfidAttempt>) -> Vec<RfidAttempt> {
        rows.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at).then(b.id.cmp(&a.id)));
        rows
    }
}

impl Default for InMemoryRfidAttemptRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RfidAttemptRepository for InMemoryRfidAttemptRepository {
    async fn insert(&self, attempt: NewRfidAttempt) -> DomainResult<RfidAttempt> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let attempt = attempt.into_attempt(id, Utc::now());
        self.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<RfidAttempt>> {
        Ok(self.attempts.get(&id).map(|a| a.clone()))
    }

    async fn list_recent(&self, limit: u64) -> DomainResult<Vec<RfidAttempt>> {
        let rows = self.attempts.iter().map(|e| e.value().clone()).collect();
        let mut rows = Self::sorted_desc(rows);
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn list_for_rfid(&self, rfid: &str) -> DomainResult<Vec<RfidAttempt>> {
        let rows = self
            .attempts
            .iter()
            .filter(|e| e.rfid == rfid)
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted_desc(rows))
    }
}

pub struct InMemoryDeploymentRepository {
    deployments: DashMap<i64, NetworkProfileDeployment>,
    id_counter: AtomicI64,
}

impl InMemoryDeploymentRepository {
    pub fn new() -> Self {
        Self {
            deployments: DashMap::new(),
            id_counter: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryDeploymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProfileDeploymentRepository for InMemoryDeploymentRepository {
    async fn insert(
        &self,
        deployment: NewNetworkProfileDeployment,
    ) -> DomainResult<NetworkProfileDeployment> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let deployment = deployment.into_deployment(id, Utc::now());
        self.deployments.insert(id, deployment.clone());
        Ok(deployment)
    }

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<NetworkProfileDeployment>> {
        Ok(self.deployments.get(&id).map(|d| d.clone()))
    }

    async fn list_for_charger(
        &self,
        charger_id: &str,
    ) -> DomainResult<Vec<NetworkProfileDeployment>> {
        let mut rows: Vec<_> = self
            .deployments
            .iter()
            .filter(|e| e.charger_id == charger_id)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn update_if_status(
        &self,
        deployment: &NetworkProfileDeployment,
        expected: DeploymentStatus,
    ) -> DomainResult<bool> {
        // The entry guard holds the shard lock, making check-and-write atomic.
        let mut stored = self
            .deployments
            .get_mut(&deployment.id)
            .ok_or_else(|| DomainError::NotFound {
                entity: "NetworkProfileDeployment",
                field: "id",
                value: deployment.id.to_string(),
            })?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = deployment.clone();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttemptSource, AttemptStatus};
    use serde_json::json;

    fn new_attempt(rfid: &str) -> NewRfidAttempt {
        NewRfidAttempt {
            rfid: rfid.into(),
            status: AttemptStatus::Scanned,
            authenticated: None,
            allowed: None,
            source: AttemptSource::Service,
            payload: json!({"rfid": rfid}),
            label_id: None,
            charger_id: None,
            account_id: None,
            transaction_id: None,
        }
    }

    #[tokio::test]
    async fn attempts_are_append_only() {
        let repo = InMemoryRfidAttemptRepository::new();
        let a = repo.insert(new_attempt("AB12")).await.unwrap();
        let b = repo.insert(new_attempt("AB12")).await.unwrap();
        repo.insert(new_attempt("FF00")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(repo.list_for_rfid("AB12").await.unwrap().len(), 2);
        assert_eq!(repo.list_recent(2).await.unwrap().len(), 2);
        assert_eq!(repo.find_by_id(a.id).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn update_if_status_rejects_stale_writer() {
        let repo = InMemoryDeploymentRepository::new();
        let created = repo
            .insert(NewNetworkProfileDeployment {
                network_profile_id: 1,
                charger_id: "CP001".into(),
            })
            .await
            .unwrap();

        let mut first = created.clone();
        first.mark_sent("m-1", Utc::now()).unwrap();
        let mut second = created.clone();
        second.mark_failed("offline", Utc::now()).unwrap();

        assert!(repo
            .update_if_status(&first, DeploymentStatus::Requested)
            .await
            .unwrap());
        assert!(!repo
            .update_if_status(&second, DeploymentStatus::Requested)
            .await
            .unwrap());

        let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Sent);
    }
}
