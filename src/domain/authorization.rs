//! Tag authorization port
//!
//! Accounts and RFID cards belong to an external subsystem; the OCPP core
//! only needs a yes/no answer (plus the account, when known) for a tag.

use std::collections::HashSet;

use async_trait::async_trait;

use super::rfid_attempt::normalize_rfid;
use crate::shared::DomainResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDecision {
    pub accepted: bool,
    pub account_id: Option<i64>,
}

#[async_trait]
pub trait TagAuthorizer: Send + Sync {
    async fn authorize(&self, id_tag: &str) -> DomainResult<TagDecision>;
}

/// Accepts the configured tags, or every tag when none are configured.
pub struct StaticTagAuthorizer {
    accepted: HashSet<String>,
}

impl StaticTagAuthorizer {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted = tags
            .into_iter()
            .map(|t| normalize_rfid(Some(&serde_json::Value::String(t.as_ref().to_string()))))
            .filter(|t| !t.is_empty())
            .collect();
        Self { accepted }
    }
}

#[async_trait]
impl TagAuthorizer for StaticTagAuthorizer {
    async fn authorize(&self, id_tag: &str) -> DomainResult<TagDecision> {
        let tag = id_tag.trim().to_uppercase();
        let accepted = !tag.is_empty() && (self.accepted.is_empty() || self.accepted.contains(&tag));
        Ok(TagDecision {
            accepted,
            account_id: None,
        })
    }
}
