//! RFID attempt recorder

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::rfid_attempt::normalize_rfid;
use crate::domain::{
    AttemptSource, AttemptStatus, DomainResult, NewRfidAttempt, RfidAttempt,
    RfidAttemptRepository,
};

/// Optional facts known by the caller at the time of the presentation
#[derive(Debug, Clone, Default)]
pub struct AttemptContext {
    pub status: Option<AttemptStatus>,
    pub authenticated: Option<bool>,
    pub charger_id: Option<String>,
    pub account_id: Option<i64>,
    pub transaction_id: Option<i64>,
}

impl AttemptContext {
    pub fn with_status(status: AttemptStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Appends one audit row per RFID presentation
pub struct RfidAttemptRecorder {
    repo: Arc<dyn RfidAttemptRepository>,
}

impl RfidAttemptRecorder {
    pub fn new(repo: Arc<dyn RfidAttemptRepository>) -> Self {
        Self { repo }
    }

    /// Record an attempt for `payload["rfid"]`.
    ///
    /// Returns `Ok(None)` without touching storage when the tag normalizes to
    /// an empty string.
    pub async fn record_attempt(
        &self,
        payload: &Value,
        source: AttemptSource,
        context: AttemptContext,
    ) -> DomainResult<Option<RfidAttempt>> {
        let rfid = normalize_rfid(payload.get("rfid"));
        if rfid.is_empty() {
            debug!(source = source.as_str(), "Ignoring attempt without RFID");
            return Ok(None);
        }

        let status = context.status.unwrap_or_default();
        let authenticated = context
            .authenticated
            .or_else(|| status.implied_authentication());

        let attempt = NewRfidAttempt {
            rfid,
            status,
            authenticated,
            allowed: payload.get("allowed").and_then(parse_allowed),
            source,
            payload: payload.clone(),
            label_id: payload.get("label_id").and_then(parse_label_id),
            charger_id: context.charger_id,
            account_id: context.account_id,
            transaction_id: context.transaction_id,
        };

        let saved = self.repo.insert(attempt).await?;
        metrics::counter!(
            "rfid_attempts_recorded_total",
            "source" => source.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
        info!(
            attempt_id = saved.id,
            rfid = saved.rfid.as_str(),
            status = status.as_str(),
            source = source.as_str(),
            "RFID attempt recorded"
        );
        Ok(Some(saved))
    }

    pub async fn list_recent(&self, limit: u64) -> DomainResult<Vec<RfidAttempt>> {
        self.repo.list_recent(limit).await
    }

    /// Attempts for a tag; `rfid` is normalized before lookup.
    pub async fn list_for_rfid(&self, rfid: &str) -> DomainResult<Vec<RfidAttempt>> {
        let rfid = rfid.trim().to_uppercase();
        self.repo.list_for_rfid(&rfid).await
    }
}

fn parse_label_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Booleans pass through; `1`/`0` and the usual true/false spellings are
/// coerced. Anything else is dropped with a warning.
fn parse_allowed(value: &Value) -> Option<bool> {
    let parsed = match value {
        Value::Null => return None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    };
    if parsed.is_none() {
        warn!(allowed = %value, "Unrecognized allowed value, not recorded");
    }
    parsed
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryRfidAttemptRepository;
    use serde_json::json;

    fn recorder() -> RfidAttemptRecorder {
        RfidAttemptRecorder::new(Arc::new(InMemoryRfidAttemptRepository::new()))
    }

    #[tokio::test]
    async fn empty_rfid_records_nothing() {
        let recorder = recorder();
        for payload in [json!({}), json!({"rfid": ""}), json!({"rfid": "   "}), json!({"rfid": null})] {
            let result = recorder
                .record_attempt(&payload, AttemptSource::Service, AttemptContext::default())
                .await
                .unwrap();
            assert!(result.is_none());
        }
        assert!(recorder.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepted_attempt_is_normalized_and_authenticated() {
        let recorder = recorder();
        let attempt = recorder
            .record_attempt(
                &json!({"rfid": " ab12cd34 "}),
                AttemptSource::Service,
                AttemptContext::with_status(AttemptStatus::Accepted),
            )
            .await
            .unwrap()
            .expect("attempt recorded");

        assert_eq!(attempt.rfid, "AB12CD34");
        assert_eq!(attempt.status, AttemptStatus::Accepted);
        assert_eq!(attempt.authenticated, Some(true));
        assert_eq!(attempt.payload, json!({"rfid": " ab12cd34 "}));
    }

    #[tokio::test]
    async fn defaults_to_scanned_without_authentication() {
        let attempt = recorder()
            .record_attempt(
                &json!({"rfid": "feed"}),
                AttemptSource::Camera,
                AttemptContext::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.status, AttemptStatus::Scanned);
        assert_eq!(attempt.authenticated, None);
        assert_eq!(attempt.source, AttemptSource::Camera);
    }

    #[tokio::test]
    async fn explicit_authentication_wins_over_status() {
        let context = AttemptContext {
            status: Some(AttemptStatus::Rejected),
            authenticated: Some(true),
            ..AttemptContext::default()
        };
        let attempt = recorder()
            .record_attempt(&json!({"rfid": "AA"}), AttemptSource::Ocpp, context)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.authenticated, Some(true));
    }

    #[tokio::test]
    async fn label_and_allowed_are_extracted() {
        let recorder = recorder();
        let numeric = recorder
            .record_attempt(
                &json!({"rfid": "AA", "label_id": 42, "allowed": true}),
                AttemptSource::Browser,
                AttemptContext::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(numeric.label_id, Some(42));
        assert_eq!(numeric.allowed, Some(true));

        let text = recorder
            .record_attempt(
                &json!({"rfid": "AA", "label_id": "17", "allowed": null}),
                AttemptSource::Browser,
                AttemptContext::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text.label_id, Some(17));
        assert_eq!(text.allowed, None);
    }

    #[tokio::test]
    async fn allowed_text_and_numbers_are_coerced() {
        let recorder = recorder();
        let cases = [
            (json!("true"), Some(true)),
            (json!(" No "), Some(false)),
            (json!(1), Some(true)),
            (json!(0), Some(false)),
            (json!("maybe"), None),
            (json!([true]), None),
        ];
        for (allowed, expected) in cases {
            let attempt = recorder
                .record_attempt(
                    &json!({"rfid": "AA", "allowed": allowed.clone()}),
                    AttemptSource::Service,
                    AttemptContext::default(),
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(attempt.allowed, expected, "allowed = {}", allowed);
            assert_eq!(attempt.payload["allowed"], allowed);
        }
    }

    #[tokio::test]
    async fn repeated_presentations_are_never_merged() {
        let recorder = recorder();
        for _ in 0..3 {
            recorder
                .record_attempt(
                    &json!({"rfid": "ab"}),
                    AttemptSource::OnDemand,
                    AttemptContext::default(),
                )
                .await
                .unwrap();
        }
        assert_eq!(recorder.list_for_rfid(" ab ").await.unwrap().len(), 3);
    }
}
