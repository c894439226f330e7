//! StartTransaction handler
//!
//! Authorizes the tag, audits the presentation and, when accepted, starts
//! polling the connector for meter values.

use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::application::handlers::consumption::spawn_meter_value_poller;
use crate::application::handlers::CallContext;
use crate::application::services::AttemptContext;
use crate::application::session::ConsumerSessionState;
use crate::domain::{AttemptSource, AttemptStatus, TagDecision};

pub async fn handle_start_transaction(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: StartTransactionRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to parse StartTransaction");
            return serde_json::json!({});
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        connector_id = req.connector_id,
        id_tag = req.id_tag.as_str(),
        meter_start = req.meter_start,
        "StartTransaction"
    );

    let decision = match ctx.services.authorizer.authorize(&req.id_tag).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Tag authorization failed");
            TagDecision {
                accepted: false,
                account_id: None,
            }
        }
    };

    let transaction_id = if decision.accepted {
        ctx.services.next_transaction_id()
    } else {
        0
    };

    let attempt = AttemptContext {
        status: Some(if decision.accepted {
            AttemptStatus::Accepted
        } else {
            AttemptStatus::Rejected
        }),
        authenticated: None,
        charger_id: Some(ctx.charge_point_id.to_string()),
        account_id: decision.account_id,
        transaction_id: decision.accepted.then_some(i64::from(transaction_id)),
    };
    let attempt_payload = json!({
        "rfid": req.id_tag,
        "allowed": decision.accepted,
        "connectorId": req.connector_id,
        "meterStart": req.meter_start,
    });
    // Auditing must never block the transaction flow.
    if let Err(e) = ctx
        .services
        .recorder
        .record_attempt(&attempt_payload, AttemptSource::Ocpp, attempt)
        .await
    {
        warn!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to record RFID attempt");
    }

    if !decision.accepted {
        let response = StartTransactionResponse {
            transaction_id: 0,
            id_tag_info: IdTagInfo {
                status: AuthorizationStatus::Invalid,
                expiry_date: None,
                parent_id_tag: None,
            },
        };
        return serde_json::to_value(&response).unwrap_or_default();
    }

    let connector = i32::try_from(req.connector_id).unwrap_or(i32::MAX);
    ctx.state.connector_value = Some(connector);
    ctx.state.store_key = ConsumerSessionState::connector_store_key(ctx.charge_point_id, connector);

    if !ctx.services.consumption_interval.is_zero() {
        let poller = spawn_meter_value_poller(
            ctx.charge_point_id.to_string(),
            req.connector_id,
            ctx.services.consumption_interval,
            ctx.self_queue.clone(),
        );
        ctx.state.start_consumption(poller).await;
    }

    let response = StartTransactionResponse {
        transaction_id,
        id_tag_info: IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        },
    };
    serde_json::to_value(&response).unwrap_or_default()
}
