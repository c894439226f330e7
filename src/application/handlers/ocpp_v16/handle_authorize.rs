//! Authorize handler

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::CallContext;

pub async fn handle_authorize(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: AuthorizeRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to parse Authorize");
            return serde_json::json!({});
        }
    };

    let accepted = match ctx.services.authorizer.authorize(&req.id_tag).await {
        Ok(decision) => decision.accepted,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Tag authorization failed");
            false
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        id_tag = req.id_tag.as_str(),
        accepted,
        "Authorize"
    );

    let status = if accepted {
        AuthorizationStatus::Accepted
    } else {
        AuthorizationStatus::Invalid
    };
    let response = AuthorizeResponse {
        id_tag_info: IdTagInfo {
            status,
            expiry_date: None,
            parent_id_tag: None,
        },
    };

    serde_json::to_value(&response).unwrap_or_default()
}
