//! StopTransaction handler

use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::CallContext;

pub async fn handle_stop_transaction(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: StopTransactionRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to parse StopTransaction");
            return serde_json::json!({});
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        transaction_id = req.transaction_id,
        meter_stop = req.meter_stop,
        reason = ?req.reason,
        "StopTransaction"
    );

    ctx.state.stop_consumption().await;
    ctx.state.connector_value = None;
    ctx.state.store_key = ctx.charge_point_id.to_string();

    let response = StopTransactionResponse {
        id_tag_info: req.id_tag.as_ref().map(|_| IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        }),
    };
    serde_json::to_value(&response).unwrap_or_default()
}
