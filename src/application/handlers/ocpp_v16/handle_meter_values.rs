//! MeterValues handler

use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::application::handlers::CallContext;

pub async fn handle_meter_values(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: MeterValuesRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to parse MeterValues");
            return serde_json::json!({});
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        connector_id = req.connector_id,
        transaction_id = ?req.transaction_id,
        samples = req.meter_value.len(),
        "MeterValues"
    );

    // Meter values arriving means the outstanding poll has been served.
    if let Some(poll_id) = ctx.state.consumption_message_id.take() {
        debug!(
            charge_point_id = ctx.charge_point_id,
            message_id = poll_id.as_str(),
            "Meter value poll satisfied"
        );
    }

    serde_json::to_value(&MeterValuesResponse {}).unwrap_or_default()
}
