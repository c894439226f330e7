//! StatusNotification handler

use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::CallContext;

pub async fn handle_status_notification(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: StatusNotificationRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to parse StatusNotification");
            return serde_json::json!({});
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        connector_id = req.connector_id,
        status = ?req.status,
        error_code = ?req.error_code,
        "StatusNotification"
    );

    serde_json::to_value(&StatusNotificationResponse {}).unwrap_or_default()
}
