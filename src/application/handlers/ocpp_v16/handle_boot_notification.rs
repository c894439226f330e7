//! BootNotification handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::CallContext;

pub async fn handle_boot_notification(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: BootNotificationRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(
                charge_point_id = ctx.charge_point_id,
                error = %e,
                "Failed to deserialize BootNotificationRequest"
            );
            return serde_json::json!({});
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        vendor = req.charge_point_vendor.as_str(),
        model = req.charge_point_model.as_str(),
        firmware = ?req.firmware_version,
        "BootNotification"
    );

    if ctx.state.ensure_header_reference() {
        info!(
            charge_point_id = ctx.charge_point_id,
            store_key = ctx.state.store_key.as_str(),
            "Session header reference created"
        );
    }

    let response = BootNotificationResponse {
        current_time: Utc::now(),
        interval: ctx.services.heartbeat_interval,
        status: RegistrationStatus::Accepted,
    };

    serde_json::to_value(&response).unwrap_or_default()
}
