//! Heartbeat handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use serde_json::Value;
use tracing::debug;

use crate::application::handlers::CallContext;

pub async fn handle_heartbeat(ctx: &mut CallContext<'_>, _payload: &Value) -> Value {
    debug!(charge_point_id = ctx.charge_point_id, "Heartbeat");

    let response = HeartbeatResponse {
        current_time: Utc::now(),
    };

    serde_json::to_value(&response).unwrap_or_default()
}
