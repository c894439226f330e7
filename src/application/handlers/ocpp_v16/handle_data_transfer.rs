//! DataTransfer handler
//!
//! No vendor extensions are implemented, so every request is answered
//! `UnknownVendorId`. The frame is still relayed to a forwarding peer when
//! the allow-list permits it.

use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::types::DataTransferStatus;
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::CallContext;

pub async fn handle_data_transfer(ctx: &mut CallContext<'_>, payload: &Value) -> Value {
    let req: DataTransferRequest = match serde_json::from_value(payload.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, error = %e, "Failed to parse DataTransfer");
            return serde_json::json!({});
        }
    };

    info!(
        charge_point_id = ctx.charge_point_id,
        vendor_id = req.vendor_string.as_str(),
        message_id = req.message_id.as_deref().unwrap_or("-"),
        data_len = req.data.as_ref().map_or(0, String::len),
        "DataTransfer from unknown vendor"
    );

    serde_json::to_value(&DataTransferResponse {
        status: DataTransferStatus::UnknownVendorId,
        data: None,
    })
    .unwrap_or_default()
}
