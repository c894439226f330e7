//! v1.6 TriggerMessage payloads

use rust_ocpp::v1_6::messages::trigger_message::{TriggerMessageRequest, TriggerMessageResponse};
use rust_ocpp::v1_6::types::{MessageTrigger, TriggerMessageStatus};
use serde_json::Value;

use super::CommandError;

pub const ACTION: &str = "TriggerMessage";

/// Request payload asking `connector_id` to report its meter values now.
pub fn meter_values_request(connector_id: u32) -> Result<Value, CommandError> {
    let request = TriggerMessageRequest {
        requested_message: MessageTrigger::MeterValues,
        connector_id: Some(connector_id),
    };
    serde_json::to_value(&request)
        .map_err(|e| CommandError::SendFailed(format!("Serialization failed: {}", e)))
}

/// Whether the charger agreed to send the triggered message.
pub fn is_accepted(response: Value) -> Result<bool, CommandError> {
    let response: TriggerMessageResponse = serde_json::from_value(response)
        .map_err(|e| CommandError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
    Ok(matches!(response.status, TriggerMessageStatus::Accepted))
}
