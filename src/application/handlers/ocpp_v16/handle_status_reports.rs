//! FirmwareStatusNotification and DiagnosticsStatusNotification handlers
//!
//! Both are progress reports for a CSMS-initiated job. The gateway only
//! acknowledges them; the reported status is logged and counted.

use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::application::handlers::CallContext;

pub async fn handle_firmware_status_notification(
    ctx: &mut CallContext<'_>,
    payload: &Value,
) -> Value {
    acknowledge(
        ctx,
        "FirmwareStatusNotification",
        payload,
        |req: FirmwareStatusNotificationRequest| format!("{:?}", req.status),
        &FirmwareStatusNotificationResponse {},
    )
}

pub async fn handle_diagnostics_status_notification(
    ctx: &mut CallContext<'_>,
    payload: &Value,
) -> Value {
    acknowledge(
        ctx,
        "DiagnosticsStatusNotification",
        payload,
        |req: DiagnosticsStatusNotificationRequest| format!("{:?}", req.status),
        &DiagnosticsStatusNotificationResponse {},
    )
}

fn acknowledge<Req, Resp>(
    ctx: &CallContext<'_>,
    action: &'static str,
    payload: &Value,
    status_of: impl FnOnce(Req) -> String,
    response: &Resp,
) -> Value
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    let status = match serde_json::from_value::<Req>(payload.clone()) {
        Ok(req) => status_of(req),
        Err(e) => {
            error!(charge_point_id = ctx.charge_point_id, action, error = %e, "Failed to parse status report");
            return serde_json::json!({});
        }
    };

    info!(charge_point_id = ctx.charge_point_id, action, status = status.as_str(), "Status report");
    metrics::counter!("ocpp_status_reports_total", "action" => action, "status" => status)
        .increment(1);

    serde_json::to_value(response).unwrap_or_default()
}
