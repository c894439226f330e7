//! OCPP 1.6 Action handlers
//!
//! Routes OCPP 1.6 action names to their respective handlers.
//! Payloads are deserialized into `rust_ocpp::v1_6` types within each handler.

use serde_json::Value;
use tracing::warn;

use super::CallContext;
use crate::application::protocol::{HandlerRef, ProtocolRegistry};
use crate::domain::{CallDirection, OcppVersion};

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_status_reports;
mod handle_stop_transaction;

pub use handle_authorize::handle_authorize;
pub use handle_boot_notification::handle_boot_notification;
pub use handle_data_transfer::handle_data_transfer;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::handle_meter_values;
pub use handle_start_transaction::handle_start_transaction;
pub use handle_status_notification::handle_status_notification;
pub use handle_status_reports::{
    handle_diagnostics_status_notification, handle_firmware_status_notification,
};
pub use handle_stop_transaction::handle_stop_transaction;

/// Charge-point initiated calls answered by this module. Registration and
/// dispatch both read [`V16Action::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V16Action {
    Authorize,
    BootNotification,
    DataTransfer,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    Heartbeat,
    MeterValues,
    StartTransaction,
    StatusNotification,
    StopTransaction,
}

impl V16Action {
    pub const ALL: [Self; 10] = [
        Self::Authorize,
        Self::BootNotification,
        Self::DataTransfer,
        Self::DiagnosticsStatusNotification,
        Self::FirmwareStatusNotification,
        Self::Heartbeat,
        Self::MeterValues,
        Self::StartTransaction,
        Self::StatusNotification,
        Self::StopTransaction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Authorize => "Authorize",
            Self::BootNotification => "BootNotification",
            Self::DataTransfer => "DataTransfer",
            Self::DiagnosticsStatusNotification => "DiagnosticsStatusNotification",
            Self::FirmwareStatusNotification => "FirmwareStatusNotification",
            Self::Heartbeat => "Heartbeat",
            Self::MeterValues => "MeterValues",
            Self::StartTransaction => "StartTransaction",
            Self::StatusNotification => "StatusNotification",
            Self::StopTransaction => "StopTransaction",
        }
    }

    pub fn handler(self) -> HandlerRef {
        HandlerRef(match self {
            Self::Authorize => "ocpp16::handle_authorize",
            Self::BootNotification => "ocpp16::handle_boot_notification",
            Self::DataTransfer => "ocpp16::handle_data_transfer",
            Self::DiagnosticsStatusNotification => "ocpp16::handle_diagnostics_status_notification",
            Self::FirmwareStatusNotification => "ocpp16::handle_firmware_status_notification",
            Self::Heartbeat => "ocpp16::handle_heartbeat",
            Self::MeterValues => "ocpp16::handle_meter_values",
            Self::StartTransaction => "ocpp16::handle_start_transaction",
            Self::StatusNotification => "ocpp16::handle_status_notification",
            Self::StopTransaction => "ocpp16::handle_stop_transaction",
        })
    }

    pub fn from_name(action: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == action)
    }

    async fn dispatch(self, ctx: &mut CallContext<'_>, payload: &Value) -> Value {
        match self {
            Self::Authorize => handle_authorize(ctx, payload).await,
            Self::BootNotification => handle_boot_notification(ctx, payload).await,
            Self::DataTransfer => handle_data_transfer(ctx, payload).await,
            Self::DiagnosticsStatusNotification => {
                handle_diagnostics_status_notification(ctx, payload).await
            }
            Self::FirmwareStatusNotification => {
                handle_firmware_status_notification(ctx, payload).await
            }
            Self::Heartbeat => handle_heartbeat(ctx, payload).await,
            Self::MeterValues => handle_meter_values(ctx, payload).await,
            Self::StartTransaction => handle_start_transaction(ctx, payload).await,
            Self::StatusNotification => handle_status_notification(ctx, payload).await,
            Self::StopTransaction => handle_stop_transaction(ctx, payload).await,
        }
    }
}

/// Central-system initiated calls issued by this crate
const OUTBOUND_HANDLERS: &[(&str, HandlerRef)] = &[
    ("TriggerMessage", HandlerRef("consumption::spawn_meter_value_poller")),
    ("SetNetworkProfile", HandlerRef("commands::NetworkProfileDeployer")),
];

/// Record every OCPP 1.6 handler in `registry`.
pub fn register_v16_handlers(registry: &ProtocolRegistry) {
    let protocol = OcppVersion::V16.slug();
    for action in V16Action::ALL {
        registry.register(
            protocol,
            CallDirection::CpToCsms.as_str(),
            action.name(),
            action.handler(),
        );
    }
    for (call, handler) in OUTBOUND_HANDLERS {
        registry.register(protocol, CallDirection::CsmsToCp.as_str(), call, *handler);
    }
}

/// Routes OCPP 1.6 actions to their respective handlers.
///
/// Returns `None` for actions this central system does not implement; the
/// caller answers those with a `NotImplemented` CallError.
pub async fn v16_action_matcher(
    ctx: &mut CallContext<'_>,
    action: &str,
    payload: &Value,
) -> Option<Value> {
    match V16Action::from_name(action) {
        Some(known) => Some(known.dispatch(ctx, payload).await),
        None => {
            warn!(
                charge_point_id = ctx.charge_point_id,
                action, "Unsupported OCPP 1.6 action"
            );
            None
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
