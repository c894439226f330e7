//! Protocol call catalogs used by the coverage check

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CallDirection, OcppVersion};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog has no protocol slug")]
    MissingProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCall {
    pub direction: CallDirection,
    pub name: String,
}

impl CatalogCall {
    pub fn new(direction: CallDirection, name: impl Into<String>) -> Self {
        Self {
            direction,
            name: name.into(),
        }
    }
}

/// Calls a protocol defines, as `(direction, name)` pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolCatalog {
    pub protocol: String,
    #[serde(default)]
    pub calls: Vec<CatalogCall>,
}

const OCPP16_CP_TO_CSMS: &[&str] = &[
    "Authorize",
    "BootNotification",
    "DataTransfer",
    "DiagnosticsStatusNotification",
    "FirmwareStatusNotification",
    "Heartbeat",
    "MeterValues",
    "StartTransaction",
    "StatusNotification",
    "StopTransaction",
];

const OCPP16_CSMS_TO_CP: &[&str] = &[
    "CancelReservation",
    "ChangeAvailability",
    "ChangeConfiguration",
    "ClearCache",
    "ClearChargingProfile",
    "DataTransfer",
    "GetCompositeSchedule",
    "GetConfiguration",
    "GetDiagnostics",
    "GetLocalListVersion",
    "RemoteStartTransaction",
    "RemoteStopTransaction",
    "ReserveNow",
    "Reset",
    "SendLocalList",
    "SetChargingProfile",
    "TriggerMessage",
    "UnlockConnector",
    "UpdateFirmware",
];

impl ProtocolCatalog {
    /// Parse `{"protocol": "...", "calls": [{"direction": "...", "name": "..."}]}`.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        if catalog.protocol.trim().is_empty() {
            return Err(CatalogError::MissingProtocol);
        }
        Ok(catalog)
    }

    /// OCPP 1.6 core profile calls
    pub fn builtin_ocpp16() -> Self {
        let inbound = OCPP16_CP_TO_CSMS
            .iter()
            .map(|name| CatalogCall::new(CallDirection::CpToCsms, *name));
        let outbound = OCPP16_CSMS_TO_CP
            .iter()
            .map(|name| CatalogCall::new(CallDirection::CsmsToCp, *name));
        Self {
            protocol: OcppVersion::V16.slug().to_string(),
            calls: inbound.chain(outbound).collect(),
        }
    }

    pub fn calls_in(&self, direction: CallDirection) -> impl Iterator<Item = &CatalogCall> {
        self.calls.iter().filter(move |c| c.direction == direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_json() {
        let catalog = ProtocolCatalog::from_json_str(
            r#"{"protocol":"ocpp16","calls":[
                {"direction":"cp_to_csms","name":"BootNotification"},
                {"direction":"csms_to_cp","name":"Reset"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(catalog.protocol, "ocpp16");
        assert_eq!(catalog.calls[1], CatalogCall::new(CallDirection::CsmsToCp, "Reset"));
    }

    #[test]
    fn rejects_bad_catalogs() {
        assert!(matches!(
            ProtocolCatalog::from_json_str(r#"{"protocol":"  ","calls":[]}"#),
            Err(CatalogError::MissingProtocol)
        ));
        assert!(matches!(
            ProtocolCatalog::from_json_str(
                r#"{"protocol":"ocpp16","calls":[{"direction":"sideways","name":"X"}]}"#
            ),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn builtin_ocpp16_directions() {
        let catalog = ProtocolCatalog::builtin_ocpp16();
        assert_eq!(catalog.protocol, "ocpp16");
        assert_eq!(catalog.calls_in(CallDirection::CpToCsms).count(), 10);
        assert!(catalog
            .calls_in(CallDirection::CsmsToCp)
            .any(|c| c.name == "TriggerMessage"));
    }
}
