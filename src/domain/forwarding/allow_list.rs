//! Allow-lists for relaying frames to and from a forwarding peer.
//!
//! Every decision is fail-closed: a command name absent from the governing
//! list is never relayed.

use serde::{Deserialize, Serialize};

/// Central-system → charge-point commands a peer may relay by default.
pub const DEFAULT_FORWARDED_CALLS: &[&str] = &[
    "CancelReservation",
    "CertificateSigned",
    "ChangeAvailability",
    "ChangeConfiguration",
    "ClearCache",
    "ClearChargingProfile",
    "ClearDisplayMessage",
    "ClearVariableMonitoring",
    "CostUpdated",
    "CustomerInformation",
    "DataTransfer",
    "DeleteCertificate",
    "GetBaseReport",
    "GetChargingProfiles",
    "GetCompositeSchedule",
    "GetConfiguration",
    "GetDiagnostics",
    "GetDisplayMessages",
    "GetInstalledCertificateIds",
    "GetLocalListVersion",
    "GetLog",
    "GetMonitoringReport",
    "GetReport",
    "GetTransactionStatus",
    "GetVariables",
    "InstallCertificate",
    "PublishFirmware",
    "RemoteStartTransaction",
    "RemoteStopTransaction",
    "RequestStartTransaction",
    "RequestStopTransaction",
    "ReserveNow",
    "Reset",
    "SendLocalList",
    "SetChargingProfile",
    "SetDisplayMessage",
    "SetMonitoringBase",
    "SetMonitoringLevel",
    "SetNetworkProfile",
    "SetVariableMonitoring",
    "SetVariables",
    "TriggerMessage",
    "UnlockConnector",
    "UnpublishFirmware",
    "UpdateFirmware",
];

/// Charge-point → central-system messages relayed upstream by default.
pub const DEFAULT_FORWARDED_MESSAGES: &[&str] = &[
    "Authorize",
    "BootNotification",
    "DataTransfer",
    "DiagnosticsStatusNotification",
    "FirmwareStatusNotification",
    "Heartbeat",
    "LogStatusNotification",
    "MeterValues",
    "NotifyEvent",
    "NotifyReport",
    "SecurityEventNotification",
    "StartTransaction",
    "StatusNotification",
    "StopTransaction",
    "TransactionEvent",
];

/// Ordered, duplicate-free set of command names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardingAllowList {
    names: Vec<String>,
}

impl ForwardingAllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for name in names {
            list.insert(name.as_ref());
        }
        list
    }

    pub fn default_calls() -> Self {
        Self::new(DEFAULT_FORWARDED_CALLS)
    }

    pub fn default_messages() -> Self {
        Self::new(DEFAULT_FORWARDED_MESSAGES)
    }

    /// Add a name, keeping first-insertion order. Blank names are ignored.
    pub fn insert(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Whether `command` may be relayed. A present override replaces this
    /// list entirely; otherwise membership in this list decides.
    pub fn is_allowed(&self, command: &str, per_charger_override: Option<&[String]>) -> bool {
        match per_charger_override {
            Some(list) => list.iter().any(|n| n.trim() == command),
            None => self.contains(command),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Global allow-lists a [`ForwardingPolicy`] is checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingDefaults {
    /// Charge-point messages relayed upstream
    pub messages: ForwardingAllowList,
    /// Peer commands relayed to the charge point
    pub calls: ForwardingAllowList,
}

impl Default for ForwardingDefaults {
    fn default() -> Self {
        Self {
            messages: ForwardingAllowList::default_messages(),
            calls: ForwardingAllowList::default_calls(),
        }
    }
}

/// Check `command` against the default call allow-list, narrowed by an
/// optional per-charger override.
pub fn is_allowed(command: &str, per_charger_override: Option<&[String]>) -> bool {
    match per_charger_override {
        Some(list) => list.iter().any(|n| n.trim() == command),
        None => DEFAULT_FORWARDED_CALLS.contains(&command),
    }
}

/// Per-charger forwarding configuration.
///
/// `forwarded_messages` narrows what the charger sends upstream;
/// `forwarded_calls` narrows what the peer may send to the charger.
/// An empty list means "no override".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingPolicy {
    #[serde(default)]
    pub forwarded_messages: Vec<String>,
    #[serde(default)]
    pub forwarded_calls: Vec<String>,
}

impl ForwardingPolicy {
    fn as_override(list: &[String]) -> Option<&[String]> {
        if list.is_empty() {
            None
        } else {
            Some(list)
        }
    }

    /// May a charge-point message be relayed to the peer?
    pub fn allows_message(&self, defaults: &ForwardingAllowList, action: &str) -> bool {
        defaults.is_allowed(action, Self::as_override(&self.forwarded_messages))
    }

    /// May a peer command be relayed to the charge point?
    pub fn allows_call(&self, defaults: &ForwardingAllowList, action: &str) -> bool {
        defaults.is_allowed(action, Self::as_override(&self.forwarded_calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_is_seeded_without_duplicates() {
        let list = ForwardingAllowList::default_calls();
        assert_eq!(list.len(), DEFAULT_FORWARDED_CALLS.len());
        assert!(list.contains("Reset"));
        assert!(list.contains("SetNetworkProfile"));
        assert!(!list.contains("BootNotification"));
    }

    #[test]
    fn override_narrows_default() {
        let over = vec!["BootNotification".to_string()];
        assert!(!is_allowed("Reset", Some(&over)));
        assert!(is_allowed("BootNotification", Some(&over)));
        assert!(is_allowed("Reset", None));
    }

    #[test]
    fn unknown_command_is_fail_closed() {
        assert!(!is_allowed("SelfDestruct", None));
        let list = ForwardingAllowList::default_calls();
        assert!(!list.is_allowed("SelfDestruct", None));
    }

    #[test]
    fn insert_keeps_order_and_ignores_blanks() {
        let mut list = ForwardingAllowList::new(["Reset", " ClearCache ", "Reset", ""]);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["Reset", "ClearCache"]);
        assert!(!list.insert("  "));
        assert!(list.insert("TriggerMessage"));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn policy_treats_empty_lists_as_defaults() {
        let calls = ForwardingAllowList::default_calls();
        let messages = ForwardingAllowList::default_messages();

        let open = ForwardingPolicy::default();
        assert!(open.allows_call(&calls, "Reset"));
        assert!(open.allows_message(&messages, "MeterValues"));

        let narrowed = ForwardingPolicy {
            forwarded_messages: vec!["StartTransaction".into(), "StopTransaction".into()],
            forwarded_calls: vec!["RemoteStopTransaction".into()],
        };
        assert!(!narrowed.allows_call(&calls, "Reset"));
        assert!(narrowed.allows_call(&calls, "RemoteStopTransaction"));
        assert!(!narrowed.allows_message(&messages, "MeterValues"));
        assert!(narrowed.allows_message(&messages, "StartTransaction"));
    }
}
