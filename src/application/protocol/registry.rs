//! Registry of bound protocol handlers
//!
//! Keys are `(protocol_slug, direction, call_name)`; values are sets of
//! handler references. Registration normally happens once at startup from
//! many modules, so the table is a [`DashMap`] shared through an `Arc`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::catalog::ProtocolCatalog;

/// Stable name of a handler function, e.g. `"ocpp16::boot_notification"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerRef(pub &'static str);

impl HandlerRef {
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// One flattened registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredHandler {
    pub protocol: String,
    pub direction: String,
    pub call: String,
    pub handler: HandlerRef,
}

type Key = (String, String, String);

pub struct ProtocolRegistry {
    entries: DashMap<Key, HashSet<HandlerRef>>,
}

pub type SharedProtocolRegistry = Arc<ProtocolRegistry>;

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn shared() -> SharedProtocolRegistry {
        Arc::new(Self::new())
    }

    /// Bind `handler` to a call. Keys are trimmed; repeating a registration
    /// is a no-op.
    pub fn register(&self, protocol: &str, direction: &str, call: &str, handler: HandlerRef) {
        let key = (
            protocol.trim().to_string(),
            direction.trim().to_string(),
            call.trim().to_string(),
        );
        let inserted = self.entries.entry(key).or_default().insert(handler);
        if inserted {
            debug!(
                protocol = protocol.trim(),
                direction = direction.trim(),
                call = call.trim(),
                handler = handler.name(),
                "Registered protocol handler"
            );
        }
    }

    /// Calls of `protocol` with their handlers. Without a direction, handler
    /// sets of the same call name are merged across directions.
    pub fn get_registered_calls(
        &self,
        protocol: &str,
        direction: Option<&str>,
    ) -> HashMap<String, HashSet<HandlerRef>> {
        let protocol = protocol.trim();
        let direction = direction.map(str::trim);
        let mut calls: HashMap<String, HashSet<HandlerRef>> = HashMap::new();
        for entry in self.entries.iter() {
            let (p, d, call) = entry.key();
            if p != protocol || direction.is_some_and(|dir| dir != d) {
                continue;
            }
            calls
                .entry(call.clone())
                .or_default()
                .extend(entry.value().iter().copied());
        }
        calls
    }

    /// Empty the registry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Walk every `(protocol, direction, call, handler)` binding.
    ///
    /// The walk reads the live table each time it is started. It holds shard
    /// read locks while running, so do not register from inside the loop.
    pub fn iter_all(&self) -> impl Iterator<Item = RegisteredHandler> + '_ {
        self.entries.iter().flat_map(|entry| {
            let (protocol, direction, call) = entry.key().clone();
            let mut handlers: Vec<HandlerRef> = entry.value().iter().copied().collect();
            handlers.sort();
            handlers.into_iter().map(move |handler| RegisteredHandler {
                protocol: protocol.clone(),
                direction: direction.clone(),
                call: call.clone(),
                handler,
            })
        })
    }

    pub fn is_registered(&self, protocol: &str, direction: &str, call: &str) -> bool {
        let key = (
            protocol.trim().to_string(),
            direction.trim().to_string(),
            call.trim().to_string(),
        );
        self.entries.get(&key).is_some_and(|set| !set.is_empty())
    }

    /// Catalog calls with no bound handler, as sorted `"direction:call"`.
    pub fn missing_calls(&self, protocol: &str, catalog: &ProtocolCatalog) -> Vec<String> {
        let mut missing: Vec<String> = catalog
            .calls
            .iter()
            .filter(|c| !self.is_registered(protocol, c.direction.as_str(), &c.name))
            .map(|c| format!("{}:{}", c.direction.as_str(), c.name.trim()))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::protocol::catalog::CatalogCall;
    use crate::domain::CallDirection;

    const BOOT: HandlerRef = HandlerRef("ocpp16::boot_notification");
    const HEARTBEAT: HandlerRef = HandlerRef("ocpp16::heartbeat");
    const RELAY: HandlerRef = HandlerRef("relay::data_transfer");

    #[test]
    fn duplicate_registration_is_idempotent() {
        let registry = ProtocolRegistry::new();
        registry.register("ocpp16", "cp_to_csms", "BootNotification", BOOT);
        registry.register(" ocpp16 ", " cp_to_csms", "BootNotification ", BOOT);

        let calls = registry.get_registered_calls("ocpp16", Some("cp_to_csms"));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls["BootNotification"], HashSet::from([BOOT]));
        assert_eq!(registry.iter_all().count(), 1);
    }

    #[test]
    fn calls_merge_across_directions() {
        let registry = ProtocolRegistry::new();
        registry.register("ocpp16", "cp_to_csms", "DataTransfer", HEARTBEAT);
        registry.register("ocpp16", "csms_to_cp", "DataTransfer", RELAY);
        registry.register("ocpp201", "cp_to_csms", "DataTransfer", BOOT);

        let merged = registry.get_registered_calls("ocpp16", None);
        assert_eq!(merged["DataTransfer"], HashSet::from([HEARTBEAT, RELAY]));

        let outbound = registry.get_registered_calls("ocpp16", Some("csms_to_cp"));
        assert_eq!(outbound["DataTransfer"], HashSet::from([RELAY]));
        assert!(registry.get_registered_calls("ocpp21", None).is_empty());
    }

    #[test]
    fn iter_all_reflects_current_state() {
        let registry = ProtocolRegistry::new();
        registry.register("ocpp16", "cp_to_csms", "Heartbeat", HEARTBEAT);
        assert_eq!(registry.iter_all().count(), 1);

        registry.register("ocpp16", "cp_to_csms", "BootNotification", BOOT);
        let mut calls: Vec<String> = registry.iter_all().map(|h| h.call).collect();
        calls.sort();
        assert_eq!(calls, vec!["BootNotification", "Heartbeat"]);

        registry.clear();
        assert_eq!(registry.iter_all().count(), 0);
    }

    #[test]
    fn coverage_reports_unbound_calls() {
        let registry = ProtocolRegistry::new();
        registry.register("ocpp16", "cp_to_csms", "BootNotification", BOOT);
        registry.register("ocpp16", "cp_to_csms", "Heartbeat", HEARTBEAT);

        let catalog = ProtocolCatalog {
            protocol: "ocpp16".into(),
            calls: vec![
                CatalogCall::new(CallDirection::CpToCsms, "BootNotification"),
                CatalogCall::new(CallDirection::CpToCsms, "Heartbeat"),
                CatalogCall::new(CallDirection::CpToCsms, "UnknownAction"),
            ],
        };
        assert_eq!(
            registry.missing_calls("ocpp16", &catalog),
            vec!["cp_to_csms:UnknownAction".to_string()]
        );
    }

    #[test]
    fn concurrent_registration() {
        let registry = ProtocolRegistry::shared();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register("ocpp16", "cp_to_csms", "Heartbeat", HEARTBEAT);
                    registry.register("ocpp16", "cp_to_csms", "BootNotification", BOOT);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.iter_all().count(), 2);
    }
}
