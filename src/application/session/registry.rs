//! Session registry: active charge point websocket connections

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::commands::{CommandError, OutboundCommand};
use crate::domain::OcppVersion;

/// Registry-side handle for one live connection.
///
/// Frames are never written from outside the connection task; callers queue
/// an [`OutboundCommand`] and the task sends and correlates it.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique identifier for this connection instance
    pub connection_id: u64,
    pub charge_point_id: String,
    pub commands: mpsc::UnboundedSender<OutboundCommand>,
    pub ocpp_version: OcppVersion,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(
        connection_id: u64,
        charge_point_id: impl Into<String>,
        commands: mpsc::UnboundedSender<OutboundCommand>,
        ocpp_version: OcppVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            charge_point_id: charge_point_id.into(),
            commands,
            ocpp_version,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn is_stale(&self, timeout_seconds: i64) -> bool {
        Utc::now()
            .signed_duration_since(self.last_activity)
            .num_seconds()
            > timeout_seconds
    }
}

/// Thread-safe registry of active OCPP charge point sessions
pub struct SessionRegistry {
    sessions: DashMap<String, ConnectionHandle>,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a connection. A previous connection of the same charge point
    /// is evicted and returned.
    pub fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        info!(
            charge_point_id = handle.charge_point_id.as_str(),
            connection_id = handle.connection_id,
            ocpp_version = %handle.ocpp_version,
            "Registering charge point session"
        );
        let evicted = self
            .sessions
            .insert(handle.charge_point_id.clone(), handle);
        if let Some(old) = &evicted {
            warn!(
                charge_point_id = old.charge_point_id.as_str(),
                connection_id = old.connection_id,
                "Evicted previous session for reconnecting charge point"
            );
        }
        evicted
    }

    /// Remove the session only if it still belongs to `connection_id`, so a
    /// closing stale connection cannot drop its replacement.
    pub fn unregister(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, conn| conn.connection_id == connection_id)
            .is_some();
        if removed {
            info!(charge_point_id, connection_id, "Unregistered charge point session");
        }
        removed
    }

    /// Queue a command on the connection of `charge_point_id`.
    pub fn submit(
        &self,
        charge_point_id: &str,
        command: OutboundCommand,
    ) -> Result<(), CommandError> {
        let conn = self
            .sessions
            .get(charge_point_id)
            .ok_or_else(|| CommandError::NotConnected(charge_point_id.to_string()))?;
        conn.commands
            .send(command)
            .map_err(|e| CommandError::SendFailed(e.to_string()))
    }

    pub fn touch(&self, charge_point_id: &str) {
        if let Some(mut conn) = self.sessions.get_mut(charge_point_id) {
            conn.touch();
        }
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the negotiated OCPP version for a charge point
    pub fn get_version(&self, charge_point_id: &str) -> Option<OcppVersion> {
        self.sessions
            .get(charge_point_id)
            .map(|conn| conn.ocpp_version)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle(
        connection_id: u64,
        cp: &str,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(connection_id, cp, tx, OcppVersion::V16), rx)
    }

    #[test]
    fn register_and_lookup() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle(1, "CP001");
        assert!(registry.register(h).is_none());

        assert!(registry.is_connected("CP001"));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get_version("CP001"), Some(OcppVersion::V16));
        assert_eq!(registry.connected_ids(), vec!["CP001".to_string()]);
    }

    #[test]
    fn reconnect_evicts_previous_connection() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = handle(1, "CP001");
        let (second, _rx2) = handle(2, "CP001");
        registry.register(first);

        let evicted = registry.register(second).expect("previous session");
        assert_eq!(evicted.connection_id, 1);

        // The stale connection closing must not remove its replacement.
        assert!(!registry.unregister("CP001", 1));
        assert!(registry.is_connected("CP001"));
        assert!(registry.unregister("CP001", 2));
        assert!(!registry.is_connected("CP001"));
    }

    #[test]
    fn submit_queues_command() {
        let registry = SessionRegistry::new();
        let (h, mut rx) = handle(1, "CP001");
        registry.register(h);

        let command = OutboundCommand::api("m-1", "Reset", json!({"type": "Soft"}));
        registry.submit("CP001", command).unwrap();

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.message_id, "m-1");
        assert_eq!(queued.action, "Reset");
    }

    #[test]
    fn submit_to_unknown_charger_fails() {
        let registry = SessionRegistry::new();
        let command = OutboundCommand::api("m-1", "Reset", json!({}));
        assert!(matches!(
            registry.submit("CP404", command),
            Err(CommandError::NotConnected(_))
        ));
    }

    #[test]
    fn submit_to_closed_connection_fails() {
        let registry = SessionRegistry::new();
        let (h, rx) = handle(1, "CP001");
        registry.register(h);
        drop(rx);

        let command = OutboundCommand::api("m-1", "Reset", json!({}));
        assert!(matches!(
            registry.submit("CP001", command),
            Err(CommandError::SendFailed(_))
        ));
    }

    #[test]
    fn stale_detection() {
        let (mut h, _rx) = handle(1, "CP001");
        assert!(!h.is_stale(60));
        h.last_activity = Utc::now() - chrono::Duration::seconds(120);
        assert!(h.is_stale(60));
        h.touch();
        assert!(!h.is_stale(60));
    }
}
