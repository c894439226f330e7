//! Ephemeral state of one charge-point websocket connection
//!
//! Owned exclusively by the connection's task: no locking, never persisted.
//! The only lifecycle logic is the meter-value consumption task, a child
//! task that must be cancelled (and its cancellation observed) before the
//! connection finishes tearing down.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::ForwardingPolicy;

/// Handle to the periodic meter-value polling task of a connection.
pub struct ConsumptionTask {
    connector_id: i32,
    handle: JoinHandle<()>,
}

impl ConsumptionTask {
    pub fn spawn<F>(connector_id: i32, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            connector_id,
            handle: tokio::spawn(future),
        }
    }

    pub fn connector_id(&self) -> i32 {
        self.connector_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task and wait until it is gone. Failures are logged only.
    pub async fn cancel(self) {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => debug!(connector_id = self.connector_id, "Consumption task already finished"),
            Err(e) if e.is_cancelled() => {
                debug!(connector_id = self.connector_id, "Consumption task cancelled")
            }
            Err(e) => warn!(
                connector_id = self.connector_id,
                error = %e,
                "Consumption task ended abnormally"
            ),
        }
    }
}

impl std::fmt::Debug for ConsumptionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumptionTask")
            .field("connector_id", &self.connector_id)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

/// Relay metadata for a charger with a forwarding peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingMeta {
    pub peer_url: String,
    pub policy: ForwardingPolicy,
    pub relayed_messages: u64,
    pub relayed_calls: u64,
    pub blocked: u64,
}

impl ForwardingMeta {
    pub fn new(peer_url: impl Into<String>, policy: ForwardingPolicy) -> Self {
        Self {
            peer_url: peer_url.into(),
            policy,
            relayed_messages: 0,
            relayed_calls: 0,
            blocked: 0,
        }
    }
}

#[derive(Debug)]
pub struct ConsumerSessionState {
    /// Connector of the active transaction, if any
    pub connector_value: Option<i32>,
    /// Correlates this session with its backing store record
    pub store_key: String,
    consumption_task: Option<ConsumptionTask>,
    /// uniqueId of the outstanding meter-value trigger
    pub consumption_message_id: Option<String>,
    pub header_reference_created: bool,
    pub forwarding_meta: Option<ForwardingMeta>,
}

impl ConsumerSessionState {
    pub fn new(store_key: impl Into<String>) -> Self {
        Self {
            connector_value: None,
            store_key: store_key.into(),
            consumption_task: None,
            consumption_message_id: None,
            header_reference_created: false,
            forwarding_meta: None,
        }
    }

    /// Store key for a connector-scoped record of `charge_point_id`.
    pub fn connector_store_key(charge_point_id: &str, connector_id: i32) -> String {
        format!("{}:{}", charge_point_id, connector_id)
    }

    /// Marks the header reference as created. Returns `true` only the first
    /// time it is called on this connection.
    pub fn ensure_header_reference(&mut self) -> bool {
        if self.header_reference_created {
            return false;
        }
        self.header_reference_created = true;
        true
    }

    pub fn has_consumption(&self) -> bool {
        self.consumption_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn consumption_connector(&self) -> Option<i32> {
        self.consumption_task.as_ref().map(ConsumptionTask::connector_id)
    }

    /// Install a new consumption task, cancelling any previous one first.
    pub async fn start_consumption(&mut self, task: ConsumptionTask) {
        if let Some(previous) = self.consumption_task.take() {
            previous.cancel().await;
        }
        self.consumption_message_id = None;
        self.consumption_task = Some(task);
    }

    pub async fn stop_consumption(&mut self) {
        if let Some(task) = self.consumption_task.take() {
            task.cancel().await;
        }
        self.consumption_message_id = None;
    }

    /// Disconnect: cancel the consumption task and drop the state.
    /// Never fails.
    pub async fn teardown(mut self) {
        self.stop_consumption().await;
        debug!(store_key = self.store_key.as_str(), "Session state discarded");
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Sets the flag when dropped, i.e. when the task future is torn down.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn endless_task(connector_id: i32, dropped: Arc<AtomicBool>) -> ConsumptionTask {
        let flag = DropFlag(dropped);
        ConsumptionTask::spawn(connector_id, async move {
            let _flag = flag;
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        })
    }

    #[test]
    fn new_state_has_defaults() {
        let state = ConsumerSessionState::new("CP001");
        assert_eq!(state.store_key, "CP001");
        assert!(state.connector_value.is_none());
        assert!(state.consumption_message_id.is_none());
        assert!(!state.header_reference_created);
        assert!(state.forwarding_meta.is_none());
        assert!(!state.has_consumption());
    }

    #[test]
    fn header_reference_is_created_once() {
        let mut state = ConsumerSessionState::new("CP001");
        assert!(state.ensure_header_reference());
        assert!(!state.ensure_header_reference());
        assert!(state.header_reference_created);
    }

    #[tokio::test]
    async fn teardown_cancels_consumption_task() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut state = ConsumerSessionState::new("CP001");
        state.start_consumption(endless_task(1, dropped.clone())).await;
        assert!(state.has_consumption());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!dropped.load(Ordering::SeqCst));

        state.teardown().await;
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn starting_again_replaces_previous_task() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        let mut state = ConsumerSessionState::new("CP001");

        state.start_consumption(endless_task(1, first.clone())).await;
        state.consumption_message_id = Some("poll-1".into());
        state.start_consumption(endless_task(2, second.clone())).await;

        assert!(first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));
        assert_eq!(state.consumption_connector(), Some(2));
        assert!(state.consumption_message_id.is_none());

        state.stop_consumption().await;
        assert!(second.load(Ordering::SeqCst));
        assert!(!state.has_consumption());
    }

    #[tokio::test]
    async fn teardown_cancels_task_that_never_ran() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut state = ConsumerSessionState::new("CP001");
        state.start_consumption(endless_task(1, dropped.clone())).await;
        state.teardown().await;
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn teardown_swallows_panicked_task() {
        let mut state = ConsumerSessionState::new("CP001");
        let task = ConsumptionTask::spawn(1, async { panic!("meter poll exploded") });
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.start_consumption(task).await;
        state.teardown().await;
    }

    #[test]
    fn connector_store_key_format() {
        assert_eq!(ConsumerSessionState::connector_store_key("CP001", 2), "CP001:2");
    }
}
