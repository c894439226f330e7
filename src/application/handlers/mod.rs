//! OCPP message handlers
//!
//! Handlers run inside the connection task and get exclusive access to the
//! connection's [`ConsumerSessionState`] through a [`CallContext`].

pub mod consumption;
pub mod ocpp_v16;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::application::commands::OutboundCommand;
use crate::application::services::RfidAttemptRecorder;
use crate::application::session::ConsumerSessionState;
use crate::domain::TagAuthorizer;

pub use ocpp_v16::{register_v16_handlers, v16_action_matcher};

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u32 = 300;

/// Shared collaborators of every connection's handlers
pub struct HandlerServices {
    pub recorder: Arc<RfidAttemptRecorder>,
    pub authorizer: Arc<dyn TagAuthorizer>,
    /// Interval returned in BootNotification responses
    pub heartbeat_interval: u32,
    /// Meter-value poll period; zero disables polling
    pub consumption_interval: Duration,
    transaction_ids: AtomicI32,
}

impl HandlerServices {
    pub fn new(recorder: Arc<RfidAttemptRecorder>, authorizer: Arc<dyn TagAuthorizer>) -> Self {
        Self {
            recorder,
            authorizer,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            consumption_interval: Duration::from_secs(consumption::DEFAULT_POLL_INTERVAL_SECS),
            transaction_ids: AtomicI32::new(1),
        }
    }

    pub fn with_heartbeat_interval(mut self, secs: u32) -> Self {
        self.heartbeat_interval = secs;
        self
    }

    pub fn with_consumption_interval(mut self, interval: Duration) -> Self {
        self.consumption_interval = interval;
        self
    }

    pub fn next_transaction_id(&self) -> i32 {
        self.transaction_ids.fetch_add(1, Ordering::SeqCst)
    }
}

/// Everything a handler may touch while answering one inbound call
pub struct CallContext<'a> {
    pub charge_point_id: &'a str,
    pub services: &'a HandlerServices,
    pub state: &'a mut ConsumerSessionState,
    /// Command queue of this same connection
    pub self_queue: &'a mpsc::UnboundedSender<OutboundCommand>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::StaticTagAuthorizer;
    use crate::infrastructure::storage::InMemoryRfidAttemptRepository;

    pub(crate) fn services(accepted_tags: &[&str]) -> HandlerServices {
        let recorder = Arc::new(RfidAttemptRecorder::new(Arc::new(
            InMemoryRfidAttemptRepository::new(),
        )));
        HandlerServices::new(
            recorder,
            Arc::new(StaticTagAuthorizer::new(accepted_tags.iter().copied())),
        )
        .with_consumption_interval(Duration::from_millis(20))
    }
}
