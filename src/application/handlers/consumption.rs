//! Meter-value consumption polling
//!
//! While a transaction runs, the connection periodically asks the charger
//! for fresh meter values with `TriggerMessage(MeterValues)`. The poller
//! only queues commands on its own connection; the connection task sends
//! them and tracks the outstanding id. At most one trigger is in flight:
//! the next tick waits until the previous one was answered, timed out or
//! dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::application::commands::{trigger_message, CommandOrigin, CommandSender, OutboundCommand};
use crate::application::session::ConsumptionTask;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Spawn the poller for `connector_id`. It stops by itself once the
/// connection's queue is closed.
pub fn spawn_meter_value_poller(
    charge_point_id: String,
    connector_id: u32,
    period: Duration,
    queue: mpsc::UnboundedSender<OutboundCommand>,
) -> ConsumptionTask {
    let task_connector = i32::try_from(connector_id).unwrap_or(i32::MAX);
    ConsumptionTask::spawn(task_connector, async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let payload = match trigger_message::meter_values_request(connector_id) {
                Ok(p) => p,
                Err(e) => {
                    error!(charge_point_id = charge_point_id.as_str(), error = %e, "Cannot build meter value trigger");
                    return;
                }
            };
            let (command, settled) = OutboundCommand::new(
                CommandSender::next_message_id(),
                trigger_message::ACTION,
                payload,
                CommandOrigin::Consumption,
            )
            .with_reply();
            if queue.send(command).is_err() {
                debug!(charge_point_id = charge_point_id.as_str(), connector_id, "Connection gone, stopping meter poller");
                return;
            }
            // The outcome is tracked by the connection task.
            let _ = settled.await;
        }
    })
}
