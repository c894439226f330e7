//! Per-connection session state and the registry of live connections

pub mod consumer_state;
pub mod registry;

pub use consumer_state::{ConsumerSessionState, ConsumptionTask, ForwardingMeta};
pub use registry::{ConnectionHandle, SessionRegistry, SharedSessionRegistry};
