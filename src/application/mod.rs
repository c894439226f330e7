pub mod commands;
pub mod correlation;
pub mod handlers;
pub mod protocol;
pub mod services;
pub mod session;

// Re-export key types for convenience
pub use commands::{
    CommandError, CommandOrigin, CommandSender, NetworkProfileDeployer, OutboundCommand,
    SharedCommandSender,
};
pub use correlation::{await_result, CallError, DeadlineSource, FrameSource, InboundCallHandler};
pub use handlers::{CallContext, HandlerServices};
pub use protocol::{ProtocolCatalog, ProtocolRegistry, SharedProtocolRegistry};
pub use services::{AttemptContext, DeploymentTracker, RfidAttemptRecorder};
pub use session::{ConsumerSessionState, SessionRegistry, SharedSessionRegistry};
