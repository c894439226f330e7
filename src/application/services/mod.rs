//! Application services

mod deployments;
mod rfid_attempts;

pub use deployments::DeploymentTracker;
pub use rfid_attempts::{AttemptContext, RfidAttemptRecorder};
