//! In-memory repository implementations

mod memory;

pub use memory::{InMemoryDeploymentRepository, InMemoryRfidAttemptRepository};
