//! Domain layer: entities, state machines and repository ports.

pub mod authorization;
pub mod forwarding;
pub mod network_profile;
pub mod ocpp;
pub mod rfid_attempt;

pub use authorization::{StaticTagAuthorizer, TagAuthorizer, TagDecision};
pub use forwarding::{ForwardingAllowList, ForwardingDefaults, ForwardingPolicy};
pub use network_profile::{
    DeploymentError, DeploymentStatus, NetworkProfileDeployment,
    NetworkProfileDeploymentRepository, NewNetworkProfileDeployment,
};
pub use ocpp::{CallDirection, OcppVersion};
pub use rfid_attempt::{
    AttemptSource, AttemptStatus, NewRfidAttempt, RfidAttempt, RfidAttemptRepository,
};

pub use crate::shared::{DomainError, DomainResult};
