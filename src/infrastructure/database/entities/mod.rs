//! Database entities module

pub mod network_profile_deployment;
pub mod rfid_attempt;

pub use network_profile_deployment::Entity as NetworkProfileDeployment;
pub use rfid_attempt::Entity as RfidAttempt;
