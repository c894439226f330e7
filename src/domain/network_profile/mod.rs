//! Network profile deployment aggregate
//!
//! Tracks rollout of a network configuration profile to one charger.

pub mod model;
pub mod repository;

pub use model::{
    DeploymentError, DeploymentStatus, NetworkProfileDeployment, NewNetworkProfileDeployment,
};
pub use repository::NetworkProfileDeploymentRepository;
