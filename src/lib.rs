//! # OCPP Gateway
//!
//! OCPP 1.6 message-exchange core for EV charging stations.
//!
//! ## Architecture
//!
//! - **shared**: OCPP-J framing, shutdown signal and error types
//! - **domain**: RFID attempts, network profile deployments, forwarding
//!   allow-lists and the ports their stores implement
//! - **application**: call correlation, per-connection session state,
//!   message handlers, protocol registry and outbound commands
//! - **infrastructure**: SeaORM persistence and in-memory stores
//! - **interfaces**: charge-point WebSocket server and the forwarding relay
//! - **server**: lifecycle wiring used by the CLI

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::{init_database, DatabaseConfig};

pub use server::{init_tracing, ServerHandle, ServerOptions};
