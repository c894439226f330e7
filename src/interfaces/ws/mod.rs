//! WebSocket interfaces
//!
//! - `ocpp_server`: accept loop and subprotocol negotiation
//! - `connection`: per-charger connection task
//! - `upstream`: link to a forwarding peer

pub mod connection;
pub mod ocpp_server;
pub mod upstream;

pub use connection::{ChargerConnection, InboundDispatch, WsFrameSource};
pub use ocpp_server::{OcppServer, OcppServerSettings, OCPP_SUBPROTOCOL};
pub use upstream::UpstreamLink;
