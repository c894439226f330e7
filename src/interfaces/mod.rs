//! Interfaces layer: transports facing charge points and forwarding peers

pub mod ws;

pub use ws::{OcppServer, OcppServerSettings};
