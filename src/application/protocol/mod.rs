//! Protocol coverage: which OCPP calls have bound handlers

pub mod catalog;
pub mod registry;

pub use catalog::{CatalogCall, CatalogError, ProtocolCatalog};
pub use registry::{HandlerRef, ProtocolRegistry, RegisteredHandler, SharedProtocolRegistry};
