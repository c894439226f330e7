//! OCPP protocol shared types
//!
//! Value objects related to the OCPP protocol that don't belong
//! to a single aggregate: protocol versions and call directions.

pub mod direction;
pub mod version;

pub use direction::CallDirection;
pub use version::OcppVersion;
