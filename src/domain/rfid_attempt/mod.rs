//! RFID attempt aggregate
//!
//! Audit trail of every RFID presentation, whatever subsystem saw it.

pub mod model;
pub mod repository;

pub use model::{normalize_rfid, AttemptSource, AttemptStatus, NewRfidAttempt, RfidAttempt};
pub use repository::RfidAttemptRepository;
