//! Event sourcing subsystem
//!
//! The bounded append-only log behind every mutation. See [`log`] for
//! storage and retention mechanics.

pub mod log;

pub use log::EventLog;
