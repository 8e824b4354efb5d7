//! Utility functions and helpers
//!
//! Atomic file writes and timestamp helpers used by the persistence
//! layer.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write, atomic_write_with, cleanup_temp_files};
pub use time::now_millis;
