//! Utility functions and helpers
//!
//! This module contains timestamp utilities shared by the storage backends.

pub mod time;

pub use time::{from_micros, now_utc, to_micros};
