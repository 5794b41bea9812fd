//! Utility functions and helpers

pub mod time;

pub use time::{current_timestamp, duration_ms};
