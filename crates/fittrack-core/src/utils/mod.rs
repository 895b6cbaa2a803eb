//! Utility functions for formatting values for display.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{format_optional, format_timestamp, format_weight, truncate_string};
