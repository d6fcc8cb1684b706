//! Shared utility functions.
//!
//! Text helpers used across the codebase:
//! - String truncation (UTF-8 safe, boundary-aware)
//! - Error-message snippets for session views and event streams

mod text;

pub use text::{error_snippet, truncate_with_marker};
