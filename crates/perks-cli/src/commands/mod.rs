//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init) and shared utilities (open_db, open_pipeline)
//! - `ingest` - Statement ingestion (upload, fetch)
//! - `statements` - Stored statements (list, show, delete, latest)
//! - `analyze` - Single pipeline stages without persistence
//! - `status` - Status command
//! - `prompts` - Prompt library management commands

pub mod analyze;
pub mod core;
pub mod ingest;
pub mod prompts;
pub mod statements;
pub mod status;

// Re-export command functions for main.rs
pub use analyze::*;
pub use core::*;
pub use ingest::*;
pub use prompts::*;
pub use statements::*;
pub use status::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Display form of an optional point balance
pub fn points(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{:.0}", v),
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}
