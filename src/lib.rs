//! # Outcomedb - Relational result storage for assessment deliveries
//!
//! One delivery-execution attempt is a result row: a caller-supplied
//! result id paired with a test taker and a delivery. Every outcome or
//! response captured during the attempt is a variable, scoped either to
//! one item interaction or to the test as a whole.
//!
//! Outcomedb provides:
//! - A two-table SQLite schema (results, variables) with call-id indexes
//! - Raw storage primitives: single-statement batch inserts, `IN (...)`
//!   filters, whitelisted ordering and offset/limit pagination
//! - The result access API consumed by result-recording and
//!   result-reporting clients
//! - A closed, tagged variable-value model with static property lookup

pub mod codec;
pub mod config;
pub mod results;
pub mod storage;
pub mod variable;

// Re-exports for convenient access
pub use results::{ResultQuery, ResultStorage, VariableRecord};
pub use storage::{OrderDir, OrderField, ResultField, ResultRow, SqliteStore};
pub use variable::{Variable, VariableValue};

/// Result type alias for outcomedb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for outcomedb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Conflicting result row for '{0}'")]
    Conflict(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
