//! Storage layer: schema plus raw SQLite primitives

pub mod schema;
pub mod sqlite;

pub use sqlite::{
    NewVariableRow, OrderDir, OrderField, ResultField, ResultRow, SqliteStore, StoreStats,
    VariableRow, VariableScope,
};
