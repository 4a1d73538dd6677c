//! # lazydb - Lightweight object persistence over SQLite
//!
//! Maps plain Rust values onto tables of an embedded SQLite database.
//!
//! lazydb provides:
//! - Static object descriptors (table layout, column kinds, link fields)
//! - A row codec between entities and column/value maps
//! - Nested transaction scopes over the native SQLite transaction
//! - save / get / count / clear / delete with automatic link handling
//! - Cascading clears and live-link counts across linked types

pub mod codec;
pub mod config;
pub mod entity;
pub mod schema;
pub mod storage;
pub mod ui;

// Re-exports for convenient access
pub use codec::{Link, Row, Value};
pub use entity::{Entity, LinkSlot};
pub use schema::{ColumnDef, ColumnKind, LinkField, ObjectDescriptor, OnTargetClear, SchemaRegistry};
pub use storage::{Cursor, Engine, TransactionScope};

/// Result type alias for lazydb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for lazydb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error for {type_name}: {reason}")]
    Schema { type_name: String, reason: String },

    #[error("Unknown object type: {0}")]
    UnknownType(String),

    #[error("Cannot open storage at {path}: {reason}")]
    StorageOpen { path: std::path::PathBuf, reason: String },

    #[error("Saving linked {type_name} failed: {source}")]
    LinkSave {
        type_name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Write to {table} failed: {source}")]
    Write {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Read from {table} failed: {source}")]
    Read {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Column {table}.{column} holds NaN, which SQLite stores as NULL")]
    NotANumber { table: String, column: String },

    #[error("No row in {table} with id {id}")]
    RowMissing { table: String, id: i64 },

    #[error("end_transaction called without a matching begin_transaction")]
    UnbalancedTransaction,

    #[error("Engine is closed")]
    Closed,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn schema(type_name: &str, reason: impl Into<String>) -> Self {
        Error::Schema {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by misuse of the API rather than by the store
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Error::UnbalancedTransaction | Error::Schema { .. } | Error::UnknownType(_) | Error::Closed
        )
    }
}
