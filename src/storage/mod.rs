//! Storage Layer - SQLite-backed persistence
//!
//! One table per registered object type:
//! - `id INTEGER PRIMARY KEY AUTOINCREMENT` (or the descriptor's key column)
//! - one column per data field
//! - one nullable INTEGER column per link field, indexed

mod cascade;
pub mod cursor;
pub mod engine;
pub mod schema;
pub mod transaction;

pub use cursor::Cursor;
pub use engine::Engine;
pub use transaction::TransactionScope;
