pub mod table;

pub use table::{schema_table, stats_table, SchemaRow, TableRow};
