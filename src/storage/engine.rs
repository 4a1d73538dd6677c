//! Persistence engine - save, fetch, count, clear and delete entities

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params_from_iter, Connection, OptionalExtension};

use super::cascade::{self, Selection};
use super::cursor::Cursor;
use super::schema;
use super::transaction::TxState;
use crate::codec::{self, Link, Row, Value};
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::schema::registry::Dependent;
use crate::schema::{ColumnDef, ColumnKind, ObjectDescriptor, SchemaRegistry};
use crate::{Error, Result};

/// SQLite-backed object store.
///
/// Owns the connection, the schema registry and the transaction state. The
/// engine can be moved to a worker thread but not shared between threads.
pub struct Engine {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    registry: RefCell<SchemaRegistry>,
    pub(crate) tx: RefCell<TxState>,
    page_size: usize,
}

impl Engine {
    /// Open `<location>/<prefix>lazy_database.db`, creating the directory if needed
    pub fn open(location: impl AsRef<Path>, name_prefix: Option<&str>) -> Result<Self> {
        let config = EngineConfig {
            storage_location: location.as_ref().to_path_buf(),
            name_prefix: name_prefix.map(str::to_string),
            ..EngineConfig::default()
        };
        Self::with_config(&config)
    }

    /// Open the database described by `config` and register its descriptors
    pub fn with_config(config: &EngineConfig) -> Result<Self> {
        let location = &config.storage_location;
        let path = config.database_path();
        let open_error = |reason: String| Error::StorageOpen {
            path: path.clone(),
            reason,
        };

        if location.exists() && !location.is_dir() {
            return Err(open_error(format!("{} is not a directory", location.display())));
        }
        std::fs::create_dir_all(location).map_err(|e| open_error(e.to_string()))?;

        let conn = Connection::open(&path).map_err(|e| open_error(e.to_string()))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| open_error(e.to_string()))?;
        if let Some(mode) = &config.journal_mode {
            let applied: String = conn
                .pragma_update_and_check(None, "journal_mode", mode, |row| row.get(0))
                .map_err(|e| open_error(e.to_string()))?;
            tracing::debug!("journal_mode = {}", applied);
        }
        // Fails here rather than on first statement when the file is not a database
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| open_error(e.to_string()))?;

        tracing::info!("Opened database {}", path.display());
        let engine = Self::from_connection(conn, Some(path), config.page_size);
        for desc in &config.descriptors {
            engine.register_descriptor(desc.clone())?;
        }
        engine.registry.borrow().check_link_targets()?;
        Ok(engine)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn, None, EngineConfig::default().page_size))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>, page_size: usize) -> Self {
        Self {
            conn: Some(conn),
            path,
            registry: RefCell::new(SchemaRegistry::new()),
            tx: RefCell::new(TxState::default()),
            page_size: page_size.max(1),
        }
    }

    /// Remove the database file named by `location` and `name_prefix`.
    /// Returns false when there was nothing to remove.
    pub fn destroy(location: impl AsRef<Path>, name_prefix: Option<&str>) -> Result<bool> {
        let config = EngineConfig {
            storage_location: location.as_ref().to_path_buf(),
            name_prefix: name_prefix.map(str::to_string),
            ..EngineConfig::default()
        };
        Self::destroy_with_config(&config)
    }

    /// Remove the database file named by `config`, with its journal files
    pub fn destroy_with_config(config: &EngineConfig) -> Result<bool> {
        let path = config.database_path();
        let existed = path.exists();
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if existed {
            tracing::info!("Deleted database {}", path.display());
        }
        Ok(existed)
    }

    /// Release the connection. Open scopes are rolled back. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if self.tx.get_mut().reset() {
            tracing::warn!("Closing with an open transaction; rolling back");
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
        }
        conn.close().map_err(|(_, e)| Error::from(e))?;
        tracing::info!("Closed database");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Database file, `None` for in-memory engines
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::Closed)
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    // ========== Schema ==========

    /// Register `T` (and the types it links to), creating their tables
    pub fn register<T: Entity>(&self) -> Result<Arc<ObjectDescriptor>> {
        let desc = self.registry.borrow_mut().register::<T>()?;
        self.create_pending_tables()?;
        Ok(desc)
    }

    /// Register a descriptor that has no Rust type behind it
    pub fn register_descriptor(&self, desc: ObjectDescriptor) -> Result<Arc<ObjectDescriptor>> {
        let desc = self.registry.borrow_mut().register_descriptor(desc)?;
        self.create_pending_tables()?;
        Ok(desc)
    }

    /// Descriptor of `T`, registered on first use
    pub fn describe<T: Entity>(&self) -> Result<Arc<ObjectDescriptor>> {
        let cached = {
            let registry = self.registry.borrow();
            if registry.is_fully_registered(T::TYPE_NAME) {
                registry.describe(T::TYPE_NAME).ok()
            } else {
                None
            }
        };
        match cached {
            Some(desc) => Ok(desc),
            None => self.register::<T>(),
        }
    }

    /// Descriptor registered under `type_name`
    pub fn describe_type(&self, type_name: &str) -> Result<Arc<ObjectDescriptor>> {
        self.registry.borrow().describe(type_name)
    }

    /// All registered descriptors in registration order
    pub fn descriptors(&self) -> Vec<Arc<ObjectDescriptor>> {
        self.registry.borrow().descriptors().cloned().collect()
    }

    pub(crate) fn dependents_of(&self, type_name: &str) -> Vec<Dependent> {
        self.registry.borrow().dependents_of(type_name).to_vec()
    }

    /// Recreate tables whose creation a rollback may have undone
    pub(crate) fn restore_tables(&self) {
        self.registry.borrow_mut().requeue_all();
        if let Err(e) = self.create_pending_tables() {
            tracing::warn!("Recreating tables after rollback failed: {}", e);
        }
    }

    fn create_pending_tables(&self) -> Result<()> {
        let pending = self.registry.borrow_mut().take_pending();
        if pending.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;
        for desc in pending {
            for stmt in schema::all_schema_statements(&desc) {
                conn.execute(&stmt, []).map_err(|source| Error::Write {
                    table: desc.table_name.clone(),
                    source,
                })?;
            }
            tracing::debug!("Ensured table {}", desc.table_name);
        }
        Ok(())
    }

    // ========== Save ==========

    /// Insert or update `entity`. Returns false on failure, which is logged.
    ///
    /// On first insert the generated key is written back to the entity.
    pub fn save<T: Entity>(&self, entity: &mut T) -> bool {
        match self.try_save(entity) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Saving {} failed: {}", T::TYPE_NAME, e);
                false
            }
        }
    }

    /// Insert or update `entity`, saving unsaved link targets first
    pub fn try_save<T: Entity>(&self, entity: &mut T) -> Result<()> {
        let desc = self.describe::<T>()?;
        let was_new = entity.id() == 0;
        let mut saved_links = Vec::new();

        let result = self.with_scope(|| {
            for (idx, slot) in entity.links_mut().into_iter().enumerate() {
                let inserted = slot.save_target(self).map_err(|e| Error::LinkSave {
                    type_name: slot.target_type().to_string(),
                    source: Box::new(e),
                })?;
                if inserted {
                    saved_links.push(idx);
                }
            }

            let row = codec::encode(&desc, entity);
            if was_new {
                let id = self.insert_row(&desc, &row)?;
                entity.set_id(id);
            } else {
                self.update_row(&desc, entity.id(), &row)?;
            }
            Ok(())
        });

        if result.is_err() {
            // The writes were undone; so are the keys handed out in memory
            if was_new {
                entity.set_id(0);
            }
            for (idx, slot) in entity.links_mut().into_iter().enumerate() {
                if saved_links.contains(&idx) {
                    slot.forget_key();
                }
            }
        }
        result
    }

    fn insert_row(&self, desc: &ObjectDescriptor, row: &Row) -> Result<i64> {
        let conn = self.conn()?;
        let write_error = |source| Error::Write {
            table: desc.table_name.clone(),
            source,
        };
        let values = bound_values(desc, row)?;
        let mut stmt = conn.prepare_cached(&schema::insert_sql(desc)).map_err(write_error)?;
        stmt.execute(params_from_iter(values.iter())).map_err(write_error)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_row(&self, desc: &ObjectDescriptor, id: i64, row: &Row) -> Result<()> {
        let conn = self.conn()?;
        let write_error = |source| Error::Write {
            table: desc.table_name.clone(),
            source,
        };

        let changed = match schema::update_sql(desc) {
            Some(sql) => {
                let mut values = bound_values(desc, row)?;
                values.push(Value::Integer(id));
                let mut stmt = conn.prepare_cached(&sql).map_err(write_error)?;
                stmt.execute(params_from_iter(values.iter())).map_err(write_error)?
            }
            None => conn
                .query_row(&schema::exists_sql(desc), [id], |_| Ok(()))
                .optional()
                .map_err(write_error)?
                .map_or(0, |()| 1),
        };

        if changed == 0 {
            return Err(Error::RowMissing {
                table: desc.table_name.clone(),
                id,
            });
        }
        Ok(())
    }

    // ========== Reads ==========

    /// Fetch the entity with primary key `id`
    pub fn get_with_id<T: Entity>(&self, id: i64) -> Result<Option<T>> {
        let desc = self.describe::<T>()?;
        let row = self.read_row(&desc, id)?;
        Ok(row.map(|row| codec::decode(&desc, &row)))
    }

    /// Fetch a raw row by primary key
    pub fn get_row(&self, type_name: &str, id: i64) -> Result<Option<Row>> {
        let desc = self.describe_type(type_name)?;
        self.read_row(&desc, id)
    }

    fn read_row(&self, desc: &ObjectDescriptor, id: i64) -> Result<Option<Row>> {
        let conn = self.conn()?;
        let read_error = |source| Error::Read {
            table: desc.table_name.clone(),
            source,
        };
        let mut stmt = conn
            .prepare_cached(&schema::select_by_id_sql(desc))
            .map_err(read_error)?;
        stmt.query_row([id], |row| codec::read_row(desc, row))
            .optional()
            .map_err(read_error)
    }

    /// Lazy, one-shot cursor over every row of `T` in insertion order
    pub fn iter_all<T: Entity>(&self) -> Result<Cursor<'_, T>> {
        let desc = self.describe::<T>()?;
        Ok(Cursor::new(self, desc))
    }

    /// Every row of `T` in insertion order
    pub fn get_all<T: Entity>(&self) -> Result<Vec<T>> {
        self.iter_all::<T>()?.collect()
    }

    /// Load a link stored as a bare key. A key with no row stays unresolved.
    pub fn resolve<'l, T: Entity>(&self, link: &'l mut Link<T>) -> Result<Option<&'l T>> {
        if let Link::Key(key) = *link {
            if let Some(target) = self.get_with_id::<T>(key)? {
                *link = Link::new(target);
            }
        }
        Ok(link.get())
    }

    /// Number of rows of `T` whose links all resolve
    pub fn get_count<T: Entity>(&self) -> Result<u64> {
        self.describe::<T>()?;
        self.count_type(T::TYPE_NAME)
    }

    pub fn count_type(&self, type_name: &str) -> Result<u64> {
        let desc = self.describe_type(type_name)?;
        cascade::live_count(self, &desc)
    }

    // ========== Removal ==========

    /// Delete every row of `T`, then clean up rows linked to them
    pub fn clear<T: Entity>(&self) -> Result<()> {
        self.describe::<T>()?;
        self.clear_type(T::TYPE_NAME)
    }

    pub fn clear_type(&self, type_name: &str) -> Result<()> {
        let desc = self.describe_type(type_name)?;
        let removed = self.with_scope(|| cascade::remove_rows(self, &desc, Selection::All))?;
        tracing::info!("Cleared {} ({} rows)", desc.table_name, removed);
        Ok(())
    }

    /// Delete `entity`'s row. Returns false when nothing was deleted.
    pub fn delete<T: Entity>(&self, entity: &T) -> bool {
        match self.delete_with_id::<T>(entity.id()) {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!("Deleting {} {} failed: {}", T::TYPE_NAME, entity.id(), e);
                false
            }
        }
    }

    /// Delete the row with key `id` and cascade. Returns whether it existed.
    pub fn delete_with_id<T: Entity>(&self, id: i64) -> Result<bool> {
        let desc = self.describe::<T>()?;
        if id == 0 {
            return Ok(false);
        }
        let removed = self.with_scope(|| cascade::remove_rows(self, &desc, Selection::Ids(vec![id])))?;
        Ok(removed > 0)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Closing database on drop failed: {}", e);
        }
    }
}

/// Values for the data columns of `desc`, in declaration order
fn bound_values(desc: &ObjectDescriptor, row: &Row) -> Result<Vec<Value>> {
    desc.data_columns()
        .map(|col| match column_value(col, row) {
            Value::Real(v) if v.is_nan() => Err(Error::NotANumber {
                table: desc.table_name.clone(),
                column: col.name.clone(),
            }),
            value => Ok(value),
        })
        .collect()
}

/// Value bound for `col`; NULL in a NOT NULL column becomes the kind's zero
fn column_value(col: &ColumnDef, row: &Row) -> Value {
    match row.get(&col.name) {
        Some(value) if !value.is_null() => value.clone(),
        _ if col.nullable => Value::Null,
        _ => match col.kind {
            ColumnKind::Integer | ColumnKind::Link => Value::Integer(0),
            ColumnKind::Real => Value::Real(0.0),
            ColumnKind::Text => Value::Text(String::new()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note() -> ObjectDescriptor {
        ObjectDescriptor::new("Note", "note")
            .column("title", ColumnKind::Text)
            .nullable_column("score", ColumnKind::Real)
    }

    #[test]
    fn test_descriptor_only_type() {
        let engine = Engine::open_in_memory().unwrap();
        engine.register_descriptor(note()).unwrap();
        assert_eq!(engine.count_type("Note").unwrap(), 0);

        let mut row = Row::new();
        row.set("title", "hello");
        let desc = engine.describe_type("Note").unwrap();
        let id = engine.insert_row(&desc, &row).unwrap();

        let back = engine.get_row("Note", id).unwrap().unwrap();
        assert_eq!(back.get_string("title"), "hello");
        assert_eq!(back.get("score"), Some(&Value::Null));
        assert_eq!(engine.count_type("Note").unwrap(), 1);

        engine.clear_type("Note").unwrap();
        assert_eq!(engine.count_type("Note").unwrap(), 0);
    }

    #[test]
    fn test_update_missing_row() {
        let engine = Engine::open_in_memory().unwrap();
        let desc = engine.register_descriptor(note()).unwrap();
        let err = engine.update_row(&desc, 42, &Row::new()).unwrap_err();
        assert!(matches!(err, Error::RowMissing { id: 42, .. }));
    }

    #[test]
    fn test_column_value_defaults() {
        let desc = note();
        let row = Row::new();
        assert_eq!(column_value(desc.column_def("title").unwrap(), &row), Value::Text(String::new()));
        assert_eq!(column_value(desc.column_def("score").unwrap(), &row), Value::Null);
    }

    #[test]
    fn test_nan_is_rejected() {
        let engine = Engine::open_in_memory().unwrap();
        let desc = engine.register_descriptor(note()).unwrap();
        let mut row = Row::new();
        row.set("title", "t");
        row.set("score", f64::NAN);
        let err = engine.insert_row(&desc, &row).unwrap_err();
        assert!(matches!(err, Error::NotANumber { ref column, .. } if column == "score"));
        assert_eq!(engine.count_type("Note").unwrap(), 0);
    }

    #[test]
    fn test_unknown_type() {
        let engine = Engine::open_in_memory().unwrap();
        assert!(matches!(engine.count_type("Missing"), Err(Error::UnknownType(_))));
    }

    #[test]
    fn test_closed_engine() {
        let mut engine = Engine::open_in_memory().unwrap();
        engine.close().unwrap();
        engine.close().unwrap();
        assert!(engine.is_closed());
        assert!(matches!(engine.begin_transaction(), Err(Error::Closed)));
    }
}
