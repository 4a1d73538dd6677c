//! Lazy entity cursor
//!
//! Reads a table in key order one page at a time, so a statement is never
//! held open between calls to `next`. The cursor is finite and one-shot:
//! once it returns `None` (or an error) it stays exhausted. Rows inserted
//! while the cursor is live are picked up by later pages.

use std::collections::VecDeque;
use std::sync::Arc;

use super::schema;
use super::Engine;
use crate::codec;
use crate::entity::Entity;
use crate::schema::ObjectDescriptor;
use crate::{Error, Result};

pub struct Cursor<'e, T> {
    engine: &'e Engine,
    desc: Arc<ObjectDescriptor>,
    /// Key of the last row read
    last_key: i64,
    buffer: VecDeque<T>,
    exhausted: bool,
}

impl<'e, T: Entity> Cursor<'e, T> {
    pub(crate) fn new(engine: &'e Engine, desc: Arc<ObjectDescriptor>) -> Self {
        Self {
            engine,
            desc,
            last_key: i64::MIN,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page_size = self.engine.page_size();
        let desc = &self.desc;
        let read_error = |source| Error::Read {
            table: desc.table_name.clone(),
            source,
        };

        let conn = self.engine.conn()?;
        let mut stmt = conn
            .prepare_cached(&schema::select_page_sql(desc))
            .map_err(read_error)?;
        let rows = stmt
            .query_map(rusqlite::params![self.last_key, page_size as i64], |row| {
                codec::read_row(desc, row)
            })
            .map_err(read_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(read_error)?;

        if rows.len() < page_size {
            self.exhausted = true;
        }
        for row in rows {
            let entity: T = codec::decode(desc, &row);
            self.last_key = entity.id();
            self.buffer.push_back(entity);
        }
        Ok(())
    }
}

impl<T: Entity> Iterator for Cursor<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
