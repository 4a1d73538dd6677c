//! Cascade resolver - keeps links pointing at live rows
//!
//! Removing rows of a type triggers, in order:
//! 1. removal of the rows its chained links own
//! 2. a sweep of every dependent link (from the reverse-link index) whose
//!    value no longer resolves: the dependent row is deleted, or its link
//!    column set to NULL, per the link's `on_target_clear`
//!
//! Deleting dependents can orphan further rows, so the sweep runs as a
//! worklist until no rows change. Callers run this inside a scope.

use std::collections::VecDeque;

use rusqlite::params_from_iter;

use super::schema::{placeholders, quote_ident};
use super::Engine;
use crate::schema::{LinkField, ObjectDescriptor, OnTargetClear};
use crate::{Error, Result};

/// Bound parameters per `IN (...)` list
const CHUNK: usize = 500;

/// Rows of one table to remove
#[derive(Debug, Clone)]
pub(crate) enum Selection {
    All,
    Ids(Vec<i64>),
}

/// Remove the selected rows and everything that depended on them.
/// Returns the number of rows removed from `desc`'s own table.
pub(crate) fn remove_rows(engine: &Engine, desc: &ObjectDescriptor, selection: Selection) -> Result<usize> {
    let mut cascade = Cascade {
        engine,
        touched: VecDeque::new(),
    };
    let removed = cascade.delete(desc, &selection)?;
    cascade.sweep()?;
    Ok(removed)
}

/// Rows of `desc` whose non-null links all resolve to live rows
pub(crate) fn live_count(engine: &Engine, desc: &ObjectDescriptor) -> Result<u64> {
    let mut conditions = Vec::new();
    for link in &desc.links {
        let target = engine.describe_type(&link.target_type)?;
        let column = quote_ident(&link.column);
        conditions.push(format!(
            "({} IS NULL OR {} IN (SELECT {} FROM {}))",
            column,
            column,
            quote_ident(&target.primary_key),
            quote_ident(&target.table_name)
        ));
    }

    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&desc.table_name));
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    let count: i64 = engine
        .conn()?
        .query_row(&sql, [], |row| row.get(0))
        .map_err(|source| Error::Read {
            table: desc.table_name.clone(),
            source,
        })?;
    Ok(count as u64)
}

struct Cascade<'e> {
    engine: &'e Engine,
    /// Types that lost rows and still need their dependents swept
    touched: VecDeque<String>,
}

impl Cascade<'_> {
    fn delete(&mut self, desc: &ObjectDescriptor, selection: &Selection) -> Result<usize> {
        // Owned targets must be read before the owner rows disappear
        let mut owned = Vec::new();
        for link in desc.chained_links() {
            let keys = self.linked_keys(desc, link, selection)?;
            if !keys.is_empty() {
                owned.push((link.target_type.clone(), keys));
            }
        }

        let removed = self.delete_rows(desc, selection)?;
        if removed > 0 {
            tracing::debug!("Removed {} rows from {}", removed, desc.table_name);
            if !self.touched.contains(&desc.type_name) {
                self.touched.push_back(desc.type_name.clone());
            }
        }

        for (target_type, keys) in owned {
            let target = self.engine.describe_type(&target_type)?;
            self.delete(&target, &Selection::Ids(keys))?;
        }
        Ok(removed)
    }

    fn sweep(&mut self) -> Result<()> {
        while let Some(type_name) = self.touched.pop_front() {
            let target = self.engine.describe_type(&type_name)?;
            for dependent in self.engine.dependents_of(&type_name) {
                let desc = self.engine.describe_type(&dependent.type_name)?;
                match dependent.link.on_target_clear {
                    OnTargetClear::Delete => {
                        let orphans = self.orphan_keys(&desc, &dependent.link, &target)?;
                        if !orphans.is_empty() {
                            self.delete(&desc, &Selection::Ids(orphans))?;
                        }
                    }
                    OnTargetClear::SetNull => {
                        self.null_orphans(&desc, &dependent.link, &target)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn delete_rows(&self, desc: &ObjectDescriptor, selection: &Selection) -> Result<usize> {
        let conn = self.engine.conn()?;
        let table = quote_ident(&desc.table_name);
        let write_error = |source| Error::Write {
            table: desc.table_name.clone(),
            source,
        };

        match selection {
            Selection::All => conn
                .execute(&format!("DELETE FROM {}", table), [])
                .map_err(write_error),
            Selection::Ids(ids) => {
                let mut removed = 0;
                for chunk in ids.chunks(CHUNK) {
                    let sql = format!(
                        "DELETE FROM {} WHERE {} IN ({})",
                        table,
                        quote_ident(&desc.primary_key),
                        placeholders(chunk.len())
                    );
                    removed += conn
                        .execute(&sql, params_from_iter(chunk.iter()))
                        .map_err(write_error)?;
                }
                Ok(removed)
            }
        }
    }

    /// Distinct non-null values of `link` among the selected rows
    fn linked_keys(&self, desc: &ObjectDescriptor, link: &LinkField, selection: &Selection) -> Result<Vec<i64>> {
        let base = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_ident(&link.column),
            table = quote_ident(&desc.table_name)
        );
        match selection {
            Selection::All => self.query_keys(desc, &base, &[]),
            Selection::Ids(ids) => {
                let mut keys = Vec::new();
                for chunk in ids.chunks(CHUNK) {
                    let sql = format!(
                        "{} AND {} IN ({})",
                        base,
                        quote_ident(&desc.primary_key),
                        placeholders(chunk.len())
                    );
                    keys.extend(self.query_keys(desc, &sql, chunk)?);
                }
                keys.sort_unstable();
                keys.dedup();
                Ok(keys)
            }
        }
    }

    /// Keys of `desc` rows whose `link` points at a missing `target` row
    fn orphan_keys(&self, desc: &ObjectDescriptor, link: &LinkField, target: &ObjectDescriptor) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT {pk} FROM {table} WHERE {col} IS NOT NULL AND {col} NOT IN (SELECT {tpk} FROM {ttable})",
            pk = quote_ident(&desc.primary_key),
            table = quote_ident(&desc.table_name),
            col = quote_ident(&link.column),
            tpk = quote_ident(&target.primary_key),
            ttable = quote_ident(&target.table_name)
        );
        self.query_keys(desc, &sql, &[])
    }

    fn null_orphans(&self, desc: &ObjectDescriptor, link: &LinkField, target: &ObjectDescriptor) -> Result<usize> {
        let sql = format!(
            "UPDATE {table} SET {col} = NULL WHERE {col} IS NOT NULL AND {col} NOT IN (SELECT {tpk} FROM {ttable})",
            table = quote_ident(&desc.table_name),
            col = quote_ident(&link.column),
            tpk = quote_ident(&target.primary_key),
            ttable = quote_ident(&target.table_name)
        );
        let nulled = self
            .engine
            .conn()?
            .execute(&sql, [])
            .map_err(|source| Error::Write {
                table: desc.table_name.clone(),
                source,
            })?;
        if nulled > 0 {
            tracing::debug!("Nulled {} dangling {}.{} links", nulled, desc.table_name, link.column);
        }
        Ok(nulled)
    }

    fn query_keys(&self, desc: &ObjectDescriptor, sql: &str, params: &[i64]) -> Result<Vec<i64>> {
        let read_error = |source| Error::Read {
            table: desc.table_name.clone(),
            source,
        };
        let conn = self.engine.conn()?;
        let mut stmt = conn.prepare(sql).map_err(read_error)?;
        let keys = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))
            .map_err(read_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(read_error)?;
        Ok(keys)
    }
}
