//! Row codec - entities to column/value maps and back
//!
//! Decoding is lenient: a missing column or a NULL yields the field's zero
//! value (`0`, `0.0`, `""`, an empty link) rather than an error.

use std::collections::BTreeMap;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::schema::ObjectDescriptor;

/// A single column value.
///
/// `Real(NaN)` is not storable: SQLite turns NaN into NULL, so the engine
/// rejects it with [`Error::NotANumber`](crate::Error::NotANumber).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view; reals are truncated, numeric text is parsed
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Real(v) => Some(*v as i64),
            Value::Text(s) => s.parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(s) => s.parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            // Blobs are not a supported column kind; keep them readable as text
            ValueRef::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        })
    }
}

/// A flat column -> value map for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    /// Store a link as its foreign key, or NULL when the target is unsaved
    pub fn set_link<T: Entity>(&mut self, column: &str, link: &Link<T>) {
        self.set(column, link.key());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn get_i64(&self, column: &str) -> i64 {
        self.get(column).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn get_f64(&self, column: &str) -> f64 {
        self.get(column).and_then(Value::as_f64).unwrap_or_default()
    }

    pub fn get_string(&self, column: &str) -> String {
        match self.get(column) {
            Some(Value::Text(s)) => s.clone(),
            Some(Value::Integer(v)) => v.to_string(),
            Some(Value::Real(v)) => v.to_string(),
            Some(Value::Null) | None => String::new(),
        }
    }

    /// Link stored in `column`; NULL or missing yields an empty link
    pub fn get_link<T>(&self, column: &str) -> Link<T> {
        match self.get(column).and_then(Value::as_i64) {
            Some(key) if key != 0 => Link::Key(key),
            _ => Link::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A link field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Link<T> {
    /// No target
    Empty,
    /// Target known only by its primary key
    Key(i64),
    /// Target held in memory, saved or not
    Loaded(Box<T>),
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Link::Empty
    }
}

impl<T: Entity> Link<T> {
    pub fn new(target: T) -> Self {
        Link::Loaded(Box::new(target))
    }

    /// Foreign key of the target; `None` while it is unsaved
    pub fn key(&self) -> Option<i64> {
        match self {
            Link::Empty => None,
            Link::Key(key) => Some(*key),
            Link::Loaded(target) if target.id() != 0 => Some(target.id()),
            Link::Loaded(_) => None,
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Link::Loaded(target) => Some(target),
            _ => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Link::Loaded(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Link::Empty)
    }
}

/// Encode an entity including its primary key
pub fn encode<T: Entity>(desc: &ObjectDescriptor, entity: &T) -> Row {
    let mut row = Row::new();
    entity.encode(&mut row);
    row.set(&desc.primary_key, entity.id());
    row
}

/// Decode an entity including its primary key
pub fn decode<T: Entity>(desc: &ObjectDescriptor, row: &Row) -> T {
    let mut entity = T::decode(row);
    entity.set_id(row.get_i64(&desc.primary_key));
    entity
}

/// Read a store row into a [`Row`] using the descriptor's column order
pub(crate) fn read_row(desc: &ObjectDescriptor, row: &rusqlite::Row) -> rusqlite::Result<Row> {
    desc.columns
        .iter()
        .enumerate()
        .map(|(idx, col)| Ok((col.name.clone(), row.get::<_, Value>(idx)?)))
        .collect()
}
