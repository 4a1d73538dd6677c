//! Object descriptors - the table layout of a persisted type
//!
//! A descriptor is static metadata supplied by the caller (or a code
//! generator) for each object type:
//! - `table_name`: the backing table
//! - `columns`: ordered column definitions with their kind
//! - `primary_key`: the single INTEGER key column
//! - `links`: link fields referencing other object types

pub mod registry;

pub use registry::SchemaRegistry;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Semantic kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnKind {
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Real,
    /// UTF-8 text
    Text,
    /// Foreign key to another object type's primary key
    Link,
}

impl ColumnKind {
    /// Get the string representation of the column kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
            ColumnKind::Link => "LINK",
        }
    }

    /// SQLite storage type used for the column
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Link => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

impl FromStr for ColumnKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "integer" | "int" | "long" => Ok(ColumnKind::Integer),
            "real" | "double" | "float" => Ok(ColumnKind::Real),
            "text" | "string" => Ok(ColumnKind::Text),
            "link" | "ref" | "reference" => Ok(ColumnKind::Link),
            _ => Err(Error::schema("column", format!("unknown column kind: {}", s))),
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: kind == ColumnKind::Link,
        }
    }
}

/// What happens to a dependent row when the row its link points at disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTargetClear {
    /// Remove the dependent row
    #[default]
    Delete,
    /// Keep the dependent row and null out the link column
    SetNull,
}

/// A link field: a foreign-key column pointing at another object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkField {
    /// Foreign-key column in the owning table
    pub column: String,
    /// Type name of the referenced object type
    pub target_type: String,
    #[serde(default)]
    pub on_target_clear: OnTargetClear,
    /// The target row is owned by this row and is removed with it
    #[serde(default)]
    pub chained: bool,
}

/// Table layout of one object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub type_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: String,
    #[serde(default)]
    pub links: Vec<LinkField>,
}

impl ObjectDescriptor {
    /// Start a descriptor with the conventional `id` primary key
    pub fn new(type_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table_name: table_name.into(),
            columns: vec![ColumnDef {
                name: "id".to_string(),
                kind: ColumnKind::Integer,
                nullable: false,
            }],
            primary_key: "id".to_string(),
            links: Vec::new(),
        }
    }

    /// Rename the primary key column
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == self.primary_key) {
            col.name = name.clone();
        }
        self.primary_key = name;
        self
    }

    /// Add a non-nullable data column
    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.columns.push(ColumnDef::new(name, kind));
        self
    }

    /// Add a nullable data column
    pub fn nullable_column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        let mut col = ColumnDef::new(name, kind);
        col.nullable = true;
        self.columns.push(col);
        self
    }

    /// Add a link whose dependent rows are deleted when the target disappears
    pub fn link(self, column: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.link_with(column, target_type, OnTargetClear::Delete, false)
    }

    /// Add a link that owns its target: removing this row removes the target
    pub fn chained_link(self, column: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.link_with(column, target_type, OnTargetClear::SetNull, true)
    }

    /// Add a link with an explicit policy
    pub fn link_with(
        mut self,
        column: impl Into<String>,
        target_type: impl Into<String>,
        on_target_clear: OnTargetClear,
        chained: bool,
    ) -> Self {
        let column = column.into();
        self.columns.push(ColumnDef::new(column.clone(), ColumnKind::Link));
        self.links.push(LinkField {
            column,
            target_type: target_type.into(),
            on_target_clear,
            chained,
        });
        self
    }

    /// Look up a column by name
    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns other than the primary key, in declaration order
    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(move |c| c.name != self.primary_key)
    }

    /// Links that own their target
    pub fn chained_links(&self) -> impl Iterator<Item = &LinkField> {
        self.links.iter().filter(|l| l.chained)
    }

    /// Check the descriptor is usable as a table layout
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::schema(&self.type_name, reason));

        if self.type_name.is_empty() {
            return fail("empty type name".to_string());
        }
        if !is_identifier(&self.table_name) {
            return fail(format!("invalid table name '{}'", self.table_name));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !is_identifier(&col.name) {
                return fail(format!("invalid column name '{}'", col.name));
            }
            if !seen.insert(col.name.as_str()) {
                return fail(format!("duplicate column '{}'", col.name));
            }
        }

        match self.column_def(&self.primary_key) {
            None => return fail(format!("no primary key column '{}'", self.primary_key)),
            Some(pk) if pk.kind != ColumnKind::Integer => {
                return fail(format!("primary key '{}' must be INTEGER", pk.name));
            }
            Some(pk) if pk.nullable => {
                return fail(format!("primary key '{}' must not be nullable", pk.name));
            }
            Some(_) => {}
        }

        let mut linked = HashSet::new();
        for link in &self.links {
            match self.column_def(&link.column) {
                Some(col) if col.kind == ColumnKind::Link && col.nullable => {}
                Some(_) => {
                    return fail(format!("link column '{}' must be a nullable LINK", link.column));
                }
                None => return fail(format!("link column '{}' is not declared", link.column)),
            }
            if link.target_type.is_empty() {
                return fail(format!("link column '{}' has no target type", link.column));
            }
            if !linked.insert(link.column.as_str()) {
                return fail(format!("link column '{}' declared twice", link.column));
            }
        }

        if let Some(col) = self
            .columns
            .iter()
            .find(|c| c.kind == ColumnKind::Link && !linked.contains(c.name.as_str()))
        {
            return fail(format!("LINK column '{}' has no link field", col.name));
        }

        Ok(())
    }
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObjectDescriptor {
        ObjectDescriptor::new("Test", "test")
            .column("length", ColumnKind::Integer)
            .column("random_real", ColumnKind::Real)
            .chained_link("link_id", "TestLink")
    }

    #[test]
    fn test_builder_layout() {
        let desc = sample();
        assert_eq!(desc.primary_key, "id");
        assert_eq!(desc.columns.len(), 4);
        assert_eq!(desc.data_columns().count(), 3);
        assert!(desc.column_def("link_id").unwrap().nullable);
        assert_eq!(desc.chained_links().count(), 1);
        desc.validate().unwrap();
    }

    #[test]
    fn test_missing_primary_key_rejected() {
        let mut desc = sample();
        desc.primary_key = "missing".to_string();
        let err = desc.validate().unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn test_non_nullable_link_rejected() {
        let mut desc = sample();
        desc.columns.iter_mut().find(|c| c.name == "link_id").unwrap().nullable = false;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_bad_identifiers_rejected() {
        assert!(ObjectDescriptor::new("T", "drop table").validate().is_err());
        assert!(ObjectDescriptor::new("T", "t").column("1abc", ColumnKind::Text).validate().is_err());
        assert!(ObjectDescriptor::new("T", "t")
            .column("a", ColumnKind::Text)
            .column("a", ColumnKind::Real)
            .validate()
            .is_err());
    }

    #[test]
    fn test_renamed_primary_key() {
        let desc = ObjectDescriptor::new("T", "t").primary_key("_id");
        assert_eq!(desc.columns[0].name, "_id");
        desc.validate().unwrap();
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("double".parse::<ColumnKind>().unwrap(), ColumnKind::Real);
        assert_eq!("LINK".parse::<ColumnKind>().unwrap(), ColumnKind::Link);
        assert!("blob".parse::<ColumnKind>().is_err());
    }
}
