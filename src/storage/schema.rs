//! SQL statement text derived from object descriptors

use crate::schema::{ColumnDef, ObjectDescriptor};

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` for a descriptor
pub fn create_table_sql(desc: &ObjectDescriptor) -> String {
    let columns: Vec<String> = desc
        .columns
        .iter()
        .map(|col| column_sql(desc, col))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(&desc.table_name),
        columns.join(",\n    ")
    )
}

fn column_sql(desc: &ObjectDescriptor, col: &ColumnDef) -> String {
    if col.name == desc.primary_key {
        return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(&col.name));
    }
    let mut sql = format!("{} {}", quote_ident(&col.name), col.kind.sql_type());
    if !col.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

/// One index per link column, used by cascades and live counts
pub fn create_index_sqls(desc: &ObjectDescriptor) -> Vec<String> {
    desc.links
        .iter()
        .map(|link| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                quote_ident(&format!("idx_{}_{}", desc.table_name, link.column)),
                quote_ident(&desc.table_name),
                quote_ident(&link.column)
            )
        })
        .collect()
}

/// All statements needed to materialize a descriptor
pub fn all_schema_statements(desc: &ObjectDescriptor) -> Vec<String> {
    let mut stmts = vec![create_table_sql(desc)];
    stmts.extend(create_index_sqls(desc));
    stmts
}

/// Quoted column list in descriptor order
pub fn column_list(desc: &ObjectDescriptor) -> String {
    desc.columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn select_by_id_sql(desc: &ObjectDescriptor) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        column_list(desc),
        quote_ident(&desc.table_name),
        quote_ident(&desc.primary_key)
    )
}

/// Keyset page in natural (key) order
pub fn select_page_sql(desc: &ObjectDescriptor) -> String {
    let pk = quote_ident(&desc.primary_key);
    format!(
        "SELECT {} FROM {} WHERE {} > ?1 ORDER BY {} LIMIT ?2",
        column_list(desc),
        quote_ident(&desc.table_name),
        pk,
        pk
    )
}

pub fn insert_sql(desc: &ObjectDescriptor) -> String {
    let columns: Vec<&ColumnDef> = desc.data_columns().collect();
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&desc.table_name));
    }
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&desc.table_name),
        names.join(", "),
        params.join(", ")
    )
}

/// `None` when the table has no data columns to update
pub fn update_sql(desc: &ObjectDescriptor) -> Option<String> {
    let columns: Vec<&ColumnDef> = desc.data_columns().collect();
    if columns.is_empty() {
        return None;
    }
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote_ident(&c.name), i + 1))
        .collect();
    Some(format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote_ident(&desc.table_name),
        assignments.join(", "),
        quote_ident(&desc.primary_key),
        columns.len() + 1
    ))
}

pub fn exists_sql(desc: &ObjectDescriptor) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} = ?1",
        quote_ident(&desc.table_name),
        quote_ident(&desc.primary_key)
    )
}

/// `?1, ?2, ... ?n`
pub fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnKind;

    fn desc() -> ObjectDescriptor {
        ObjectDescriptor::new("Test", "test")
            .column("length", ColumnKind::Integer)
            .nullable_column("note", ColumnKind::Text)
            .chained_link("link_id", "TestLink")
    }

    #[test]
    fn test_create_table() {
        let sql = create_table_sql(&desc());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"test\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"length\" INTEGER NOT NULL"));
        assert!(sql.contains("\"note\" TEXT,"));
        assert!(sql.contains("\"link_id\" INTEGER\n"));
    }

    #[test]
    fn test_dml_statements() {
        let d = desc();
        assert_eq!(
            insert_sql(&d),
            "INSERT INTO \"test\" (\"length\", \"note\", \"link_id\") VALUES (?1, ?2, ?3)"
        );
        assert_eq!(
            update_sql(&d).unwrap(),
            "UPDATE \"test\" SET \"length\" = ?1, \"note\" = ?2, \"link_id\" = ?3 WHERE \"id\" = ?4"
        );
        assert_eq!(create_index_sqls(&d).len(), 1);
    }

    #[test]
    fn test_key_only_table() {
        let d = ObjectDescriptor::new("Bare", "bare");
        assert_eq!(insert_sql(&d), "INSERT INTO \"bare\" DEFAULT VALUES");
        assert!(update_sql(&d).is_none());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(placeholders(3), "?1, ?2, ?3");
    }
}
