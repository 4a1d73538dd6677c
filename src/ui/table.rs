use tabled::{settings::Style, Table, Tabled};

use crate::schema::ObjectDescriptor;

#[derive(Tabled)]
pub struct SchemaRow {
    #[tabled(rename = "Type")]
    pub type_name: String,
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Columns")]
    pub columns: String,
    #[tabled(rename = "Links")]
    pub links: String,
}

impl From<&ObjectDescriptor> for SchemaRow {
    fn from(desc: &ObjectDescriptor) -> Self {
        let columns = desc
            .columns
            .iter()
            .map(|c| {
                let marker = if c.name == desc.primary_key { " PK" } else { "" };
                format!("{} {}{}", c.name, c.kind, marker)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let links = desc
            .links
            .iter()
            .map(|l| {
                let chained = if l.chained { " (chained)" } else { "" };
                format!("{} -> {}{}", l.column, l.target_type, chained)
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            type_name: desc.type_name.clone(),
            table: desc.table_name.clone(),
            columns,
            links,
        }
    }
}

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub fn schema_table<'a>(descriptors: impl IntoIterator<Item = &'a ObjectDescriptor>) -> String {
    let rows: Vec<SchemaRow> = descriptors.into_iter().map(SchemaRow::from).collect();
    if rows.is_empty() {
        return String::new();
    }
    Table::new(&rows).with(Style::rounded()).to_string()
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let rows: Vec<TableRow> = stats
        .iter()
        .map(|(metric, value)| TableRow {
            metric: metric.to_string(),
            value: value.to_string(),
        })
        .collect();
    if rows.is_empty() {
        return String::new();
    }
    Table::new(&rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnKind;

    #[test]
    fn test_schema_row() {
        let desc = ObjectDescriptor::new("Test", "test")
            .column("length", ColumnKind::Integer)
            .chained_link("link_id", "TestLink");
        let row = SchemaRow::from(&desc);
        assert_eq!(row.columns, "id INTEGER PK, length INTEGER, link_id LINK");
        assert_eq!(row.links, "link_id -> TestLink (chained)");
        assert!(schema_table([&desc]).contains("TestLink"));
        assert!(stats_table(&[]).is_empty());
    }
}
