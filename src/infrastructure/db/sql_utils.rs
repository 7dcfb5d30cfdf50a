use crate::domain::schema::TableSchema;

// ─────────────────────────────────────────────────────────────────────────────
// Query builders
// ─────────────────────────────────────────────────────────────────────────────

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `PRAGMA table_info(...)` for a table name that may need quoting.
pub fn build_table_info_query(table: &str) -> String {
    format!("PRAGMA table_info({})", quote_ident(table))
}

/// Build `SELECT <all columns> FROM <table> WHERE <pk1> = ? AND ...`.
///
/// Columns are selected in schema order so the result row lines up with
/// changeset column positions. Key placeholders follow
/// `schema.primary_key_positions()` order. Returns `None` for a table without
/// a primary key, whose rows cannot be looked up.
pub fn build_lookup_query(schema: &TableSchema) -> Option<String> {
    let keys = schema.primary_key_positions();
    if keys.is_empty() {
        return None;
    }

    let cols: Vec<String> = schema
        .columns
        .iter()
        .map(|c| quote_ident(&c.name.0))
        .collect();
    let predicates: Vec<String> = keys
        .iter()
        .map(|pos| format!("{} = ?", quote_ident(&schema.columns[*pos].name.0)))
        .collect();

    Some(format!(
        "SELECT {} FROM {} WHERE {}",
        cols.join(", "),
        quote_ident(&schema.table.0),
        predicates.join(" AND ")
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{ColumnDef, ColumnType};
    use crate::domain::value_objects::{ColumnName, TableName};

    fn col(name: &str, pk: i64) -> ColumnDef {
        ColumnDef {
            name: ColumnName(name.into()),
            declared_type: "TEXT".into(),
            column_type: ColumnType::Text,
            not_null: false,
            pk_ordinal: pk,
            is_geometry: false,
        }
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("points"), r#""points""#);
        assert_eq!(quote_ident(r#"po"ints"#), r#""po""ints""#);
    }

    #[test]
    fn test_table_info_query() {
        assert_eq!(
            build_table_info_query("my layer"),
            r#"PRAGMA table_info("my layer")"#
        );
    }

    #[test]
    fn test_lookup_query_single_key() {
        let schema = TableSchema {
            table: TableName::new("points"),
            columns: vec![col("fid", 1), col("name", 0), col("geom", 0)],
            geometry: None,
        };
        assert_eq!(
            build_lookup_query(&schema).unwrap(),
            r#"SELECT "fid", "name", "geom" FROM "points" WHERE "fid" = ?"#
        );
    }

    #[test]
    fn test_lookup_query_composite_key_in_ordinal_order() {
        let schema = TableSchema {
            table: TableName::new("rates"),
            columns: vec![col("region", 2), col("category", 1), col("rate", 0)],
            geometry: None,
        };
        let q = build_lookup_query(&schema).unwrap();
        assert!(
            q.ends_with(r#"WHERE "category" = ? AND "region" = ?"#),
            "got: {q}"
        );
    }

    #[test]
    fn test_lookup_query_without_key() {
        let schema = TableSchema {
            table: TableName::new("log"),
            columns: vec![col("msg", 0)],
            geometry: None,
        };
        assert!(build_lookup_query(&schema).is_none());
    }
}
