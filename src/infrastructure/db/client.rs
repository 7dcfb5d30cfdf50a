use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::debug;

use crate::domain::changeset::Value;
use crate::domain::error::{ExtractError, Result};
use crate::domain::ports::ReferenceRepository;
use crate::domain::schema::{ColumnDef, ColumnType, GeometryColumn, TableSchema};
use crate::domain::value_objects::{ColumnName, TableName};
use crate::infrastructure::db::row_mapper::row_to_values;
use crate::infrastructure::db::sql_utils::{build_lookup_query, build_table_info_query};

/// Read-only access to a GeoPackage working copy through a single connection.
pub struct SqliteReferenceRepository {
    pool: SqlitePool,
}

/// Open `path` read-only and return a `SqliteReferenceRepository`.
///
/// The pool holds exactly one connection; dropping or closing the repository
/// releases it.
pub async fn connect(path: &Path) -> Result<SqliteReferenceRepository> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| ExtractError::database(format!("opening {}", path.display()), e))?;

    debug!("Connected to {}", path.display());

    Ok(SqliteReferenceRepository { pool })
}

impl SqliteReferenceRepository {
    async fn has_table(&self, name: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ExtractError::database(format!("looking up table {name}"), e))?;
        Ok(row.is_some())
    }

    /// `(cid, name, type, notnull, dflt_value, pk)` rows of `PRAGMA table_info`.
    async fn fetch_columns(&self, table: &TableName) -> Result<Vec<ColumnDef>> {
        let sql = build_table_info_query(&table.0);
        debug!("Executing: {}", sql);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExtractError::database(format!("reading columns of {}", table), e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let read = |e: sqlx::Error| ExtractError::database(format!("decoding columns of {}", table), e);
            let name: String = row.try_get("name").map_err(read)?;
            let declared_type: String = row.try_get("type").map_err(read)?;
            let not_null: i64 = row.try_get("notnull").map_err(read)?;
            let pk: i64 = row.try_get("pk").map_err(read)?;

            columns.push(ColumnDef {
                name: ColumnName(name),
                column_type: ColumnType::from_declared(&declared_type),
                declared_type,
                not_null: not_null != 0,
                pk_ordinal: pk,
                is_geometry: false,
            });
        }
        Ok(columns)
    }

    async fn fetch_geometry_column(&self, table: &TableName) -> Result<Option<GeometryColumn>> {
        if !self.has_table("gpkg_geometry_columns").await? {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT column_name, geometry_type_name, srs_id, z, m \
             FROM gpkg_geometry_columns WHERE lower(table_name) = lower(?)",
        )
        .bind(&table.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ExtractError::database(format!("reading geometry column of {}", table), e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let read = |e: sqlx::Error| ExtractError::database(format!("decoding geometry column of {}", table), e);
        let z: i64 = row.try_get("z").map_err(read)?;
        let m: i64 = row.try_get("m").map_err(read)?;

        Ok(Some(GeometryColumn {
            column: ColumnName(row.try_get("column_name").map_err(read)?),
            geometry_type: row.try_get("geometry_type_name").map_err(read)?,
            srs_id: row.try_get("srs_id").map_err(read)?,
            has_z: z != 0,
            has_m: m != 0,
        }))
    }
}

#[async_trait]
impl ReferenceRepository for SqliteReferenceRepository {
    async fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
        if !self.has_table(&table.0).await? {
            return Err(ExtractError::TableNotFound {
                table: table.0.clone(),
            });
        }

        let mut columns = self.fetch_columns(table).await?;
        let geometry = self.fetch_geometry_column(table).await?;

        match &geometry {
            Some(geom) => {
                for col in &mut columns {
                    if col.name.0.eq_ignore_ascii_case(&geom.column.0) {
                        col.is_geometry = true;
                        col.column_type = ColumnType::Geometry;
                    }
                }
            }
            // No registry entry: fall back to a geometry-typed declaration.
            None => {
                if let Some(col) = columns
                    .iter_mut()
                    .find(|c| c.column_type == ColumnType::Geometry)
                {
                    col.is_geometry = true;
                }
            }
        }

        debug!(
            table = %table,
            columns = columns.len(),
            geometry = geometry.as_ref().map(|g| g.column.0.as_str()).unwrap_or("-"),
            "schema introspected"
        );

        Ok(TableSchema {
            table: table.clone(),
            columns,
            geometry,
        })
    }

    async fn feature_tables(&self) -> Result<Vec<TableName>> {
        if !self.has_table("gpkg_contents").await? {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ExtractError::database("reading gpkg_contents", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("table_name")
                    .map(TableName)
                    .map_err(|e| ExtractError::database("decoding gpkg_contents", e))
            })
            .collect()
    }

    async fn fetch_row(&self, schema: &TableSchema, key: &[Value]) -> Result<Option<Vec<Value>>> {
        let Some(sql) = build_lookup_query(schema) else {
            return Ok(None);
        };
        debug!("Executing: {}", sql);

        let mut query = sqlx::query(&sql);
        for value in key {
            query = bind_value(query, value);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExtractError::database(format!("looking up a row of {}", schema.table), e))?;

        row.map(|r| row_to_values(&r))
            .transpose()
            .map_err(|e| ExtractError::database(format!("decoding a row of {}", schema.table), e))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<i64>),
        Value::Integer(i) => query.bind(*i),
        Value::Real(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Blob(b) => query.bind(b.clone()),
    }
}
