use serde::Serialize;

use crate::domain::value_objects::{ColumnName, TableName};

/// Semantic column type derived from the declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Date,
    DateTime,
    Blob,
    Geometry,
}

impl ColumnType {
    /// Classify a declared column type using SQLite affinity rules, with the
    /// GeoPackage date and geometry type names recognised first.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_uppercase();
        // strip length/precision, e.g. VARCHAR(20), NUMERIC(10,2)
        let base = upper.split('(').next().unwrap_or("").trim();

        match base {
            "BOOLEAN" | "BOOL" => return ColumnType::Boolean,
            "DATE" => return ColumnType::Date,
            "DATETIME" | "TIMESTAMP" => return ColumnType::DateTime,
            "GEOMETRY" | "POINT" | "LINESTRING" | "POLYGON" | "MULTIPOINT"
            | "MULTILINESTRING" | "MULTIPOLYGON" | "GEOMETRYCOLLECTION" | "CIRCULARSTRING"
            | "COMPOUNDCURVE" | "CURVEPOLYGON" | "MULTICURVE" | "MULTISURFACE" | "CURVE"
            | "SURFACE" => return ColumnType::Geometry,
            _ => {}
        }

        if base.contains("INT") {
            ColumnType::Integer
        } else if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") {
            ColumnType::Text
        } else if base.is_empty() || base.contains("BLOB") {
            ColumnType::Blob
        } else {
            // REAL, FLOA, DOUB and NUMERIC affinity
            ColumnType::Real
        }
    }
}

/// Geometry metadata from the `gpkg_geometry_columns` registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeometryColumn {
    pub column: ColumnName,
    pub geometry_type: String,
    pub srs_id: i64,
    pub has_z: bool,
    pub has_m: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: ColumnName,
    pub declared_type: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    /// Position in the primary key, 1-based; 0 when not part of the key.
    pub pk_ordinal: i64,
    pub is_geometry: bool,
}

impl ColumnDef {
    pub fn is_primary_key(&self) -> bool {
        self.pk_ordinal > 0
    }
}

/// Snapshot of a live table's column layout, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: TableName,
    pub columns: Vec<ColumnDef>,
    pub geometry: Option<GeometryColumn>,
}

impl TableSchema {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn geometry_position(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_geometry)
    }

    /// Column positions of the primary key, ordered by key ordinal.
    pub fn primary_key_positions(&self) -> Vec<usize> {
        let mut keyed: Vec<(i64, usize)> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key())
            .map(|(pos, c)| (c.pk_ordinal, pos))
            .collect();
        keyed.sort_unstable();
        keyed.into_iter().map(|(_, pos)| pos).collect()
    }

    /// Position of the rowid-alias key, if the table has one.
    ///
    /// Only a single-column key declared exactly `INTEGER` aliases the rowid;
    /// `INT`, `BIGINT` and composite keys are user-defined.
    pub fn surrogate_key_position(&self) -> Option<usize> {
        let keys = self.primary_key_positions();
        match keys.as_slice() {
            [pos] if self.columns[*pos].declared_type.trim().eq_ignore_ascii_case("INTEGER") => {
                Some(*pos)
            }
            _ => None,
        }
    }
}
