use serde::Serialize;

use crate::domain::changeset::{Operation, Value};
use crate::domain::error::ExtractError;
use crate::domain::value_objects::TableName;

/// Semantic type of an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    Date,
    DateTime,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

/// Changeset column position → output field position.
///
/// Built once per run from the live schema. Positions that map to `None` are
/// the geometry column and a surrogate rowid key, neither of which becomes an
/// attribute field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub(crate) column_to_field: Vec<Option<usize>>,
    pub(crate) geometry_column: Option<usize>,
    pub(crate) key_columns: Vec<usize>,
    pub(crate) field_count: usize,
}

impl FieldMapping {
    pub fn column_count(&self) -> usize {
        self.column_to_field.len()
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn field_for_column(&self, column: usize) -> Option<usize> {
        self.column_to_field.get(column).copied().flatten()
    }

    pub fn geometry_column(&self) -> Option<usize> {
        self.geometry_column
    }

    /// Primary-key column positions, ordered by key ordinal.
    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    /// Guard against changesets recorded before a schema migration: the
    /// changeset is positional, so any column-count drift makes it unusable.
    pub fn check_column_count(
        &self,
        table: &TableName,
        changeset_columns: usize,
    ) -> Result<(), ExtractError> {
        if changeset_columns != self.column_count() {
            return Err(ExtractError::SchemaMismatch {
                table: table.0.clone(),
                changeset_columns,
                schema_columns: self.column_count(),
            });
        }
        Ok(())
    }
}

/// A changed row rebuilt into a complete feature.
///
/// `values` is parallel to the run's field list and always fully populated;
/// `geometry` is ISO WKB, `None` for a NULL geometry or a table without one.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedFeature {
    pub table: TableName,
    pub operation: Operation,
    pub key: Vec<Value>,
    pub values: Vec<Value>,
    pub geometry: Option<Vec<u8>>,
}
