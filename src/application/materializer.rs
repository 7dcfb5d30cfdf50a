use std::fmt;
use tracing::debug;

use crate::domain::changeset::{Operation, RowChange, Value};
use crate::domain::error::Result;
use crate::domain::feature::{FieldMapping, ReconstructedFeature};
use crate::domain::ports::ReferenceRepository;
use crate::domain::schema::TableSchema;
use crate::infrastructure::gpkg::{self, GeometryError};

/// Why a record produced no feature.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// UPDATE needs a reference lookup but its key columns carry no value.
    MissingKey,
    /// Geometry value is not a readable GeoPackage blob.
    InvalidGeometry(GeometryError),
    /// Geometry column holds a non-blob value.
    NonBlobGeometry(&'static str),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingKey => f.write_str("update record has no primary key value"),
            SkipReason::InvalidGeometry(e) => write!(f, "invalid geometry: {e}"),
            SkipReason::NonBlobGeometry(t) => write!(f, "geometry column holds a {t} value"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Feature(ReconstructedFeature),
    Skipped(SkipReason),
}

/// Rebuilds complete features from row changes of one table.
///
/// # Fill policy
/// - INSERT: new values only, never touches the reference database.
/// - DELETE: old values only.
/// - UPDATE: the new value where one was recorded; otherwise the column's
///   current value in the reference row looked up by primary key. A missing
///   reference row leaves those columns NULL, except unchanged key columns,
///   which keep their recorded old value.
///
/// Absent values that cannot be filled become `Value::Null`, so every
/// emitted feature is fully populated.
pub struct FeatureMaterializer<'a> {
    schema: &'a TableSchema,
    mapping: &'a FieldMapping,
    reference: &'a dyn ReferenceRepository,
}

impl<'a> FeatureMaterializer<'a> {
    pub fn new(
        schema: &'a TableSchema,
        mapping: &'a FieldMapping,
        reference: &'a dyn ReferenceRepository,
    ) -> Self {
        Self {
            schema,
            mapping,
            reference,
        }
    }

    pub async fn materialize(&self, change: &RowChange) -> Result<Materialized> {
        let row = match change.operation() {
            Operation::Insert => change
                .slots()
                .iter()
                .map(|s| s.new.clone().unwrap_or(Value::Null))
                .collect(),
            Operation::Delete => change
                .slots()
                .iter()
                .map(|s| s.old.clone().unwrap_or(Value::Null))
                .collect(),
            Operation::Update => match self.fill_update(change).await? {
                Some(row) => row,
                None => return Ok(Materialized::Skipped(SkipReason::MissingKey)),
            },
        };

        let key = self
            .mapping
            .key_columns()
            .iter()
            .map(|pos| row.get(*pos).cloned().unwrap_or(Value::Null))
            .collect();

        let geometry = match self.mapping.geometry_column().and_then(|pos| row.get(pos)) {
            None | Some(Value::Null) => None,
            Some(Value::Blob(blob)) => match gpkg::to_wkb(blob) {
                Ok(wkb) => Some(wkb),
                Err(e) => return Ok(Materialized::Skipped(SkipReason::InvalidGeometry(e))),
            },
            Some(other) => {
                return Ok(Materialized::Skipped(SkipReason::NonBlobGeometry(
                    other.type_name(),
                )))
            }
        };

        let mut values = vec![Value::Null; self.mapping.field_count()];
        for (column, value) in row.into_iter().enumerate() {
            if let Some(field) = self.mapping.field_for_column(column) {
                values[field] = value;
            }
        }

        Ok(Materialized::Feature(ReconstructedFeature {
            table: self.schema.table.clone(),
            operation: change.operation(),
            key,
            values,
            geometry,
        }))
    }

    /// Full row for an UPDATE, or `None` when a lookup is needed but the
    /// key cannot be determined.
    async fn fill_update(&self, change: &RowChange) -> Result<Option<Vec<Value>>> {
        let slots = change.slots();
        let needs_fill = slots.iter().any(|s| s.new.is_none());

        let reference = if needs_fill {
            let Some(key) = self.update_key(change) else {
                return Ok(None);
            };
            let found = self.reference.fetch_row(self.schema, &key).await?;
            if found.is_none() {
                debug!(table = %self.schema.table, ?key, "reference row missing, unchanged columns left NULL");
            }
            found
        } else {
            None
        };

        let key_columns = self.mapping.key_columns();
        let row = slots
            .iter()
            .enumerate()
            .map(|(pos, slot)| match &slot.new {
                Some(value) => value.clone(),
                None => reference
                    .as_ref()
                    .and_then(|r| r.get(pos).cloned())
                    // an unchanged key is recorded on the old side
                    .or_else(|| key_columns.contains(&pos).then(|| slot.old.clone()).flatten())
                    .unwrap_or(Value::Null),
            })
            .collect();
        Ok(Some(row))
    }

    /// Current key of the updated row: the new value if the key itself
    /// changed, otherwise the old one.
    fn update_key(&self, change: &RowChange) -> Option<Vec<Value>> {
        self.mapping
            .key_columns()
            .iter()
            .map(|pos| {
                let slot = change.slot(*pos)?;
                slot.new.clone().or_else(|| slot.old.clone())
            })
            .collect()
    }
}
