use crate::domain::feature::{FieldDef, FieldMapping, FieldType};
use crate::domain::schema::{ColumnType, TableSchema};

/// Output field list and column→field mapping for one table.
///
/// Fields follow schema column order. The geometry column is carried as the
/// feature geometry rather than a field, and a surrogate rowid key is dropped
/// (it still travels in each feature's key).
pub fn create_field_list(schema: &TableSchema) -> (Vec<FieldDef>, FieldMapping) {
    let geometry_column = schema.geometry_position();
    let surrogate = schema.surrogate_key_position();

    let mut fields = Vec::with_capacity(schema.column_count());
    let mut column_to_field = Vec::with_capacity(schema.column_count());

    for (pos, column) in schema.columns.iter().enumerate() {
        if Some(pos) == geometry_column || Some(pos) == surrogate {
            column_to_field.push(None);
            continue;
        }
        column_to_field.push(Some(fields.len()));
        fields.push(FieldDef {
            name: column.name.0.clone(),
            field_type: field_type(column.column_type),
        });
    }

    let mapping = FieldMapping {
        column_to_field,
        geometry_column,
        key_columns: schema.primary_key_positions(),
        field_count: fields.len(),
    };
    (fields, mapping)
}

fn field_type(column_type: ColumnType) -> FieldType {
    match column_type {
        ColumnType::Integer => FieldType::Integer,
        ColumnType::Real => FieldType::Real,
        ColumnType::Text => FieldType::Text,
        ColumnType::Boolean => FieldType::Boolean,
        ColumnType::Date => FieldType::Date,
        ColumnType::DateTime => FieldType::DateTime,
        // a geometry-typed column that is not the layer geometry stays raw
        ColumnType::Blob | ColumnType::Geometry => FieldType::Binary,
    }
}
