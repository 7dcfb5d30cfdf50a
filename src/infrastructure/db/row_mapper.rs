use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

use crate::domain::changeset::Value;

/// Convert a sqlx `SqliteRow` into positional [`Value`]s.
///
/// Decoding follows each value's runtime storage class, not the declared
/// column type: SQLite's loose affinity lets a `DATE` column hold TEXT or a
/// geometry column hold a BLOB, and the changeset records storage classes
/// the same way.
pub fn row_to_values(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.len()).map(|idx| decode_column(row, idx)).collect()
}

fn decode_column(row: &SqliteRow, idx: usize) -> Result<Value, sqlx::Error> {
    let storage = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_uppercase()
    };

    let value = match storage.as_str() {
        "INTEGER" => Value::Integer(row.try_get::<i64, _>(idx)?),
        "REAL" => Value::Real(row.try_get::<f64, _>(idx)?),
        "TEXT" => Value::Text(row.try_get::<String, _>(idx)?),
        _ => Value::Blob(row.try_get::<Vec<u8>, _>(idx)?),
    };
    Ok(value)
}
