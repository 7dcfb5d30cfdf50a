use crate::domain::{
    changeset::Value,
    feature::{FieldDef, FieldType, ReconstructedFeature},
    ports::OutputWriter,
};
use anyhow::{Context, Result};
use serde_json::{Map, Value as JsonValue};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use self::{json::JsonWriter, jsonl::JsonLinesWriter};

pub mod json;
pub mod jsonl;

/// Register available writers - OCP: add new ones without touching main.rs
pub fn all_writers() -> Vec<Box<dyn OutputWriter>> {
    vec![Box::new(JsonWriter::new()), Box::new(JsonLinesWriter::new())]
}

pub fn writer_for(format: &str) -> Option<Box<dyn OutputWriter>> {
    match format {
        "json" => Some(Box::new(JsonWriter::new())),
        "jsonl" => Some(Box::new(JsonLinesWriter::new())),
        _ => None,
    }
}

/// Writes everything the writer accepted to `<dir>/<extraction_id>.<ext>`.
pub fn write_to_file(writer: &dyn OutputWriter, extraction_id: Uuid, dir: &str) -> Result<PathBuf> {
    // Ensure the output directory exists
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output dir {}", dir))?;

    let content = writer.render()?;
    let path = PathBuf::from(dir).join(format!("{}.{}", extraction_id, writer.extension()));
    fs::write(&path, &content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

// ─── Shared feature → JSON conversion ────────────────────────────────────────

/// One feature as a flat JSON object: `_op`, `_key`, every field by name,
/// then `geometry` as hex-encoded WKB.
pub(crate) fn feature_to_json(fields: &[FieldDef], feature: &ReconstructedFeature) -> JsonValue {
    let mut obj = Map::with_capacity(fields.len() + 3);
    obj.insert("_op".into(), JsonValue::from(feature.operation.as_str()));
    obj.insert(
        "_key".into(),
        JsonValue::Array(feature.key.iter().map(|v| value_to_json(v, None)).collect()),
    );
    for (field, value) in fields.iter().zip(&feature.values) {
        obj.insert(field.name.clone(), value_to_json(value, Some(field.field_type)));
    }
    obj.insert(
        "geometry".into(),
        feature
            .geometry
            .as_deref()
            .map_or(JsonValue::Null, |wkb| JsonValue::from(hex::encode(wkb))),
    );
    JsonValue::Object(obj)
}

fn value_to_json(value: &Value, field_type: Option<FieldType>) -> JsonValue {
    match (value, field_type) {
        (Value::Null, _) => JsonValue::Null,
        (Value::Integer(i), Some(FieldType::Boolean)) => JsonValue::Bool(*i != 0),
        (Value::Integer(i), _) => JsonValue::from(*i),
        // NaN and infinities have no JSON form
        (Value::Real(f), _) => serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        (Value::Text(s), _) => JsonValue::from(s.as_str()),
        (Value::Blob(b), _) => JsonValue::from(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changeset::Operation;
    use crate::domain::value_objects::TableName;

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef {
                name: "name".into(),
                field_type: FieldType::Text,
            },
            FieldDef {
                name: "visited".into(),
                field_type: FieldType::Boolean,
            },
        ]
    }

    #[test]
    fn feature_is_flattened_with_op_key_and_hex_geometry() {
        let feature = ReconstructedFeature {
            table: TableName::new("points"),
            operation: Operation::Update,
            key: vec![Value::Integer(7)],
            values: vec![Value::Text("well".into()), Value::Integer(1)],
            geometry: Some(vec![0x01, 0xab]),
        };
        let json = feature_to_json(&fields(), &feature);
        assert_eq!(json["_op"], "update");
        assert_eq!(json["_key"][0], 7);
        assert_eq!(json["name"], "well");
        assert_eq!(json["visited"], true);
        assert_eq!(json["geometry"], "01ab");
    }

    #[test]
    fn nulls_and_non_finite_reals_become_json_null() {
        assert_eq!(value_to_json(&Value::Null, Some(FieldType::Text)), JsonValue::Null);
        assert_eq!(value_to_json(&Value::Real(f64::NAN), None), JsonValue::Null);
        assert_eq!(value_to_json(&Value::Real(1.5), None), 1.5);
    }

    #[test]
    fn blobs_are_lowercase_hex() {
        let blob = Value::Blob(vec![0x00, 0xff, 0x1a]);
        assert_eq!(value_to_json(&blob, Some(FieldType::Binary)), "00ff1a");
        assert_eq!(value_to_json(&Value::Blob(Vec::new()), None), "");
    }

    #[test]
    fn known_formats_have_writers() {
        assert_eq!(writer_for("json").unwrap().extension(), "json");
        assert_eq!(writer_for("jsonl").unwrap().extension(), "jsonl");
        assert!(writer_for("html").is_none());
        assert_eq!(all_writers().len(), 2);
        for writer in all_writers() {
            assert!(writer_for(writer.extension()).is_some());
        }
    }
}
