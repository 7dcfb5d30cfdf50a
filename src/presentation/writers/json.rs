use anyhow::Result;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::{
    feature::{FieldDef, ReconstructedFeature},
    ports::{FeatureSink, OutputWriter},
    schema::GeometryColumn,
    value_objects::TableName,
};
use crate::presentation::writers::feature_to_json;

// ─── Serialisation view type ──────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonDocument<'a> {
    table: &'a str,
    fields: &'a [FieldDef],
    #[serde(skip_serializing_if = "Option::is_none")]
    geometry: Option<&'a GeometryColumn>,
    feature_count: usize,
    features: &'a [JsonValue],
}

// ─── Writer ───────────────────────────────────────────────────────────────────

/// Buffers features and renders one pretty-printed JSON document.
#[derive(Default)]
pub struct JsonWriter {
    table: Option<TableName>,
    fields: Vec<FieldDef>,
    geometry: Option<GeometryColumn>,
    features: Vec<JsonValue>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureSink for JsonWriter {
    fn begin(
        &mut self,
        table: &TableName,
        fields: &[FieldDef],
        geometry: Option<&GeometryColumn>,
    ) -> Result<()> {
        self.table = Some(table.clone());
        self.fields = fields.to_vec();
        self.geometry = geometry.cloned();
        Ok(())
    }

    fn accept(&mut self, feature: ReconstructedFeature) -> Result<()> {
        self.features.push(feature_to_json(&self.fields, &feature));
        Ok(())
    }
}

impl OutputWriter for JsonWriter {
    fn render(&self) -> Result<String> {
        let view = JsonDocument {
            table: self.table.as_ref().map_or("", |t| t.as_str()),
            fields: &self.fields,
            geometry: self.geometry.as_ref(),
            feature_count: self.features.len(),
            features: &self.features,
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn as_sink(&mut self) -> &mut dyn FeatureSink {
        self
    }
}
