use anyhow::Result;

use crate::domain::{
    feature::{FieldDef, ReconstructedFeature},
    ports::{FeatureSink, OutputWriter},
    schema::GeometryColumn,
    value_objects::TableName,
};
use crate::presentation::writers::feature_to_json;

/// One compact JSON object per feature, newline separated.
#[derive(Default)]
pub struct JsonLinesWriter {
    fields: Vec<FieldDef>,
    lines: Vec<String>,
}

impl JsonLinesWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureSink for JsonLinesWriter {
    fn begin(
        &mut self,
        _table: &TableName,
        fields: &[FieldDef],
        _geometry: Option<&GeometryColumn>,
    ) -> Result<()> {
        self.fields = fields.to_vec();
        Ok(())
    }

    fn accept(&mut self, feature: ReconstructedFeature) -> Result<()> {
        let line = serde_json::to_string(&feature_to_json(&self.fields, &feature))?;
        self.lines.push(line);
        Ok(())
    }
}

impl OutputWriter for JsonLinesWriter {
    fn render(&self) -> Result<String> {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }

    fn extension(&self) -> &'static str {
        "jsonl"
    }

    fn as_sink(&mut self) -> &mut dyn FeatureSink {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changeset::{Operation, Value};

    #[test]
    fn one_line_per_feature_in_order() {
        let mut writer = JsonLinesWriter::new();
        writer.begin(&TableName::new("points"), &[], None).unwrap();
        for (fid, op) in [(1, Operation::Insert), (2, Operation::Delete)] {
            writer
                .accept(ReconstructedFeature {
                    table: TableName::new("points"),
                    operation: op,
                    key: vec![Value::Integer(fid)],
                    values: Vec::new(),
                    geometry: None,
                })
                .unwrap();
        }

        let out = writer.render().unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["_op"], "insert");
        assert_eq!(first["_key"][0], 1);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn nothing_accepted_renders_empty() {
        assert_eq!(JsonLinesWriter::new().render().unwrap(), "");
    }
}
