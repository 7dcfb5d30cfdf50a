use crate::domain::{
    changeset::Value,
    error::Result as ExtractResult,
    feature::{FieldDef, ReconstructedFeature},
    schema::{GeometryColumn, TableSchema},
    value_objects::TableName,
};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Where the last-synced base snapshot and the recorded changeset of a layer live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLocation {
    pub base: PathBuf,
    pub changeset: PathBuf,
}

/// Port: resolve a layer's history files (implemented by ProjectLayout)
pub trait ChangeLocator: Send + Sync {
    /// Fails with `NoBaseFile` when the layer was never synced.
    fn locate(&self, layer_path: &Path) -> ExtractResult<ChangeLocation>;
}

/// Port: read access to the working-copy database (implemented by SqliteReferenceRepository)
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    /// Introspect the live column layout of `table`.
    async fn table_schema(&self, table: &TableName) -> ExtractResult<TableSchema>;

    /// Tables registered as feature layers in the database's content registry.
    async fn feature_tables(&self) -> ExtractResult<Vec<TableName>>;

    /// Fetch the current row whose primary key equals `key`.
    ///
    /// `key` is ordered like `schema.primary_key_positions()`. The returned
    /// values follow `schema.columns` order. `Ok(None)` means no such row.
    async fn fetch_row(&self, schema: &TableSchema, key: &[Value])
        -> ExtractResult<Option<Vec<Value>>>;

    /// Release the underlying connection. Idempotent.
    async fn close(&self);
}

/// Port: downstream consumer of reconstructed features
pub trait FeatureSink: Send {
    /// Called once with the output layout before the first feature.
    fn begin(
        &mut self,
        _table: &TableName,
        _fields: &[FieldDef],
        _geometry: Option<&GeometryColumn>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called once per feature, in changeset record order.
    fn accept(&mut self, feature: ReconstructedFeature) -> Result<()>;
}

/// Port: progress reporting and cooperative cancellation
pub trait Feedback: Send + Sync {
    /// `percent` is in `0..=100` and never decreases within a run.
    fn report_progress(&self, percent: u8);

    fn is_canceled(&self) -> bool;
}

/// Port: file output of a finished extraction (implemented by JsonWriter, JsonLinesWriter)
pub trait OutputWriter: FeatureSink {
    /// Serializes everything accepted so far (JSON, JSON lines, ...)
    fn render(&self) -> Result<String>;
    /// Extension of the produced file (e.g. "json", "jsonl")
    fn extension(&self) -> &'static str;
    /// The writer as a plain sink for the extraction run.
    fn as_sink(&mut self) -> &mut dyn FeatureSink;
}
