use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::mapper::create_field_list;
use crate::application::materializer::{FeatureMaterializer, Materialized};
use crate::application::monitoring::{MonitoringReferenceRepository, OpTiming, PerfReport};
use crate::domain::changeset::{ChangesetFile, Summary, TableChanges};
use crate::domain::error::{ExtractError, Result};
use crate::domain::feature::{FieldDef, FieldMapping, ReconstructedFeature};
use crate::domain::fingerprint::fingerprint;
use crate::domain::ports::{ChangeLocation, ChangeLocator, FeatureSink, Feedback, ReferenceRepository};
use crate::domain::schema::{GeometryColumn, TableSchema};
use crate::domain::value_objects::{Fingerprint, TableName};
use crate::infrastructure::changeset::decoder::decode;
use crate::infrastructure::config::LocatorConfig;
use crate::infrastructure::db::client::connect;
use crate::infrastructure::locator::{LayerSource, ProjectLayout};

// ─── Request / Report ───

/// What to extract: one layer of one project working copy.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub project_dir: PathBuf,
    pub layer: LayerSource,
    pub locator: LocatorConfig,
}

impl ExtractionRequest {
    pub fn new(project_dir: impl Into<PathBuf>, layer_source: &str) -> Self {
        Self {
            project_dir: project_dir.into(),
            layer: LayerSource::parse(layer_source),
            locator: LocatorConfig::default(),
        }
    }
}

/// Outcome of one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub extraction_id: Uuid,
    pub table: String,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the changeset bytes; `None` when no changeset file exists.
    pub fingerprint: Option<Fingerprint>,
    pub empty_changeset: bool,
    pub canceled: bool,
    pub records_total: usize,
    pub records_processed: usize,
    pub features_emitted: usize,
    pub warnings: Vec<String>,
    pub skipped_tables: Vec<String>,
    pub summary: Summary,
    pub perf: PerfReport,
}

impl ExtractionReport {
    fn new(table: &TableName, fingerprint: Option<Fingerprint>) -> Self {
        Self {
            extraction_id: Uuid::new_v4(),
            table: table.0.clone(),
            created_at: Utc::now(),
            fingerprint,
            empty_changeset: false,
            canceled: false,
            records_total: 0,
            records_processed: 0,
            features_emitted: 0,
            warnings: Vec::new(),
            skipped_tables: Vec::new(),
            summary: Summary::default(),
            perf: PerfReport::default(),
        }
    }
}

// ─── Run-scoped context ───

/// Everything one run needs once the target table is known.
///
/// Built per run and dropped with it; nothing is shared between runs.
pub struct ExtractionContext<'a> {
    reference: &'a dyn ReferenceRepository,
    schema: TableSchema,
    fields: Vec<FieldDef>,
    mapping: FieldMapping,
    feedback: &'a dyn Feedback,
}

impl<'a> ExtractionContext<'a> {
    /// Introspect `table` and derive its output fields.
    pub async fn prepare(
        reference: &'a dyn ReferenceRepository,
        table: &TableName,
        feedback: &'a dyn Feedback,
    ) -> Result<ExtractionContext<'a>> {
        let schema = reference.table_schema(table).await?;
        let (fields, mapping) = create_field_list(&schema);
        Ok(Self {
            reference,
            schema,
            fields,
            mapping,
            feedback,
        })
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn geometry(&self) -> Option<&GeometryColumn> {
        self.schema.geometry.as_ref()
    }
}

// ─── Extraction Service ───

/// Turns a layer's recorded changeset into reconstructed features.
///
/// One service instance per run: it owns the run's [`PerfReport`].
pub struct ExtractionService {
    perf: Arc<Mutex<PerfReport>>,
}

impl Default for ExtractionService {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionService {
    pub fn new() -> Self {
        Self {
            perf: PerfReport::new(),
        }
    }

    /// Full pipeline: pre-flight, connect, introspect, decode, materialize.
    ///
    /// The reference connection is closed before returning, on success and
    /// on every error after it was opened.
    pub async fn extract(
        &self,
        request: &ExtractionRequest,
        sink: &mut dyn FeatureSink,
        feedback: &dyn Feedback,
    ) -> Result<ExtractionReport> {
        let location = preflight(request)?;

        let repo = Arc::new(connect(&request.layer.path).await?);
        let reference = MonitoringReferenceRepository::new(repo, Arc::clone(&self.perf));

        let result = self
            .extract_located(&reference, request, &location, sink, feedback)
            .await;
        reference.close().await;
        result
    }

    async fn extract_located(
        &self,
        reference: &dyn ReferenceRepository,
        request: &ExtractionRequest,
        location: &ChangeLocation,
        sink: &mut dyn FeatureSink,
        feedback: &dyn Feedback,
    ) -> Result<ExtractionReport> {
        let table = resolve_table(reference, &request.layer).await?;
        let bytes = read_changeset(&location.changeset).await?;
        self.extract_from_bytes(reference, &table, bytes.as_deref(), sink, feedback)
            .await
    }

    /// Pipeline from an already opened reference database and the raw
    /// changeset bytes. `None` means no changeset was ever recorded.
    pub async fn extract_from_bytes(
        &self,
        reference: &dyn ReferenceRepository,
        table: &TableName,
        changeset: Option<&[u8]>,
        sink: &mut dyn FeatureSink,
        feedback: &dyn Feedback,
    ) -> Result<ExtractionReport> {
        let ctx = ExtractionContext::prepare(reference, table, feedback).await?;
        let mut report = ExtractionReport::new(table, changeset.map(fingerprint));

        let start = Instant::now();
        let decoded = match changeset {
            Some(bytes) => decode(bytes)?,
            None => ChangesetFile::default(),
        };
        self.time("decode", table, decoded.record_count(), start);

        let start = Instant::now();
        self.process(&ctx, &decoded, sink, &mut report).await?;
        self.time("materialize", table, report.features_emitted, start);

        report.perf = PerfReport::snapshot(&self.perf);
        info!(
            table = %table,
            records = report.records_processed,
            features = report.features_emitted,
            warnings = report.warnings.len(),
            canceled = report.canceled,
            duration_ms = report.perf.total_ms,
            "extraction completed"
        );
        Ok(report)
    }

    async fn process(
        &self,
        ctx: &ExtractionContext<'_>,
        changeset: &ChangesetFile,
        sink: &mut dyn FeatureSink,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        let table = &ctx.schema.table;
        report.empty_changeset = changeset.is_empty();

        let mut in_scope: Vec<&TableChanges> = Vec::new();
        for block in changeset.blocks() {
            if block.table().0.eq_ignore_ascii_case(&table.0) {
                in_scope.push(block);
            } else {
                warn!(table = %block.table(), records = block.rows().len(), "changes of another table skipped");
                if !report.skipped_tables.contains(&block.table().0) {
                    report.skipped_tables.push(block.table().0.clone());
                }
            }
        }

        // No feature may be emitted from a changeset recorded against another layout.
        for block in &in_scope {
            ctx.mapping.check_column_count(table, block.column_count())?;
        }

        report.records_total = in_scope.iter().map(|b| b.rows().len()).sum();
        sink.begin(table, ctx.fields(), ctx.geometry())
            .map_err(ExtractError::Sink)?;

        let materializer = FeatureMaterializer::new(&ctx.schema, &ctx.mapping, ctx.reference);
        let mut progress = Progress::new(ctx.feedback, report.records_total);

        'records: for block in in_scope {
            for change in block.rows() {
                if ctx.feedback.is_canceled() {
                    info!(table = %table, processed = report.records_processed, "extraction canceled");
                    report.canceled = true;
                    break 'records;
                }

                match materializer.materialize(change).await? {
                    Materialized::Feature(feature) => {
                        report.summary.record(feature.operation);
                        sink.accept(feature).map_err(ExtractError::Sink)?;
                        report.features_emitted += 1;
                    }
                    Materialized::Skipped(reason) => {
                        warn!(table = %table, record = report.records_processed, op = %change.operation(), %reason, "record skipped");
                        report.warnings.push(format!(
                            "record {} ({}): {}",
                            report.records_processed,
                            change.operation(),
                            reason
                        ));
                    }
                }

                report.records_processed += 1;
                progress.advance(report.records_processed);
            }
        }

        if !report.canceled {
            progress.finish();
        }
        Ok(())
    }

    fn time(&self, operation: &'static str, table: &TableName, items: usize, start: Instant) {
        let duration_ms = start.elapsed().as_millis();
        info!(table = %table, items, duration_ms, "{} completed", operation);
        PerfReport::record(
            &self.perf,
            OpTiming {
                operation,
                table: table.0.clone(),
                duration_ms,
                items,
            },
        );
    }
}

/// Monotonic percentage reporter.
struct Progress<'a> {
    feedback: &'a dyn Feedback,
    total: usize,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    fn new(feedback: &'a dyn Feedback, total: usize) -> Self {
        Self {
            feedback,
            total,
            last: None,
        }
    }

    fn advance(&mut self, processed: usize) {
        if self.total == 0 {
            return;
        }
        let percent = (processed.min(self.total) * 100 / self.total) as u8;
        self.report(percent);
    }

    fn finish(&mut self) {
        self.report(100);
    }

    fn report(&mut self, percent: u8) {
        if self.last.map_or(true, |last| percent > last) {
            self.feedback.report_progress(percent);
            self.last = Some(percent);
        }
    }
}

// ─── Pre-flight ───

/// Validate the request and find the layer's history files.
pub fn preflight(request: &ExtractionRequest) -> Result<ChangeLocation> {
    let layout = ProjectLayout::new(&request.project_dir, &request.locator);
    layout.validate()?;
    layout.relative_layer_path(&request.layer.path)?;
    if !request.layer.is_geopackage() {
        return Err(ExtractError::UnsupportedLayer {
            layer: request.layer.path.clone(),
        });
    }
    layout.locate(&request.layer.path)
}

/// Explicit `layername`, or the only feature table of the database.
async fn resolve_table(reference: &dyn ReferenceRepository, layer: &LayerSource) -> Result<TableName> {
    if let Some(name) = &layer.layer_name {
        return Ok(TableName::new(name.as_str()));
    }
    let mut tables = reference.feature_tables().await?;
    if tables.len() == 1 {
        return Ok(tables.remove(0));
    }
    Err(ExtractError::TableNotFound {
        table: layer
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    })
}

/// `None` when the file does not exist: the layer has no local edits.
async fn read_changeset(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(changeset = %path.display(), "no changeset recorded");
            Ok(None)
        }
        Err(source) => Err(ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ─── Feedback / sink implementations ───

/// Feedback that never cancels and ignores progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn report_progress(&self, _percent: u8) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Thread-safe feedback: cancel from a signal handler, read progress anywhere.
#[derive(Debug, Default)]
pub struct AtomicFeedback {
    canceled: AtomicBool,
    progress: AtomicU8,
}

impl AtomicFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }
}

impl Feedback for AtomicFeedback {
    fn report_progress(&self, percent: u8) {
        self.progress.store(percent, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Collects features in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub fields: Vec<FieldDef>,
    pub features: Vec<ReconstructedFeature>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureSink for VecSink {
    fn begin(
        &mut self,
        _table: &TableName,
        fields: &[FieldDef],
        _geometry: Option<&GeometryColumn>,
    ) -> anyhow::Result<()> {
        self.fields = fields.to_vec();
        Ok(())
    }

    fn accept(&mut self, feature: ReconstructedFeature) -> anyhow::Result<()> {
        self.features.push(feature);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::changeset::{Operation, Value};
    use crate::domain::schema::{ColumnDef, ColumnType};
    use crate::domain::value_objects::ColumnName;
    use crate::infrastructure::changeset::builder::ChangesetBuilder;
    use crate::infrastructure::gpkg;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Reference database holding one `points(fid, geom, name)` table.
    struct FakeReference {
        rows: Vec<Vec<Value>>,
    }

    #[async_trait]
    impl ReferenceRepository for FakeReference {
        async fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
            if table.0 != "points" {
                return Err(ExtractError::TableNotFound {
                    table: table.0.clone(),
                });
            }
            let col = |name: &str, declared: &str, pk: i64, geom: bool| ColumnDef {
                name: ColumnName(name.into()),
                declared_type: declared.into(),
                column_type: ColumnType::from_declared(declared),
                not_null: false,
                pk_ordinal: pk,
                is_geometry: geom,
            };
            Ok(TableSchema {
                table: table.clone(),
                columns: vec![
                    col("fid", "INTEGER", 1, false),
                    col("geom", "POINT", 0, true),
                    col("name", "TEXT", 0, false),
                ],
                geometry: None,
            })
        }

        async fn feature_tables(&self) -> Result<Vec<TableName>> {
            Ok(vec![TableName::new("points")])
        }

        async fn fetch_row(&self, _schema: &TableSchema, key: &[Value]) -> Result<Option<Vec<Value>>> {
            Ok(self.rows.iter().find(|r| r[0] == key[0]).cloned())
        }

        async fn close(&self) {}
    }

    fn reference() -> FakeReference {
        FakeReference {
            rows: vec![vec![
                Value::Integer(2),
                Value::Blob(gpkg::from_wkb(4326, &gpkg::point_wkb(1.0, 1.0))),
                Value::Text("kept".into()),
            ]],
        }
    }

    fn points() -> TableName {
        TableName::new("points")
    }

    fn inserts(n: i64) -> Vec<u8> {
        let mut b = ChangesetBuilder::new().table("points", &[1, 0, 0]);
        for fid in 1..=n {
            b = b.insert(&[
                Some(Value::Integer(fid)),
                Some(Value::Null),
                Some(Value::Text(format!("p{fid}"))),
            ]);
        }
        b.build()
    }

    /// Records every progress value and cancels once `after` checks passed.
    struct CancelAfter {
        after: usize,
        checks: AtomicUsize,
        progress: Mutex<Vec<u8>>,
    }

    impl CancelAfter {
        fn new(after: usize) -> Self {
            Self {
                after,
                checks: AtomicUsize::new(0),
                progress: Mutex::new(Vec::new()),
            }
        }
    }

    impl Feedback for CancelAfter {
        fn report_progress(&self, percent: u8) {
            self.progress.lock().unwrap().push(percent);
        }

        fn is_canceled(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst) >= self.after
        }
    }

    #[tokio::test]
    async fn emits_one_feature_per_record_in_order() {
        let bytes = ChangesetBuilder::new()
            .table("points", &[1, 0, 0])
            .insert(&[Some(Value::Integer(5)), Some(Value::Null), Some(Value::Text("new".into()))])
            .update(
                &[Some(Value::Integer(2)), None, Some(Value::Text("kept".into()))],
                &[None, None, Some(Value::Text("renamed".into()))],
            )
            .delete(&[Some(Value::Integer(3)), Some(Value::Null), Some(Value::Text("gone".into()))])
            .build();

        let mut sink = VecSink::new();
        let report = ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(bytes.as_slice()), &mut sink, &NoFeedback)
            .await
            .unwrap();

        let ops: Vec<Operation> = sink.features.iter().map(|f| f.operation).collect();
        assert_eq!(ops, vec![Operation::Insert, Operation::Update, Operation::Delete]);
        assert_eq!(sink.features[1].values, vec![Value::Text("renamed".into())]);
        assert_eq!(sink.features[1].geometry, Some(gpkg::point_wkb(1.0, 1.0)));
        assert_eq!(sink.fields.len(), 1);
        assert_eq!(report.features_emitted, 3);
        assert_eq!(report.summary.total_changes, 3);
        assert_eq!(report.summary.total_updates, 1);
        assert!(report.fingerprint.is_some());
        assert!(!report.empty_changeset);
    }

    #[tokio::test]
    async fn cancellation_stops_after_n_features() {
        let bytes = inserts(10);
        let feedback = CancelAfter::new(4);
        let mut sink = VecSink::new();

        let report = ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(bytes.as_slice()), &mut sink, &feedback)
            .await
            .unwrap();

        assert!(report.canceled);
        assert_eq!(sink.features.len(), 4);
        assert_eq!(report.records_processed, 4);
        assert_eq!(report.records_total, 10);
        let progress = feedback.progress.lock().unwrap();
        assert_eq!(progress.last(), Some(&40));
        assert!(!progress.contains(&100));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_completes() {
        let bytes = inserts(3);
        let feedback = CancelAfter::new(usize::MAX);
        let mut sink = VecSink::new();

        ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(bytes.as_slice()), &mut sink, &feedback)
            .await
            .unwrap();

        let progress = feedback.progress.lock().unwrap().clone();
        assert_eq!(progress, vec![33, 66, 100]);
    }

    #[tokio::test]
    async fn schema_mismatch_emits_nothing() {
        // second block was recorded with four columns
        let bytes = ChangesetBuilder::new()
            .table("points", &[1, 0, 0])
            .insert(&[Some(Value::Integer(1)), Some(Value::Null), Some(Value::Null)])
            .table("points", &[1, 0, 0, 0])
            .insert(&[Some(Value::Integer(2)), Some(Value::Null), Some(Value::Null), Some(Value::Null)])
            .build();
        let mut sink = VecSink::new();

        let err = ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(bytes.as_slice()), &mut sink, &NoFeedback)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::SchemaMismatch { changeset_columns: 4, schema_columns: 3, .. }));
        assert!(sink.features.is_empty());
    }

    #[tokio::test]
    async fn empty_and_missing_changesets_succeed_with_no_output() {
        let feedback = AtomicFeedback::new();
        for bytes in [Some(&b""[..]), None] {
            let mut sink = VecSink::new();
            let report = ExtractionService::new()
                .extract_from_bytes(&reference(), &points(), bytes, &mut sink, &feedback)
                .await
                .unwrap();
            assert!(report.empty_changeset);
            assert_eq!(report.features_emitted, 0);
            assert!(sink.features.is_empty());
        }
        assert_eq!(feedback.progress(), 100);
    }

    #[tokio::test]
    async fn other_tables_are_skipped() {
        let bytes = ChangesetBuilder::new()
            .table("lines", &[1, 0])
            .insert(&[Some(Value::Integer(1)), Some(Value::Null)])
            .table("points", &[1, 0, 0])
            .insert(&[Some(Value::Integer(1)), Some(Value::Null), Some(Value::Null)])
            .build();
        let mut sink = VecSink::new();

        let report = ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(bytes.as_slice()), &mut sink, &NoFeedback)
            .await
            .unwrap();

        assert_eq!(report.skipped_tables, vec!["lines".to_string()]);
        assert_eq!(report.records_total, 1);
        assert_eq!(sink.features.len(), 1);
    }

    #[tokio::test]
    async fn unknown_target_table_fails_before_decoding() {
        let mut sink = VecSink::new();
        let err = ExtractionService::new()
            .extract_from_bytes(&reference(), &TableName::new("lines"), Some(&[0xffu8][..]), &mut sink, &NoFeedback)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "table_not_found");
    }

    #[tokio::test]
    async fn malformed_records_become_warnings() {
        let bytes = ChangesetBuilder::new()
            .table("points", &[1, 0, 0])
            .insert(&[Some(Value::Integer(1)), Some(Value::Blob(vec![0, 1])), Some(Value::Null)])
            .insert(&[Some(Value::Integer(2)), Some(Value::Null), Some(Value::Null)])
            .build();
        let mut sink = VecSink::new();

        let report = ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(bytes.as_slice()), &mut sink, &NoFeedback)
            .await
            .unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.records_processed, 2);
        assert_eq!(sink.features.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_changeset_is_reported() {
        let mut sink = VecSink::new();
        let err = ExtractionService::new()
            .extract_from_bytes(&reference(), &points(), Some(&[0x12u8, 0x00][..]), &mut sink, &NoFeedback)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::CorruptChangeset { offset: 0, .. }));
    }

    #[tokio::test]
    async fn single_feature_table_is_resolved_without_layername() {
        let layer = LayerSource::parse("/tmp/survey.gpkg");
        assert_eq!(resolve_table(&reference(), &layer).await.unwrap(), points());
        let named = LayerSource::parse("/tmp/survey.gpkg|layername=lines");
        assert_eq!(resolve_table(&reference(), &named).await.unwrap().0, "lines");
    }

    #[test]
    fn non_geopackage_layer_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".mergin")).unwrap();
        std::fs::write(dir.path().join("roads.shp"), b"").unwrap();

        let request = ExtractionRequest::new(dir.path(), &dir.path().join("roads.shp").to_string_lossy());
        assert_eq!(preflight(&request).unwrap_err().kind(), "unsupported_layer");
    }
}
