use crate::domain::changeset::Value;
use crate::domain::error::Result;
use crate::domain::ports::ReferenceRepository;
use crate::domain::schema::TableSchema;
use crate::domain::value_objects::TableName;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument};

// ─── PerfReport ──────────────────────────────────────────────────────────────

/// A single timed phase of an extraction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpTiming {
    /// Phase name: "table_schema", "decode" or "materialize".
    pub operation: &'static str,
    /// Table this phase was performed on.
    pub table: String,
    /// Elapsed wall time in milliseconds.
    pub duration_ms: u128,
    /// Number of items involved (columns, records, features).
    pub items: usize,
}

/// Accumulated performance timings for one extraction run.
///
/// Reference lookups are aggregated rather than timed one by one, since an
/// UPDATE-heavy changeset performs one per record.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerfReport {
    pub timings: Vec<OpTiming>,
    pub lookups: usize,
    pub lookup_misses: usize,
    pub lookup_ms: u128,
    pub total_ms: u128,
}

impl PerfReport {
    pub fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub(crate) fn record(report: &Arc<Mutex<Self>>, timing: OpTiming) {
        if let Ok(mut r) = report.lock() {
            r.total_ms += timing.duration_ms;
            r.timings.push(timing);
        }
    }

    fn record_lookup(report: &Arc<Mutex<Self>>, duration_ms: u128, hit: bool) {
        if let Ok(mut r) = report.lock() {
            r.lookups += 1;
            if !hit {
                r.lookup_misses += 1;
            }
            r.lookup_ms += duration_ms;
            r.total_ms += duration_ms;
        }
    }

    /// Copy of the current state.
    pub(crate) fn snapshot(report: &Arc<Mutex<Self>>) -> Self {
        report.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

// ─── MonitoringReferenceRepository ───────────────────────────────────────────

/// Decorator: wraps any `ReferenceRepository`, measures wall time of schema
/// introspection and row lookups, and appends the results to the shared
/// `PerfReport`.
pub struct MonitoringReferenceRepository {
    inner: Arc<dyn ReferenceRepository>,
    report: Arc<Mutex<PerfReport>>,
}

impl MonitoringReferenceRepository {
    pub fn new(inner: Arc<dyn ReferenceRepository>, report: Arc<Mutex<PerfReport>>) -> Self {
        Self { inner, report }
    }
}

#[async_trait]
impl ReferenceRepository for MonitoringReferenceRepository {
    #[instrument(
        name = "table_schema",
        skip(self, table),
        fields(db.table = %table.0),
        level = "info"
    )]
    async fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
        let start = Instant::now();
        let schema = self.inner.table_schema(table).await?;
        let duration_ms = start.elapsed().as_millis();

        info!(
            table = %table.0,
            columns = schema.column_count(),
            geometry = schema.geometry.is_some(),
            duration_ms,
            "table_schema completed"
        );

        PerfReport::record(
            &self.report,
            OpTiming {
                operation: "table_schema",
                table: table.0.clone(),
                duration_ms,
                items: schema.column_count(),
            },
        );

        Ok(schema)
    }

    async fn feature_tables(&self) -> Result<Vec<TableName>> {
        self.inner.feature_tables().await
    }

    #[instrument(
        name = "fetch_row",
        skip(self, schema, key),
        fields(db.table = %schema.table.0),
        level = "debug"
    )]
    async fn fetch_row(&self, schema: &TableSchema, key: &[Value]) -> Result<Option<Vec<Value>>> {
        let start = Instant::now();
        let row = self.inner.fetch_row(schema, key).await?;
        let duration_ms = start.elapsed().as_millis();

        debug!(table = %schema.table.0, found = row.is_some(), duration_ms, "fetch_row completed");
        PerfReport::record_lookup(&self.report, duration_ms, row.is_some());

        Ok(row)
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
