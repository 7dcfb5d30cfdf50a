use anyhow::{Context, Result};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of geodelta's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                               |
/// |---------|-----------------|-------------------------------------------|
/// | `Error` | `error`         | `--quiet` / CI scripting                  |
/// | `Info`  | `info`          | Default, shows per-phase timings          |
/// | `Debug` | `debug`         | `--verbose`, shows SQL and lookup misses  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for geodelta.
///
/// This is a convenience wrapper around `tracing_subscriber`. It respects
/// `RUST_LOG` when set, falling back to `level` otherwise.
///
/// Call this **once** at application startup. Library consumers who manage
/// their own subscriber should skip this and configure tracing themselves.
///
/// Only available when the `cli` feature is enabled (pulls in
/// `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "geodelta=error",
        LogLevel::Info  => "geodelta=info",
        LogLevel::Debug => "geodelta=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API Facade ───

pub use application::extraction::{
    AtomicFeedback, ExtractionContext, ExtractionReport, ExtractionRequest, ExtractionService,
    NoFeedback, VecSink,
};
pub use application::monitoring::PerfReport;
pub use domain::changeset::{ChangesetFile, ColumnSlot, Operation, RowChange, Summary, TableChanges, Value};
pub use domain::error::ExtractError;
pub use domain::feature::{FieldDef, FieldType, ReconstructedFeature};
pub use domain::fingerprint::fingerprint;
pub use domain::ports::{ChangeLocator, FeatureSink, Feedback, OutputWriter, ReferenceRepository};
pub use domain::schema::{ColumnDef, ColumnType, GeometryColumn, TableSchema};
pub use domain::value_objects::{ColumnName, Fingerprint, TableName};
pub use infrastructure::changeset::builder::ChangesetBuilder;
pub use infrastructure::changeset::decoder::decode;
pub use infrastructure::config::{AppConfig, LayerConfig, LocatorConfig, OutputConfig, ProjectConfig};
pub use infrastructure::locator::{LayerSource, ProjectLayout};

// ─── Public entry points ───

/// Extract the layer named by `cfg` into `sink`.
///
/// Builds the request from the `[project]`, `[layer]` and `[locator]`
/// sections, then runs the full pipeline.
pub async fn run(
    cfg: &AppConfig,
    sink: &mut dyn FeatureSink,
    feedback: &dyn Feedback,
) -> Result<ExtractionReport> {
    let request = request_from_config(cfg)?;
    extract(&request, sink, feedback)
        .await
        .with_context(|| format!("Extraction failed for layer {}", request.layer.path.display()))
}

/// Extract one layer with a fresh run-scoped service.
pub async fn extract(
    request: &ExtractionRequest,
    sink: &mut dyn FeatureSink,
    feedback: &dyn Feedback,
) -> std::result::Result<ExtractionReport, ExtractError> {
    ExtractionService::new().extract(request, sink, feedback).await
}

/// Turn configuration into an [`ExtractionRequest`].
///
/// A relative layer path is resolved against the project directory.
pub fn request_from_config(cfg: &AppConfig) -> Result<ExtractionRequest> {
    let project_dir = cfg
        .project
        .dir
        .as_deref()
        .context("No project directory configured ([project] dir or --project)")?;
    let source = cfg
        .layer
        .source
        .as_deref()
        .context("No layer configured ([layer] source or --layer)")?;

    let mut layer = LayerSource::parse(source);
    if layer.path.is_relative() {
        layer.path = std::path::Path::new(project_dir).join(&layer.path);
    }

    Ok(ExtractionRequest {
        project_dir: project_dir.into(),
        layer,
        locator: cfg.locator.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn request_resolves_relative_layer_against_project() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [project]
            dir = "/work/survey"

            [layer]
            source = "data/points.gpkg|layername=points"
            "#,
        )
        .unwrap();
        let request = request_from_config(&cfg).unwrap();
        assert_eq!(request.layer.path, PathBuf::from("/work/survey/data/points.gpkg"));
        assert_eq!(request.layer.layer_name.as_deref(), Some("points"));
        assert_eq!(request.locator.meta_dir, ".mergin");
    }

    #[test]
    fn missing_layer_is_a_configuration_error() {
        let cfg = AppConfig::from_toml_str("[project]\ndir = \"/work\"").unwrap();
        let err = request_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No layer configured"), "got: {err}");
    }
}
