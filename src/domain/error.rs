use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ExtractError
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Failure taxonomy of an extraction run.
///
/// Structural problems (corrupt stream, schema drift, missing history) abort
/// the run. Per-row data-quality problems never appear here: the
/// materializer recovers from them and counts them as warnings.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("changeset is corrupt at byte {offset}: {reason}")]
    CorruptChangeset { offset: usize, reason: String },

    #[error("table '{table}' not found in the layer database")]
    TableNotFound { table: String },

    #[error(
        "schema of table '{table}' has changed since the changeset was recorded: \
         changeset has {changeset_columns} column(s), table has {schema_columns}"
    )]
    SchemaMismatch {
        table: String,
        changeset_columns: usize,
        schema_columns: usize,
    },

    #[error("no base file for layer {}: the layer has no synced history", layer.display())]
    NoBaseFile { layer: PathBuf },

    #[error("{} does not contain a valid project", dir.display())]
    NotAProject { dir: PathBuf },

    #[error("layer {} does not belong to project {}", layer.display(), project.display())]
    LayerOutsideProject { layer: PathBuf, project: PathBuf },

    #[error("layer {} has an unsupported format: only GeoPackage layers are supported", layer.display())]
    UnsupportedLayer { layer: PathBuf },

    #[error("database error while {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("feature sink rejected a feature: {0}")]
    Sink(#[source] anyhow::Error),
}

impl ExtractError {
    /// Stable machine-readable code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::CorruptChangeset { .. } => "corrupt_changeset",
            ExtractError::TableNotFound { .. } => "table_not_found",
            ExtractError::SchemaMismatch { .. } => "schema_mismatch",
            ExtractError::NoBaseFile { .. } => "no_base_file",
            ExtractError::NotAProject { .. } => "not_a_project",
            ExtractError::LayerOutsideProject { .. } => "layer_outside_project",
            ExtractError::UnsupportedLayer { .. } => "unsupported_layer",
            ExtractError::Database { .. } => "database",
            ExtractError::Io { .. } => "io",
            ExtractError::Sink(_) => "sink",
        }
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        ExtractError::CorruptChangeset {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn database(context: impl Into<String>, source: sqlx::Error) -> Self {
        ExtractError::Database {
            context: context.into(),
            source,
        }
    }
}
