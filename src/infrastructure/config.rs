use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Runtime configuration, loaded from an optional TOML file and then
/// overridden by `GEODELTA_<SECTION>__<KEY>` environment variables.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub layer: LayerConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProjectConfig {
    /// Root directory of the local project working copy.
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LayerConfig {
    /// Layer source, e.g. `survey/points.gpkg|layername=points`.
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocatorConfig {
    /// Metadata directory holding base snapshots, relative to the project root.
    #[serde(default = "default_meta_dir")]
    pub meta_dir: String,
    /// Appended to the base file name to find the recorded changeset.
    #[serde(default = "default_changeset_suffix")]
    pub changeset_suffix: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            meta_dir: default_meta_dir(),
            changeset_suffix: default_changeset_suffix(),
        }
    }
}

fn default_meta_dir() -> String {
    ".mergin".to_string()
}

fn default_changeset_suffix() -> String {
    "-diff".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// "json" or "jsonl".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: default_format(),
        }
    }
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_format() -> String {
    "json".to_string()
}

impl AppConfig {
    /// Load `path` (when given) and apply environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }
        let cfg = builder
            .add_source(Environment::with_prefix("GEODELTA").separator("__"))
            .build()
            .with_context(|| match path {
                Some(p) => format!("Failed to read config file: {}", p),
                None => "Failed to read configuration from environment".to_string(),
            })?;
        cfg.try_deserialize()
            .with_context(|| "Failed to parse configuration")
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .with_context(|| "Failed to parse config TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.locator.meta_dir, ".mergin");
        assert_eq!(cfg.locator.changeset_suffix, "-diff");
        assert_eq!(cfg.output.format, "json");
        assert!(cfg.project.dir.is_none());
    }

    #[test]
    fn sections_are_read() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [project]
            dir = "/work/survey"

            [layer]
            source = "/work/survey/points.gpkg|layername=points"

            [locator]
            meta_dir = ".history"

            [output]
            dir = "/tmp/out"
            format = "jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.project.dir.as_deref(), Some("/work/survey"));
        assert_eq!(cfg.locator.meta_dir, ".history");
        assert_eq!(cfg.locator.changeset_suffix, "-diff");
        assert_eq!(cfg.output.format, "jsonl");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("not/here.toml"), "got: {err}");
    }
}
