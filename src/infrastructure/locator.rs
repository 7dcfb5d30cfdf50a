use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::error::{ExtractError, Result};
use crate::domain::ports::{ChangeLocation, ChangeLocator};
use crate::infrastructure::config::LocatorConfig;

/// A layer reference of the form `path/to/file.gpkg|layername=points`.
///
/// The part before the first `|` is the file; `layername` picks the table.
/// Other `key=value` options are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSource {
    pub path: PathBuf,
    pub layer_name: Option<String>,
}

impl LayerSource {
    pub fn parse(source: &str) -> Self {
        let mut parts = source.split('|');
        let path = PathBuf::from(parts.next().unwrap_or_default().trim());
        let layer_name = parts
            .filter_map(|opt| opt.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("layername"))
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self { path, layer_name }
    }

    pub fn is_geopackage(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gpkg"))
    }
}

/// Local project working copy: user files at the root, last-synced copies
/// under a metadata directory mirroring the same relative paths.
///
/// ```text
/// <project>/survey/points.gpkg               working copy
/// <project>/.mergin/survey/points.gpkg       base snapshot
/// <project>/.mergin/survey/points.gpkg-diff  recorded changeset
/// ```
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    project_dir: PathBuf,
    meta_dir: String,
    changeset_suffix: String,
}

impl ProjectLayout {
    pub fn new(project_dir: impl Into<PathBuf>, cfg: &LocatorConfig) -> Self {
        Self {
            project_dir: project_dir.into(),
            meta_dir: cfg.meta_dir.clone(),
            changeset_suffix: cfg.changeset_suffix.clone(),
        }
    }

    /// Fails with `NotAProject` unless the metadata directory exists.
    pub fn validate(&self) -> Result<()> {
        if self.project_dir.join(&self.meta_dir).is_dir() {
            Ok(())
        } else {
            Err(ExtractError::NotAProject {
                dir: self.project_dir.clone(),
            })
        }
    }

    /// Path of `layer_path` relative to the project root.
    pub fn relative_layer_path(&self, layer_path: &Path) -> Result<PathBuf> {
        let project = self
            .project_dir
            .canonicalize()
            .map_err(|_| ExtractError::NotAProject {
                dir: self.project_dir.clone(),
            })?;
        let layer = layer_path.canonicalize().map_err(|source| ExtractError::Io {
            path: layer_path.to_path_buf(),
            source,
        })?;

        layer
            .strip_prefix(&project)
            .map(Path::to_path_buf)
            .map_err(|_| ExtractError::LayerOutsideProject {
                layer: layer_path.to_path_buf(),
                project: self.project_dir.clone(),
            })
    }
}

impl ChangeLocator for ProjectLayout {
    fn locate(&self, layer_path: &Path) -> Result<ChangeLocation> {
        let relative = self.relative_layer_path(layer_path)?;
        let base = self.project_dir.join(&self.meta_dir).join(&relative);
        if !base.is_file() {
            return Err(ExtractError::NoBaseFile {
                layer: layer_path.to_path_buf(),
            });
        }

        let mut changeset_name = base.file_name().unwrap_or_default().to_os_string();
        changeset_name.push(&self.changeset_suffix);
        let changeset = base.with_file_name(changeset_name);

        debug!(base = %base.display(), changeset = %changeset.display(), "history located");
        Ok(ChangeLocation { base, changeset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout(dir: &Path) -> ProjectLayout {
        ProjectLayout::new(dir, &LocatorConfig::default())
    }

    #[test]
    fn parses_layer_name_option() {
        let src = LayerSource::parse("/data/survey.gpkg|layername=points|subset=x");
        assert_eq!(src.path, PathBuf::from("/data/survey.gpkg"));
        assert_eq!(src.layer_name.as_deref(), Some("points"));
        assert!(src.is_geopackage());
    }

    #[test]
    fn plain_path_has_no_layer_name() {
        let src = LayerSource::parse("roads.shp");
        assert_eq!(src.layer_name, None);
        assert!(!src.is_geopackage());
    }

    #[test]
    fn missing_meta_dir_is_not_a_project() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            layout(dir.path()).validate(),
            Err(ExtractError::NotAProject { .. })
        ));
    }

    #[test]
    fn locates_base_and_changeset() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".mergin/survey")).unwrap();
        fs::create_dir_all(dir.path().join("survey")).unwrap();
        fs::write(dir.path().join("survey/points.gpkg"), b"").unwrap();
        fs::write(dir.path().join(".mergin/survey/points.gpkg"), b"").unwrap();

        let l = layout(dir.path());
        l.validate().unwrap();
        let loc = l.locate(&dir.path().join("survey/points.gpkg")).unwrap();
        assert_eq!(loc.base, dir.path().join(".mergin/survey/points.gpkg"));
        assert_eq!(
            loc.changeset,
            dir.path().join(".mergin/survey/points.gpkg-diff")
        );
    }

    #[test]
    fn unsynced_layer_has_no_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".mergin")).unwrap();
        fs::write(dir.path().join("new.gpkg"), b"").unwrap();

        let err = layout(dir.path())
            .locate(&dir.path().join("new.gpkg"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoBaseFile { .. }), "got {err:?}");
    }

    #[test]
    fn layer_outside_project_is_rejected() {
        let project = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        fs::create_dir_all(project.path().join(".mergin")).unwrap();
        fs::write(elsewhere.path().join("x.gpkg"), b"").unwrap();

        let err = layout(project.path())
            .locate(&elsewhere.path().join("x.gpkg"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::LayerOutsideProject { .. }));
    }
}
