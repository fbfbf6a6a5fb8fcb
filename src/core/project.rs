//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::EntityId;

/// Suffix of every catalog file managed by FCT
pub const FILE_SUFFIX: &str = ".fct.yaml";

/// Kinds of catalog files kept in a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    Form,
    Asset,
    Job,
    Meter,
}

impl CatalogKind {
    pub fn all() -> &'static [CatalogKind] {
        &[
            CatalogKind::Form,
            CatalogKind::Asset,
            CatalogKind::Job,
            CatalogKind::Meter,
        ]
    }

    /// Directory (relative to the project root) holding this kind
    pub fn directory(&self) -> &'static str {
        match self {
            CatalogKind::Form => "forms",
            CatalogKind::Asset => "assets",
            CatalogKind::Job => "jobs",
            CatalogKind::Meter => "meters",
        }
    }

    /// Schema name used by the validator
    pub fn schema_name(&self) -> &'static str {
        match self {
            CatalogKind::Form => "form",
            CatalogKind::Asset => "asset",
            CatalogKind::Job => "job",
            CatalogKind::Meter => "meter",
        }
    }

    /// Determine the kind of a file from the catalog directory it sits in
    pub fn from_path(path: &Path) -> Option<Self> {
        path.components().find_map(|c| match c {
            std::path::Component::Normal(os) => match os.to_string_lossy().as_ref() {
                "forms" => Some(CatalogKind::Form),
                "assets" => Some(CatalogKind::Asset),
                "jobs" => Some(CatalogKind::Job),
                "meters" => Some(CatalogKind::Meter),
                _ => None,
            },
            _ => None,
        })
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.schema_name())
    }
}

/// Represents an FCT project
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project (parent of .fct/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current =
            std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Use an explicit root if given, otherwise discover from the current directory
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ProjectError> {
        match explicit {
            Some(path) => Self::discover_from(path),
            None => Self::discover(),
        }
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(".fct").is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(".fct").exists() {
            return Err(ProjectError::AlreadyExists(root));
        }

        Self::init_force(&root)
    }

    /// Initialize even if .fct/ exists; existing catalog files are left alone
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let fct_dir = root.join(".fct");

        std::fs::create_dir_all(&fct_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(fct_dir.join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        for kind in CatalogKind::all() {
            std::fs::create_dir_all(root.join(kind.directory()))
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }
        std::fs::create_dir_all(root.join("exports"))
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# FCT Project Configuration

# Default operator name recorded on submissions (can be overridden by global config)
# author: ""

# Editor to use for `fct ... edit` (default: $EDITOR)
# editor: ""

# Default output format (auto, yaml, json, tsv, csv)
# default_format: auto

compliance:
  # Warn when a meter's calibration expires within this many days of a reading (0 = off)
  calibration_warning_days: 30
  # Refuse to submit while applicable assets are still untested
  require_complete: false
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .fct configuration directory
    pub fn fct_dir(&self) -> PathBuf {
        self.root.join(".fct")
    }

    /// SQLite database holding submissions
    pub fn database_path(&self) -> PathBuf {
        self.fct_dir().join("submissions.db")
    }

    /// Directory for a catalog kind
    pub fn catalog_dir(&self, kind: CatalogKind) -> PathBuf {
        self.root.join(kind.directory())
    }

    /// Path for a new catalog file identified by a record ID
    pub fn entity_path(&self, kind: CatalogKind, id: &EntityId) -> PathBuf {
        self.catalog_dir(kind).join(format!("{}{}", id, FILE_SUFFIX))
    }

    /// Path for a new job file (jobs are keyed by their CRM reference)
    pub fn job_path(&self, job_id: &str) -> PathBuf {
        let safe: String = job_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.catalog_dir(CatalogKind::Job)
            .join(format!("{}{}", safe, FILE_SUFFIX))
    }

    /// Iterate all catalog files of a given kind
    pub fn iter_catalog_files(&self, kind: CatalogKind) -> impl Iterator<Item = PathBuf> {
        walkdir::WalkDir::new(self.catalog_dir(kind))
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().to_string_lossy().ends_with(FILE_SUFFIX))
            .map(|e| e.path().to_path_buf())
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not an FCT project (searched from {searched_from:?}). Run 'fct init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("FCT project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.fct_dir().join("config.yaml").exists());
        for kind in CatalogKind::all() {
            assert!(project.catalog_dir(*kind).is_dir());
        }
        assert!(project.root().join("exports").is_dir());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
    }

    #[test]
    fn test_project_discover_from_nested_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("forms/archive");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_fct_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn test_entity_and_job_paths() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let id = EntityId::new(EntityPrefix::Mtr);

        let path = project.entity_path(CatalogKind::Meter, &id);
        assert!(path.to_string_lossy().ends_with(&format!("meters/{}.fct.yaml", id)));

        let job = project.job_path("J-10/42");
        assert!(job.to_string_lossy().ends_with("jobs/J-10_42.fct.yaml"));
    }

    #[test]
    fn test_catalog_kind_from_path() {
        assert_eq!(
            CatalogKind::from_path(Path::new("/p/jobs/J-1.fct.yaml")),
            Some(CatalogKind::Job)
        );
        assert_eq!(CatalogKind::from_path(Path::new("/p/other/x.yaml")), None);
    }
}
