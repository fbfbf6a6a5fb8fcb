//! Catalog read from a project's YAML files
//!
//! Files are re-read on every call so edits made while a session is open
//! (a recalibrated meter, a new asset) are seen at capture time.

use std::path::PathBuf;

use super::memory::assets_in_scope;
use super::{AssetDirectory, CatalogError, MeterRegistry, TemplateCatalog};
use crate::core::identity::EntityId;
use crate::core::loader::{load_all, Loaded};
use crate::core::project::{CatalogKind, Project};
use crate::entities::form::IssueLevel;
use crate::entities::{Asset, FormVersion, Job, Meter};
use crate::yaml::YamlError;

/// Catalog backed by the `forms/`, `assets/`, `jobs/` and `meters/` directories
pub struct ProjectCatalog<'a> {
    project: &'a Project,
}

impl<'a> ProjectCatalog<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    /// Every form that parses, including ones [`TemplateCatalog`] refuses to serve
    pub fn forms(&self) -> Vec<FormVersion> {
        load_all(self.project, CatalogKind::Form).into_records()
    }

    pub fn jobs(&self) -> Vec<Job> {
        load_all(self.project, CatalogKind::Job).into_records()
    }

    pub fn assets(&self) -> Vec<Asset> {
        load_all(self.project, CatalogKind::Asset).into_records()
    }

    pub fn meters(&self) -> Vec<Meter> {
        load_all(self.project, CatalogKind::Meter).into_records()
    }
}

/// Error for a lookup that may have missed because some files did not parse
fn unreadable(failures: &[(PathBuf, YamlError)]) -> CatalogError {
    let files: Vec<String> = failures
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect();
    CatalogError::Unavailable(format!("cannot parse {}", files.join(", ")))
}

/// Errors from the form's own consistency check, joined for display
fn form_errors(form: &FormVersion) -> Option<String> {
    let errors: Vec<String> = form
        .check()
        .into_iter()
        .filter(|i| i.level == IssueLevel::Error)
        .map(|i| i.to_string())
        .collect();
    (!errors.is_empty()).then(|| errors.join("; "))
}

impl TemplateCatalog for ProjectCatalog<'_> {
    /// Forms that fail their consistency check are left out
    fn list_versions(&self) -> Result<Vec<FormVersion>, CatalogError> {
        let mut forms: Vec<FormVersion> = load_all::<FormVersion>(self.project, CatalogKind::Form)
            .into_records()
            .into_iter()
            .filter(|form| match form_errors(form) {
                Some(errors) => {
                    log::warn!("skipping form {} ({}): {}", form.id, form.title, errors);
                    false
                }
                None => true,
            })
            .collect();
        forms.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then(a.version_number.cmp(&b.version_number))
        });
        Ok(forms)
    }

    fn version(&self, id: &EntityId) -> Result<FormVersion, CatalogError> {
        let loaded: Loaded<FormVersion> = load_all(self.project, CatalogKind::Form);
        match loaded.records.iter().find(|(_, f)| &f.id == id) {
            Some((path, form)) => match form_errors(form) {
                Some(errors) => Err(CatalogError::Unavailable(format!(
                    "form {} in {} is invalid: {}",
                    id,
                    path.display(),
                    errors
                ))),
                None => Ok(form.clone()),
            },
            None if !loaded.failures.is_empty() => Err(unreadable(&loaded.failures)),
            None => Err(CatalogError::UnknownFormVersion(id.clone())),
        }
    }
}

impl AssetDirectory for ProjectCatalog<'_> {
    /// Refused while any asset file fails to parse
    fn list_assets_for_job(&self, job_id: &str) -> Result<Vec<Asset>, CatalogError> {
        let jobs: Loaded<Job> = load_all(self.project, CatalogKind::Job);
        let job = match jobs.records.iter().find(|(_, j)| j.id == job_id) {
            Some((_, job)) => job,
            None if !jobs.failures.is_empty() => return Err(unreadable(&jobs.failures)),
            None => return Err(CatalogError::UnknownJob(job_id.to_string())),
        };

        let assets: Loaded<Asset> = load_all(self.project, CatalogKind::Asset);
        if !assets.failures.is_empty() {
            return Err(unreadable(&assets.failures));
        }
        Ok(assets_in_scope(job, &assets.into_records()))
    }
}

impl MeterRegistry for ProjectCatalog<'_> {
    fn get_meter(&self, meter_id: &EntityId) -> Result<Meter, CatalogError> {
        let loaded: Loaded<Meter> = load_all(self.project, CatalogKind::Meter);
        if let Some((_, meter)) = loaded.records.iter().find(|(_, m)| &m.id == meter_id) {
            return Ok(meter.clone());
        }
        if loaded.failures.is_empty() {
            Err(CatalogError::UnknownMeter(meter_id.clone()))
        } else {
            Err(unreadable(&loaded.failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_reads_job_scope_from_files() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        fs::write(
            project.catalog_dir(CatalogKind::Job).join("J-7.fct.yaml"),
            "id: J-7\ntitle: Annual test\nsite: depot\n",
        )
        .unwrap();
        fs::write(
            project
                .catalog_dir(CatalogKind::Asset)
                .join("a.fct.yaml"),
            "id: AST-01HQ3K4N5M6P7R8S9T0VWXYZAB\nlabel: DB-1\nsite: depot\n",
        )
        .unwrap();
        fs::write(
            project
                .catalog_dir(CatalogKind::Asset)
                .join("b.fct.yaml"),
            "id: AST-01HQ3K4N5M6P7R8S9T0VWXYZAC\nlabel: DB-9\nsite: other\n",
        )
        .unwrap();

        let catalog = ProjectCatalog::new(&project);
        let assets = catalog.list_assets_for_job("J-7").unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].label, "DB-1");
        assert!(matches!(
            catalog.list_assets_for_job("J-8"),
            Err(CatalogError::UnknownJob(_))
        ));
    }

    #[test]
    fn test_unknown_meter() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let catalog = ProjectCatalog::new(&project);
        assert!(catalog
            .get_meter(&EntityId::new(crate::core::identity::EntityPrefix::Mtr))
            .is_err());
        assert!(catalog.list_versions().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_meter_file_is_unavailable() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let dir = project.catalog_dir(CatalogKind::Meter);
        fs::write(
            dir.join("good.fct.yaml"),
            "id: MTR-01HQ3K4N5M6P7R8S9T0VWXYZAB\nname: Megger\nserial_number: '101174'\n",
        )
        .unwrap();
        fs::write(
            dir.join("bad.fct.yaml"),
            "id: MTR-01HQ3K4N5M6P7R8S9T0VWXYZAC\nname: Fluke\nserial_number: [unclosed\n",
        )
        .unwrap();

        let catalog = ProjectCatalog::new(&project);
        let good = "MTR-01HQ3K4N5M6P7R8S9T0VWXYZAB".parse::<EntityId>().unwrap();
        assert_eq!(catalog.get_meter(&good).unwrap().name, "Megger");

        let hidden = "MTR-01HQ3K4N5M6P7R8S9T0VWXYZAC".parse::<EntityId>().unwrap();
        let err = catalog.get_meter(&hidden).unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable(_)));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("bad.fct.yaml"));
    }

    #[test]
    fn test_corrupt_asset_file_blocks_job_scope() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        fs::write(
            project.catalog_dir(CatalogKind::Job).join("J-7.fct.yaml"),
            "id: J-7\ntitle: Annual test\nsite: depot\n",
        )
        .unwrap();
        fs::write(
            project.catalog_dir(CatalogKind::Asset).join("a.fct.yaml"),
            "id: AST-01HQ3K4N5M6P7R8S9T0VWXYZAB\nlabel: [unclosed\n",
        )
        .unwrap();

        let catalog = ProjectCatalog::new(&project);
        assert!(matches!(
            catalog.list_assets_for_job("J-7"),
            Err(CatalogError::Unavailable(_))
        ));
    }

    #[test]
    fn test_forms_with_errors_are_not_served() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let form = |id: &str, tmpl: &str, pass: u32, fail: u32| {
            format!(
                "id: {}\ntitle: Annual inspection\nversion_number: 1\ntemplates:\n  \
                 - id: {}\n    title: Circuit\n    repeat_per_asset: true\n    fields:\n      \
                 - id: ir\n        label: Insulation resistance\n        type: number\n        \
                 pass_threshold: {}\n        fail_threshold: {}\n",
                id, tmpl, pass, fail
            )
        };
        let dir = project.catalog_dir(CatalogKind::Form);
        fs::write(
            dir.join("broken.fct.yaml"),
            form(
                "FORM-01HC2JB7SMQX7RS1Y0GFKBHPTD",
                "TMPL-01HC2JB7SMQX7RS1Y0GFKBHPTE",
                20,
                10,
            ),
        )
        .unwrap();
        fs::write(
            dir.join("sound.fct.yaml"),
            form(
                "FORM-01HC2JB7SMQX7RS1Y0GFKBHPTF",
                "TMPL-01HC2JB7SMQX7RS1Y0GFKBHPTG",
                10,
                20,
            ),
        )
        .unwrap();

        let catalog = ProjectCatalog::new(&project);
        let versions = catalog.list_versions().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id.to_string(), "FORM-01HC2JB7SMQX7RS1Y0GFKBHPTF");

        let broken = "FORM-01HC2JB7SMQX7RS1Y0GFKBHPTD".parse::<EntityId>().unwrap();
        let err = catalog.version(&broken).unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable(_)));
        assert!(err.to_string().contains("no value can pass"));
    }
}
