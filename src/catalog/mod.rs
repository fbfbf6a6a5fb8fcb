//! Read-only collaborators consumed by the engine
//!
//! Form versions, assets and meters are owned elsewhere; the engine only
//! reads them through these traits. [`StaticCatalog`] holds them in memory,
//! [`ProjectCatalog`] reads them from a project's catalog directories.

mod memory;
mod project;

pub use memory::StaticCatalog;
pub use project::ProjectCatalog;

use thiserror::Error;

use crate::core::identity::EntityId;
use crate::entities::{Asset, FormVersion, Meter};

/// Errors raised by catalog collaborators
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("form version {0} not found")]
    UnknownFormVersion(EntityId),

    #[error("job '{0}' not found")]
    UnknownJob(String),

    #[error("meter {0} not found")]
    UnknownMeter(EntityId),

    #[error("failed to read catalog: {0}")]
    Unavailable(String),
}

impl CatalogError {
    /// Whether the error is a lookup miss rather than a failure to read
    pub fn is_not_found(&self) -> bool {
        !matches!(self, CatalogError::Unavailable(_))
    }
}

/// Source of published form versions
pub trait TemplateCatalog {
    fn list_versions(&self) -> Result<Vec<FormVersion>, CatalogError>;

    /// Look up a single version by ID
    fn version(&self, id: &EntityId) -> Result<FormVersion, CatalogError> {
        self.list_versions()?
            .into_iter()
            .find(|v| &v.id == id)
            .ok_or_else(|| CatalogError::UnknownFormVersion(id.clone()))
    }
}

/// Source of the assets applicable to a job
pub trait AssetDirectory {
    /// Assets in scope for the job, in a stable order
    fn list_assets_for_job(&self, job_id: &str) -> Result<Vec<Asset>, CatalogError>;
}

/// Source of meters and their calibrations
pub trait MeterRegistry {
    fn get_meter(&self, meter_id: &EntityId) -> Result<Meter, CatalogError>;
}
