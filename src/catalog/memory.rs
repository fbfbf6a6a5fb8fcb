//! In-memory catalog

use super::{AssetDirectory, CatalogError, MeterRegistry, TemplateCatalog};
use crate::core::identity::EntityId;
use crate::entities::{Asset, FormVersion, Job, Meter};

/// Catalog built from records held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub forms: Vec<FormVersion>,
    pub jobs: Vec<Job>,
    pub assets: Vec<Asset>,
    pub meters: Vec<Meter>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form(mut self, form: FormVersion) -> Self {
        self.forms.push(form);
        self
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meters.push(meter);
        self
    }

    /// Replace a meter in place (e.g. after recalibration)
    pub fn replace_meter(&mut self, meter: Meter) {
        match self.meters.iter_mut().find(|m| m.id == meter.id) {
            Some(slot) => *slot = meter,
            None => self.meters.push(meter),
        }
    }
}

/// Assets covered by a job, ordered by label then ID
pub(super) fn assets_in_scope(job: &Job, assets: &[Asset]) -> Vec<Asset> {
    let mut scoped: Vec<Asset> = assets.iter().filter(|a| job.covers(a)).cloned().collect();
    scoped.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
    scoped
}

impl TemplateCatalog for StaticCatalog {
    fn list_versions(&self) -> Result<Vec<FormVersion>, CatalogError> {
        Ok(self.forms.clone())
    }
}

impl AssetDirectory for StaticCatalog {
    fn list_assets_for_job(&self, job_id: &str) -> Result<Vec<Asset>, CatalogError> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .ok_or_else(|| CatalogError::UnknownJob(job_id.to_string()))?;
        Ok(assets_in_scope(job, &self.assets))
    }
}

impl MeterRegistry for StaticCatalog {
    fn get_meter(&self, meter_id: &EntityId) -> Result<Meter, CatalogError> {
        self.meters
            .iter()
            .find(|m| &m.id == meter_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownMeter(meter_id.clone()))
    }
}
