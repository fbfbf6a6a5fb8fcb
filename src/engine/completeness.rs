//! Untested-asset detection

use std::collections::HashSet;

use super::{Engine, Result};
use crate::core::identity::EntityId;
use crate::core::store::SubmissionStore;
use crate::entities::{Asset, EntityInstance, FormVersion, InstanceIndex, InstanceKey};

/// Assets lacking a started instance for any repeating template
///
/// An asset is untested when an instance is missing or has no non-blank
/// answer. Each asset is reported once, in the order given.
pub fn untested(form: &FormVersion, assets: &[Asset], instances: &[EntityInstance]) -> Vec<Asset> {
    let index = InstanceIndex::new(instances.to_vec());
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for template in form.repeating_templates() {
        for asset in assets {
            let key = InstanceKey::for_asset(template.id.clone(), asset.id.clone());
            let started = index.get(&key).is_some_and(|i| i.has_answers());
            if !started && seen.insert(asset.id.clone()) {
                out.push(asset.clone());
            }
        }
    }

    // keep the caller's asset order regardless of template order
    out.sort_by_key(|a| assets.iter().position(|b| b.id == a.id));
    out
}

impl<S: SubmissionStore> Engine<'_, S> {
    /// Applicable assets that still lack a started instance, recomputed on demand
    pub fn untested_assets(&self, submission_id: &EntityId) -> Result<Vec<Asset>> {
        let submission = self.submission(submission_id)?;
        let form = self.form_for(&submission)?;
        let assets = self.assets.list_assets_for_job(&submission.job_id)?;
        let instances = self.store.instances(&submission.id)?;
        Ok(untested(&form, &assets, &instances))
    }
}
