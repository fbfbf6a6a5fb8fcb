//! Fan templates out into instances

use serde::Serialize;

use super::lifecycle::transition;
use super::{Engine, Result};
use crate::core::identity::EntityId;
use crate::core::store::SubmissionStore;
use crate::entities::{
    Asset, EntityInstance, InstanceIndex, InstanceKey, Submission, SubmissionStatus,
};

/// Result of an instantiation run
#[derive(Debug, Clone, Serialize)]
pub struct Instantiation {
    pub submission: Submission,

    /// Assets the job currently covers
    pub assets: Vec<Asset>,

    /// All instances of the submission after the run
    pub instances: Vec<EntityInstance>,

    /// How many instances this run created
    pub created: usize,
}

impl<S: SubmissionStore> Engine<'_, S> {
    /// Ensure one instance per (repeating template, asset) and one general
    /// instance per other template.
    ///
    /// Safe to call any number of times: existing instances are kept and only
    /// newly applicable assets get new ones. Moves a draft to active.
    pub fn instantiate(&mut self, submission_id: &EntityId) -> Result<Instantiation> {
        let mut submission = self.submission(submission_id)?;
        self.ensure_writable(&submission)?;

        let form = self.form_for(&submission)?;
        let assets = self.assets.list_assets_for_job(&submission.job_id)?;
        if assets.is_empty() && form.repeating_templates().next().is_some() {
            log::info!(
                "job {} has no assets; repeating templates stay empty",
                submission.job_id
            );
        }

        let mut index = InstanceIndex::new(self.store.instances(&submission.id)?);
        let mut wanted = Vec::new();
        for template in &form.templates {
            if template.repeat_per_asset {
                for asset in &assets {
                    wanted.push(InstanceKey::for_asset(
                        template.id.clone(),
                        asset.id.clone(),
                    ));
                }
            } else {
                wanted.push(InstanceKey::general(template.id.clone()));
            }
        }

        let mut created = 0;
        for key in wanted {
            if index.get(&key).is_some() {
                continue;
            }
            let candidate =
                EntityInstance::new(submission.id.clone(), key.template_id, key.asset_id);
            // The store collapses a concurrent insert of the same key
            let (stored, was_created) = self.store.upsert_instance(&candidate)?;
            if was_created {
                created += 1;
                log::debug!("created {} for template {}", stored.id, stored.template_id);
            } else {
                log::debug!("instance {} already existed", stored.id);
            }
            index.insert(stored);
        }

        if submission.status == SubmissionStatus::Draft {
            transition(&mut submission, SubmissionStatus::Active)?;
            self.store.update_submission(&submission)?;
        }

        log::info!(
            "instantiated {}: {} instance(s), {} new",
            submission.id,
            index.len(),
            created
        );

        Ok(Instantiation {
            submission,
            assets,
            instances: index.into_vec(),
            created,
        })
    }
}
