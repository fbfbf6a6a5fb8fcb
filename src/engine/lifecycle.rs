//! Submission state machine
//!
//! ```text
//! draft --instantiate--> active --submit--> submitted
//!                        active --instantiate--> active
//! ```
//!
//! `submitted` is terminal. Every write against a submitted record fails
//! with [`EngineError::SubmissionLocked`].

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::completeness::untested;
use super::evaluate::{aggregate, Tally};
use super::{Engine, EngineError, Result, Warning};
use crate::core::identity::EntityId;
use crate::core::store::SubmissionStore;
use crate::entities::{
    Asset, EntityInstance, FormVersion, OverallResult, Reading, Submission, SubmissionStatus,
};

/// Check if a status transition is valid
pub fn is_valid_transition(from: SubmissionStatus, to: SubmissionStatus) -> bool {
    matches!(
        (from, to),
        (SubmissionStatus::Draft, SubmissionStatus::Active)
            // re-instantiation fills newly applicable assets
            | (SubmissionStatus::Active, SubmissionStatus::Active)
            | (SubmissionStatus::Active, SubmissionStatus::Submitted)
    )
}

/// Get allowed transitions from the current status
pub fn allowed_transitions(current: SubmissionStatus) -> Vec<SubmissionStatus> {
    match current {
        SubmissionStatus::Draft => vec![SubmissionStatus::Active],
        SubmissionStatus::Active => vec![SubmissionStatus::Active, SubmissionStatus::Submitted],
        SubmissionStatus::Submitted => vec![],
    }
}

pub(super) fn transition(submission: &mut Submission, to: SubmissionStatus) -> Result<()> {
    let from = submission.status;
    if !is_valid_transition(from, to) {
        return Err(EngineError::InvalidTransition { from, to });
    }
    if from != to {
        log::info!("{}: {} -> {}", submission.id, from, to);
    }
    submission.status = to;
    Ok(())
}

#[derive(Serialize)]
struct SealedInstance<'a> {
    id: &'a EntityId,
    template_id: &'a EntityId,
    asset_id: &'a Option<EntityId>,
    answers: &'a crate::entities::Answers,
}

#[derive(Serialize)]
struct SealedRecord<'a> {
    submission_id: &'a EntityId,
    job_id: &'a str,
    form_version_id: &'a EntityId,
    instances: Vec<SealedInstance<'a>>,
    readings: Vec<&'a Reading>,
}

/// SHA-256 over the canonical JSON of a submission's instances and readings
pub fn record_digest(
    submission: &Submission,
    instances: &[EntityInstance],
    readings: &[Reading],
) -> Result<String> {
    let mut instances: Vec<_> = instances
        .iter()
        .map(|i| SealedInstance {
            id: &i.id,
            template_id: &i.template_id,
            asset_id: &i.asset_id,
            answers: &i.answers,
        })
        .collect();
    instances.sort_by(|a, b| a.id.cmp(b.id));
    let mut readings: Vec<_> = readings.iter().collect();
    readings.sort_by(|a, b| a.id.cmp(&b.id));

    let record = SealedRecord {
        submission_id: &submission.id,
        job_id: &submission.job_id,
        form_version_id: &submission.form_version_id,
        instances,
        readings,
    };
    let bytes = serde_json::to_vec(&record).map_err(crate::core::store::StoreError::from)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Read-only projection of a submission's current state
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub submission: Submission,
    pub tally: Tally,
    pub overall_result: OverallResult,
    pub instance_count: usize,
    pub untested: Vec<Asset>,
    pub warnings: Vec<Warning>,
}

/// A finalised submission with its advisory warnings
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub submission: Submission,
    pub warnings: Vec<Warning>,
}

struct Snapshot {
    submission: Submission,
    form: FormVersion,
    instances: Vec<EntityInstance>,
    readings: Vec<Reading>,
    untested: Vec<Asset>,
}

impl<S: SubmissionStore> Engine<'_, S> {
    /// Start (or resume) the test session for a job and form version
    pub fn start_submission(&mut self, job_id: &str, form_version_id: &EntityId) -> Result<Submission> {
        let form = self.templates.version(form_version_id)?;
        // unknown jobs fail here rather than at instantiation
        self.assets.list_assets_for_job(job_id)?;

        let candidate = Submission::new(job_id, form.id.clone(), self.settings.operator.clone());
        let stored = self.store.insert_submission(&candidate)?;
        if stored.id == candidate.id {
            log::info!(
                "started {} for job {} on {} v{}",
                stored.id,
                job_id,
                form.title,
                form.version_number
            );
        } else {
            log::debug!("resumed {} for job {}", stored.id, job_id);
        }
        Ok(stored)
    }

    fn snapshot(&self, submission_id: &EntityId) -> Result<Snapshot> {
        let submission = self.submission(submission_id)?;
        let form = self.form_for(&submission)?;
        let assets = self.assets.list_assets_for_job(&submission.job_id)?;
        let instances = self.store.instances(&submission.id)?;
        let readings = self.store.readings(&submission.id)?;
        let untested = untested(&form, &assets, &instances);
        Ok(Snapshot {
            submission,
            form,
            instances,
            readings,
            untested,
        })
    }

    /// Expired-at-capture warnings, one per distinct calibration
    fn calibration_warnings(&self, readings: &[Reading]) -> Vec<Warning> {
        let mut seen = std::collections::HashSet::new();
        let mut warnings = Vec::new();
        for reading in readings {
            if reading.calibration_expires_at >= reading.captured_at
                || !seen.insert(&reading.calibration_id)
            {
                continue;
            }
            let meter = self
                .meters
                .get_meter(&reading.meter_id)
                .map(|m| m.identity())
                .unwrap_or_else(|_| reading.meter_id.to_string());
            warnings.push(Warning::CalibrationExpired {
                meter,
                expired_at: reading.calibration_expires_at,
            });
        }
        warnings
    }

    fn warnings_for(&self, snapshot: &Snapshot) -> Vec<Warning> {
        let mut warnings: Vec<Warning> = snapshot
            .untested
            .iter()
            .map(|a| Warning::Untested {
                asset: a.label.clone(),
            })
            .collect();
        warnings.extend(self.calibration_warnings(&snapshot.readings));
        warnings
    }

    /// Recompute tally, result and untested assets without changing anything
    pub fn summary(&self, submission_id: &EntityId) -> Result<Summary> {
        let snapshot = self.snapshot(submission_id)?;
        let tally = aggregate(&snapshot.form, &snapshot.instances, &snapshot.readings);
        let warnings = self.warnings_for(&snapshot);
        Ok(Summary {
            tally,
            overall_result: tally.overall(),
            instance_count: snapshot.instances.len(),
            warnings,
            untested: snapshot.untested,
            submission: snapshot.submission,
        })
    }

    /// Finalise a submission
    ///
    /// Aggregates are recomputed from the current data. Untested assets and
    /// expired calibrations come back as warnings; they block only when
    /// `require_complete` is set. A started instance with a blank required
    /// field always blocks.
    pub fn submit(&mut self, submission_id: &EntityId) -> Result<SubmitOutcome> {
        let snapshot = self.snapshot(submission_id)?;
        let mut submission = snapshot.submission.clone();
        if !is_valid_transition(submission.status, SubmissionStatus::Submitted) {
            return Err(EngineError::InvalidTransition {
                from: submission.status,
                to: SubmissionStatus::Submitted,
            });
        }

        for instance in snapshot.instances.iter().filter(|i| i.has_answers()) {
            let Some(template) = snapshot.form.template(&instance.template_id) else {
                continue;
            };
            if let Some(field) = template
                .fields
                .iter()
                .find(|f| f.required && instance.answer(&f.id).is_none())
            {
                return Err(EngineError::MissingRequired {
                    instance: instance.id.clone(),
                    field: field.id.clone(),
                });
            }
        }

        if self.settings.require_complete && !snapshot.untested.is_empty() {
            let labels: Vec<_> = snapshot.untested.iter().map(|a| a.label.as_str()).collect();
            return Err(EngineError::Validation(format!(
                "{} asset(s) untested: {}",
                labels.len(),
                labels.join(", ")
            )));
        }

        let tally = aggregate(&snapshot.form, &snapshot.instances, &snapshot.readings);
        let warnings = self.warnings_for(&snapshot);

        transition(&mut submission, SubmissionStatus::Submitted)?;
        submission.pass_count = tally.pass_count;
        submission.fail_count = tally.fail_count;
        submission.na_count = tally.na_count;
        submission.overall_result = Some(tally.overall());
        submission.submitted_at = Some(Utc::now());
        submission.submitted_by = Some(self.settings.operator.clone());
        submission.record_digest = Some(record_digest(
            &submission,
            &snapshot.instances,
            &snapshot.readings,
        )?);
        self.store.update_submission(&submission)?;

        log::info!(
            "submitted {}: {} ({} pass, {} fail, {} n/a, {} warning(s))",
            submission.id,
            tally.overall(),
            tally.pass_count,
            tally.fail_count,
            tally.na_count,
            warnings.len()
        );
        Ok(SubmitOutcome {
            submission,
            warnings,
        })
    }

    /// Whether a submitted record still matches the digest taken at submit
    pub fn verify(&self, submission_id: &EntityId) -> Result<bool> {
        let submission = self.submission(submission_id)?;
        let Some(expected) = submission.record_digest.as_deref() else {
            return Err(EngineError::Validation(format!(
                "{} has not been submitted",
                submission.id
            )));
        };
        let instances = self.store.instances(&submission.id)?;
        let readings = self.store.readings(&submission.id)?;
        Ok(record_digest(&submission, &instances, &readings)? == expected)
    }
}
