//! In-memory store: arena vectors with composite-key indexes

use std::collections::HashMap;

use super::{StoreError, SubmissionStore};
use crate::core::identity::EntityId;
use crate::entities::{Answers, EntityInstance, InstanceKey, Reading, Submission};

/// Process-local store, used for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    submissions: Vec<Submission>,
    submission_by_id: HashMap<EntityId, usize>,
    submission_by_session: HashMap<(String, EntityId), usize>,

    instances: Vec<EntityInstance>,
    instance_by_id: HashMap<EntityId, usize>,
    instance_by_key: HashMap<(EntityId, InstanceKey), usize>,

    readings: Vec<Reading>,
    reading_by_key: HashMap<(EntityId, String), usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmissionStore for MemoryStore {
    fn insert_submission(&mut self, submission: &Submission) -> Result<Submission, StoreError> {
        let session = (
            submission.job_id.clone(),
            submission.form_version_id.clone(),
        );
        if let Some(&slot) = self.submission_by_session.get(&session) {
            return Ok(self.submissions[slot].clone());
        }

        self.submissions.push(submission.clone());
        let slot = self.submissions.len() - 1;
        self.submission_by_id.insert(submission.id.clone(), slot);
        self.submission_by_session.insert(session, slot);
        Ok(submission.clone())
    }

    fn submission(&self, id: &EntityId) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .submission_by_id
            .get(id)
            .map(|&slot| self.submissions[slot].clone()))
    }

    fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
        Ok(self.submissions.clone())
    }

    fn update_submission(&mut self, submission: &Submission) -> Result<(), StoreError> {
        let slot = *self
            .submission_by_id
            .get(&submission.id)
            .ok_or_else(|| StoreError::Missing(submission.id.clone()))?;
        self.submissions[slot] = submission.clone();
        Ok(())
    }

    fn upsert_instance(
        &mut self,
        instance: &EntityInstance,
    ) -> Result<(EntityInstance, bool), StoreError> {
        let key = (instance.submission_id.clone(), instance.key());
        if let Some(&slot) = self.instance_by_key.get(&key) {
            return Ok((self.instances[slot].clone(), false));
        }

        self.instances.push(instance.clone());
        let slot = self.instances.len() - 1;
        self.instance_by_id.insert(instance.id.clone(), slot);
        self.instance_by_key.insert(key, slot);
        Ok((instance.clone(), true))
    }

    fn instance(&self, id: &EntityId) -> Result<Option<EntityInstance>, StoreError> {
        Ok(self
            .instance_by_id
            .get(id)
            .map(|&slot| self.instances[slot].clone()))
    }

    fn instances(&self, submission_id: &EntityId) -> Result<Vec<EntityInstance>, StoreError> {
        Ok(self
            .instances
            .iter()
            .filter(|i| &i.submission_id == submission_id)
            .cloned()
            .collect())
    }

    fn save_answers(
        &mut self,
        instance_id: &EntityId,
        answers: &Answers,
    ) -> Result<(), StoreError> {
        let slot = *self
            .instance_by_id
            .get(instance_id)
            .ok_or_else(|| StoreError::Missing(instance_id.clone()))?;
        let instance = &mut self.instances[slot];
        instance.answers = answers.clone();
        instance.updated = chrono::Utc::now();
        Ok(())
    }

    fn put_reading(&mut self, reading: &Reading) -> Result<Reading, StoreError> {
        let key = (reading.instance_id.clone(), reading.field_id.clone());
        match self.reading_by_key.get(&key) {
            Some(&slot) => {
                let stored = &mut self.readings[slot];
                let id = stored.id.clone();
                *stored = Reading {
                    id,
                    ..reading.clone()
                };
                Ok(stored.clone())
            }
            None => {
                self.readings.push(reading.clone());
                self.reading_by_key.insert(key, self.readings.len() - 1);
                Ok(reading.clone())
            }
        }
    }

    fn record_reading(
        &mut self,
        reading: &Reading,
        answers: &Answers,
    ) -> Result<Reading, StoreError> {
        // save_answers is the only step that can fail
        self.save_answers(&reading.instance_id, answers)?;
        self.put_reading(reading)
    }

    fn readings(&self, submission_id: &EntityId) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .readings
            .iter()
            .filter(|r| {
                self.instance_by_id
                    .get(&r.instance_id)
                    .is_some_and(|&slot| &self.instances[slot].submission_id == submission_id)
            })
            .cloned()
            .collect())
    }
}
