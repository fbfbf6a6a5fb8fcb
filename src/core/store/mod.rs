//! Persistence adapter for submission records
//!
//! The engine never touches storage directly; it is handed a
//! [`SubmissionStore`]. Stores own the uniqueness rules that make the
//! engine safe against concurrent callers:
//! - one submission per (job, form version)
//! - one instance per (submission, template, asset)
//! - one reading per (instance, field), overwritten on re-capture
//!
//! A second insert for a taken key must collapse onto the stored row
//! rather than fail or duplicate.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::core::identity::EntityId;
use crate::entities::{Answers, EntityInstance, Reading, Submission};

/// Errors raised by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot encode record: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("record {0} does not exist")]
    Missing(EntityId),
}

/// Storage for submissions, their instances and readings
pub trait SubmissionStore {
    /// Insert a submission; if one exists for the same (job, form version)
    /// the stored one is returned instead
    fn insert_submission(&mut self, submission: &Submission) -> Result<Submission, StoreError>;

    fn submission(&self, id: &EntityId) -> Result<Option<Submission>, StoreError>;

    /// All submissions, oldest first
    fn submissions(&self) -> Result<Vec<Submission>, StoreError>;

    /// Replace the header fields of an existing submission
    fn update_submission(&mut self, submission: &Submission) -> Result<(), StoreError>;

    /// Insert an instance unless its composite key is taken.
    ///
    /// Returns the stored instance and whether this call created it.
    fn upsert_instance(
        &mut self,
        instance: &EntityInstance,
    ) -> Result<(EntityInstance, bool), StoreError>;

    fn instance(&self, id: &EntityId) -> Result<Option<EntityInstance>, StoreError>;

    /// Instances of a submission in creation order
    fn instances(&self, submission_id: &EntityId) -> Result<Vec<EntityInstance>, StoreError>;

    /// Replace the answers of an instance
    fn save_answers(&mut self, instance_id: &EntityId, answers: &Answers)
        -> Result<(), StoreError>;

    /// Insert or overwrite the reading for (instance, field); the stored
    /// reading keeps its original id
    fn put_reading(&mut self, reading: &Reading) -> Result<Reading, StoreError>;

    /// Store a reading together with the instance's updated answers.
    ///
    /// Either both writes land or neither does.
    fn record_reading(
        &mut self,
        reading: &Reading,
        answers: &Answers,
    ) -> Result<Reading, StoreError>;

    /// Readings of all instances of a submission
    fn readings(&self, submission_id: &EntityId) -> Result<Vec<Reading>, StoreError>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store must share, run against each implementation

    use super::*;
    use crate::core::identity::EntityPrefix;
    use chrono::Utc;
    use serde_json::json;

    fn reading(instance: &EntityInstance, value: serde_json::Value) -> Reading {
        Reading {
            id: EntityId::new(EntityPrefix::Rdg),
            instance_id: instance.id.clone(),
            field_id: "ir".to_string(),
            meter_id: EntityId::new(EntityPrefix::Mtr),
            calibration_id: EntityId::new(EntityPrefix::Cal),
            calibration_expires_at: Utc::now(),
            value,
            captured_at: Utc::now(),
            captured_by: Some("sam".to_string()),
        }
    }

    pub fn submission_collapses_on_job_and_form(store: &mut dyn SubmissionStore) {
        let form = EntityId::new(EntityPrefix::Form);
        let first = Submission::new("J-1", form.clone(), "sam".to_string());
        let second = Submission::new("J-1", form, "kim".to_string());

        let a = store.insert_submission(&first).unwrap();
        let b = store.insert_submission(&second).unwrap();
        assert_eq!(a.id, first.id);
        assert_eq!(b.id, first.id);
        assert_eq!(store.submissions().unwrap().len(), 1);
    }

    pub fn instance_collapses_on_composite_key(store: &mut dyn SubmissionStore) {
        let sub = store
            .insert_submission(&Submission::new(
                "J-2",
                EntityId::new(EntityPrefix::Form),
                "sam".to_string(),
            ))
            .unwrap();
        let tmpl = EntityId::new(EntityPrefix::Tmpl);
        let asset = EntityId::new(EntityPrefix::Ast);

        let a = EntityInstance::new(sub.id.clone(), tmpl.clone(), Some(asset.clone()));
        let b = EntityInstance::new(sub.id.clone(), tmpl.clone(), Some(asset));
        let general_1 = EntityInstance::new(sub.id.clone(), tmpl.clone(), None);
        let general_2 = EntityInstance::new(sub.id.clone(), tmpl, None);

        let (stored_a, created_a) = store.upsert_instance(&a).unwrap();
        let (stored_b, created_b) = store.upsert_instance(&b).unwrap();
        let (_, created_g1) = store.upsert_instance(&general_1).unwrap();
        let (stored_g2, created_g2) = store.upsert_instance(&general_2).unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(stored_a.id, stored_b.id);
        assert!(created_g1);
        assert!(!created_g2);
        assert_eq!(stored_g2.id, general_1.id);
        assert_eq!(store.instances(&sub.id).unwrap().len(), 2);
    }

    pub fn answers_and_readings_round_trip(store: &mut dyn SubmissionStore) {
        let sub = store
            .insert_submission(&Submission::new(
                "J-3",
                EntityId::new(EntityPrefix::Form),
                "sam".to_string(),
            ))
            .unwrap();
        let inst = EntityInstance::new(sub.id.clone(), EntityId::new(EntityPrefix::Tmpl), None);
        store.upsert_instance(&inst).unwrap();

        let mut answers = Answers::new();
        answers.insert("visual".to_string(), json!("pass"));
        store.save_answers(&inst.id, &answers).unwrap();
        let loaded = store.instance(&inst.id).unwrap().unwrap();
        assert_eq!(loaded.answers, answers);

        let first = store.put_reading(&reading(&inst, json!(12.5))).unwrap();
        let second = store.put_reading(&reading(&inst, json!(14.0))).unwrap();
        assert_eq!(first.id, second.id);
        let readings = store.readings(&sub.id).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, json!(14.0));
    }

    pub fn unknown_records(store: &mut dyn SubmissionStore) {
        let missing = EntityId::new(EntityPrefix::Inst);
        assert!(store.instance(&missing).unwrap().is_none());
        assert!(store
            .submission(&EntityId::new(EntityPrefix::Sub))
            .unwrap()
            .is_none());
        assert!(matches!(
            store.save_answers(&missing, &Answers::new()),
            Err(StoreError::Missing(_))
        ));
    }

    pub fn reading_and_answers_land_together(store: &mut dyn SubmissionStore) {
        let sub = store
            .insert_submission(&Submission::new(
                "J-5",
                EntityId::new(EntityPrefix::Form),
                "sam".to_string(),
            ))
            .unwrap();
        let (inst, _) = store
            .upsert_instance(&EntityInstance::new(
                sub.id.clone(),
                EntityId::new(EntityPrefix::Tmpl),
                None,
            ))
            .unwrap();

        let mut answers = Answers::new();
        answers.insert("ir".to_string(), json!(42));
        let stored = store
            .record_reading(&reading(&inst, json!(42)), &answers)
            .unwrap();
        assert_eq!(stored.value, json!(42));
        assert_eq!(store.readings(&sub.id).unwrap().len(), 1);
        assert_eq!(
            store.instance(&inst.id).unwrap().unwrap().answers.get("ir"),
            Some(&json!(42))
        );

        let ghost = EntityInstance::new(sub.id.clone(), EntityId::new(EntityPrefix::Tmpl), None);
        assert!(matches!(
            store.record_reading(&reading(&ghost, json!(7)), &answers),
            Err(StoreError::Missing(_))
        ));
        assert_eq!(store.readings(&sub.id).unwrap().len(), 1);
    }

    pub fn update_submission_persists_status(store: &mut dyn SubmissionStore) {
        use crate::entities::{OverallResult, SubmissionStatus};

        let mut sub = store
            .insert_submission(&Submission::new(
                "J-4",
                EntityId::new(EntityPrefix::Form),
                "sam".to_string(),
            ))
            .unwrap();
        sub.status = SubmissionStatus::Submitted;
        sub.pass_count = 3;
        sub.overall_result = Some(OverallResult::Pass);
        sub.record_digest = Some("abc".to_string());
        store.update_submission(&sub).unwrap();

        let loaded = store.submission(&sub.id).unwrap().unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Submitted);
        assert_eq!(loaded.pass_count, 3);
        assert_eq!(loaded.overall_result, Some(OverallResult::Pass));
        assert_eq!(loaded.record_digest.as_deref(), Some("abc"));
    }
}
