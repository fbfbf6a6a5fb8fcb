//! SQLite-backed submission store
//!
//! Uniqueness is enforced by table constraints, so two processes racing to
//! create the same instance end up with one row: the loser's insert is
//! ignored and it reads back the winner's row.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{StoreError, SubmissionStore};
use crate::core::identity::EntityId;
use crate::entities::{Answers, EntityInstance, Reading, Submission};

/// Current schema version
pub(super) const SCHEMA_VERSION: i32 = 1;

const SUBMISSION_COLUMNS: &str = "id, job_id, form_version_id, status, pass_count, fail_count, \
     na_count, overall_result, created, author, submitted_at, submitted_by, record_digest";

const INSTANCE_COLUMNS: &str = "id, submission_id, template_id, asset_key, answers, updated";

const READING_COLUMNS: &str = "r.id, r.instance_id, r.field_id, r.meter_id, r.calibration_id, \
     r.calibration_expires_at, r.value, r.captured_at, r.captured_by";

/// Submission store backed by a SQLite database
pub struct SqliteStore {
    pub(super) conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;

        // WAL lets a second tab read while another writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<EntityId> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let status: String = row.get(3)?;
    let overall: Option<String> = row.get(7)?;
    Ok(Submission {
        id: id_at(row, 0)?,
        job_id: row.get(1)?,
        form_version_id: id_at(row, 2)?,
        status: status.parse().map_err(|e: String| conversion_error(3, e))?,
        pass_count: row.get(4)?,
        fail_count: row.get(5)?,
        na_count: row.get(6)?,
        overall_result: overall
            .map(|o| serde_json::from_value(serde_json::Value::String(o)))
            .transpose()
            .map_err(|e| conversion_error(7, e))?,
        created: time_at(row, 8)?,
        author: row.get(9)?,
        submitted_at: opt_time_at(row, 10)?,
        submitted_by: row.get(11)?,
        record_digest: row.get(12)?,
    })
}

fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<EntityInstance> {
    let asset_key: String = row.get(3)?;
    let asset_id = if asset_key.is_empty() {
        None
    } else {
        Some(id_at(row, 3)?)
    };
    Ok(EntityInstance {
        id: id_at(row, 0)?,
        submission_id: id_at(row, 1)?,
        template_id: id_at(row, 2)?,
        asset_id,
        answers: json_at(row, 4)?,
        updated: time_at(row, 5)?,
    })
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: id_at(row, 0)?,
        instance_id: id_at(row, 1)?,
        field_id: row.get(2)?,
        meter_id: id_at(row, 3)?,
        calibration_id: id_at(row, 4)?,
        calibration_expires_at: time_at(row, 5)?,
        value: json_at(row, 6)?,
        captured_at: time_at(row, 7)?,
        captured_by: row.get(8)?,
    })
}

fn overall_text(submission: &Submission) -> Option<String> {
    submission
        .overall_result
        .map(|o| o.to_string().to_lowercase())
}

fn write_answers(
    conn: &Connection,
    instance_id: &EntityId,
    answers: &Answers,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE instances SET answers = ?2, updated = ?3 WHERE id = ?1",
        params![
            instance_id.to_string(),
            serde_json::to_string(answers)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::Missing(instance_id.clone()));
    }
    Ok(())
}

/// Upsert on (instance, field) and read back the stored row
fn write_reading(conn: &Connection, reading: &Reading) -> Result<Reading, StoreError> {
    conn.execute(
        r#"INSERT INTO readings
               (id, instance_id, field_id, meter_id, calibration_id,
                calibration_expires_at, value, captured_at, captured_by)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (instance_id, field_id) DO UPDATE SET
               meter_id = excluded.meter_id,
               calibration_id = excluded.calibration_id,
               calibration_expires_at = excluded.calibration_expires_at,
               value = excluded.value,
               captured_at = excluded.captured_at,
               captured_by = excluded.captured_by"#,
        params![
            reading.id.to_string(),
            reading.instance_id.to_string(),
            reading.field_id,
            reading.meter_id.to_string(),
            reading.calibration_id.to_string(),
            reading.calibration_expires_at.to_rfc3339(),
            serde_json::to_string(&reading.value)?,
            reading.captured_at.to_rfc3339(),
            reading.captured_by,
        ],
    )?;

    let stored = conn.query_row(
        &format!(
            "SELECT {} FROM readings r WHERE r.instance_id = ?1 AND r.field_id = ?2",
            READING_COLUMNS
        ),
        params![reading.instance_id.to_string(), reading.field_id],
        reading_from_row,
    )?;
    Ok(stored)
}

impl SubmissionStore for SqliteStore {
    fn insert_submission(&mut self, submission: &Submission) -> Result<Submission, StoreError> {
        self.conn.execute(
            r#"INSERT INTO submissions
                   (id, job_id, form_version_id, status, pass_count, fail_count, na_count,
                    overall_result, created, author, submitted_at, submitted_by, record_digest)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
               ON CONFLICT (job_id, form_version_id) DO NOTHING"#,
            params![
                submission.id.to_string(),
                submission.job_id,
                submission.form_version_id.to_string(),
                submission.status.to_string(),
                submission.pass_count,
                submission.fail_count,
                submission.na_count,
                overall_text(submission),
                submission.created.to_rfc3339(),
                submission.author,
                submission.submitted_at.map(|t| t.to_rfc3339()),
                submission.submitted_by,
                submission.record_digest,
            ],
        )?;

        let stored = self.conn.query_row(
            &format!(
                "SELECT {} FROM submissions WHERE job_id = ?1 AND form_version_id = ?2",
                SUBMISSION_COLUMNS
            ),
            params![submission.job_id, submission.form_version_id.to_string()],
            submission_from_row,
        )?;
        Ok(stored)
    }

    fn submission(&self, id: &EntityId) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM submissions WHERE id = ?1", SUBMISSION_COLUMNS),
                params![id.to_string()],
                submission_from_row,
            )
            .optional()?)
    }

    fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM submissions ORDER BY created, rowid",
            SUBMISSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], submission_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_submission(&mut self, submission: &Submission) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            r#"UPDATE submissions
               SET status = ?2, pass_count = ?3, fail_count = ?4, na_count = ?5,
                   overall_result = ?6, submitted_at = ?7, submitted_by = ?8, record_digest = ?9
               WHERE id = ?1"#,
            params![
                submission.id.to_string(),
                submission.status.to_string(),
                submission.pass_count,
                submission.fail_count,
                submission.na_count,
                overall_text(submission),
                submission.submitted_at.map(|t| t.to_rfc3339()),
                submission.submitted_by,
                submission.record_digest,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Missing(submission.id.clone()));
        }
        Ok(())
    }

    fn upsert_instance(
        &mut self,
        instance: &EntityInstance,
    ) -> Result<(EntityInstance, bool), StoreError> {
        let asset_key = instance
            .asset_id
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_default();

        let inserted = self.conn.execute(
            r#"INSERT INTO instances (id, submission_id, template_id, asset_key, answers, updated)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT (submission_id, template_id, asset_key) DO NOTHING"#,
            params![
                instance.id.to_string(),
                instance.submission_id.to_string(),
                instance.template_id.to_string(),
                asset_key,
                serde_json::to_string(&instance.answers)?,
                instance.updated.to_rfc3339(),
            ],
        )?;

        let stored = self.conn.query_row(
            &format!(
                "SELECT {} FROM instances
                 WHERE submission_id = ?1 AND template_id = ?2 AND asset_key = ?3",
                INSTANCE_COLUMNS
            ),
            params![
                instance.submission_id.to_string(),
                instance.template_id.to_string(),
                asset_key
            ],
            instance_from_row,
        )?;
        Ok((stored, inserted > 0))
    }

    fn instance(&self, id: &EntityId) -> Result<Option<EntityInstance>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM instances WHERE id = ?1", INSTANCE_COLUMNS),
                params![id.to_string()],
                instance_from_row,
            )
            .optional()?)
    }

    fn instances(&self, submission_id: &EntityId) -> Result<Vec<EntityInstance>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM instances WHERE submission_id = ?1 ORDER BY rowid",
            INSTANCE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![submission_id.to_string()], instance_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn save_answers(
        &mut self,
        instance_id: &EntityId,
        answers: &Answers,
    ) -> Result<(), StoreError> {
        write_answers(&self.conn, instance_id, answers)
    }

    fn put_reading(&mut self, reading: &Reading) -> Result<Reading, StoreError> {
        write_reading(&self.conn, reading)
    }

    fn record_reading(
        &mut self,
        reading: &Reading,
        answers: &Answers,
    ) -> Result<Reading, StoreError> {
        let tx = self.conn.transaction()?;
        write_answers(&tx, &reading.instance_id, answers)?;
        let stored = write_reading(&tx, reading)?;
        tx.commit()?;
        Ok(stored)
    }

    fn readings(&self, submission_id: &EntityId) -> Result<Vec<Reading>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM readings r
             JOIN instances i ON r.instance_id = i.id
             WHERE i.submission_id = ?1
             ORDER BY r.rowid",
            READING_COLUMNS
        ))?;
        let rows = stmt.query_map(params![submission_id.to_string()], reading_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[test]
    fn test_submission_collapses_on_job_and_form() {
        contract::submission_collapses_on_job_and_form(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_instance_collapses_on_composite_key() {
        contract::instance_collapses_on_composite_key(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_answers_and_readings_round_trip() {
        contract::answers_and_readings_round_trip(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_unknown_records() {
        contract::unknown_records(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_reading_and_answers_land_together() {
        contract::reading_and_answers_land_together(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_failed_record_reading_leaves_no_row() {
        use crate::core::identity::EntityPrefix;

        let mut store = SqliteStore::in_memory().unwrap();
        let ghost = EntityInstance::new(
            EntityId::new(EntityPrefix::Sub),
            EntityId::new(EntityPrefix::Tmpl),
            None,
        );
        let reading = Reading {
            id: EntityId::new(EntityPrefix::Rdg),
            instance_id: ghost.id.clone(),
            field_id: "ir".to_string(),
            meter_id: EntityId::new(EntityPrefix::Mtr),
            calibration_id: EntityId::new(EntityPrefix::Cal),
            calibration_expires_at: Utc::now(),
            value: serde_json::json!(3),
            captured_at: Utc::now(),
            captured_by: None,
        };

        assert!(store.record_reading(&reading, &Answers::new()).is_err());
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_update_submission_persists_status() {
        contract::update_submission_persists_status(&mut SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_two_connections_share_one_instance_row() {
        use crate::core::identity::EntityPrefix;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("subs.db");
        let mut first = SqliteStore::open(&path).unwrap();
        let mut second = SqliteStore::open(&path).unwrap();

        let sub = first
            .insert_submission(&Submission::new(
                "J-9",
                EntityId::new(EntityPrefix::Form),
                "sam".to_string(),
            ))
            .unwrap();
        let tmpl = EntityId::new(EntityPrefix::Tmpl);
        let asset = EntityId::new(EntityPrefix::Ast);

        let (a, created_a) = first
            .upsert_instance(&EntityInstance::new(sub.id.clone(), tmpl.clone(), Some(asset.clone())))
            .unwrap();
        let (b, created_b) = second
            .upsert_instance(&EntityInstance::new(sub.id.clone(), tmpl, Some(asset)))
            .unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
        assert_eq!(second.instances(&sub.id).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_records() {
        use crate::core::identity::EntityPrefix;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/subs.db");
        let sub_id = {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .insert_submission(&Submission::new(
                    "J-10",
                    EntityId::new(EntityPrefix::Form),
                    "sam".to_string(),
                ))
                .unwrap()
                .id
        };
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.submission(&sub_id).unwrap().is_some());
    }
}
