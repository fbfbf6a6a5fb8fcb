//! Database schema initialization

use rusqlite::{params, OptionalExtension};

use super::sqlite::{SqliteStore, SCHEMA_VERSION};
use super::StoreError;

impl SqliteStore {
    /// Create tables if needed and check the schema version
    pub(super) fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- One row per test session; (job, form version) is the session key
            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                form_version_id TEXT NOT NULL,
                status TEXT NOT NULL,
                pass_count INTEGER NOT NULL DEFAULT 0,
                fail_count INTEGER NOT NULL DEFAULT 0,
                na_count INTEGER NOT NULL DEFAULT 0,
                overall_result TEXT,
                created TEXT NOT NULL,
                author TEXT NOT NULL,
                submitted_at TEXT,
                submitted_by TEXT,
                record_digest TEXT,
                UNIQUE (job_id, form_version_id)
            );

            -- Entity instances; asset_key is '' for general instances so the
            -- unique constraint also covers them (NULLs never collide)
            CREATE TABLE IF NOT EXISTS instances (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL REFERENCES submissions(id),
                template_id TEXT NOT NULL,
                asset_key TEXT NOT NULL DEFAULT '',
                answers TEXT NOT NULL DEFAULT '{}',
                updated TEXT NOT NULL,
                UNIQUE (submission_id, template_id, asset_key)
            );
            CREATE INDEX IF NOT EXISTS idx_instances_submission ON instances(submission_id);

            -- Metered readings, one per (instance, field)
            CREATE TABLE IF NOT EXISTS readings (
                id TEXT PRIMARY KEY,
                instance_id TEXT NOT NULL REFERENCES instances(id),
                field_id TEXT NOT NULL,
                meter_id TEXT NOT NULL,
                calibration_id TEXT NOT NULL,
                calibration_expires_at TEXT NOT NULL,
                value TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                captured_by TEXT,
                UNIQUE (instance_id, field_id)
            );
            CREATE INDEX IF NOT EXISTS idx_readings_instance ON readings(instance_id);
            "#,
        )?;

        let stored: Option<i32> = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        match stored {
            None => {
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(v) if v > SCHEMA_VERSION => {
                return Err(StoreError::Corrupt(format!(
                    "database schema v{} is newer than this fct (v{})",
                    v, SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }
}
