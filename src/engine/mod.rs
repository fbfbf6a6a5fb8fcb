//! Compliance reading/submission engine
//!
//! Turns a form version into per-asset work items, captures answers and
//! metered readings, classifies them, and walks a submission through
//! `draft -> active -> submitted`.
//!
//! The engine does no I/O of its own. Catalog lookups go through the
//! [`TemplateCatalog`], [`AssetDirectory`] and [`MeterRegistry`] traits and
//! persistence through a [`SubmissionStore`], all handed in by the caller.
//!
//! Operations return structured outcomes: the updated record plus advisory
//! [`Warning`]s, or a typed [`EngineError`].

mod answers;
mod completeness;
mod error;
pub mod evaluate;
mod instantiate;
mod lifecycle;
mod metrology;

pub use completeness::untested;
pub use error::{EngineError, ErrorKind, Result};
pub use evaluate::{aggregate, classify, Tally};
pub use instantiate::Instantiation;
pub use lifecycle::{allowed_transitions, is_valid_transition, record_digest, Summary, SubmitOutcome};
pub use metrology::{ReadingCapture, ReadingOutcome};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{AssetDirectory, MeterRegistry, TemplateCatalog};
use crate::core::config::Config;
use crate::core::identity::EntityId;
use crate::core::store::SubmissionStore;
use crate::entities::{EntityInstance, FormVersion, Submission};

/// Policy and identity the engine runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Recorded on submissions and readings
    pub operator: String,

    /// Warn when a bound calibration expires within this many days (0 = off)
    pub calibration_warning_days: i64,

    /// Refuse to submit while applicable assets remain untested
    pub require_complete: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            operator: "unknown".to_string(),
            calibration_warning_days: 30,
            require_complete: false,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            operator: config.author(),
            calibration_warning_days: config.compliance.calibration_warning_days,
            require_complete: config.compliance.require_complete,
        }
    }
}

/// Advisory condition attached to a successful result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The bound calibration had lapsed when the value was captured
    CalibrationExpired {
        meter: String,
        expired_at: DateTime<Utc>,
    },

    /// The bound calibration lapses within the warning horizon
    CalibrationExpiringSoon {
        meter: String,
        expires_at: DateTime<Utc>,
        days_left: i64,
    },

    /// An applicable asset has no started instance
    Untested { asset: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CalibrationExpired { meter, expired_at } => write!(
                f,
                "calibration of {} expired on {}",
                meter,
                expired_at.format("%Y-%m-%d")
            ),
            Warning::CalibrationExpiringSoon {
                meter,
                expires_at,
                days_left,
            } => write!(
                f,
                "calibration of {} expires in {} day{} ({})",
                meter,
                days_left,
                if *days_left == 1 { "" } else { "s" },
                expires_at.format("%Y-%m-%d")
            ),
            Warning::Untested { asset } => write!(f, "untested: {}", asset),
        }
    }
}

/// The engine, bound to its collaborators
pub struct Engine<'a, S: SubmissionStore> {
    store: S,
    templates: &'a dyn TemplateCatalog,
    assets: &'a dyn AssetDirectory,
    meters: &'a dyn MeterRegistry,
    settings: EngineSettings,
}

impl<'a, S: SubmissionStore> Engine<'a, S> {
    pub fn new(
        store: S,
        templates: &'a dyn TemplateCatalog,
        assets: &'a dyn AssetDirectory,
        meters: &'a dyn MeterRegistry,
    ) -> Self {
        Self {
            store,
            templates,
            assets,
            meters,
            settings: EngineSettings::default(),
        }
    }

    /// Use one catalog for all three collaborators
    pub fn with_catalog<C>(store: S, catalog: &'a C) -> Self
    where
        C: TemplateCatalog + AssetDirectory + MeterRegistry,
    {
        Self::new(store, catalog, catalog, catalog)
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Load a submission or fail with NotFound
    pub fn submission(&self, submission_id: &EntityId) -> Result<Submission> {
        self.store
            .submission(submission_id)?
            .ok_or_else(|| EngineError::not_found("submission", submission_id))
    }

    /// Load an instance or fail with NotFound
    pub fn instance(&self, instance_id: &EntityId) -> Result<EntityInstance> {
        self.store
            .instance(instance_id)?
            .ok_or_else(|| EngineError::not_found("instance", instance_id))
    }

    /// Form version a submission was started against
    pub fn form_for(&self, submission: &Submission) -> Result<FormVersion> {
        Ok(self.templates.version(&submission.form_version_id)?)
    }

    fn ensure_writable(&self, submission: &Submission) -> Result<()> {
        if submission.is_submitted() {
            log::warn!("rejected write to submitted {}", submission.id);
            return Err(EngineError::SubmissionLocked(submission.id.clone()));
        }
        Ok(())
    }
}
