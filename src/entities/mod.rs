//! Record type definitions
//!
//! **Catalog (read-only to the engine):**
//! - [`FormVersion`] - Versioned set of [`EntityTemplate`]s with [`FieldDefinition`]s
//! - [`Asset`] / [`Job`] - What is tested, and the visit it is tested on
//! - [`Meter`] / [`Calibration`] - Instruments and their certification history
//!
//! **Submission records:**
//! - [`Submission`] - One test session for a (job, form version)
//! - [`EntityInstance`] - One occurrence of a template, optionally per asset
//! - [`Reading`] - A metered value with its calibration snapshot

pub mod asset;
pub mod form;
pub mod meter;
pub mod submission;

pub use asset::{Asset, Job};
pub use form::{EntityTemplate, FieldDefinition, FieldType, FormVersion};
pub use meter::{Calibration, CalibrationState, Meter};
pub use submission::{
    Answers, EntityInstance, InstanceIndex, InstanceKey, OverallResult, Reading, Submission,
    SubmissionStatus, Verdict,
};
