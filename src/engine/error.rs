//! Typed failures returned by the engine

use miette::Diagnostic;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::core::identity::EntityId;
use crate::core::store::StoreError;
use crate::entities::SubmissionStatus;

/// Coarse failure class, for callers that map errors to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retrying the same call will fail again
    Validation,
    /// A referenced record does not exist
    NotFound,
    /// The record is in a state that forbids the operation
    Conflict,
    /// Persistence or catalog failure
    Storage,
}

/// Errors returned by engine operations
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("{0}")]
    #[diagnostic(code(fct::validation))]
    Validation(String),

    #[error("calibration {supplied} is not the active calibration of {meter} (active: {active})")]
    #[diagnostic(
        code(fct::validation),
        help("the meter was recalibrated since the calibration was chosen; reload it and capture again")
    )]
    StaleCalibration {
        meter: String,
        supplied: EntityId,
        active: EntityId,
    },

    #[error("required field '{field}' is blank on {instance}")]
    #[diagnostic(code(fct::validation))]
    MissingRequired { instance: EntityId, field: String },

    #[error("{what} '{id}' not found")]
    #[diagnostic(code(fct::not_found))]
    NotFound { what: &'static str, id: String },

    #[error("submission {0} has been submitted and can no longer be changed")]
    #[diagnostic(code(fct::locked))]
    SubmissionLocked(EntityId),

    #[error("invalid status transition: {from} -> {to}")]
    #[diagnostic(code(fct::transition))]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error(transparent)]
    #[diagnostic(code(fct::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(fct::catalog))]
    Catalog(CatalogError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_)
            | EngineError::StaleCalibration { .. }
            | EngineError::MissingRequired { .. } => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::SubmissionLocked(_) | EngineError::InvalidTransition { .. } => {
                ErrorKind::Conflict
            }
            EngineError::Store(_) | EngineError::Catalog(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            what,
            id: id.to_string(),
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownFormVersion(id) => EngineError::not_found("form version", id),
            CatalogError::UnknownJob(id) => EngineError::not_found("job", id),
            CatalogError::UnknownMeter(id) => EngineError::not_found("meter", id),
            other => EngineError::Catalog(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;

    #[test]
    fn test_catalog_misses_become_not_found() {
        let err: EngineError = CatalogError::UnknownJob("J-404".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "job 'J-404' not found");

        let err: EngineError = CatalogError::Unavailable("disk".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_kinds() {
        let id = EntityId::new(EntityPrefix::Sub);
        assert_eq!(
            EngineError::SubmissionLocked(id.clone()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::MissingRequired {
                instance: id,
                field: "ir".to_string()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::InvalidTransition {
                from: SubmissionStatus::Submitted,
                to: SubmissionStatus::Submitted
            }
            .kind(),
            ErrorKind::Conflict
        );
    }
}
