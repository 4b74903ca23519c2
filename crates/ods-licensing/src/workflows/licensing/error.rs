use std::fmt::Display;

use super::co2::CalculationError;
use super::repository::{RepositoryError, StorageError};

/// Errors surfaced to callers of the licensing workflows.
#[derive(Debug, thiserror::Error)]
pub enum LicensingError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("{entity} {id} cannot {action} while {state}")]
    InvalidState {
        entity: &'static str,
        id: String,
        state: &'static str,
        action: &'static str,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("concurrent update conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("store unavailable: {0}")]
    Store(String),
}

impl LicensingError {
    pub(crate) fn invalid_state(
        entity: &'static str,
        id: impl Display,
        state: &'static str,
        action: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.to_string(),
            state,
            action,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller should retry the whole operation from fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

impl From<RepositoryError> for LicensingError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict => {
                Self::ConcurrencyConflict("record changed since it was read".to_string())
            }
            RepositoryError::Constraint(detail) => Self::Precondition(detail),
            RepositoryError::Unavailable(detail) => Self::Store(detail),
        }
    }
}

impl From<CalculationError> for LicensingError {
    fn from(value: CalculationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<StorageError> for LicensingError {
    fn from(value: StorageError) -> Self {
        Self::Store(value.to_string())
    }
}
