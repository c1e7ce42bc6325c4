//! Error types for validator queries

use beacon_storage::StorageError;
use beacon_types::{InvalidStateId, InvalidValidatorId, ParseStatusError, StateId, ValidatorId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidatorQueryError {
    #[error("Invalid state ID: {id}")]
    InvalidStateId { id: String },

    #[error("Invalid validator ID: {id}")]
    InvalidValidatorId { id: String },

    #[error("Invalid validator status: {status}")]
    InvalidStatus { status: String },

    #[error("State not found: {state_id}")]
    StateNotFound { state_id: StateId },

    #[error("Validator not found: {validator_id}")]
    ValidatorNotFound { validator_id: ValidatorId },

    #[error("State storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ValidatorQueryError {
    /// Malformed caller input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStateId { .. } | Self::InvalidValidatorId { .. } | Self::InvalidStatus { .. }
        )
    }

    /// Well-formed input that names nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StateNotFound { .. } | Self::ValidatorNotFound { .. }
        )
    }
}

impl From<InvalidStateId> for ValidatorQueryError {
    fn from(err: InvalidStateId) -> Self {
        Self::InvalidStateId { id: err.0 }
    }
}

impl From<InvalidValidatorId> for ValidatorQueryError {
    fn from(err: InvalidValidatorId) -> Self {
        Self::InvalidValidatorId { id: err.0 }
    }
}

impl From<ParseStatusError> for ValidatorQueryError {
    fn from(err: ParseStatusError) -> Self {
        Self::InvalidStatus { status: err.0 }
    }
}

pub type Result<T> = std::result::Result<T, ValidatorQueryError>;
