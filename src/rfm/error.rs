//! RFM engine error types.

use thiserror::Error;

use crate::storage::database::DatabaseError;

/// Errors that can occur during RFM computation.
#[derive(Debug, Error)]
pub enum RfmError {
    /// Invalid run parameters.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Result type for RFM operations.
pub type RfmResult<T> = Result<T, RfmError>;
