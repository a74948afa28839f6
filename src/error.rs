//! Error taxonomy shared by the classifier, generator, stores, and runtime.
//!
//! Failures coming out of the tabular source or the record store are caught
//! where the core calls them and converted into one of these kinds, so the
//! runtime never sees a transport-level error.

use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    /// The table could not be fetched or parsed (missing, not public, malformed).
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The field model breaks one of its invariants; nothing is persisted.
    #[error("Invalid field model: {0}")]
    InvalidModel(String),

    /// No ACTIVE layout spec (or no spec with the requested version) exists.
    #[error("No layout spec found for {0}")]
    SpecNotFound(String),

    /// Edit/delete target is missing, already deleted, or outside the scope.
    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    /// One or more import chunks failed; earlier chunks stay committed.
    #[error("Imported {imported} of {attempted} row(s); {failed_chunks} chunk(s) failed")]
    ImportPartialFailure {
        imported: usize,
        attempted: usize,
        failed_chunks: usize,
    },

    #[error("App '{0}' is not registered")]
    AppNotFound(String),

    /// A form value failed lazy validation at submit time.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl AppError {
    pub fn invalid_model(message: impl Into<String>) -> Self {
        AppError::InvalidModel(message.into())
    }

    pub fn source(message: impl Into<String>) -> Self {
        AppError::SourceUnavailable(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        AppError::Storage(message.into())
    }

    /// Whether the user can reasonably retry the triggering action as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::SourceUnavailable(_) | AppError::Storage(_))
    }
}
