//! Error taxonomy shared by the ledger, factory, registry and market.
//!
//! Every failure leaves registry state exactly as it was before the call,
//! so callers can correct their input and retry.

use thiserror::Error;

use crate::storage::DbError;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum ParcelError {
    /// Caller-supplied data was empty, null, or otherwise malformed.
    #[error("invalid input: {field} {reason}")]
    InvalidInput {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The tokenization factory could not create an instance.
    #[error("provision failure: {0}")]
    ProvisionFailure(String),

    /// Lookup of an unknown property id or tokenization handle.
    #[error("not found: {0}")]
    NotFound(String),

    /// The durable store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl ParcelError {
    /// Shorthand for [`ParcelError::InvalidInput`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ParcelError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Stable, lowercase name of the error kind. Used as a metrics label and
    /// in API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ParcelError::InvalidInput { .. } => "invalid_input",
            ParcelError::ProvisionFailure(_) => "provision_failure",
            ParcelError::NotFound(_) => "not_found",
            ParcelError::Storage(_) => "storage",
        }
    }
}

pub type ParcelResult<T> = Result<T, ParcelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message_names_the_field() {
        let err = ParcelError::invalid("name", "must not be empty");
        assert_eq!(err.to_string(), "invalid input: name must not be empty");
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn storage_errors_convert() {
        let err: ParcelError = DbError::Corrupted("bad counter".into()).into();
        assert_eq!(err.kind(), "storage");
        assert!(err.to_string().contains("bad counter"));
    }
}
