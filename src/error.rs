//! Error types for the login and registration flows.

use crate::state::Provider;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the login/registration core.
///
/// Every variant here is recoverable: nothing in this crate is fatal to
/// the process, and the orchestrator resolves each failure to a redirect
/// plus a flashed message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Talking to an identity provider failed (network, invalid/expired
    /// code, malformed response). The user must restart the flow.
    #[error("{provider} sign-in failed: {reason}")]
    Provider {
        /// Provider the failure came from.
        provider: Provider,
        /// Short description of the failure (not shown to users).
        reason: String,
    },

    /// One or more registration inputs were rejected.
    ///
    /// Carries every applicable message so the caller can surface all
    /// problems at once rather than only the first.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A unique index rejected an insert that raced past the pre-check.
    ///
    /// Presented to users as a validation failure.
    #[error("duplicate value for {field}")]
    Duplicate {
        /// The unique field that collided (`"username"` or `"email"`).
        field: &'static str,
    },

    /// Wrong password or unknown email.
    ///
    /// Deliberately carries no detail: the caller must surface the same
    /// generic message for both cases to avoid account enumeration.
    #[error("invalid credentials")]
    CredentialMismatch,

    /// Internal failure (poisoned lock, serialization edge).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if this error is caused by user input and safe to
    /// present as a specific message list.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Duplicate { .. } | Self::CredentialMismatch
        )
    }

    /// Collapse a duplicate-key error into the validation presentation.
    ///
    /// Store-level unique indexes are the source of truth for uniqueness;
    /// when they fire, users see the same message the pre-check would
    /// have produced.
    #[must_use]
    pub fn into_validation(self) -> Self {
        match self {
            Self::Duplicate { field } => {
                Self::Validation(vec![format!("This {field} is already registered.")])
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_classification() {
        assert!(AuthError::CredentialMismatch.is_user_error());
        assert!(AuthError::Validation(vec!["bad email".into()]).is_user_error());
        assert!(AuthError::Duplicate { field: "email" }.is_user_error());
        assert!(!AuthError::Internal("lock poisoned".into()).is_user_error());
    }

    #[test]
    fn test_duplicate_maps_to_validation() {
        let err = AuthError::Duplicate { field: "username" }.into_validation();
        match err {
            AuthError::Validation(messages) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("username"));
            }
            other => panic!("expected validation, got {other:?}"),
        }
    }
}
