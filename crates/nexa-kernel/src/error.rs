//! Error taxonomy shared by every gateway component.
//!
//! [`GatewayError`] is the single error kind that flows from the manifest,
//! engines, cache, and quota enforcer up to the dispatcher, which maps each
//! variant onto a client-facing status.  [`StoreError`] is the narrower
//! failure type of the external [`SharedStore`](crate::gateway::SharedStore).

use thiserror::Error;

/// Request- and startup-level failure kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    // ── Resolution ───────────────────────────────────────────────────────────
    /// The requested model family is not present in the manifest.
    #[error("model family '{0}' not found")]
    ModelNotFound(String),

    /// The family exists but the requested version does not.
    #[error("version '{version}' of model family '{family}' not found")]
    VersionNotFound { family: String, version: String },

    // ── Client input ─────────────────────────────────────────────────────────
    /// The family-specific payload failed validation.
    #[error("invalid {family} input: {message}")]
    InputValidation { family: String, message: String },

    /// The tenant has used its whole allowance for the current window.
    #[error("quota of {limit} requests exhausted for tenant '{tenant}' in window {window}")]
    QuotaExceeded {
        tenant: String,
        limit: u64,
        window: String,
    },

    /// Missing or unknown API key.
    #[error("authentication failed: {0}")]
    Authentication(String),

    // ── Infrastructure ───────────────────────────────────────────────────────
    /// Neither the persisted manifest nor a directory scan yielded usable
    /// entries (for one family, or for all of them).
    #[error("model manifest unusable: {0}")]
    ManifestCorrupt(String),

    /// The shared quota/cache store could not be reached.
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(String),

    /// The request deadline elapsed while waiting on the store or the model.
    #[error("request deadline of {0} ms elapsed")]
    Timeout(u64),

    /// Model or engine failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convenience constructor for validation failures.
    pub fn invalid(family: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::InputValidation {
            family: family.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code used in response bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            GatewayError::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            GatewayError::InputValidation { .. } => "INPUT_VALIDATION",
            GatewayError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            GatewayError::Authentication(_) => "AUTHENTICATION",
            GatewayError::ManifestCorrupt(_) => "MANIFEST_CORRUPT",
            GatewayError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            GatewayError::Timeout(_) => "TIMEOUT",
            GatewayError::Internal(_) => "INTERNAL",
        }
    }

    /// `true` when the caller, not the gateway, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::ModelNotFound(_)
                | GatewayError::VersionNotFound { .. }
                | GatewayError::InputValidation { .. }
                | GatewayError::QuotaExceeded { .. }
                | GatewayError::Authentication(_)
        )
    }
}

/// Failure reported by a [`SharedStore`](crate::gateway::SharedStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// Connection refused, timed out, or otherwise unreachable.
    #[error("store unreachable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("stored value is malformed: {0}")]
    Malformed(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::StoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(GatewayError::ModelNotFound("x".into()).is_client_error());
        assert!(GatewayError::invalid("bio", "empty").is_client_error());
        assert!(!GatewayError::StoreUnavailable("down".into()).is_client_error());
        assert!(!GatewayError::Timeout(10).is_client_error());
    }

    #[test]
    fn store_error_becomes_store_unavailable() {
        let err: GatewayError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert!(err.to_string().contains("connection refused"));
    }
}
