//! Error types for the gateway surface.

use agetoken::{ConfigError, IssueError, TrustError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while setting up or administering a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The configuration or attestor identity is invalid.
    #[error("invalid gateway configuration: {0}")]
    Config(#[from] ConfigError),
    /// A trust bundle was rejected; the previous bundle stays installed.
    #[error("trust bundle rejected: {0}")]
    Trust(#[from] TrustError),
}

/// Error returned to callers of the issuance endpoint.
///
/// Carries a coarse code and a generic message only; the detailed cause is
/// logged, not returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    /// Machine-readable category
    pub code: String,
    /// Human-readable message without internal detail
    pub message: String,
}

impl ClientError {
    /// Rejected request body or field.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: "invalid_request".to_string(),
            message: message.into(),
        }
    }

    /// The attestor cannot issue right now.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            code: "unavailable".to_string(),
            message: "attestation service temporarily unavailable".to_string(),
        }
    }
}

impl From<IssueError> for ClientError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::InvalidInput { field, .. } => {
                Self::invalid_request(format!("invalid value for '{field}'"))
            }
            IssueError::NoActiveKey | IssueError::Unavailable { .. } => Self::unavailable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_names_field_only() {
        let err: ClientError = IssueError::invalid_input("nonce", "contains 0x7f at byte 3").into();
        assert_eq!(err.code, "invalid_request");
        assert_eq!(err.message, "invalid value for 'nonce'");
    }

    #[test]
    fn key_problems_are_generic() {
        let err: ClientError = IssueError::NoActiveKey.into();
        assert_eq!(err, ClientError::unavailable());
        assert!(!err.message.contains("key"));
    }
}
