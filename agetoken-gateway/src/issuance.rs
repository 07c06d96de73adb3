//! Issuance endpoint.

use agetoken::CanonicalCodec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::AttestationContext;
use crate::error::ClientError;

/// Body of an issuance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueRequest {
    /// Age bucket wire value, e.g. `"13_15"`
    pub age: String,
    /// Relying platform the token is for
    pub aud: String,
    /// Caller-supplied nonce
    pub nonce: String,
}

impl IssueRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(age: impl Into<String>, aud: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            age: age.into(),
            aud: aud.into(),
            nonce: nonce.into(),
        }
    }
}

/// Body of a successful issuance response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResponse {
    /// Compact token
    pub token: String,
    /// Expiry, Unix seconds, as signed into the token
    pub expires_at: i64,
}

impl AttestationContext {
    /// Issues a compact token for the request at the context's current time.
    ///
    /// # Errors
    ///
    /// Returns a `ClientError` with a generic message; the detailed cause is
    /// logged at `warn`.
    pub fn handle_issue(&self, request: &IssueRequest) -> Result<IssueResponse, ClientError> {
        let token = self
            .issuer()
            .issue_str(&request.age, &request.aud, &request.nonce, self.now())
            .inspect_err(|e| warn!(error = %e, "issuance failed"))?;
        let claims = CanonicalCodec::from_config(self.issuer().config())
            .decode(token.payload())
            .map_err(|e| {
                warn!(error = %e, "issued payload failed to decode");
                ClientError::unavailable()
            })?;
        Ok(IssueResponse {
            token: token.to_compact(),
            expires_at: claims.expires_at,
        })
    }

    /// JSON form of [`handle_issue`](Self::handle_issue).
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the body is not a valid request or issuance
    /// fails.
    pub fn handle_issue_json(&self, body: &str) -> Result<String, ClientError> {
        let request: IssueRequest = serde_json::from_str(body)
            .map_err(|_| ClientError::invalid_request("request body must be {age, aud, nonce}"))?;
        let response = self.handle_issue(&request)?;
        serde_json::to_string(&response).map_err(|_| ClientError::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agetoken::{
        AttestationConfig, FixedClock, KeyRing, SignatureScheme, SigningKey, TrustStore,
    };

    use super::*;

    fn context() -> AttestationContext {
        let keyring = Arc::new(KeyRing::new());
        keyring
            .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 100_000)
            .unwrap();
        AttestationContext::new(
            AttestationConfig::default(),
            "attestor.example",
            keyring,
            Arc::new(TrustStore::new()),
            Arc::new(FixedClock::new(1000)),
        )
        .unwrap()
    }

    #[test]
    fn issues_compact_token() {
        let response = context()
            .handle_issue(&IssueRequest::new("13_15", "app.example", "r4nd1"))
            .unwrap();
        assert_eq!(response.expires_at, 4600);
        assert_eq!(response.token.matches('.').count(), 1);
    }

    #[test]
    fn expiry_matches_signed_claims() {
        let ctx = context();
        let response = ctx
            .handle_issue(&IssueRequest::new("16_17", "app.example", "r4nd1"))
            .unwrap();
        let (payload, _) = agetoken::split_compact(&response.token).unwrap();
        let claims = CanonicalCodec::default().decode(&payload).unwrap();
        assert_eq!(response.expires_at, claims.expires_at);
        assert_eq!(claims.expires_at - claims.issued_at, ctx.issuer().config().ttl_secs);
    }

    #[test]
    fn personal_data_nonce_is_invalid_request() {
        let err = context()
            .handle_issue(&IssueRequest::new("16_17", "app.example", "kid@example.com"))
            .unwrap_err();
        assert_eq!(err.code, "invalid_request");
        assert!(!err.message.contains("example.com"));
    }

    #[test]
    fn unknown_age_is_invalid_request() {
        let err = context()
            .handle_issue(&IssueRequest::new("21", "app.example", "n"))
            .unwrap_err();
        assert_eq!(err.code, "invalid_request");
    }

    #[test]
    fn json_round_trip() {
        let body = r#"{"age":"18_PLUS","aud":"app.example","nonce":"abc"}"#;
        let out = context().handle_issue_json(body).unwrap();
        let response: IssueResponse = serde_json::from_str(&out).unwrap();
        assert_eq!(response.expires_at, 4600);
    }

    #[test]
    fn json_rejects_extra_fields() {
        let body = r#"{"age":"18_PLUS","aud":"app.example","nonce":"abc","dob":"2000-01-01"}"#;
        let err = context().handle_issue_json(body).unwrap_err();
        assert_eq!(err.code, "invalid_request");
    }
}
