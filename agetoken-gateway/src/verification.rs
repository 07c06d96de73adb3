//! Verification endpoint.

use agetoken::ClaimSet;
use serde::{Deserialize, Serialize};

use crate::context::AttestationContext;

/// Body of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRequest {
    /// Compact token
    pub token: String,
    /// Audience the caller expects the token to be bound to
    pub aud: String,
}

impl VerifyRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(token: impl Into<String>, aud: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            aud: aud.into(),
        }
    }
}

/// Body of a verification response.
///
/// On success `payload` and `is_minor` are set; on failure only `error`,
/// holding the coarse public reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the token was accepted
    pub valid: bool,
    /// Decoded claims of an accepted token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ClaimSet>,
    /// Whether the asserted bucket is below 18
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_minor: Option<bool>,
    /// Public rejection reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    fn accepted(claims: ClaimSet) -> Self {
        Self {
            valid: true,
            is_minor: Some(claims.is_minor()),
            payload: Some(claims),
            error: None,
        }
    }

    fn rejected(reason: &str) -> Self {
        Self {
            valid: false,
            payload: None,
            is_minor: None,
            error: Some(reason.to_string()),
        }
    }
}

impl AttestationContext {
    /// Verifies and consumes a compact token at the context's current time.
    ///
    /// Never fails: rejections are reported in the response.
    #[must_use]
    pub fn handle_verify(&self, request: &VerifyRequest) -> VerifyResponse {
        match self
            .verifier()
            .verify_compact(&request.token, &request.aud, self.now())
        {
            Ok(claims) => VerifyResponse::accepted(claims),
            Err(e) => VerifyResponse::rejected(e.public_reason()),
        }
    }

    /// JSON form of [`handle_verify`](Self::handle_verify).
    ///
    /// An unparsable body yields a `malformed` rejection.
    #[must_use]
    pub fn handle_verify_json(&self, body: &str) -> String {
        let response = serde_json::from_str::<VerifyRequest>(body).map_or_else(
            |_| VerifyResponse::rejected("malformed"),
            |request| self.handle_verify(&request),
        );
        serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"valid":false,"error":"internal_error"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agetoken::{
        AttestationConfig, FixedClock, KeyRing, SignatureScheme, SigningKey, TrustStore,
    };

    use super::*;
    use crate::issuance::IssueRequest;

    fn context(clock: Arc<FixedClock>) -> AttestationContext {
        let keyring = Arc::new(KeyRing::new());
        keyring
            .add_key("k1", SigningKey::generate(SignatureScheme::EcdsaP256), 0, 100_000)
            .unwrap();
        let trust =
            Arc::new(TrustStore::from_entries(keyring.published_entries("attestor.example")).unwrap());
        AttestationContext::new(
            AttestationConfig::default(),
            "attestor.example",
            keyring,
            trust,
            clock,
        )
        .unwrap()
    }

    #[test]
    fn scenario_accept_mismatch_replay() {
        let clock = Arc::new(FixedClock::new(1000));
        let ctx = context(Arc::clone(&clock));
        let token = ctx
            .handle_issue(&IssueRequest::new("13_15", "app.example", "r4nd1"))
            .unwrap()
            .token;

        clock.set(2000);
        let wrong = ctx.handle_verify(&VerifyRequest::new(token.clone(), "other.example"));
        assert!(!wrong.valid);
        assert_eq!(wrong.error.as_deref(), Some("audience_mismatch"));

        let ok = ctx.handle_verify(&VerifyRequest::new(token.clone(), "app.example"));
        assert!(ok.valid);
        assert_eq!(ok.is_minor, Some(true));
        let payload = ok.payload.unwrap();
        assert_eq!((payload.issued_at, payload.expires_at), (1000, 4600));

        let again = ctx.handle_verify(&VerifyRequest::new(token, "app.example"));
        assert_eq!(again.error.as_deref(), Some("replayed"));
    }

    #[test]
    fn rejection_json_has_no_payload() {
        let ctx = context(Arc::new(FixedClock::new(1000)));
        let out = ctx.handle_verify_json(r#"{"token":"a.b.c","aud":"app.example"}"#);
        assert_eq!(out, r#"{"valid":false,"error":"malformed"}"#);
        let out = ctx.handle_verify_json("nonsense");
        assert_eq!(out, r#"{"valid":false,"error":"malformed"}"#);
    }

    #[test]
    fn shutdown_clears_replay_state() {
        let ctx = context(Arc::new(FixedClock::new(1000)));
        let token = ctx
            .handle_issue(&IssueRequest::new("18_PLUS", "app.example", "n"))
            .unwrap()
            .token;
        assert!(ctx.handle_verify(&VerifyRequest::new(token, "app.example")).valid);
        assert_eq!(ctx.health().replay_entries, 1);
        ctx.shutdown();
        assert_eq!(ctx.health().replay_entries, 0);
    }
}
