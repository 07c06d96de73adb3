//! Token verifier for validating age attestations.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::claims::ClaimSet;
use crate::codec::CanonicalCodec;
use crate::config::AttestationConfig;
use crate::constants::MAX_COMPACT_TOKEN_LENGTH;
use crate::error::{ConfigError, DecodeError, ReplayError, VerifyError};
use crate::replay::{DedupKey, ReplayGuard};
use crate::token::{SignedToken, split_compact};
use crate::trust_store::TrustStore;
use crate::verification::check_policy;

/// Stages of verification, in the order they run.
///
/// Verification stops at the first failing stage; the stage is reported in
/// logs alongside the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyStage {
    /// Splitting, base64 and canonical decoding
    Decoding,
    /// Resolving the signer's public key
    TrustLookup,
    /// Checking the signature over the received payload bytes
    SignatureCheck,
    /// Expiry, lifetime, audience and size rules
    PolicyCheck,
    /// Recording the token as consumed
    ReplayCheck,
    /// Every stage passed
    Accepted,
}

impl VerifyStage {
    /// Returns the stage name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decoding => "decoding",
            Self::TrustLookup => "trust_lookup",
            Self::SignatureCheck => "signature_check",
            Self::PolicyCheck => "policy_check",
            Self::ReplayCheck => "replay_check",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw parts of a token under inspection.
struct Presented<'a> {
    payload: &'a [u8],
    signature: &'a [u8],
    /// Key id carried outside the payload, if any; must match `flags.kid`.
    key_id: Option<&'a str>,
}

/// Verifies AgeTokens for one relying party.
///
/// The verifier reads keys from a shared [`TrustStore`] and owns its
/// [`ReplayGuard`], so replay protection is scoped to this verifier.
///
/// # Example
///
/// ```
/// use agetoken::{
///     AgeBucket, AttestationConfig, Issuer, KeyRing, SignatureScheme, SigningKey, TrustStore,
///     Verifier, VerifyError,
/// };
/// use std::sync::Arc;
///
/// let keyring = Arc::new(KeyRing::new());
/// keyring
///     .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 100_000)
///     .unwrap();
/// let issuer = Issuer::new("attestor.example", Arc::clone(&keyring), AttestationConfig::default())
///     .unwrap();
///
/// let trust = Arc::new(TrustStore::from_entries(keyring.published_entries("attestor.example")).unwrap());
/// let verifier = Verifier::new(trust, AttestationConfig::default()).unwrap();
///
/// let token = issuer.issue(AgeBucket::Age13To15, "app.example", "r4nd1", 1000).unwrap();
/// let compact = token.to_compact();
///
/// let claims = verifier.verify_compact(&compact, "app.example", 2000).unwrap();
/// assert!(claims.is_minor());
///
/// // A second presentation is a replay
/// assert_eq!(
///     verifier.verify_compact(&compact, "app.example", 2001),
///     Err(VerifyError::Replayed)
/// );
/// ```
#[derive(Debug)]
pub struct Verifier {
    trust_store: Arc<TrustStore>,
    replay_guard: ReplayGuard,
    config: AttestationConfig,
    codec: CanonicalCodec,
}

impl Verifier {
    /// Creates a verifier with a replay guard sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the configuration fails
    /// validation.
    pub fn new(trust_store: Arc<TrustStore>, config: AttestationConfig) -> Result<Self, ConfigError> {
        let replay_guard = ReplayGuard::from_config(&config);
        Self::with_replay_guard(trust_store, replay_guard, config)
    }

    /// Creates a verifier with a caller-supplied replay guard.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the configuration fails
    /// validation.
    pub fn with_replay_guard(
        trust_store: Arc<TrustStore>,
        replay_guard: ReplayGuard,
        config: AttestationConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            trust_store,
            replay_guard,
            codec: CanonicalCodec::from_config(&config),
            config,
        })
    }

    /// Returns the shared trust store.
    #[must_use]
    pub const fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust_store
    }

    /// Returns this verifier's replay guard.
    #[must_use]
    pub const fn replay_guard(&self) -> &ReplayGuard {
        &self.replay_guard
    }

    /// Returns the verifier's configuration.
    #[must_use]
    pub const fn config(&self) -> &AttestationConfig {
        &self.config
    }

    /// Verifies a token and consumes it.
    ///
    /// Runs decoding, trust lookup, signature check, policy checks and the
    /// replay check in that order, stopping at the first failure. Only a
    /// token that passes every stage is recorded as consumed.
    ///
    /// # Errors
    ///
    /// - `Malformed` - the payload cannot be decoded, or its `kid` differs
    ///   from the token's key id
    /// - `Trust` - the attestor or key is unknown, revoked or out of window
    /// - `BadSignature` - the signature does not match the payload
    /// - `Expired`, `AudienceMismatch`, `PolicyViolation` - a policy rule failed
    /// - `Replayed` - this verifier has already accepted the token
    /// - `Internal` - the replay guard is full or unavailable
    pub fn verify(
        &self,
        token: &SignedToken,
        expected_audience: &str,
        now: i64,
    ) -> Result<ClaimSet, VerifyError> {
        let presented = Presented {
            payload: token.payload(),
            signature: token.signature(),
            key_id: token.key_id(),
        };
        self.run(&presented, expected_audience, now, true)
    }

    /// Verifies a compact token string and consumes it.
    ///
    /// # Errors
    ///
    /// As [`verify`](Self::verify); a compact form that cannot be split is
    /// `Malformed`.
    pub fn verify_compact(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<ClaimSet, VerifyError> {
        self.run_compact(token, expected_audience, now, true)
    }

    /// Runs every stage except the replay check.
    ///
    /// Useful for inspecting a token without spending it. A token that passes
    /// `check` may still be rejected by `verify` as a replay.
    ///
    /// # Errors
    ///
    /// As [`verify`](Self::verify), except `Replayed` and `Internal` are
    /// never returned.
    pub fn check(
        &self,
        token: &SignedToken,
        expected_audience: &str,
        now: i64,
    ) -> Result<ClaimSet, VerifyError> {
        let presented = Presented {
            payload: token.payload(),
            signature: token.signature(),
            key_id: token.key_id(),
        };
        self.run(&presented, expected_audience, now, false)
    }

    /// Compact-string form of [`check`](Self::check).
    ///
    /// # Errors
    ///
    /// As [`check`](Self::check).
    pub fn check_compact(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<ClaimSet, VerifyError> {
        self.run_compact(token, expected_audience, now, false)
    }

    fn run_compact(
        &self,
        token: &str,
        expected_audience: &str,
        now: i64,
        consume: bool,
    ) -> Result<ClaimSet, VerifyError> {
        let (payload, signature) = match split_compact(token) {
            Ok(parts) => parts,
            Err(e) => {
                let err = VerifyError::Malformed(e);
                log_rejection(VerifyStage::Decoding, &err);
                return Err(err);
            }
        };
        let presented = Presented {
            payload: &payload,
            signature: &signature,
            key_id: None,
        };
        self.run(&presented, expected_audience, now, consume)
    }

    fn run(
        &self,
        presented: &Presented<'_>,
        expected_audience: &str,
        now: i64,
        consume: bool,
    ) -> Result<ClaimSet, VerifyError> {
        let mut stage = VerifyStage::Decoding;
        let result = self.advance(presented, expected_audience, now, consume, &mut stage);
        match &result {
            Ok(claims) => debug!(
                attestor = %claims.attestor_id,
                key_id = claims.key_id().unwrap_or("-"),
                consumed = consume,
                "token accepted"
            ),
            Err(err) => log_rejection(stage, err),
        }
        result
    }

    /// Walks the stages, leaving `stage` at the one that failed.
    fn advance(
        &self,
        presented: &Presented<'_>,
        expected_audience: &str,
        now: i64,
        consume: bool,
        stage: &mut VerifyStage,
    ) -> Result<ClaimSet, VerifyError> {
        *stage = VerifyStage::Decoding;
        let claims = self.decode(presented)?;

        *stage = VerifyStage::TrustLookup;
        let public_keys = match claims.key_id().or(presented.key_id) {
            Some(key_id) => vec![self.trust_store.resolve(&claims.attestor_id, key_id, now)?],
            None => self.trust_store.usable_keys(&claims.attestor_id, now)?,
        };

        *stage = VerifyStage::SignatureCheck;
        let signed = public_keys
            .iter()
            .any(|key| key.verify(presented.payload, presented.signature));
        if !signed {
            return Err(VerifyError::BadSignature);
        }

        *stage = VerifyStage::PolicyCheck;
        check_policy(
            &claims,
            presented.payload.len(),
            expected_audience,
            now,
            &self.config,
        )?;

        if consume {
            *stage = VerifyStage::ReplayCheck;
            let key = DedupKey::from_claims(&claims);
            let fresh = self
                .replay_guard
                .insert_if_absent(key, claims.expires_at, now)
                .map_err(replay_failure)?;
            if !fresh {
                return Err(VerifyError::Replayed);
            }
        }

        *stage = VerifyStage::Accepted;
        Ok(claims)
    }

    fn decode(&self, presented: &Presented<'_>) -> Result<ClaimSet, VerifyError> {
        if presented.payload.len() > MAX_COMPACT_TOKEN_LENGTH {
            return Err(DecodeError::malformed(format!(
                "payload exceeds {MAX_COMPACT_TOKEN_LENGTH} bytes"
            ))
            .into());
        }
        let claims = self.codec.decode(presented.payload)?;
        if let (Some(outer), Some(inner)) = (presented.key_id, claims.key_id()) {
            if outer != inner {
                return Err(DecodeError::malformed("token key id does not match payload").into());
            }
        }
        Ok(claims)
    }
}

fn replay_failure(err: ReplayError) -> VerifyError {
    VerifyError::Internal {
        reason: err.to_string(),
    }
}

fn log_rejection(stage: VerifyStage, err: &VerifyError) {
    warn!(
        stage = %stage,
        kind = err.kind(),
        internal = err.is_internal(),
        "token rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::age_bucket::AgeBucket;
    use crate::error::TrustError;
    use crate::issuer::Issuer;
    use crate::keyring::KeyRing;
    use crate::keys::{SignatureScheme, SigningKey};

    const ATTESTOR: &str = "attestor.example";

    struct Fixture {
        issuer: Issuer,
        trust: Arc<TrustStore>,
        verifier: Verifier,
    }

    fn fixture() -> Fixture {
        fixture_with(AttestationConfig::default())
    }

    fn fixture_with(config: AttestationConfig) -> Fixture {
        let keyring = Arc::new(KeyRing::new());
        keyring
            .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 100_000)
            .unwrap();
        let issuer = Issuer::new(ATTESTOR, Arc::clone(&keyring), config.clone()).unwrap();
        let trust = Arc::new(TrustStore::from_entries(keyring.published_entries(ATTESTOR)).unwrap());
        let verifier = Verifier::new(Arc::clone(&trust), config).unwrap();
        Fixture {
            issuer,
            trust,
            verifier,
        }
    }

    fn issue(f: &Fixture, now: i64) -> SignedToken {
        f.issuer
            .issue(AgeBucket::Age13To15, "app.example", "r4nd1", now)
            .unwrap()
    }

    #[test]
    fn accepts_fresh_token() {
        let f = fixture();
        let claims = f.verifier.verify(&issue(&f, 1000), "app.example", 2000).unwrap();
        assert_eq!(claims.age_bucket, AgeBucket::Age13To15);
        assert_eq!(claims.expires_at, 4600);
        assert_eq!(f.verifier.replay_guard().len(), 1);
    }

    #[test]
    fn expiry_boundary() {
        let f = fixture();
        let token = issue(&f, 1000);
        assert!(f.verifier.check(&token, "app.example", 4599).is_ok());
        assert_eq!(
            f.verifier.verify(&token, "app.example", 4600),
            Err(VerifyError::Expired)
        );
    }

    #[test]
    fn audience_mismatch_does_not_consume() {
        let f = fixture();
        let token = issue(&f, 1000);
        assert_eq!(
            f.verifier.verify(&token, "other.example", 2000),
            Err(VerifyError::AudienceMismatch)
        );
        assert!(f.verifier.replay_guard().is_empty());
        assert!(f.verifier.verify(&token, "app.example", 2000).is_ok());
    }

    #[test]
    fn replay_is_rejected() {
        let f = fixture();
        let token = issue(&f, 1000);
        f.verifier.verify(&token, "app.example", 2000).unwrap();
        assert_eq!(
            f.verifier.verify(&token, "app.example", 2001),
            Err(VerifyError::Replayed)
        );
    }

    #[test]
    fn check_does_not_consume() {
        let f = fixture();
        let token = issue(&f, 1000);
        f.verifier.check(&token, "app.example", 2000).unwrap();
        f.verifier.check(&token, "app.example", 2000).unwrap();
        assert!(f.verifier.verify(&token, "app.example", 2000).is_ok());
    }

    #[test]
    fn revoked_key_rejects_earlier_tokens() {
        let f = fixture();
        let token = issue(&f, 1000);
        f.trust.revoke(ATTESTOR, "k1").unwrap();
        assert_eq!(
            f.verifier.verify(&token, "app.example", 2000),
            Err(VerifyError::Trust(TrustError::Revoked))
        );
    }

    #[test]
    fn signature_flip_is_bad_signature() {
        let f = fixture();
        let token = issue(&f, 1000);
        let mut signature = token.signature().to_vec();
        signature[10] ^= 0x01;
        let tampered = SignedToken::new(token.payload().to_vec(), signature, token.key_id().unwrap());
        assert_eq!(
            f.verifier.verify(&tampered, "app.example", 2000),
            Err(VerifyError::BadSignature)
        );
    }

    #[test]
    fn decodable_payload_change_is_bad_signature() {
        let f = fixture();
        let token = issue(&f, 1000);
        let text = String::from_utf8(token.payload().to_vec()).unwrap();
        let forged = text.replace("\"13_15\"", "\"18_PLUS\"");
        let tampered =
            SignedToken::new(forged.into_bytes(), token.signature().to_vec(), token.key_id().unwrap());
        assert_eq!(
            f.verifier.verify(&tampered, "app.example", 2000),
            Err(VerifyError::BadSignature)
        );
    }

    #[test]
    fn key_id_mismatch_is_malformed() {
        let f = fixture();
        let token = issue(&f, 1000);
        let relabeled = SignedToken::new(token.payload().to_vec(), token.signature().to_vec(), "k2");
        assert!(matches!(
            f.verifier.verify(&relabeled, "app.example", 2000),
            Err(VerifyError::Malformed(_))
        ));
    }

    fn unnamed_key_payload(now: i64) -> Vec<u8> {
        let claims = ClaimSet {
            token_id: "00000000-0000-4000-8000-000000000001".into(),
            attestor_id: ATTESTOR.into(),
            age_bucket: AgeBucket::Adult,
            audience: "app.example".into(),
            issued_at: now,
            expires_at: now + 3600,
            nonce: "n".into(),
            extensions: crate::claims::Extensions::new(),
        };
        CanonicalCodec::default().encode(&claims)
    }

    #[test]
    fn payload_without_key_id_is_checked_against_attestor_keys() {
        let f = fixture();
        f.issuer
            .keyring()
            .add_key("k2", SigningKey::generate(SignatureScheme::EcdsaP256), 0, 100_000)
            .unwrap();
        f.trust
            .refresh(f.issuer.keyring().published_entries(ATTESTOR))
            .unwrap();

        let payload = unnamed_key_payload(1000);
        let signer = f.issuer.keyring().active_key(1000).unwrap();
        assert_eq!(signer.key_id(), "k2");
        let signature = signer.signing_key().sign(&payload);
        let token = SignedToken::unkeyed(payload, signature);
        assert_eq!(token.key_id(), None);

        let compact = token.to_compact();
        assert!(f.verifier.verify_compact(&compact, "app.example", 2000).is_ok());
        assert_eq!(
            f.verifier.verify(&token, "app.example", 2001),
            Err(VerifyError::Replayed)
        );
    }

    #[test]
    fn payload_without_key_id_from_untrusted_signer_is_bad_signature() {
        let f = fixture();
        let payload = unnamed_key_payload(1000);
        let signature = SigningKey::generate(SignatureScheme::Ed25519).sign(&payload);
        assert_eq!(
            f.verifier
                .verify(&SignedToken::unkeyed(payload, signature), "app.example", 2000),
            Err(VerifyError::BadSignature)
        );
    }

    #[test]
    fn payload_without_key_id_and_only_revoked_keys_is_revoked() {
        let f = fixture();
        let payload = unnamed_key_payload(1000);
        let signature = f.issuer.keyring().active_key(1000).unwrap().signing_key().sign(&payload);
        f.trust.revoke(ATTESTOR, "k1").unwrap();
        assert_eq!(
            f.verifier
                .check(&SignedToken::unkeyed(payload, signature), "app.example", 2000),
            Err(VerifyError::Trust(TrustError::Revoked))
        );
    }

    #[test]
    fn compact_garbage_is_malformed() {
        let f = fixture();
        for input in ["", "abc", "a.b.c", "!!!.???"] {
            assert!(matches!(
                f.verifier.verify_compact(input, "app.example", 2000),
                Err(VerifyError::Malformed(_))
            ));
        }
    }

    #[test]
    fn oversized_payload_is_policy_violation() {
        let config = AttestationConfig::default();
        let f = fixture_with(config.clone());
        let token = issue(&f, 1000);
        // Verifier with a tighter cap than the issuer
        let strict = Verifier::new(
            Arc::clone(&f.trust),
            config.with_max_payload_bytes(token.payload().len() - 1),
        )
        .unwrap();
        assert!(matches!(
            strict.verify(&token, "app.example", 2000),
            Err(VerifyError::PolicyViolation { .. })
        ));
    }

    #[test]
    fn future_token_is_policy_violation() {
        let f = fixture();
        let token = issue(&f, 5000);
        assert!(matches!(
            f.verifier.verify(&token, "app.example", 4000),
            Err(VerifyError::PolicyViolation { .. })
        ));
    }

    #[test]
    fn full_replay_guard_fails_closed() {
        let f = fixture_with(AttestationConfig::new().with_replay_capacity(1));
        f.verifier.verify(&issue(&f, 1000), "app.example", 2000).unwrap();
        let err = f
            .verifier
            .verify(&issue(&f, 1000), "app.example", 2000)
            .unwrap_err();
        assert!(err.is_internal());
        assert_eq!(err.public_reason(), "internal_error");
    }

    #[test]
    fn stage_names() {
        assert_eq!(VerifyStage::TrustLookup.to_string(), "trust_lookup");
        assert_eq!(VerifyStage::Accepted.as_str(), "accepted");
    }
}
