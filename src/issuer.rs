//! Token issuer for creating age attestations.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::age_bucket::AgeBucket;
use crate::claims::{ClaimSet, Extensions, check_extensions, looks_like_personal_data};
use crate::codec::CanonicalCodec;
use crate::config::AttestationConfig;
use crate::error::{ConfigError, IssueError};
use crate::keyring::KeyRing;
use crate::token::SignedToken;

/// Creates signed AgeTokens for one attestor.
///
/// The issuer reads its signing key from a shared [`KeyRing`] on every call,
/// so a rotation takes effect for the next token without rebuilding the
/// issuer. Token lifetime is fixed by configuration and never chosen by the
/// caller.
///
/// # Example
///
/// ```
/// use agetoken::{AgeBucket, AttestationConfig, Issuer, KeyRing, SignatureScheme, SigningKey};
/// use std::sync::Arc;
///
/// let keyring = Arc::new(KeyRing::new());
/// keyring
///     .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, i64::MAX)
///     .unwrap();
///
/// let issuer = Issuer::new("attestor.example", keyring, AttestationConfig::default()).unwrap();
/// let token = issuer
///     .issue(AgeBucket::Age13To15, "app.example", "r4nd1", 1000)
///     .unwrap();
///
/// assert_eq!(token.key_id(), Some("k1"));
/// assert_eq!(token.to_compact().matches('.').count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Issuer {
    attestor_id: String,
    keyring: Arc<KeyRing>,
    config: AttestationConfig,
    codec: CanonicalCodec,
}

impl Issuer {
    /// Creates a new issuer.
    ///
    /// # Arguments
    ///
    /// * `attestor_id` - Identifier relying parties know this attestor by
    /// * `keyring` - Signing keys, shared with whoever rotates them
    /// * `config` - Policy limits, including the token lifetime
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the configuration fails
    /// validation or `attestor_id` is empty, too long, or not visible ASCII.
    pub fn new(
        attestor_id: impl Into<String>,
        keyring: Arc<KeyRing>,
        config: AttestationConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let attestor_id = attestor_id.into();
        if !is_visible_ascii(&attestor_id, config.max_attestor_id_len) {
            return Err(ConfigError::InvalidValue {
                field: "attestor_id",
                reason: "must be 1 to max_attestor_id_len visible ASCII characters",
            });
        }
        Ok(Self {
            attestor_id,
            keyring,
            codec: CanonicalCodec::from_config(&config),
            config,
        })
    }

    /// Returns the attestor this issuer represents.
    #[must_use]
    pub fn attestor_id(&self) -> &str {
        &self.attestor_id
    }

    /// Returns the shared key ring.
    #[must_use]
    pub const fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    /// Returns the issuer's configuration.
    #[must_use]
    pub const fn config(&self) -> &AttestationConfig {
        &self.config
    }

    /// Issues a token asserting `age_bucket` for `audience`.
    ///
    /// # Errors
    ///
    /// - `IssueError::InvalidInput` if `audience` or `nonce` is empty, too
    ///   long, contains characters outside visible ASCII, or looks like
    ///   personal data (an e-mail address, a date, a long digit run)
    /// - `IssueError::NoActiveKey` if no signing key is valid at `now`
    pub fn issue(
        &self,
        age_bucket: AgeBucket,
        audience: &str,
        nonce: &str,
        now: i64,
    ) -> Result<SignedToken, IssueError> {
        self.issue_with_extensions(age_bucket, audience, nonce, Extensions::new(), now)
    }

    /// Issues a token from the wire form of the age bucket, e.g. `"13_15"`.
    ///
    /// # Errors
    ///
    /// Returns `IssueError::InvalidInput` for an unknown bucket, otherwise as
    /// [`issue`](Self::issue).
    pub fn issue_str(
        &self,
        age: &str,
        audience: &str,
        nonce: &str,
        now: i64,
    ) -> Result<SignedToken, IssueError> {
        let age_bucket = age
            .parse::<AgeBucket>()
            .map_err(|_| IssueError::invalid_input("age", "must be one of UNDER_13, 13_15, 16_17, 18_PLUS"))?;
        self.issue(age_bucket, audience, nonce, now)
    }

    /// Issues a token carrying forward-compatible flags.
    ///
    /// # Errors
    ///
    /// Returns `IssueError::InvalidInput` if a flag looks like personal data,
    /// uses the reserved key `kid`, or breaks the size caps (one entry is
    /// kept for `kid`), or if the encoded payload exceeds
    /// `max_payload_bytes`; otherwise as [`issue`](Self::issue).
    pub fn issue_with_extensions(
        &self,
        age_bucket: AgeBucket,
        audience: &str,
        nonce: &str,
        extensions: Extensions,
        now: i64,
    ) -> Result<SignedToken, IssueError> {
        check_field("aud", audience, self.config.max_audience_len)?;
        check_field("nonce", nonce, self.config.max_nonce_len)?;
        check_extensions(
            &extensions,
            self.config.max_extension_entries.saturating_sub(1),
            self.config.max_extension_value_len,
        )?;

        let key = self.keyring.active_key(now)?;
        let expires_at = now
            .checked_add(self.config.ttl_secs)
            .ok_or_else(|| IssueError::invalid_input("now", "issuance time overflows expiry"))?;

        let claims = ClaimSet {
            token_id: Uuid::new_v4().to_string(),
            attestor_id: self.attestor_id.clone(),
            age_bucket,
            audience: audience.to_string(),
            issued_at: now,
            expires_at,
            nonce: nonce.to_string(),
            extensions,
        }
        .with_key_id(key.key_id());

        let payload = self.codec.encode(&claims);
        if payload.len() > self.config.max_payload_bytes {
            return Err(IssueError::invalid_input(
                "payload",
                format!(
                    "encoded payload of {} bytes exceeds {}",
                    payload.len(),
                    self.config.max_payload_bytes
                ),
            ));
        }

        let signature = key.signing_key().sign(&payload);
        debug!(
            attestor = %self.attestor_id,
            key_id = %key.key_id(),
            scheme = %key.signing_key().scheme(),
            expires_at,
            "token issued"
        );
        Ok(SignedToken::new(payload, signature, key.key_id()))
    }
}

fn check_field(field: &'static str, value: &str, max_len: usize) -> Result<(), IssueError> {
    if value.is_empty() {
        return Err(IssueError::invalid_input(field, "must not be empty"));
    }
    if value.len() > max_len {
        return Err(IssueError::invalid_input(
            field,
            format!("exceeds {max_len} characters"),
        ));
    }
    if !value.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(IssueError::invalid_input(
            field,
            "must contain only visible ASCII characters",
        ));
    }
    if looks_like_personal_data(value) {
        return Err(IssueError::invalid_input(field, "looks like personal data"));
    }
    Ok(())
}

fn is_visible_ascii(value: &str, max_len: usize) -> bool {
    !value.is_empty() && value.len() <= max_len && value.bytes().all(|b| b.is_ascii_graphic())
}
