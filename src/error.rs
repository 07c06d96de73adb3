//! Error types for issuance, decoding, trust resolution and verification.

use thiserror::Error;

/// Errors raised while issuing a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    /// A caller-supplied field is missing or malformed.
    #[error("invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the offending field
        field: &'static str,
        /// Description of the problem
        reason: String,
    },
    /// No signing key in the key ring is valid at the issuance time.
    #[error("no active signing key; add a key whose validity window covers the current time")]
    NoActiveKey,
    /// The key ring could not be read.
    #[error("key ring unavailable: {reason}")]
    Unavailable {
        /// Description of the failure
        reason: String,
    },
}

impl IssueError {
    /// Creates an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while decoding canonical payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are not a well-formed payload.
    #[error("malformed payload: {reason}")]
    Malformed {
        /// Description of the problem
        reason: String,
    },
    /// An object contains the same key twice.
    #[error("duplicate key '{key}' in payload")]
    DuplicateKey {
        /// The repeated key
        key: String,
    },
    /// The payload carries a top-level field outside the wire format.
    #[error("unknown payload field '{field}'")]
    UnknownField {
        /// The unexpected field
        field: String,
    },
    /// The extensions map exceeds the configured entry cap.
    #[error("extensions map exceeds {max} entries")]
    TooManyExtensions {
        /// Configured maximum
        max: usize,
    },
}

impl DecodeError {
    /// Creates a `Malformed` error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors raised while resolving an attestor key in the trust store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    /// The attestor has no entry in the trust store.
    #[error("unknown attestor")]
    UnknownAttestor,
    /// The attestor is known but the key identifier is not.
    #[error("unknown key for attestor")]
    UnknownKey,
    /// The key's validity window does not contain the lookup time.
    #[error("attestor key outside its validity window")]
    KeyExpired,
    /// The key has been revoked.
    #[error("attestor key revoked")]
    Revoked,
    /// A trust bundle failed validation; the previous snapshot stays live.
    #[error("invalid trust bundle: {reason}")]
    InvalidBundle {
        /// Description of the problem
        reason: String,
    },
    /// A trust bundle is not newer than the installed one.
    #[error("stale trust bundle: version {offered} is not newer than installed version {current}")]
    StaleBundle {
        /// Installed bundle version
        current: u64,
        /// Offered bundle version
        offered: u64,
    },
    /// The trust snapshot could not be read.
    #[error("trust store unavailable")]
    Unavailable,
}

impl TrustError {
    /// Returns true for infrastructure failures rather than protocol rejections.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Errors raised while verifying a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    Malformed(#[from] DecodeError),
    /// The signer's key could not be resolved.
    #[error("trust check failed: {0}")]
    Trust(#[from] TrustError),
    /// The signature does not match the payload.
    #[error("signature verification failed; token may have been tampered with")]
    BadSignature,
    /// The token's expiry has passed.
    #[error("token expired; request a new attestation")]
    Expired,
    /// The token was issued for another relying party.
    #[error("audience mismatch")]
    AudienceMismatch,
    /// A policy limit was violated.
    #[error("policy violation: {reason}")]
    PolicyViolation {
        /// Description of the violated policy
        reason: String,
    },
    /// The token was already accepted by this verifier.
    #[error("token already consumed")]
    Replayed,
    /// Verifier infrastructure failed; not a statement about the token.
    #[error("internal verifier error: {reason}")]
    Internal {
        /// Description of the failure
        reason: String,
    },
}

impl VerifyError {
    /// Creates a `PolicyViolation` error.
    #[must_use]
    pub fn policy(reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            reason: reason.into(),
        }
    }

    /// Returns true for infrastructure failures rather than protocol rejections.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        match self {
            Self::Internal { .. } => true,
            Self::Trust(e) => e.is_internal(),
            _ => false,
        }
    }

    /// Stable name of the variant, used as a log field.
    ///
    /// Trust failures are named individually; unlike
    /// [`public_reason`](Self::public_reason) this is for operators only.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Trust(TrustError::UnknownAttestor) => "unknown_attestor",
            Self::Trust(TrustError::UnknownKey) => "unknown_key",
            Self::Trust(TrustError::KeyExpired) => "key_expired",
            Self::Trust(TrustError::Revoked) => "revoked",
            Self::Trust(TrustError::InvalidBundle { .. } | TrustError::StaleBundle { .. }) => {
                "trust_bundle"
            }
            Self::Trust(TrustError::Unavailable) => "trust_unavailable",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::AudienceMismatch => "audience_mismatch",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::Replayed => "replayed",
            Self::Internal { .. } => "internal",
        }
    }

    /// Coarse reason safe to hand to external callers.
    ///
    /// Trust and signature failures share one code so a caller cannot tell
    /// a wrong key from a forged signature.
    #[must_use]
    pub const fn public_reason(&self) -> &'static str {
        match self {
            _ if self.is_internal() => "internal_error",
            Self::Malformed(_) => "malformed",
            Self::Trust(_) | Self::BadSignature => "invalid_token",
            Self::Expired => "expired",
            Self::AudienceMismatch => "audience_mismatch",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::Replayed => "replayed",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Errors raised by key parsing and signing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Key bytes are not a valid key for the scheme.
    #[error("invalid key format: {reason}")]
    InvalidKeyFormat {
        /// Description of the key error
        reason: String,
    },
    /// The scheme name is not supported.
    #[error("unsupported signature scheme '{scheme}'")]
    UnsupportedScheme {
        /// The offered scheme name
        scheme: String,
    },
}

/// Errors raised while managing a key ring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyRingError {
    /// A key with the same identifier is already present.
    #[error("key '{key_id}' already present in key ring")]
    DuplicateKey {
        /// The duplicated key identifier
        key_id: String,
    },
    /// The key identifier is empty or too long.
    #[error("invalid key id: {reason}")]
    InvalidKeyId {
        /// Description of the problem
        reason: String,
    },
    /// The validity window is empty.
    #[error("empty validity window: valid_until must be after valid_from")]
    EmptyWindow,
    /// No key with this identifier exists.
    #[error("key '{key_id}' not found in key ring")]
    NotFound {
        /// The missing key identifier
        key_id: String,
    },
    /// The key ring lock was poisoned.
    #[error("key ring unavailable")]
    Unavailable,
}

/// Errors raised by the replay guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The guard is full even after purging expired records.
    #[error("replay guard at capacity ({capacity} records)")]
    CapacityExceeded {
        /// Configured capacity
        capacity: usize,
    },
    /// A shard lock was poisoned.
    #[error("replay guard unavailable")]
    Unavailable,
}

/// Errors raised while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Name of the offending field
        field: &'static str,
        /// Description of the problem
        reason: &'static str,
    },
}
