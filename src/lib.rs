//! Signed, audience-bound, replay-resistant age attestations.
//!
//! An attestor that has checked a user's age issues an AgeToken: a short
//! signed statement that the user falls into one age range, bound to one
//! relying platform. The platform verifies the token offline against a
//! distributed set of trusted attestor keys and spends it once.
//!
//! # Overview
//!
//! AgeTokens provide:
//! - Age-range assertions without birthdates or other personal data
//! - Offline verification against a refreshable, revocation-aware trust store
//! - Audience binding, so a token issued for one platform fails at another
//! - Per-verifier replay protection until the token expires
//!
//! # Example
//!
//! ```rust
//! use agetoken::{
//!     AgeBucket, AttestationConfig, Issuer, KeyRing, SignatureScheme, SigningKey, TrustStore,
//!     Verifier, VerifyError,
//! };
//! use std::sync::Arc;
//!
//! // Attestor side: register a key and issue
//! let keyring = Arc::new(KeyRing::new());
//! keyring
//!     .add_key("2026-10", SigningKey::generate(SignatureScheme::Ed25519), 0, i64::MAX)
//!     .unwrap();
//! let issuer = Issuer::new("attestor.example", Arc::clone(&keyring), AttestationConfig::default())
//!     .unwrap();
//! let token = issuer
//!     .issue_str("13_15", "app.example", "r4nd1", 1000)
//!     .unwrap()
//!     .to_compact();
//!
//! // Platform side: install the attestor's public keys and verify
//! let trust = Arc::new(TrustStore::from_entries(keyring.published_entries("attestor.example")).unwrap());
//! let verifier = Verifier::new(trust, AttestationConfig::default()).unwrap();
//!
//! let claims = verifier.verify_compact(&token, "app.example", 2000).unwrap();
//! assert_eq!(claims.age_bucket, AgeBucket::Age13To15);
//! assert_eq!((claims.issued_at, claims.expires_at), (1000, 4600));
//!
//! assert_eq!(
//!     verifier.verify_compact(&token, "app.example", 2001),
//!     Err(VerifyError::Replayed)
//! );
//! ```
//!
//! # Token Structure
//!
//! A compact token is `base64url(payload) "." base64url(signature)`, both
//! without padding. The payload is canonical JSON with these fields:
//!
//! - `tid`: random token identifier (UUID v4)
//! - `att`: issuing attestor
//! - `age`: one of `UNDER_13`, `13_15`, `16_17`, `18_PLUS`
//! - `aud`: relying platform the token is bound to
//! - `iat`, `exp`: issue and expiry time, Unix seconds
//! - `nonce`: caller-supplied nonce
//! - `flags`: small map of scalar extension flags, screened for personal data;
//!   the issuer adds the reserved entry `flags.kid` naming its signing key
//!
//! # Security Properties
//!
//! | Property | How Achieved |
//! |----------|--------------|
//! | Tamper detection | Signature over the exact received payload bytes |
//! | No signature malleability | Canonical encoding sorts keys at every depth |
//! | Key rotation | Lookup by `(att, flags.kid)`; without `kid`, every usable key of `att` |
//! | Revocation | Revoked entries rejected before any signature math |
//! | Audience binding | `aud` compared exactly to the verifier's audience |
//! | Replay protection | Per-verifier record of consumed tokens until `exp` |
//!
//! ## Length Constraints
//!
//! | Component | Default Max |
//! |-----------|-------------|
//! | Compact token | 8192 chars |
//! | Payload | 1024 bytes |
//! | audience | 128 chars |
//! | nonce | 128 chars |
//! | key id | 64 chars |
//! | flags | 8 entries |
//! | Each flag key | 32 chars |
//! | Each flag string value | 64 chars |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod age_bucket;
mod claims;
mod clock;
mod codec;
mod config;
mod constants;
mod error;
mod issuer;
mod keyring;
mod keys;
pub mod prelude;
mod replay;
mod token;
mod trust_bundle;
mod trust_store;
mod verification;
mod verifier;

pub use age_bucket::AgeBucket;
pub use claims::{ClaimSet, ExtensionValue, Extensions, check_extensions, looks_like_personal_data};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{CanonicalCodec, canonical_json};
pub use config::AttestationConfig;
pub use constants::{
    COMPACT_SEPARATOR, FIELD_AGE, FIELD_ATTESTOR, FIELD_AUDIENCE, FIELD_EXPIRES_AT, FIELD_FLAGS,
    FIELD_ISSUED_AT, FIELD_NONCE, FIELD_TOKEN_ID, FLAG_KEY_ID, MAX_COMPACT_TOKEN_LENGTH,
    MAX_EXTENSION_KEY_LENGTH, MAX_KEY_ID_LENGTH, PAYLOAD_FIELDS, PII_DIGIT_RUN, PII_KEY_DENYLIST,
};
pub use error::{
    ConfigError, DecodeError, IssueError, KeyError, KeyRingError, ReplayError, TrustError,
    VerifyError,
};
pub use issuer::Issuer;
pub use keyring::{KeyRing, KeyRingEntry};
pub use keys::{PublicKey, SignatureScheme, SigningKey};
pub use replay::{DedupKey, ReplayGuard};
pub use token::{SignedToken, split_compact};
pub use trust_bundle::{BundleEntry, TrustBundle};
pub use trust_store::{TrustEntry, TrustSnapshot, TrustStore};
pub use verification::{
    check_audience, check_expiration, check_lifetime, check_not_before, check_payload_size,
    check_policy,
};
pub use verifier::{VerifyStage, Verifier};
