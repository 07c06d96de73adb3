//! Convenient re-exports for glob imports.
//!
//! ```rust
//! use agetoken::prelude::*;
//!
//! let config = AttestationConfig::default();
//! assert_eq!(AgeBucket::Adult.as_str(), "18_PLUS");
//! ```
//!
//! Pure policy helpers and wire constants are left out; import them by name.

pub use crate::{
    // Core types
    AgeBucket, AttestationConfig, CanonicalCodec, ClaimSet, ExtensionValue, Extensions,
    SignedToken,
    // Keys and trust
    KeyRing, PublicKey, SignatureScheme, SigningKey, TrustBundle, TrustEntry, TrustStore,
    // Issuing and verifying
    Issuer, ReplayGuard, Verifier,
    // Time
    Clock, FixedClock, SystemClock,
    // Errors
    ConfigError, DecodeError, IssueError, KeyError, KeyRingError, ReplayError, TrustError,
    VerifyError,
};
