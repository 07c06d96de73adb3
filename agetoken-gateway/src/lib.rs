//! Request/response surface for issuing and verifying AgeTokens.
//!
//! This crate wraps the `agetoken` core in the handful of entry points a
//! collaborator calls: issue a token, verify a token, install a trust bundle,
//! and report health. Transport is left to the embedding service; requests
//! and responses are plain serde types with JSON helpers.
//!
//! # Example
//!
//! ```rust
//! use agetoken::{AttestationConfig, FixedClock, KeyRing, SignatureScheme, SigningKey, TrustBundle, TrustStore};
//! use agetoken_gateway::AttestationContext;
//! use std::sync::Arc;
//!
//! let keyring = Arc::new(KeyRing::new());
//! keyring
//!     .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 100_000)
//!     .unwrap();
//!
//! let ctx = AttestationContext::new(
//!     AttestationConfig::default(),
//!     "attestor.example",
//!     Arc::clone(&keyring),
//!     Arc::new(TrustStore::new()),
//!     Arc::new(FixedClock::new(1000)),
//! )
//! .unwrap();
//!
//! // Trust bundles arrive out-of-band as JSON
//! let bundle = TrustBundle::from_entries(1, &keyring.published_entries("attestor.example"));
//! ctx.load_trust_bundle(&bundle.to_json().unwrap()).unwrap();
//!
//! let issued = ctx
//!     .handle_issue_json(r#"{"age":"13_15","aud":"app.example","nonce":"r4nd1"}"#)
//!     .unwrap();
//! assert!(issued.contains("\"expires_at\":4600"));
//!
//! assert_eq!(ctx.health().status, "ok");
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod context;
mod error;
mod issuance;
mod verification;

pub use context::{AttestationContext, HealthReport};
pub use error::{ClientError, GatewayError};
pub use issuance::{IssueRequest, IssueResponse};
pub use verification::{VerifyRequest, VerifyResponse};
