//! The explicitly constructed state behind every gateway call.

use std::sync::Arc;

use agetoken::{AttestationConfig, Clock, Issuer, KeyRing, TrustBundle, TrustStore, Verifier};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GatewayError;

/// Liveness summary for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `"ok"` when the gateway can both issue and verify, else `"degraded"`
    pub status: String,
    /// Number of installed trust entries
    pub trust_entries: usize,
    /// Number of live replay records
    pub replay_entries: usize,
    /// Key the issuer would sign with now, if any
    pub active_key_id: Option<String>,
}

/// Issuer, verifier and clock for one attestor and one relying party.
///
/// Built once at process start and passed to request handlers; nothing is
/// held in globals.
///
/// # Example
///
/// ```
/// use agetoken::{AttestationConfig, FixedClock, KeyRing, SignatureScheme, SigningKey, TrustStore};
/// use agetoken_gateway::{AttestationContext, IssueRequest, VerifyRequest};
/// use std::sync::Arc;
///
/// let keyring = Arc::new(KeyRing::new());
/// keyring
///     .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 100_000)
///     .unwrap();
/// let trust = Arc::new(TrustStore::from_entries(keyring.published_entries("attestor.example")).unwrap());
///
/// let ctx = AttestationContext::new(
///     AttestationConfig::default(),
///     "attestor.example",
///     keyring,
///     trust,
///     Arc::new(FixedClock::new(1000)),
/// )
/// .unwrap();
///
/// let issued = ctx
///     .handle_issue(&IssueRequest::new("16_17", "app.example", "r4nd1"))
///     .unwrap();
/// assert_eq!(issued.expires_at, 4600);
///
/// let verified = ctx.handle_verify(&VerifyRequest::new(issued.token, "app.example"));
/// assert!(verified.valid);
/// assert_eq!(verified.is_minor, Some(true));
/// ```
#[derive(Debug)]
pub struct AttestationContext {
    issuer: Issuer,
    verifier: Verifier,
    clock: Arc<dyn Clock>,
}

impl AttestationContext {
    /// Creates a context from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if `config` fails validation or
    /// `attestor_id` is not a valid identifier.
    pub fn new(
        config: AttestationConfig,
        attestor_id: impl Into<String>,
        keyring: Arc<KeyRing>,
        trust_store: Arc<TrustStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let issuer = Issuer::new(attestor_id, keyring, config.clone())?;
        let verifier = Verifier::new(trust_store, config)?;
        info!(attestor = %issuer.attestor_id(), "attestation context ready");
        Ok(Self {
            issuer,
            verifier,
            clock,
        })
    }

    /// Returns the issuer.
    #[must_use]
    pub const fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// Returns the verifier.
    #[must_use]
    pub const fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Returns the current time from the context's clock.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Parses a trust bundle and installs it if it is newer than the current
    /// one. Returns the installed version.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Trust` if the bundle is malformed, invalid or
    /// stale; the previous bundle stays installed.
    pub fn load_trust_bundle(&self, json: &str) -> Result<u64, GatewayError> {
        let bundle = TrustBundle::from_json(json).inspect_err(|e| {
            warn!(error = %e, "trust bundle rejected");
        })?;
        self.verifier
            .trust_store()
            .refresh_from_bundle(&bundle)
            .inspect_err(|e| warn!(error = %e, "trust bundle rejected"))?;
        Ok(bundle.version)
    }

    /// Reports trust store size, replay load and the current signing key.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let now = self.now();
        let active_key_id = self
            .issuer
            .keyring()
            .active_key(now)
            .ok()
            .map(|key| key.key_id().to_string());
        let trust_entries = self.verifier.trust_store().len();
        let status = if active_key_id.is_some() && trust_entries > 0 {
            "ok"
        } else {
            "degraded"
        };
        HealthReport {
            status: status.to_string(),
            trust_entries,
            replay_entries: self.verifier.replay_guard().len(),
            active_key_id,
        }
    }

    /// Drops all replay records.
    ///
    /// Call when the process stops serving; a restarted verifier starts with
    /// an empty replay guard either way.
    pub fn shutdown(&self) {
        let dropped = self.verifier.replay_guard().len();
        self.verifier.replay_guard().clear();
        info!(replay_entries = dropped, "attestation context shut down");
    }
}
