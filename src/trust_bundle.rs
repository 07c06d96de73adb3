//! JSON feed format for distributing trusted keys.
//!
//! ```json
//! {
//!   "version": 7,
//!   "entries": [
//!     {
//!       "attestor_id": "attestor.example",
//!       "key_id": "2026-10",
//!       "scheme": "ed25519",
//!       "public_key": "<base64url, no padding>",
//!       "valid_from": 1790000000,
//!       "valid_until": 1800000000,
//!       "revoked": false
//!     }
//!   ]
//! }
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::keys::{PublicKey, SignatureScheme};
use crate::trust_store::TrustEntry;

/// A versioned set of trusted keys as distributed out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustBundle {
    /// Monotonically increasing bundle version
    pub version: u64,
    /// Key entries
    pub entries: Vec<BundleEntry>,
}

/// One key as it appears in a trust bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleEntry {
    /// Attestor the key belongs to
    pub attestor_id: String,
    /// Key identifier
    pub key_id: String,
    /// Signature scheme name
    pub scheme: SignatureScheme,
    /// Encoded public key, base64url without padding
    pub public_key: String,
    /// Start of validity, inclusive
    pub valid_from: i64,
    /// End of validity, exclusive
    pub valid_until: i64,
    /// Revocation flag
    #[serde(default)]
    pub revoked: bool,
}

impl TrustBundle {
    /// Parses a bundle from JSON.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidBundle` if the document is not a valid
    /// bundle.
    pub fn from_json(input: &str) -> Result<Self, TrustError> {
        serde_json::from_str(input).map_err(|e| TrustError::InvalidBundle {
            reason: format!("bundle is not valid JSON: {e}"),
        })
    }

    /// Renders the bundle as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which does not occur for well-formed
    /// bundles.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Builds a bundle from trust entries, e.g. an attestor's published keys.
    #[must_use]
    pub fn from_entries<'a>(version: u64, entries: impl IntoIterator<Item = &'a TrustEntry>) -> Self {
        Self {
            version,
            entries: entries.into_iter().map(BundleEntry::from).collect(),
        }
    }

    /// Decodes every public key and returns the entries.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidBundle` naming the first entry whose key
    /// cannot be decoded.
    pub fn to_entries(&self) -> Result<Vec<TrustEntry>, TrustError> {
        self.entries.iter().map(BundleEntry::to_trust_entry).collect()
    }
}

impl BundleEntry {
    /// Decodes the public key and returns the trust entry.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidBundle` if the key is not valid base64url
    /// or not a valid key for the scheme.
    pub fn to_trust_entry(&self) -> Result<TrustEntry, TrustError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.public_key)
            .map_err(|_| self.invalid("public_key is not base64url"))?;
        let public_key =
            PublicKey::from_bytes(self.scheme, &bytes).map_err(|e| self.invalid(&e.to_string()))?;
        Ok(TrustEntry {
            attestor_id: self.attestor_id.clone(),
            key_id: self.key_id.clone(),
            public_key,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            revoked: self.revoked,
        })
    }

    fn invalid(&self, problem: &str) -> TrustError {
        TrustError::InvalidBundle {
            reason: format!(
                "key '{}' for attestor '{}': {problem}",
                self.key_id, self.attestor_id
            ),
        }
    }
}

impl From<&TrustEntry> for BundleEntry {
    fn from(entry: &TrustEntry) -> Self {
        Self {
            attestor_id: entry.attestor_id.clone(),
            key_id: entry.key_id.clone(),
            scheme: entry.scheme(),
            public_key: URL_SAFE_NO_PAD.encode(entry.public_key.to_bytes()),
            valid_from: entry.valid_from,
            valid_until: entry.valid_until,
            revoked: entry.revoked,
        }
    }
}
