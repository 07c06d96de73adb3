//! An attestor's signing keys with validity windows.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::constants::MAX_KEY_ID_LENGTH;
use crate::error::{IssueError, KeyRingError};
use crate::keys::{PublicKey, SigningKey};
use crate::trust_store::TrustEntry;

/// A signing key registered in a [`KeyRing`].
#[derive(Debug)]
pub struct KeyRingEntry {
    key_id: String,
    signing_key: SigningKey,
    valid_from: i64,
    valid_until: i64,
}

impl KeyRingEntry {
    /// Returns the key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the signing key.
    #[must_use]
    pub const fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Returns the public half of the key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.signing_key.public_key()
    }

    /// Start of validity, inclusive.
    #[must_use]
    pub const fn valid_from(&self) -> i64 {
        self.valid_from
    }

    /// End of validity, exclusive.
    #[must_use]
    pub const fn valid_until(&self) -> i64 {
        self.valid_until
    }

    /// Returns true if `at` lies in `[valid_from, valid_until)`.
    #[must_use]
    pub const fn is_active_at(&self, at: i64) -> bool {
        self.valid_from <= at && at < self.valid_until
    }
}

/// The set of signing keys an issuer may use.
///
/// Read-mostly: issuance takes a read lock, rotation a write lock. During a
/// rotation overlap the key with the latest `valid_from` signs; equal start
/// times fall back to the greater key id so the choice is deterministic.
///
/// # Example
///
/// ```
/// use agetoken::{KeyRing, SignatureScheme, SigningKey};
///
/// let ring = KeyRing::new();
/// ring.add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 2000).unwrap();
/// ring.add_key("k2", SigningKey::generate(SignatureScheme::Ed25519), 1000, 3000).unwrap();
///
/// assert_eq!(ring.active_key(500).unwrap().key_id(), "k1");
/// assert_eq!(ring.active_key(1500).unwrap().key_id(), "k2");
/// assert!(ring.active_key(3000).is_err());
/// ```
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<BTreeMap<String, Arc<KeyRingEntry>>>,
}

impl KeyRing {
    /// Creates an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a signing key valid during `[valid_from, valid_until)`.
    ///
    /// # Errors
    ///
    /// - `KeyRingError::InvalidKeyId` if `key_id` is empty, too long, or not
    ///   visible ASCII
    /// - `KeyRingError::EmptyWindow` if `valid_until <= valid_from`
    /// - `KeyRingError::DuplicateKey` if `key_id` is already registered
    pub fn add_key(
        &self,
        key_id: impl Into<String>,
        signing_key: SigningKey,
        valid_from: i64,
        valid_until: i64,
    ) -> Result<(), KeyRingError> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        if valid_until <= valid_from {
            return Err(KeyRingError::EmptyWindow);
        }

        let mut keys = self.keys.write().map_err(|_| KeyRingError::Unavailable)?;
        if keys.contains_key(&key_id) {
            return Err(KeyRingError::DuplicateKey { key_id });
        }
        info!(
            key_id = %key_id,
            scheme = %signing_key.scheme(),
            valid_from,
            valid_until,
            "signing key added"
        );
        keys.insert(
            key_id.clone(),
            Arc::new(KeyRingEntry {
                key_id,
                signing_key,
                valid_from,
                valid_until,
            }),
        );
        Ok(())
    }

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns `KeyRingError::NotFound` if no such key exists.
    pub fn retire(&self, key_id: &str) -> Result<(), KeyRingError> {
        let mut keys = self.keys.write().map_err(|_| KeyRingError::Unavailable)?;
        if keys.remove(key_id).is_none() {
            return Err(KeyRingError::NotFound {
                key_id: key_id.to_string(),
            });
        }
        info!(key_id, "signing key retired");
        Ok(())
    }

    /// Returns the key to sign with at `now`.
    ///
    /// Never falls back to an expired or not-yet-valid key.
    ///
    /// # Errors
    ///
    /// Returns `IssueError::NoActiveKey` if no key is valid at `now`, or
    /// `IssueError::Unavailable` if the lock is poisoned.
    pub fn active_key(&self, now: i64) -> Result<Arc<KeyRingEntry>, IssueError> {
        let keys = self.keys.read().map_err(|_| IssueError::Unavailable {
            reason: "key ring lock poisoned".to_string(),
        })?;
        keys.values()
            .filter(|entry| entry.is_active_at(now))
            .max_by(|a, b| {
                a.valid_from
                    .cmp(&b.valid_from)
                    .then_with(|| a.key_id.cmp(&b.key_id))
            })
            .cloned()
            .ok_or(IssueError::NoActiveKey)
    }

    /// Exports every key's public half as trust entries for `attestor_id`.
    ///
    /// Entries are ordered by key id. A poisoned lock yields an empty list.
    #[must_use]
    pub fn published_entries(&self, attestor_id: &str) -> Vec<TrustEntry> {
        self.keys.read().map_or_else(
            |_| Vec::new(),
            |keys| {
                keys.values()
                    .map(|entry| {
                        TrustEntry::new(
                            attestor_id,
                            entry.key_id.clone(),
                            entry.public_key(),
                            entry.valid_from,
                            entry.valid_until,
                        )
                    })
                    .collect()
            },
        )
    }

    /// Returns the number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().map_or(0, |keys| keys.len())
    }

    /// Returns true if no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_key_id(key_id: &str) -> Result<(), KeyRingError> {
    if key_id.is_empty() {
        return Err(KeyRingError::InvalidKeyId {
            reason: "key id must not be empty".to_string(),
        });
    }
    if key_id.len() > MAX_KEY_ID_LENGTH {
        return Err(KeyRingError::InvalidKeyId {
            reason: format!("key id exceeds {MAX_KEY_ID_LENGTH} bytes"),
        });
    }
    if !key_id.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(KeyRingError::InvalidKeyId {
            reason: "key id must be visible ASCII".to_string(),
        });
    }
    Ok(())
}
