//! Trusted attestor keys and their revocation state.
//!
//! The store holds an immutable [`TrustSnapshot`] behind `RwLock<Arc<_>>`.
//! Readers clone the `Arc` and work on a consistent view; every mutation
//! builds a complete new snapshot and swaps it in, so a failed refresh leaves
//! the previous snapshot live.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::constants::MAX_KEY_ID_LENGTH;
use crate::error::TrustError;
use crate::keys::{PublicKey, SignatureScheme};
use crate::trust_bundle::TrustBundle;

/// A verified public key of one attestor.
///
/// Multiple entries per attestor support key rotation. Lookup is always by
/// exact `(attestor_id, key_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEntry {
    /// Attestor the key belongs to
    pub attestor_id: String,
    /// Key identifier within the attestor's key ring
    pub key_id: String,
    /// The public key
    pub public_key: PublicKey,
    /// First second the key is valid, inclusive
    pub valid_from: i64,
    /// First second the key is no longer valid, exclusive
    pub valid_until: i64,
    /// Whether the key has been revoked
    pub revoked: bool,
}

impl TrustEntry {
    /// Creates a non-revoked entry.
    #[must_use]
    pub fn new(
        attestor_id: impl Into<String>,
        key_id: impl Into<String>,
        public_key: PublicKey,
        valid_from: i64,
        valid_until: i64,
    ) -> Self {
        Self {
            attestor_id: attestor_id.into(),
            key_id: key_id.into(),
            public_key,
            valid_from,
            valid_until,
            revoked: false,
        }
    }

    /// Returns the key's signature scheme.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        self.public_key.scheme()
    }

    /// Returns true if `at` lies in `[valid_from, valid_until)`.
    #[must_use]
    pub const fn is_valid_at(&self, at: i64) -> bool {
        self.valid_from <= at && at < self.valid_until
    }
}

/// An immutable view of all trusted keys.
#[derive(Debug, Clone, Default)]
pub struct TrustSnapshot {
    version: u64,
    attestors: HashMap<String, HashMap<String, TrustEntry>>,
    len: usize,
}

impl TrustSnapshot {
    /// Builds a snapshot, rejecting duplicate keys and empty windows.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidBundle` for the first invalid entry.
    pub fn build(
        version: u64,
        entries: impl IntoIterator<Item = TrustEntry>,
    ) -> Result<Self, TrustError> {
        let mut attestors: HashMap<String, HashMap<String, TrustEntry>> = HashMap::new();
        let mut len = 0;

        for entry in entries {
            validate_entry(&entry)?;
            let keys = attestors.entry(entry.attestor_id.clone()).or_default();
            match keys.entry(entry.key_id.clone()) {
                Entry::Occupied(_) => {
                    return Err(invalid_bundle(format!(
                        "duplicate key '{}' for attestor '{}'",
                        entry.key_id, entry.attestor_id
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                    len += 1;
                }
            }
        }

        Ok(Self {
            version,
            attestors,
            len,
        })
    }

    /// Returns the bundle version this snapshot was built from.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the snapshot has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the entry for `(attestor_id, key_id)`, if any.
    #[must_use]
    pub fn get(&self, attestor_id: &str, key_id: &str) -> Option<&TrustEntry> {
        self.attestors.get(attestor_id)?.get(key_id)
    }

    /// Iterates over all entries in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = &TrustEntry> {
        self.attestors.values().flat_map(HashMap::values)
    }

    /// Resolves the public key for `(attestor_id, key_id)` at `at`.
    ///
    /// Checks run in a fixed order: unknown attestor, unknown key, revoked,
    /// then the validity window. Revocation is reported even for a key whose
    /// window has also passed.
    ///
    /// # Errors
    ///
    /// Returns the first failing `TrustError` in that order.
    pub fn resolve(&self, attestor_id: &str, key_id: &str, at: i64) -> Result<&PublicKey, TrustError> {
        let keys = self
            .attestors
            .get(attestor_id)
            .ok_or(TrustError::UnknownAttestor)?;
        let entry = keys.get(key_id).ok_or(TrustError::UnknownKey)?;
        if entry.revoked {
            return Err(TrustError::Revoked);
        }
        if !entry.is_valid_at(at) {
            return Err(TrustError::KeyExpired);
        }
        Ok(&entry.public_key)
    }

    /// Returns every key of `attestor_id` that is usable at `at`.
    ///
    /// Used for tokens that do not name their signing key. Keys come back
    /// sorted by key id so callers try them in a stable order.
    ///
    /// # Errors
    ///
    /// - `UnknownAttestor` if the attestor has no entries
    /// - `Revoked` if every entry is revoked
    /// - `KeyExpired` if no unrevoked entry is valid at `at`
    pub fn usable_keys(&self, attestor_id: &str, at: i64) -> Result<Vec<&PublicKey>, TrustError> {
        let keys = self
            .attestors
            .get(attestor_id)
            .ok_or(TrustError::UnknownAttestor)?;
        let mut usable: Vec<&TrustEntry> = keys
            .values()
            .filter(|entry| !entry.revoked && entry.is_valid_at(at))
            .collect();
        if usable.is_empty() {
            return Err(if keys.values().all(|entry| entry.revoked) {
                TrustError::Revoked
            } else {
                TrustError::KeyExpired
            });
        }
        usable.sort_by(|a, b| a.key_id.cmp(&b.key_id));
        Ok(usable.into_iter().map(|entry| &entry.public_key).collect())
    }
}

fn validate_entry(entry: &TrustEntry) -> Result<(), TrustError> {
    if entry.attestor_id.is_empty() {
        return Err(invalid_bundle("entry with empty attestor_id"));
    }
    if entry.key_id.is_empty() || entry.key_id.len() > MAX_KEY_ID_LENGTH {
        return Err(invalid_bundle(format!(
            "key id for attestor '{}' must be 1-{MAX_KEY_ID_LENGTH} bytes",
            entry.attestor_id
        )));
    }
    if entry.valid_until <= entry.valid_from {
        return Err(invalid_bundle(format!(
            "key '{}' for attestor '{}' has an empty validity window",
            entry.key_id, entry.attestor_id
        )));
    }
    Ok(())
}

fn invalid_bundle(reason: impl Into<String>) -> TrustError {
    TrustError::InvalidBundle {
        reason: reason.into(),
    }
}

/// Shared, refreshable set of trusted attestor keys.
///
/// # Example
///
/// ```
/// use agetoken::{SignatureScheme, SigningKey, TrustEntry, TrustError, TrustStore};
///
/// let key = SigningKey::generate(SignatureScheme::Ed25519).public_key();
/// let store = TrustStore::new();
/// store
///     .refresh(vec![TrustEntry::new("attestor.example", "k1", key, 0, 10_000)])
///     .unwrap();
///
/// assert!(store.resolve("attestor.example", "k1", 500).is_ok());
/// assert_eq!(
///     store.resolve("attestor.example", "k2", 500),
///     Err(TrustError::UnknownKey)
/// );
///
/// store.revoke("attestor.example", "k1").unwrap();
/// assert_eq!(
///     store.resolve("attestor.example", "k1", 500),
///     Err(TrustError::Revoked)
/// );
/// ```
#[derive(Debug, Default)]
pub struct TrustStore {
    current: RwLock<Arc<TrustSnapshot>>,
}

impl TrustStore {
    /// Creates an empty store at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from an initial set of entries.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidBundle` if the entries are invalid.
    pub fn from_entries(entries: impl IntoIterator<Item = TrustEntry>) -> Result<Self, TrustError> {
        let snapshot = TrustSnapshot::build(0, entries)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Returns the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Unavailable` if the lock is poisoned.
    pub fn snapshot(&self) -> Result<Arc<TrustSnapshot>, TrustError> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| TrustError::Unavailable)
    }

    /// Resolves the public key for `(attestor_id, key_id)` at `at`.
    ///
    /// # Errors
    ///
    /// See [`TrustSnapshot::resolve`]; also `TrustError::Unavailable` if the
    /// lock is poisoned.
    pub fn resolve(&self, attestor_id: &str, key_id: &str, at: i64) -> Result<PublicKey, TrustError> {
        let snapshot = self.snapshot()?;
        snapshot.resolve(attestor_id, key_id, at).cloned()
    }

    /// Returns every key of `attestor_id` usable at `at`.
    ///
    /// # Errors
    ///
    /// See [`TrustSnapshot::usable_keys`]; also `TrustError::Unavailable` if
    /// the lock is poisoned.
    pub fn usable_keys(&self, attestor_id: &str, at: i64) -> Result<Vec<PublicKey>, TrustError> {
        let snapshot = self.snapshot()?;
        let keys = snapshot.usable_keys(attestor_id, at)?;
        Ok(keys.into_iter().cloned().collect())
    }

    /// Replaces all entries, keeping the installed version.
    ///
    /// Meant for operator-supplied entry lists; feeds should go through
    /// [`refresh_from_bundle`](Self::refresh_from_bundle) so rollback is
    /// detected.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::InvalidBundle` if the entries are invalid; the
    /// previous snapshot stays live.
    pub fn refresh(&self, entries: impl IntoIterator<Item = TrustEntry>) -> Result<(), TrustError> {
        let mut current = self.current.write().map_err(|_| TrustError::Unavailable)?;
        let snapshot = TrustSnapshot::build(current.version(), entries)?;
        info!(
            version = snapshot.version(),
            entries = snapshot.len(),
            "trust store refreshed"
        );
        *current = Arc::new(snapshot);
        Ok(())
    }

    /// Installs a trust bundle if it is newer than the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::StaleBundle` if `bundle.version` is not greater
    /// than the installed version, or `TrustError::InvalidBundle` if any entry
    /// is invalid. The previous snapshot stays live on failure.
    pub fn refresh_from_bundle(&self, bundle: &TrustBundle) -> Result<(), TrustError> {
        let entries = bundle.to_entries()?;
        let mut current = self.current.write().map_err(|_| TrustError::Unavailable)?;
        if bundle.version <= current.version() {
            return Err(TrustError::StaleBundle {
                current: current.version(),
                offered: bundle.version,
            });
        }
        let snapshot = TrustSnapshot::build(bundle.version, entries)?;
        info!(
            version = snapshot.version(),
            entries = snapshot.len(),
            "trust bundle installed"
        );
        *current = Arc::new(snapshot);
        Ok(())
    }

    /// Marks one key as revoked.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::UnknownAttestor` or `TrustError::UnknownKey` if
    /// the entry does not exist.
    pub fn revoke(&self, attestor_id: &str, key_id: &str) -> Result<(), TrustError> {
        let mut current = self.current.write().map_err(|_| TrustError::Unavailable)?;
        let mut next = TrustSnapshot::clone(&**current);
        let entry = next
            .attestors
            .get_mut(attestor_id)
            .ok_or(TrustError::UnknownAttestor)?
            .get_mut(key_id)
            .ok_or(TrustError::UnknownKey)?;
        entry.revoked = true;
        info!(version = next.version(), "trust entry revoked");
        *current = Arc::new(next);
        Ok(())
    }

    /// Returns the installed bundle version.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Unavailable` if the lock is poisoned.
    pub fn version(&self) -> Result<u64, TrustError> {
        Ok(self.snapshot()?.version())
    }

    /// Returns the number of entries, or 0 if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, |s| s.len())
    }

    /// Returns true if the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
