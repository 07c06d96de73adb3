//! Time-bounded record of consumed tokens.
//!
//! Each verifier owns one [`ReplayGuard`]. Records are keyed by a
//! [`DedupKey`] and live until the token's own expiry, after which a replay
//! is rejected as expired anyway and the record can go.
//!
//! The guard is split into independently locked shards. Every shard keeps a
//! `HashMap` for membership and a `BTreeSet` ordered by expiry so purging
//! touches only dead records.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use crate::claims::ClaimSet;
use crate::config::AttestationConfig;
use crate::error::ReplayError;

/// SHA-256 over the length-prefixed `(attestor_id, token_id, nonce)`.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey([u8; 32]);

impl DedupKey {
    /// Derives the key for one token.
    #[must_use]
    pub fn new(attestor_id: &str, token_id: &str, nonce: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [attestor_id, token_id, nonce] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hasher.finalize().into())
    }

    /// Derives the key for a decoded payload.
    #[must_use]
    pub fn from_claims(claims: &ClaimSet) -> Self {
        Self::new(&claims.attestor_id, &claims.token_id, &claims.nonce)
    }

    /// Returns the digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn shard_index(&self, shards: usize) -> usize {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        // Truncation is fine: only the low bits pick the shard
        #[allow(clippy::cast_possible_truncation)]
        let hash = u64::from_le_bytes(prefix) as usize;
        hash % shards
    }
}

impl fmt::Debug for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DedupKey(")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "...)")
    }
}

#[derive(Debug, Default)]
struct Shard {
    records: HashMap<DedupKey, i64>,
    by_expiry: BTreeSet<(i64, DedupKey)>,
}

impl Shard {
    /// Drops every record with `expires_at <= now`; returns how many.
    fn purge(&mut self, now: i64) -> usize {
        let live = self
            .by_expiry
            .split_off(&(now.saturating_add(1), DedupKey([0; 32])));
        let dead = std::mem::replace(&mut self.by_expiry, live);
        for (_, key) in &dead {
            self.records.remove(key);
        }
        dead.len()
    }
}

/// Concurrent set of consumed dedup keys with a hard capacity.
///
/// For any key, exactly one of several concurrent
/// [`insert_if_absent`](Self::insert_if_absent) calls observes it as absent.
///
/// # Example
///
/// ```
/// use agetoken::{DedupKey, ReplayGuard};
///
/// let guard = ReplayGuard::new(1000, 4);
/// let key = DedupKey::new("attestor.example", "token-1", "nonce-1");
///
/// assert!(guard.insert_if_absent(key, 4600, 2000).unwrap());
/// assert!(!guard.insert_if_absent(key, 4600, 2001).unwrap());
/// assert_eq!(guard.len(), 1);
///
/// assert_eq!(guard.purge_expired(4600).unwrap(), 1);
/// assert!(guard.is_empty());
/// ```
pub struct ReplayGuard {
    shards: Vec<Mutex<Shard>>,
    capacity: usize,
    len: AtomicUsize,
}

impl ReplayGuard {
    /// Creates a guard holding at most `capacity` records across `shards`
    /// shards. Zero values are raised to 1.
    #[must_use]
    pub fn new(capacity: usize, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(Shard::default()))
            .collect();
        Self {
            shards,
            capacity: capacity.max(1),
            len: AtomicUsize::new(0),
        }
    }

    /// Creates a guard sized by `config.replay_capacity` and
    /// `config.replay_shards`.
    #[must_use]
    pub fn from_config(config: &AttestationConfig) -> Self {
        Self::new(config.replay_capacity, config.replay_shards)
    }

    /// Records `key` until `expires_at` unless it is already recorded.
    ///
    /// Returns `true` if the key was absent. A key that is already expired at
    /// `now` is not recorded and reported as absent.
    ///
    /// # Errors
    ///
    /// - `ReplayError::CapacityExceeded` if the guard is full after purging
    /// - `ReplayError::Unavailable` if a shard lock is poisoned
    pub fn insert_if_absent(
        &self,
        key: DedupKey,
        expires_at: i64,
        now: i64,
    ) -> Result<bool, ReplayError> {
        if expires_at <= now {
            return Ok(true);
        }

        let mut shard = self.lock_shard(&key)?;
        self.purge_shard(&mut shard, now);
        if shard.records.contains_key(&key) {
            return Ok(false);
        }

        if !self.reserve_slot() {
            // Full: sweep the other shards and retry once
            drop(shard);
            self.purge_expired(now)?;
            shard = self.lock_shard(&key)?;
            if shard.records.contains_key(&key) {
                return Ok(false);
            }
            if !self.reserve_slot() {
                return Err(ReplayError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
        }

        shard.records.insert(key, expires_at);
        shard.by_expiry.insert((expires_at, key));
        Ok(true)
    }

    /// Returns true if `key` is recorded and unexpired at `now`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Unavailable` if the shard lock is poisoned.
    pub fn contains(&self, key: &DedupKey, now: i64) -> Result<bool, ReplayError> {
        let shard = self.lock_shard(key)?;
        Ok(shard.records.get(key).is_some_and(|&exp| exp > now))
    }

    /// Drops every record with `expires_at <= now` and returns how many.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Unavailable` if a shard lock is poisoned.
    pub fn purge_expired(&self, now: i64) -> Result<usize, ReplayError> {
        let mut purged = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().map_err(|_| ReplayError::Unavailable)?;
            purged += self.purge_shard(&mut shard, now);
        }
        Ok(purged)
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns true if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every record.
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let removed = shard.records.len();
            shard.records.clear();
            shard.by_expiry.clear();
            self.len.fetch_sub(removed, Ordering::AcqRel);
        }
    }

    fn lock_shard(&self, key: &DedupKey) -> Result<MutexGuard<'_, Shard>, ReplayError> {
        self.shards[key.shard_index(self.shards.len())]
            .lock()
            .map_err(|_| ReplayError::Unavailable)
    }

    fn purge_shard(&self, shard: &mut Shard, now: i64) -> usize {
        let purged = shard.purge(now);
        if purged > 0 {
            self.len.fetch_sub(purged, Ordering::AcqRel);
        }
        purged
    }

    fn reserve_slot(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }
}

impl fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("shards", &self.shards.len())
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn key(n: u32) -> DedupKey {
        DedupKey::new("attestor.example", &format!("token-{n}"), "nonce")
    }

    #[test]
    fn dedup_key_is_length_prefixed() {
        assert_ne!(DedupKey::new("ab", "c", "d"), DedupKey::new("a", "bc", "d"));
        assert_eq!(DedupKey::new("a", "b", "c"), DedupKey::new("a", "b", "c"));
    }

    #[test]
    fn second_insert_is_rejected() {
        let guard = ReplayGuard::new(10, 2);
        assert!(guard.insert_if_absent(key(1), 100, 10).unwrap());
        assert!(!guard.insert_if_absent(key(1), 100, 11).unwrap());
        assert!(guard.insert_if_absent(key(2), 100, 11).unwrap());
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn expired_key_is_not_recorded() {
        let guard = ReplayGuard::new(10, 2);
        assert!(guard.insert_if_absent(key(1), 100, 100).unwrap());
        assert!(guard.is_empty());
    }

    #[test]
    fn record_expires_with_token() {
        let guard = ReplayGuard::new(10, 1);
        guard.insert_if_absent(key(1), 100, 10).unwrap();
        assert!(guard.contains(&key(1), 99).unwrap());
        assert!(!guard.contains(&key(1), 100).unwrap());
        assert_eq!(guard.purge_expired(99).unwrap(), 0);
        assert_eq!(guard.purge_expired(100).unwrap(), 1);
        assert!(guard.is_empty());
    }

    #[test]
    fn capacity_is_enforced_after_purge() {
        let guard = ReplayGuard::new(2, 4);
        guard.insert_if_absent(key(1), 100, 0).unwrap();
        guard.insert_if_absent(key(2), 200, 0).unwrap();
        assert_eq!(
            guard.insert_if_absent(key(3), 300, 50),
            Err(ReplayError::CapacityExceeded { capacity: 2 })
        );
        // key(1) has expired by 150, freeing a slot
        assert!(guard.insert_if_absent(key(3), 300, 150).unwrap());
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn clear_empties_all_shards() {
        let guard = ReplayGuard::new(100, 8);
        for n in 0..20 {
            guard.insert_if_absent(key(n), 1000, 0).unwrap();
        }
        assert_eq!(guard.len(), 20);
        guard.clear();
        assert!(guard.is_empty());
        assert!(guard.insert_if_absent(key(0), 1000, 0).unwrap());
    }

    #[test]
    fn concurrent_inserts_admit_exactly_one() {
        let guard = Arc::new(ReplayGuard::new(100, 4));
        let admitted = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let admitted = Arc::clone(&admitted);
                thread::spawn(move || {
                    if guard.insert_if_absent(key(7), 1000, 0).unwrap() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(guard.len(), 1);
    }
}
