//! Bounded memoization of resolved keys and display identities.
//!
//! Both caches are owned by a [`crate::Session`] and hold private copies of
//! what they store. They differ in their overflow policy: the key cache
//! drops the older half of its entries at once, the identity cache drops
//! only its single oldest entry.

use std::collections::VecDeque;

use log::debug;

use crate::internal::is_known_algorithm;
use crate::keyblock::Keyblock;
use crate::packet::KeyRecord;
use crate::types::{Fingerprint, KeyId};

/// Default number of entries for both caches.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Text used when a keyblock has no primary user id.
pub const USER_ID_NOT_FOUND: &str = "[User ID not found]";

/// Resolved key records by key id, newest first.
#[derive(Debug, Clone)]
pub struct KeyCache {
    entries: VecDeque<KeyRecord>,
    capacity: usize,
}

impl KeyCache {
    /// Create a cache holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Store a copy of `record`.
    ///
    /// Nothing happens when the cache is disabled, the record is flagged
    /// do-not-cache, its algorithm is unrecognized, or its key id is
    /// already present. On overflow the older half is evicted so that the
    /// newest ⌈capacity/2⌉ entries remain after the insert.
    ///
    /// # Returns
    /// Whether the record was stored.
    pub fn insert(&mut self, record: &KeyRecord) -> bool {
        if self.capacity == 0 || record.dont_cache || !is_known_algorithm(record.algorithm) {
            return false;
        }
        if self.entries.iter().any(|e| e.keyid == record.keyid) {
            debug!("key cache: {} already cached", record.keyid);
            return false;
        }

        if self.entries.len() >= self.capacity {
            let keep = self.capacity.div_ceil(2) - 1;
            debug!(
                "key cache: evicting {} of {} entries",
                self.entries.len() - keep,
                self.entries.len()
            );
            self.entries.truncate(keep);
        }

        self.entries.push_front(record.clone());
        true
    }

    /// The cached record for `keyid`.
    pub fn lookup(&self, keyid: &KeyId) -> Option<&KeyRecord> {
        self.entries.iter().find(|e| e.keyid == *keyid)
    }

    /// The cached record for `keyid`, only if it is a primary key.
    pub fn lookup_primary(&self, keyid: &KeyId) -> Option<&KeyRecord> {
        self.lookup(keyid).filter(|e| e.is_primary())
    }

    /// Drop all entries and refuse any further inserts.
    pub fn disable(&mut self) {
        self.entries.clear();
        self.capacity = 0;
    }

    pub fn is_disabled(&self) -> bool {
        self.capacity == 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key ids in cache order, newest first.
    pub fn keyids(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.entries.iter().map(|e| e.keyid)
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[derive(Debug, Clone)]
struct IdentityEntry {
    keys: Vec<(Fingerprint, KeyId)>,
    display: String,
}

/// Display identities shared by all keys of a keyblock, newest first.
#[derive(Debug, Clone)]
pub struct IdentityCache {
    entries: VecDeque<IdentityEntry>,
    capacity: usize,
}

impl IdentityCache {
    /// Create a cache holding at most `capacity` keyblocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Remember the primary user id of a merged keyblock for all its keys.
    ///
    /// The insert is skipped when any of the keyblock's fingerprints is
    /// already known; the first entry seen for a fingerprint is kept.
    ///
    /// # Returns
    /// Whether a new entry was stored.
    pub fn insert(&mut self, keyblock: &Keyblock) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let keys = keyblock.identities();
        let known = keys.iter().any(|(fpr, _)| {
            self.entries
                .iter()
                .any(|e| e.keys.iter().any(|(f, _)| f == fpr))
        });
        if known {
            debug!("identity cache: {} already cached", keyblock.primary().keyid);
            return false;
        }

        let display = keyblock
            .primary_user_id()
            .map(|u| u.text())
            .unwrap_or_else(|| USER_ID_NOT_FOUND.to_string());

        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(IdentityEntry { keys, display });
        true
    }

    /// The display identity of the key with this key id.
    pub fn lookup_keyid(&self, keyid: &KeyId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.keys.iter().any(|(_, k)| k == keyid))
            .map(|e| e.display.as_str())
    }

    /// The display identity of the key with this fingerprint.
    pub fn lookup_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.keys.iter().any(|(f, _)| f == fingerprint))
            .map(|e| e.display.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
