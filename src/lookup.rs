//! Lookup contexts and the search loop.
//!
//! A [`LookupContext`] owns the descriptors of one search and the store
//! cursor driving it. Each round fetches the next matching keyblock, merges
//! it, applies the usability and secret key filters and asks the selector
//! for a key. Dropping the context (or calling [`LookupContext::end`])
//! releases the cursor.

use log::{debug, error, warn};

use crate::cache::{IdentityCache, KeyCache};
use crate::descriptor::SearchDescriptor;
use crate::error::{Error, Result};
use crate::keyblock::Keyblock;
use crate::merge::{merge_keyblock, MergeContext};
use crate::packet::KeyRecord;
use crate::select::{select_key, SelectRequest};
use crate::services::{IssuerLookup, KeyStore, SearchMode, SecretKeyBackend, StoreCursor};
use crate::types::{Fingerprint, KeyId, KeyUsage};

/// A merged keyblock and the key selected from it.
#[derive(Debug, Clone)]
pub struct FoundKey {
    keyblock: Keyblock,
    index: usize,
}

impl FoundKey {
    /// The selected key, with the matched user id attached.
    pub fn key(&self) -> &KeyRecord {
        match self.keyblock.key(self.index) {
            Some(key) => key,
            None => self.keyblock.primary(),
        }
    }

    /// Packet index of the selected key within the keyblock.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The merged keyblock.
    pub fn keyblock(&self) -> &Keyblock {
        &self.keyblock
    }

    /// Consume the result, keeping only the keyblock.
    pub fn into_keyblock(self) -> Keyblock {
        self.keyblock
    }

    /// Consume the result, keeping only a copy of the selected key.
    pub fn into_key(self) -> KeyRecord {
        self.key().clone()
    }
}

/// Everything the search loop needs besides the context itself.
pub(crate) struct Engine<'e> {
    pub merge: MergeContext<'e>,
    pub secrets: &'e dyn SecretKeyBackend,
    pub identities: &'e mut IdentityCache,
    pub primary_for_signing: bool,
    pub ignore_valid_from: bool,
}

/// State of one search.
pub struct LookupContext<'a> {
    descriptors: Vec<SearchDescriptor>,
    exact: bool,
    usage: KeyUsage,
    want_secret: bool,
    cursor: Box<dyn StoreCursor + 'a>,
    mode: SearchMode,
}

impl std::fmt::Debug for LookupContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupContext")
            .field("descriptors", &self.descriptors)
            .field("exact", &self.exact)
            .field("usage", &self.usage)
            .field("want_secret", &self.want_secret)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<'a> LookupContext<'a> {
    /// Start a search over `store`.
    ///
    /// The search is exact when any descriptor is.
    ///
    /// # Arguments
    /// * `store` - The key store to search
    /// * `descriptors` - Search terms, OR-ed together
    /// * `usage` - Requested capabilities, empty for "any"
    /// * `want_secret` - Only accept keyblocks with a secret key
    pub fn new(
        store: &'a dyn KeyStore,
        descriptors: Vec<SearchDescriptor>,
        usage: KeyUsage,
        want_secret: bool,
    ) -> Self {
        let exact = descriptors.iter().any(|d| d.exact);
        Self {
            descriptors,
            exact,
            usage,
            want_secret,
            cursor: store.cursor(),
            mode: SearchMode::First,
        }
    }

    /// Force the exact flag.
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    pub fn descriptors(&self) -> &[SearchDescriptor] {
        &self.descriptors
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    pub fn wants_secret(&self) -> bool {
        self.want_secret
    }

    /// Release the context and its cursor.
    pub fn end(self) {}

    pub(crate) fn disable_caching(&mut self) {
        self.cursor.set_caching(false);
    }

    /// Run the search loop until a key is selected or the store is
    /// exhausted.
    ///
    /// # Returns
    /// The found key, [`Error::NoPublicKey`]/[`Error::NoSecretKey`] if
    /// nothing matched, or [`Error::UnusablePublicKey`]/
    /// [`Error::UnusableSecretKey`] if matches existed but none qualified.
    pub(crate) fn run(&mut self, engine: &mut Engine<'_>) -> Result<FoundKey> {
        let mut unsuitable_seen = false;

        loop {
            let hit = match self.cursor.search(&self.descriptors, self.mode) {
                Ok(Some(hit)) => hit,
                Ok(None) => break,
                Err(e) => {
                    error!("keyring search failed: {}", e);
                    return Err(e);
                }
            };
            self.mode = SearchMode::Next;

            if let Some(found) = self.consider(engine, hit.descriptor, &mut unsuitable_seen) {
                return Ok(found);
            }
            self.cursor.set_caching(false);
        }

        if unsuitable_seen {
            Err(Error::unusable(self.want_secret))
        } else {
            Err(Error::not_found(self.want_secret))
        }
    }

    fn consider(
        &mut self,
        engine: &mut Engine<'_>,
        descriptor: usize,
        unsuitable_seen: &mut bool,
    ) -> Option<FoundKey> {
        let mut keyblock = match self.cursor.keyblock() {
            Ok(kb) => kb,
            Err(e) => {
                error!("reading keyblock failed: {}", e);
                return None;
            }
        };

        if let Err(e) = merge_keyblock(&mut keyblock, &engine.merge) {
            error!("skipping keyblock {}: {}", keyblock.primary().keyid, e);
            return None;
        }

        if let Some(skip) = self.descriptors.get(descriptor).and_then(|d| d.skip) {
            if skip(&keyblock, keyblock.matched_user_id(), engine.merge.trust) {
                debug!("lookup: skipping unusable key {}", keyblock.primary().keyid);
                return None;
            }
        }

        if self.want_secret {
            match engine.secrets.probe_any(&keyblock) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("lookup: no secret key for {}", keyblock.primary().keyid);
                    *unsuitable_seen = true;
                    return None;
                }
                Err(e) => {
                    warn!("secret key probe failed for {}: {}", keyblock.primary().keyid, e);
                    *unsuitable_seen = true;
                    return None;
                }
            }
        }

        let request = SelectRequest {
            usage: self.usage,
            exact: self.exact,
            primary_for_signing: engine.primary_for_signing,
            ignore_valid_from: engine.ignore_valid_from,
            verbose: engine.merge.verbose,
            now: engine.merge.now,
        };
        match select_key(&mut keyblock, &request) {
            Some(index) => {
                engine.identities.insert(&keyblock);
                Some(FoundKey { keyblock, index })
            }
            None => {
                *unsuitable_seen = true;
                None
            }
        }
    }
}

/// Fetch the first keyblock matching `descriptor` without merging it.
pub(crate) fn fetch_unmerged(store: &dyn KeyStore, descriptor: SearchDescriptor) -> Result<Keyblock> {
    let mut cursor = store.cursor();
    match cursor.search(std::slice::from_ref(&descriptor), SearchMode::First) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(Error::NoPublicKey),
        Err(e) => {
            error!("keyring search failed: {}", e);
            return Err(Error::NoPublicKey);
        }
    }
    cursor.keyblock().map_err(|e| {
        error!("reading keyblock failed: {}", e);
        Error::NoPublicKey
    })
}

/// Issuer resolution that stops after one store access.
///
/// Used while merging: the returned records come straight from the store
/// (or the key cache) and are never merged themselves.
pub(crate) struct StoreIssuerLookup<'s> {
    store: &'s dyn KeyStore,
    cache: &'s KeyCache,
}

impl<'s> StoreIssuerLookup<'s> {
    pub(crate) fn new(store: &'s dyn KeyStore, cache: &'s KeyCache) -> Self {
        Self { store, cache }
    }
}

impl IssuerLookup for StoreIssuerLookup<'_> {
    fn by_keyid(&self, keyid: &KeyId) -> Option<KeyRecord> {
        if let Some(cached) = self.cache.lookup_primary(keyid) {
            return Some(cached.clone());
        }
        let keyblock = fetch_unmerged(self.store, SearchDescriptor::long_keyid(*keyid)).ok()?;
        let primary = keyblock.primary();
        (primary.keyid == *keyid).then(|| primary.clone())
    }

    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<KeyRecord> {
        let keyblock =
            fetch_unmerged(self.store, SearchDescriptor::fingerprint(fingerprint.clone())).ok()?;
        Some(keyblock.primary().clone())
    }
}
