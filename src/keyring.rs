//! In-memory keyring.
//!
//! Holds keyblocks in insertion order and implements the store side of key
//! resolution: descriptor matching, positioned search and per-cursor result
//! caching.

use log::debug;

use crate::descriptor::{Criterion, SearchDescriptor};
use crate::error::{Error, Result};
use crate::internal::contains_ignore_case;
use crate::keyblock::{Keyblock, MatchKind};
use crate::services::{KeyStore, SearchHit, SearchMode, StoreCursor};
use crate::types::Fingerprint;

/// A keyring kept in memory.
///
/// # Example
/// ```
/// use keyresolve::MemoryKeyring;
///
/// let keyring = MemoryKeyring::new();
/// assert!(keyring.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyring {
    keyblocks: Vec<Keyblock>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keyblocks(keyblocks: impl IntoIterator<Item = Keyblock>) -> Self {
        let mut keyring = Self::new();
        for keyblock in keyblocks {
            keyring.import(keyblock);
        }
        keyring
    }

    /// Add a keyblock, replacing any keyblock with the same primary key.
    ///
    /// # Returns
    /// Whether an existing keyblock was replaced.
    pub fn import(&mut self, keyblock: Keyblock) -> bool {
        let fpr = keyblock.primary().fingerprint.clone();
        match self.position(&fpr) {
            Some(i) => {
                debug!("keyring: replacing {}", fpr);
                self.keyblocks[i] = keyblock;
                true
            }
            None => {
                debug!("keyring: importing {}", fpr);
                self.keyblocks.push(keyblock);
                false
            }
        }
    }

    /// Remove the keyblock whose primary key has this fingerprint.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<Keyblock> {
        let i = self.position(fingerprint)?;
        Some(self.keyblocks.remove(i))
    }

    pub fn keyblocks(&self) -> &[Keyblock] {
        &self.keyblocks
    }

    pub fn len(&self) -> usize {
        self.keyblocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyblocks.is_empty()
    }

    fn position(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.keyblocks
            .iter()
            .position(|kb| kb.primary().fingerprint == *fingerprint)
    }
}

impl KeyStore for MemoryKeyring {
    fn cursor(&self) -> Box<dyn StoreCursor + '_> {
        Box::new(MemoryCursor {
            keyring: self,
            position: None,
            current: None,
            caching: true,
            cached: None,
        })
    }
}

/// Where a descriptor matched inside a keyblock.
///
/// `None` means the keyblock matched as a whole (the "all" criterion).
type Match = Option<(usize, MatchKind)>;

struct MemoryCursor<'k> {
    keyring: &'k MemoryKeyring,
    position: Option<usize>,
    current: Match,
    caching: bool,
    cached: Option<(usize, Keyblock)>,
}

impl StoreCursor for MemoryCursor<'_> {
    fn search(
        &mut self,
        descriptors: &[SearchDescriptor],
        mode: SearchMode,
    ) -> Result<Option<SearchHit>> {
        let start = match (mode, self.position) {
            (SearchMode::First, _) | (SearchMode::Next, None) => 0,
            (SearchMode::Next, Some(p)) => p + 1,
        };

        for (index, keyblock) in self.keyring.keyblocks.iter().enumerate().skip(start) {
            for (d, descriptor) in descriptors.iter().enumerate() {
                if let Some(m) = match_keyblock(keyblock, &descriptor.criterion) {
                    self.position = Some(index);
                    self.current = m;
                    return Ok(Some(SearchHit { descriptor: d }));
                }
            }
        }

        self.position = Some(self.keyring.keyblocks.len());
        self.current = None;
        Ok(None)
    }

    fn keyblock(&mut self) -> Result<Keyblock> {
        let index = self
            .position
            .filter(|i| *i < self.keyring.keyblocks.len())
            .ok_or_else(|| Error::Store("no current keyblock".to_string()))?;

        if let Some((cached_index, keyblock)) = &self.cached {
            if *cached_index == index {
                return Ok(keyblock.clone());
            }
        }

        let mut keyblock = self.keyring.keyblocks[index].clone();
        keyblock.clear_matches();
        if let Some((packet, kind)) = self.current {
            keyblock.mark_match(packet, kind);
        }
        if self.caching {
            self.cached = Some((index, keyblock.clone()));
        }
        Ok(keyblock)
    }

    fn set_caching(&mut self, enabled: bool) {
        self.caching = enabled;
        if !enabled {
            self.cached = None;
        }
    }
}

/// Test a keyblock against one criterion.
///
/// # Returns
/// `None` if it does not match, otherwise the matched packet (if any).
fn match_keyblock(keyblock: &Keyblock, criterion: &Criterion) -> Option<Match> {
    let key_match = |pred: &dyn Fn(&crate::packet::KeyRecord) -> bool| {
        keyblock
            .keys()
            .find(|(_, key)| pred(key))
            .map(|(i, _)| Some((i, MatchKind::Key)))
    };
    let uid_match = |pred: &dyn Fn(&crate::packet::UserIdRecord) -> bool| {
        keyblock
            .user_ids()
            .find(|(_, uid)| pred(uid))
            .map(|(i, _)| Some((i, MatchKind::UserId)))
    };

    match criterion {
        Criterion::All => Some(None),
        Criterion::ShortKeyId(short) => key_match(&|k| k.keyid.short() == *short),
        Criterion::LongKeyId(keyid) => key_match(&|k| k.keyid == *keyid),
        Criterion::Fingerprint(fpr) => key_match(&|k| k.fingerprint == *fpr),
        Criterion::Exact(text) => uid_match(&|u| u.text() == *text),
        Criterion::Mail(addr) => uid_match(&|u| u.email().as_deref() == Some(addr.as_str())),
        Criterion::MailSubstring(part) => {
            uid_match(&|u| u.email().is_some_and(|e| e.contains(part.as_str())))
        }
        Criterion::Substring(text) => uid_match(&|u| contains_ignore_case(&u.text(), text)),
    }
}
