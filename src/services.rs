//! Interfaces to the collaborators key resolution depends on.
//!
//! Keyring storage, signature verification, secret key availability, owner
//! trust and network acquisition all live outside this crate. Each is a
//! trait here; [`crate::MemoryKeyring`] implements the store side for
//! in-process use and testing.

use crate::descriptor::SearchDescriptor;
use crate::error::Result;
use crate::keyblock::Keyblock;
use crate::locate::Mechanism;
use crate::packet::{KeyRecord, SignatureRecord};
use crate::types::{Fingerprint, KeyId, TrustLevel};

/// Where a store search starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Reset to the beginning of the store, then search
    First,
    /// Continue after the current position
    Next,
}

/// A successful store search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Index of the descriptor that matched
    pub descriptor: usize,
}

/// A positioned search handle over a key store.
pub trait StoreCursor {
    /// Find the next keyblock matching any of `descriptors`.
    ///
    /// # Returns
    /// `Ok(None)` when nothing (more) matches.
    fn search(
        &mut self,
        descriptors: &[SearchDescriptor],
        mode: SearchMode,
    ) -> Result<Option<SearchHit>>;

    /// The keyblock at the current position, with the matched key and user
    /// id recorded in its match table.
    fn keyblock(&mut self) -> Result<Keyblock>;

    /// Enable or disable the cursor's result caching.
    fn set_caching(&mut self, enabled: bool);
}

/// A source of keyblocks.
pub trait KeyStore {
    /// Open a fresh cursor positioned before the first keyblock.
    fn cursor(&self) -> Box<dyn StoreCursor + '_>;
}

/// Outcome of checking one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The signature is cryptographically valid
    Verified,
    /// The signature does not verify
    Failed,
    /// The issuing key could not be found
    IssuerUnavailable,
}

/// Cryptographic signature checks.
pub trait Verifier {
    /// Verify the signature at packet `signature` of `keyblock`.
    ///
    /// `issuer` is `None` for self-signatures; third-party checks pass the
    /// resolved issuer key.
    fn verify(
        &self,
        keyblock: &Keyblock,
        signature: usize,
        issuer: Option<&KeyRecord>,
    ) -> Verification;

    /// Verify a subkey's cross-certification against its primary key.
    fn verify_backsig(
        &self,
        primary: &KeyRecord,
        subkey: &KeyRecord,
        backsig: &SignatureRecord,
    ) -> Verification;
}

/// Secret key availability.
pub trait SecretKeyBackend {
    /// Whether any key in the keyblock has a usable secret counterpart.
    fn probe_any(&self, keyblock: &Keyblock) -> Result<bool>;

    /// Whether this key has a usable secret counterpart.
    fn probe_one(&self, key: &KeyRecord) -> bool;
}

/// Owner trust assignments.
pub trait TrustService {
    /// The owner trust assigned to a key.
    fn ownertrust(&self, key: &KeyRecord) -> TrustLevel;

    /// Whether the key has been disabled by its owner's trust record.
    fn is_disabled(&self, _key: &KeyRecord) -> bool {
        false
    }
}

/// Network key acquisition (DNS, LDAP, keyservers and so on).
pub trait KeyAcquirer {
    /// Fetch a key for `name` via `mechanism` and import it locally.
    ///
    /// # Returns
    /// The fingerprint of the imported key, `Ok(None)` if the mechanism
    /// reported success without naming one.
    fn fetch(&self, name: &str, mechanism: &Mechanism) -> Result<Option<Fingerprint>>;
}

/// Direct, non-merging key resolution used while a keyblock is being merged.
///
/// Implementations must not call back into full key resolution.
pub trait IssuerLookup {
    /// The primary key with this key id.
    fn by_keyid(&self, keyid: &KeyId) -> Option<KeyRecord>;

    /// The primary key of the keyblock containing this fingerprint.
    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<KeyRecord>;
}

/// A secret key backend that has no secret keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSecretKeys;

impl SecretKeyBackend for NoSecretKeys {
    fn probe_any(&self, _keyblock: &Keyblock) -> Result<bool> {
        Ok(false)
    }

    fn probe_one(&self, _key: &KeyRecord) -> bool {
        false
    }
}

/// A trust service that assigns no owner trust to anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOwnerTrust;

impl TrustService for NoOwnerTrust {
    fn ownertrust(&self, _key: &KeyRecord) -> TrustLevel {
        TrustLevel::Unknown
    }
}
