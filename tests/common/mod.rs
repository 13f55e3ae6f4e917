//! Shared fixtures: scripted collaborators and keyblock builders.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use smallvec::SmallVec;

use keyresolve::{
    Config, Fingerprint, KeyAcquirer, KeyId, KeyRecord, Keyblock, Mechanism, Packet,
    PublicKeyAlgorithm, Result, SecretKeyBackend, SignatureRecord, SignatureType, Subpacket,
    Timestamp, TrustLevel, TrustService, UserIdRecord, Verification, Verifier,
};

/// Key creation time used throughout the tests.
pub const T0: Timestamp = 1_500_000_000;
/// The fixed "now" of every test session.
pub const NOW: Timestamp = 1_700_000_000;

/// Configuration pinned to [`NOW`].
pub fn config() -> Config {
    let now = DateTime::<Utc>::from_timestamp(i64::from(NOW), 0).unwrap();
    Config::default().with_reference_time(now)
}

// =============================================================================
// Collaborators
// =============================================================================

/// Verifies every signature except the ones listed as bad.
#[derive(Default)]
pub struct ScriptedVerifier {
    bad: Vec<SignatureRecord>,
    bad_backsigs: Vec<SignatureRecord>,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(mut self, sig: SignatureRecord) -> Self {
        self.bad.push(sig);
        self
    }

    pub fn reject_backsig(mut self, sig: SignatureRecord) -> Self {
        self.bad_backsigs.push(sig);
        self
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, keyblock: &Keyblock, signature: usize, issuer: Option<&KeyRecord>) -> Verification {
        let Some(sig) = keyblock.signature(signature) else {
            return Verification::Failed;
        };
        if let Some(issuer) = issuer {
            if issuer.keyid != sig.issuer {
                return Verification::Failed;
            }
        }
        if self.bad.contains(sig) {
            Verification::Failed
        } else {
            Verification::Verified
        }
    }

    fn verify_backsig(&self, _primary: &KeyRecord, _subkey: &KeyRecord, backsig: &SignatureRecord) -> Verification {
        if self.bad_backsigs.contains(backsig) {
            Verification::Failed
        } else {
            Verification::Verified
        }
    }
}

/// Secret keys available for a fixed set of key ids.
#[derive(Default)]
pub struct MapSecrets {
    keyids: HashSet<KeyId>,
    broken: bool,
}

impl MapSecrets {
    pub fn new(keyids: impl IntoIterator<Item = KeyId>) -> Self {
        Self {
            keyids: keyids.into_iter().collect(),
            broken: false,
        }
    }

    /// A backend whose keyblock probe always fails.
    pub fn broken() -> Self {
        Self {
            keyids: HashSet::new(),
            broken: true,
        }
    }
}

impl SecretKeyBackend for MapSecrets {
    fn probe_any(&self, keyblock: &Keyblock) -> Result<bool> {
        if self.broken {
            return Err(keyresolve::Error::Store("agent not reachable".into()));
        }
        Ok(keyblock.keys().any(|(_, k)| self.keyids.contains(&k.keyid)))
    }

    fn probe_one(&self, key: &KeyRecord) -> bool {
        self.keyids.contains(&key.keyid)
    }
}

/// Owner trust from fixed sets.
#[derive(Default)]
pub struct MapTrust {
    pub ultimate: HashSet<KeyId>,
    pub disabled: HashSet<KeyId>,
}

impl TrustService for MapTrust {
    fn ownertrust(&self, key: &KeyRecord) -> TrustLevel {
        if self.ultimate.contains(&key.keyid) {
            TrustLevel::Ultimate
        } else {
            TrustLevel::Unknown
        }
    }

    fn is_disabled(&self, key: &KeyRecord) -> bool {
        self.disabled.contains(&key.keyid)
    }
}

/// Acquisition results per mechanism token, with a call log.
#[derive(Default)]
pub struct ScriptedAcquirer {
    results: HashMap<String, std::result::Result<Option<Fingerprint>, String>>,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, mechanism: &str, fingerprint: Option<Fingerprint>) -> Self {
        self.results.insert(mechanism.to_string(), Ok(fingerprint));
        self
    }

    pub fn fail(mut self, mechanism: &str, reason: &str) -> Self {
        self.results.insert(mechanism.to_string(), Err(reason.to_string()));
        self
    }
}

impl KeyAcquirer for ScriptedAcquirer {
    fn fetch(&self, _name: &str, mechanism: &Mechanism) -> Result<Option<Fingerprint>> {
        let token = mechanism.to_string();
        self.calls.borrow_mut().push(token.clone());
        match self.results.get(&token) {
            Some(Ok(fpr)) => Ok(fpr.clone()),
            Some(Err(reason)) => Err(keyresolve::Error::Store(reason.clone())),
            None => Err(keyresolve::Error::NoPublicKey),
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn fingerprint(seed: u8) -> Fingerprint {
    Fingerprint::from_slice(&[seed; 20]).unwrap()
}

pub fn keyid(seed: u8) -> KeyId {
    fingerprint(seed).keyid().unwrap()
}

pub fn key(seed: u8, algorithm: PublicKeyAlgorithm, created: Timestamp) -> KeyRecord {
    KeyRecord::from_fingerprint(fingerprint(seed), algorithm, created).unwrap()
}

pub fn flags(bits: u8) -> Subpacket {
    Subpacket::KeyFlags(SmallVec::from_slice(&[bits]))
}

pub fn uid_cert(issuer: KeyId, created: Timestamp) -> SignatureRecord {
    SignatureRecord::new(SignatureType::CertUserId(0x13), issuer, created)
}

pub fn binding(issuer: KeyId, created: Timestamp) -> SignatureRecord {
    SignatureRecord::new(SignatureType::SubkeyBinding, issuer, created)
}

/// Builds keyblocks in canonical order.
pub struct KeyblockBuilder {
    primary: KeyRecord,
    direct: Vec<Packet>,
    user_ids: Vec<Packet>,
    subkeys: Vec<Packet>,
}

impl KeyblockBuilder {
    pub fn new(seed: u8, algorithm: PublicKeyAlgorithm, created: Timestamp) -> Self {
        Self::from_key(key(seed, algorithm, created))
    }

    pub fn from_key(primary: KeyRecord) -> Self {
        Self {
            primary,
            direct: Vec::new(),
            user_ids: Vec::new(),
            subkeys: Vec::new(),
        }
    }

    pub fn keyid(&self) -> KeyId {
        self.primary.keyid
    }

    /// A signature directly on the primary key.
    pub fn direct(mut self, sig: SignatureRecord) -> Self {
        self.direct.push(Packet::Signature(sig));
        self
    }

    /// A user id followed by its signatures.
    pub fn user_id(mut self, name: &str, sigs: impl IntoIterator<Item = SignatureRecord>) -> Self {
        self.user_ids.push(Packet::UserId(UserIdRecord::new(name)));
        self.user_ids.extend(sigs.into_iter().map(Packet::Signature));
        self
    }

    /// An attribute packet followed by its signatures.
    pub fn attribute(mut self, data: &[u8], sigs: impl IntoIterator<Item = SignatureRecord>) -> Self {
        self.user_ids.push(Packet::Attribute(UserIdRecord::new(data.to_vec())));
        self.user_ids.extend(sigs.into_iter().map(Packet::Signature));
        self
    }

    /// A user id with one plain self-certification.
    pub fn signed_user_id(self, name: &str, created: Timestamp) -> Self {
        let kid = self.keyid();
        self.user_id(name, [uid_cert(kid, created)])
    }

    /// A subkey followed by its signatures.
    pub fn subkey(mut self, subkey: KeyRecord, sigs: impl IntoIterator<Item = SignatureRecord>) -> Self {
        self.subkeys.push(Packet::Subkey(subkey));
        self.subkeys.extend(sigs.into_iter().map(Packet::Signature));
        self
    }

    pub fn build(self) -> Keyblock {
        let mut packets = vec![Packet::PrimaryKey(self.primary)];
        packets.extend(self.direct);
        packets.extend(self.user_ids);
        packets.extend(self.subkeys);
        Keyblock::new(packets).unwrap()
    }
}

/// Alice: RSA primary (seed 1) signing user id, RSA encryption subkey
/// (seed 2), both bound at T0 + 10.
pub fn alice() -> Keyblock {
    let kid = keyid(1);
    KeyblockBuilder::new(1, PublicKeyAlgorithm::Rsa, T0)
        .user_id(
            "Alice <alice@example.org>",
            [uid_cert(kid, T0 + 10).with_hashed(flags(0x03))],
        )
        .subkey(
            key(2, PublicKeyAlgorithm::Rsa, T0 + 5),
            [binding(kid, T0 + 10).with_hashed(flags(0x0c))],
        )
        .build()
}

/// Bob: EdDSA primary (seed 3) with an ECDH subkey (seed 4).
pub fn bob() -> Keyblock {
    let kid = keyid(3);
    KeyblockBuilder::new(3, PublicKeyAlgorithm::EdDsa, T0)
        .signed_user_id("Bob <bob@example.net>", T0 + 1)
        .subkey(key(4, PublicKeyAlgorithm::Ecdh, T0), [binding(kid, T0 + 1)])
        .build()
}
