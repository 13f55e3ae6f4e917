//! The decoded packet model the resolver works on.
//!
//! Packet decoding itself happens elsewhere; these records carry exactly the
//! fields key resolution reads or derives. Derived fields (validity, usage,
//! expiry, primary flags) are written by the merge engine.

use chrono::{DateTime, TimeZone, Utc};
use smallvec::SmallVec;

use crate::internal::extract_email;
use crate::types::{
    BackSig, Fingerprint, KeyId, KeyUsage, Preference, PreferenceKind, PublicKeyAlgorithm,
    Revocation, RevocationKey, Timestamp,
};

/// Signature classes relevant to key resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
    /// 0x10..=0x13: certification of a user id or attribute
    CertUserId(u8),
    /// 0x18: subkey binding
    SubkeyBinding,
    /// 0x19: primary key binding (cross-certification made by a subkey)
    KeyBinding,
    /// 0x1F: direct key signature
    Key,
    /// 0x20: key revocation
    KeyRevocation,
    /// 0x28: subkey revocation
    SubkeyRevocation,
    /// 0x30: certification revocation
    CertRevocation,
    /// Any other class
    Other(u8),
}

impl From<u8> for SignatureType {
    fn from(value: u8) -> Self {
        match value {
            0x10..=0x13 => SignatureType::CertUserId(value),
            0x18 => SignatureType::SubkeyBinding,
            0x19 => SignatureType::KeyBinding,
            0x1F => SignatureType::Key,
            0x20 => SignatureType::KeyRevocation,
            0x28 => SignatureType::SubkeyRevocation,
            0x30 => SignatureType::CertRevocation,
            other => SignatureType::Other(other),
        }
    }
}

impl From<SignatureType> for u8 {
    fn from(value: SignatureType) -> u8 {
        match value {
            SignatureType::CertUserId(class) => class,
            SignatureType::SubkeyBinding => 0x18,
            SignatureType::KeyBinding => 0x19,
            SignatureType::Key => 0x1F,
            SignatureType::KeyRevocation => 0x20,
            SignatureType::SubkeyRevocation => 0x28,
            SignatureType::CertRevocation => 0x30,
            SignatureType::Other(class) => class,
        }
    }
}

/// Signature subpackets, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subpacket {
    /// Seconds after the signature creation at which it expires
    SignatureExpirationTime(u32),
    /// Seconds after the key creation at which the key expires
    KeyExpirationTime(u32),
    /// Issuer key id
    Issuer(KeyId),
    /// Preferred symmetric ciphers
    PreferredSymmetricAlgorithms(SmallVec<[u8; 8]>),
    /// Preferred hash algorithms
    PreferredHashAlgorithms(SmallVec<[u8; 8]>),
    /// Preferred compression algorithms
    PreferredCompressionAlgorithms(SmallVec<[u8; 8]>),
    /// Key server preferences; 0x80 in the first octet is "no-modify"
    KeyServerPreferences(SmallVec<[u8; 4]>),
    /// Key flags octets
    KeyFlags(SmallVec<[u8; 1]>),
    /// Feature octets; 0x01 in the first octet is modification detection
    Features(SmallVec<[u8; 1]>),
    /// Primary user id flag
    IsPrimary(bool),
    /// Designated revoker
    RevocationKey(RevocationKey),
    /// A complete embedded signature
    EmbeddedSignature(Box<SignatureRecord>),
    /// Anything not interpreted here
    Other(u8, Vec<u8>),
}

/// A decoded signature packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Packet version (3 or 4)
    pub version: u8,
    /// Signature class
    pub typ: SignatureType,
    /// Algorithm of the issuing key
    pub algorithm: PublicKeyAlgorithm,
    /// Key id of the issuer
    pub issuer: KeyId,
    /// Signature creation time
    pub created: Timestamp,
    /// Subpackets covered by the signature
    pub hashed: Vec<Subpacket>,
    /// Subpackets outside the signed data
    pub unhashed: Vec<Subpacket>,
}

impl SignatureRecord {
    /// Create a v4 signature without subpackets.
    pub fn new(typ: SignatureType, issuer: KeyId, created: Timestamp) -> Self {
        Self {
            version: 4,
            typ,
            algorithm: PublicKeyAlgorithm::Rsa,
            issuer,
            created,
            hashed: Vec::new(),
            unhashed: Vec::new(),
        }
    }

    /// Add a hashed subpacket.
    pub fn with_hashed(mut self, subpacket: Subpacket) -> Self {
        self.hashed.push(subpacket);
        self
    }

    /// Add an unhashed subpacket.
    pub fn with_unhashed(mut self, subpacket: Subpacket) -> Self {
        self.unhashed.push(subpacket);
        self
    }

    /// Set the issuer's algorithm.
    pub fn with_algorithm(mut self, algorithm: PublicKeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn is_key_revocation(&self) -> bool {
        self.typ == SignatureType::KeyRevocation
    }

    pub fn is_direct_key(&self) -> bool {
        self.typ == SignatureType::Key
    }

    pub fn is_uid_certification(&self) -> bool {
        matches!(self.typ, SignatureType::CertUserId(_))
    }

    pub fn is_uid_revocation(&self) -> bool {
        self.typ == SignatureType::CertRevocation
    }

    pub fn is_subkey_binding(&self) -> bool {
        self.typ == SignatureType::SubkeyBinding
    }

    pub fn is_subkey_revocation(&self) -> bool {
        self.typ == SignatureType::SubkeyRevocation
    }

    /// Key flags octets from the hashed area.
    ///
    /// `Some(&[])` means the subpacket exists with zero length.
    pub fn key_flags(&self) -> Option<&[u8]> {
        self.hashed.iter().find_map(|p| match p {
            Subpacket::KeyFlags(d) => Some(&d[..]),
            _ => None,
        })
    }

    /// Relative key expiration from the hashed area.
    pub fn key_expiration_time(&self) -> Option<u32> {
        self.hashed.iter().find_map(|p| match p {
            Subpacket::KeyExpirationTime(d) => Some(*d),
            _ => None,
        })
    }

    /// Absolute expiration of the signature itself, 0 if it never expires.
    pub fn expiredate(&self) -> Timestamp {
        self.hashed
            .iter()
            .find_map(|p| match p {
                Subpacket::SignatureExpirationTime(d) if *d != 0 => {
                    Some(self.created.saturating_add(*d))
                }
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Whether the signature has expired at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        let expiredate = self.expiredate();
        expiredate != 0 && expiredate <= now
    }

    /// Primary user id flag from the hashed area.
    pub fn is_primary(&self) -> bool {
        self.hashed.iter().any(|p| matches!(p, Subpacket::IsPrimary(true)))
    }

    /// Preference octets of one kind from the hashed area.
    pub fn preferences(&self, kind: PreferenceKind) -> &[u8] {
        self.hashed
            .iter()
            .find_map(|p| match (kind, p) {
                (PreferenceKind::Symmetric, Subpacket::PreferredSymmetricAlgorithms(d))
                | (PreferenceKind::Hash, Subpacket::PreferredHashAlgorithms(d))
                | (PreferenceKind::Compression, Subpacket::PreferredCompressionAlgorithms(d)) => {
                    Some(&d[..])
                }
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Feature octets from the hashed area.
    pub fn features(&self) -> &[u8] {
        self.hashed
            .iter()
            .find_map(|p| match p {
                Subpacket::Features(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Key server preference octets from the hashed area.
    pub fn keyserver_preferences(&self) -> &[u8] {
        self.hashed
            .iter()
            .find_map(|p| match p {
                Subpacket::KeyServerPreferences(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Designated revokers named in the hashed area.
    pub fn revocation_keys(&self) -> impl Iterator<Item = &RevocationKey> {
        self.hashed.iter().filter_map(|p| match p {
            Subpacket::RevocationKey(key) => Some(key),
            _ => None,
        })
    }

    /// Embedded signatures, hashed area first, then unhashed.
    pub fn embedded_signatures(&self) -> impl Iterator<Item = &SignatureRecord> {
        self.hashed
            .iter()
            .chain(self.unhashed.iter())
            .filter_map(|p| match p {
                Subpacket::EmbeddedSignature(sig) => Some(sig.as_ref()),
                _ => None,
            })
    }
}

/// A primary key or subkey together with everything derived for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// 64 bit key id
    pub keyid: KeyId,
    /// Fingerprint
    pub fingerprint: Fingerprint,
    /// Public key algorithm
    pub algorithm: PublicKeyAlgorithm,
    /// Key packet version
    pub version: u8,
    /// Creation time
    pub created: Timestamp,
    /// Fixed expiration carried by v3 key packets, 0 if none
    pub max_expiredate: Timestamp,
    /// Key id of the primary key of this keyblock
    pub main_keyid: Option<KeyId>,
    /// At least one valid self-signature (or an accepted substitute)
    pub valid: bool,
    /// Revocation state
    pub revoked: Option<Revocation>,
    /// A designated revoker's revocation exists but could not be checked
    pub maybe_revoked: bool,
    /// Expiration time, 0 if none
    pub expiredate: Timestamp,
    /// Set to the expiration instant once that lies in the past
    pub has_expired: Option<Timestamp>,
    /// Effective capabilities
    pub usage: KeyUsage,
    /// Algorithm preferences
    pub prefs: Vec<Preference>,
    /// Modification detection supported
    pub mdc: bool,
    /// Cross-certification status (subkeys only)
    pub backsig: BackSig,
    /// Designated revokers (primary keys only)
    pub revokers: Vec<RevocationKey>,
    /// Highest version of any valid self-signature
    pub selfsig_version: u8,
    /// Never put this record into the key cache
    pub dont_cache: bool,
    /// The user id that matched the lookup, attached on selection
    pub user_id: Option<Box<UserIdRecord>>,
}

impl KeyRecord {
    /// Create a v4 key record with nothing derived yet.
    pub fn new(
        keyid: KeyId,
        fingerprint: Fingerprint,
        algorithm: PublicKeyAlgorithm,
        created: Timestamp,
    ) -> Self {
        Self {
            keyid,
            fingerprint,
            algorithm,
            version: 4,
            created,
            max_expiredate: 0,
            main_keyid: None,
            valid: false,
            revoked: None,
            maybe_revoked: false,
            expiredate: 0,
            has_expired: None,
            usage: KeyUsage::empty(),
            prefs: Vec::new(),
            mdc: false,
            backsig: BackSig::Unchecked,
            revokers: Vec::new(),
            selfsig_version: 0,
            dont_cache: false,
            user_id: None,
        }
    }

    /// Create a key record whose key id is taken from a v4 fingerprint.
    pub fn from_fingerprint(
        fingerprint: Fingerprint,
        algorithm: PublicKeyAlgorithm,
        created: Timestamp,
    ) -> Option<Self> {
        let keyid = fingerprint.keyid()?;
        Some(Self::new(keyid, fingerprint, algorithm, created))
    }

    /// True when this record is the primary key of its keyblock.
    pub fn is_primary(&self) -> bool {
        self.main_keyid == Some(self.keyid)
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.has_expired.is_some()
    }

    /// Creation time as a chrono timestamp.
    pub fn creation_time(&self) -> DateTime<Utc> {
        timestamp_to_datetime(self.created)
    }

    /// Expiration time as a chrono timestamp (None if never).
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        (self.expiredate != 0).then(|| timestamp_to_datetime(self.expiredate))
    }
}

/// A user id or attribute packet and the data staged from its self-signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserIdRecord {
    /// Raw user id octets (or attribute data)
    pub name: Vec<u8>,
    /// Creation of the governing self-signature, 0 if none or invalid
    pub created: Timestamp,
    /// Revoked by its latest self-signature
    pub revoked: bool,
    /// Its latest self-signature expired
    pub expired: bool,
    /// Expiration of the governing self-signature
    pub expiredate: Timestamp,
    /// The governing self-signature carries the primary user id flag
    pub primary_candidate: bool,
    /// Chosen as the primary user id of the keyblock
    pub is_primary: bool,
    /// Key usage staged from the governing self-signature
    pub staged_usage: KeyUsage,
    /// Absolute key expiration staged from the governing self-signature
    pub staged_expire: Timestamp,
    /// Algorithm preferences
    pub prefs: Vec<Preference>,
    /// Modification detection supported
    pub mdc: bool,
    /// Keyservers may modify this key
    pub ks_modify: bool,
    /// Version of the governing self-signature
    pub selfsig_version: u8,
}

impl UserIdRecord {
    /// Create a user id record from its text.
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            ks_modify: true,
            ..Default::default()
        }
    }

    /// The user id as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.name).to_string()
    }

    /// The mail address inside angle brackets, lowercased.
    pub fn email(&self) -> Option<String> {
        extract_email(&self.text())
    }
}

/// One packet of a keyblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    PrimaryKey(KeyRecord),
    Subkey(KeyRecord),
    UserId(UserIdRecord),
    Attribute(UserIdRecord),
    Signature(SignatureRecord),
}

impl Packet {
    pub fn as_key(&self) -> Option<&KeyRecord> {
        match self {
            Packet::PrimaryKey(k) | Packet::Subkey(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_key_mut(&mut self) -> Option<&mut KeyRecord> {
        match self {
            Packet::PrimaryKey(k) | Packet::Subkey(k) => Some(k),
            _ => None,
        }
    }

    /// User id or attribute record.
    pub fn as_user_id(&self) -> Option<&UserIdRecord> {
        match self {
            Packet::UserId(u) | Packet::Attribute(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_user_id_mut(&mut self) -> Option<&mut UserIdRecord> {
        match self {
            Packet::UserId(u) | Packet::Attribute(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_signature(&self) -> Option<&SignatureRecord> {
        match self {
            Packet::Signature(s) => Some(s),
            _ => None,
        }
    }
}

fn timestamp_to_datetime(ts: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(ts), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
