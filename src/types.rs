//! Public type definitions for the keyresolve library.
//!
//! This module contains the small value types shared by the packet model,
//! the merge engine and the selector: key identifiers, the usage mask,
//! algorithm identifiers and revocation data.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// OpenPGP instant: seconds since the Unix epoch, `0` meaning "none".
pub type Timestamp = u32;

/// A 64 bit OpenPGP key id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyId([u8; 8]);

impl KeyId {
    /// Build a key id from its 8 raw bytes.
    pub fn new(bytes: [u8; 8]) -> Self {
        KeyId(bytes)
    }

    /// Build a key id from its numeric value.
    pub fn from_u64(value: u64) -> Self {
        KeyId(value.to_be_bytes())
    }

    /// Build a key id from a slice which must be exactly 8 bytes long.
    pub fn from_slice(input: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = input
            .try_into()
            .map_err(|_| Error::InvalidInput(format!("key id must be 8 bytes, got {}", input.len())))?;
        Ok(KeyId(bytes))
    }

    /// Numeric value of the key id.
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// The low 32 bits, i.e. the "short" key id.
    pub fn short(&self) -> u32 {
        self.as_u64() as u32
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode_upper(self.0))
    }
}

impl FromStr for KeyId {
    type Err = Error;

    /// Parse 16 hex digits, optionally prefixed with `0x`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if s.len() != 16 {
            return Err(Error::InvalidInput(format!("invalid key id: {}", s)));
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidInput(e.to_string()))?;
        KeyId::from_slice(&bytes)
    }
}

/// A key fingerprint: 16 bytes for v3 keys, 20 bytes for v4 keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(SmallVec<[u8; 20]>);

impl Fingerprint {
    /// Build a fingerprint from its raw bytes.
    pub fn from_slice(input: &[u8]) -> Result<Self> {
        match input.len() {
            16 | 20 => Ok(Fingerprint(SmallVec::from_slice(input))),
            n => Err(Error::InvalidInput(format!(
                "fingerprint must be 16 or 20 bytes, got {}",
                n
            ))),
        }
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; fingerprints have a fixed non-zero size.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The key id embedded in a v4 fingerprint (its low 64 bits).
    ///
    /// v3 fingerprints do not contain the key id, `None` is returned.
    pub fn keyid(&self) -> Option<KeyId> {
        if self.0.len() == 20 {
            KeyId::from_slice(&self.0[12..]).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode_upper(&self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    /// Parse 32 or 40 hex digits; embedded spaces are ignored.
    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&compact).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Fingerprint::from_slice(&bytes)
    }
}

/// Capability bitset of a key: certify, sign, encrypt, authenticate.
///
/// Two markers complete the set: `UNKNOWN` records key flags this library
/// does not interpret, `NONE` records key flags that were present but empty.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyUsage(u16);

impl KeyUsage {
    /// Data signatures
    pub const SIGN: KeyUsage = KeyUsage(0x01);
    /// Encryption of communications or storage
    pub const ENCRYPT: KeyUsage = KeyUsage(0x02);
    /// Certification of other keys and user ids
    pub const CERTIFY: KeyUsage = KeyUsage(0x04);
    /// Authentication
    pub const AUTHENTICATE: KeyUsage = KeyUsage(0x08);
    /// Key flags carried bits we do not handle
    pub const UNKNOWN: KeyUsage = KeyUsage(0x80);
    /// Key flags were given but grant nothing
    pub const NONE: KeyUsage = KeyUsage(0x100);

    /// The bits a lookup may filter on.
    pub const SELECTABLE: KeyUsage = KeyUsage(0x0f);

    /// The empty mask.
    pub const fn empty() -> Self {
        KeyUsage(0)
    }

    /// Create a mask from its raw bit representation.
    pub const fn from_bits(bits: u16) -> Self {
        KeyUsage(bits)
    }

    /// Raw bit representation.
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// True when no bit is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(&self, other: KeyUsage) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one bit.
    pub const fn intersects(&self, other: KeyUsage) -> bool {
        self.0 & other.0 != 0
    }

    /// True when `self` is a subset of `other`.
    pub const fn is_subset_of(&self, other: KeyUsage) -> bool {
        self.0 & !other.0 == 0
    }
}

impl BitOr for KeyUsage {
    type Output = KeyUsage;

    fn bitor(self, rhs: KeyUsage) -> KeyUsage {
        KeyUsage(self.0 | rhs.0)
    }
}

impl BitOrAssign for KeyUsage {
    fn bitor_assign(&mut self, rhs: KeyUsage) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for KeyUsage {
    type Output = KeyUsage;

    fn bitand(self, rhs: KeyUsage) -> KeyUsage {
        KeyUsage(self.0 & rhs.0)
    }
}

impl BitAndAssign for KeyUsage {
    fn bitand_assign(&mut self, rhs: KeyUsage) {
        self.0 &= rhs.0;
    }
}

impl fmt::Display for KeyUsage {
    /// Renders the capability letters the way key listings do, e.g. `SCE`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [(KeyUsage, char); 4] = [
            (KeyUsage::SIGN, 'S'),
            (KeyUsage::CERTIFY, 'C'),
            (KeyUsage::ENCRYPT, 'E'),
            (KeyUsage::AUTHENTICATE, 'A'),
        ];
        for (usage, letter) in LETTERS {
            if self.contains(usage) {
                write!(f, "{}", letter)?;
            }
        }
        if self.contains(KeyUsage::UNKNOWN) {
            write!(f, "?")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyUsage({:#x} {})", self.0, self)
    }
}

/// Public key algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicKeyAlgorithm {
    /// RSA (encrypt or sign)
    Rsa,
    /// RSA encrypt-only (deprecated)
    RsaEncrypt,
    /// RSA sign-only (deprecated)
    RsaSign,
    /// Elgamal encrypt-only
    Elgamal,
    /// DSA
    Dsa,
    /// ECDH
    Ecdh,
    /// ECDSA
    Ecdsa,
    /// Elgamal encrypt or sign (withdrawn)
    ElgamalEncryptSign,
    /// EdDSA
    EdDsa,
    /// Anything else
    Unknown(u8),
}

impl From<u8> for PublicKeyAlgorithm {
    fn from(value: u8) -> Self {
        match value {
            1 => PublicKeyAlgorithm::Rsa,
            2 => PublicKeyAlgorithm::RsaEncrypt,
            3 => PublicKeyAlgorithm::RsaSign,
            16 => PublicKeyAlgorithm::Elgamal,
            17 => PublicKeyAlgorithm::Dsa,
            18 => PublicKeyAlgorithm::Ecdh,
            19 => PublicKeyAlgorithm::Ecdsa,
            20 => PublicKeyAlgorithm::ElgamalEncryptSign,
            22 => PublicKeyAlgorithm::EdDsa,
            other => PublicKeyAlgorithm::Unknown(other),
        }
    }
}

impl From<PublicKeyAlgorithm> for u8 {
    fn from(value: PublicKeyAlgorithm) -> u8 {
        match value {
            PublicKeyAlgorithm::Rsa => 1,
            PublicKeyAlgorithm::RsaEncrypt => 2,
            PublicKeyAlgorithm::RsaSign => 3,
            PublicKeyAlgorithm::Elgamal => 16,
            PublicKeyAlgorithm::Dsa => 17,
            PublicKeyAlgorithm::Ecdh => 18,
            PublicKeyAlgorithm::Ecdsa => 19,
            PublicKeyAlgorithm::ElgamalEncryptSign => 20,
            PublicKeyAlgorithm::EdDsa => 22,
            PublicKeyAlgorithm::Unknown(other) => other,
        }
    }
}

impl PublicKeyAlgorithm {
    /// Get a human-readable name for the algorithm.
    pub fn name(&self) -> String {
        match self {
            PublicKeyAlgorithm::Rsa
            | PublicKeyAlgorithm::RsaEncrypt
            | PublicKeyAlgorithm::RsaSign => "RSA".to_string(),
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncryptSign => {
                "Elgamal".to_string()
            }
            PublicKeyAlgorithm::Dsa => "DSA".to_string(),
            PublicKeyAlgorithm::Ecdh => "ECDH".to_string(),
            PublicKeyAlgorithm::Ecdsa => "ECDSA".to_string(),
            PublicKeyAlgorithm::EdDsa => "EdDSA".to_string(),
            PublicKeyAlgorithm::Unknown(id) => format!("unknown({})", id),
        }
    }
}

/// Details of a revocation signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RevocationInfo {
    /// Creation time of the revocation signature
    pub date: Timestamp,
    /// Algorithm of the revoking key (raw identifier)
    pub algorithm: u8,
    /// Key id of the issuer
    pub keyid: KeyId,
}

/// Who revoked a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationSource {
    /// The key revoked itself (or, for a subkey, the primary revoked it)
    SelfSigned,
    /// A designated revoker issued the revocation
    DesignatedRevoker,
}

/// Revocation state attached to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revocation {
    /// Who issued the revocation
    pub source: RevocationSource,
    /// The revocation signature's details
    pub info: RevocationInfo,
}

/// A designated revoker, authorized by a certification of the revoked key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevocationKey {
    /// Class octet (0x80 must be set, 0x40 marks "sensitive")
    pub class: u8,
    /// Algorithm of the revoking key
    pub algorithm: PublicKeyAlgorithm,
    /// Fingerprint of the revoking key
    pub fingerprint: Fingerprint,
}

/// Which preference list an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKind {
    /// Preferred symmetric ciphers
    Symmetric,
    /// Preferred hash algorithms
    Hash,
    /// Preferred compression algorithms
    Compression,
}

/// One item of a key holder's algorithm preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Preference {
    /// List the item came from
    pub kind: PreferenceKind,
    /// Raw algorithm identifier
    pub value: u8,
}

/// Status of a subkey's cross-certification (the embedded primary key
/// binding signature made by the subkey).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackSig {
    /// Not checked yet or no cross-certification present
    #[default]
    Unchecked,
    /// Verified against the primary key
    Valid,
    /// Present but failed verification
    Invalid,
}

/// Owner trust levels; only `Ultimate` influences key validity here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TrustLevel {
    /// No trust value assigned
    #[default]
    Unknown,
    /// Trust expired
    Expired,
    /// Trust not decided
    Undefined,
    /// Never trust
    Never,
    /// Marginal trust
    Marginal,
    /// Full trust
    Full,
    /// Ultimate trust (own keys)
    Ultimate,
}

/// How key ids are rendered in human readable strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyIdFormat {
    /// 8 hex digits
    Short,
    /// 16 hex digits
    #[default]
    Long,
    /// `0x` followed by 8 hex digits
    ZeroXShort,
    /// `0x` followed by 16 hex digits
    ZeroXLong,
}

impl KeyIdFormat {
    /// Format a key id.
    pub fn format(&self, keyid: &KeyId) -> String {
        match self {
            KeyIdFormat::Short => format!("{:08X}", keyid.short()),
            KeyIdFormat::Long => keyid.to_string(),
            KeyIdFormat::ZeroXShort => format!("0x{:08X}", keyid.short()),
            KeyIdFormat::ZeroXLong => format!("0x{}", keyid),
        }
    }
}

impl FromStr for KeyIdFormat {
    type Err = String;

    /// Parse a key id format from string (case-insensitive).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(KeyIdFormat::Short),
            "long" => Ok(KeyIdFormat::Long),
            "0xshort" => Ok(KeyIdFormat::ZeroXShort),
            "0xlong" => Ok(KeyIdFormat::ZeroXLong),
            _ => Err(format!("unknown keyid format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyid_parse_and_display() {
        let kid: KeyId = "0x1234567890ABCDEF".parse().unwrap();
        assert_eq!(kid.as_u64(), 0x1234_5678_90AB_CDEF);
        assert_eq!(kid.short(), 0x90AB_CDEF);
        assert_eq!(kid.to_string(), "1234567890ABCDEF");
        assert!("1234".parse::<KeyId>().is_err());
    }

    #[test]
    fn test_fingerprint_keyid() {
        let fpr: Fingerprint = "0123 4567 89AB CDEF 0123  4567 89AB CDEF 1122 3344"
            .parse()
            .unwrap();
        assert_eq!(fpr.len(), 20);
        assert_eq!(fpr.keyid(), Some(KeyId::from_u64(0x89AB_CDEF_1122_3344)));

        let v3 = Fingerprint::from_slice(&[7u8; 16]).unwrap();
        assert_eq!(v3.keyid(), None);
        assert!(Fingerprint::from_slice(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_usage_ops() {
        let usage = KeyUsage::SIGN | KeyUsage::CERTIFY;
        assert!(usage.contains(KeyUsage::SIGN));
        assert!(!usage.intersects(KeyUsage::ENCRYPT));
        assert!(usage.is_subset_of(KeyUsage::SELECTABLE));
        assert_eq!(usage.to_string(), "SC");
        assert_eq!((usage & KeyUsage::ENCRYPT), KeyUsage::empty());
    }

    #[test]
    fn test_keyid_format() {
        let kid = KeyId::from_u64(0x0011_2233_4455_6677);
        assert_eq!(KeyIdFormat::Short.format(&kid), "44556677");
        assert_eq!(KeyIdFormat::ZeroXLong.format(&kid), "0x0011223344556677");
        assert_eq!("0xshort".parse::<KeyIdFormat>(), Ok(KeyIdFormat::ZeroXShort));
    }

    #[test]
    fn test_algorithm_roundtrip_ids() {
        for id in [1u8, 2, 3, 16, 17, 18, 19, 20, 22, 99] {
            assert_eq!(u8::from(PublicKeyAlgorithm::from(id)), id);
        }
    }
}
