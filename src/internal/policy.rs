//! Key usage and algorithm policy functions.
//!
//! What an algorithm can do at all, and how key flags octets translate into
//! the usage mask. The merge engine masks every derived usage with
//! [`algorithm_usage`].

use bitfield::bitfield;

use crate::types::{KeyUsage, PublicKeyAlgorithm};

/// The inherent capability set of a public key algorithm.
pub(crate) fn algorithm_usage(algorithm: PublicKeyAlgorithm) -> KeyUsage {
    use PublicKeyAlgorithm::*;

    match algorithm {
        Rsa => KeyUsage::CERTIFY | KeyUsage::SIGN | KeyUsage::ENCRYPT | KeyUsage::AUTHENTICATE,
        RsaEncrypt | Elgamal | ElgamalEncryptSign | Ecdh => KeyUsage::ENCRYPT,
        RsaSign => KeyUsage::CERTIFY | KeyUsage::SIGN,
        Dsa | Ecdsa | EdDsa => KeyUsage::CERTIFY | KeyUsage::SIGN | KeyUsage::AUTHENTICATE,
        Unknown(_) => KeyUsage::empty(),
    }
}

/// True when the algorithm is one this library knows how to use.
pub(crate) fn is_known_algorithm(algorithm: PublicKeyAlgorithm) -> bool {
    !matches!(algorithm, PublicKeyAlgorithm::Unknown(_))
}

bitfield! {
    /// The first octet of a key flags subpacket.
    #[derive(Default, PartialEq, Eq, Copy, Clone)]
    struct KeyFlags(u8);
    impl Debug;

    certify, _: 0;
    sign, _: 1;
    encrypt_comms, _: 2;
    encrypt_storage, _: 3;
    authentication, _: 5;
}

impl<'a> From<&'a [u8]> for KeyFlags {
    fn from(other: &'a [u8]) -> Self {
        other.first().map_or_else(Default::default, |&first| KeyFlags(first))
    }
}

/// Bits of the first key flags octet that map onto a usage.
const KNOWN_KEY_FLAGS: u8 = 0x01 | 0x02 | 0x04 | 0x08 | 0x20;

/// Translate key flags octets into a usage mask.
///
/// Only the first octet counts. Any set bit without a usage adds
/// [`KeyUsage::UNKNOWN`]. Flags that grant nothing (including a zero length
/// subpacket) yield [`KeyUsage::NONE`].
pub(crate) fn parse_key_flags(flags: &[u8]) -> KeyUsage {
    let flags = KeyFlags::from(flags);
    let mut usage = KeyUsage::empty();

    if flags.certify() {
        usage |= KeyUsage::CERTIFY;
    }
    if flags.sign() {
        usage |= KeyUsage::SIGN;
    }
    if flags.encrypt_comms() || flags.encrypt_storage() {
        usage |= KeyUsage::ENCRYPT;
    }
    if flags.authentication() {
        usage |= KeyUsage::AUTHENTICATE;
    }
    if flags.0 & !KNOWN_KEY_FLAGS != 0 {
        usage |= KeyUsage::UNKNOWN;
    }
    if usage.is_empty() {
        usage = KeyUsage::NONE;
    }

    usage
}

/// Mask a derived usage down to what the algorithm can do.
///
/// An empty usage stands for "not stated" and yields the algorithm's full
/// set. An algorithm without a known capability set leaves the stated
/// usage alone. The UNKNOWN and NONE markers never survive.
pub(crate) fn restrict_usage(usage: KeyUsage, algorithm: PublicKeyAlgorithm) -> KeyUsage {
    let allowed = algorithm_usage(algorithm);
    if usage.is_empty() {
        allowed
    } else if allowed.is_empty() {
        usage & KeyUsage::SELECTABLE
    } else {
        usage & allowed
    }
}
