//! # keyresolve
//!
//! OpenPGP key resolution: find the key or subkey that should be used for an
//! operation, given a key id, fingerprint or user id.
//!
//! The library covers the part of an OpenPGP implementation that sits
//! between the keyring and the crypto:
//!
//! - **Merging**: derive validity, revocation, usage, expiration and the
//!   primary user id of every key from its self-signatures
//! - **Selection**: pick the newest usable subkey for a requested capability,
//!   falling back to the primary key
//! - **Lookup**: search a key store by one or more names, skipping unusable
//!   keys, with key and identity caches in front
//! - **Auto-key-locate**: fetch missing keys for mail addresses through
//!   configured acquisition mechanisms
//!
//! Storage, packet parsing, signature arithmetic, secret key availability,
//! owner trust and network access are supplied by the caller through the
//! traits in [`services`]. [`MemoryKeyring`] is a ready-made store.
//!
//! ## Quick Start
//!
//! ```
//! use keyresolve::{
//!     Config, KeyRecord, KeyUsage, Keyblock, MemoryKeyring, Packet, PublicKeyAlgorithm,
//!     Session, SignatureRecord, SignatureType, UserIdRecord, Verification, Verifier,
//! };
//!
//! struct AcceptAll;
//!
//! impl Verifier for AcceptAll {
//!     fn verify(&self, _: &Keyblock, _: usize, _: Option<&KeyRecord>) -> Verification {
//!         Verification::Verified
//!     }
//!
//!     fn verify_backsig(&self, _: &KeyRecord, _: &KeyRecord, _: &SignatureRecord) -> Verification {
//!         Verification::Verified
//!     }
//! }
//!
//! # fn main() -> keyresolve::Result<()> {
//! let fpr = "0123456789ABCDEF0123456789ABCDEF01234567".parse()?;
//! let primary = KeyRecord::from_fingerprint(fpr, PublicKeyAlgorithm::EdDsa, 1_600_000_000)
//!     .ok_or_else(|| keyresolve::Error::InvalidInput("fingerprint".into()))?;
//! let selfsig = SignatureRecord::new(SignatureType::CertUserId(0x13), primary.keyid, 1_600_000_000);
//! let keyblock = Keyblock::new(vec![
//!     Packet::PrimaryKey(primary),
//!     Packet::UserId(UserIdRecord::new("Alice <alice@example.org>")),
//!     Packet::Signature(selfsig),
//! ])?;
//!
//! let keyring = MemoryKeyring::from_keyblocks([keyblock]);
//! let mut session = Session::new(&keyring, &AcceptAll, Config::default());
//! let (found, _ctx) = session.key_byname(&["alice@example.org"], KeyUsage::SIGN, false, false)?;
//! assert!(found.key().valid);
//! assert_eq!(session.user_id(&found.key().keyid), "Alice <alice@example.org>");
//! # Ok(())
//! # }
//! ```
//!
//! ## Design
//!
//! All state lives in a [`Session`]: the collaborators, the [`Config`] and
//! the caches. Lookups are synchronous and single-threaded. A
//! [`LookupContext`] owns its store cursor; dropping it releases the cursor.

// Modules
mod error;
mod types;
mod internal;

mod packet;
mod keyblock;
pub mod services;
mod cache;
pub mod merge;
mod select;
mod descriptor;
mod lookup;
mod session;
mod locate;
mod enumerate;
mod config;
mod keyring;

// Re-export error types
pub use error::{Error, Result};

// Re-export basic types
pub use types::{
    Timestamp,
    KeyId,
    Fingerprint,
    KeyUsage,
    PublicKeyAlgorithm,
    RevocationInfo,
    RevocationSource,
    Revocation,
    RevocationKey,
    PreferenceKind,
    Preference,
    BackSig,
    TrustLevel,
    KeyIdFormat,
};

// Re-export packet records
pub use packet::{
    SignatureType,
    Subpacket,
    SignatureRecord,
    KeyRecord,
    UserIdRecord,
    Packet,
};

// Re-export keyblock types
pub use keyblock::{Keyblock, MatchKind};

// Re-export collaborator interfaces
pub use services::{
    SearchMode,
    SearchHit,
    StoreCursor,
    KeyStore,
    Verification,
    Verifier,
    SecretKeyBackend,
    TrustService,
    KeyAcquirer,
    IssuerLookup,
    NoSecretKeys,
    NoOwnerTrust,
};

// Re-export caches
pub use cache::{KeyCache, IdentityCache, DEFAULT_CACHE_CAPACITY, USER_ID_NOT_FOUND};

// Re-export merging and selection
pub use merge::{merge_keyblock, MergeContext};
pub use select::{select_key, SelectRequest};

// Re-export search descriptors
pub use descriptor::{
    Criterion,
    SearchDescriptor,
    SkipPredicate,
    classify,
    skip_unusable,
};

// Re-export lookup and resolution API
pub use lookup::{FoundKey, LookupContext};
pub use session::Session;
pub use locate::{AutoKeyLocate, Mechanism};
pub use enumerate::SecretKeys;
pub use config::Config;

// Re-export the in-memory keyring
pub use keyring::MemoryKeyring;
