//! Error types for the keyresolve library.
//!
//! Lookups distinguish "no such key" from "a key exists but nothing in it is
//! suitable", so callers can report the two situations differently.

use thiserror::Error;

/// The main error type for key resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The store produced no match at all
    #[error("No public key")]
    NoPublicKey,

    /// The store produced no match at all while a secret key was required
    #[error("No secret key")]
    NoSecretKey,

    /// At least one key matched but none passed the usage/exactness filter
    #[error("Unusable public key")]
    UnusablePublicKey,

    /// At least one key matched but none with a usable secret counterpart
    #[error("Unusable secret key")]
    UnusableSecretKey,

    /// A keyblock violates the packet section ordering
    #[error("Malformed keyblock: {0}")]
    Structural(String),

    /// The keyring search failed for a reason other than "not found"
    #[error("Keyring error: {0}")]
    Store(String),

    /// A key acquisition mechanism failed
    #[error("Error retrieving key via {mechanism}: {reason}")]
    Acquisition {
        /// Human readable mechanism name
        mechanism: String,
        /// Why the mechanism failed
        reason: String,
    },

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The secret key enumerator was called again after it reported the end
    #[error("Secret key enumeration already finished")]
    EnumerationFinished,
}

impl Error {
    /// True for the "key does not exist" outcomes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoPublicKey | Error::NoSecretKey)
    }

    /// True for the "key exists but is unsuitable" outcomes.
    pub fn is_unusable(&self) -> bool {
        matches!(self, Error::UnusablePublicKey | Error::UnusableSecretKey)
    }

    /// The not-found error matching the kind of lookup.
    pub(crate) fn not_found(want_secret: bool) -> Self {
        if want_secret {
            Error::NoSecretKey
        } else {
            Error::NoPublicKey
        }
    }

    /// The unusable error matching the kind of lookup.
    pub(crate) fn unusable(want_secret: bool) -> Self {
        if want_secret {
            Error::UnusableSecretKey
        } else {
            Error::UnusablePublicKey
        }
    }
}

/// A specialized Result type for key resolution.
pub type Result<T> = std::result::Result<T, Error>;
