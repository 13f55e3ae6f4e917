//! Options consumed by key resolution.

use chrono::{DateTime, Utc};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::locate::AutoKeyLocate;
use crate::types::KeyIdFormat;

/// Configuration for a [`crate::Session`].
///
/// # Example
/// ```
/// use keyresolve::Config;
///
/// let config = Config::default()
///     .with_default_keys(["alice@example.org"])
///     .with_allow_non_selfsigned_uid(true);
/// assert_eq!(config.default_keys, vec!["alice@example.org".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Treat keys whose user ids carry no self-signature as valid
    pub allow_non_selfsigned_uid: bool,
    /// Accept keys whose creation time lies in the future
    pub ignore_valid_from: bool,
    /// Serve signing requests with the primary key only
    pub pgp_compat_primary_signing: bool,
    /// Candidate default secret keys, first usable one wins
    pub default_keys: Vec<String>,
    /// Further secret keys for the secret key enumerator
    pub secret_keys_to_try: Vec<String>,
    /// Key acquisition mechanisms for by-name lookups
    pub auto_key_locate: AutoKeyLocate,
    /// Configured keyserver, used by the `keyserver` mechanism
    pub keyserver: Option<String>,
    /// Capacity of the resolved key cache
    pub key_cache_capacity: usize,
    /// Capacity of the display identity cache
    pub identity_cache_capacity: usize,
    /// How key ids are rendered in identity strings
    pub keyid_format: KeyIdFormat,
    /// Log informational notices
    pub verbose: bool,
    /// Fixed "now"; the wall clock is used when absent
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_non_selfsigned_uid: false,
            ignore_valid_from: false,
            pgp_compat_primary_signing: false,
            default_keys: Vec::new(),
            secret_keys_to_try: Vec::new(),
            auto_key_locate: AutoKeyLocate::default(),
            keyserver: None,
            key_cache_capacity: DEFAULT_CACHE_CAPACITY,
            identity_cache_capacity: DEFAULT_CACHE_CAPACITY,
            keyid_format: KeyIdFormat::default(),
            verbose: false,
            reference_time: None,
        }
    }
}

impl Config {
    pub fn with_allow_non_selfsigned_uid(mut self, allow: bool) -> Self {
        self.allow_non_selfsigned_uid = allow;
        self
    }

    pub fn with_ignore_valid_from(mut self, ignore: bool) -> Self {
        self.ignore_valid_from = ignore;
        self
    }

    pub fn with_pgp_compat_primary_signing(mut self, enabled: bool) -> Self {
        self.pgp_compat_primary_signing = enabled;
        self
    }

    pub fn with_default_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_secret_keys_to_try<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secret_keys_to_try = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_key_locate(mut self, akl: AutoKeyLocate) -> Self {
        self.auto_key_locate = akl;
        self
    }

    pub fn with_keyserver(mut self, keyserver: impl Into<String>) -> Self {
        self.keyserver = Some(keyserver.into());
        self
    }

    pub fn with_key_cache_capacity(mut self, capacity: usize) -> Self {
        self.key_cache_capacity = capacity;
        self
    }

    pub fn with_identity_cache_capacity(mut self, capacity: usize) -> Self {
        self.identity_cache_capacity = capacity;
        self
    }

    pub fn with_keyid_format(mut self, format: KeyIdFormat) -> Self {
        self.keyid_format = format;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Pin "now" to a fixed instant.
    pub fn with_reference_time(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }
}
