//! The public key resolution API.
//!
//! A [`Session`] bundles the collaborators (store, verifier, secret key
//! backend, trust service, acquirer), the configuration and the two caches.
//! All lookups go through it.

use std::cell::Cell;

use log::{debug, error};

use crate::cache::{IdentityCache, KeyCache, USER_ID_NOT_FOUND};
use crate::config::Config;
use crate::descriptor::{classify, skip_unusable, SearchDescriptor};
use crate::enumerate::SecretKeys;
use crate::error::{Error, Result};
use crate::internal::current_timestamp;
use crate::keyblock::Keyblock;
use crate::lookup::{fetch_unmerged, Engine, FoundKey, LookupContext, StoreIssuerLookup};
use crate::merge::{merge_keyblock, MergeContext};
use crate::packet::KeyRecord;
use crate::services::{
    KeyAcquirer, KeyStore, NoOwnerTrust, NoSecretKeys, SearchMode, SecretKeyBackend,
    TrustService, Verifier,
};
use crate::types::{Fingerprint, KeyId, KeyUsage, Timestamp};

/// Key resolution over one key store.
///
/// # Example
/// ```no_run
/// use keyresolve::{Config, KeyUsage, MemoryKeyring, Session, Verifier};
///
/// fn resolve(keyring: &MemoryKeyring, verifier: &dyn Verifier) -> keyresolve::Result<()> {
///     let mut session = Session::new(keyring, verifier, Config::default());
///     let (found, _ctx) = session.key_byname(&["alice@example.org"], KeyUsage::ENCRYPT, false, false)?;
///     println!("encrypting to {}", found.key().keyid);
///     Ok(())
/// }
/// ```
pub struct Session<'a> {
    store: &'a dyn KeyStore,
    verifier: &'a dyn Verifier,
    secrets: &'a dyn SecretKeyBackend,
    trust: &'a dyn TrustService,
    acquirer: Option<&'a dyn KeyAcquirer>,
    config: Config,
    key_cache: KeyCache,
    identity_cache: IdentityCache,
    default_key_announced: Cell<bool>,
}

impl<'a> Session<'a> {
    /// Create a session without secret keys, owner trust or acquisition.
    pub fn new(store: &'a dyn KeyStore, verifier: &'a dyn Verifier, config: Config) -> Self {
        Self {
            store,
            verifier,
            secrets: &NoSecretKeys,
            trust: &NoOwnerTrust,
            acquirer: None,
            key_cache: KeyCache::new(config.key_cache_capacity),
            identity_cache: IdentityCache::new(config.identity_cache_capacity),
            config,
            default_key_announced: Cell::new(false),
        }
    }

    pub fn with_secret_backend(mut self, secrets: &'a dyn SecretKeyBackend) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_trust_service(mut self, trust: &'a dyn TrustService) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_acquirer(mut self, acquirer: &'a dyn KeyAcquirer) -> Self {
        self.acquirer = Some(acquirer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.key_cache
    }

    pub fn identity_cache(&self) -> &IdentityCache {
        &self.identity_cache
    }

    pub(crate) fn acquirer(&self) -> Option<&'a dyn KeyAcquirer> {
        self.acquirer
    }

    fn now(&self) -> Timestamp {
        current_timestamp(self.config.reference_time)
    }

    /// Run the search loop of `ctx` against this session's services.
    fn run(&mut self, ctx: &mut LookupContext<'a>) -> Result<FoundKey> {
        let now = self.now();
        let issuers = StoreIssuerLookup::new(self.store, &self.key_cache);
        let mut engine = Engine {
            merge: MergeContext {
                verifier: self.verifier,
                trust: self.trust,
                issuers: &issuers,
                allow_non_selfsigned_uid: self.config.allow_non_selfsigned_uid,
                verbose: self.config.verbose,
                now,
            },
            secrets: self.secrets,
            identities: &mut self.identity_cache,
            primary_for_signing: self.config.pgp_compat_primary_signing,
            ignore_valid_from: self.config.ignore_valid_from,
        };
        ctx.run(&mut engine)
    }

    /// Exact lookup by long key id, bypassing the key cache.
    fn lookup_keyid(&mut self, keyid: &KeyId, usage: KeyUsage, want_secret: bool) -> Result<FoundKey> {
        let mut ctx = LookupContext::new(
            self.store,
            vec![SearchDescriptor::long_keyid(*keyid)],
            usage,
            want_secret,
        )
        .with_exact(true);
        self.run(&mut ctx)
    }

    /// Look up a key by key id.
    ///
    /// The key cache is consulted first (without regard to `usage`). A key
    /// found in the store is added to the cache.
    ///
    /// # Returns
    /// The key, [`Error::UnusablePublicKey`] if it exists but does not
    /// qualify, [`Error::NoPublicKey`] otherwise.
    pub fn get_pubkey(&mut self, keyid: &KeyId, usage: KeyUsage) -> Result<KeyRecord> {
        if let Some(cached) = self.key_cache.lookup(keyid) {
            debug!("key cache hit for {}", keyid);
            return Ok(cached.clone());
        }

        match self.lookup_keyid(keyid, usage, false) {
            Ok(found) => {
                let key = found.into_key();
                self.key_cache.insert(&key);
                Ok(key)
            }
            Err(e) if e.is_unusable() => Err(e),
            Err(_) => Err(Error::NoPublicKey),
        }
    }

    /// Fetch the primary key with this key id straight from the store.
    ///
    /// Nothing is merged, so validity, usage and expiry are not derived and
    /// the result is not cached. Subkey ids do not match.
    pub fn get_pubkey_fast(&self, keyid: &KeyId) -> Result<KeyRecord> {
        if let Some(cached) = self.key_cache.lookup_primary(keyid) {
            return Ok(cached.clone());
        }

        let keyblock = fetch_unmerged(self.store, SearchDescriptor::long_keyid(*keyid))?;
        let primary = keyblock.primary();
        if primary.keyid == *keyid {
            Ok(primary.clone())
        } else {
            Err(Error::NoPublicKey)
        }
    }

    /// The merged keyblock containing the key with this key id.
    pub fn get_pubkeyblock(&mut self, keyid: &KeyId) -> Result<Keyblock> {
        let mut ctx = LookupContext::new(
            self.store,
            vec![SearchDescriptor::long_keyid(*keyid)],
            KeyUsage::empty(),
            false,
        );
        self.run(&mut ctx).map(FoundKey::into_keyblock)
    }

    /// Look up a key by key id, requiring its secret counterpart.
    pub fn get_seckey(&mut self, keyid: &KeyId, usage: KeyUsage) -> Result<KeyRecord> {
        let key = self.lookup_keyid(keyid, usage, true)?.into_key();
        if self.secrets.probe_one(&key) {
            Ok(key)
        } else {
            Err(Error::NoSecretKey)
        }
    }

    /// Look up a key by user supplied names.
    ///
    /// Each name is classified into a descriptor; a keyblock matching any
    /// of them qualifies. Without names every keyblock matches. Unless
    /// `include_unusable` is set, keyblocks found by name (not by key id or
    /// fingerprint) are skipped when revoked, expired or disabled.
    ///
    /// # Arguments
    /// * `names` - Search strings
    /// * `usage` - Requested capabilities
    /// * `want_secret` - Only accept keys with a secret counterpart
    /// * `include_unusable` - Do not skip unusable keys
    ///
    /// # Returns
    /// The key together with the context, which can be passed to
    /// [`Session::getkey_next`] for further matches.
    pub fn key_byname<S: AsRef<str>>(
        &mut self,
        names: &[S],
        usage: KeyUsage,
        want_secret: bool,
        include_unusable: bool,
    ) -> Result<(FoundKey, LookupContext<'a>)> {
        let descriptors = if names.is_empty() {
            let all = SearchDescriptor::all();
            vec![if include_unusable { all } else { all.with_skip(skip_unusable) }]
        } else {
            names
                .iter()
                .map(|name| {
                    let desc = classify(name.as_ref())?;
                    Ok(if include_unusable || desc.names_key() {
                        desc
                    } else {
                        desc.with_skip(skip_unusable)
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        let mut ctx = LookupContext::new(self.store, descriptors, usage, want_secret);
        let found = self.run(&mut ctx)?;
        Ok((found, ctx))
    }

    /// Look up by several names, including unusable keys.
    pub fn getkey_bynames<S: AsRef<str>>(
        &mut self,
        names: &[S],
        usage: KeyUsage,
        want_secret: bool,
    ) -> Result<(FoundKey, LookupContext<'a>)> {
        self.key_byname(names, usage, want_secret, true)
    }

    /// Look up by one name.
    ///
    /// A secret lookup without a name uses the first usable default key.
    /// Without any name all keyblocks are searched and unusable ones are
    /// skipped.
    pub fn getkey_byname(
        &mut self,
        name: Option<&str>,
        usage: KeyUsage,
        want_secret: bool,
    ) -> Result<(FoundKey, LookupContext<'a>)> {
        let default_key = if want_secret && name.is_none() {
            self.parse_def_secret_key()
        } else {
            None
        };

        match (name, default_key) {
            (Some(name), _) => self.key_byname(&[name], usage, want_secret, true),
            (None, Some(def)) => self.key_byname(&[def], usage, want_secret, true),
            (None, None) => self.key_byname::<&str>(&[], usage, want_secret, false),
        }
    }

    /// Continue a search started by one of the by-name lookups.
    ///
    /// The cursor's result caching is disabled first so that an exact
    /// search cannot keep returning the cached match.
    pub fn getkey_next(&mut self, ctx: &mut LookupContext<'a>) -> Result<FoundKey> {
        ctx.disable_caching();
        self.run(ctx)
    }

    /// Release a lookup context.
    pub fn getkey_end(&mut self, ctx: LookupContext<'a>) {
        ctx.end();
    }

    /// Look up a key by v3 (16 byte) or v4 (20 byte) fingerprint.
    pub fn get_pubkey_byfprint(&mut self, fingerprint: &Fingerprint) -> Result<FoundKey> {
        if fingerprint.len() != 16 && fingerprint.len() != 20 {
            return Err(Error::InvalidInput(format!(
                "fingerprint of {} bytes",
                fingerprint.len()
            )));
        }
        let mut ctx = LookupContext::new(
            self.store,
            vec![SearchDescriptor::fingerprint(fingerprint.clone())],
            KeyUsage::empty(),
            false,
        )
        .with_exact(true);
        self.run(&mut ctx)
    }

    /// The unmerged primary key of the keyblock containing this
    /// fingerprint. Not cached.
    pub fn get_pubkey_byfprint_fast(&self, fingerprint: &Fingerprint) -> Result<KeyRecord> {
        let keyblock = fetch_unmerged(self.store, SearchDescriptor::fingerprint(fingerprint.clone()))?;
        Ok(keyblock.primary().clone())
    }

    /// The first configured default key whose primary key has a secret
    /// counterpart.
    ///
    /// Invalid entries are logged and skipped. A store failure ends the
    /// scan without a result.
    pub fn parse_def_secret_key(&self) -> Option<String> {
        let mut handle = None;
        let mut chosen = None;

        for name in &self.config.default_keys {
            let desc = match classify(name) {
                Ok(desc) => desc,
                Err(_) => {
                    error!("Invalid value ('{}') for default key", name);
                    continue;
                }
            };

            let cursor = handle.get_or_insert_with(|| self.store.cursor());
            match cursor.search(std::slice::from_ref(&desc), SearchMode::First) {
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(e) => {
                    error!("Error reading from keyring: {}", e);
                    break;
                }
            }

            let keyblock = match cursor.keyblock() {
                Ok(kb) => kb,
                Err(e) => {
                    error!("error reading keyblock: {}", e);
                    continue;
                }
            };

            if self.secrets.probe_one(keyblock.primary()) {
                if !self.default_key_announced.get() {
                    debug!("Using {} as default secret key", name);
                }
                chosen = Some(name.clone());
                break;
            }
        }

        self.default_key_announced.set(true);
        chosen
    }

    /// The default secret key: the configured default if one is usable,
    /// otherwise the first usable secret key in the store.
    pub fn get_seckey_default(&mut self, usage: KeyUsage) -> Result<KeyRecord> {
        let result = match self.parse_def_secret_key() {
            Some(def) => self.key_byname(&[def], usage, true, true),
            None => self.key_byname::<&str>(&[], usage, true, false),
        };
        result.map(|(found, _)| found.into_key())
    }

    /// Whether any key with this key id has a secret counterpart.
    pub fn have_secret_key_with_kid(&self, keyid: &KeyId) -> bool {
        let desc = [SearchDescriptor::long_keyid(*keyid)];
        let mut cursor = self.store.cursor();
        let mut mode = SearchMode::First;

        loop {
            match cursor.search(&desc, mode) {
                Ok(Some(_)) => {}
                _ => return false,
            }
            mode = SearchMode::Next;

            let keyblock = match cursor.keyblock() {
                Ok(kb) => kb,
                Err(e) => {
                    error!("error reading keyblock: {}", e);
                    return false;
                }
            };
            let matched = keyblock.matched_key().and_then(|i| keyblock.key(i));
            if matched.is_some_and(|key| self.secrets.probe_one(key)) {
                return true;
            }
        }
    }

    /// Merge self-signature data into a keyblock obtained elsewhere.
    pub fn merge_keys_and_selfsig(&self, keyblock: &mut Keyblock) -> Result<()> {
        let issuers = StoreIssuerLookup::new(self.store, &self.key_cache);
        let ctx = MergeContext {
            verifier: self.verifier,
            trust: self.trust,
            issuers: &issuers,
            allow_non_selfsigned_uid: self.config.allow_non_selfsigned_uid,
            verbose: self.config.verbose,
            now: self.now(),
        };
        merge_keyblock(keyblock, &ctx)
    }

    /// Permanently turn off the key cache.
    pub fn disable_caches(&mut self) {
        self.key_cache.disable();
    }

    /// Enumerate the secret keys of the default and configured keys.
    pub fn secret_keys(&mut self) -> SecretKeys<'_, 'a> {
        SecretKeys::new(self)
    }

    /// Display identity of a key id, resolving the key once if needed.
    fn identity_for_keyid(&mut self, keyid: &KeyId) -> Option<String> {
        for pass in 0..2 {
            if let Some(name) = self.identity_cache.lookup_keyid(keyid) {
                return Some(name.to_string());
            }
            if pass == 0 && self.lookup_keyid(keyid, KeyUsage::empty(), false).is_err() {
                break;
            }
        }
        None
    }

    /// `"<keyid> <user id>"` with the key id in the configured format, or
    /// `"<keyid> [?]"` if the key cannot be found.
    pub fn user_id_string(&mut self, keyid: &KeyId) -> String {
        let shown = self.config.keyid_format.format(keyid);
        match self.identity_for_keyid(keyid) {
            Some(name) => format!("{} {}", shown, name),
            None => format!("{} [?]", shown),
        }
    }

    /// Like [`Session::user_id_string`] with the full 16 digit key id.
    pub fn long_user_id_string(&mut self, keyid: &KeyId) -> String {
        match self.identity_for_keyid(keyid) {
            Some(name) => format!("{} {}", keyid, name),
            None => format!("{} [?]", keyid),
        }
    }

    /// The primary user id of the key, or `"[User ID not found]"`.
    pub fn user_id(&mut self, keyid: &KeyId) -> String {
        self.identity_for_keyid(keyid)
            .unwrap_or_else(|| USER_ID_NOT_FOUND.to_string())
    }

    /// The primary user id of the key with this fingerprint, or
    /// `"[User ID not found]"`.
    pub fn user_id_by_fingerprint(&mut self, fingerprint: &Fingerprint) -> String {
        for pass in 0..2 {
            if let Some(name) = self.identity_cache.lookup_fingerprint(fingerprint) {
                return name.to_string();
            }
            if pass == 0 && self.get_pubkey_byfprint(fingerprint).is_err() {
                break;
            }
        }
        USER_ID_NOT_FOUND.to_string()
    }
}
