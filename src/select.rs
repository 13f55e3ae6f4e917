//! Picking the key or subkey a lookup returns.
//!
//! Runs on a merged keyblock. Without a usage request the matched key (or
//! the primary key) is returned as is; with one, the newest usable subkey
//! wins and the primary key is the fallback.

use log::{debug, info};

use crate::keyblock::Keyblock;
use crate::packet::KeyRecord;
use crate::types::{KeyUsage, Timestamp};

/// Parameters of one selection.
#[derive(Debug, Clone, Copy)]
pub struct SelectRequest {
    /// Requested capabilities, empty for "any"
    pub usage: KeyUsage,
    /// Return the key the search matched rather than any key of the block
    pub exact: bool,
    /// Signing requests must be served by the primary key
    pub primary_for_signing: bool,
    /// Accept keys created after `now`
    pub ignore_valid_from: bool,
    /// Log a notice when a subkey is chosen over the primary key
    pub verbose: bool,
    /// The current instant
    pub now: Timestamp,
}

impl SelectRequest {
    /// A request for `usage` at `now` with all options off.
    pub fn new(usage: KeyUsage, now: Timestamp) -> Self {
        Self {
            usage,
            exact: false,
            primary_for_signing: false,
            ignore_valid_from: false,
            verbose: false,
            now,
        }
    }
}

/// Choose the key to return from a merged keyblock.
///
/// On success the user id the search matched (if any) is attached to the
/// chosen key record.
///
/// # Returns
/// The packet index of the chosen key, `None` if no key qualifies.
pub fn select_key(keyblock: &mut Keyblock, req: &SelectRequest) -> Option<usize> {
    let found_key = if req.exact { keyblock.matched_key() } else { None };
    let req_usage = req.usage & KeyUsage::SELECTABLE;
    let primary_keyid = keyblock.primary().keyid;

    debug!(
        "select: checking key {} ({}) usage={}",
        primary_keyid,
        if found_key.is_some() { "one" } else { "all" },
        req_usage
    );

    let chosen = if req_usage.is_empty() {
        Some(found_key.unwrap_or(0))
    } else {
        choose_for_usage(keyblock, req, req_usage, found_key)
    };

    let Some(chosen) = chosen else {
        debug!("select: no suitable key found");
        return None;
    };

    let matched_user_id = keyblock
        .matched_user_id()
        .and_then(|i| keyblock.user_id(i))
        .cloned()
        .map(Box::new);
    if let Some(key) = keyblock.key_mut(chosen) {
        debug!("select: using key {}", key.keyid);
        if chosen != 0 && req.verbose {
            info!("using subkey {} instead of primary key {}", key.keyid, primary_keyid);
        }
        key.user_id = matched_user_id;
    }

    Some(chosen)
}

fn choose_for_usage(
    keyblock: &Keyblock,
    req: &SelectRequest,
    req_usage: KeyUsage,
    found_key: Option<usize>,
) -> Option<usize> {
    let req_primary = req.usage.contains(KeyUsage::CERTIFY)
        || (req.primary_for_signing && req.usage.contains(KeyUsage::SIGN));

    let mut latest_date: Timestamp = 0;
    let mut latest: Option<usize> = None;

    let scan_subkeys = !req_primary && found_key.map_or(true, |i| i != 0);
    if scan_subkeys {
        let candidates = match found_key {
            Some(i) => vec![i],
            None => keyblock.subkey_indices(),
        };
        for index in candidates {
            let Some(key) = keyblock.key(index) else {
                continue;
            };
            debug!("select: checking subkey {}", key.keyid);
            if let Some(reason) = rejection(key, req, req_usage) {
                debug!("select: subkey {}", reason);
                continue;
            }
            // A zero creation time is only taken while nothing else qualified.
            if key.created > latest_date || (key.created == 0 && latest_date == 0) {
                latest_date = key.created;
                latest = Some(index);
            }
        }
    }

    if (latest.is_none() && !req.exact) || found_key == Some(0) || req_primary {
        let primary = keyblock.primary();
        match rejection(primary, req, req_usage) {
            Some(reason) => debug!("select: primary key {}", reason),
            None => {
                debug!("select: primary key may be used");
                latest = Some(0);
            }
        }
    }

    latest
}

/// Why a key cannot serve the request, `None` if it can.
fn rejection(key: &KeyRecord, req: &SelectRequest, req_usage: KeyUsage) -> Option<&'static str> {
    if !key.valid {
        Some("not valid")
    } else if key.is_revoked() {
        Some("has been revoked")
    } else if key.is_expired() {
        Some("has expired")
    } else if key.created > req.now && !req.ignore_valid_from {
        Some("not yet valid")
    } else if !(key.usage & KeyUsage::SELECTABLE).intersects(req_usage) {
        Some("usage does not match")
    } else {
        None
    }
}
