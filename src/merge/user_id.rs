//! Applying a user id's governing self-signature and picking the primary
//! user id.

use std::cmp::Ordering;

use crate::internal::parse_key_flags;
use crate::keyblock::Keyblock;
use crate::packet::{SignatureRecord, UserIdRecord};
use crate::types::{KeyUsage, Preference, PreferenceKind, Timestamp};

/// Clear everything a previous merge derived for a user id.
pub(super) fn reset(uid: &mut UserIdRecord) {
    uid.created = 0;
    uid.revoked = false;
    uid.expired = false;
    uid.expiredate = 0;
    uid.primary_candidate = false;
    uid.is_primary = false;
    uid.staged_usage = KeyUsage::empty();
    uid.staged_expire = 0;
    uid.prefs.clear();
    uid.mdc = false;
    uid.ks_modify = true;
    uid.selfsig_version = 0;
}

/// Copy the data of the user id's latest self-signature onto it.
///
/// A revoked or expired user id keeps a creation time of 0, which marks it
/// invalid for the aggregation and primary selection steps.
pub(super) fn fixup(uid: &mut UserIdRecord, sig: &SignatureRecord, key_created: Timestamp, now: Timestamp) {
    uid.created = 0;

    if sig.is_uid_revocation() {
        uid.revoked = true;
        return;
    }
    uid.revoked = false;

    uid.expiredate = sig.expiredate();
    if sig.is_expired(now) {
        uid.expired = true;
        return;
    }
    uid.expired = false;

    uid.created = sig.created;
    uid.selfsig_version = sig.version;

    uid.staged_usage = match sig.key_flags() {
        Some(flags) => parse_key_flags(flags),
        None => KeyUsage::empty(),
    };
    uid.staged_expire = match sig.key_expiration_time() {
        Some(offset) if offset != 0 => key_created.saturating_add(offset),
        _ => 0,
    };

    uid.primary_candidate = sig.is_primary();

    uid.prefs.clear();
    for kind in [PreferenceKind::Symmetric, PreferenceKind::Hash, PreferenceKind::Compression] {
        uid.prefs.extend(
            sig.preferences(kind)
                .iter()
                .map(|&value| Preference { kind, value }),
        );
    }

    uid.mdc = sig.features().first().is_some_and(|f| f & 0x01 != 0);
    uid.ks_modify = !sig.keyserver_preferences().first().is_some_and(|f| f & 0x80 != 0);
}

/// Deterministic order on user ids: longer text first, then the bytes.
///
/// `Ordering::Greater` means `a` wins a tie against `b`.
pub fn cmp_user_ids(a: &UserIdRecord, b: &UserIdRecord) -> Ordering {
    a.name
        .len()
        .cmp(&b.name.len())
        .then_with(|| a.name.cmp(&b.name))
}

/// Mark exactly one user id of the keyblock primary.
///
/// Preference goes to the latest valid user id flagged as primary
/// candidate, then to the latest valid user id. Equal creation times are
/// decided by [`cmp_user_ids`]. Without any valid user id the comparator
/// alone decides.
pub(super) fn select_primary(keyblock: &mut Keyblock) {
    let indices = keyblock.user_id_indices();
    if indices.is_empty() {
        return;
    }

    let mut flagged: Option<(usize, Timestamp)> = None;
    let mut latest: Option<(usize, Timestamp)> = None;
    for &index in &indices {
        let Some(uid) = keyblock.user_id(index) else {
            continue;
        };
        let slot = if uid.primary_candidate {
            &mut flagged
        } else {
            &mut latest
        };
        match *slot {
            Some((_, date)) if uid.created < date => {}
            Some((best, date)) if uid.created == date => {
                if let Some(current) = keyblock.user_id(best) {
                    if cmp_user_ids(uid, current) == Ordering::Greater {
                        *slot = Some((index, date));
                    }
                }
            }
            _ if uid.created > 0 => *slot = Some((index, uid.created)),
            _ => {}
        }
    }

    let chosen = flagged.or(latest).map(|(i, _)| i).or_else(|| {
        indices.iter().copied().reduce(|best, index| {
            match (keyblock.user_id(index), keyblock.user_id(best)) {
                (Some(a), Some(b)) if cmp_user_ids(a, b) == Ordering::Greater => index,
                _ => best,
            }
        })
    });

    for index in indices {
        if let Some(uid) = keyblock.user_id_mut(index) {
            uid.is_primary = Some(index) == chosen;
        }
    }
}
