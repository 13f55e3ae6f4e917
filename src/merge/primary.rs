//! Primary key pass: direct key signatures, revocations, user ids and the
//! aggregated usage and expiration of the primary key.

use log::{debug, info};

use super::{revocation_from, user_id, MergeContext};
use crate::error::{Error, Result};
use crate::internal::{parse_key_flags, restrict_usage};
use crate::keyblock::Keyblock;
use crate::packet::{Packet, UserIdRecord};
use crate::services::Verification;
use crate::types::{KeyUsage, Revocation, RevocationKey, RevocationSource, Timestamp, TrustLevel};

/// Merge the primary key and its user ids.
///
/// # Returns
/// The primary key's revocation, if any.
pub(super) fn merge_primary(
    keyblock: &mut Keyblock,
    ctx: &MergeContext<'_>,
) -> Result<Option<Revocation>> {
    if !matches!(keyblock.packets().first(), Some(Packet::PrimaryKey(_))) {
        return Err(Error::Structural("first packet is not a primary key".to_string()));
    }

    reset(keyblock);

    let pk = keyblock.primary().clone();
    let kid = pk.keyid;

    let mut key_expire: Timestamp = 0;
    let mut key_expire_seen = false;
    if pk.version < 4 {
        key_expire = pk.max_expiredate;
        key_expire_seen = true;
    }

    // Pass 1: signatures directly on the primary key.
    let mut revocation: Option<Revocation> = None;
    let mut revokers: Vec<RevocationKey> = Vec::new();
    let mut direct: Option<usize> = None;
    let mut sigdate: Timestamp = 0;
    let mut sigversion: u8 = 0;

    for index in keyblock.primary_signatures() {
        let Some(sig) = keyblock.signature(index) else {
            continue;
        };
        if sig.issuer != kid {
            continue;
        }
        if ctx.verifier.verify(keyblock, index, None) != Verification::Verified {
            debug!("{}: self-signature {} did not verify", kid, index);
            continue;
        }
        if sig.is_key_revocation() {
            revocation = Some(revocation_from(sig, RevocationSource::SelfSigned));
        } else if sig.is_direct_key() {
            revokers.extend(sig.revocation_keys().cloned());
            if sig.created >= sigdate && !sig.is_expired(ctx.now) {
                sigdate = sig.created;
                direct = Some(index);
                sigversion = sigversion.max(sig.version);
            }
        }
    }

    let mut unique: Vec<RevocationKey> = Vec::with_capacity(revokers.len());
    for revoker in revokers {
        if !unique.contains(&revoker) {
            unique.push(revoker);
        }
    }
    let revokers = unique;

    let mut valid = false;
    let mut key_usage = KeyUsage::empty();
    if let Some(sig) = direct.and_then(|i| keyblock.signature(i)) {
        if let Some(flags) = sig.key_flags() {
            key_usage = parse_key_flags(flags);
        }
        if let Some(offset) = sig.key_expiration_time().filter(|o| *o != 0) {
            key_expire = pk.created.saturating_add(offset);
            key_expire_seen = true;
        }
        valid = true;
    }

    // Pass 1.5: revocations issued by designated revokers.
    let mut maybe_revoked = false;
    if revocation.is_none() && !revokers.is_empty() {
        for index in keyblock.primary_signatures() {
            let Some(sig) = keyblock.signature(index) else {
                continue;
            };
            if !sig.is_key_revocation() || sig.issuer == kid {
                continue;
            }
            match check_designated_revoker(keyblock, index, &revokers, ctx) {
                Verification::Verified => {
                    revocation = Some(revocation_from(sig, RevocationSource::DesignatedRevoker));
                    break;
                }
                Verification::IssuerUnavailable => {
                    debug!("{}: designated revoker {} unavailable", kid, sig.issuer);
                    maybe_revoked = true;
                }
                Verification::Failed => {}
            }
        }
    }

    // Pass 2: the latest self-signature of every user id and attribute.
    let uid_section = keyblock.user_id_section_start()..keyblock.subkey_section_start();
    let groups: Vec<usize> = uid_section
        .filter(|&index| keyblock.user_id(index).is_some())
        .collect();
    let mut governing: Vec<(usize, usize)> = Vec::new();
    for &uid_index in &groups {
        let mut chosen: Option<usize> = None;
        sigdate = 0;
        for index in keyblock.signatures_after(uid_index) {
            let Some(sig) = keyblock.signature(index) else {
                continue;
            };
            if sig.issuer != kid {
                continue;
            }
            if ctx.verifier.verify(keyblock, index, None) != Verification::Verified {
                debug!("{}: user id self-signature {} did not verify", kid, index);
                continue;
            }
            if (sig.is_uid_certification() || sig.is_uid_revocation()) && sig.created >= sigdate {
                sigdate = sig.created;
                chosen = Some(index);
                sigversion = sigversion.max(sig.version);
            }
        }
        if let Some(sig_index) = chosen {
            governing.push((uid_index, sig_index));
        }
    }

    for (uid_index, sig_index) in governing {
        let Some(sig) = keyblock.signature(sig_index).cloned() else {
            continue;
        };
        if let Some(uid) = keyblock.user_id_mut(uid_index) {
            user_id::fixup(uid, &sig, pk.created, ctx.now);
            valid = true;
        }
    }

    if !valid && ctx.allow_non_selfsigned_uid {
        if ctx.verbose {
            info!("Invalid key {} made valid by allowing non self-signed user ids", kid);
        }
        valid = true;
    }

    if !valid && signed_by_ultimately_trusted(keyblock, &groups, ctx) {
        info!("Key {} made valid by an ultimately trusted signature", kid);
        valid = true;
    }

    // Usage: direct key signature, then latest user id, then the algorithm.
    if key_usage.is_empty() {
        key_usage = latest_uid_value(keyblock, &groups, |u| u.staged_usage, KeyUsage::is_empty)
            .unwrap_or_default();
    }
    let key_usage = restrict_usage(key_usage, pk.algorithm);

    if !key_expire_seen {
        key_expire = latest_uid_value(keyblock, &groups, |u| u.staged_expire, |e| *e == 0).unwrap_or(0);
    }
    if key_expire == 0 || (pk.max_expiredate != 0 && key_expire > pk.max_expiredate) {
        key_expire = pk.max_expiredate;
    }

    let primary = keyblock.primary_mut();
    primary.main_keyid = Some(kid);
    primary.valid = valid;
    primary.revoked = revocation;
    primary.maybe_revoked = maybe_revoked;
    primary.revokers = revokers;
    primary.selfsig_version = sigversion;
    primary.usage = key_usage | KeyUsage::CERTIFY;
    primary.expiredate = key_expire;
    primary.has_expired = (key_expire != 0 && key_expire < ctx.now).then_some(key_expire);

    user_id::select_primary(keyblock);

    Ok(revocation)
}

fn reset(keyblock: &mut Keyblock) {
    let primary = keyblock.primary_mut();
    primary.valid = false;
    primary.revoked = None;
    primary.maybe_revoked = false;
    primary.revokers.clear();
    primary.has_expired = None;
    primary.expiredate = 0;

    for index in keyblock.user_id_section_start()..keyblock.subkey_section_start() {
        if let Some(uid) = keyblock.user_id_mut(index) {
            user_id::reset(uid);
        }
    }
}

/// Check a third-party key revocation against the designated revokers.
fn check_designated_revoker(
    keyblock: &Keyblock,
    index: usize,
    revokers: &[RevocationKey],
    ctx: &MergeContext<'_>,
) -> Verification {
    let Some(sig) = keyblock.signature(index) else {
        return Verification::Failed;
    };
    let Some(revoker) = revokers
        .iter()
        .find(|r| r.class & 0x80 != 0 && r.fingerprint.keyid() == Some(sig.issuer))
    else {
        return Verification::Failed;
    };

    match ctx.issuers.by_fingerprint(&revoker.fingerprint) {
        Some(issuer) => ctx.verifier.verify(keyblock, index, Some(&issuer)),
        None => Verification::IssuerUnavailable,
    }
}

/// Whether any user id or attribute carries a verified certification by a
/// key with ultimate owner trust.
///
/// Issuers are resolved one level deep only; their own validity is not
/// established.
fn signed_by_ultimately_trusted(keyblock: &Keyblock, groups: &[usize], ctx: &MergeContext<'_>) -> bool {
    let kid = keyblock.primary().keyid;
    for &uid_index in groups {
        for index in keyblock.signatures_after(uid_index) {
            let Some(sig) = keyblock.signature(index).filter(|s| s.issuer != kid) else {
                continue;
            };
            let Some(issuer) = ctx.issuers.by_keyid(&sig.issuer) else {
                continue;
            };
            if ctx.verifier.verify(keyblock, index, Some(&issuer)) == Verification::Verified
                && ctx.trust.ownertrust(&issuer) == TrustLevel::Ultimate
            {
                return true;
            }
        }
    }
    false
}

/// A value staged on the most recently created valid user id or attribute,
/// skipping those where `is_unset` holds for it.
fn latest_uid_value<T: Copy>(
    keyblock: &Keyblock,
    groups: &[usize],
    value: impl Fn(&UserIdRecord) -> T,
    is_unset: impl Fn(&T) -> bool,
) -> Option<T> {
    let mut best: Option<(Timestamp, T)> = None;
    for uid in groups.iter().filter_map(|&index| keyblock.user_id(index)) {
        let v = value(uid);
        if is_unset(&v) {
            continue;
        }
        if uid.created > best.as_ref().map_or(0, |(d, _)| *d) {
            best = Some((uid.created, v));
        }
    }
    best.map(|(_, v)| v)
}
