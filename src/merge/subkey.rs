//! Subkey pass: binding signatures, subkey revocations and
//! cross-certifications.

use log::debug;

use super::{revocation_from, MergeContext};
use crate::error::{Error, Result};
use crate::internal::{is_known_algorithm, parse_key_flags, restrict_usage};
use crate::keyblock::Keyblock;
use crate::packet::{SignatureRecord, SignatureType};
use crate::services::Verification;
use crate::types::{BackSig, KeyUsage, RevocationSource, Timestamp};

/// Merge the subkey at packet `index`.
pub(super) fn merge_subkey(
    keyblock: &mut Keyblock,
    index: usize,
    ctx: &MergeContext<'_>,
) -> Result<()> {
    let main = keyblock.primary().clone();
    let sub = keyblock
        .key(index)
        .cloned()
        .ok_or_else(|| Error::Structural(format!("packet {} is not a subkey", index)))?;

    {
        let Some(key) = keyblock.key_mut(index) else {
            return Ok(());
        };
        key.valid = false;
        key.revoked = None;
        key.has_expired = None;
        key.expiredate = 0;
        key.usage = KeyUsage::empty();
        key.main_keyid = main.main_keyid.or(Some(main.keyid));
    }

    if main.version < 4 {
        return Ok(());
    }

    let mut revoked = None;
    let mut binding: Option<usize> = None;
    let mut sigdate: Timestamp = 0;
    for sig_index in keyblock.subkey_group(index) {
        let Some(sig) = keyblock.signature(sig_index) else {
            continue;
        };
        if sig.issuer != main.keyid {
            continue;
        }
        if ctx.verifier.verify(keyblock, sig_index, None) != Verification::Verified {
            debug!("{}: binding signature {} did not verify", sub.keyid, sig_index);
            continue;
        }
        if sig.is_subkey_revocation() {
            revoked = Some(revocation_from(sig, RevocationSource::SelfSigned));
        } else if sig.is_subkey_binding() && sig.created >= sigdate && !sig.is_expired(ctx.now) {
            sigdate = sig.created;
            binding = Some(sig_index);
        }
    }

    let binding = binding.and_then(|i| keyblock.signature(i)).cloned();

    let Some(key) = keyblock.key_mut(index) else {
        return Ok(());
    };
    key.revoked = revoked;

    let Some(sig) = binding else {
        debug!("{}: no valid binding signature", sub.keyid);
        return Ok(());
    };

    let usage = sig.key_flags().map(parse_key_flags).unwrap_or_default();
    key.usage = restrict_usage(usage, sub.algorithm);

    key.expiredate = match sig.key_expiration_time() {
        Some(offset) if offset != 0 => sub.created.saturating_add(offset),
        _ => 0,
    };
    key.has_expired = (key.expiredate != 0 && key.expiredate < ctx.now).then_some(key.expiredate);

    if !is_known_algorithm(sub.algorithm) {
        debug!("{}: unsupported algorithm {}", sub.keyid, sub.algorithm.name());
        return Ok(());
    }
    key.valid = true;

    if key.backsig == BackSig::Unchecked {
        if let Some(backsig) = latest_backsig(&sig) {
            key.backsig = match ctx.verifier.verify_backsig(&main, &sub, backsig) {
                Verification::Verified => BackSig::Valid,
                _ => BackSig::Invalid,
            };
        }
    }

    Ok(())
}

/// The most recent embedded primary key binding signature.
///
/// The hashed area is searched before the unhashed one; a later signature
/// replaces an earlier one only if strictly newer.
fn latest_backsig(binding: &SignatureRecord) -> Option<&SignatureRecord> {
    let mut best: Option<&SignatureRecord> = None;
    let mut sigdate: Timestamp = 0;
    for embedded in binding.embedded_signatures() {
        if embedded.typ == SignatureType::KeyBinding && embedded.created > sigdate {
            sigdate = embedded.created;
            best = Some(embedded);
        }
    }
    best
}
