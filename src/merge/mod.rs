//! Self-signature merging.
//!
//! Derives validity, revocation, usage, expiration and the primary user id
//! of every key in a keyblock from the signatures it carries. The keyblock
//! is annotated in place; running the merge again on the result yields the
//! same annotations.
//!
//! The work is split in three passes:
//!
//! - [`primary`]: signatures on the primary key and on the user ids,
//! - [`subkey`]: each subkey's binding and revocation signatures,
//! - the cascade in [`merge_keyblock`], which pushes an unusable primary
//!   key's state down to the subkeys or copies the primary user id's
//!   preferences onto every key.

mod primary;
mod subkey;
mod user_id;

use log::debug;

use crate::error::Result;
use crate::keyblock::Keyblock;
use crate::packet::SignatureRecord;
use crate::services::{IssuerLookup, TrustService, Verifier};
use crate::types::{Revocation, RevocationInfo, RevocationSource, Timestamp};

pub use user_id::cmp_user_ids;

/// Services and options the merge engine reads.
pub struct MergeContext<'m> {
    /// Signature verification
    pub verifier: &'m dyn Verifier,
    /// Owner trust, consulted for the ultimate trust fallback
    pub trust: &'m dyn TrustService,
    /// Depth limited issuer resolution
    pub issuers: &'m dyn IssuerLookup,
    /// Treat keys without any self-signed user id as valid
    pub allow_non_selfsigned_uid: bool,
    /// Log informational notices
    pub verbose: bool,
    /// The instant expirations are checked against
    pub now: Timestamp,
}

/// Merge all self-signature data into the keyblock.
///
/// # Arguments
/// * `keyblock` - The keyblock to annotate
/// * `ctx` - Services and options
///
/// # Returns
/// An error only for keyblocks violating the section order.
pub fn merge_keyblock(keyblock: &mut Keyblock, ctx: &MergeContext<'_>) -> Result<()> {
    let revocation = primary::merge_primary(keyblock, ctx)?;

    for index in keyblock.subkey_indices() {
        subkey::merge_subkey(keyblock, index, ctx)?;
    }

    let main = keyblock.primary().clone();
    debug!(
        "merged {}: valid={} revoked={} expired={:?} usage={}",
        main.keyid,
        main.valid,
        revocation.is_some(),
        main.has_expired,
        main.usage
    );

    if revocation.is_some() || main.has_expired.is_some() || !main.valid {
        let indices: Vec<usize> = keyblock.keys().map(|(i, _)| i).collect();
        for index in indices {
            let Some(key) = keyblock.key_mut(index) else {
                continue;
            };
            if !main.valid {
                key.valid = false;
            }
            if let Some(rev) = revocation {
                if key.revoked.is_none() {
                    key.revoked = Some(rev);
                }
            }
            if main.has_expired.is_some() {
                key.has_expired = main.has_expired;
            }
        }
        return Ok(());
    }

    let (prefs, mdc) = keyblock
        .primary_user_id()
        .map(|u| (u.prefs.clone(), u.mdc))
        .unwrap_or_default();
    let indices: Vec<usize> = keyblock.keys().map(|(i, _)| i).collect();
    for index in indices {
        if let Some(key) = keyblock.key_mut(index) {
            key.prefs = prefs.clone();
            key.mdc = mdc;
        }
    }

    Ok(())
}

fn revocation_from(sig: &SignatureRecord, source: RevocationSource) -> Revocation {
    Revocation {
        source,
        info: RevocationInfo {
            date: sig.created,
            algorithm: sig.algorithm.into(),
            keyid: sig.issuer,
        },
    }
}
