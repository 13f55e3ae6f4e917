//! Search descriptors and user string classification.
//!
//! A lookup carries one or more descriptors; a keyblock matches when any of
//! them does. User supplied strings are turned into descriptors by
//! [`classify`].

use std::fmt;

use crate::error::{Error, Result};
use crate::keyblock::Keyblock;
use crate::services::TrustService;
use crate::types::{Fingerprint, KeyId};

/// What a descriptor matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// Every keyblock in the store
    All,
    /// Low 32 bits of a key id
    ShortKeyId(u32),
    /// Full 64 bit key id
    LongKeyId(KeyId),
    /// v3 or v4 fingerprint
    Fingerprint(Fingerprint),
    /// User id equal to the text
    Exact(String),
    /// Mail address equal to the text (case-insensitive)
    Mail(String),
    /// Mail address containing the text (case-insensitive)
    MailSubstring(String),
    /// User id containing the text (case-insensitive)
    Substring(String),
}

/// Decides after merging whether a matched keyblock should be passed over.
///
/// Arguments are the merged keyblock, the index of the matched user id (if
/// the match was on a user id) and the trust service.
pub type SkipPredicate = fn(&Keyblock, Option<usize>, &dyn TrustService) -> bool;

/// One search term.
#[derive(Clone)]
pub struct SearchDescriptor {
    /// What to match
    pub criterion: Criterion,
    /// Require the matched key itself, not just its keyblock
    pub exact: bool,
    /// Optional usability filter
    pub skip: Option<SkipPredicate>,
}

impl fmt::Debug for SearchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchDescriptor")
            .field("criterion", &self.criterion)
            .field("exact", &self.exact)
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

impl SearchDescriptor {
    /// A descriptor for a criterion, not exact, without skip predicate.
    pub fn new(criterion: Criterion) -> Self {
        Self {
            criterion,
            exact: false,
            skip: None,
        }
    }

    /// Match every keyblock.
    pub fn all() -> Self {
        Self::new(Criterion::All)
    }

    /// Match a full key id.
    pub fn long_keyid(keyid: KeyId) -> Self {
        Self::new(Criterion::LongKeyId(keyid))
    }

    /// Match a fingerprint.
    pub fn fingerprint(fingerprint: Fingerprint) -> Self {
        Self::new(Criterion::Fingerprint(fingerprint))
    }

    /// Mark the descriptor exact.
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Attach a skip predicate.
    pub fn with_skip(mut self, skip: SkipPredicate) -> Self {
        self.skip = Some(skip);
        self
    }

    /// True for key id and fingerprint descriptors.
    ///
    /// These name one key directly and are never filtered for usability.
    pub fn names_key(&self) -> bool {
        matches!(
            self.criterion,
            Criterion::ShortKeyId(_) | Criterion::LongKeyId(_) | Criterion::Fingerprint(_)
        )
    }
}

/// Turn a user supplied string into a search descriptor.
///
/// Recognized forms:
///
/// | Input | Criterion |
/// |---|---|
/// | `=text` | exact user id |
/// | `<addr>` | exact mail address |
/// | `@text` | mail address substring |
/// | `*text` | user id substring |
/// | 8 hex digits | short key id |
/// | 16 hex digits | long key id |
/// | 32 or 40 hex digits (spaces allowed) | fingerprint |
///
/// Hex forms take an optional `0x` prefix and an optional `!` suffix which
/// makes the descriptor exact. Anything else is a user id substring.
///
/// # Arguments
/// * `input` - The string to classify
///
/// # Returns
/// The descriptor, or [`Error::InvalidInput`] for empty input and malformed
/// `0x` forms.
pub fn classify(input: &str) -> Result<SearchDescriptor> {
    let s = input.trim_start();
    if s.is_empty() {
        return Err(Error::InvalidInput("empty user id".to_string()));
    }

    let criterion = match s.as_bytes()[0] {
        b'=' => Criterion::Exact(s[1..].to_string()),
        b'<' => {
            let addr = s[1..].strip_suffix('>').unwrap_or(&s[1..]);
            if addr.is_empty() {
                return Err(Error::InvalidInput(format!("invalid mail address: {}", s)));
            }
            Criterion::Mail(addr.to_lowercase())
        }
        b'@' => Criterion::MailSubstring(s[1..].to_lowercase()),
        b'*' => Criterion::Substring(s[1..].to_string()),
        _ => {
            if let Some(desc) = classify_hex(s)? {
                return Ok(desc);
            }
            Criterion::Substring(s.to_string())
        }
    };

    Ok(SearchDescriptor::new(criterion))
}

fn classify_hex(s: &str) -> Result<Option<SearchDescriptor>> {
    let (body, exact) = match s.trim_end().strip_suffix('!') {
        Some(rest) => (rest, true),
        None => (s.trim_end(), false),
    };
    let (body, prefixed) = match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        Some(rest) => (rest, true),
        None => (body, false),
    };

    let compact: String = body.chars().filter(|c| *c != ' ').collect();
    let all_hex = !compact.is_empty() && compact.chars().all(|c| c.is_ascii_hexdigit());
    let spaced = compact.len() != body.len();

    let criterion = match (all_hex, compact.len()) {
        (true, 8) if !spaced => {
            let value = u32::from_str_radix(&compact, 16)
                .map_err(|e| Error::InvalidInput(e.to_string()))?;
            Some(Criterion::ShortKeyId(value))
        }
        (true, 16) if !spaced => Some(Criterion::LongKeyId(compact.parse()?)),
        (true, 32) | (true, 40) => Some(Criterion::Fingerprint(compact.parse()?)),
        _ => None,
    };

    match criterion {
        Some(criterion) => {
            let mut desc = SearchDescriptor::new(criterion);
            desc.exact = exact;
            Ok(Some(desc))
        }
        None if prefixed => Err(Error::InvalidInput(format!("invalid key id: {}", s))),
        None => Ok(None),
    }
}

/// Usability filter for name based lookups.
///
/// A keyblock is skipped when its primary key is revoked, expired or
/// disabled, or when the matched user id is revoked or expired.
pub fn skip_unusable(
    keyblock: &Keyblock,
    matched_user_id: Option<usize>,
    trust: &dyn TrustService,
) -> bool {
    let primary = keyblock.primary();
    if primary.is_revoked() || primary.is_expired() {
        return true;
    }

    if let Some(uid) = matched_user_id.and_then(|i| keyblock.user_id(i)) {
        if uid.revoked || uid.expired {
            return true;
        }
    }

    trust.is_disabled(primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefixes() {
        assert_eq!(
            classify("=Alice <a@b.c>").unwrap().criterion,
            Criterion::Exact("Alice <a@b.c>".into())
        );
        assert_eq!(
            classify("<Alice@Example.org>").unwrap().criterion,
            Criterion::Mail("alice@example.org".into())
        );
        assert_eq!(
            classify("@example").unwrap().criterion,
            Criterion::MailSubstring("example".into())
        );
        assert_eq!(
            classify("*lic").unwrap().criterion,
            Criterion::Substring("lic".into())
        );
        assert_eq!(
            classify("  Alice").unwrap().criterion,
            Criterion::Substring("Alice".into())
        );
        assert!(classify("   ").is_err());
        assert!(classify("<>").is_err());
    }

    #[test]
    fn test_classify_hex() {
        assert_eq!(
            classify("0xDEADBEEF").unwrap().criterion,
            Criterion::ShortKeyId(0xDEAD_BEEF)
        );
        let long = classify("1122334455667788!").unwrap();
        assert_eq!(
            long.criterion,
            Criterion::LongKeyId(KeyId::from_u64(0x1122_3344_5566_7788))
        );
        assert!(long.exact);
        assert!(long.names_key());

        let fpr = classify("0123 4567 89AB CDEF 0123  4567 89AB CDEF 0123 4567").unwrap();
        assert!(matches!(fpr.criterion, Criterion::Fingerprint(ref f) if f.len() == 20));
        let v3 = classify("00112233445566778899AABBCCDDEEFF").unwrap();
        assert!(matches!(v3.criterion, Criterion::Fingerprint(ref f) if f.len() == 16));

        // Not hex: falls through to substring, unless prefixed with 0x.
        assert!(matches!(
            classify("deadbeefs").unwrap().criterion,
            Criterion::Substring(_)
        ));
        assert!(classify("0x123").is_err());
    }
}
