//! Auto-key-locate: the ordered list of key acquisition mechanisms and the
//! by-name lookup that walks it.

use std::fmt;
use std::str::FromStr;

use log::info;

use crate::error::{Error, Result};
use crate::internal::is_valid_mailbox;
use crate::lookup::{FoundKey, LookupContext};
use crate::session::Session;
use crate::types::{Fingerprint, KeyUsage};

/// One key acquisition mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    /// Placeholder that disables the implicit local lookup
    NoDefault,
    /// The local keyring, at this position in the list
    Local,
    /// DNS CERT records
    Cert,
    /// Public Key Association records
    Pka,
    /// DNS-based authentication of named entities
    Dane,
    /// A directory service
    Ldap,
    /// The configured keyserver
    Keyserver,
    /// An explicitly named keyserver
    Spec(String),
}

impl Mechanism {
    /// The name used when reporting on an acquisition attempt.
    ///
    /// # Arguments
    /// * `keyserver` - The configured keyserver, reported for [`Mechanism::Keyserver`]
    pub fn label(&self, keyserver: Option<&str>) -> String {
        match self {
            Mechanism::NoDefault => "None".to_string(),
            Mechanism::Local => "Local".to_string(),
            Mechanism::Cert => "DNS CERT".to_string(),
            Mechanism::Pka => "PKA".to_string(),
            Mechanism::Dane => "DANE".to_string(),
            Mechanism::Ldap => "LDAP".to_string(),
            Mechanism::Keyserver => keyserver.unwrap_or("Unconfigured keyserver").to_string(),
            Mechanism::Spec(uri) => uri.clone(),
        }
    }

    /// Whether this mechanism talks to the network.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Mechanism::NoDefault | Mechanism::Local)
    }
}

impl fmt::Display for Mechanism {
    /// The option token for this mechanism.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::NoDefault => write!(f, "nodefault"),
            Mechanism::Local => write!(f, "local"),
            Mechanism::Cert => write!(f, "cert"),
            Mechanism::Pka => write!(f, "pka"),
            Mechanism::Dane => write!(f, "dane"),
            Mechanism::Ldap => write!(f, "ldap"),
            Mechanism::Keyserver => write!(f, "keyserver"),
            Mechanism::Spec(uri) => write!(f, "{}", uri),
        }
    }
}

impl FromStr for Mechanism {
    type Err = Error;

    /// Parse one option token (case-insensitive keywords or a keyserver URI).
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nodefault" => Ok(Mechanism::NoDefault),
            "local" => Ok(Mechanism::Local),
            "cert" => Ok(Mechanism::Cert),
            "pka" => Ok(Mechanism::Pka),
            "dane" => Ok(Mechanism::Dane),
            "ldap" => Ok(Mechanism::Ldap),
            "keyserver" => Ok(Mechanism::Keyserver),
            _ if is_keyserver_uri(s) => Ok(Mechanism::Spec(s.to_string())),
            _ => Err(Error::InvalidInput(format!(
                "unknown auto-key-locate mechanism: {}",
                s
            ))),
        }
    }
}

/// A URI with a scheme and something after `://`.
fn is_keyserver_uri(s: &str) -> bool {
    match s.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
                && !rest.is_empty()
        }
        None => false,
    }
}

/// The configured acquisition order.
///
/// # Example
/// ```
/// use keyresolve::{AutoKeyLocate, Mechanism};
///
/// let akl: AutoKeyLocate = "local, dane keyserver".parse().unwrap();
/// assert_eq!(
///     akl.mechanisms(),
///     &[Mechanism::Local, Mechanism::Dane, Mechanism::Keyserver]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoKeyLocate {
    mechanisms: Vec<Mechanism>,
}

impl AutoKeyLocate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the mechanisms named in an option string.
    ///
    /// Tokens are separated by commas or whitespace. `clear` empties the
    /// list built so far; duplicates are dropped and the first occurrence
    /// keeps its position. On error the list is left unchanged.
    pub fn parse(&mut self, options: &str) -> Result<()> {
        let mut mechanisms = self.mechanisms.clone();
        for token in options.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            if token.eq_ignore_ascii_case("clear") {
                mechanisms.clear();
                continue;
            }
            let mechanism: Mechanism = token.parse()?;
            if !mechanisms.contains(&mechanism) {
                mechanisms.push(mechanism);
            }
        }
        self.mechanisms = mechanisms;
        Ok(())
    }

    pub fn mechanisms(&self) -> &[Mechanism] {
        &self.mechanisms
    }

    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }

    /// True if the implicit leading local lookup is suppressed, which
    /// happens when `nodefault` or `local` is listed.
    pub fn nodefault(&self) -> bool {
        self.mechanisms
            .iter()
            .any(|m| matches!(m, Mechanism::NoDefault | Mechanism::Local))
    }

    /// True if the local keyring is consulted before any remote mechanism,
    /// either implicitly or because `local` is listed first.
    pub fn local_first(&self) -> bool {
        if !self.nodefault() {
            return true;
        }
        self.mechanisms
            .iter()
            .find(|m| **m != Mechanism::NoDefault)
            .is_some_and(|m| *m == Mechanism::Local)
    }
}

impl FromStr for AutoKeyLocate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut akl = AutoKeyLocate::new();
        akl.parse(s)?;
        Ok(akl)
    }
}

impl fmt::Display for AutoKeyLocate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self.mechanisms.iter().map(ToString::to_string).collect();
        write!(f, "{}", tokens.join(","))
    }
}

impl<'a> Session<'a> {
    /// Find a public key by name, fetching it from the network if needed.
    ///
    /// The local keyring is tried first unless `nodefault` or `local` is
    /// configured. Remote mechanisms only run for names that look like mail
    /// addresses and only after the local lookup found nothing. A key
    /// fetched remotely is then looked up locally by the fingerprint the
    /// mechanism reported, never by the name.
    ///
    /// # Arguments
    /// * `name` - User id, mail address, key id or fingerprint
    /// * `usage` - Requested capabilities
    /// * `include_unusable` - Do not skip revoked, expired or disabled keys
    /// * `no_akl` - Only consult the local keyring
    ///
    /// # Returns
    /// The key, and the lookup context when the local keyring was consulted
    /// first (so `getkey_next` can continue the search).
    pub fn get_pubkey_byname(
        &mut self,
        name: &str,
        usage: KeyUsage,
        include_unusable: bool,
        no_akl: bool,
    ) -> Result<(FoundKey, Option<LookupContext<'a>>)> {
        let is_mbox = is_valid_mailbox(name);
        let akl = self.config().auto_key_locate.clone();

        let (nodefault, local_first) = if no_akl {
            (false, true)
        } else {
            (akl.nodefault(), akl.local_first())
        };

        let mut result = if nodefault && is_mbox {
            Err(Error::NoPublicKey)
        } else {
            self.key_byname(&[name], usage, false, include_unusable)
        };

        if matches!(result, Err(Error::NoPublicKey)) && !no_akl && is_mbox {
            let keyserver = self.config().keyserver.clone();
            for mechanism in akl.mechanisms() {
                let label = mechanism.label(keyserver.as_deref());
                match self.locate_via(name, mechanism, usage, include_unusable) {
                    Ok(found) => {
                        info!("automatically retrieved '{}' via {}", name, label);
                        result = Ok(found);
                        break;
                    }
                    Err(e) => {
                        if !matches!(e, Error::NoPublicKey) || self.config().verbose {
                            info!("error retrieving '{}' via {}: {}", name, label, e);
                        }
                        result = Err(e);
                    }
                }
            }
        }

        match result {
            Ok((found, ctx)) => Ok((found, local_first.then_some(ctx))),
            Err(Error::Acquisition { .. }) => Err(Error::NoPublicKey),
            Err(e) => Err(e),
        }
    }

    /// Try one mechanism.
    fn locate_via(
        &mut self,
        name: &str,
        mechanism: &Mechanism,
        usage: KeyUsage,
        include_unusable: bool,
    ) -> Result<(FoundKey, LookupContext<'a>)> {
        let fingerprint = match mechanism {
            Mechanism::Local => return self.key_byname(&[name], usage, false, include_unusable),
            Mechanism::Keyserver if self.config().keyserver.is_none() => {
                return Err(Error::NoPublicKey)
            }
            remote if remote.is_remote() => self.acquire(name, remote)?,
            _ => return Err(Error::NoPublicKey),
        };

        let fingerprint = hex::encode_upper(fingerprint.as_bytes());
        if self.config().verbose {
            info!("auto-key-locate found fingerprint {}", fingerprint);
        }
        self.key_byname(&[fingerprint.as_str()], usage, false, include_unusable)
    }

    fn acquire(&self, name: &str, mechanism: &Mechanism) -> Result<Fingerprint> {
        let label = mechanism.label(self.config().keyserver.as_deref());
        let Some(acquirer) = self.acquirer() else {
            return Err(Error::Acquisition {
                mechanism: label,
                reason: "no acquisition backend".to_string(),
            });
        };
        match acquirer.fetch(name, mechanism) {
            Ok(Some(fingerprint)) => Ok(fingerprint),
            Ok(None) => Err(Error::Acquisition {
                mechanism: label,
                reason: "No fingerprint".to_string(),
            }),
            Err(e) => Err(Error::Acquisition {
                mechanism: label,
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_and_duplicates() {
        let akl: AutoKeyLocate = "cert,LDAP pka, cert  hkps://keys.example.org".parse().unwrap();
        assert_eq!(
            akl.mechanisms(),
            &[
                Mechanism::Cert,
                Mechanism::Ldap,
                Mechanism::Pka,
                Mechanism::Spec("hkps://keys.example.org".into()),
            ]
        );
        assert_eq!(akl.to_string(), "cert,ldap,pka,hkps://keys.example.org");
    }

    #[test]
    fn test_parse_clear() {
        let mut akl: AutoKeyLocate = "cert,pka".parse().unwrap();
        akl.parse("clear,dane").unwrap();
        assert_eq!(akl.mechanisms(), &[Mechanism::Dane]);
        akl.parse("clear").unwrap();
        assert!(akl.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let mut akl: AutoKeyLocate = "pka".parse().unwrap();
        assert!(matches!(akl.parse("dane,carrier-pigeon"), Err(Error::InvalidInput(_))));
        assert_eq!(akl.mechanisms(), &[Mechanism::Pka]);
        assert!("keys.example.org".parse::<AutoKeyLocate>().is_err());
        assert!("://x".parse::<AutoKeyLocate>().is_err());
    }

    #[test]
    fn test_local_ordering_rules() {
        let default = AutoKeyLocate::new();
        assert!(!default.nodefault());
        assert!(default.local_first());

        let remote_only: AutoKeyLocate = "nodefault,cert".parse().unwrap();
        assert!(remote_only.nodefault());
        assert!(!remote_only.local_first());

        let local_late: AutoKeyLocate = "cert,local".parse().unwrap();
        assert!(local_late.nodefault());
        assert!(!local_late.local_first());

        let local_early: AutoKeyLocate = "nodefault,local,cert".parse().unwrap();
        assert!(local_early.local_first());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Mechanism::Cert.label(None), "DNS CERT");
        assert_eq!(Mechanism::Keyserver.label(None), "Unconfigured keyserver");
        assert_eq!(
            Mechanism::Keyserver.label(Some("hkps://k.example")),
            "hkps://k.example"
        );
        assert!(!Mechanism::Local.is_remote());
        assert!(Mechanism::Ldap.is_remote());
    }
}
