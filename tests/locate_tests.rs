//! Tests for by-name lookups with auto-key-locate.

mod common;

use common::*;

use keyresolve::{AutoKeyLocate, Config, Error, KeyUsage, MemoryKeyring, Mechanism};

fn keyring() -> MemoryKeyring {
    MemoryKeyring::from_keyblocks([alice(), bob()])
}

fn with_akl(options: &str) -> Config {
    let akl: AutoKeyLocate = options.parse().unwrap();
    config().with_auto_key_locate(akl)
}

fn calls(acquirer: &ScriptedAcquirer) -> Vec<String> {
    acquirer.calls.borrow().clone()
}

// =============================================================================
// Local hits
// =============================================================================

mod local {
    use super::*;
    use keyresolve::Session;

    #[test]
    fn test_local_hit_skips_acquisition() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("cert", Some(fingerprint(3)));
        let mut session = Session::new(&keyring, &verifier, with_akl("cert"))
            .with_acquirer(&acquirer);

        let (found, ctx) = session
            .get_pubkey_byname("alice@example.org", KeyUsage::ENCRYPT, false, false)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(2));
        assert!(ctx.is_some());
        assert!(calls(&acquirer).is_empty());
    }

    #[test]
    fn test_context_continues_search() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let mut session = Session::new(&keyring, &verifier, config());

        let (found, ctx) = session
            .get_pubkey_byname("example", KeyUsage::empty(), false, false)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(1));
        let mut ctx = ctx.unwrap();
        assert_eq!(session.getkey_next(&mut ctx).unwrap().key().keyid, keyid(3));
    }

    #[test]
    fn test_unusable_local_result_is_final() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("cert", Some(fingerprint(3)));
        let mut session = Session::new(&keyring, &verifier, with_akl("cert"))
            .with_acquirer(&acquirer);

        let err = session
            .get_pubkey_byname("alice@example.org", KeyUsage::AUTHENTICATE, false, false)
            .unwrap_err();
        assert_eq!(err, Error::UnusablePublicKey);
        assert!(calls(&acquirer).is_empty());
    }
}

// =============================================================================
// Acquisition
// =============================================================================

mod acquisition {
    use super::*;
    use keyresolve::Session;

    #[test]
    fn test_mechanisms_tried_in_order() {
        // Bob is known locally under a different address only.
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new()
            .fail("cert", "no CERT record")
            .answer("pka", Some(fingerprint(3)));
        let mut session = Session::new(&keyring, &verifier, with_akl("cert,pka"))
            .with_acquirer(&acquirer);

        let (found, ctx) = session
            .get_pubkey_byname("robert@example.com", KeyUsage::ENCRYPT, false, false)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(4));
        assert!(ctx.is_some());
        assert_eq!(calls(&acquirer), vec!["cert", "pka"]);
    }

    #[test]
    fn test_nodefault_goes_remote_first() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("dane", Some(fingerprint(1)));
        let mut session = Session::new(&keyring, &verifier, with_akl("nodefault,dane"))
            .with_acquirer(&acquirer);

        let (found, ctx) = session
            .get_pubkey_byname("alice@example.org", KeyUsage::SIGN, false, false)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(1));
        assert!(ctx.is_none());
        assert_eq!(calls(&acquirer), vec!["dane"]);
    }

    #[test]
    fn test_local_after_remote() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("cert", None);
        let mut session = Session::new(&keyring, &verifier, with_akl("cert,local"))
            .with_acquirer(&acquirer);

        let (found, ctx) = session
            .get_pubkey_byname("bob@example.net", KeyUsage::empty(), false, false)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(3));
        assert!(ctx.is_none());
        assert_eq!(calls(&acquirer), vec!["cert"]);
    }

    #[test]
    fn test_only_mail_addresses_are_acquired() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("cert", Some(fingerprint(3)));
        let mut session = Session::new(&keyring, &verifier, with_akl("cert"))
            .with_acquirer(&acquirer);

        let err = session
            .get_pubkey_byname("Robert", KeyUsage::empty(), false, false)
            .unwrap_err();
        assert_eq!(err, Error::NoPublicKey);
        assert!(calls(&acquirer).is_empty());
    }

    #[test]
    fn test_no_akl_flag() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("cert", Some(fingerprint(3)));
        let mut session = Session::new(&keyring, &verifier, with_akl("nodefault,cert"))
            .with_acquirer(&acquirer);

        // The local keyring is consulted even though nodefault is set.
        let (found, ctx) = session
            .get_pubkey_byname("alice@example.org", KeyUsage::empty(), false, true)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(1));
        assert!(ctx.is_some());

        let err = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, true)
            .unwrap_err();
        assert_eq!(err, Error::NoPublicKey);
        assert!(calls(&acquirer).is_empty());
    }

    #[test]
    fn test_exhausted_mechanisms() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new()
            .fail("cert", "timeout")
            .answer("pka", None);
        let mut session = Session::new(&keyring, &verifier, with_akl("cert,pka,ldap"))
            .with_acquirer(&acquirer);

        let err = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, false)
            .unwrap_err();
        assert_eq!(err, Error::NoPublicKey);
        assert_eq!(calls(&acquirer), vec!["cert", "pka", "ldap"]);
    }

    #[test]
    fn test_fetched_key_missing_locally() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("dane", Some(fingerprint(9)));
        let mut session = Session::new(&keyring, &verifier, with_akl("dane"))
            .with_acquirer(&acquirer);

        let err = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, false)
            .unwrap_err();
        assert_eq!(err, Error::NoPublicKey);
    }

    #[test]
    fn test_keyserver_requires_configuration() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("keyserver", Some(fingerprint(3)));

        let mut session = Session::new(&keyring, &verifier, with_akl("keyserver"))
            .with_acquirer(&acquirer);
        let err = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, false)
            .unwrap_err();
        assert_eq!(err, Error::NoPublicKey);
        assert!(calls(&acquirer).is_empty());

        let config = with_akl("keyserver").with_keyserver("hkps://keys.example.org");
        let mut session = Session::new(&keyring, &verifier, config).with_acquirer(&acquirer);
        let (found, _) = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, false)
            .unwrap();
        assert_eq!(found.key().keyid, keyid(3));
        assert_eq!(calls(&acquirer), vec!["keyserver"]);
    }

    #[test]
    fn test_named_keyserver() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let acquirer = ScriptedAcquirer::new().answer("ldap://ldap.example.com", Some(fingerprint(3)));
        let config = with_akl("ldap://ldap.example.com");
        assert_eq!(
            config.auto_key_locate.mechanisms(),
            &[Mechanism::Spec("ldap://ldap.example.com".into())]
        );
        let mut session = Session::new(&keyring, &verifier, config).with_acquirer(&acquirer);

        let (found, _) = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, false)
            .unwrap();
        assert_eq!(found.keyblock().primary().keyid, keyid(3));
    }

    #[test]
    fn test_without_acquirer() {
        let keyring = keyring();
        let verifier = ScriptedVerifier::new();
        let mut session = Session::new(&keyring, &verifier, with_akl("cert,pka"));

        let err = session
            .get_pubkey_byname("robert@example.com", KeyUsage::empty(), false, false)
            .unwrap_err();
        assert_eq!(err, Error::NoPublicKey);
    }
}
