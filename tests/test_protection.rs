//! Integration tests for signed-value protection and key derivation.
//!
//! Tests:
//! - Password and certificate cases through the persisted blob form
//! - Multiple recipients and both key transports
//! - Cipher recorded in the blob wins over the opening envelope's
//! - Counter-mode KDF properties

use std::sync::OnceLock;
use std::time::Duration;

use ofd_sign::crypto::certificate::{issue_self_signed, SelfSignedIdentity};
use ofd_sign::crypto::kdf;
use ofd_sign::protection::{
    KeyMaterial, KeyTransportAlgorithm, ProtectedContent, ProtectionCase, ProtectionEnvelope,
    Recipient,
};
use ofd_sign::{CipherAlgorithm, DigestAlgorithm, Error};
use proptest::prelude::*;

fn alice() -> &'static SelfSignedIdentity {
    static ID: OnceLock<SelfSignedIdentity> = OnceLock::new();
    ID.get_or_init(|| issue_self_signed("Alice", 1024, Duration::from_secs(86_400)).unwrap())
}

fn bob() -> &'static SelfSignedIdentity {
    static ID: OnceLock<SelfSignedIdentity> = OnceLock::new();
    ID.get_or_init(|| issue_self_signed("Bob", 1024, Duration::from_secs(86_400)).unwrap())
}

fn private_key(id: &SelfSignedIdentity) -> KeyMaterial {
    KeyMaterial::PrivateKey {
        certificate: id.certificate.clone(),
        key: id.private_key.clone(),
    }
}

const SIGNATURE: &[u8] = b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

mod password_case_tests {
    use super::*;

    #[test]
    fn test_blob_round_trip() {
        let envelope = ProtectionEnvelope::default();
        let key = KeyMaterial::Password("hunter2".into());
        let blob = envelope
            .protect(ProtectionCase::EncryptGmPassword, SIGNATURE, &key)
            .unwrap()
            .to_blob()
            .unwrap();
        assert!(!blob.windows(SIGNATURE.len()).any(|w| w == SIGNATURE));

        let parsed = ProtectedContent::from_blob(ProtectionCase::EncryptGmPassword, &blob).unwrap();
        assert_eq!(parsed.salt.as_ref().map(Vec::len), Some(ofd_sign::protection::SALT_LEN));
        let opened = envelope
            .unprotect(ProtectionCase::EncryptGmPassword, &parsed, &key)
            .unwrap();
        assert_eq!(opened, SIGNATURE);
    }

    #[test]
    fn test_fresh_salt_and_iv_each_time() {
        let envelope = ProtectionEnvelope::default();
        let key = KeyMaterial::Password("hunter2".into());
        let a = envelope.protect(ProtectionCase::EncryptGmPassword, SIGNATURE, &key).unwrap();
        let b = envelope.protect(ProtectionCase::EncryptGmPassword, SIGNATURE, &key).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.content, b.content);
    }

    #[test]
    fn test_wrong_password() {
        let envelope = ProtectionEnvelope::default();
        let protected = envelope
            .protect(ProtectionCase::EncryptGmPassword, SIGNATURE, &KeyMaterial::Password("right".into()))
            .unwrap();
        let result = envelope.unprotect(
            ProtectionCase::EncryptGmPassword,
            &protected,
            &KeyMaterial::Password("wrong".into()),
        );
        assert!(matches!(result, Err(Error::KeyMismatch)));
    }

    #[test]
    fn test_recorded_cipher_is_used() {
        let aes = ProtectionEnvelope::new(CipherAlgorithm::Aes256Cbc, DigestAlgorithm::Sm3);
        let key = KeyMaterial::Password("hunter2".into());
        let protected = aes.protect(ProtectionCase::EncryptGmPassword, SIGNATURE, &key).unwrap();
        assert_eq!(protected.cipher, Some(CipherAlgorithm::Aes256Cbc));

        let blob = protected.to_blob().unwrap();
        let parsed = ProtectedContent::from_blob(ProtectionCase::EncryptGmPassword, &blob).unwrap();
        let opened = ProtectionEnvelope::default()
            .unprotect(ProtectionCase::EncryptGmPassword, &parsed, &key)
            .unwrap();
        assert_eq!(opened, SIGNATURE);
    }
}

mod certificate_case_tests {
    use super::*;

    fn recipients(transport: KeyTransportAlgorithm) -> KeyMaterial {
        KeyMaterial::Recipients(vec![
            Recipient::from_der(&alice().certificate).unwrap().with_key_transport(transport),
            Recipient::from_der(&bob().certificate).unwrap().with_key_transport(transport),
        ])
    }

    #[test]
    fn test_each_recipient_can_open() {
        for transport in [KeyTransportAlgorithm::RsaOaep, KeyTransportAlgorithm::RsaPkcs1v15] {
            let envelope = ProtectionEnvelope::default();
            let blob = envelope
                .protect(ProtectionCase::EncryptGmCert, SIGNATURE, &recipients(transport))
                .unwrap()
                .to_blob()
                .unwrap();
            let parsed = ProtectedContent::from_blob(ProtectionCase::EncryptGmCert, &blob).unwrap();
            assert_eq!(parsed.wrapped_keys.len(), 2);
            assert!(parsed.wrapped_keys.iter().all(|k| k.transport == transport.name()));

            for id in [alice(), bob()] {
                let opened = envelope
                    .unprotect(ProtectionCase::EncryptGmCert, &parsed, &private_key(id))
                    .unwrap();
                assert_eq!(opened, SIGNATURE);
            }
        }
    }

    #[test]
    fn test_outsider_cannot_open() {
        let envelope = ProtectionEnvelope::default();
        let only_alice = KeyMaterial::Recipients(vec![Recipient::from_der(&alice().certificate).unwrap()]);
        let protected = envelope
            .protect(ProtectionCase::EncryptGmCert, SIGNATURE, &only_alice)
            .unwrap();
        assert!(envelope
            .unprotect(ProtectionCase::EncryptGmCert, &protected, &private_key(bob()))
            .is_err());
    }

    #[test]
    fn test_empty_recipient_list_rejected() {
        let result = ProtectionEnvelope::default().protect(
            ProtectionCase::EncryptGmCert,
            SIGNATURE,
            &KeyMaterial::Recipients(Vec::new()),
        );
        assert!(matches!(result, Err(Error::MissingKeyMaterial(_))));
    }

    #[test]
    fn test_protected_len_matches_output() {
        let envelope = ProtectionEnvelope::default();
        let key = recipients(KeyTransportAlgorithm::RsaOaep);
        let expected = envelope
            .protected_len(ProtectionCase::EncryptGmCert, SIGNATURE.len(), &key)
            .unwrap();
        let blob = envelope
            .protect(ProtectionCase::EncryptGmCert, SIGNATURE, &key)
            .unwrap()
            .to_blob()
            .unwrap();
        assert_eq!(blob.len(), expected);
    }
}

mod case_dispatch_tests {
    use super::*;

    #[test]
    fn test_case_identifiers() {
        for case in [
            ProtectionCase::EncryptGmPassword,
            ProtectionCase::EncryptGmCert,
            ProtectionCase::SignatureOnly,
        ] {
            assert_eq!(ProtectionCase::from_id(case.id()).unwrap(), case);
        }
        assert!(matches!(
            ProtectionCase::from_id("1.3"),
            Err(Error::UnsupportedProtectionCase(_))
        ));
    }

    #[test]
    fn test_signature_only_blob_is_raw() {
        let protected = ProtectionEnvelope::default()
            .protect(ProtectionCase::SignatureOnly, SIGNATURE, &KeyMaterial::None)
            .unwrap();
        assert_eq!(protected.to_blob().unwrap(), SIGNATURE);
    }

    #[test]
    fn test_blob_read_under_other_case() {
        let blob = ProtectionEnvelope::default()
            .protect(ProtectionCase::EncryptGmPassword, SIGNATURE, &KeyMaterial::Password("x".into()))
            .unwrap()
            .to_blob()
            .unwrap();
        assert!(matches!(
            ProtectedContent::from_blob(ProtectionCase::EncryptGmCert, &blob),
            Err(Error::ProtectionCaseMismatch { .. })
        ));
    }
}

mod kdf_tests {
    use super::*;

    #[test]
    fn test_lengths() {
        for len in [1, 16, 31, 32, 33, 64, 100] {
            assert_eq!(kdf::derive(DigestAlgorithm::Sm3, b"shared secret", len).unwrap().len(), len);
        }
        assert!(matches!(
            kdf::derive(DigestAlgorithm::Sm3, b"shared secret", 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_first_round_is_hash_with_counter_one() {
        let mut input = b"Z".to_vec();
        input.extend_from_slice(&[0, 0, 0, 1]);
        assert_eq!(
            kdf::derive(DigestAlgorithm::Sha256, b"Z", 32).unwrap(),
            DigestAlgorithm::Sha256.hash(&input)
        );
    }

    proptest! {
        #[test]
        fn prop_shorter_output_is_prefix(secret in proptest::collection::vec(any::<u8>(), 0..64), a in 1usize..80, b in 1usize..80) {
            let (short, long) = (a.min(b), a.max(b));
            let k_short = kdf::derive(DigestAlgorithm::Sm3, &secret, short).unwrap();
            let k_long = kdf::derive(DigestAlgorithm::Sm3, &secret, long).unwrap();
            prop_assert_eq!(&k_long[..short], &k_short[..]);
        }
    }
}
