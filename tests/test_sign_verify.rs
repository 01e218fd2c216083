//! Integration tests for signing and verifying OFD packages.
//!
//! Covers:
//! - Signature-only rounds signed and verified end to end
//! - Tamper detection, descriptor edits and mutations inside the excluded window
//! - Multi-round chaining and the whole-protected lock
//! - Password and certificate protection of the signed value
//! - Package close on hook failure and panic, with nothing written
//! - Plain `Sign` rounds and riding stamps
//! - Removing all signatures
//! - Zip packages on disk

use std::sync::OnceLock;
use std::time::Duration;

use ofd_sign::crypto::certificate::{issue_self_signed, SelfSignedIdentity};
use ofd_sign::package::{MemoryPackage, OpenMode, Package, ZipPackage};
use ofd_sign::protection::{KeyMaterial, ProtectionCase, Recipient};
use ofd_sign::seal::{self, SealCapability, SealTemplate, SealVersion};
use ofd_sign::signatures::{
    FileSelection, InvalidReason, PackageSigner, PackageVerifier, PageSize, RidingSide, RidingStamp,
    RsaSigner, RsaVerifier, SignCleaner, SignFn, SignOptions, SignatureDescriptor, SignatureList,
    SignatureType, StampPlacement, VerifyState,
};
use ofd_sign::geometry::Rect;
use ofd_sign::{Error, SignConfig, SignMode, SignatureAlgorithm};
use tempfile::tempdir;

fn signer_identity() -> &'static SelfSignedIdentity {
    static ID: OnceLock<SelfSignedIdentity> = OnceLock::new();
    ID.get_or_init(|| issue_self_signed("Integration Signer", 1024, Duration::from_secs(86_400)).unwrap())
}

fn recipient_identity() -> &'static SelfSignedIdentity {
    static ID: OnceLock<SelfSignedIdentity> = OnceLock::new();
    ID.get_or_init(|| issue_self_signed("Integration Recipient", 1024, Duration::from_secs(86_400)).unwrap())
}

/// A small unsigned document: root, document, two pages and a resource.
fn document_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("OFD.xml", b"<ofd:OFD xmlns:ofd=\"http://www.ofdspec.org/2016\"><ofd:DocBody><ofd:DocRoot>Doc_0/Document.xml</ofd:DocRoot></ofd:DocBody></ofd:OFD>".to_vec()),
        ("Doc_0/Document.xml", b"<ofd:Document><ofd:Pages><ofd:Page ID=\"1\" BaseLoc=\"Pages/Page_0/Content.xml\"/></ofd:Pages></ofd:Document>".to_vec()),
        ("Doc_0/Pages/Page_0/Content.xml", b"<ofd:Page><ofd:Content><ofd:TextObject>Pay 100</ofd:TextObject></ofd:Content></ofd:Page>".to_vec()),
        ("Doc_0/Pages/Page_1/Content.xml", b"<ofd:Page><ofd:Content><ofd:TextObject>Terms</ofd:TextObject></ofd:Content></ofd:Page>".to_vec()),
        ("Doc_0/Res/logo.png", vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3]),
    ]
}

fn document() -> MemoryPackage {
    MemoryPackage::from_entries(document_entries())
}

fn rsa_signer(config: SignConfig) -> PackageSigner<RsaSigner> {
    let id = signer_identity();
    let cap = RsaSigner::new(
        id.private_key.clone(),
        id.certificate.clone(),
        SignatureAlgorithm::Sha256WithRsa,
    )
    .unwrap();
    PackageSigner::new(cap, config)
}

fn verifier() -> PackageVerifier<RsaVerifier> {
    PackageVerifier::new(RsaVerifier::new(), SignConfig::default())
}

mod signature_only_tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let mut pkg = document();
        let record = rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();
        assert_eq!(record.protection_case, ProtectionCase::SignatureOnly);
        assert!(pkg.is_closed());

        let mut pkg = pkg.read_only();
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.get(&record.id).unwrap().state, VerifyState::CryptoVerified);
    }

    #[test]
    fn test_stamps_are_recorded() {
        let stamp = StampPlacement::new("1", "1", Rect::new(20.0, 200.0, 40.0, 40.0));
        let mut pkg = document();
        let record = rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::new().with_stamp(stamp.clone()))
            .unwrap();

        let list = SignatureList::from_xml(&pkg.entries()["Doc_0/Signs/Signatures.xml"]).unwrap();
        assert_eq!(list.get(&record.id).unwrap().stamps, vec![stamp.clone()]);
        let desc = SignatureDescriptor::from_xml(&pkg.entries()[record.descriptor_path.as_str()]).unwrap();
        assert_eq!(desc.stamps, vec![stamp]);
    }

    #[test]
    fn test_sha256_check_method() {
        let config = SignConfig::default().with_digest_algorithm(ofd_sign::DigestAlgorithm::Sha256);
        let mut pkg = document();
        let record = rsa_signer(config).sign(&mut pkg, &SignOptions::default()).unwrap();

        let desc = SignatureDescriptor::from_xml(&pkg.entries()[record.descriptor_path.as_str()]).unwrap();
        assert_eq!(desc.check_method, ofd_sign::DigestAlgorithm::Sha256);
        // The verifier follows the recorded check method, not its own configuration.
        let mut pkg = pkg.read_only();
        assert!(verifier().verify(&mut pkg).unwrap().is_valid());
    }

    #[test]
    fn test_legacy_seal_round() {
        let options = SignOptions::new().with_seal_template(SealTemplate::new().with_version(SealVersion::Legacy));
        let mut pkg = document();
        let record = rsa_signer(SignConfig::default()).sign(&mut pkg, &options).unwrap();
        let seal_path = record.seal_path.as_deref().unwrap();
        assert_eq!(seal::sniff_version(&pkg.entries()[seal_path]).unwrap(), 1);

        let mut pkg = pkg.read_only();
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.signatures[0].seal_version, Some(1));
    }

    #[test]
    fn test_riding_stamp_across_pages() {
        let pages = [PageSize::new("1", 210.0, 297.0), PageSize::new("2", 210.0, 297.0)];
        let riding = RidingStamp::new(40.0, 40.0).with_side(RidingSide::Right);
        let options = SignOptions::new().with_riding_stamp(&riding, &pages);
        let mut pkg = document();
        let record = rsa_signer(SignConfig::default()).sign(&mut pkg, &options).unwrap();

        assert_eq!(record.stamps.len(), 2);
        assert_eq!(record.stamps[1].page_ref, "2");
        assert_eq!(record.stamps[1].clip, Some(Rect::new(20.0, 0.0, 20.0, 40.0)));
        let desc = SignatureDescriptor::from_xml(&pkg.entries()[record.descriptor_path.as_str()]).unwrap();
        assert_eq!(desc.stamps, record.stamps);

        let mut pkg = pkg.read_only();
        assert!(verifier().verify(&mut pkg).unwrap().is_valid());
    }

    #[test]
    fn test_sign_type_round() {
        let signer = rsa_signer(SignConfig::default());
        let mut pkg = document();
        signer.sign(&mut pkg, &SignOptions::default()).unwrap();
        let mut pkg = pkg.read_write();
        let plain = signer
            .sign(&mut pkg, &SignOptions::new().with_signature_type(SignatureType::Sign))
            .unwrap();
        assert!(plain.seal_path.is_none());

        let mut pkg = pkg.read_only();
        let report = verifier()
            .with_signer_certificate(signer_identity().certificate.clone())
            .verify(&mut pkg)
            .unwrap();
        assert_eq!(report.len(), 2);
        assert!(report.is_valid());
        assert_eq!(report.get("s001").unwrap().seal_version, Some(4));
        assert_eq!(report.get("s002").unwrap().seal_version, None);

        let mut pkg = pkg.read_only();
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(report.get("s001").unwrap().is_valid());
        assert!(matches!(
            report.get("s002").unwrap().status.reason(),
            Some(InvalidReason::CertificateInvalid { .. })
        ));
    }
}

mod tamper_tests {
    use super::*;

    fn signed() -> MemoryPackage {
        let mut pkg = document();
        rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();
        pkg.read_only()
    }

    #[test]
    fn test_single_byte_change_detected() {
        let mut pkg = signed();
        let page = pkg.entry_mut("Doc_0/Pages/Page_0/Content.xml").unwrap();
        let pos = page.iter().position(|&b| b == b'1').unwrap();
        page[pos] = b'9';

        let report = verifier().verify(&mut pkg).unwrap();
        assert!(!report.is_valid());
        assert_eq!(
            report.signatures[0].status.reason(),
            Some(&InvalidReason::ContentTampered {
                path: "Doc_0/Pages/Page_0/Content.xml".into()
            })
        );
    }

    #[test]
    fn test_binary_resource_change_detected() {
        let mut pkg = signed();
        pkg.entry_mut("Doc_0/Res/logo.png").unwrap().push(0);
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(matches!(
            report.signatures[0].status.reason(),
            Some(InvalidReason::ContentTampered { path }) if path == "Doc_0/Res/logo.png"
        ));
    }

    #[test]
    fn test_unprotected_addition_ignored() {
        // Entries added after signing are not among the references.
        let mut pkg = signed().read_write();
        pkg.write("Doc_0/Annots/Annot_0.xml", b"<ofd:Annot/>".to_vec()).unwrap();
        let mut pkg = pkg.read_only();
        assert!(verifier().verify(&mut pkg).unwrap().is_valid());
    }

    #[test]
    fn test_signed_value_window_excluded_from_digest() {
        let mut pkg = signed();
        let desc = SignatureDescriptor::from_xml(&pkg.entries()["Doc_0/Signs/Sign_0/Signature.xml"]).unwrap();
        assert_eq!(desc.exclusions.len(), 1);
        let window = &desc.exclusions[0];
        assert_eq!(window.path, "Doc_0/Signs/Sign_0/SignedValue.dat");

        let files = desc.reference_paths();
        let engine = ofd_sign::signatures::DigestEngine::new(desc.check_method);
        let before = engine.compute_with_exclusion(&pkg, &files, &desc.exclusions).unwrap();
        pkg.entry_mut(&window.path).unwrap()[0] ^= 0x5a;
        let after = engine.compute_with_exclusion(&pkg, &files, &desc.exclusions).unwrap();
        assert_eq!(before, after);

        // The signature itself no longer verifies.
        let report = verifier().verify(&mut pkg).unwrap();
        assert_eq!(report.signatures[0].status.reason(), Some(&InvalidReason::SignatureMismatch));
    }

    const DESCRIPTOR: &str = "Doc_0/Signs/Sign_0/Signature.xml";

    /// Rewrite the first descriptor and report why the signature fails.
    fn verify_after_edit(pkg: &mut MemoryPackage, edit: impl FnOnce(&mut SignatureDescriptor)) -> InvalidReason {
        let mut desc = SignatureDescriptor::from_xml(&pkg.entries()[DESCRIPTOR]).unwrap();
        edit(&mut desc);
        *pkg.entry_mut(DESCRIPTOR).unwrap() = desc.to_xml().unwrap();
        let report = verifier().verify(pkg).unwrap();
        report.signatures[0].status.reason().cloned().expect("edit should invalidate the signature")
    }

    #[test]
    fn test_descriptor_edit_detected() {
        let mut pkg = signed();
        // Dropping a reference changes the recorded content digest.
        let reason = verify_after_edit(&mut pkg, |desc| {
            desc.references.retain(|r| r.path != "Doc_0/Pages/Page_1/Content.xml")
        });
        assert_eq!(reason, InvalidReason::ContentTampered { path: DESCRIPTOR.into() });
    }

    #[test]
    fn test_bytes_moved_across_entry_boundary() {
        let mut pkg = MemoryPackage::from_entries([
            ("Doc_0/Pages/Page_0/Content.xml", b"Pay 100".to_vec()),
            ("Doc_0/Pages/Page_1/Content.xml", b"0 CNY on delivery".to_vec()),
        ]);
        let options = SignOptions::new().with_file_selection(FileSelection::Explicit(vec![
            "Doc_0/Pages/Page_0/Content.xml".into(),
            "Doc_0/Pages/Page_1/Content.xml".into(),
        ]));
        rsa_signer(SignConfig::default()).sign(&mut pkg, &options).unwrap();

        // Same concatenation, different pages: "Pay 1000" / " CNY on delivery".
        let mut pkg = pkg.read_only();
        *pkg.entry_mut("Doc_0/Pages/Page_0/Content.xml").unwrap() = b"Pay 1000".to_vec();
        *pkg.entry_mut("Doc_0/Pages/Page_1/Content.xml").unwrap() = b" CNY on delivery".to_vec();

        // Both check values are rewritten to match the shifted pages.
        let reason = verify_after_edit(&mut pkg, |desc| {
            let method = desc.check_method;
            desc.references[0].value = method.hash(b"Pay 1000");
            desc.references[1].value = method.hash(b" CNY on delivery");
        });
        assert_eq!(reason, InvalidReason::SignatureMismatch);
    }

    #[test]
    fn test_provider_edit_detected() {
        let mut pkg = signed();
        let reason = verify_after_edit(&mut pkg, |desc| desc.provider.name = "Forged Signer".into());
        assert_eq!(reason, InvalidReason::SignatureMismatch);
    }

    #[test]
    fn test_signing_time_edit_detected() {
        let mut pkg = signed();
        let reason = verify_after_edit(&mut pkg, |desc| {
            desc.signature_time = desc.signature_time - chrono::Duration::days(365)
        });
        assert_eq!(reason, InvalidReason::SignatureMismatch);
    }

    #[test]
    fn test_stamp_edit_detected() {
        let mut pkg = signed();
        let reason = verify_after_edit(&mut pkg, |desc| {
            desc.stamps.push(StampPlacement::new("9", "1", Rect::new(0.0, 0.0, 40.0, 40.0)))
        });
        assert_eq!(reason, InvalidReason::SignatureMismatch);
    }

    #[test]
    fn test_foreign_certificate_rejected() {
        let mut pkg = signed();
        let other = recipient_identity().certificate.clone();
        let check = move |tbs: &[u8], sig: &[u8], _cert: &[u8]| {
            use ofd_sign::signatures::VerificationCapability;
            RsaVerifier::new().verify(tbs, sig, &other).unwrap_or(false)
        };
        let report = PackageVerifier::new(check, SignConfig::default()).verify(&mut pkg).unwrap();
        assert_eq!(report.signatures[0].status.reason(), Some(&InvalidReason::SignatureMismatch));
    }
}

mod multi_round_tests {
    use super::*;

    #[test]
    fn test_second_round_covers_first() {
        let signer = rsa_signer(SignConfig::default());
        let mut pkg = document();
        let first = signer.sign(&mut pkg, &SignOptions::default()).unwrap();
        let mut pkg = pkg.read_write();
        let second = signer.sign(&mut pkg, &SignOptions::default()).unwrap();

        assert_eq!((first.id.as_str(), second.id.as_str()), ("s001", "s002"));
        let desc = SignatureDescriptor::from_xml(&pkg.entries()[second.descriptor_path.as_str()]).unwrap();
        assert!(desc.protects("Doc_0/Signs/Sign_0/Seal.esl"));
        assert!(desc.protects("Doc_0/Signs/Sign_0/SignedValue.dat"));
        assert!(desc.protects("Doc_0/Signs/Sign_0/Signature.xml"));

        let seal = seal::decode(&pkg.entries()[second.seal_path.as_deref().unwrap()]).unwrap();
        assert_eq!(seal.prior_seal(), first.seal_path.as_deref());

        let mut pkg = pkg.read_only();
        let report = verifier().verify(&mut pkg).unwrap();
        assert_eq!(report.len(), 2);
        assert!(report.is_valid());
    }

    #[test]
    fn test_tampering_first_value_breaks_both_rounds() {
        let signer = rsa_signer(SignConfig::default());
        let mut pkg = document();
        signer.sign(&mut pkg, &SignOptions::default()).unwrap();
        let mut pkg = pkg.read_write();
        signer.sign(&mut pkg, &SignOptions::default()).unwrap();

        let mut pkg = pkg.read_only();
        pkg.entry_mut("Doc_0/Signs/Sign_0/SignedValue.dat").unwrap()[3] ^= 0x01;
        let report = verifier().verify(&mut pkg).unwrap();

        assert_eq!(report.get("s001").unwrap().status.reason(), Some(&InvalidReason::SignatureMismatch));
        assert!(matches!(
            report.get("s002").unwrap().status.reason(),
            Some(InvalidReason::ContentTampered { path }) if path == "Doc_0/Signs/Sign_0/SignedValue.dat"
        ));
        assert_eq!(report.invalid().count(), 2);
    }

    #[test]
    fn test_exclude_prior_signatures_keeps_rounds_independent() {
        let signer = rsa_signer(SignConfig::default());
        let mut pkg = document();
        signer.sign(&mut pkg, &SignOptions::default()).unwrap();
        let mut pkg = pkg.read_write();
        let options = SignOptions::new().with_file_selection(FileSelection::ExcludePriorSignatures);
        signer.sign(&mut pkg, &options).unwrap();

        let mut pkg = pkg.read_only();
        pkg.entry_mut("Doc_0/Signs/Sign_0/SignedValue.dat").unwrap()[3] ^= 0x01;
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(!report.get("s001").unwrap().is_valid());
        assert!(report.get("s002").unwrap().is_valid());
    }

    #[test]
    fn test_whole_protected_terminates() {
        let locked = SignConfig::default().with_sign_mode(SignMode::WholeProtected);
        let mut pkg = document();
        rsa_signer(locked).sign(&mut pkg, &SignOptions::default()).unwrap();

        let mut pkg = pkg.read_write();
        let err = rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::SignatureTerminated));
        assert!(pkg.is_closed());

        let mut pkg = pkg.read_only();
        let report = verifier().verify(&mut pkg).unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.is_valid());
    }

    #[test]
    fn test_whole_protected_list_edit_detected() {
        let locked = SignConfig::default().with_sign_mode(SignMode::WholeProtected);
        let mut pkg = document();
        rsa_signer(locked).sign(&mut pkg, &SignOptions::default()).unwrap();

        let mut pkg = pkg.read_only();
        let list = pkg.entry_mut("Doc_0/Signs/Signatures.xml").unwrap();
        list.extend_from_slice(b"\n");
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(matches!(
            report.signatures[0].status.reason(),
            Some(InvalidReason::ContentTampered { path }) if path == "Doc_0/Signs/Signatures.xml"
        ));
    }
}

mod protection_case_tests {
    use super::*;

    #[test]
    fn test_password_case() {
        let options = SignOptions::new().with_protection(
            ProtectionCase::EncryptGmPassword,
            KeyMaterial::Password("correct horse".into()),
        );
        let mut pkg = document();
        let record = rsa_signer(SignConfig::default()).sign(&mut pkg, &options).unwrap();
        assert_eq!(record.protection_case, ProtectionCase::EncryptGmPassword);

        let mut pkg = pkg.read_only();
        let report = verifier()
            .with_key_material(KeyMaterial::Password("correct horse".into()))
            .verify(&mut pkg)
            .unwrap();
        assert!(report.is_valid());

        let mut pkg = pkg.read_only();
        let report = verifier()
            .with_key_material(KeyMaterial::Password("battery staple".into()))
            .verify(&mut pkg)
            .unwrap();
        assert!(matches!(
            report.signatures[0].status.reason(),
            Some(InvalidReason::ProtectionFailed { .. })
        ));
    }

    #[test]
    fn test_certificate_case() {
        let recipient = recipient_identity();
        let options = SignOptions::new().with_protection(
            ProtectionCase::EncryptGmCert,
            KeyMaterial::Recipients(vec![Recipient::from_der(&recipient.certificate).unwrap()]),
        );
        let mut pkg = document();
        rsa_signer(SignConfig::default()).sign(&mut pkg, &options).unwrap();

        let mut pkg = pkg.read_only();
        let report = verifier()
            .with_key_material(KeyMaterial::PrivateKey {
                certificate: recipient.certificate.clone(),
                key: recipient.private_key.clone(),
            })
            .verify(&mut pkg)
            .unwrap();
        assert!(report.is_valid());

        // The signer is not a recipient.
        let signer = signer_identity();
        let mut pkg = pkg.read_only();
        let report = verifier()
            .with_key_material(KeyMaterial::PrivateKey {
                certificate: signer.certificate.clone(),
                key: signer.private_key.clone(),
            })
            .verify(&mut pkg)
            .unwrap();
        assert!(!report.is_valid());
    }

    #[test]
    fn test_missing_key_material_fails_before_writing() {
        let options = SignOptions::new().with_protection(ProtectionCase::EncryptGmCert, KeyMaterial::None);
        let mut pkg = document();
        let before = pkg.entries().clone();
        let err = rsa_signer(SignConfig::default()).sign(&mut pkg, &options).unwrap_err();
        assert!(matches!(err, Error::MissingKeyMaterial(_)));
        assert!(pkg.is_closed());
        assert_eq!(pkg.entries(), &before);
    }
}

mod hook_tests {
    use super::*;

    #[test]
    fn test_failing_hook_closes_package() {
        let cert = signer_identity().certificate.clone();
        let hook = SignFn::new(SignatureAlgorithm::Sha256WithRsa, cert, 128, |_: &[u8]| {
            Err(Error::Signing("device unplugged".into()))
        });
        let mut pkg = document();
        let err = PackageSigner::new(hook, SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
        assert!(pkg.is_closed());
        assert_eq!(pkg.entries(), document().entries());
    }

    #[test]
    fn test_panicking_hook_closes_package() {
        let cert = signer_identity().certificate.clone();
        let hook = SignFn::new(SignatureAlgorithm::Sha256WithRsa, cert, 128, |_: &[u8]| -> ofd_sign::Result<Vec<u8>> {
            panic!("driver crashed")
        });
        let signer = PackageSigner::new(hook, SignConfig::default());
        let mut pkg = document();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            signer.sign(&mut pkg, &SignOptions::default())
        }));
        assert!(outcome.is_err());
        assert!(pkg.is_closed());
        assert_eq!(pkg.entries(), document().entries());
    }

    #[test]
    fn test_external_hook_round_trip() {
        // A hook wrapping the software key, as a token driver would.
        let id = signer_identity();
        let inner = RsaSigner::new(
            id.private_key.clone(),
            id.certificate.clone(),
            SignatureAlgorithm::Sha256WithRsa,
        )
        .unwrap();
        let hook = SignFn::new(SignatureAlgorithm::Sha256WithRsa, id.certificate.clone(), 128, move |tbs: &[u8]| {
            use ofd_sign::signatures::SigningCapability;
            inner.sign(tbs)
        });
        let mut pkg = document();
        PackageSigner::new(hook, SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();

        let mut pkg = pkg.read_only();
        assert!(verifier().verify(&mut pkg).unwrap().is_valid());
    }

    #[test]
    fn test_seal_matches_hook_certificate() {
        let mut pkg = document();
        let record = rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();
        let seal = seal::decode(&pkg.entries()[record.seal_path.as_deref().unwrap()]).unwrap();
        assert_eq!(seal.certificate(), signer_identity().certificate.as_slice());
        assert_eq!(seal.algorithm(), SignatureAlgorithm::Sha256WithRsa);
    }
}

mod cleaner_tests {
    use super::*;

    #[test]
    fn test_clean_then_resign() {
        let mut pkg = document();
        rsa_signer(SignConfig::default().with_sign_mode(SignMode::WholeProtected))
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();

        let mut pkg = pkg.read_write();
        SignCleaner::default().clean(&mut pkg).unwrap();
        assert_eq!(pkg.entries(), document().entries());

        let mut pkg = pkg.read_write();
        let record = rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();
        assert_eq!(record.id, "s001");

        let mut pkg = pkg.read_only();
        assert!(matches!(SignCleaner::default().clean(&mut pkg), Err(Error::ReadOnly)));
    }
}

mod zip_package_tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contract.ofd");
        ZipPackage::create(&path, document_entries()).unwrap().close().unwrap();

        let mut pkg = ZipPackage::open(&path, OpenMode::ReadWrite).unwrap();
        rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();

        let mut pkg = ZipPackage::open(&path, OpenMode::ReadOnly).unwrap();
        assert!(pkg.contains("Doc_0/Signs/Sign_0/SignedValue.dat"));
        assert!(verifier().verify(&mut pkg).unwrap().is_valid());

        let mut pkg = ZipPackage::open(&path, OpenMode::ReadWrite).unwrap();
        pkg.write("Doc_0/Document.xml", b"<ofd:Document/>".to_vec()).unwrap();
        pkg.close().unwrap();

        let mut pkg = ZipPackage::open(&path, OpenMode::ReadOnly).unwrap();
        let report = verifier().verify(&mut pkg).unwrap();
        assert!(matches!(
            report.signatures[0].status.reason(),
            Some(InvalidReason::ContentTampered { path }) if path == "Doc_0/Document.xml"
        ));
    }

    fn snapshot(pkg: &ZipPackage) -> Vec<(String, Vec<u8>)> {
        pkg.list("")
            .unwrap()
            .into_iter()
            .map(|p| {
                let data = pkg.read(&p).unwrap();
                (p, data)
            })
            .collect()
    }

    #[test]
    fn test_failed_round_not_written_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contract.ofd");
        ZipPackage::create(&path, document_entries()).unwrap().close().unwrap();
        let bytes_before = std::fs::read(&path).unwrap();
        let entries_before = snapshot(&ZipPackage::open(&path, OpenMode::ReadOnly).unwrap());

        let cert = signer_identity().certificate.clone();
        let hook = SignFn::new(SignatureAlgorithm::Sha256WithRsa, cert, 128, |_: &[u8]| {
            Err(Error::Signing("device unplugged".into()))
        });
        let mut pkg = ZipPackage::open(&path, OpenMode::ReadWrite).unwrap();
        assert!(PackageSigner::new(hook, SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .is_err());

        let pkg = ZipPackage::open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(snapshot(&pkg), entries_before);
        assert!(!pkg.contains("Doc_0/Signs/Signatures.xml"));
        assert_eq!(std::fs::read(&path).unwrap(), bytes_before);

        // A later successful round is the only one on record.
        let mut pkg = ZipPackage::open(&path, OpenMode::ReadWrite).unwrap();
        let record = rsa_signer(SignConfig::default())
            .sign(&mut pkg, &SignOptions::default())
            .unwrap();
        assert_eq!(record.id, "s001");
        assert_eq!(record.round_dir(), "Doc_0/Signs/Sign_0/");

        let mut pkg = ZipPackage::open(&path, OpenMode::ReadOnly).unwrap();
        let report = verifier().verify(&mut pkg).unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.is_valid());
    }

    #[test]
    fn test_unsigned_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.ofd");
        ZipPackage::create(&path, document_entries()).unwrap().close().unwrap();

        let mut pkg = ZipPackage::open(&path, OpenMode::ReadOnly).unwrap();
        assert!(matches!(verifier().verify(&mut pkg), Err(Error::NotSigned)));
    }
}
