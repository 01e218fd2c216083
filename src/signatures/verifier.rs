//! Verification orchestrator.
//!
//! Every entry of the signature list is checked independently through
//! `Opened → ReferencesRecomputed → Compared → Decoded → CryptoVerified`.
//! A signature that fails a step is reported with the reason and the state
//! it reached; the remaining signatures are still checked. Only conditions
//! that make the whole package unreadable abort with an error.
//!
//! The signature is checked over the stored `Signature.xml` bytes. Seal
//! rounds take the signer certificate from their seal; `Sign` rounds carry
//! no seal and use the certificate given with
//! [`PackageVerifier::with_signer_certificate`].

use crate::config::SignConfig;
use crate::crypto::certificate;
use crate::error::{Error, Result};
use crate::package::{normalize_path, Package, PackageGuard};
use crate::protection::{KeyMaterial, ProtectedContent, ProtectionEnvelope};
use crate::seal::{self, SealCapability};

use super::byterange::DigestEngine;
use super::capability::VerificationCapability;
use super::container::{SignatureDescriptor, SignatureList, SignatureRecord};
use super::types::{
    InvalidReason, SignatureCheck, SignatureType, VerificationReport, VerificationStatus, VerifyState,
};

/// Package verifier driven by a pluggable verification capability.
#[derive(Debug)]
pub struct PackageVerifier<V: VerificationCapability> {
    capability: V,
    config: SignConfig,
    key_material: KeyMaterial,
    signer_certificate: Option<Vec<u8>>,
}

impl<V: VerificationCapability> PackageVerifier<V> {
    /// Create a verifier. Signed values under an encrypting protection case
    /// need [`with_key_material`](Self::with_key_material).
    pub fn new(capability: V, config: SignConfig) -> Self {
        Self {
            capability,
            config,
            key_material: KeyMaterial::None,
            signer_certificate: None,
        }
    }

    /// DER certificate checking `Sign` rounds, which carry no seal.
    pub fn with_signer_certificate(mut self, certificate: Vec<u8>) -> Self {
        self.signer_certificate = Some(certificate);
        self
    }

    /// Keys used to open protected signed values.
    pub fn with_key_material(mut self, key_material: KeyMaterial) -> Self {
        self.key_material = key_material;
        self
    }

    /// Session configuration.
    pub fn config(&self) -> &SignConfig {
        &self.config
    }

    /// Check every signature in `package` and close it.
    ///
    /// # Errors
    ///
    /// [`Error::NotSigned`] when the package has no signature list, or an
    /// error reading or parsing the list itself. Per-signature failures are
    /// reported in the returned [`VerificationReport`].
    pub fn verify<P: Package + ?Sized>(&self, package: &mut P) -> Result<VerificationReport> {
        let mut guard = PackageGuard::new(package);
        let result = self.run(&*guard);
        let closed = guard.close();

        match (result, closed) {
            (Ok(report), Ok(())) => {
                log::info!(
                    "verified {} signature(s): {} invalid",
                    report.len(),
                    report.invalid().count()
                );
                Ok(report)
            },
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), close) => {
                if let Err(close_err) = close {
                    log::warn!("closing package after failed verification: {}", close_err);
                }
                Err(e)
            },
        }
    }

    fn run<P: Package + ?Sized>(&self, package: &P) -> Result<VerificationReport> {
        let list = SignatureList::load(package, &self.config.signatures_path)?.ok_or(Error::NotSigned)?;
        if list.is_empty() {
            return Err(Error::NotSigned);
        }

        let mut report = VerificationReport::default();
        for record in &list.records {
            let mut check = SignatureCheck {
                id: record.id.clone(),
                descriptor_path: record.descriptor_path.clone(),
                signer: None,
                seal_version: None,
                state: VerifyState::Opened,
                status: VerificationStatus::Valid,
            };

            if let Err(reason) = self.check_record(package, record, &mut check) {
                log::warn!("signature {} invalid after {}: {}", record.id, check.state, reason);
                check.status = VerificationStatus::Invalid(reason);
            } else {
                log::debug!("signature {} valid", record.id);
            }
            report.signatures.push(check);
        }
        Ok(report)
    }

    fn check_record<P: Package + ?Sized>(
        &self,
        package: &P,
        record: &SignatureRecord,
        check: &mut SignatureCheck,
    ) -> std::result::Result<(), InvalidReason> {
        let signed_bytes = package.read(&record.descriptor_path).map_err(malformed)?;
        let descriptor = SignatureDescriptor::from_xml(&signed_bytes).map_err(malformed)?;
        check_consistency(record, &descriptor)?;

        let engine = DigestEngine::new(descriptor.check_method);
        let files = descriptor.reference_paths();
        let recomputed = engine
            .compute_reference_digests(package, &files, &descriptor.exclusions)
            .map_err(|e| match e {
                Error::Reference(path) => InvalidReason::MissingReference { path },
                e @ (Error::InvalidExclusionWindow { .. } | Error::EmptyReferenceSet) => malformed(e),
                e => InvalidReason::VerificationError {
                    message: e.to_string(),
                },
            })?;
        advance(check, VerifyState::ReferencesRecomputed);

        for (recorded, current) in descriptor.references.iter().zip(&recomputed) {
            if !recorded.matches(current) {
                return Err(InvalidReason::ContentTampered {
                    path: recorded.path.clone(),
                });
            }
        }
        if let Some(recorded) = &descriptor.content_digest {
            let current = engine
                .compute_with_exclusion(package, &files, &descriptor.exclusions)
                .map_err(|e| InvalidReason::VerificationError {
                    message: e.to_string(),
                })?;
            if !crate::crypto::constant_time_eq(recorded, &current) {
                return Err(InvalidReason::ContentTampered {
                    path: record.descriptor_path.clone(),
                });
            }
        }
        advance(check, VerifyState::Compared);

        let signer_certificate = match (&record.seal_path, descriptor.signature_type) {
            (Some(seal_path), SignatureType::Seal) => {
                let seal_bytes = package.read(seal_path).map_err(|e| InvalidReason::SealInvalid {
                    message: e.to_string(),
                })?;
                let seal = seal::decode(&seal_bytes).map_err(|e| InvalidReason::SealInvalid {
                    message: e.to_string(),
                })?;
                check.seal_version = Some(seal.version().number());
                if seal.algorithm() != descriptor.signature_method {
                    return Err(InvalidReason::MalformedRecord {
                        message: format!(
                            "seal names {} but the descriptor names {}",
                            seal.algorithm().name(),
                            descriptor.signature_method.name()
                        ),
                    });
                }
                seal.certificate().to_vec()
            },
            (None, SignatureType::Seal) => {
                return Err(InvalidReason::MalformedRecord {
                    message: "seal signature without a seal".to_string(),
                });
            },
            (_, SignatureType::Sign) => {
                self.signer_certificate
                    .clone()
                    .ok_or_else(|| InvalidReason::CertificateInvalid {
                        message: "no signer certificate supplied for a Sign signature".to_string(),
                    })?
            },
        };
        check.signer = certificate::subject(&signer_certificate).ok();
        advance(check, VerifyState::Decoded);

        let protection_failed = |e: Error| InvalidReason::ProtectionFailed {
            message: e.to_string(),
        };
        let blob = package.read(&record.signed_value_path).map_err(protection_failed)?;
        let protected = ProtectedContent::from_blob(record.protection_case, &blob).map_err(protection_failed)?;
        let signature = ProtectionEnvelope::from_config(&self.config)
            .unprotect(record.protection_case, &protected, &self.key_material)
            .map_err(protection_failed)?;

        let verified = self
            .capability
            .verify_with(descriptor.signature_method, &signed_bytes, &signature, &signer_certificate)
            .map_err(|e| {
                if e.is_certificate_error() {
                    InvalidReason::CertificateInvalid {
                        message: e.to_string(),
                    }
                } else {
                    InvalidReason::VerificationError {
                        message: e.to_string(),
                    }
                }
            })?;
        if !verified {
            return Err(InvalidReason::SignatureMismatch);
        }
        advance(check, VerifyState::CryptoVerified);
        Ok(())
    }
}

fn advance(check: &mut SignatureCheck, next: VerifyState) {
    log::debug!("verify {}: {} -> {}", check.id, check.state, next);
    check.state = next;
}

fn malformed(e: Error) -> InvalidReason {
    InvalidReason::MalformedRecord {
        message: e.to_string(),
    }
}

/// The list entry and its descriptor must agree, and the only excluded
/// bytes may be the signed value's own.
fn check_consistency(
    record: &SignatureRecord,
    descriptor: &SignatureDescriptor,
) -> std::result::Result<(), InvalidReason> {
    if descriptor.signature_type != record.signature_type {
        return Err(InvalidReason::MalformedRecord {
            message: format!(
                "descriptor type {} disagrees with the signature list type {}",
                descriptor.signature_type.name(),
                record.signature_type.name()
            ),
        });
    }
    if descriptor.seal_path.as_deref().map(normalize_path) != record.seal_path
        || normalize_path(&descriptor.signed_value_path) != record.signed_value_path
    {
        return Err(InvalidReason::MalformedRecord {
            message: "descriptor locations disagree with the signature list".to_string(),
        });
    }
    if let Some(window) = descriptor
        .exclusions
        .iter()
        .find(|w| w.path != record.signed_value_path)
    {
        return Err(InvalidReason::MalformedRecord {
            message: format!("exclusion window targets {}", window.path),
        });
    }
    Ok(())
}
