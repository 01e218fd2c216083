//! Signing orchestrator.
//!
//! One call to [`PackageSigner::sign`] runs one signing round through
//! `Opened → ReferencesCollected → ToBeSignedComputed → Signed → Embedded →
//! Closed`. The package is closed on every exit path.
//!
//! The round lays out its files under the signature list's directory:
//!
//! ```text
//! Doc_0/Signs/Signatures.xml
//! Doc_0/Signs/Sign_0/Seal.esl
//! Doc_0/Signs/Sign_0/SignedValue.dat
//! Doc_0/Signs/Sign_0/Signature.xml
//! ```
//!
//! `SignedValue.dat` is written twice: first as a zero placeholder of the
//! exact final size, whose bytes are excluded from every digest, then with
//! the real value. `Sign` rounds have no `Seal.esl`.
//!
//! The signature covers the serialized `Signature.xml`, which records every
//! check value and the digest of the protected content. All writes of a
//! round are staged and reach the package only once the round is embedded;
//! a failed round leaves the package as it found it.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{SignConfig, SignMode};
use crate::error::{Error, Result};
use crate::package::{normalize_path, OpenMode, Package, PackageGuard, StagedPackage};
use crate::protection::ProtectionEnvelope;
use crate::seal::{SealCapability, SealStructure};

use super::byterange::DigestEngine;
use super::capability::SigningCapability;
use super::container::{SignatureDescriptor, SignatureList, SignatureRecord};
use super::types::{ExclusionWindow, FileSelection, SignOptions, SignState, SignatureType};

lazy_static! {
    static ref ROUND_DIR: Regex = Regex::new(r"^Sign_(\d+)/").expect("valid regex");
}

const SEAL_FILE: &str = "Seal.esl";
const SIGNED_VALUE_FILE: &str = "SignedValue.dat";
const DESCRIPTOR_FILE: &str = "Signature.xml";

/// Package signer driven by a pluggable signing capability.
#[derive(Debug)]
pub struct PackageSigner<S: SigningCapability> {
    capability: S,
    config: SignConfig,
}

impl<S: SigningCapability> PackageSigner<S> {
    /// Create a signer.
    pub fn new(capability: S, config: SignConfig) -> Self {
        Self { capability, config }
    }

    /// Session configuration.
    pub fn config(&self) -> &SignConfig {
        &self.config
    }

    /// The signing capability.
    pub fn capability(&self) -> &S {
        &self.capability
    }

    /// Append one signing round to `package` and close it.
    ///
    /// Returns the record appended to the signature list. On failure the
    /// first error is returned; a failure to close afterwards is logged.
    pub fn sign<P: Package + ?Sized>(
        &self,
        package: &mut P,
        options: &SignOptions,
    ) -> Result<SignatureRecord> {
        let mut guard = PackageGuard::new(package);
        let mut state = SignState::Opened;
        let result = self.run(&mut *guard, options, &mut state);
        let closed = guard.close();
        log::debug!("sign: {} -> {}", state, SignState::Closed);

        match (result, closed) {
            (Ok(record), Ok(())) => {
                log::info!(
                    "signed round {} ({}) under case {}",
                    record.id,
                    record.descriptor_path,
                    record.protection_case.id()
                );
                Ok(record)
            },
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), close) => {
                if let Err(close_err) = close {
                    log::warn!("closing package after failed signing: {}", close_err);
                }
                log::warn!("signing failed in state {}: {}", state, e);
                Err(e)
            },
        }
    }

    fn run<P: Package + ?Sized>(
        &self,
        package: &mut P,
        options: &SignOptions,
        state: &mut SignState,
    ) -> Result<SignatureRecord> {
        if package.mode() == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }

        let list_path = self.config.signatures_path.as_str();
        let mut list = SignatureList::load(package, list_path)?.unwrap_or_default();
        check_not_terminated(package, &list, list_path)?;

        let id = list.next_id();
        let round_dir = next_round_dir(package, &self.config.signs_dir())?;
        log::debug!("sign: {} allocated {} in {}", state, id, round_dir);

        // Everything that can be rejected up front is checked before the first write.
        let envelope = ProtectionEnvelope::from_config(&self.config);
        let reserved = envelope.protected_len(
            options.protection_case,
            self.capability.signature_len(),
            &options.key_material,
        )?;
        let prior_seal = list.last_sealed().and_then(|r| r.seal_path.clone());
        let seal_bytes = match options.signature_type {
            SignatureType::Seal => Some(self.seal_for(options, prior_seal)?.raw_bytes()?),
            SignatureType::Sign if options.seal.is_some() => {
                return Err(Error::InvalidArgument(
                    "a Sign round carries no seal".to_string(),
                ));
            },
            SignatureType::Sign => None,
        };

        // Nothing reaches the package until the round is embedded.
        let mut staged = StagedPackage::new(package);

        let seal_path = match seal_bytes {
            Some(bytes) => {
                let path = format!("{}{}", round_dir, SEAL_FILE);
                staged.write(&path, bytes)?;
                Some(path)
            },
            None => None,
        };
        let signed_value_path = format!("{}{}", round_dir, SIGNED_VALUE_FILE);
        staged.write(&signed_value_path, vec![0u8; reserved])?;
        let window = ExclusionWindow::new(&signed_value_path, 0, reserved);

        // List entry, final before any digest is taken
        let record = SignatureRecord {
            id,
            signature_type: options.signature_type,
            descriptor_path: format!("{}{}", round_dir, DESCRIPTOR_FILE),
            protection_case: options.protection_case,
            seal_path: seal_path.clone(),
            signed_value_path: signed_value_path.clone(),
            stamps: options.stamps.clone(),
            created: now_seconds()?,
        };
        list.push(record.clone())?;
        staged.write(list_path, list.to_xml()?)?;

        let files = self.select_files(&staged, &options.file_selection, &list, &record)?;
        let engine = DigestEngine::from_config(&self.config);
        let exclusions = [window];
        let references = engine.compute_reference_digests(&staged, &files, &exclusions)?;
        self.advance(state, SignState::ReferencesCollected);

        let content_digest = engine.compute_with_exclusion(&staged, &files, &exclusions)?;
        let descriptor = SignatureDescriptor {
            signature_type: options.signature_type,
            provider: self.config.provider.clone(),
            signature_method: self.capability.algorithm(),
            signature_time: record.created,
            check_method: engine.algorithm(),
            references,
            content_digest: Some(content_digest),
            stamps: options.stamps.clone(),
            seal_path,
            signed_value_path: signed_value_path.clone(),
            exclusions: exclusions.to_vec(),
        };
        // The descriptor bytes as stored are what the signature covers.
        let to_be_signed = descriptor.to_xml()?;
        self.advance(state, SignState::ToBeSignedComputed);

        let signature = self.capability.sign(&to_be_signed)?;
        if signature.len() != self.capability.signature_len() {
            return Err(Error::Signing(format!(
                "capability returned {} bytes but announced {}",
                signature.len(),
                self.capability.signature_len()
            )));
        }
        self.advance(state, SignState::Signed);

        let blob = envelope
            .protect(options.protection_case, &signature, &options.key_material)?
            .to_blob()?;
        if blob.len() != reserved {
            return Err(Error::SignedValueSize {
                reserved,
                actual: blob.len(),
            });
        }
        staged.write(&signed_value_path, blob)?;
        staged.write(&record.descriptor_path, to_be_signed)?;
        self.advance(state, SignState::Embedded);

        let committed = staged.commit()?;
        log::debug!("round {} committed {} entries", record.id, committed);
        Ok(record)
    }

    fn advance(&self, state: &mut SignState, next: SignState) {
        log::debug!("sign: {} -> {}", state, next);
        *state = next;
    }

    fn seal_for(&self, options: &SignOptions, prior_seal: Option<String>) -> Result<SealStructure> {
        let algorithm = self.capability.algorithm();
        match &options.seal {
            Some(seal) => {
                if seal.algorithm() != algorithm {
                    return Err(Error::InvalidArgument(format!(
                        "seal names {} but the capability signs with {}",
                        seal.algorithm().name(),
                        algorithm.name()
                    )));
                }
                if seal.certificate() != self.capability.certificate() {
                    return Err(Error::InvalidArgument(
                        "seal certificate differs from the signer certificate".to_string(),
                    ));
                }
                Ok(seal.clone())
            },
            None => options
                .seal_template
                .build(self.capability.certificate(), algorithm, prior_seal),
        }
    }

    /// Resolve the entries protected by this round, in package order.
    fn select_files<P: Package + ?Sized>(
        &self,
        package: &P,
        selection: &FileSelection,
        list: &SignatureList,
        current: &SignatureRecord,
    ) -> Result<Vec<String>> {
        let list_path = self.config.signatures_path.as_str();
        let lock = self.config.sign_mode == SignMode::WholeProtected;

        let mut files: Vec<String> = match selection {
            FileSelection::All | FileSelection::ExcludePriorSignatures => {
                let prior_dirs: Vec<String> = match selection {
                    FileSelection::ExcludePriorSignatures => list
                        .records
                        .iter()
                        .filter(|r| r.id != current.id)
                        .map(SignatureRecord::round_dir)
                        .collect(),
                    _ => Vec::new(),
                };
                package
                    .list("")?
                    .into_iter()
                    .filter(|p| p != list_path || lock)
                    .filter(|p| !prior_dirs.iter().any(|d| p.starts_with(d.as_str())))
                    .collect()
            },
            FileSelection::Explicit(paths) => {
                let mut out: Vec<String> = Vec::with_capacity(paths.len());
                for path in paths.iter().map(|p| normalize_path(p)) {
                    if !out.contains(&path) {
                        out.push(path);
                    }
                }
                out
            },
        };

        if lock && !files.iter().any(|p| p == list_path) {
            files.push(list_path.to_string());
        }
        log::debug!("round {} protects {} entries", current.id, files.len());
        Ok(files)
    }
}

/// Refuse to append when an earlier round protected the signature list.
fn check_not_terminated<P: Package + ?Sized>(
    package: &P,
    list: &SignatureList,
    list_path: &str,
) -> Result<()> {
    for record in &list.records {
        let descriptor = match SignatureDescriptor::load(package, &record.descriptor_path) {
            Ok(descriptor) => descriptor,
            Err(Error::EntryNotFound(path)) => {
                log::warn!("signature {} has no descriptor at {}", record.id, path);
                continue;
            },
            Err(e) => return Err(e),
        };
        if descriptor.protects(list_path) {
            log::debug!("signature {} protects {}", record.id, list_path);
            return Err(Error::SignatureTerminated);
        }
    }
    Ok(())
}

/// First free `Sign_{n}/` directory: one past the highest existing index.
fn next_round_dir<P: Package + ?Sized>(package: &P, signs_dir: &str) -> Result<String> {
    let next = package
        .list(signs_dir)?
        .iter()
        .filter_map(|p| {
            p.strip_prefix(signs_dir)
                .and_then(|rest| ROUND_DIR.captures(rest))
                .and_then(|c| c[1].parse::<u64>().ok())
        })
        .max()
        .map_or(0, |n| n + 1);
    Ok(format!("{}Sign_{}/", signs_dir, next))
}

fn now_seconds() -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0)
        .ok_or_else(|| Error::InvalidArgument("system time out of range".to_string()))
}
