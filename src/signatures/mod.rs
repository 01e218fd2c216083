//! OFD digital signatures.
//!
//! A signing round adds three blobs to the package and one entry to the
//! signature list:
//!
//! - `Seal.esl`: the electronic seal wrapping the signer certificate
//!   (absent from `Sign` rounds)
//! - `SignedValue.dat`: the signature over `Signature.xml`, optionally protected
//! - `Signature.xml`: the descriptor listing every protected entry with its
//!   check value, the content digest and the byte windows excluded from
//!   digesting
//!
//! Rounds chain: a later round may protect the blobs of earlier rounds, and
//! its seal records the path of the previous seal. A round signed in
//! [`SignMode::WholeProtected`](crate::config::SignMode) also protects the
//! signature list, which locks the package against further rounds.
//!
//! ## Example
//!
//! ```ignore
//! use ofd_sign::package::{OpenMode, ZipPackage};
//! use ofd_sign::signatures::{PackageSigner, PackageVerifier, RsaSigner, RsaVerifier, SignOptions};
//! use ofd_sign::{SignConfig, SignatureAlgorithm};
//!
//! let signer = RsaSigner::from_pkcs8_pem(&key_pem, cert_der, SignatureAlgorithm::Sha256WithRsa)?;
//! let mut pkg = ZipPackage::open("contract.ofd", OpenMode::ReadWrite)?;
//! PackageSigner::new(signer, SignConfig::default()).sign(&mut pkg, &SignOptions::default())?;
//!
//! let mut pkg = ZipPackage::open("contract.ofd", OpenMode::ReadOnly)?;
//! let report = PackageVerifier::new(RsaVerifier::new(), SignConfig::default()).verify(&mut pkg)?;
//! assert!(report.is_valid());
//! ```
//!
//! ## Reference
//!
//! - GB/T 33190-2016 Section 18 - Digital Signatures
//! - GM/T 0031-2014 - Electronic seal data format

mod byterange;
mod capability;
mod cleaner;
mod container;
mod signer;
mod types;
mod verifier;
mod xml;

pub use byterange::{protected_bytes, splice, DigestEngine};
pub use capability::{RsaSigner, RsaVerifier, SignFn, SigningCapability, VerificationCapability};
pub use cleaner::SignCleaner;
pub use container::{
    format_sign_id, parse_sign_id, SignatureDescriptor, SignatureList, SignatureRecord,
};
pub use signer::PackageSigner;
pub use types::{
    ExclusionWindow, FileSelection, InvalidReason, PageSize, ReferenceDigest, RidingSide, RidingStamp,
    SignOptions, SignState, SignatureCheck, SignatureType, StampPlacement, VerificationReport,
    VerificationStatus, VerifyState,
};
pub use verifier::PackageVerifier;
pub use xml::OFD_NAMESPACE;
