// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::enum_variant_names)]
#![allow(clippy::new_without_default)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # OFD Sign
//!
//! Digital signing, electronic seals and integrity protection for OFD
//! (GB/T 33190) document packages.
//!
//! ## Core Features
//!
//! - **Byte-Range Digests**: per-entry check values and a content digest,
//!   with exclusion windows so the signature can be written after digesting
//! - **Electronic Seals**: version 1 and version 4 seal structures, detected
//!   from the header
//! - **Protection Cases**: signature only, password-protected and
//!   certificate-protected signed values
//! - **Signature Containers**: the signature list and per-round descriptors
//! - **Orchestration**: sign and verify sessions with pluggable signing and
//!   verification capabilities, multi-round chaining, and guaranteed close
//! - **SM3/SM4**: domestic digest and cipher by default, SHA-2 and AES available
//!
//! ## Quick Start
//!
//! ```ignore
//! use ofd_sign::package::MemoryPackage;
//! use ofd_sign::signatures::{PackageSigner, PackageVerifier, RsaSigner, RsaVerifier, SignOptions};
//! use ofd_sign::{SignConfig, SignatureAlgorithm};
//!
//! # fn main() -> ofd_sign::Result<()> {
//! let signer = RsaSigner::new(key, cert_der, SignatureAlgorithm::Sha256WithRsa)?;
//! let mut pkg = MemoryPackage::from_entries(entries);
//! let record = PackageSigner::new(signer, SignConfig::default())
//!     .sign(&mut pkg, &SignOptions::default())?;
//! println!("signed as {}", record.id);
//!
//! let mut pkg = pkg.read_only();
//! let report = PackageVerifier::new(RsaVerifier::new(), SignConfig::default()).verify(&mut pkg)?;
//! assert!(report.is_valid());
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Algorithms: digests, ciphers, KDF, certificates
pub mod crypto;

// Stamp geometry
pub mod geometry;

// Package container
pub mod package;

// Electronic seals
pub mod seal;

// Signed value protection
pub mod protection;

// Digital signatures
pub mod signatures;

#[cfg(test)]
mod test_utils;

// Re-exports
pub use config::{ProviderInfo, SignConfig, SignMode};
pub use crypto::{CipherAlgorithm, DigestAlgorithm, SignatureAlgorithm};
pub use error::{Error, Result};
pub use package::{MemoryPackage, OpenMode, Package, ZipPackage};
pub use protection::{KeyMaterial, ProtectionCase};
pub use seal::{SealStructure, SealTemplate, SealVersion};
pub use signatures::{
    PackageSigner, PackageVerifier, SignCleaner, SignOptions, SignatureType, VerificationReport,
    VerificationStatus,
};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
