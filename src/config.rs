//! Configuration for signing and verification sessions.
//!
//! Algorithm choices live here and are handed to the digest engine and the
//! protection envelope when a session is built.

use crate::crypto::{CipherAlgorithm, DigestAlgorithm};

/// Default location of the signature list inside a package.
pub const DEFAULT_SIGNATURES_PATH: &str = "Doc_0/Signs/Signatures.xml";

/// Whether a signing round leaves room for further rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMode {
    /// The signature list stays outside the protected set; more rounds may be appended.
    #[default]
    ContinueSign,
    /// The signature list is protected too; the package is locked after this round.
    WholeProtected,
}

/// Identity of the software writing signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Provider name
    pub name: String,
    /// Provider version
    pub version: String,
    /// Vendor
    pub company: Option<String>,
}

impl Default for ProviderInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            company: None,
        }
    }
}

/// Signing session configuration.
#[derive(Debug, Clone)]
pub struct SignConfig {
    /// Digest for reference check values and the content digest.
    pub digest_algorithm: DigestAlgorithm,

    /// Cipher for the encrypting protection cases.
    pub cipher: CipherAlgorithm,

    /// Package path of the signature list.
    pub signatures_path: String,

    /// Continue or lock.
    pub sign_mode: SignMode,

    /// Written into every signature descriptor.
    pub provider: ProviderInfo,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sm3,
            cipher: CipherAlgorithm::Sm4Cbc,
            signatures_path: DEFAULT_SIGNATURES_PATH.to_string(),
            sign_mode: SignMode::ContinueSign,
            provider: ProviderInfo::default(),
        }
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set the cipher.
    pub fn with_cipher(mut self, cipher: CipherAlgorithm) -> Self {
        self.cipher = cipher;
        self
    }

    /// Set the signature list location.
    pub fn with_signatures_path(mut self, path: impl Into<String>) -> Self {
        self.signatures_path = crate::package::normalize_path(&path.into());
        self
    }

    /// Set the sign mode.
    pub fn with_sign_mode(mut self, mode: SignMode) -> Self {
        self.sign_mode = mode;
        self
    }

    /// Set the provider identity.
    pub fn with_provider(mut self, provider: ProviderInfo) -> Self {
        self.provider = provider;
        self
    }

    /// Directory holding the signature list and the per-round directories.
    pub fn signs_dir(&self) -> String {
        crate::package::parent_dir(&self.signatures_path)
    }
}
