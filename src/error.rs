//! Error types for the signing library.
//!
//! Signing fails fast with one of these kinds. Verification findings are not
//! errors: they are reported per signature through
//! [`InvalidReason`](crate::signatures::InvalidReason).

/// Result type alias for signing library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while signing, sealing or protecting a package.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// A file selected for protection is missing or unreadable
    #[error("Protected file not found in package: {0}")]
    Reference(String),

    /// Signing was requested over an empty file selection
    #[error("No files selected for protection")]
    EmptyReferenceSet,

    /// Exclusion window does not fit the entry it targets
    #[error("Invalid exclusion window for '{path}': {reason}")]
    InvalidExclusionWindow {
        /// Package entry the window applies to
        path: String,
        /// Why the window was rejected
        reason: String,
    },

    /// Seal header carries a version this codec does not know
    #[error("Unknown seal version: {0}")]
    UnknownSealVersion(u32),

    /// Seal blob is truncated or structurally invalid
    #[error("Malformed seal structure: {0}")]
    SealDecode(String),

    /// Embedded or supplied certificate could not be parsed or is not usable
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Algorithm identifier not supported here
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Wrong password or key. Indistinguishable from corrupted ciphertext.
    #[error("Key mismatch: wrong password or key, or corrupted ciphertext")]
    KeyMismatch,

    /// Protection case identifier not recognised
    #[error("Unsupported protection case: {0}")]
    UnsupportedProtectionCase(String),

    /// Protected content was produced under a different protection case
    #[error("Protection case mismatch: expected {expected}, found {found}")]
    ProtectionCaseMismatch {
        /// Case the caller asked for
        expected: String,
        /// Case recorded in the content
        found: String,
    },

    /// Key material does not fit the protection case
    #[error("Missing key material: {0}")]
    MissingKeyMaterial(String),

    /// Protection envelope blob is malformed
    #[error("Malformed protection envelope: {0}")]
    Envelope(String),

    /// Package carries no signature list
    #[error("Document is not signed")]
    NotSigned,

    /// An existing signature protects the signature list, so no round may be appended
    #[error("Signature list is protected by an existing signature; document is locked")]
    SignatureTerminated,

    /// Signed value does not fit the reserved placeholder
    #[error("Signed value is {actual} bytes but {reserved} bytes were reserved")]
    SignedValueSize {
        /// Bytes reserved before signing
        reserved: usize,
        /// Bytes actually produced
        actual: usize,
    },

    /// Signing capability failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Signature part-file could not be read or written
    #[error("Invalid signature XML: {0}")]
    Xml(String),

    /// Caller passed an argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Package entry not found
    #[error("Package entry not found: {0}")]
    EntryNotFound(String),

    /// Write attempted on a read-only package
    #[error("Package is opened read-only")]
    ReadOnly,

    /// Package used after close
    #[error("Package is closed")]
    PackageClosed,

    /// Low-level cryptographic failure
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Certificate issuance failed
    #[error("Certificate issuance failed: {0}")]
    Certificate(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    /// Whether this error concerns a certificate rather than a signature value.
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, Error::InvalidCertificate(_))
    }
}

/// Map any XML library error into [`Error::Xml`].
pub(crate) fn xml_error<E: std::fmt::Display>(err: E) -> Error {
    Error::Xml(err.to_string())
}
