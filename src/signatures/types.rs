//! Signature types and data structures.

use std::fmt;

use serde::Serialize;

use crate::crypto::{constant_time_eq, DigestAlgorithm};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::package::normalize_path;
use crate::protection::{KeyMaterial, ProtectionCase};
use crate::seal::{SealStructure, SealTemplate};

/// Byte range of a package entry left out of every digest.
///
/// The range is physically removed before hashing, not zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExclusionWindow {
    /// Package entry the window applies to
    pub path: String,
    /// First excluded byte
    pub offset: usize,
    /// Number of excluded bytes
    pub length: usize,
}

impl ExclusionWindow {
    /// Create a window. The path is normalized.
    pub fn new(path: &str, offset: usize, length: usize) -> Self {
        Self {
            path: normalize_path(path),
            offset,
            length,
        }
    }

    /// One past the last excluded byte, if it does not overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }
}

/// Check value of one protected entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDigest {
    /// Package entry
    pub path: String,
    /// Digest algorithm
    pub algorithm: DigestAlgorithm,
    /// Digest value
    pub value: Vec<u8>,
}

impl ReferenceDigest {
    /// Whether `other` carries the same value for the same entry and algorithm.
    pub fn matches(&self, other: &ReferenceDigest) -> bool {
        self.path == other.path
            && self.algorithm == other.algorithm
            && constant_time_eq(&self.value, &other.value)
    }
}

/// Visible stamp of a signature on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct StampPlacement {
    /// Annotation identifier
    pub id: String,
    /// Page identifier the stamp is drawn on
    pub page_ref: String,
    /// Stamp box in page space
    pub boundary: Rect,
    /// Optional clip box
    pub clip: Option<Rect>,
}

impl StampPlacement {
    /// Create a placement without a clip.
    pub fn new(id: impl Into<String>, page_ref: impl Into<String>, boundary: Rect) -> Self {
        Self {
            id: id.into(),
            page_ref: page_ref.into(),
            boundary,
            clip: None,
        }
    }

    /// Set the clip box.
    pub fn with_clip(mut self, clip: Rect) -> Self {
        self.clip = Some(clip);
        self
    }
}

/// Kind of a signing round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SignatureType {
    /// Electronic seal: the round carries a seal binding the signer certificate
    #[default]
    Seal,
    /// Plain digital signature: no seal; the verifier supplies the certificate
    Sign,
}

impl SignatureType {
    /// Attribute value in the signature part-files.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureType::Seal => "Seal",
            SignatureType::Sign => "Sign",
        }
    }

    /// Parse an attribute value. A missing `Type` means [`SignatureType::Seal`].
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim() {
            "Seal" | "" => Ok(SignatureType::Seal),
            "Sign" => Ok(SignatureType::Sign),
            other => Err(Error::Xml(format!("unknown signature type '{}'", other))),
        }
    }
}

/// Page edge a riding stamp straddles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RidingSide {
    /// Left edge
    Left,
    /// Right edge
    #[default]
    Right,
    /// Top edge
    Top,
    /// Bottom edge
    Bottom,
}

/// Page identifier and size, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSize {
    /// Page object identifier referenced by `PageRef`
    pub page_ref: String,
    /// Page width in millimetres
    pub width: f64,
    /// Page height in millimetres
    pub height: f64,
}

impl PageSize {
    /// Create a page entry.
    pub fn new(page_ref: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            page_ref: page_ref.into(),
            width,
            height,
        }
    }
}

/// Stamp split across the edge of every page, so that the stacked pages
/// show the whole seal.
///
/// Each page gets the full stamp box shifted so that only its own slice
/// lands on the page, and a clip selecting that slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RidingStamp {
    /// Edge the stamp rides on
    pub side: RidingSide,
    /// Distance from the top (left/right sides) or left (top/bottom sides)
    /// page edge; centred when unset
    pub offset: Option<f64>,
    /// Stamp width in millimetres
    pub width: f64,
    /// Stamp height in millimetres
    pub height: f64,
}

impl RidingStamp {
    /// Riding stamp on the right edge, vertically centred.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            side: RidingSide::Right,
            offset: None,
            width,
            height,
        }
    }

    /// Set the edge.
    pub fn with_side(mut self, side: RidingSide) -> Self {
        self.side = side;
        self
    }

    /// Set the offset along the edge.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// One placement per page. Identifiers continue from `first_id`.
    pub fn placements(&self, pages: &[PageSize], first_id: u32) -> Vec<StampPlacement> {
        let count = pages.len();
        pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let (boundary, clip) = self.slice(page, i, count);
                StampPlacement::new((first_id as usize + i).to_string(), page.page_ref.as_str(), boundary)
                    .with_clip(clip)
            })
            .collect()
    }

    fn slice(&self, page: &PageSize, i: usize, count: usize) -> (Rect, Rect) {
        let n = count as f64;
        let idx = i as f64;
        let rev = (count - 1 - i) as f64;
        match self.side {
            RidingSide::Left | RidingSide::Right => {
                let item = self.width / n;
                let y = self.offset.unwrap_or(page.height / 2.0 - self.height / 2.0);
                let (x, clip_x) = if self.side == RidingSide::Right {
                    (page.width - item * (idx + 1.0), idx * item)
                } else {
                    (-item * rev, rev * item)
                };
                (
                    Rect::new(x, y, self.width, self.height),
                    Rect::new(clip_x, 0.0, item, self.height),
                )
            },
            RidingSide::Top | RidingSide::Bottom => {
                let item = self.height / n;
                let x = self.offset.unwrap_or(page.width / 2.0 - self.width / 2.0);
                let (y, clip_y) = if self.side == RidingSide::Bottom {
                    (page.height - item * (idx + 1.0), idx * item)
                } else {
                    (-item * rev, rev * item)
                };
                (
                    Rect::new(x, y, self.width, self.height),
                    Rect::new(0.0, clip_y, self.width, item),
                )
            },
        }
    }
}

/// Which package entries a signing round protects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileSelection {
    /// Every entry, including earlier rounds' signatures. The signature list
    /// is left out unless the round locks the package.
    #[default]
    All,
    /// Like `All`, minus everything under earlier `Sign_*` directories
    ExcludePriorSignatures,
    /// Exactly these entries, in this order
    Explicit(Vec<String>),
}

/// Options for one signing round.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Seal or plain signature
    pub signature_type: SignatureType,
    /// Protection case governing the round
    pub protection_case: ProtectionCase,
    /// Keys for the protection case
    pub key_material: KeyMaterial,
    /// Entries to protect
    pub file_selection: FileSelection,
    /// Visible stamps
    pub stamps: Vec<StampPlacement>,
    /// Recipe for the seal built around the signer's certificate
    pub seal_template: SealTemplate,
    /// Ready-made seal; takes precedence over the template
    pub seal: Option<SealStructure>,
}

impl SignOptions {
    /// Create options with defaults: signature only, all entries, no stamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the protection case and its keys.
    pub fn with_protection(mut self, case: ProtectionCase, key_material: KeyMaterial) -> Self {
        self.protection_case = case;
        self.key_material = key_material;
        self
    }

    /// Set the signature type.
    pub fn with_signature_type(mut self, signature_type: SignatureType) -> Self {
        self.signature_type = signature_type;
        self
    }

    /// Set the file selection.
    pub fn with_file_selection(mut self, selection: FileSelection) -> Self {
        self.file_selection = selection;
        self
    }

    /// Add a visible stamp.
    pub fn with_stamp(mut self, stamp: StampPlacement) -> Self {
        self.stamps.push(stamp);
        self
    }

    /// Add a riding stamp across `pages`, numbered after the existing stamps.
    pub fn with_riding_stamp(mut self, stamp: &RidingStamp, pages: &[PageSize]) -> Self {
        let first_id = self.stamps.len() as u32 + 1;
        self.stamps.extend(stamp.placements(pages, first_id));
        self
    }

    /// Set the seal template.
    pub fn with_seal_template(mut self, template: SealTemplate) -> Self {
        self.seal_template = template;
        self
    }

    /// Use a ready-made seal.
    pub fn with_seal(mut self, seal: SealStructure) -> Self {
        self.seal = Some(seal);
        self
    }
}

/// States of a signing round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignState {
    /// Package open, signature list loaded, round allocated
    Opened,
    /// Reference digests computed
    ReferencesCollected,
    /// Content digest computed and the descriptor serialized
    ToBeSignedComputed,
    /// Signing capability returned a signature
    Signed,
    /// Signed value and descriptor written
    Embedded,
    /// Package closed
    Closed,
}

/// States of verifying one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerifyState {
    /// Package open, signature list loaded
    Opened,
    /// Reference digests recomputed over current content
    ReferencesRecomputed,
    /// Recomputed digests compared with the recorded ones
    Compared,
    /// Seal decoded
    Decoded,
    /// Signature checked by the verification capability
    CryptoVerified,
    /// Package closed
    Closed,
}

impl fmt::Display for SignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for VerifyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a signature did not verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidReason {
    /// A protected entry no longer matches its check value
    ContentTampered {
        /// First mismatching entry
        path: String,
    },
    /// A protected entry is gone
    MissingReference {
        /// Missing entry
        path: String,
    },
    /// The seal blob could not be decoded
    SealInvalid {
        /// Decoder message
        message: String,
    },
    /// The signed value could not be unwrapped
    ProtectionFailed {
        /// Envelope message
        message: String,
    },
    /// The signature does not match the signed descriptor
    SignatureMismatch,
    /// The signer certificate is unusable
    CertificateInvalid {
        /// Certificate message
        message: String,
    },
    /// The signature entry or its descriptor is inconsistent
    MalformedRecord {
        /// What was wrong
        message: String,
    },
    /// The verification capability failed for another reason
    VerificationError {
        /// Capability message
        message: String,
    },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::ContentTampered { path } => write!(f, "content tampered: {}", path),
            InvalidReason::MissingReference { path } => write!(f, "missing reference: {}", path),
            InvalidReason::SealInvalid { message } => write!(f, "invalid seal: {}", message),
            InvalidReason::ProtectionFailed { message } => {
                write!(f, "protection failed: {}", message)
            },
            InvalidReason::SignatureMismatch => write!(f, "signature mismatch"),
            InvalidReason::CertificateInvalid { message } => {
                write!(f, "invalid certificate: {}", message)
            },
            InvalidReason::MalformedRecord { message } => {
                write!(f, "malformed record: {}", message)
            },
            InvalidReason::VerificationError { message } => {
                write!(f, "verification error: {}", message)
            },
        }
    }
}

/// Outcome for one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    /// All checks passed
    Valid,
    /// A check failed
    Invalid(InvalidReason),
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<&InvalidReason> {
        match self {
            VerificationStatus::Valid => None,
            VerificationStatus::Invalid(reason) => Some(reason),
        }
    }
}

/// Verification result of one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureCheck {
    /// Signature identifier
    pub id: String,
    /// Descriptor location
    pub descriptor_path: String,
    /// Subject of the signer certificate, once the seal was decoded
    pub signer: Option<String>,
    /// Seal header version, once the seal was decoded
    pub seal_version: Option<u32>,
    /// Last state reached
    pub state: VerifyState,
    /// Outcome
    pub status: VerificationStatus,
}

impl SignatureCheck {
    /// Check if this signature verified.
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }
}

/// Per-signature and overall verification result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// One entry per signature, in list order
    pub signatures: Vec<SignatureCheck>,
}

impl VerificationReport {
    /// True when at least one signature exists and every one verified.
    pub fn is_valid(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(SignatureCheck::is_valid)
    }

    /// Number of signatures checked.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether no signature was checked.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Look up a signature by identifier.
    pub fn get(&self, id: &str) -> Option<&SignatureCheck> {
        self.signatures.iter().find(|s| s.id == id)
    }

    /// Signatures that failed.
    pub fn invalid(&self) -> impl Iterator<Item = &SignatureCheck> {
        self.signatures.iter().filter(|s| !s.is_valid())
    }
}
