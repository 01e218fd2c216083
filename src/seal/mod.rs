//! Electronic seal (SES) structures.
//!
//! A seal binds a certificate to signing metadata and a stamp picture. Two
//! DER layouts exist in the wild:
//!
//! - version 1 ([`LegacySeal`]): fixed layout, UTCTime dates
//! - version 4 ([`CurrentSeal`]): extensible layout, GeneralizedTime dates,
//!   optional link to a prior seal
//!
//! [`decode`] reads the header version first and dispatches on it. Any other
//! version fails with [`Error::UnknownSealVersion`]; nothing falls back to a
//! default layout. After decoding, callers use the [`SealCapability`]
//! accessors and never need to branch on the version.

mod asn1;
mod current;
mod legacy;

pub use current::CurrentSeal;
pub use legacy::LegacySeal;

use chrono::{DateTime, Duration, Utc};
use der::asn1::AnyRef;
use der::{Decode, SliceReader, Tag, Tagged};

use self::asn1::{decode_error, SesHeader, HEADER_ID};
use crate::crypto::SignatureAlgorithm;
use crate::error::{Error, Result};

/// Seal layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SealVersion {
    /// Version 1
    Legacy,
    /// Version 4
    #[default]
    Current,
}

impl SealVersion {
    /// Version number carried in the seal header.
    pub fn number(&self) -> u32 {
        match self {
            SealVersion::Legacy => legacy::VERSION,
            SealVersion::Current => current::VERSION,
        }
    }

    /// Map a header version number to a layout.
    pub fn from_number(version: u32) -> Result<Self> {
        match version {
            legacy::VERSION => Ok(SealVersion::Legacy),
            current::VERSION => Ok(SealVersion::Current),
            other => Err(Error::UnknownSealVersion(other)),
        }
    }
}

/// Stamp image carried by a seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealPicture {
    /// Image format, e.g. `png` or `ofd`
    pub kind: String,
    /// Image bytes
    pub data: Vec<u8>,
    /// Display width in millimetres
    pub width: u32,
    /// Display height in millimetres
    pub height: u32,
}

impl Default for SealPicture {
    fn default() -> Self {
        Self {
            kind: "png".to_string(),
            data: Vec::new(),
            width: 40,
            height: 40,
        }
    }
}

/// Layout-independent seal metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealInfo {
    /// Issuing vendor identifier
    pub vendor_id: String,
    /// Seal identifier
    pub es_id: String,
    /// Seal type code
    pub seal_type: u32,
    /// Seal name
    pub name: String,
    /// Creation time (whole seconds)
    pub created: DateTime<Utc>,
    /// Start of validity
    pub valid_start: DateTime<Utc>,
    /// End of validity
    pub valid_end: DateTime<Utc>,
    /// Stamp image
    pub picture: SealPicture,
}

/// Accessors shared by every seal layout.
pub trait SealCapability {
    /// Layout version.
    fn version(&self) -> SealVersion;
    /// Metadata.
    fn info(&self) -> &SealInfo;
    /// Embedded DER certificate.
    fn certificate(&self) -> &[u8];
    /// Signature algorithm.
    fn algorithm(&self) -> SignatureAlgorithm;
    /// DER encoding, with the header version derived from the layout.
    fn raw_bytes(&self) -> Result<Vec<u8>>;
}

/// A seal of either layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealStructure {
    /// Version 1
    Legacy(LegacySeal),
    /// Version 4
    Current(CurrentSeal),
}

impl SealStructure {
    /// Link to the seal this one succeeds. Always `None` for version 1.
    pub fn prior_seal(&self) -> Option<&str> {
        match self {
            SealStructure::Legacy(_) => None,
            SealStructure::Current(seal) => seal.prior_seal.as_deref(),
        }
    }

    fn inner(&self) -> &dyn SealCapability {
        match self {
            SealStructure::Legacy(seal) => seal,
            SealStructure::Current(seal) => seal,
        }
    }
}

impl SealCapability for SealStructure {
    fn version(&self) -> SealVersion {
        self.inner().version()
    }

    fn info(&self) -> &SealInfo {
        self.inner().info()
    }

    fn certificate(&self) -> &[u8] {
        self.inner().certificate()
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        self.inner().algorithm()
    }

    fn raw_bytes(&self) -> Result<Vec<u8>> {
        self.inner().raw_bytes()
    }
}

/// Read the header version without decoding the rest.
///
/// Walks `SEQUENCE { SEQUENCE { SES_Header, ... }, ... }` and returns the
/// header's `version`, after checking its `id`.
pub fn sniff_version(bytes: &[u8]) -> Result<u32> {
    let outer = AnyRef::from_der(bytes).map_err(decode_error)?;
    let seal_info = first_sequence_element(&outer)?;
    let mut reader = SliceReader::new(seal_info.value()).map_err(decode_error)?;
    let header = SesHeader::decode(&mut reader).map_err(decode_error)?;

    if header.id.to_string() != HEADER_ID {
        return Err(Error::SealDecode(format!(
            "header id '{}' is not '{}'",
            header.id, HEADER_ID
        )));
    }
    Ok(header.version)
}

fn first_sequence_element<'a>(any: &AnyRef<'a>) -> Result<AnyRef<'a>> {
    if any.tag() != Tag::Sequence {
        return Err(Error::SealDecode(format!("expected SEQUENCE, found {}", any.tag())));
    }
    let mut reader = SliceReader::new(any.value()).map_err(decode_error)?;
    let first = AnyRef::decode(&mut reader).map_err(decode_error)?;
    if first.tag() != Tag::Sequence {
        return Err(Error::SealDecode(format!("expected seal info SEQUENCE, found {}", first.tag())));
    }
    Ok(first)
}

/// Decode a seal blob of any supported version.
pub fn decode(bytes: &[u8]) -> Result<SealStructure> {
    let version = SealVersion::from_number(sniff_version(bytes)?)?;
    log::debug!("decoding {:?} seal ({} bytes)", version, bytes.len());

    match version {
        SealVersion::Legacy => LegacySeal::from_der(bytes).map(SealStructure::Legacy),
        SealVersion::Current => CurrentSeal::from_der(bytes).map(SealStructure::Current),
    }
}

/// Encode a seal. The header version comes from the variant.
pub fn encode(seal: &SealStructure) -> Result<Vec<u8>> {
    seal.raw_bytes()
}

/// Recipe for the seal a signing round creates around the signer's certificate.
#[derive(Debug, Clone)]
pub struct SealTemplate {
    /// Layout to emit
    pub version: SealVersion,
    /// Seal name
    pub name: String,
    /// Vendor identifier written to the header
    pub vendor_id: String,
    /// Seal type code
    pub seal_type: u32,
    /// Stamp image
    pub picture: SealPicture,
    /// Validity from creation
    pub valid_for: Duration,
    /// Seal identifier; a random UUID when unset
    pub es_id: Option<String>,
}

impl Default for SealTemplate {
    fn default() -> Self {
        Self {
            version: SealVersion::Current,
            name: "Electronic Seal".to_string(),
            vendor_id: "OFDSIGN".to_string(),
            seal_type: 1,
            picture: SealPicture::default(),
            valid_for: Duration::days(365),
            es_id: None,
        }
    }
}

impl SealTemplate {
    /// Create a template with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the layout version.
    pub fn with_version(mut self, version: SealVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the seal name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the stamp image.
    pub fn with_picture(mut self, picture: SealPicture) -> Self {
        self.picture = picture;
        self
    }

    /// Set the seal identifier.
    pub fn with_es_id(mut self, es_id: impl Into<String>) -> Self {
        self.es_id = Some(es_id.into());
        self
    }

    /// Set the validity period.
    pub fn with_validity(mut self, valid_for: Duration) -> Self {
        self.valid_for = valid_for;
        self
    }

    /// Build a seal for `certificate`.
    ///
    /// `prior_seal` is recorded in version 4 seals and dropped for version 1,
    /// whose layout cannot carry it.
    pub fn build(
        &self,
        certificate: &[u8],
        algorithm: SignatureAlgorithm,
        prior_seal: Option<String>,
    ) -> Result<SealStructure> {
        crate::crypto::certificate::parse(certificate)?;

        let now = Utc::now();
        let created = DateTime::from_timestamp(now.timestamp(), 0)
            .ok_or_else(|| Error::InvalidArgument("system time out of range".to_string()))?;
        let valid_end = created
            .checked_add_signed(self.valid_for)
            .ok_or_else(|| Error::InvalidArgument("seal validity overflows".to_string()))?;

        let info = SealInfo {
            vendor_id: self.vendor_id.clone(),
            es_id: self
                .es_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            seal_type: self.seal_type,
            name: self.name.clone(),
            created,
            valid_start: created,
            valid_end,
            picture: self.picture.clone(),
        };

        Ok(match self.version {
            SealVersion::Legacy => {
                if let Some(prior) = prior_seal {
                    log::debug!("version 1 seal cannot link prior seal {}", prior);
                }
                SealStructure::Legacy(LegacySeal {
                    info,
                    certificate: certificate.to_vec(),
                    algorithm,
                    maker_signature: Vec::new(),
                })
            },
            SealVersion::Current => SealStructure::Current(CurrentSeal {
                info,
                certificate: certificate.to_vec(),
                algorithm,
                maker_signature: Vec::new(),
                prior_seal,
            }),
        })
    }
}
