//! Signature container model.
//!
//! Two part-files describe the signatures of a document:
//!
//! - the signature list (`Doc_0/Signs/Signatures.xml`): one entry per round
//!   with its identifier, protection case and blob locations
//! - one descriptor per round (`Sign_n/Signature.xml`): the check values,
//!   content digest, signature method, stamps and seal location. The
//!   serialized descriptor is exactly what the round's signature covers.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ProviderInfo;
use crate::crypto::{DigestAlgorithm, SignatureAlgorithm};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::package::{normalize_path, Package};
use crate::protection::ProtectionCase;

use super::types::{ExclusionWindow, ReferenceDigest, SignatureType, StampPlacement};
use super::xml::{parse_tree, XmlElement};

lazy_static! {
    static ref SIGN_ID: Regex = Regex::new(r"^[sS]?(\d+)$").expect("valid regex");
}

const DATE_TIME_FORMAT: &str = "%Y%m%d%H%M%SZ";

/// Format the identifier of round `n` (1-based), e.g. `s001`.
pub fn format_sign_id(n: u32) -> String {
    format!("s{:03}", n)
}

/// Numeric part of a signature identifier. Accepts `s001` and bare `1`.
pub fn parse_sign_id(id: &str) -> Option<u32> {
    SIGN_ID
        .captures(id.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One entry of the signature list.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRecord {
    /// Unique identifier within the list
    pub id: String,
    /// Seal or plain signature
    pub signature_type: SignatureType,
    /// Location of this round's descriptor
    pub descriptor_path: String,
    /// Protection case of the round
    pub protection_case: ProtectionCase,
    /// Location of the seal blob; `Sign` rounds carry none
    pub seal_path: Option<String>,
    /// Location of the signed-value blob
    pub signed_value_path: String,
    /// Visible stamps
    pub stamps: Vec<StampPlacement>,
    /// When the round was created
    pub created: DateTime<Utc>,
}

impl SignatureRecord {
    /// Directory holding this round's blobs, with trailing `/`.
    pub fn round_dir(&self) -> String {
        crate::package::parent_dir(&self.descriptor_path)
    }

    fn to_element(&self) -> XmlElement {
        let mut el = XmlElement::new("Signature")
            .with_attr("ID", self.id.as_str())
            .with_attr("Type", self.signature_type.name())
            .with_attr("BaseLoc", self.descriptor_path.as_str())
            .with_attr("ProtectionCase", self.protection_case.id())
            .with_attr("Created", self.created.to_rfc3339_opts(SecondsFormat::Secs, true));
        if let Some(seal) = &self.seal_path {
            el.push(XmlElement::new("Seal").with_attr("BaseLoc", seal.as_str()));
        }
        el.push(XmlElement::new("SignedValue").with_attr("BaseLoc", self.signed_value_path.as_str()));
        for stamp in &self.stamps {
            el.push(stamp_element(stamp));
        }
        el
    }

    fn from_element(el: &XmlElement) -> Result<Self> {
        let created = el
            .required_attr("Created")
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| Error::Xml(format!("bad Created '{}': {}", s, e)))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id: el.required_attr("ID")?.to_string(),
            signature_type: SignatureType::from_name(el.attr("Type").unwrap_or_default())?,
            descriptor_path: normalize_path(el.required_attr("BaseLoc")?),
            protection_case: ProtectionCase::from_id(el.required_attr("ProtectionCase")?)?,
            seal_path: el
                .child("Seal")
                .map(|seal| seal.required_attr("BaseLoc").map(normalize_path))
                .transpose()?,
            signed_value_path: normalize_path(
                el.required_child("SignedValue")?.required_attr("BaseLoc")?,
            ),
            stamps: el
                .children_named("StampAnnot")
                .map(parse_stamp)
                .collect::<Result<_>>()?,
            created,
        })
    }
}

/// The signature list part-file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureList {
    /// Highest identifier handed out so far
    pub max_sign_id: Option<String>,
    /// Entries in signing order
    pub records: Vec<SignatureRecord>,
}

impl SignatureList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the list at `path`, or `None` if the package has none.
    pub fn load<P: Package + ?Sized>(package: &P, path: &str) -> Result<Option<Self>> {
        if !package.contains(path) {
            return Ok(None);
        }
        Self::from_xml(&package.read(path)?).map(Some)
    }

    /// Parse the part-file.
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        let root = parse_tree(bytes)?;
        if root.name != "Signatures" {
            return Err(Error::Xml(format!("expected <Signatures>, found <{}>", root.name)));
        }
        Ok(Self {
            max_sign_id: root.child("MaxSignId").map(|e| e.text.trim().to_string()),
            records: root
                .children_named("Signature")
                .map(SignatureRecord::from_element)
                .collect::<Result<_>>()?,
        })
    }

    /// Serialize the part-file.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut root = XmlElement::new("Signatures");
        if let Some(max) = &self.max_sign_id {
            root.push(XmlElement::new("MaxSignId").with_text(max.as_str()));
        }
        for record in &self.records {
            root.push(record.to_element());
        }
        root.to_document()
    }

    /// Identifier for the next round: one past the highest of `MaxSignId`
    /// and every existing identifier.
    pub fn next_id(&self) -> String {
        let highest = self
            .records
            .iter()
            .map(|r| r.id.as_str())
            .chain(self.max_sign_id.as_deref())
            .filter_map(parse_sign_id)
            .max()
            .unwrap_or(0);
        format_sign_id(highest + 1)
    }

    /// Append a record and advance `MaxSignId`.
    pub fn push(&mut self, record: SignatureRecord) -> Result<()> {
        if self.get(&record.id).is_some() {
            return Err(Error::InvalidArgument(format!(
                "signature id '{}' already in use",
                record.id
            )));
        }
        let advance = match (parse_sign_id(&record.id), self.max_sign_id.as_deref().and_then(parse_sign_id)) {
            (Some(new), Some(max)) => new > max,
            _ => true,
        };
        if advance {
            self.max_sign_id = Some(record.id.clone());
        }
        self.records.push(record);
        Ok(())
    }

    /// Look up a record by identifier.
    pub fn get(&self, id: &str) -> Option<&SignatureRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&SignatureRecord> {
        self.records.last()
    }

    /// Most recent record that carries a seal.
    pub fn last_sealed(&self) -> Option<&SignatureRecord> {
        self.records.iter().rev().find(|r| r.seal_path.is_some())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the list has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-round descriptor part-file.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureDescriptor {
    /// Seal or plain signature
    pub signature_type: SignatureType,
    /// Software that produced the signature
    pub provider: ProviderInfo,
    /// Signature algorithm
    pub signature_method: SignatureAlgorithm,
    /// Signing time (whole seconds)
    pub signature_time: DateTime<Utc>,
    /// Digest algorithm of the check values
    pub check_method: DigestAlgorithm,
    /// Check values, in protection order
    pub references: Vec<ReferenceDigest>,
    /// Digest of the protected entries concatenated in reference order, with
    /// the exclusion windows left out
    pub content_digest: Option<Vec<u8>>,
    /// Visible stamps
    pub stamps: Vec<StampPlacement>,
    /// Location of the seal blob
    pub seal_path: Option<String>,
    /// Location of the signed-value blob
    pub signed_value_path: String,
    /// Ranges left out of every digest
    pub exclusions: Vec<ExclusionWindow>,
}

impl SignatureDescriptor {
    /// Protected entries, in order.
    pub fn reference_paths(&self) -> Vec<String> {
        self.references.iter().map(|r| r.path.clone()).collect()
    }

    /// Whether `path` is among the protected entries.
    pub fn protects(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.references.iter().any(|r| r.path == path)
    }

    /// Load the descriptor at `path`.
    pub fn load<P: Package + ?Sized>(package: &P, path: &str) -> Result<Self> {
        Self::from_xml(&package.read(path)?)
    }

    /// Serialize the part-file.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut provider = XmlElement::new("Provider")
            .with_attr("ProviderName", self.provider.name.as_str())
            .with_attr("Version", self.provider.version.as_str());
        if let Some(company) = &self.provider.company {
            provider = provider.with_attr("Company", company.as_str());
        }

        let mut references =
            XmlElement::new("References").with_attr("CheckMethod", self.check_method.oid());
        for reference in &self.references {
            references.push(
                XmlElement::new("Reference")
                    .with_attr("FileRef", reference.path.as_str())
                    .with_child(
                        XmlElement::new("CheckValue").with_text(BASE64.encode(&reference.value)),
                    ),
            );
        }

        let mut signed_info = XmlElement::new("SignedInfo")
            .with_child(provider)
            .with_child(XmlElement::new("SignatureMethod").with_text(self.signature_method.oid()))
            .with_child(
                XmlElement::new("SignatureDateTime")
                    .with_text(self.signature_time.format(DATE_TIME_FORMAT).to_string()),
            )
            .with_child(references);
        if let Some(digest) = &self.content_digest {
            signed_info.push(XmlElement::new("ContentDigest").with_text(BASE64.encode(digest)));
        }
        for stamp in &self.stamps {
            signed_info.push(stamp_element(stamp));
        }
        if let Some(seal) = &self.seal_path {
            signed_info.push(
                XmlElement::new("Seal").with_child(XmlElement::new("BaseLoc").with_text(seal.as_str())),
            );
        }

        let mut root = XmlElement::new("Signature")
            .with_attr("Type", self.signature_type.name())
            .with_child(signed_info)
            .with_child(XmlElement::new("SignedValue").with_text(self.signed_value_path.as_str()));
        for window in &self.exclusions {
            root.push(
                XmlElement::new("ExclusionWindow")
                    .with_attr("FileRef", window.path.as_str())
                    .with_attr("Offset", window.offset.to_string())
                    .with_attr("Length", window.length.to_string()),
            );
        }
        root.to_document()
    }

    /// Parse the part-file.
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        let root = parse_tree(bytes)?;
        if root.name != "Signature" {
            return Err(Error::Xml(format!("expected <Signature>, found <{}>", root.name)));
        }
        let info = root.required_child("SignedInfo")?;

        let provider_el = info.required_child("Provider")?;
        let provider = ProviderInfo {
            name: provider_el.required_attr("ProviderName")?.to_string(),
            version: provider_el.attr("Version").unwrap_or_default().to_string(),
            company: provider_el.attr("Company").map(str::to_string),
        };

        let references_el = info.required_child("References")?;
        let check_method =
            DigestAlgorithm::from_identifier(references_el.attr("CheckMethod").unwrap_or("SM3"))?;
        let references = references_el
            .children_named("Reference")
            .map(|r| {
                let path = normalize_path(r.required_attr("FileRef")?);
                let value = BASE64
                    .decode(r.child_text("CheckValue")?)
                    .map_err(|e| Error::Xml(format!("bad CheckValue for {}: {}", path, e)))?;
                if value.len() != check_method.output_size() {
                    return Err(Error::Xml(format!(
                        "CheckValue for {} is {} bytes, {} expects {}",
                        path,
                        value.len(),
                        check_method.name(),
                        check_method.output_size()
                    )));
                }
                Ok(ReferenceDigest {
                    path,
                    algorithm: check_method,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let content_digest = info
            .child("ContentDigest")
            .map(|el| {
                let value = BASE64
                    .decode(el.text.trim())
                    .map_err(|e| Error::Xml(format!("bad ContentDigest: {}", e)))?;
                if value.len() != check_method.output_size() {
                    return Err(Error::Xml(format!(
                        "ContentDigest is {} bytes, {} expects {}",
                        value.len(),
                        check_method.name(),
                        check_method.output_size()
                    )));
                }
                Ok(value)
            })
            .transpose()?;

        let exclusions = root
            .children_named("ExclusionWindow")
            .map(|w| {
                Ok(ExclusionWindow::new(
                    w.required_attr("FileRef")?,
                    parse_usize(w.required_attr("Offset")?)?,
                    parse_usize(w.required_attr("Length")?)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            signature_type: SignatureType::from_name(root.attr("Type").unwrap_or_default())?,
            provider,
            signature_method: SignatureAlgorithm::from_oid(info.child_text("SignatureMethod")?)?,
            signature_time: parse_date_time(info.child_text("SignatureDateTime")?)?,
            check_method,
            references,
            content_digest,
            stamps: info
                .children_named("StampAnnot")
                .map(parse_stamp)
                .collect::<Result<_>>()?,
            seal_path: info
                .child("Seal")
                .map(|seal| seal.child_text("BaseLoc").map(normalize_path))
                .transpose()?,
            signed_value_path: normalize_path(root.child_text("SignedValue")?),
            exclusions,
        })
    }
}

fn stamp_element(stamp: &StampPlacement) -> XmlElement {
    let mut el = XmlElement::new("StampAnnot")
        .with_attr("ID", stamp.id.as_str())
        .with_attr("PageRef", stamp.page_ref.as_str())
        .with_attr("Boundary", stamp.boundary.to_string());
    if let Some(clip) = &stamp.clip {
        el = el.with_attr("Clip", clip.to_string());
    }
    el
}

fn parse_stamp(el: &XmlElement) -> Result<StampPlacement> {
    Ok(StampPlacement {
        id: el.required_attr("ID")?.to_string(),
        page_ref: el.required_attr("PageRef")?.to_string(),
        boundary: el.required_attr("Boundary")?.parse::<Rect>()?,
        clip: el.attr("Clip").map(str::parse::<Rect>).transpose()?,
    })
}

fn parse_usize(value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Xml(format!("'{}' is not a byte count", value)))
}

fn parse_date_time(value: &str) -> Result<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| Error::Xml(format!("bad SignatureDateTime '{}': {}", value, e)))
}
