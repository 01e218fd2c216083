//! DER building blocks shared by both seal layouts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use der::asn1::{GeneralizedTime, Ia5String, ObjectIdentifier, OctetString, UtcTime};
use der::Sequence;

use super::SealPicture;
use crate::error::{Error, Result};

/// Constant `id` of every seal header.
pub(crate) const HEADER_ID: &str = "ES";

/// `SES_Header ::= SEQUENCE { id IA5String, version INTEGER, vid IA5String }`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct SesHeader {
    pub id: Ia5String,
    pub version: u32,
    pub vid: Ia5String,
}

impl SesHeader {
    pub fn new(version: u32, vendor_id: &str) -> Result<Self> {
        Ok(Self {
            id: ia5(HEADER_ID)?,
            version,
            vid: ia5(vendor_id)?,
        })
    }
}

/// `SES_ESPictureInfo ::= SEQUENCE { type IA5String, data OCTET STRING, width INTEGER, height INTEGER }`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct PictureDer {
    pub kind: Ia5String,
    pub data: OctetString,
    pub width: u32,
    pub height: u32,
}

impl PictureDer {
    pub fn from_picture(picture: &SealPicture) -> Result<Self> {
        Ok(Self {
            kind: ia5(&picture.kind)?,
            data: octets(&picture.data)?,
            width: picture.width,
            height: picture.height,
        })
    }

    pub fn to_picture(&self) -> SealPicture {
        SealPicture {
            kind: self.kind.to_string(),
            data: self.data.as_bytes().to_vec(),
            width: self.width,
            height: self.height,
        }
    }
}

pub(crate) fn ia5(value: &str) -> Result<Ia5String> {
    Ia5String::new(value).map_err(|e| encode_error("IA5String", e))
}

pub(crate) fn octets(value: &[u8]) -> Result<OctetString> {
    OctetString::new(value).map_err(|e| encode_error("OCTET STRING", e))
}

pub(crate) fn oid(value: &str) -> Result<ObjectIdentifier> {
    ObjectIdentifier::new(value)
        .map_err(|e| Error::InvalidArgument(format!("cannot encode OID {}: {}", value, e)))
}

pub(crate) fn encode_error(what: &str, err: der::Error) -> Error {
    Error::InvalidArgument(format!("cannot encode seal {}: {}", what, err))
}

pub(crate) fn decode_error(err: der::Error) -> Error {
    Error::SealDecode(err.to_string())
}

fn unix_seconds(time: &DateTime<Utc>) -> Result<Duration> {
    u64::try_from(time.timestamp())
        .map(Duration::from_secs)
        .map_err(|_| Error::InvalidArgument(format!("seal time {} precedes 1970", time)))
}

fn from_unix(duration: Duration) -> Result<DateTime<Utc>> {
    i64::try_from(duration.as_secs())
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| Error::SealDecode("time out of range".to_string()))
}

pub(crate) fn to_generalized(time: &DateTime<Utc>) -> Result<GeneralizedTime> {
    GeneralizedTime::from_unix_duration(unix_seconds(time)?)
        .map_err(|e| encode_error("GeneralizedTime", e))
}

pub(crate) fn from_generalized(time: &GeneralizedTime) -> Result<DateTime<Utc>> {
    from_unix(time.to_unix_duration())
}

pub(crate) fn to_utc_time(time: &DateTime<Utc>) -> Result<UtcTime> {
    UtcTime::from_unix_duration(unix_seconds(time)?).map_err(|e| encode_error("UTCTime", e))
}

pub(crate) fn from_utc_time(time: &UtcTime) -> Result<DateTime<Utc>> {
    from_unix(time.to_unix_duration())
}
