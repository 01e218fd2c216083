//! Version 1 seal layout (GM/T 0031-2014 style).
//!
//! Fixed field order, UTCTime dates, signature wrapped in a `signInfo`
//! sequence. There is no room for extension data or a prior-seal link.

use der::asn1::{BitString, Ia5String, ObjectIdentifier, OctetString, UtcTime};
use der::{Decode, Encode, Sequence};

use super::asn1::{
    decode_error, encode_error, from_utc_time, ia5, octets, oid, to_utc_time, PictureDer,
    SesHeader,
};
use super::{SealCapability, SealInfo, SealVersion};
use crate::crypto::{certificate, SignatureAlgorithm};
use crate::error::Result;

/// Header version number of this layout.
pub const VERSION: u32 = 1;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct LegacyPropertyDer {
    pub seal_type: u32,
    pub name: String,
    pub create_date: UtcTime,
    pub valid_start: UtcTime,
    pub valid_end: UtcTime,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct LegacySealInfoDer {
    pub header: SesHeader,
    pub es_id: Ia5String,
    pub property: LegacyPropertyDer,
    pub picture: PictureDer,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct LegacySignInfoDer {
    pub cert: OctetString,
    pub signature_algorithm: ObjectIdentifier,
    pub sign_data: BitString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct LegacySealDer {
    pub seal_info: LegacySealInfoDer,
    pub sign_info: LegacySignInfoDer,
}

/// A decoded version 1 seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySeal {
    /// Seal metadata
    pub info: SealInfo,
    /// DER certificate bound by the seal
    pub certificate: Vec<u8>,
    /// Signature algorithm of the seal
    pub algorithm: SignatureAlgorithm,
    /// Seal maker's signature over the seal info (may be empty)
    pub maker_signature: Vec<u8>,
}

impl LegacySeal {
    /// Decode a version 1 blob. The header version is not re-checked here.
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let der = LegacySealDer::from_der(bytes).map_err(decode_error)?;
        let property = &der.seal_info.property;
        let sign_info = &der.sign_info;

        let algorithm = SignatureAlgorithm::from_oid(&sign_info.signature_algorithm.to_string())?;
        let certificate = sign_info.cert.as_bytes().to_vec();
        certificate::parse(&certificate)?;

        Ok(Self {
            info: SealInfo {
                vendor_id: der.seal_info.header.vid.to_string(),
                es_id: der.seal_info.es_id.to_string(),
                seal_type: property.seal_type,
                name: property.name.clone(),
                created: from_utc_time(&property.create_date)?,
                valid_start: from_utc_time(&property.valid_start)?,
                valid_end: from_utc_time(&property.valid_end)?,
                picture: der.seal_info.picture.to_picture(),
            },
            certificate,
            algorithm,
            maker_signature: sign_info.sign_data.raw_bytes().to_vec(),
        })
    }

    pub(crate) fn to_asn1(&self) -> Result<LegacySealDer> {
        let info = &self.info;
        Ok(LegacySealDer {
            seal_info: LegacySealInfoDer {
                header: SesHeader::new(VERSION, &info.vendor_id)?,
                es_id: ia5(&info.es_id)?,
                property: LegacyPropertyDer {
                    seal_type: info.seal_type,
                    name: info.name.clone(),
                    create_date: to_utc_time(&info.created)?,
                    valid_start: to_utc_time(&info.valid_start)?,
                    valid_end: to_utc_time(&info.valid_end)?,
                },
                picture: PictureDer::from_picture(&info.picture)?,
            },
            sign_info: LegacySignInfoDer {
                cert: octets(&self.certificate)?,
                signature_algorithm: oid(self.algorithm.oid())?,
                sign_data: BitString::from_bytes(&self.maker_signature)
                    .map_err(|e| encode_error("signData", e))?,
            },
        })
    }
}

impl SealCapability for LegacySeal {
    fn version(&self) -> SealVersion {
        SealVersion::Legacy
    }

    fn info(&self) -> &SealInfo {
        &self.info
    }

    fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn raw_bytes(&self) -> Result<Vec<u8>> {
        self.to_asn1()?
            .to_der()
            .map_err(|e| encode_error("structure", e))
    }
}
