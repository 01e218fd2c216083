//! Version 4 seal layout (GB/T 38540-2020 style).
//!
//! GeneralizedTime dates, certificate and signature hoisted to the top-level
//! sequence, and an optional `[0]` link to the seal this one succeeds.

use der::asn1::{BitString, GeneralizedTime, Ia5String, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Sequence};

use super::asn1::{
    decode_error, encode_error, from_generalized, ia5, octets, oid, to_generalized, PictureDer,
    SesHeader,
};
use super::{SealCapability, SealInfo, SealVersion};
use crate::crypto::{certificate, SignatureAlgorithm};
use crate::error::Result;

/// Header version number of this layout.
pub const VERSION: u32 = 4;

/// `certListType` value: the list holds whole certificates.
const CERT_LIST_CERTIFICATES: u32 = 1;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct CurrentPropertyDer {
    pub seal_type: u32,
    pub name: String,
    pub cert_list_type: u32,
    pub create_date: GeneralizedTime,
    pub valid_start: GeneralizedTime,
    pub valid_end: GeneralizedTime,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct CurrentSealInfoDer {
    pub header: SesHeader,
    pub es_id: Ia5String,
    pub property: CurrentPropertyDer,
    pub picture: PictureDer,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub prior_seal: Option<Ia5String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub(crate) struct CurrentSealDer {
    pub seal_info: CurrentSealInfoDer,
    pub cert: OctetString,
    pub sign_alg_id: ObjectIdentifier,
    pub signed_value: BitString,
}

/// A decoded version 4 seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSeal {
    /// Seal metadata
    pub info: SealInfo,
    /// DER certificate bound by the seal
    pub certificate: Vec<u8>,
    /// Signature algorithm of the seal
    pub algorithm: SignatureAlgorithm,
    /// Seal maker's signature over the seal info (may be empty)
    pub maker_signature: Vec<u8>,
    /// Package path of the seal this one succeeds
    pub prior_seal: Option<String>,
}

impl CurrentSeal {
    /// Decode a version 4 blob. The header version is not re-checked here.
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let der = CurrentSealDer::from_der(bytes).map_err(decode_error)?;
        let seal_info = &der.seal_info;
        let property = &seal_info.property;

        let algorithm = SignatureAlgorithm::from_oid(&der.sign_alg_id.to_string())?;
        let certificate = der.cert.as_bytes().to_vec();
        certificate::parse(&certificate)?;

        Ok(Self {
            info: SealInfo {
                vendor_id: seal_info.header.vid.to_string(),
                es_id: seal_info.es_id.to_string(),
                seal_type: property.seal_type,
                name: property.name.clone(),
                created: from_generalized(&property.create_date)?,
                valid_start: from_generalized(&property.valid_start)?,
                valid_end: from_generalized(&property.valid_end)?,
                picture: seal_info.picture.to_picture(),
            },
            certificate,
            algorithm,
            maker_signature: der.signed_value.raw_bytes().to_vec(),
            prior_seal: seal_info.prior_seal.as_ref().map(|p| p.to_string()),
        })
    }

    pub(crate) fn to_asn1(&self) -> Result<CurrentSealDer> {
        let info = &self.info;
        Ok(CurrentSealDer {
            seal_info: CurrentSealInfoDer {
                header: SesHeader::new(VERSION, &info.vendor_id)?,
                es_id: ia5(&info.es_id)?,
                property: CurrentPropertyDer {
                    seal_type: info.seal_type,
                    name: info.name.clone(),
                    cert_list_type: CERT_LIST_CERTIFICATES,
                    create_date: to_generalized(&info.created)?,
                    valid_start: to_generalized(&info.valid_start)?,
                    valid_end: to_generalized(&info.valid_end)?,
                },
                picture: PictureDer::from_picture(&info.picture)?,
                prior_seal: self.prior_seal.as_deref().map(ia5).transpose()?,
            },
            cert: octets(&self.certificate)?,
            sign_alg_id: oid(self.algorithm.oid())?,
            signed_value: BitString::from_bytes(&self.maker_signature)
                .map_err(|e| encode_error("signedValue", e))?,
        })
    }
}

impl SealCapability for CurrentSeal {
    fn version(&self) -> SealVersion {
        SealVersion::Current
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
