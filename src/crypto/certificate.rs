//! X.509 certificate helpers.
//!
//! Certificates are only *used* here: parsed for their public key and
//! validity window, and fingerprinted to name envelope recipients.
//! [`issue_self_signed`] exists for tests and demos; it is not a CA.

use std::str::FromStr;
use std::time::Duration;

use der::{Decode, Encode};
use pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_parser::prelude::*;

use super::{bytes_to_hex, DigestAlgorithm};
use crate::error::{Error, Result};

/// Parse a DER certificate, rejecting trailing garbage.
pub fn parse(certificate: &[u8]) -> Result<X509Certificate<'_>> {
    let (rest, cert) = parse_x509_certificate(certificate)
        .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
    if !rest.is_empty() {
        return Err(Error::InvalidCertificate(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(cert)
}

/// Check that the certificate parses and that now is inside its validity window.
pub fn check_validity(certificate: &[u8]) -> Result<()> {
    let cert = parse(certificate)?;
    if !cert.validity().is_valid() {
        return Err(Error::InvalidCertificate(format!(
            "outside validity period {} .. {}",
            cert.validity().not_before,
            cert.validity().not_after
        )));
    }
    Ok(())
}

/// Extract the RSA public key from a certificate.
pub fn rsa_public_key(certificate: &[u8]) -> Result<RsaPublicKey> {
    let cert = parse(certificate)?;
    RsaPublicKey::from_public_key_der(cert.public_key().raw)
        .map_err(|e| Error::InvalidCertificate(format!("not an RSA key: {}", e)))
}

/// Subject distinguished name, for logging.
pub fn subject(certificate: &[u8]) -> Result<String> {
    Ok(parse(certificate)?.subject().to_string())
}

/// Hex SHA-256 over the certificate DER. Identifies envelope recipients.
pub fn fingerprint(certificate: &[u8]) -> String {
    bytes_to_hex(&DigestAlgorithm::Sha256.hash(certificate))
}

/// A freshly issued self-signed certificate with its RSA key.
#[derive(Clone)]
pub struct SelfSignedIdentity {
    /// DER-encoded certificate
    pub certificate: Vec<u8>,
    /// Matching private key
    pub private_key: RsaPrivateKey,
}

impl std::fmt::Debug for SelfSignedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfSignedIdentity")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Issue a self-signed RSA certificate.
///
/// # Arguments
///
/// * `common_name` - CN of subject and issuer
/// * `key_bits` - RSA modulus size
/// * `valid_for` - Validity starting now
pub fn issue_self_signed(
    common_name: &str,
    key_bits: usize,
    valid_for: Duration,
) -> Result<SelfSignedIdentity> {
    let private_key = RsaPrivateKey::new(&mut OsRng, key_bits)
        .map_err(|e| Error::Certificate(format!("key generation: {}", e)))?;
    let public_der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| Error::Certificate(format!("public key encoding: {}", e)))?;
    let spki = SubjectPublicKeyInfoOwned::from_der(public_der.as_bytes())
        .map_err(|e| Error::Certificate(format!("public key info: {}", e)))?;

    let subject = Name::from_str(&format!("CN={}", common_name))
        .map_err(|e| Error::Certificate(format!("subject name: {}", e)))?;
    let validity =
        Validity::from_now(valid_for).map_err(|e| Error::Certificate(format!("validity: {}", e)))?;
    let serial = SerialNumber::from(OsRng.next_u32() as u64 | 1);

    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
    let builder = CertificateBuilder::new(Profile::Root, serial, validity, subject, spki, &signer)
        .map_err(|e| Error::Certificate(e.to_string()))?;
    let certificate = builder
        .build::<rsa::pkcs1v15::Signature>()
        .map_err(|e| Error::Certificate(e.to_string()))?
        .to_der()
        .map_err(|e| Error::Certificate(e.to_string()))?;

    log::debug!(
        "issued self-signed certificate CN={} ({} bytes)",
        common_name,
        certificate.len()
    );

    Ok(SelfSignedIdentity {
        certificate,
        private_key,
    })
}
