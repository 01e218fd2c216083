//! Pluggable signing and verification capabilities.
//!
//! The orchestrators never hold key material themselves. A signing round
//! hands the serialized signature descriptor to a [`SigningCapability`] and
//! embeds whatever comes back; a verification session hands the stored
//! descriptor, the signature and the signer certificate to a
//! [`VerificationCapability`].
//! Hardware tokens and remote key services plug in here. The call is
//! synchronous with no timeout; wrap the capability to add cancellation.
//!
//! [`RsaSigner`] and [`RsaVerifier`] are the software defaults for the RSA
//! algorithms.

use der::oid::AssociatedOid;
use pkcs1::DecodeRsaPrivateKey;
use pkcs8::DecodePrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use signature::{SignatureEncoding, Signer, Verifier};

use crate::crypto::{certificate, SignatureAlgorithm};
use crate::error::{Error, Result};

/// Produces raw signatures for a signing round.
pub trait SigningCapability {
    /// Algorithm of the produced signatures.
    fn algorithm(&self) -> SignatureAlgorithm;

    /// DER certificate of the signer, embedded in the seal.
    fn certificate(&self) -> &[u8];

    /// Exact length of every signature this capability produces. Space for
    /// the signed value is reserved from it before signing.
    fn signature_len(&self) -> usize;

    /// Sign the to-be-signed bytes.
    fn sign(&self, to_be_signed: &[u8]) -> Result<Vec<u8>>;
}

/// Checks a raw signature against a certificate.
pub trait VerificationCapability {
    /// Whether `signature` over `to_be_signed` verifies under `certificate`.
    ///
    /// Return `Ok(false)` for a well-formed signature that does not match.
    /// Errors for which [`Error::is_certificate_error`] holds are reported
    /// as certificate problems.
    fn verify(&self, to_be_signed: &[u8], signature: &[u8], certificate: &[u8]) -> Result<bool>;

    /// Same as [`verify`](Self::verify), told the algorithm recorded with the
    /// signature. The default ignores it.
    fn verify_with(
        &self,
        algorithm: SignatureAlgorithm,
        to_be_signed: &[u8],
        signature: &[u8],
        certificate: &[u8],
    ) -> Result<bool> {
        let _ = algorithm;
        self.verify(to_be_signed, signature, certificate)
    }
}

impl<F> VerificationCapability for F
where
    F: Fn(&[u8], &[u8], &[u8]) -> bool,
{
    fn verify(&self, to_be_signed: &[u8], signature: &[u8], certificate: &[u8]) -> Result<bool> {
        Ok(self(to_be_signed, signature, certificate))
    }
}

/// Adapts a closure into a [`SigningCapability`].
///
/// ```ignore
/// let token = SignFn::new(SignatureAlgorithm::Sm3WithSm2, cert_der, 64, |tbs| usb_key.sign(tbs));
/// ```
pub struct SignFn<F> {
    algorithm: SignatureAlgorithm,
    certificate: Vec<u8>,
    signature_len: usize,
    sign: F,
}

impl<F> SignFn<F>
where
    F: Fn(&[u8]) -> Result<Vec<u8>>,
{
    /// Wrap `sign`, which must always return `signature_len` bytes.
    pub fn new(
        algorithm: SignatureAlgorithm,
        certificate: Vec<u8>,
        signature_len: usize,
        sign: F,
    ) -> Self {
        Self {
            algorithm,
            certificate,
            signature_len,
            sign,
        }
    }
}

impl<F> SigningCapability for SignFn<F>
where
    F: Fn(&[u8]) -> Result<Vec<u8>>,
{
    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    fn signature_len(&self) -> usize {
        self.signature_len
    }

    fn sign(&self, to_be_signed: &[u8]) -> Result<Vec<u8>> {
        (self.sign)(to_be_signed)
    }
}

impl<F> std::fmt::Debug for SignFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignFn")
            .field("algorithm", &self.algorithm)
            .field("certificate", &format!("{} bytes", self.certificate.len()))
            .field("signature_len", &self.signature_len)
            .finish()
    }
}

/// Software RSA PKCS#1 v1.5 signer.
#[derive(Clone)]
pub struct RsaSigner {
    key: RsaPrivateKey,
    certificate: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

impl RsaSigner {
    /// Create a signer. The certificate must carry the key's public half.
    pub fn new(
        key: RsaPrivateKey,
        certificate: Vec<u8>,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self> {
        if !algorithm.is_rsa() {
            return Err(Error::UnsupportedAlgorithm(format!(
                "{} is not an RSA algorithm",
                algorithm.name()
            )));
        }
        let cert_key = certificate::rsa_public_key(&certificate)?;
        if cert_key != RsaPublicKey::from(&key) {
            return Err(Error::InvalidCertificate(
                "certificate does not carry the signing key".to_string(),
            ));
        }
        Ok(Self {
            key,
            certificate,
            algorithm,
        })
    }

    /// Create a signer from a PKCS#8 DER private key.
    pub fn from_pkcs8_der(
        key_der: &[u8],
        certificate: Vec<u8>,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_der(key_der)
            .map_err(|e| Error::Crypto(format!("PKCS#8 key: {}", e)))?;
        Self::new(key, certificate, algorithm)
    }

    /// Create a signer from a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(
        key_pem: &str,
        certificate: Vec<u8>,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(key_pem)
            .map_err(|e| Error::Crypto(format!("PKCS#8 key: {}", e)))?;
        Self::new(key, certificate, algorithm)
    }

    /// Create a signer from a PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM key.
    pub fn from_pkcs1_pem(
        key_pem: &str,
        certificate: Vec<u8>,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs1_pem(key_pem)
            .map_err(|e| Error::Crypto(format!("PKCS#1 key: {}", e)))?;
        Self::new(key, certificate, algorithm)
    }
}

impl std::fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigner")
            .field("algorithm", &self.algorithm)
            .field("certificate", &format!("{} bytes", self.certificate.len()))
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn sign_with<D>(key: &RsaPrivateKey, msg: &[u8]) -> Result<Vec<u8>>
where
    D: sha2::Digest + AssociatedOid,
{
    SigningKey::<D>::new(key.clone())
        .try_sign(msg)
        .map(|s| s.to_vec())
        .map_err(|e| Error::Signing(e.to_string()))
}

impl SigningCapability for RsaSigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    fn signature_len(&self) -> usize {
        self.key.size()
    }

    fn sign(&self, to_be_signed: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            SignatureAlgorithm::Sha256WithRsa => sign_with::<Sha256>(&self.key, to_be_signed),
            SignatureAlgorithm::Sha384WithRsa => sign_with::<Sha384>(&self.key, to_be_signed),
            SignatureAlgorithm::Sha512WithRsa => sign_with::<Sha512>(&self.key, to_be_signed),
            SignatureAlgorithm::Sm3WithSm2 => {
                Err(Error::UnsupportedAlgorithm(self.algorithm.name().to_string()))
            },
        }
    }
}

/// Software RSA PKCS#1 v1.5 verifier.
#[derive(Debug, Clone)]
pub struct RsaVerifier {
    algorithm: SignatureAlgorithm,
    check_validity: bool,
}

impl Default for RsaVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RsaVerifier {
    /// Verifier for SHA-256 with RSA that checks certificate validity.
    pub fn new() -> Self {
        Self {
            algorithm: SignatureAlgorithm::Sha256WithRsa,
            check_validity: true,
        }
    }

    /// Algorithm used by [`VerificationCapability::verify`].
    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Whether to reject certificates outside their validity window.
    pub fn with_validity_check(mut self, check: bool) -> Self {
        self.check_validity = check;
        self
    }
}

fn verify_rsa<D>(key: RsaPublicKey, msg: &[u8], signature: &[u8]) -> Result<bool>
where
    D: sha2::Digest + AssociatedOid,
{
    let signature = match Signature::try_from(signature) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };
    Ok(VerifyingKey::<D>::new(key).verify(msg, &signature).is_ok())
}

impl VerificationCapability for RsaVerifier {
    fn verify(&self, to_be_signed: &[u8], signature: &[u8], certificate: &[u8]) -> Result<bool> {
        self.verify_with(self.algorithm, to_be_signed, signature, certificate)
    }

    fn verify_with(
        &self,
        algorithm: SignatureAlgorithm,
        to_be_signed: &[u8],
        signature: &[u8],
        cert: &[u8],
    ) -> Result<bool> {
        if self.check_validity {
            certificate::check_validity(cert)?;
        }
        let key = certificate::rsa_public_key(cert)?;
        match algorithm {
            SignatureAlgorithm::Sha256WithRsa => verify_rsa::<Sha256>(key, to_be_signed, signature),
            SignatureAlgorithm::Sha384WithRsa => verify_rsa::<Sha384>(key, to_be_signed, signature),
            SignatureAlgorithm::Sha512WithRsa => verify_rsa::<Sha512>(key, to_be_signed, signature),
            SignatureAlgorithm::Sm3WithSm2 => {
                Err(Error::UnsupportedAlgorithm(algorithm.name().to_string()))
            },
        }
    }
}
