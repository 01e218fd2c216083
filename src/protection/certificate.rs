//! Certificate-based key transport.
//!
//! The file key is encrypted once per recipient with the RSA public key from
//! the recipient's certificate. Entries are matched back to a decrypting
//! party by certificate fingerprint.

use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::WrappedKey;
use crate::crypto::certificate;
use crate::error::{Error, Result};

/// Key transport algorithm for wrapping the file key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyTransportAlgorithm {
    /// RSA-OAEP with SHA-256
    #[default]
    RsaOaep,
    /// RSA PKCS#1 v1.5 encryption
    RsaPkcs1v15,
}

impl KeyTransportAlgorithm {
    /// Name stored with each wrapped key.
    pub fn name(&self) -> &'static str {
        match self {
            KeyTransportAlgorithm::RsaOaep => "RSA-OAEP-SHA256",
            KeyTransportAlgorithm::RsaPkcs1v15 => "RSA-PKCS1-v1_5",
        }
    }

    /// Parse a stored name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "RSA-OAEP-SHA256" => Ok(KeyTransportAlgorithm::RsaOaep),
            "RSA-PKCS1-v1_5" => Ok(KeyTransportAlgorithm::RsaPkcs1v15),
            other => Err(Error::UnsupportedAlgorithm(format!("key transport '{}'", other))),
        }
    }
}

/// One party allowed to open certificate-protected content.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// DER-encoded X.509 certificate
    pub certificate: Vec<u8>,
    /// Key transport algorithm
    pub key_transport: KeyTransportAlgorithm,
    public_key: RsaPublicKey,
}

impl Recipient {
    /// Create a recipient from a DER-encoded certificate carrying an RSA key.
    pub fn from_der(certificate: &[u8]) -> Result<Self> {
        let public_key = certificate::rsa_public_key(certificate)?;
        Ok(Self {
            certificate: certificate.to_vec(),
            key_transport: KeyTransportAlgorithm::default(),
            public_key,
        })
    }

    /// Set the key transport algorithm.
    pub fn with_key_transport(mut self, algo: KeyTransportAlgorithm) -> Self {
        self.key_transport = algo;
        self
    }

    /// Identifier recorded with this recipient's wrapped key.
    pub fn id(&self) -> String {
        certificate::fingerprint(&self.certificate)
    }

    pub(crate) fn wrap(&self, file_key: &[u8]) -> Result<WrappedKey> {
        let encrypted_key = match self.key_transport {
            KeyTransportAlgorithm::RsaOaep => {
                self.public_key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), file_key)
            },
            KeyTransportAlgorithm::RsaPkcs1v15 => {
                self.public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, file_key)
            },
        }
        .map_err(|e| Error::Crypto(format!("key transport: {}", e)))?;

        Ok(WrappedKey {
            recipient: self.id(),
            transport: self.key_transport.name().to_string(),
            encrypted_key,
        })
    }
}

/// Find the entry for `certificate` and decrypt the file key with `key`.
pub(crate) fn unwrap_key(
    entries: &[WrappedKey],
    certificate: &[u8],
    key: &RsaPrivateKey,
) -> Result<Vec<u8>> {
    let id = certificate::fingerprint(certificate);
    let entry = entries.iter().find(|e| e.recipient == id).ok_or_else(|| {
        log::debug!("no wrapped key for recipient {}", id);
        Error::KeyMismatch
    })?;

    let transport = KeyTransportAlgorithm::from_name(&entry.transport)?;
    match transport {
        KeyTransportAlgorithm::RsaOaep => key.decrypt(Oaep::new::<Sha256>(), &entry.encrypted_key),
        KeyTransportAlgorithm::RsaPkcs1v15 => key.decrypt(Pkcs1v15Encrypt, &entry.encrypted_key),
    }
    .map_err(|_| Error::KeyMismatch)
}
