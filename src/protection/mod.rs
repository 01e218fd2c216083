//! Protection scheme envelope.
//!
//! A signing round is governed by exactly one protection case:
//!
//! | Case | Id | Effect |
//! |---|---|---|
//! | [`ProtectionCase::EncryptGmPassword`] | `1.1.1` | content CBC-encrypted under a random file key, file key wrapped by a password-derived key |
//! | [`ProtectionCase::EncryptGmCert`] | `1.1.2` | content CBC-encrypted under a random file key, file key wrapped per recipient certificate |
//! | [`ProtectionCase::SignatureOnly`] | `1.2.1` | identity; nothing is encrypted |
//!
//! # Key mismatch ambiguity
//!
//! CBC with PKCS#7 padding carries no authentication tag. A wrong password or
//! key and a corrupted ciphertext both show up as bad padding (or a file key
//! of the wrong length) and are reported the same way, as
//! [`Error::KeyMismatch`].

mod certificate;
mod password;

pub use certificate::{KeyTransportAlgorithm, Recipient};
pub use password::SALT_LEN;

use der::asn1::{Ia5String, OctetString};
use der::{Decode, Encode, Sequence};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::config::SignConfig;
use crate::crypto::{random_bytes, CipherAlgorithm, DigestAlgorithm};
use crate::error::{Error, Result};

/// Protection case identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProtectionCase {
    /// Password-based symmetric envelope (`1.1.1`)
    EncryptGmPassword,
    /// Certificate-based hybrid envelope (`1.1.2`)
    EncryptGmCert,
    /// Signature only, no encryption (`1.2.1`)
    #[default]
    SignatureOnly,
}

impl ProtectionCase {
    /// Identifier persisted in the signature list.
    pub fn id(&self) -> &'static str {
        match self {
            ProtectionCase::EncryptGmPassword => "1.1.1",
            ProtectionCase::EncryptGmCert => "1.1.2",
            ProtectionCase::SignatureOnly => "1.2.1",
        }
    }

    /// Parse a persisted identifier.
    pub fn from_id(id: &str) -> Result<Self> {
        match id.trim() {
            "1.1.1" => Ok(ProtectionCase::EncryptGmPassword),
            "1.1.2" => Ok(ProtectionCase::EncryptGmCert),
            "1.2.1" => Ok(ProtectionCase::SignatureOnly),
            other => Err(Error::UnsupportedProtectionCase(other.to_string())),
        }
    }

    /// Whether this case produces ciphertext.
    pub fn is_encrypting(&self) -> bool {
        !matches!(self, ProtectionCase::SignatureOnly)
    }
}

/// Keys for protecting or unprotecting content.
#[derive(Clone, Default)]
pub enum KeyMaterial {
    /// No key; only valid for [`ProtectionCase::SignatureOnly`]
    #[default]
    None,
    /// Password for [`ProtectionCase::EncryptGmPassword`], both directions
    Password(String),
    /// Recipients to protect for under [`ProtectionCase::EncryptGmCert`]
    Recipients(Vec<Recipient>),
    /// A recipient's certificate and key, to unprotect [`ProtectionCase::EncryptGmCert`]
    PrivateKey {
        /// DER-encoded certificate identifying the recipient
        certificate: Vec<u8>,
        /// Matching private key
        key: RsaPrivateKey,
    },
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterial::None => write!(f, "KeyMaterial::None"),
            KeyMaterial::Password(_) => write!(f, "KeyMaterial::Password([REDACTED])"),
            KeyMaterial::Recipients(r) => write!(f, "KeyMaterial::Recipients({})", r.len()),
            KeyMaterial::PrivateKey { .. } => write!(f, "KeyMaterial::PrivateKey([REDACTED])"),
        }
    }
}

/// A file key wrapped for one party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// `password`, or the recipient certificate fingerprint
    pub recipient: String,
    /// How the key was wrapped
    pub transport: String,
    /// Wrapped key bytes
    pub encrypted_key: Vec<u8>,
}

/// Output of [`ProtectionEnvelope::protect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedContent {
    /// Governing case
    pub case: ProtectionCase,
    /// Cipher parameters; `None` for signature-only
    pub cipher: Option<CipherAlgorithm>,
    /// CBC initialization vector (empty for signature-only)
    pub iv: Vec<u8>,
    /// KDF salt (password case only)
    pub salt: Option<Vec<u8>>,
    /// Wrapped file keys
    pub wrapped_keys: Vec<WrappedKey>,
    /// Ciphertext, or the content itself for signature-only
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct WrappedKeyDer {
    recipient: String,
    transport: Ia5String,
    encrypted_key: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct ProtectedContentDer {
    case_id: Ia5String,
    cipher: Ia5String,
    iv: OctetString,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    salt: Option<OctetString>,
    keys: Vec<WrappedKeyDer>,
    content: OctetString,
}

fn der_err(err: der::Error) -> Error {
    Error::Envelope(err.to_string())
}

impl ProtectedContent {
    /// Persisted form: raw content for signature-only, DER otherwise.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        let cipher = match (self.case, self.cipher) {
            (ProtectionCase::SignatureOnly, _) => return Ok(self.content.clone()),
            (_, Some(cipher)) => cipher,
            (case, None) => {
                return Err(Error::Envelope(format!("case {} requires a cipher", case.id())))
            },
        };

        let der = ProtectedContentDer {
            case_id: Ia5String::new(self.case.id()).map_err(der_err)?,
            cipher: Ia5String::new(cipher.name()).map_err(der_err)?,
            iv: OctetString::new(self.iv.as_slice()).map_err(der_err)?,
            salt: self
                .salt
                .as_deref()
                .map(OctetString::new)
                .transpose()
                .map_err(der_err)?,
            keys: self
                .wrapped_keys
                .iter()
                .map(|k| {
                    Ok(WrappedKeyDer {
                        recipient: k.recipient.clone(),
                        transport: Ia5String::new(&k.transport)?,
                        encrypted_key: OctetString::new(k.encrypted_key.as_slice())?,
                    })
                })
                .collect::<der::Result<Vec<_>>>()
                .map_err(der_err)?,
            content: OctetString::new(self.content.as_slice()).map_err(der_err)?,
        };
        der.to_der().map_err(der_err)
    }

    /// Parse a persisted blob written under `case`.
    pub fn from_blob(case: ProtectionCase, blob: &[u8]) -> Result<Self> {
        if case == ProtectionCase::SignatureOnly {
            return Ok(Self {
                case,
                cipher: None,
                iv: Vec::new(),
                salt: None,
                wrapped_keys: Vec::new(),
                content: blob.to_vec(),
            });
        }

        let der = ProtectedContentDer::from_der(blob).map_err(der_err)?;
        let found = ProtectionCase::from_id(&der.case_id.to_string())?;
        if found != case {
            return Err(Error::ProtectionCaseMismatch {
                expected: case.id().to_string(),
                found: found.id().to_string(),
            });
        }

        Ok(Self {
            case,
            cipher: Some(CipherAlgorithm::from_name(&der.cipher.to_string())?),
            iv: der.iv.as_bytes().to_vec(),
            salt: der.salt.map(|s| s.as_bytes().to_vec()),
            wrapped_keys: der
                .keys
                .into_iter()
                .map(|k| WrappedKey {
                    recipient: k.recipient,
                    transport: k.transport.to_string(),
                    encrypted_key: k.encrypted_key.as_bytes().to_vec(),
                })
                .collect(),
            content: der.content.as_bytes().to_vec(),
        })
    }
}

/// Applies and removes protection cases with a fixed cipher and KDF digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectionEnvelope {
    cipher: CipherAlgorithm,
    digest: DigestAlgorithm,
}

impl ProtectionEnvelope {
    /// Create an envelope with explicit algorithms.
    pub fn new(cipher: CipherAlgorithm, digest: DigestAlgorithm) -> Self {
        Self { cipher, digest }
    }

    /// Create an envelope from session configuration.
    pub fn from_config(config: &SignConfig) -> Self {
        Self::new(config.cipher, config.digest_algorithm)
    }

    /// Cipher used when protecting.
    pub fn cipher(&self) -> CipherAlgorithm {
        self.cipher
    }

    /// Protect `content` under `case`.
    pub fn protect(
        &self,
        case: ProtectionCase,
        content: &[u8],
        key: &KeyMaterial,
    ) -> Result<ProtectedContent> {
        match case {
            ProtectionCase::SignatureOnly => Ok(ProtectedContent {
                case,
                cipher: None,
                iv: Vec::new(),
                salt: None,
                wrapped_keys: Vec::new(),
                content: content.to_vec(),
            }),
            ProtectionCase::EncryptGmPassword => {
                let KeyMaterial::Password(pw) = key else {
                    return Err(Error::MissingKeyMaterial(
                        "password case requires a password".to_string(),
                    ));
                };
                let salt = random_bytes(SALT_LEN);
                let iv = random_bytes(self.cipher.iv_len());
                let file_key = random_bytes(self.cipher.key_len());
                let entry = password::wrap(self.digest, self.cipher, pw, &salt, &iv, &file_key)?;
                Ok(ProtectedContent {
                    case,
                    cipher: Some(self.cipher),
                    content: self.cipher.encrypt(&file_key, &iv, content)?,
                    iv,
                    salt: Some(salt),
                    wrapped_keys: vec![entry],
                })
            },
            ProtectionCase::EncryptGmCert => {
                let recipients = match key {
                    KeyMaterial::Recipients(r) if !r.is_empty() => r,
                    _ => {
                        return Err(Error::MissingKeyMaterial(
                            "certificate case requires at least one recipient".to_string(),
                        ))
                    },
                };
                let iv = random_bytes(self.cipher.iv_len());
                let file_key = random_bytes(self.cipher.key_len());
                let wrapped_keys = recipients
                    .iter()
                    .map(|r| r.wrap(&file_key))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ProtectedContent {
                    case,
                    cipher: Some(self.cipher),
                    content: self.cipher.encrypt(&file_key, &iv, content)?,
                    iv,
                    salt: None,
                    wrapped_keys,
                })
            },
        }
    }

    /// Remove protection. The cipher recorded in `protected` is used, not
    /// this envelope's.
    pub fn unprotect(
        &self,
        case: ProtectionCase,
        protected: &ProtectedContent,
        key: &KeyMaterial,
    ) -> Result<Vec<u8>> {
        if protected.case != case {
            return Err(Error::ProtectionCaseMismatch {
                expected: case.id().to_string(),
                found: protected.case.id().to_string(),
            });
        }
        if case == ProtectionCase::SignatureOnly {
            return Ok(protected.content.clone());
        }

        let cipher = protected
            .cipher
            .ok_or_else(|| Error::Envelope("missing cipher".to_string()))?;
        let file_key = match (case, key) {
            (ProtectionCase::EncryptGmPassword, KeyMaterial::Password(pw)) => {
                let salt = protected
                    .salt
                    .as_deref()
                    .ok_or_else(|| Error::Envelope("missing salt".to_string()))?;
                password::unwrap(&protected.wrapped_keys, cipher, pw, salt, &protected.iv)?
            },
            (ProtectionCase::EncryptGmCert, KeyMaterial::PrivateKey { certificate, key }) => {
                let file_key = certificate::unwrap_key(&protected.wrapped_keys, certificate, key)?;
                if file_key.len() != cipher.key_len() {
                    return Err(Error::KeyMismatch);
                }
                file_key
            },
            (case, key) => {
                return Err(Error::MissingKeyMaterial(format!(
                    "{:?} cannot open case {}",
                    key,
                    case.id()
                )))
            },
        };

        cipher.decrypt(&file_key, &protected.iv, &protected.content)
    }

    /// Exact persisted size of `content_len` bytes protected under `case`.
    ///
    /// CBC padding, IV, salt and RSA-wrapped key sizes depend only on input
    /// lengths, so a trial run over zeros gives the final size.
    pub fn protected_len(
        &self,
        case: ProtectionCase,
        content_len: usize,
        key: &KeyMaterial,
    ) -> Result<usize> {
        if case == ProtectionCase::SignatureOnly {
            return Ok(content_len);
        }
        Ok(self.protect(case, &vec![0u8; content_len], key)?.to_blob()?.len())
    }
}
