//! Password-based key wrapping.
//!
//! `KEK = KDF(password || salt, key_len)`. The random file key is CBC
//! encrypted under the KEK with the envelope IV. The digest driving the KDF
//! is recorded in the wrapped key's transport name (`KDF-SM3`, ...).

use super::WrappedKey;
use crate::crypto::{kdf, CipherAlgorithm, DigestAlgorithm};
use crate::error::{Error, Result};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Recipient label used for the single password entry.
const PASSWORD_RECIPIENT: &str = "password";

const TRANSPORT_PREFIX: &str = "KDF-";

fn key_encryption_key(
    digest: DigestAlgorithm,
    cipher: CipherAlgorithm,
    password: &str,
    salt: &[u8],
) -> Result<Vec<u8>> {
    let mut secret = Vec::with_capacity(password.len() + salt.len());
    secret.extend_from_slice(password.as_bytes());
    secret.extend_from_slice(salt);
    kdf::derive(digest, &secret, cipher.key_len())
}

/// Wrap `file_key` under a key derived from `password`.
pub(crate) fn wrap(
    digest: DigestAlgorithm,
    cipher: CipherAlgorithm,
    password: &str,
    salt: &[u8],
    iv: &[u8],
    file_key: &[u8],
) -> Result<WrappedKey> {
    let kek = key_encryption_key(digest, cipher, password, salt)?;
    Ok(WrappedKey {
        recipient: PASSWORD_RECIPIENT.to_string(),
        transport: format!("{}{}", TRANSPORT_PREFIX, digest.name()),
        encrypted_key: cipher.encrypt(&kek, iv, file_key)?,
    })
}

/// Recover the file key. A wrong password surfaces as [`Error::KeyMismatch`].
pub(crate) fn unwrap(
    entries: &[WrappedKey],
    cipher: CipherAlgorithm,
    password: &str,
    salt: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>> {
    let entry = entries
        .iter()
        .find(|e| e.recipient == PASSWORD_RECIPIENT)
        .ok_or_else(|| Error::Envelope("no password entry".to_string()))?;
    let digest_name = entry.transport.strip_prefix(TRANSPORT_PREFIX).ok_or_else(|| {
        Error::Envelope(format!("unexpected password transport '{}'", entry.transport))
    })?;
    let digest = DigestAlgorithm::from_identifier(digest_name)?;

    let kek = key_encryption_key(digest, cipher, password, salt)?;
    let file_key = cipher.decrypt(&kek, iv, &entry.encrypted_key)?;
    if file_key.len() != cipher.key_len() {
        return Err(Error::KeyMismatch);
    }
    Ok(file_key)
}
