//! Cryptographic building blocks.
//!
//! The primitives themselves come from RustCrypto crates; this module only
//! names the algorithms a package may reference and dispatches to them:
//!
//! - [`DigestAlgorithm`]: the digest provider (SM3 by default)
//! - [`CipherAlgorithm`]: block ciphers used by the protection envelope
//! - [`SignatureAlgorithm`]: signature algorithms recorded in seals
//! - [`kdf`]: key derivation from a shared secret
//! - [`certificate`]: X.509 helpers and self-signed issuance for tests
//!
//! Algorithms are always passed explicitly; there is no process-wide registry.

use std::io::Read;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::digest::DynDigest;

use crate::error::{Error, Result};

pub mod block;
pub mod certificate;
pub mod kdf;

/// Digest algorithm used for reference check values and the KDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    /// SM3 (GB/T 32905), 256-bit domestic hash
    #[default]
    Sm3,
    /// SHA-1 (accepted for legacy check values only)
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Object identifier written as the `CheckMethod` of a reference set.
    pub fn oid(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sm3 => "1.2.156.10197.1.401",
            DigestAlgorithm::Sha1 => "1.3.14.3.2.26",
            DigestAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
            DigestAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
            DigestAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    /// Get algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sm3 => "SM3",
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Fixed output length in bytes.
    pub fn output_size(&self) -> usize {
        match self {
            DigestAlgorithm::Sm3 | DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Resolve an algorithm from its OID or its name.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        let id = identifier.trim();
        let all = [
            DigestAlgorithm::Sm3,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ];
        all.into_iter()
            .find(|alg| {
                alg.oid() == id
                    || alg.name().eq_ignore_ascii_case(id)
                    || alg.name().replace('-', "").eq_ignore_ascii_case(id)
            })
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest '{}'", identifier)))
    }

    /// Fresh incremental hasher for this algorithm.
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sm3 => Box::new(sm3::Sm3::default()),
            DigestAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            DigestAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }

    /// Hash a byte slice.
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize().into_vec()
    }

    /// Hash everything a reader yields.
    pub fn hash_stream<R: Read>(&self, mut source: R) -> Result<Vec<u8>> {
        let mut hasher = self.hasher();
        let mut buf = [0u8; 8192];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize().into_vec())
    }
}

/// Block cipher used by the encrypting protection cases. All run in CBC mode
/// with PKCS#7 padding over 16-byte blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherAlgorithm {
    /// SM4 (GB/T 32907) in CBC mode
    #[default]
    Sm4Cbc,
    /// AES-128 in CBC mode
    Aes128Cbc,
    /// AES-256 in CBC mode
    Aes256Cbc,
}

impl CipherAlgorithm {
    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::Sm4Cbc | CipherAlgorithm::Aes128Cbc => 16,
            CipherAlgorithm::Aes256Cbc => 32,
        }
    }

    /// IV length in bytes (one block).
    pub fn iv_len(&self) -> usize {
        block::BLOCK_SIZE
    }

    /// Name stored in protection envelopes.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::Sm4Cbc => "SM4-CBC",
            CipherAlgorithm::Aes128Cbc => "AES-128-CBC",
            CipherAlgorithm::Aes256Cbc => "AES-256-CBC",
        }
    }

    /// Parse a stored cipher name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "SM4-CBC" => Ok(CipherAlgorithm::Sm4Cbc),
            "AES-128-CBC" => Ok(CipherAlgorithm::Aes128Cbc),
            "AES-256-CBC" => Ok(CipherAlgorithm::Aes256Cbc),
            other => Err(Error::UnsupportedAlgorithm(format!("cipher '{}'", other))),
        }
    }

    /// Encrypt with PKCS#7 padding.
    pub fn encrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CipherAlgorithm::Sm4Cbc => block::encrypt::<sm4::Sm4>(key, iv, data),
            CipherAlgorithm::Aes128Cbc => block::encrypt::<aes::Aes128>(key, iv, data),
            CipherAlgorithm::Aes256Cbc => block::encrypt::<aes::Aes256>(key, iv, data),
        }
    }

    /// Decrypt and strip PKCS#7 padding.
    ///
    /// Bad padding surfaces as [`Error::KeyMismatch`].
    pub fn decrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            CipherAlgorithm::Sm4Cbc => block::decrypt::<sm4::Sm4>(key, iv, data),
            CipherAlgorithm::Aes128Cbc => block::decrypt::<aes::Aes128>(key, iv, data),
            CipherAlgorithm::Aes256Cbc => block::decrypt::<aes::Aes256>(key, iv, data),
        }
    }
}

/// Signature algorithm named by a seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// SM2 signature over SM3 (GM/T 0009)
    Sm3WithSm2,
    /// RSA PKCS#1 v1.5 with SHA-256
    Sha256WithRsa,
    /// RSA PKCS#1 v1.5 with SHA-384
    Sha384WithRsa,
    /// RSA PKCS#1 v1.5 with SHA-512
    Sha512WithRsa,
}

impl SignatureAlgorithm {
    /// Get the OID for this algorithm.
    pub fn oid(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sm3WithSm2 => "1.2.156.10197.1.501",
            SignatureAlgorithm::Sha256WithRsa => "1.2.840.113549.1.1.11",
            SignatureAlgorithm::Sha384WithRsa => "1.2.840.113549.1.1.12",
            SignatureAlgorithm::Sha512WithRsa => "1.2.840.113549.1.1.13",
        }
    }

    /// Get algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sm3WithSm2 => "SM3withSM2",
            SignatureAlgorithm::Sha256WithRsa => "SHA256withRSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384withRSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512withRSA",
        }
    }

    /// Parse an OID string.
    pub fn from_oid(oid: &str) -> Result<Self> {
        match oid.trim() {
            "1.2.156.10197.1.501" => Ok(SignatureAlgorithm::Sm3WithSm2),
            "1.2.840.113549.1.1.11" => Ok(SignatureAlgorithm::Sha256WithRsa),
            "1.2.840.113549.1.1.12" => Ok(SignatureAlgorithm::Sha384WithRsa),
            "1.2.840.113549.1.1.13" => Ok(SignatureAlgorithm::Sha512WithRsa),
            other => Err(Error::UnsupportedAlgorithm(format!("signature '{}'", other))),
        }
    }

    /// Digest the algorithm hashes with.
    pub fn digest(&self) -> DigestAlgorithm {
        match self {
            SignatureAlgorithm::Sm3WithSm2 => DigestAlgorithm::Sm3,
            SignatureAlgorithm::Sha256WithRsa => DigestAlgorithm::Sha256,
            SignatureAlgorithm::Sha384WithRsa => DigestAlgorithm::Sha384,
            SignatureAlgorithm::Sha512WithRsa => DigestAlgorithm::Sha512,
        }
    }

    /// Whether this is one of the RSA algorithms.
    pub fn is_rsa(&self) -> bool {
        !matches!(self, SignatureAlgorithm::Sm3WithSm2)
    }
}

/// Fill a fresh buffer from the OS random source.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Compare two byte strings without early exit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

/// Uppercase hex encoding.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8] = b"0123456789ABCDEF";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}
