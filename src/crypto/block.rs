//! CBC mode with PKCS#7 padding for 16-byte block ciphers.
//!
//! Padding is applied by hand and the cipher runs with `NoPadding`, so a
//! wrong key is detected at unpad time and reported as
//! [`Error::KeyMismatch`].

use ::cbc::{Decryptor, Encryptor};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};

use crate::error::{Error, Result};

/// Block size shared by SM4 and AES.
pub const BLOCK_SIZE: usize = 16;

/// Append PKCS#7 padding up to the next block boundary.
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    let padding_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    padded.extend(std::iter::repeat_n(padding_len as u8, padding_len));
    padded
}

/// Strip and check PKCS#7 padding.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8]> {
    let padding_len = match data.last() {
        Some(&last) => last as usize,
        None => return Err(Error::KeyMismatch),
    };
    if padding_len == 0 || padding_len > BLOCK_SIZE || padding_len > data.len() {
        return Err(Error::KeyMismatch);
    }

    let data_len = data.len() - padding_len;
    if data[data_len..].iter().any(|&b| b as usize != padding_len) {
        return Err(Error::KeyMismatch);
    }

    Ok(&data[..data_len])
}

/// Encrypt `data` under `key` and `iv` with cipher `C` in CBC mode.
pub fn encrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    check_iv(iv)?;
    let cipher = Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto(format!("invalid key length {}", key.len())))?;

    let mut padded = pkcs7_pad(data);
    let len = padded.len();
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .map_err(|_| Error::Crypto("CBC encryption failed".to_string()))?;

    Ok(padded)
}

/// Decrypt CBC ciphertext produced by [`encrypt`].
pub fn decrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    check_iv(iv)?;
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::KeyMismatch);
    }
    let cipher = Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto(format!("invalid key length {}", key.len())))?;

    let mut buffer = data.to_vec();
    let decrypted = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::KeyMismatch)?;

    Ok(pkcs7_unpad(decrypted)?.to_vec())
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != BLOCK_SIZE {
        return Err(Error::Crypto(format!("IV must be {} bytes, got {}", BLOCK_SIZE, iv.len())));
    }
    Ok(())
}
