//! Counter-mode key derivation (GB/T 32918.3 §5.4.3).
//!
//! `K = H(Z || ct=1) || H(Z || ct=2) || ...`, truncated to the requested
//! length. The counter is a 32-bit big-endian integer starting at 1.

use byteorder::{BigEndian, ByteOrder};

use super::DigestAlgorithm;
use crate::error::{Error, Result};

/// Derive `output_length` bytes of key material from `shared_secret`.
///
/// # Arguments
///
/// * `algorithm` - Digest applied in every round
/// * `shared_secret` - The secret `Z`
/// * `output_length` - Bytes to produce; must be non-zero
///
/// # Returns
///
/// Exactly `output_length` bytes. The last round's output is truncated,
/// never padded.
pub fn derive(
    algorithm: DigestAlgorithm,
    shared_secret: &[u8],
    output_length: usize,
) -> Result<Vec<u8>> {
    if output_length == 0 {
        return Err(Error::InvalidArgument("KDF output length must be non-zero".to_string()));
    }

    let block = algorithm.output_size();
    let rounds = output_length.div_ceil(block);
    if rounds > u32::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "KDF output length {} exceeds counter range",
            output_length
        )));
    }

    let mut output = Vec::with_capacity(rounds * block);
    let mut counter = [0u8; 4];
    for ct in 1..=rounds as u32 {
        BigEndian::write_u32(&mut counter, ct);
        let mut hasher = algorithm.hasher();
        hasher.update(shared_secret);
        hasher.update(&counter);
        output.extend_from_slice(&hasher.finalize());
    }

    output.truncate(output_length);
    Ok(output)
}
