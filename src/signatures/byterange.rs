//! Byte-range digest engine.
//!
//! A signing round protects a list of package entries. Each entry is read
//! whole; if an [`ExclusionWindow`] names it, the window's bytes are removed
//! before hashing. Two digests are derived from the same spliced bytes:
//!
//! - one check value per entry ([`DigestEngine::compute_reference_digests`])
//! - the content digest over the concatenation of all entries, in list
//!   order ([`DigestEngine::compute_with_exclusion`]), recorded in the
//!   descriptor next to the check values
//!
//! Verification recomputes both with the windows recorded at sign time, so
//! the signed value may be written into its reserved window afterwards
//! without changing either digest.

use crate::config::SignConfig;
use crate::crypto::DigestAlgorithm;
use crate::error::{Error, Result};
use crate::package::{normalize_path, Package};

use super::types::{ExclusionWindow, ReferenceDigest};

/// Computes reference and content digests over package entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestEngine {
    algorithm: DigestAlgorithm,
}

impl DigestEngine {
    /// Create an engine for `algorithm`.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Create an engine from session configuration.
    pub fn from_config(config: &SignConfig) -> Self {
        Self::new(config.digest_algorithm)
    }

    /// Digest algorithm in use.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// One check value per entry in `files`, windows applied.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyReferenceSet`] for an empty list, [`Error::Reference`]
    /// for a missing entry, [`Error::InvalidExclusionWindow`] for a window
    /// that does not fit its entry.
    pub fn compute_reference_digests<P: Package + ?Sized>(
        &self,
        package: &P,
        files: &[String],
        exclusions: &[ExclusionWindow],
    ) -> Result<Vec<ReferenceDigest>> {
        if files.is_empty() {
            return Err(Error::EmptyReferenceSet);
        }

        files
            .iter()
            .map(|file| {
                let path = normalize_path(file);
                let bytes = protected_bytes(package, &path, exclusions)?;
                log::debug!("digest {} over {} bytes of {}", self.algorithm.name(), bytes.len(), path);
                Ok(ReferenceDigest {
                    value: self.algorithm.hash(&bytes),
                    algorithm: self.algorithm,
                    path,
                })
            })
            .collect()
    }

    /// Digest over the concatenation of all entries in `files`, windows applied.
    ///
    /// Fails like [`compute_reference_digests`](Self::compute_reference_digests).
    pub fn compute_with_exclusion<P: Package + ?Sized>(
        &self,
        package: &P,
        files: &[String],
        exclusions: &[ExclusionWindow],
    ) -> Result<Vec<u8>> {
        if files.is_empty() {
            return Err(Error::EmptyReferenceSet);
        }

        let mut hasher = self.algorithm.hasher();
        let mut total = 0usize;
        for file in files {
            let bytes = protected_bytes(package, &normalize_path(file), exclusions)?;
            total += bytes.len();
            hasher.update(&bytes);
        }
        log::debug!(
            "content digest over {} entries ({} bytes)",
            files.len(),
            total
        );
        Ok(hasher.finalize().into_vec())
    }
}

/// Read `path` and remove every window that targets it.
pub fn protected_bytes<P: Package + ?Sized>(
    package: &P,
    path: &str,
    exclusions: &[ExclusionWindow],
) -> Result<Vec<u8>> {
    let data = package.read(path).map_err(|e| match e {
        Error::EntryNotFound(p) => Error::Reference(p),
        other => other,
    })?;

    let windows: Vec<&ExclusionWindow> = exclusions.iter().filter(|w| w.path == path).collect();
    if windows.is_empty() {
        return Ok(data);
    }
    splice(&data, path, &windows)
}

/// Remove `windows` from `data`. Windows must lie within `data` and not overlap.
pub fn splice(data: &[u8], path: &str, windows: &[&ExclusionWindow]) -> Result<Vec<u8>> {
    let invalid = |reason: String| Error::InvalidExclusionWindow {
        path: path.to_string(),
        reason,
    };

    let mut sorted: Vec<&ExclusionWindow> = windows.to_vec();
    sorted.sort_by_key(|w| w.offset);

    let mut out = Vec::with_capacity(data.len());
    let mut cursor = 0usize;
    for window in sorted {
        let end = window
            .end()
            .ok_or_else(|| invalid(format!("offset {} + length {} overflows", window.offset, window.length)))?;
        if end > data.len() {
            return Err(invalid(format!(
                "window {}..{} exceeds entry size {}",
                window.offset,
                end,
                data.len()
            )));
        }
        if window.offset < cursor {
            return Err(invalid(format!(
                "window at {} overlaps the previous window ending at {}",
                window.offset, cursor
            )));
        }
        out.extend_from_slice(&data[cursor..window.offset]);
        cursor = end;
    }
    out.extend_from_slice(&data[cursor..]);
    Ok(out)
}
