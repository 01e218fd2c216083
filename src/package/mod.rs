//! Package container interface.
//!
//! An OFD package is a zip of XML part-files. Signing only needs whole-entry
//! access, so the container is reduced to `read`/`write`/`list`/`close`.
//! Two implementations are provided:
//!
//! - [`MemoryPackage`]: entries held in an ordered map
//! - [`ZipPackage`]: a `.ofd` file on disk, rewritten on close
//!
//! [`StagedPackage`] buffers changes over either one until they are
//! committed, so a session that fails halfway leaves nothing behind.
//!
//! Entry paths are package-relative with `/` separators. A leading `/`
//! (OFD `ST_Loc` absolute form) is accepted and stripped.

mod archive;
mod memory;
mod staged;

pub use archive::ZipPackage;
pub use memory::MemoryPackage;
pub use staged::StagedPackage;

use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};

/// How a package was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Reads only; writes fail with [`Error::ReadOnly`]
    ReadOnly,
    /// Reads and writes; changes are flushed on close
    #[default]
    ReadWrite,
}

/// Whole-entry access to a document package.
pub trait Package {
    /// Read an entry's bytes.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace an entry.
    fn write(&mut self, path: &str, data: Vec<u8>) -> Result<()>;

    /// Entry paths starting with `prefix`, in container order. An empty
    /// prefix lists the whole manifest.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether an entry exists.
    fn contains(&self, path: &str) -> bool;

    /// Remove an entry. Missing entries are not an error.
    fn remove(&mut self, path: &str) -> Result<()>;

    /// Flush and release the package. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Mode the package was opened in.
    fn mode(&self) -> OpenMode;
}

/// Strip a leading `/` and collapse `./` segments.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Directory part of an entry path, with trailing `/`, or empty for root entries.
pub fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => String::new(),
    }
}

/// Closes the borrowed package when dropped, so a session releases it on
/// every exit path, panics included.
///
/// Call [`PackageGuard::close`] on the normal path to observe the close
/// result; a close failure during drop is only logged.
pub struct PackageGuard<'a, P: Package + ?Sized> {
    package: &'a mut P,
    closed: bool,
}

impl<'a, P: Package + ?Sized> PackageGuard<'a, P> {
    /// Take the package for the duration of a session.
    pub fn new(package: &'a mut P) -> Self {
        Self {
            package,
            closed: false,
        }
    }

    /// Close the package now.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.package.close()
    }
}

impl<P: Package + ?Sized> Deref for PackageGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &*self.package
    }
}

impl<P: Package + ?Sized> DerefMut for PackageGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut *self.package
    }
}

impl<P: Package + ?Sized> Drop for PackageGuard<'_, P> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.package.close() {
                log::warn!("failed to close package on unwind: {}", e);
            }
        }
    }
}

pub(crate) fn check_writable(mode: OpenMode, closed: bool) -> Result<()> {
    if closed {
        return Err(Error::PackageClosed);
    }
    if mode == OpenMode::ReadOnly {
        return Err(Error::ReadOnly);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/Doc_0/Document.xml"), "Doc_0/Document.xml");
        assert_eq!(normalize_path("Doc_0//Signs/./Sign_0/Seal.esl"), "Doc_0/Signs/Sign_0/Seal.esl");
        assert_eq!(normalize_path("OFD.xml"), "OFD.xml");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("Doc_0/Signs/Signatures.xml"), "Doc_0/Signs/");
        assert_eq!(parent_dir("OFD.xml"), "");
    }

    #[test]
    fn test_check_writable() {
        assert!(check_writable(OpenMode::ReadWrite, false).is_ok());
        assert!(matches!(check_writable(OpenMode::ReadOnly, false), Err(Error::ReadOnly)));
        assert!(matches!(check_writable(OpenMode::ReadWrite, true), Err(Error::PackageClosed)));
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let mut pkg = MemoryPackage::from_entries([("a", b"1".to_vec())]);
        {
            let guard = PackageGuard::new(&mut pkg);
            assert_eq!(guard.read("a").unwrap(), b"1");
        }
        assert!(pkg.is_closed());
    }

    #[test]
    fn test_guard_closes_on_panic() {
        let mut pkg = MemoryPackage::from_entries([("a", b"1".to_vec())]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = PackageGuard::new(&mut pkg);
            guard.write("b", b"2".to_vec()).unwrap();
            panic!("signing hook panicked");
        }));
        assert!(result.is_err());
        assert!(pkg.is_closed());
    }

    #[test]
    fn test_guard_explicit_close() {
        let mut pkg = MemoryPackage::new();
        let guard = PackageGuard::new(&mut pkg);
        guard.close().unwrap();
        assert!(pkg.is_closed());
    }
}
