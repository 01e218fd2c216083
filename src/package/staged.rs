//! Write buffer over a package.

use indexmap::IndexMap;

use super::{normalize_path, OpenMode, Package};
use crate::error::{Error, Result};

/// Holds writes and removals in memory until [`StagedPackage::commit`].
///
/// Reads, listings and lookups see the staged changes layered over the
/// underlying package. Dropping the stage, or closing it, discards every
/// uncommitted change and leaves the underlying package as it was; the
/// underlying package stays open either way.
pub struct StagedPackage<'a, P: Package + ?Sized> {
    inner: &'a mut P,
    // `None` marks a staged removal
    pending: IndexMap<String, Option<Vec<u8>>>,
}

impl<'a, P: Package + ?Sized> StagedPackage<'a, P> {
    /// Stage changes over `inner`.
    pub fn new(inner: &'a mut P) -> Self {
        Self {
            inner,
            pending: IndexMap::new(),
        }
    }

    /// Number of staged changes.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Apply the staged changes to the underlying package, in staging order.
    pub fn commit(self) -> Result<usize> {
        let count = self.pending.len();
        for (path, change) in self.pending {
            match change {
                Some(data) => self.inner.write(&path, data)?,
                None => self.inner.remove(&path)?,
            }
        }
        log::debug!("committed {} staged change(s)", count);
        Ok(count)
    }
}

impl<P: Package + ?Sized> Package for StagedPackage<'_, P> {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = normalize_path(path);
        match self.pending.get(&key) {
            Some(Some(data)) => Ok(data.clone()),
            Some(None) => Err(Error::EntryNotFound(key)),
            None => self.inner.read(&key),
        }
    }

    fn write(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        if self.inner.mode() == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        self.pending.insert(normalize_path(path), Some(data));
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = normalize_path(prefix);
        let mut paths: Vec<String> = self
            .inner
            .list(&prefix)?
            .into_iter()
            .filter(|p| !matches!(self.pending.get(p), Some(None)))
            .collect();
        for (path, change) in &self.pending {
            if change.is_some() && path.starts_with(&prefix) && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        Ok(paths)
    }

    fn contains(&self, path: &str) -> bool {
        let key = normalize_path(path);
        match self.pending.get(&key) {
            Some(change) => change.is_some(),
            None => self.inner.contains(&key),
        }
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        if self.inner.mode() == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        self.pending.insert(normalize_path(path), None);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            log::debug!("discarding {} staged change(s)", self.pending.len());
        }
        self.pending.clear();
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.inner.mode()
    }
}
