//! In-memory package.

use indexmap::IndexMap;

use super::{check_writable, normalize_path, OpenMode, Package};
use crate::error::{Error, Result};

/// Package whose entries live in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryPackage {
    entries: IndexMap<String, Vec<u8>>,
    mode: OpenMode,
    closed: bool,
}

impl MemoryPackage {
    /// Empty read-write package.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-write package over existing entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(path, data)| (normalize_path(path.as_ref()), data))
                .collect(),
            mode: OpenMode::ReadWrite,
            closed: false,
        }
    }

    /// Reopen in read-only mode.
    pub fn read_only(mut self) -> Self {
        self.mode = OpenMode::ReadOnly;
        self.closed = false;
        self
    }

    /// Reopen in read-write mode.
    pub fn read_write(mut self) -> Self {
        self.mode = OpenMode::ReadWrite;
        self.closed = false;
        self
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Borrow the entries, regardless of open state.
    pub fn entries(&self) -> &IndexMap<String, Vec<u8>> {
        &self.entries
    }

    /// Mutable access to an entry's bytes, regardless of open state.
    pub fn entry_mut(&mut self, path: &str) -> Option<&mut Vec<u8>> {
        self.entries.get_mut(&normalize_path(path))
    }

    /// Take the entries.
    pub fn into_entries(self) -> IndexMap<String, Vec<u8>> {
        self.entries
    }
}

impl Package for MemoryPackage {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::PackageClosed);
        }
        let key = normalize_path(path);
        self.entries
            .get(&key)
            .cloned()
            .ok_or(Error::EntryNotFound(key))
    }

    fn write(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        check_writable(self.mode, self.closed)?;
        self.entries.insert(normalize_path(path), data);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if self.closed {
            return Err(Error::PackageClosed);
        }
        let prefix = normalize_path(prefix);
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn contains(&self, path: &str) -> bool {
        !self.closed && self.entries.contains_key(&normalize_path(path))
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        check_writable(self.mode, self.closed)?;
        self.entries.shift_remove(&normalize_path(path));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}
