//! Zip-backed package on disk.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{check_writable, normalize_path, OpenMode, Package};
use crate::error::{Error, Result};

/// A `.ofd` file opened for signing or verification.
///
/// Entries are loaded eagerly. In read-write mode, modifications are written
/// to a sibling temporary file on [`close`](Package::close), which then
/// replaces the original. Dropping an unclosed package closes it.
#[derive(Debug)]
pub struct ZipPackage {
    path: PathBuf,
    entries: IndexMap<String, Vec<u8>>,
    mode: OpenMode,
    dirty: bool,
    closed: bool,
}

impl ZipPackage {
    /// Open an existing package file.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = IndexMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = normalize_path(entry.name());
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            entries.insert(name, data);
        }

        log::debug!("opened package {} ({} entries, {:?})", path.display(), entries.len(), mode);

        Ok(Self {
            path,
            entries,
            mode,
            dirty: false,
            closed: false,
        })
    }

    /// Create a new package file from entries and write it immediately.
    pub fn create<P, I, S>(path: P, entries: I) -> Result<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let mut package = Self {
            path: path.as_ref().to_path_buf(),
            entries: entries
                .into_iter()
                .map(|(p, d)| (normalize_path(p.as_ref()), d))
                .collect(),
            mode: OpenMode::ReadWrite,
            dirty: true,
            closed: false,
        };
        package.flush()?;
        Ok(package)
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let tmp_path = self.path.with_extension("ofd.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = ZipWriter::new(file);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, data) in &self.entries {
                writer.start_file(name.as_str(), options)?;
                writer.write_all(data)?;
            }
            writer.finish()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        log::debug!("flushed package {} ({} entries)", self.path.display(), self.entries.len());
        self.dirty = false;
        Ok(())
    }
}

impl Package for ZipPackage {
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
        self.dirty = true;
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
        if self.entries.shift_remove(&normalize_path(path)).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // Mark closed first so a failed flush is not retried from Drop
        self.closed = true;
        if self.mode == OpenMode::ReadWrite {
            self.flush()?;
        }
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }
}

impl Drop for ZipPackage {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to flush package {}: {}", self.path.display(), e);
        }
    }
}
