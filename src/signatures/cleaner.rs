//! Removal of every signature from a package.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::SignConfig;
use crate::error::{Error, Result};
use crate::package::{OpenMode, Package, PackageGuard};

use super::container::SignatureList;

lazy_static! {
    static ref ROUND_ENTRY: Regex = Regex::new(r"^Sign_\d+/").expect("valid regex");
}

/// Strips all signing rounds and the signature list from a package.
///
/// When the list lives in a directory named `Signs`, that whole directory is
/// emptied. Otherwise only the list, the directories of its entries and any
/// `Sign_{n}/` directories beside it are removed.
#[derive(Debug, Clone, Default)]
pub struct SignCleaner {
    config: SignConfig,
}

impl SignCleaner {
    /// Create a cleaner.
    pub fn new(config: SignConfig) -> Self {
        Self { config }
    }

    /// Remove all signatures and close the package.
    ///
    /// Returns the number of entries removed; zero for an unsigned package.
    pub fn clean<P: Package + ?Sized>(&self, package: &mut P) -> Result<usize> {
        let mut guard = PackageGuard::new(package);
        let result = self.run(&mut *guard);
        let closed = guard.close();
        match (result, closed) {
            (Ok(removed), Ok(())) => {
                log::info!("removed {} signature entries", removed);
                Ok(removed)
            },
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), close) => {
                if let Err(close_err) = close {
                    log::warn!("closing package after failed clean: {}", close_err);
                }
                Err(e)
            },
        }
    }

    fn run<P: Package + ?Sized>(&self, package: &mut P) -> Result<usize> {
        if package.mode() == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }

        let list_path = self.config.signatures_path.as_str();
        let signs_dir = self.config.signs_dir();
        let list = match SignatureList::load(package, list_path) {
            Ok(Some(list)) => list,
            Ok(None) => {
                log::debug!("no signature list at {}", list_path);
                return Ok(0);
            },
            Err(e) => {
                // An unreadable list is still removed along with the rounds.
                log::warn!("signature list at {} is unreadable: {}", list_path, e);
                SignatureList::new()
            },
        };

        let whole_dir = signs_dir
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .is_some_and(|name| name.eq_ignore_ascii_case("Signs"));
        let round_dirs: Vec<String> = list.records.iter().map(|r| r.round_dir()).collect();

        let doomed: Vec<String> = package
            .list(&signs_dir)?
            .into_iter()
            .filter(|path| {
                let Some(rest) = path.strip_prefix(signs_dir.as_str()) else {
                    return false;
                };
                whole_dir
                    || path == list_path
                    || ROUND_ENTRY.is_match(rest)
                    || round_dirs.iter().any(|d| path.starts_with(d.as_str()))
            })
            .collect();

        for path in &doomed {
            log::debug!("removing {}", path);
            package.remove(path)?;
        }
        if package.contains(list_path) {
            package.remove(list_path)?;
            return Ok(doomed.len() + 1);
        }
        Ok(doomed.len())
    }
}
