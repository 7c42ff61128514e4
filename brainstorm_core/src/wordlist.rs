use crate::link_store::{StoreError, ensure_parent};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const WORDLIST_FILE_NAME: &str = "wordlist.txt";

/// Writes each cycle's candidates to the file the fuzz command reads.
#[derive(Debug, Clone)]
pub struct WordlistWriter {
    path: PathBuf,
}

impl WordlistWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(WORDLIST_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the wordlist with `candidates`, one per line.
    ///
    /// The file is written next to the target and renamed over it, so the
    /// fuzzer never sees a half-written list.
    pub fn write(&self, candidates: &[String]) -> Result<(), StoreError> {
        ensure_parent(&self.path)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        for candidate in candidates {
            writeln!(tmp, "{candidate}").map_err(write_err)?;
        }
        tmp.flush().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
