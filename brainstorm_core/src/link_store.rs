use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the files this crate persists: the links file and the wordlist.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Canonical form of a discovered path: trimmed, no leading slash.
pub fn normalize_link(raw: &str) -> &str {
    raw.trim().trim_start_matches('/')
}

/// Append-only, deduplicated set of discovered links backed by a text file.
///
/// Seed links scraped before the first cycle are remembered so they are never
/// reported as new, but only links confirmed by the fuzzer reach the file.
#[derive(Debug)]
pub struct LinkStore {
    path: PathBuf,
    file: File,
    seeds: Vec<String>,
    links: Vec<String>,
    known: HashSet<String>,
}

impl LinkStore {
    /// Creates (or truncates) the links file at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        ensure_parent(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file,
            seeds: Vec::new(),
            links: Vec::new(),
            known: HashSet::new(),
        })
    }

    /// Opens the links file at `path`, keeping whatever a previous run found.
    ///
    /// Duplicate lines in an existing file are collapsed and the file is
    /// rewritten so later appends keep it duplicate-free.
    pub fn resume(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let existing = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(StoreError::Open { path, source }),
        };

        let mut store = Self::create(&path)?;
        for line in existing.lines() {
            store.insert(line)?;
        }
        Ok(store)
    }

    /// Registers links known up front. Returns how many were new.
    pub fn add_seeds<I, S>(&mut self, seeds: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for seed in seeds {
            let seed = normalize_link(seed.as_ref());
            if seed.is_empty() || self.known.contains(seed) {
                continue;
            }
            self.known.insert(seed.to_string());
            self.seeds.push(seed.to_string());
            added += 1;
        }
        added
    }

    /// Appends `link` to the store and its file unless it is already known.
    ///
    /// Returns `Ok(true)` when the link was new.
    pub fn insert(&mut self, link: &str) -> Result<bool, StoreError> {
        let link = normalize_link(link);
        if link.is_empty() || self.known.contains(link) {
            return Ok(false);
        }
        writeln!(self.file, "{link}")
            .and_then(|_| self.file.flush())
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.known.insert(link.to_string());
        self.links.push(link.to_string());
        Ok(true)
    }

    pub fn contains(&self, link: &str) -> bool {
        self.known.contains(normalize_link(link))
    }

    /// Links confirmed by the fuzzer, in discovery order.
    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    /// Seeds followed by discoveries, oldest first.
    pub fn known(&self) -> impl Iterator<Item = &String> {
        self.seeds.iter().chain(self.links.iter())
    }

    /// Number of confirmed links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::Open {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
