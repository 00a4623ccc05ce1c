//! Freshness Token Storage
//!
//! Backing stores for the download cache. The on-disk store keeps the whole
//! mapping in one JSON document and rewrites it atomically on every change.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{MirrorError, Result};

/// Storage seam for filename -> freshness token mappings
pub trait FreshnessStore {
    fn get(&self, key: &str) -> Option<&str>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Store `token` under `key`, overwriting any previous value
    fn put(&mut self, key: &str, token: &str) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store, used for dry runs and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FreshnessStore for MemoryStore {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn put(&mut self, key: &str, token: &str) -> Result<()> {
        self.entries.insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// JSON document store: `{"<filename>": "<HTTP-date>", ...}`
#[derive(Debug)]
pub struct JsonFileStore {
    /// Location of the durable document
    path: PathBuf,
    /// Current mapping, mirrored to disk after every put
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open the store at `path`
    ///
    /// A missing document yields an empty mapping. A document that exists but
    /// is not a JSON object of strings is reported as cache corruption.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<BTreeMap<String, String>>(&text).map_err(|e| {
                MirrorError::CacheCorruption {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No download cache yet, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(MirrorError::CacheCorruption {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        info!(
            path = %path.display(),
            entries = entries.len(),
            "Download cache opened"
        );

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole document through a temp file and rename
    fn flush(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| MirrorError::filesystem(parent, e))?;

        let json = serde_json::to_vec_pretty(&self.entries).map_err(|e| {
            MirrorError::CacheCorruption {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| MirrorError::filesystem(parent, e))?;
        tmp.write_all(&json)
            .map_err(|e| MirrorError::filesystem(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| MirrorError::filesystem(&self.path, e.error))?;

        Ok(())
    }
}

impl FreshnessStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn put(&mut self, key: &str, token: &str) -> Result<()> {
        let previous = self.entries.insert(key.to_string(), token.to_string());
        if let Err(e) = self.flush() {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        debug!(key = key, token = token, "Recorded freshness token");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
