//! Upstream metadata catalog
//!
//! Downloads the catalog archive, unpacks it into the working directory and
//! turns every metadata document into a [`ModuleRecord`], in a stable order.

pub mod archive;
pub mod types;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::errors::{MirrorError, Result};
use crate::http::HttpFetcher;

pub use types::{DownloadHash, LicenseTier, ModuleRecord};

/// A document that could not be turned into a module record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDocument {
    pub source_path: String,
    pub reason: String,
}

/// Parsed catalog, sorted by source path
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub modules: Vec<ModuleRecord>,
    pub rejected: Vec<RejectedDocument>,
}

/// Fetches and parses the upstream catalog
pub struct MetadataCatalog {
    config: MirrorConfig,
    http: HttpFetcher,
}

impl MetadataCatalog {
    pub fn new(config: MirrorConfig, http: HttpFetcher) -> Self {
        Self { config, http }
    }

    /// Download, extract and parse the upstream catalog
    ///
    /// A failed download is fatal: without a catalog there is nothing to mirror.
    pub async fn fetch(&self) -> Result<Catalog> {
        let url = &self.config.catalog_url;
        info!(url = %url, "Fetching upstream catalog");

        let bytes = self.http.get_bytes(url).await?;
        info!(size = bytes.len(), "Downloaded catalog archive");

        let work_dir = &self.config.work_dir;
        if work_dir.exists() {
            fs::remove_dir_all(work_dir).map_err(|e| MirrorError::filesystem(work_dir, e))?;
        }
        archive::extract(&bytes, work_dir, url)?;

        self.load_dir(work_dir)
    }

    /// Parse every metadata document below `root`
    pub fn load_dir(&self, root: &Path) -> Result<Catalog> {
        let mut paths = Vec::new();
        collect_documents(root, &self.config.metadata_extension, &mut paths)?;

        let mut documents: Vec<(String, PathBuf)> = paths
            .into_iter()
            .map(|path| (relative_path(root, &path), path))
            .collect();
        documents.sort();

        let mut catalog = Catalog::default();
        let mut seen = HashSet::new();

        for (source_path, path) in documents {
            let parsed = fs::read_to_string(&path)
                .map_err(|e| MirrorError::parse(&source_path, e.to_string()))
                .and_then(|text| ModuleRecord::parse(&source_path, &text));

            match parsed {
                Ok(record) => {
                    if !seen.insert(record.filename()) {
                        warn!(
                            path = %source_path,
                            identifier = %record.identifier,
                            version = %record.version,
                            "Duplicate module version, skipping"
                        );
                        catalog.rejected.push(RejectedDocument {
                            source_path,
                            reason: format!("duplicate of {}", record.filename()),
                        });
                        continue;
                    }
                    catalog.modules.push(record);
                }
                Err(e) if self.config.strict_parsing => return Err(e),
                Err(e) => {
                    warn!(path = %source_path, error = %e, "Skipping malformed metadata document");
                    catalog.rejected.push(RejectedDocument {
                        source_path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            modules = catalog.modules.len(),
            rejected = catalog.rejected.len(),
            "Catalog parsed"
        );
        Ok(catalog)
    }
}

/// Recursively collect files with the given extension
fn collect_documents(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| MirrorError::filesystem(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| MirrorError::filesystem(dir, e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| MirrorError::filesystem(&path, e))?;

        if file_type.is_dir() {
            collect_documents(&path, extension, out)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            out.push(path);
        } else {
            debug!(path = %path.display(), "Ignoring non-metadata file");
        }
    }

    Ok(())
}

/// Catalog-relative path with `/` separators
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
