//! Mirror Synchronizer
//!
//! Walks the catalog in order and decides, per artifact, whether the mirrored
//! copy must be refreshed. Fetch failures never abort the run: a module falls
//! back to its previously mirrored artifact, or drops out of the snapshot if
//! there is none.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::outcome::{DownloadOutcome, SynchronizedModule};
use crate::cache::{DownloadCache, FreshnessStore, JsonFileStore};
use crate::catalog::{DownloadHash, ModuleRecord};
use crate::config::MirrorConfig;
use crate::errors::{MirrorError, Result};
use crate::http::{ArtifactResponse, Fetched, HttpFetcher};

/// Document key holding the upstream URL of a rewritten module
pub const ORIGINAL_DOWNLOAD_KEY: &str = "x_mirror_original_download";

/// Result of one artifact retrieval attempt
struct Retrieval {
    outcome: DownloadOutcome,
    last_updated: Option<String>,
    error: Option<String>,
}

/// Executes the fetch-or-skip decision for every module
pub struct MirrorSynchronizer<S = JsonFileStore> {
    config: MirrorConfig,
    http: HttpFetcher,
    /// Sole owner of the cache, so writes are serialized
    cache: DownloadCache<S>,
    artifact_dir: PathBuf,
    restricted_dir: PathBuf,
}

impl<S: FreshnessStore> MirrorSynchronizer<S> {
    /// Create a synchronizer, making sure the storage directories exist
    pub fn new(config: MirrorConfig, http: HttpFetcher, cache: DownloadCache<S>) -> Result<Self> {
        let artifact_dir = config.artifact_dir();
        let restricted_dir = config.restricted_dir();
        for dir in [&artifact_dir, &restricted_dir] {
            fs::create_dir_all(dir).map_err(|e| MirrorError::filesystem(dir, e))?;
        }

        Ok(Self {
            config,
            http,
            cache,
            artifact_dir,
            restricted_dir,
        })
    }

    /// Synchronize every module, in catalog order
    ///
    /// Returns all modules, including the ones that failed without a cached copy,
    /// so the status page can report them. Only filesystem and cache write
    /// failures are returned as errors.
    pub async fn synchronize(&mut self, modules: Vec<ModuleRecord>) -> Result<Vec<SynchronizedModule>> {
        let total = modules.len();
        let mut results = Vec::with_capacity(total);

        for (index, record) in modules.into_iter().enumerate() {
            debug!(
                progress = format!("{}/{}", index + 1, total),
                identifier = %record.identifier,
                "Synchronizing module"
            );
            results.push(self.synchronize_module(record).await?);
        }

        Ok(results)
    }

    /// Synchronize a single module
    pub async fn synchronize_module(&mut self, record: ModuleRecord) -> Result<SynchronizedModule> {
        let filename = record.filename();
        let retrieval = self.retrieve(&record, &filename).await?;

        match retrieval.outcome {
            DownloadOutcome::Success | DownloadOutcome::CachedUpToDate => info!(
                identifier = %record.identifier,
                version = %record.version,
                outcome = %retrieval.outcome,
                "Module synchronized"
            ),
            DownloadOutcome::CachedAfterError | DownloadOutcome::FailedUncached => warn!(
                identifier = %record.identifier,
                version = %record.version,
                outcome = %retrieval.outcome,
                error = retrieval.error.as_deref().unwrap_or(""),
                "Module download failed"
            ),
        }

        let record = if retrieval.outcome.is_usable() {
            self.rewrite(record, &filename)
        } else {
            record
        };

        Ok(SynchronizedModule {
            record,
            outcome: retrieval.outcome,
            last_updated: retrieval.last_updated,
            error: retrieval.error,
        })
    }

    /// Fetch the artifact if it changed upstream
    ///
    /// A cached copy only counts when its file is still on disk. The token
    /// alone never vouches for an artifact.
    async fn retrieve(&mut self, record: &ModuleRecord, filename: &str) -> Result<Retrieval> {
        let dir = self.storage_dir(record).to_path_buf();
        let present = dir.join(filename).is_file();
        if !present && self.cache.is_cached(filename) {
            warn!(
                file = filename,
                dir = %dir.display(),
                "Cached artifact missing on disk, downloading again"
            );
        }

        let cached_token = present
            .then(|| self.cache.last_modified(filename).map(str::to_owned))
            .flatten();
        let url = record.download_url.as_str();

        let response = match self.http.fetch(url, cached_token.as_deref()).await {
            Ok(Fetched::Ready(response)) => response,
            Ok(Fetched::NotModified) if present => {
                debug!(file = filename, "Upstream answered 304 Not Modified");
                return Ok(self.up_to_date(filename));
            }
            Ok(Fetched::NotModified) => {
                return Ok(self.degraded(filename, false, not_modified(url)));
            }
            Err(e) if e.is_download_failure() => return Ok(self.degraded(filename, present, e)),
            Err(e) => return Err(e),
        };

        let token = response.last_modified();
        if present {
            match &token {
                Some(token) if !self.cache.is_newer(filename, token) => {
                    debug!(file = filename, token = %token, "Mirrored copy is current");
                    return Ok(self.up_to_date(filename));
                }
                Some(_) => {}
                // Freshness cannot be proven, keep what we have
                None => {
                    debug!(file = filename, "No Last-Modified header, keeping mirrored copy");
                    return Ok(self.up_to_date(filename));
                }
            }
        }

        let bytes = match download(response, record.download_hash.as_ref(), url).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_download_failure() => return Ok(self.degraded(filename, present, e)),
            Err(e) => return Err(e),
        };

        store(&dir, filename, &bytes)?;
        if let Some(token) = &token {
            self.cache.record(filename, token)?;
        }

        info!(file = filename, size = bytes.len(), "Downloaded artifact");
        Ok(Retrieval {
            outcome: DownloadOutcome::Success,
            last_updated: token,
            error: None,
        })
    }

    fn up_to_date(&self, filename: &str) -> Retrieval {
        Retrieval {
            outcome: DownloadOutcome::CachedUpToDate,
            last_updated: self.cache.last_modified(filename).map(str::to_owned),
            error: None,
        }
    }

    fn degraded(&self, filename: &str, present: bool, error: MirrorError) -> Retrieval {
        let outcome = if present {
            DownloadOutcome::CachedAfterError
        } else {
            DownloadOutcome::FailedUncached
        };

        Retrieval {
            outcome,
            last_updated: present
                .then(|| self.cache.last_modified(filename).map(str::to_owned))
                .flatten(),
            error: Some(error.to_string()),
        }
    }

    /// Where the artifact of `record` lives
    ///
    /// Artifacts the mirror may not redistribute stay out of the published tree.
    fn storage_dir(&self, record: &ModuleRecord) -> &Path {
        if record.license_tier.allows_mirroring() {
            &self.artifact_dir
        } else {
            &self.restricted_dir
        }
    }

    /// Point the record at the mirror when its license allows redistribution
    fn rewrite(&self, mut record: ModuleRecord, filename: &str) -> ModuleRecord {
        if !record.license_tier.allows_mirroring() {
            debug!(
                identifier = %record.identifier,
                tier = ?record.license_tier,
                "License forbids mirroring, keeping upstream URL"
            );
            return record;
        }

        let local = self.config.local_url(filename);
        let download = match record.document.get("download") {
            Some(Value::Array(_)) => Value::Array(vec![Value::String(local.clone())]),
            _ => Value::String(local.clone()),
        };

        if self.config.preserve_original_url {
            record.document.insert(
                ORIGINAL_DOWNLOAD_KEY.to_string(),
                Value::String(record.download_url.clone()),
            );
        }
        record.document.insert("download".to_string(), download);
        record.download_url = local;
        record
    }

    pub fn cache(&self) -> &DownloadCache<S> {
        &self.cache
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn restricted_dir(&self) -> &Path {
        &self.restricted_dir
    }
}

/// Write artifact bytes atomically into `dir`
fn store(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    let target = dir.join(filename);

    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| MirrorError::filesystem(dir, e))?;
    tmp.write_all(data)
        .map_err(|e| MirrorError::filesystem(tmp.path(), e))?;
    tmp.persist(&target)
        .map_err(|e| MirrorError::filesystem(&target, e.error))?;

    debug!(file = filename, local = %target.display(), "Stored artifact");
    Ok(target)
}

/// A 304 answered to a request that carried no `If-Modified-Since`
fn not_modified(url: &str) -> MirrorError {
    MirrorError::Http {
        url: url.to_string(),
        status: 304,
    }
}

/// Read the body and check it against the expected digests
async fn download(response: ArtifactResponse, hash: Option<&DownloadHash>, url: &str) -> Result<Vec<u8>> {
    let bytes = response.bytes().await?;
    if let Some(hash) = hash {
        verify_hash(&bytes, hash, url)?;
    }
    Ok(bytes)
}

/// Compare downloaded bytes with the document's `download_hash`
pub fn verify_hash(bytes: &[u8], expected: &DownloadHash, url: &str) -> Result<()> {
    use sha1::Sha1;
    use sha2::{Digest, Sha256};

    if let Some(sha1) = &expected.sha1 {
        let actual = format!("{:x}", Sha1::digest(bytes));
        if !actual.eq_ignore_ascii_case(sha1) {
            return Err(MirrorError::Integrity {
                url: url.to_string(),
                reason: format!("sha1 mismatch: expected {}, got {}", sha1, actual),
            });
        }
    }

    if let Some(sha256) = &expected.sha256 {
        let actual = format!("{:x}", Sha256::digest(bytes));
        if !actual.eq_ignore_ascii_case(sha256) {
            return Err(MirrorError::Integrity {
                url: url.to_string(),
                reason: format!("sha256 mismatch: expected {}, got {}", sha256, actual),
            });
        }
    }

    Ok(())
}
