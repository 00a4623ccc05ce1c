//! Snapshot publishing
//!
//! Packages the rewritten metadata of every servable module into a zip and
//! renders the status index. Everything is built into temporary files first.
//! The previous snapshot is only replaced once all of them are complete, and
//! is put back if any replacement fails.

pub mod index;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::RejectedDocument;
use crate::config::MirrorConfig;
use crate::errors::{MirrorError, Result};
use crate::sync::{Severity, SynchronizedModule};

pub use index::{StatusCounts, StatusReport};

/// Status page filename
pub const INDEX_FILE: &str = "index.html";

/// Machine-readable status filename
pub const STATUS_FILE: &str = "status.json";

/// One generation of mirrored metadata
///
/// Keeps every module of the run in catalog order. Only the ones with a usable
/// artifact are published; the rest are reported on the status page.
#[derive(Debug, Clone)]
pub struct Snapshot {
    modules: Vec<SynchronizedModule>,
    rejected: Vec<RejectedDocument>,
    generated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(modules: Vec<SynchronizedModule>, rejected: Vec<RejectedDocument>) -> Self {
        Self {
            modules,
            rejected,
            generated_at: Utc::now(),
        }
    }

    /// All modules of the run, including failures
    pub fn modules(&self) -> &[SynchronizedModule] {
        &self.modules
    }

    /// Modules that go into the published archive
    pub fn published(&self) -> impl Iterator<Item = &SynchronizedModule> {
        self.modules.iter().filter(|m| m.is_included())
    }

    pub fn rejected(&self) -> &[RejectedDocument] {
        &self.rejected
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.modules.len(),
            rejected: self.rejected.len(),
            ..StatusCounts::default()
        };
        for module in &self.modules {
            match module.outcome.severity() {
                Severity::Ok => counts.ok += 1,
                Severity::Degraded => counts.degraded += 1,
                Severity::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Paths written by a publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedSnapshot {
    pub archive: PathBuf,
    pub index: Option<PathBuf>,
    pub status: Option<PathBuf>,
    pub published_modules: usize,
}

/// Writes snapshots to the output directory
pub struct SnapshotPublisher {
    config: MirrorConfig,
}

impl SnapshotPublisher {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    /// Build all snapshot files, then swap them into place
    pub fn publish(&self, snapshot: &Snapshot) -> Result<PublishedSnapshot> {
        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir).map_err(|e| MirrorError::filesystem(output_dir, e))?;

        let (archive_tmp, published_modules) = self.build_archive(snapshot)?;

        let index_files = if self.config.generate_index {
            let report = StatusReport::from_snapshot(snapshot, &self.config.index_header);
            let json = report.to_json().map_err(|e| {
                MirrorError::filesystem(output_dir.join(STATUS_FILE), std::io::Error::other(e))
            })?;
            Some((
                self.build_file(report.to_html().as_bytes())?,
                self.build_file(&json)?,
            ))
        } else {
            None
        };

        // Nothing below runs unless every file above was built
        let archive = output_dir.join(&self.config.archive_name);
        let mut files = vec![(archive_tmp, archive.clone())];
        let (index, status) = match index_files {
            Some((html_tmp, json_tmp)) => {
                let index = output_dir.join(INDEX_FILE);
                let status = output_dir.join(STATUS_FILE);
                files.push((html_tmp, index.clone()));
                files.push((json_tmp, status.clone()));
                (Some(index), Some(status))
            }
            None => (None, None),
        };
        swap_into_place(files)?;

        info!(
            archive = %archive.display(),
            modules = published_modules,
            "Snapshot published"
        );

        Ok(PublishedSnapshot {
            archive,
            index,
            status,
            published_modules,
        })
    }

    /// Zip every published module's document under its catalog path
    fn build_archive(&self, snapshot: &Snapshot) -> Result<(NamedTempFile, usize)> {
        let archive_path = self.config.output_dir.join(&self.config.archive_name);
        let mut tmp = self.temp_file()?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let zip_error =
            |e: zip::result::ZipError| MirrorError::filesystem(&archive_path, std::io::Error::other(e));

        let mut count = 0;
        {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            for module in snapshot.published() {
                let record = &module.record;
                let mut json = serde_json::to_vec_pretty(&record.document)
                    .map_err(|e| MirrorError::parse(&record.source_path, e.to_string()))?;
                json.push(b'\n');

                writer
                    .start_file(record.source_path.as_str(), options)
                    .map_err(zip_error)?;
                writer
                    .write_all(&json)
                    .map_err(|e| MirrorError::filesystem(&archive_path, e))?;
                count += 1;
            }
            writer.finish().map_err(zip_error)?;
        }

        debug!(modules = count, "Metadata archive built");
        Ok((tmp, count))
    }

    fn build_file(&self, contents: &[u8]) -> Result<NamedTempFile> {
        let mut tmp = self.temp_file()?;
        tmp.write_all(contents)
            .map_err(|e| MirrorError::filesystem(tmp.path(), e))?;
        Ok(tmp)
    }

    fn temp_file(&self) -> Result<NamedTempFile> {
        let dir = &self.config.output_dir;
        tempfile::Builder::new()
            .prefix(".snapshot-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| MirrorError::filesystem(dir, e))
    }
}

/// Replace every target with its built file, or none of them
///
/// Each existing target is hard-linked to a backup before being overwritten.
/// If any replacement fails, the targets already swapped are restored.
fn swap_into_place(files: Vec<(NamedTempFile, PathBuf)>) -> Result<()> {
    let mut swapped: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(files.len());

    for (tmp, target) in files {
        match replace(tmp, &target) {
            Ok(backup) => swapped.push((target, backup)),
            Err(e) => {
                rollback(swapped);
                return Err(e);
            }
        }
    }

    for (target, backup) in swapped {
        if let Some(backup) = backup {
            if let Err(e) = fs::remove_file(&backup) {
                warn!(path = %backup.display(), error = %e, "Failed to remove snapshot backup");
            }
        }
        debug!(path = %target.display(), "Replaced snapshot file");
    }
    Ok(())
}

fn replace(tmp: NamedTempFile, target: &Path) -> Result<Option<PathBuf>> {
    let backup = if target.exists() {
        let backup = backup_path(target);
        // A stale backup from an interrupted run would make hard_link fail
        let _ = fs::remove_file(&backup);
        fs::hard_link(target, &backup).map_err(|e| MirrorError::filesystem(&backup, e))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = tmp.persist(target) {
        if let Some(backup) = &backup {
            let _ = fs::remove_file(backup);
        }
        return Err(MirrorError::filesystem(target, e.error));
    }
    Ok(backup)
}

fn rollback(swapped: Vec<(PathBuf, Option<PathBuf>)>) {
    for (target, backup) in swapped.into_iter().rev() {
        let restored = match &backup {
            Some(backup) => fs::rename(backup, &target),
            None => fs::remove_file(&target),
        };
        match restored {
            Ok(()) => debug!(path = %target.display(), "Restored previous snapshot file"),
            Err(e) => warn!(path = %target.display(), error = %e, "Failed to restore snapshot file"),
        }
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".snapshot-prev-{}", name))
}
