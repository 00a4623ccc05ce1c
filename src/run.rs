//! Mirror Run - top-level driver
//!
//! Sequences catalog fetch, synchronization and publication once.
//! Any error returned from here means no new snapshot was published.

use std::fs;

use tracing::info;

use crate::cache::DownloadCache;
use crate::catalog::{Catalog, MetadataCatalog};
use crate::config::MirrorConfig;
use crate::errors::{MirrorError, Result};
use crate::http::HttpFetcher;
use crate::publish::{PublishedSnapshot, Snapshot, SnapshotPublisher, StatusCounts};
use crate::sync::MirrorSynchronizer;

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub counts: StatusCounts,
    pub published: PublishedSnapshot,
}

impl RunReport {
    /// Whether any module ended up degraded or missing
    pub fn has_failures(&self) -> bool {
        self.counts.degraded > 0 || self.counts.failed > 0
    }
}

/// One invocation of the mirror
pub struct MirrorRun {
    config: MirrorConfig,
}

impl MirrorRun {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    /// Run to completion against the configured upstream catalog
    pub async fn run(&self) -> Result<RunReport> {
        self.prepare_dirs()?;

        // Open the cache before any network traffic so corruption fails fast
        let cache = DownloadCache::open(&self.config.cache_path)?;
        let http = HttpFetcher::new(&self.config)?;

        let catalog = MetadataCatalog::new(self.config.clone(), http.clone())
            .fetch()
            .await?;

        self.run_catalog(catalog, cache, http).await
    }

    /// Synchronize and publish an already parsed catalog
    pub async fn run_catalog<S: crate::cache::FreshnessStore>(
        &self,
        catalog: Catalog,
        cache: DownloadCache<S>,
        http: HttpFetcher,
    ) -> Result<RunReport> {
        let Catalog { modules, rejected } = catalog;
        info!(modules = modules.len(), "Synchronizing artifacts");

        let mut synchronizer = MirrorSynchronizer::new(self.config.clone(), http, cache)?;
        let synchronized = synchronizer.synchronize(modules).await?;

        let snapshot = Snapshot::new(synchronized, rejected);
        let counts = snapshot.counts();
        let published = SnapshotPublisher::new(self.config.clone()).publish(&snapshot)?;

        info!(
            total = counts.total,
            ok = counts.ok,
            degraded = counts.degraded,
            failed = counts.failed,
            rejected = counts.rejected,
            "Mirror run complete"
        );

        Ok(RunReport { counts, published })
    }

    fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.config.output_dir, &self.config.artifact_dir()] {
            fs::create_dir_all(dir).map_err(|e| MirrorError::filesystem(dir, e))?;
        }
        if let Some(parent) = self.config.work_dir.parent() {
            fs::create_dir_all(parent).map_err(|e| MirrorError::filesystem(parent, e))?;
        }
        Ok(())
    }
}
