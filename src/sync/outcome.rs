//! Per-module synchronization results

use serde::Serialize;

use crate::catalog::ModuleRecord;

/// What happened to a module's artifact during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DownloadOutcome {
    /// Fresh copy downloaded and stored
    Success,
    /// Upstream unchanged, mirrored copy kept
    CachedUpToDate,
    /// Fetch failed, previously mirrored copy still served
    CachedAfterError,
    /// Fetch failed and nothing was mirrored before
    FailedUncached,
}

/// Severity of an outcome on the status page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Degraded,
    Failed,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Degraded => "degraded",
            Severity::Failed => "failed",
        }
    }
}

impl DownloadOutcome {
    pub fn severity(self) -> Severity {
        match self {
            DownloadOutcome::Success | DownloadOutcome::CachedUpToDate => Severity::Ok,
            DownloadOutcome::CachedAfterError => Severity::Degraded,
            DownloadOutcome::FailedUncached => Severity::Failed,
        }
    }

    /// Whether a usable artifact exists after this run
    pub fn is_usable(self) -> bool {
        self != DownloadOutcome::FailedUncached
    }

    pub fn label(self) -> &'static str {
        match self {
            DownloadOutcome::Success => "Success",
            DownloadOutcome::CachedUpToDate => "CachedUpToDate",
            DownloadOutcome::CachedAfterError => "CachedAfterError",
            DownloadOutcome::FailedUncached => "FailedUncached",
        }
    }
}

impl std::fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A module after synchronization
#[derive(Debug, Clone)]
pub struct SynchronizedModule {
    /// Record with `download_url` and `document` rewritten where allowed
    pub record: ModuleRecord,
    pub outcome: DownloadOutcome,
    /// Freshness token after this run
    pub last_updated: Option<String>,
    /// Why the fetch failed, for degraded and failed outcomes
    pub error: Option<String>,
}

impl SynchronizedModule {
    pub fn is_included(&self) -> bool {
        self.outcome.is_usable()
    }
}
