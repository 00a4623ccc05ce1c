//! Mirror configuration
//!
//! Loaded once per invocation and handed to each component's constructor.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{MirrorError, Result};

/// Upstream CKAN metadata archive
pub const DEFAULT_CATALOG_URL: &str = "https://github.com/KSP-CKAN/CKAN-meta/archive/master.zip";

/// Config file picked up from the current directory when nothing else is given
pub const DEFAULT_CONFIG_FILE: &str = "mirror.json";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CKAN_MIRROR_CONFIG";

/// Top-level configuration for a mirror run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// URL of the upstream metadata archive (zip or tar.gz).
    pub catalog_url: String,
    /// Directory the catalog archive is extracted into.
    pub work_dir: PathBuf,
    /// Directory the published snapshot is written to.
    pub output_dir: PathBuf,
    /// Directory mirrored artifacts are stored in. Defaults to `<output_dir>/files`.
    pub artifact_dir: Option<PathBuf>,
    /// Directory for artifacts whose license forbids mirroring. Kept outside
    /// `output_dir`. Defaults to `restricted/` next to `cache_path`.
    pub restricted_dir: Option<PathBuf>,
    /// Durable freshness cache document.
    pub cache_path: PathBuf,
    /// Public URL prefix prepended to artifact filenames when rewriting.
    pub local_url_prefix: String,
    /// Whether to write `index.html` and `status.json`.
    pub generate_index: bool,
    /// Header text of the status page.
    pub index_header: String,
    /// Filename of the published metadata archive.
    pub archive_name: String,
    /// Extension of metadata documents inside the catalog archive.
    pub metadata_extension: String,
    pub request_timeout_secs: u64,
    /// Extra attempts for artifact requests that fail with a retryable error.
    pub max_retries: u32,
    /// Abort the whole run on the first malformed metadata document.
    pub strict_parsing: bool,
    /// Keep the upstream URL in rewritten documents under `x_mirror_original_download`.
    pub preserve_original_url: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        let base = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("ckan-mirror");

        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            work_dir: base.join("work"),
            output_dir: PathBuf::from("public"),
            artifact_dir: None,
            restricted_dir: None,
            cache_path: base.join("last_modified.json"),
            local_url_prefix: "http://localhost/files/".to_string(),
            generate_index: true,
            index_header: "CKAN mirror status".to_string(),
            archive_name: "master.zip".to_string(),
            metadata_extension: "ckan".to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            strict_parsing: false,
            preserve_original_url: true,
        }
    }
}

impl MirrorConfig {
    /// Resolve and load configuration
    ///
    /// Lookup order: explicit path, `CKAN_MIRROR_CONFIG`, `./mirror.json`, built-in defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| MirrorError::filesystem(path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| MirrorError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded mirror configuration");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("CKAN_MIRROR_CATALOG_URL") {
            self.catalog_url = url;
        }
        if let Some(dir) = env::var_os("CKAN_MIRROR_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = env::var("CKAN_MIRROR_URL_PREFIX") {
            self.local_url_prefix = prefix;
        }
    }

    /// Reject values no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.local_url_prefix.trim().is_empty() {
            return Err(MirrorError::Config("local_url_prefix must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(MirrorError::Config("request_timeout_secs must be positive".into()));
        }
        if self.archive_name.is_empty() || self.archive_name.contains('/') {
            return Err(MirrorError::Config(format!(
                "archive_name must be a plain filename, got {:?}",
                self.archive_name
            )));
        }
        if self.restricted_dir().starts_with(&self.output_dir) {
            return Err(MirrorError::Config(format!(
                "restricted_dir {} must not be inside output_dir {}",
                self.restricted_dir().display(),
                self.output_dir.display()
            )));
        }
        Ok(())
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("files"))
    }

    pub fn restricted_dir(&self) -> PathBuf {
        self.restricted_dir.clone().unwrap_or_else(|| {
            self.cache_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("restricted")
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Public URL of a mirrored artifact
    pub fn local_url(&self, filename: &str) -> String {
        format!("{}{}", self.local_url_prefix, filename)
    }
}
