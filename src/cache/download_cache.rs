//! Download Cache
//!
//! Remembers the `Last-Modified` token of every mirrored artifact so a run can
//! tell whether the upstream copy changed since it was last downloaded.
//! Tokens only ever move forward in time.

use chrono::{DateTime, FixedOffset};
use tracing::{debug, trace};

use super::store::{FreshnessStore, JsonFileStore};
use crate::errors::Result;

/// Parse an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn parse_http_date(token: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(token.trim()).ok()
}

/// Freshness cache keyed by artifact filename
pub struct DownloadCache<S = JsonFileStore> {
    store: S,
}

impl DownloadCache<JsonFileStore> {
    /// Open the durable cache document, creating an empty cache if it is absent
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self::new(JsonFileStore::open(path)?))
    }
}

impl<S: FreshnessStore> DownloadCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    pub fn last_modified(&self, key: &str) -> Option<&str> {
        self.store.get(key)
    }

    /// True if `key` is absent or `incoming` is strictly later than the stored token
    ///
    /// An unparsable incoming token never replaces an existing entry, while an
    /// unparsable stored token loses against any parsable incoming one.
    pub fn is_newer(&self, key: &str, incoming: &str) -> bool {
        let Some(stored) = self.store.get(key) else {
            return true;
        };

        match (parse_http_date(incoming), parse_http_date(stored)) {
            (Some(incoming), Some(stored)) => incoming > stored,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Record `token` for `key` if it is newer than what is stored
    ///
    /// # Returns
    /// `true` if the cache was written, `false` for a no-op
    pub fn record(&mut self, key: &str, token: &str) -> Result<bool> {
        if !self.is_newer(key, token) {
            trace!(key = key, token = token, "Token not newer, cache unchanged");
            return Ok(false);
        }

        self.store.put(key, token)?;
        debug!(key = key, token = token, "Download cache updated");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
