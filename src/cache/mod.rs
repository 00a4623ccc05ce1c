//! Download cache
//!
//! Durable record of how fresh each mirrored artifact is. The artifact files
//! themselves prove presence; the cache only holds their `Last-Modified` tokens.

pub mod download_cache;
pub mod store;

pub use download_cache::{parse_http_date, DownloadCache};
pub use store::{FreshnessStore, JsonFileStore, MemoryStore};
