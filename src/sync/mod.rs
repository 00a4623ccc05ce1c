//! Artifact synchronization
//!
//! Turns catalog records into synchronized modules, consulting and updating
//! the download cache along the way.

pub mod outcome;
pub mod synchronizer;

pub use outcome::{DownloadOutcome, Severity, SynchronizedModule};
pub use synchronizer::{verify_hash, MirrorSynchronizer, ORIGINAL_DOWNLOAD_KEY};
