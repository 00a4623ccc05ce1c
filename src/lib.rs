//! CKAN Mirror
//!
//! Mirrors a CKAN metadata repository and the artifacts it references to a
//! local snapshot whose download links point at the mirror.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod http;
pub mod publish;
pub mod run;
pub mod sync;

pub use config::MirrorConfig;
pub use errors::MirrorError;
pub use run::{MirrorRun, RunReport};
