//! Module metadata types
//!
//! A CKAN document is kept as an opaque JSON object. Only the handful of fields
//! the mirror needs are lifted out into typed values.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{MirrorError, Result};

/// Licenses that allow the artifact to be redistributed from a mirror
#[rustfmt::skip]
const REDISTRIBUTABLE_LICENSES: &[&str] = &[
    "public-domain",
    "Apache", "Apache-1.0", "Apache-2.0",
    "Artistic", "Artistic-1.0", "Artistic-2.0",
    "BSD-2-clause", "BSD-3-clause", "BSD-4-clause",
    "ISC",
    "CC-BY", "CC-BY-1.0", "CC-BY-2.0", "CC-BY-2.5", "CC-BY-3.0", "CC-BY-4.0",
    "CC-BY-SA", "CC-BY-SA-1.0", "CC-BY-SA-2.0", "CC-BY-SA-2.5", "CC-BY-SA-3.0", "CC-BY-SA-4.0",
    "CC-BY-NC", "CC-BY-NC-1.0", "CC-BY-NC-2.0", "CC-BY-NC-2.5", "CC-BY-NC-3.0", "CC-BY-NC-4.0",
    "CC-BY-NC-SA", "CC-BY-NC-SA-1.0", "CC-BY-NC-SA-2.0", "CC-BY-NC-SA-2.5", "CC-BY-NC-SA-3.0", "CC-BY-NC-SA-4.0",
    "CC-BY-NC-ND", "CC-BY-NC-ND-1.0", "CC-BY-NC-ND-2.0", "CC-BY-NC-ND-2.5", "CC-BY-NC-ND-3.0", "CC-BY-NC-ND-4.0",
    "CC0",
    "CDDL", "CPL",
    "EFL-1.0", "EFL-2.0",
    "Expat", "MIT",
    "GPL-1.0", "GPL-2.0", "GPL-3.0",
    "LGPL-2.0", "LGPL-2.1", "LGPL-3.0",
    "GFDL-1.0", "GFDL-1.1", "GFDL-1.2", "GFDL-1.3",
    "GFDL-NIV-1.0", "GFDL-NIV-1.1", "GFDL-NIV-1.2", "GFDL-NIV-1.3",
    "LPPL-1.0", "LPPL-1.1", "LPPL-1.2", "LPPL-1.3c",
    "MPL-1.1",
    "Perl",
    "Python-2.0",
    "QPL-1.0",
    "W3C",
    "Zlib",
    "Zope",
    "open-source", "unrestricted",
];

/// Distribution rights of a module, gating URL rewriting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenseTier {
    /// Known redistributable license
    Open,
    /// Explicitly `restricted`
    Restricted,
    /// Explicitly `unknown`
    Unknown,
    /// Any other license string
    Other,
}

impl LicenseTier {
    /// Classify a single license string
    pub fn of(license: &str) -> Self {
        if license == "restricted" {
            LicenseTier::Restricted
        } else if license == "unknown" {
            LicenseTier::Unknown
        } else if REDISTRIBUTABLE_LICENSES.contains(&license) {
            LicenseTier::Open
        } else {
            LicenseTier::Other
        }
    }

    /// Classify a set of licenses; the most restrictive one wins
    pub fn classify<S: AsRef<str>>(licenses: &[S]) -> Self {
        let tiers: Vec<Self> = licenses.iter().map(|l| Self::of(l.as_ref())).collect();

        [
            LicenseTier::Restricted,
            LicenseTier::Unknown,
            LicenseTier::Open,
        ]
        .into_iter()
        .find(|tier| tiers.contains(tier))
        .unwrap_or(LicenseTier::Other)
    }

    /// Whether the mirror may serve the artifact in place of upstream
    pub fn allows_mirroring(self) -> bool {
        matches!(self, LicenseTier::Open | LicenseTier::Other)
    }
}

/// A field CKAN allows as either one string or a list of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Expected digests of the artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DownloadHash {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Fields the mirror reads from a document
#[derive(Debug, Deserialize)]
struct RequiredFields {
    identifier: String,
    version: String,
    download: OneOrMany,
    license: OneOrMany,
    #[serde(default)]
    download_hash: Option<DownloadHash>,
}

/// One versioned module from the upstream catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRecord {
    pub identifier: String,
    pub version: String,
    /// Primary upstream download URL
    pub download_url: String,
    /// Raw license strings
    pub licenses: Vec<String>,
    pub license_tier: LicenseTier,
    pub download_hash: Option<DownloadHash>,
    /// Complete original document
    pub document: Map<String, Value>,
    /// Path of the document relative to the catalog root, `/`-separated
    pub source_path: String,
}

impl ModuleRecord {
    /// Parse a metadata document
    ///
    /// # Arguments
    /// * `source_path` - Catalog-relative path, used in errors and as archive entry name
    /// * `text` - Raw JSON text
    pub fn parse(source_path: &str, text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| MirrorError::parse(source_path, e.to_string()))?;

        let Value::Object(document) = value else {
            return Err(MirrorError::parse(source_path, "document is not a JSON object"));
        };

        let fields: RequiredFields = serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| MirrorError::parse(source_path, e.to_string()))?;

        for (name, value) in [("identifier", &fields.identifier), ("version", &fields.version)] {
            if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
                return Err(MirrorError::parse(
                    source_path,
                    format!("{} {:?} cannot be used in a filename", name, value),
                ));
            }
        }

        let download_url = fields
            .download
            .into_vec()
            .into_iter()
            .next()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| MirrorError::parse(source_path, "download is empty"))?;

        let licenses = fields.license.into_vec();
        if licenses.is_empty() {
            return Err(MirrorError::parse(source_path, "license is empty"));
        }
        let license_tier = LicenseTier::classify(&licenses);

        Ok(Self {
            identifier: fields.identifier,
            version: fields.version,
            download_url,
            licenses,
            license_tier,
            download_hash: fields.download_hash,
            document,
            source_path: source_path.to_string(),
        })
    }

    /// Cache and storage key: `<identifier>-<version>.zip`
    pub fn filename(&self) -> String {
        format!("{}-{}.zip", self.identifier, self.version)
    }
}
