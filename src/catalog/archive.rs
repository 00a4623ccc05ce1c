//! Catalog archive extraction
//!
//! The upstream catalog ships as either a zip or a gzip-compressed tarball.
//! Entries escaping the destination directory are skipped.

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{MirrorError, Result};

/// Archive formats the catalog can be delivered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from the leading magic bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            Some(ArchiveFormat::Zip)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }
}

/// Extract `bytes` into `dest`
///
/// # Returns
/// Number of files written
pub fn extract(bytes: &[u8], dest: &Path, origin: &str) -> Result<usize> {
    fs::create_dir_all(dest).map_err(|e| MirrorError::filesystem(dest, e))?;

    match ArchiveFormat::detect(bytes) {
        Some(ArchiveFormat::Zip) => extract_zip(bytes, dest, origin),
        Some(ArchiveFormat::TarGz) => extract_tar_gz(bytes, dest, origin),
        None => Err(MirrorError::parse(
            origin,
            "catalog is neither a zip nor a tar.gz archive",
        )),
    }
}

fn extract_zip(bytes: &[u8], dest: &Path, origin: &str) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MirrorError::parse(origin, format!("invalid zip: {}", e)))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| MirrorError::parse(origin, format!("invalid zip entry: {}", e)))?;

        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping archive entry outside extraction root");
            continue;
        };

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| MirrorError::filesystem(parent, e))?;
        }

        let mut out = fs::File::create(&target).map_err(|e| MirrorError::filesystem(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            MirrorError::parse(origin, format!("failed to inflate {}: {}", target.display(), e))
        })?;
        written += 1;
    }

    debug!(files = written, dest = %dest.display(), "Extracted zip catalog");
    Ok(written)
}

fn extract_tar_gz(bytes: &[u8], dest: &Path, origin: &str) -> Result<usize> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_permissions(false);
    #[cfg(unix)]
    archive.set_unpack_xattrs(false);

    let entries = archive
        .entries()
        .map_err(|e| MirrorError::parse(origin, format!("invalid tar.gz: {}", e)))?;

    let mut written = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| MirrorError::parse(origin, format!("invalid tar entry: {}", e)))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        // unpack_in refuses paths that would land outside `dest`
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| MirrorError::parse(origin, format!("failed to unpack entry: {}", e)))?;
        if unpacked {
            written += 1;
        } else {
            warn!("Skipping archive entry outside extraction root");
        }
    }

    debug!(files = written, dest = %dest.display(), "Extracted tar.gz catalog");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn tar_gz_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_detect() {
        assert_eq!(ArchiveFormat::detect(&zip_bytes(&[])), Some(ArchiveFormat::Zip));
        assert_eq!(
            ArchiveFormat::detect(&tar_gz_bytes(&[])),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::detect(b"<html>"), None);
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_bytes(&[("meta-master/Foo/Foo-1.0.ckan", "{}"), ("meta-master/README.md", "hi")]);

        assert_eq!(extract(&bytes, dir.path(), "test").unwrap(), 2);
        assert!(dir.path().join("meta-master/Foo/Foo-1.0.ckan").exists());
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = tar_gz_bytes(&[("meta/Foo/Foo-1.0.ckan", "{}")]);

        assert_eq!(extract(&bytes, dir.path(), "test").unwrap(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("meta/Foo/Foo-1.0.ckan")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract(b"not an archive", dir.path(), "test"),
            Err(MirrorError::Parse { .. })
        ));
    }
}
