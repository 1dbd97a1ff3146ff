// src/generator/archive.rs

//! Tarball generators (TGZ, TXZ, TZST)
//!
//! Each unit becomes one compressed tarball holding the staged files of its
//! components. Entries are nested under the unit's package name unless
//! `INCLUDE_TOPLEVEL_DIRECTORY` is off. When `SOURCE_DATE_EPOCH` is set
//! (as an option or in the environment) every entry gets that mtime, so
//! rebuilding the same tree yields identical archives.

use super::{EmitContext, PackagingBackend, remove_stale};
use crate::config::OptionSource;
use crate::error::Result;
use crate::planner::PackagingUnit;
use crate::staging::StagedEntry;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, Metadata};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use xz2::write::XzEncoder;

/// Compression applied to the tarball
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveCompression {
    Gzip,
    Xz,
    Zstd,
}

impl ArchiveCompression {
    pub const fn generator_name(&self) -> &'static str {
        match self {
            Self::Gzip => "TGZ",
            Self::Xz => "TXZ",
            Self::Zstd => "TZST",
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => ".tar.gz",
            Self::Xz => ".tar.xz",
            Self::Zstd => ".tar.zst",
        }
    }
}

/// Backend writing one tarball per unit
#[derive(Debug, Clone)]
pub struct ArchiveBackend {
    compression: ArchiveCompression,
}

impl ArchiveBackend {
    pub fn new(compression: ArchiveCompression) -> Self {
        Self { compression }
    }

    /// Write `entries` into a compressed tarball at `output`
    pub fn write_archive(
        &self,
        output: &Path,
        entries: &[StagedEntry],
        prefix: Option<&str>,
        mtime: Option<u64>,
    ) -> Result<()> {
        let file = File::create(output)?;
        match self.compression {
            ArchiveCompression::Gzip => {
                let encoder = GzEncoder::new(file, Compression::default());
                append_entries(encoder, entries, prefix, mtime)?.finish()?;
            }
            ArchiveCompression::Xz => {
                let encoder = XzEncoder::new(file, 6);
                append_entries(encoder, entries, prefix, mtime)?.finish()?;
            }
            ArchiveCompression::Zstd => {
                let encoder = zstd::Encoder::new(file, 0)?;
                append_entries(encoder, entries, prefix, mtime)?.finish()?;
            }
        }
        Ok(())
    }
}

impl PackagingBackend for ArchiveBackend {
    fn name(&self) -> &str {
        self.compression.generator_name()
    }

    fn output_extension(&self) -> &str {
        self.compression.extension()
    }

    fn supports_components(&self) -> bool {
        true
    }

    fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        let output = ctx.output_path(unit);
        remove_stale(&output)?;

        let entries = ctx.tree.unit_entries(ctx.registry, &unit.components)?;
        let prefix = if ctx.options.is_off("INCLUDE_TOPLEVEL_DIRECTORY") {
            None
        } else {
            Some(unit.package_name.as_str())
        };
        ctx.log.verbose(&format!(
            "Writing {} entries to {}",
            entries.len(),
            output.display()
        ));

        self.write_archive(&output, &entries, prefix, source_date_epoch(ctx.options))?;
        Ok(vec![output])
    }
}

/// Fixed mtime for archive entries, if requested
fn source_date_epoch(options: &dyn OptionSource) -> Option<u64> {
    options
        .non_empty_option("SOURCE_DATE_EPOCH")
        .map(str::to_string)
        .or_else(|| std::env::var("SOURCE_DATE_EPOCH").ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn append_entries<W: Write>(
    writer: W,
    entries: &[StagedEntry],
    prefix: Option<&str>,
    mtime: Option<u64>,
) -> Result<W> {
    let mut archive = tar::Builder::new(writer);
    archive.follow_symlinks(false);

    if let Some(prefix) = prefix {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_mtime(mtime.unwrap_or(0));
        header.set_cksum();
        archive.append_data(&mut header, prefix, std::io::empty())?;
    }

    for entry in entries {
        let archive_path = match prefix {
            Some(prefix) => format!("{}/{}", prefix, entry.relative),
            None => entry.relative.clone(),
        };
        let metadata = fs::symlink_metadata(&entry.source)?;
        let entry_mtime = mtime.unwrap_or_else(|| modified_secs(&metadata));

        let mut header = tar::Header::new_gnu();
        header.set_mtime(entry_mtime);

        if entry.is_dir {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(file_mode(&metadata, 0o755));
            header.set_size(0);
            header.set_cksum();
            archive.append_data(&mut header, &archive_path, std::io::empty())?;
        } else if metadata.file_type().is_symlink() {
            let target = fs::read_link(&entry.source)?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            archive.append_link(&mut header, &archive_path, &target)?;
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(file_mode(&metadata, 0o644));
            header.set_size(metadata.len());
            header.set_cksum();
            let file = File::open(&entry.source)?;
            archive.append_data(&mut header, &archive_path, file)?;
        }
    }

    Ok(archive.into_inner()?)
}

fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata, default: u32) -> u32 {
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentRegistry;
    use crate::staging::InstallTree;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn entry_names(path: &Path) -> Vec<(String, u64)> {
        let file = File::open(path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.path().unwrap().to_string_lossy().into_owned(),
                    e.header().mtime().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_backend_capabilities() {
        let backend = ArchiveBackend::new(ArchiveCompression::Xz);
        assert_eq!(backend.name(), "TXZ");
        assert_eq!(backend.output_extension(), ".tar.xz");
        assert!(backend.supports_components());
        assert_eq!(
            backend.default_package_method(),
            crate::grouping::ComponentPackageMethod::OnePackagePerGroup
        );
    }

    #[test]
    fn test_write_archive_with_prefix_and_fixed_mtime() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("stage");
        fs::create_dir_all(staging.join("bin")).unwrap();
        fs::write(staging.join("bin/tool"), b"#!/bin/sh\n").unwrap();

        let tree = InstallTree::new(&staging);
        let entries = tree.unit_entries(&ComponentRegistry::new(), &[]).unwrap();

        let output = temp.path().join("demo.tar.gz");
        ArchiveBackend::new(ArchiveCompression::Gzip)
            .write_archive(&output, &entries, Some("demo"), Some(1_704_067_200))
            .unwrap();

        let names = entry_names(&output);
        assert_eq!(
            names,
            vec![
                ("demo".to_string(), 1_704_067_200),
                ("demo/bin".to_string(), 1_704_067_200),
                ("demo/bin/tool".to_string(), 1_704_067_200),
            ]
        );
    }

    #[test]
    fn test_source_date_epoch_option() {
        let opts: crate::config::OptionMap =
            [("SOURCE_DATE_EPOCH", "1700000000")].into_iter().collect();
        assert_eq!(source_date_epoch(&opts), Some(1_700_000_000));
    }
}
