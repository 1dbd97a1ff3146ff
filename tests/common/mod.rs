// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use compack::{ComponentRegistry, OptionMap};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build an option map from key/value pairs
pub fn options(pairs: &[(&str, &str)]) -> OptionMap {
    pairs.iter().copied().collect()
}

/// Build a populated registry from key/value pairs
pub fn registry(pairs: &[(&str, &str)]) -> ComponentRegistry {
    let opts = options(pairs);
    let mut registry = ComponentRegistry::new();
    registry.populate(&opts, "demo");
    registry
}

/// A scratch project directory with a `_install` staging tree
///
/// Returns (TempDir, options) - keep the TempDir alive to prevent cleanup.
pub fn project(extra: &[(&str, &str)]) -> (TempDir, OptionMap) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut opts = options(&[("PACKAGE_NAME", "demo"), ("PACKAGE_VERSION", "1.0")]);
    opts.set_option("PACKAGE_DIRECTORY", temp_dir.path().display().to_string());
    opts.set_option(
        "STAGING_DIRECTORY",
        temp_dir.path().join("_install").display().to_string(),
    );
    for (key, value) in extra {
        opts.set_option(*key, *value);
    }
    (temp_dir, opts)
}

/// Stage files for a component below `<project>/_install/<component>/`
pub fn stage(project: &Path, component: &str, files: &[(&str, &str)]) {
    let root = project.join("_install").join(component);
    for (path, content) in files {
        let target = root.join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }
}

/// Write an executable shell script standing in for a packaging tool
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

/// Names of the entries in a gzip-compressed tarball
pub fn tarball_entries(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
}
