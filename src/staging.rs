// src/staging.rs

//! Install tree scanning
//!
//! The build system installs files into a staging directory before
//! packaging starts. When components are in use each component gets its own
//! subdirectory (`<staging>/<component>/...`); otherwise the staging
//! directory holds a single flat tree. This module walks those trees and
//! attributes the installed files and directories to components.

use crate::components::{ComponentId, ComponentRegistry};
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Files and directories found below one staging root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedContents {
    /// Regular files and symlinks, relative and `/`-separated, sorted
    pub files: Vec<String>,
    /// Directories, relative and `/`-separated, sorted
    pub directories: Vec<String>,
}

impl StagedContents {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// One staged path ready to be copied into a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    /// Absolute location in the staging tree
    pub source: PathBuf,
    /// Location inside the package, `/`-separated
    pub relative: String,
    pub is_dir: bool,
}

/// Staging directory the build system installed into
#[derive(Debug, Clone)]
pub struct InstallTree {
    root: PathBuf,
}

impl InstallTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging subdirectory of a component
    pub fn component_root(&self, component: &str) -> PathBuf {
        self.root.join(component)
    }

    /// Record each component's staged files and directories in the registry
    ///
    /// Components without a staging subdirectory end up with empty lists.
    pub fn attribute(&self, registry: &mut ComponentRegistry) -> Result<()> {
        let ids: Vec<ComponentId> = registry.component_ids().collect();
        for id in ids {
            let dir = self.component_root(&registry.component(id).name);
            let contents = scan_directory(&dir)?;
            debug!(
                "Component {}: {} files, {} directories",
                registry.component(id).name,
                contents.files.len(),
                contents.directories.len()
            );
            let component = registry.component_mut(id);
            component.files = contents.files;
            component.directories = contents.directories;
        }
        Ok(())
    }

    /// Is anything staged at all?
    ///
    /// With components only their staging subdirectories count, so
    /// `attribute` must have run first.
    pub fn has_files(&self, registry: &ComponentRegistry) -> Result<bool> {
        if registry.has_components() {
            return Ok(registry
                .component_ids()
                .any(|id| !registry.component(id).files.is_empty()));
        }
        Ok(!scan_directory(&self.root)?.files.is_empty())
    }

    /// Everything a unit should contain
    ///
    /// With components, the staging subdirectories of those components are
    /// merged (the first component providing a path wins). Without
    /// components, the whole staging root is used.
    pub fn unit_entries(
        &self,
        registry: &ComponentRegistry,
        components: &[ComponentId],
    ) -> Result<Vec<StagedEntry>> {
        let roots: Vec<PathBuf> = if components.is_empty() {
            if registry.has_components() {
                // Monolithic package over a per-component staging layout
                registry
                    .component_ids()
                    .map(|id| self.component_root(&registry.component(id).name))
                    .collect()
            } else {
                vec![self.root.clone()]
            }
        } else {
            components
                .iter()
                .map(|&id| self.component_root(&registry.component(id).name))
                .collect()
        };

        let mut merged: BTreeMap<String, StagedEntry> = BTreeMap::new();
        for root in &roots {
            let contents = scan_directory(root)?;
            for dir in contents.directories {
                merged.entry(dir.clone()).or_insert_with(|| StagedEntry {
                    source: root.join(&dir),
                    relative: dir,
                    is_dir: true,
                });
            }
            for file in contents.files {
                merged.entry(file.clone()).or_insert_with(|| StagedEntry {
                    source: root.join(&file),
                    relative: file,
                    is_dir: false,
                });
            }
        }
        Ok(merged.into_values().collect())
    }
}

/// Walk a directory, returning its contents relative to it
///
/// A missing directory has no contents.
pub fn scan_directory(dir: &Path) -> Result<StagedContents> {
    let mut contents = StagedContents::default();
    if !dir.is_dir() {
        return Ok(contents);
    }

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if path == dir {
            continue;
        }
        let Some(relative) = relative_path(dir, path) else {
            continue;
        };
        if entry.file_type().is_dir() {
            contents.directories.push(relative);
        } else {
            contents.files.push(relative);
        }
    }

    contents.files.sort();
    contents.directories.sort();
    Ok(contents)
}

fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = stripped
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionMap;
    use std::fs;
    use tempfile::TempDir;

    fn stage(root: &Path, files: &[&str]) {
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let contents = scan_directory(&temp.path().join("nope")).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn test_scan_directory() {
        let temp = TempDir::new().unwrap();
        stage(temp.path(), &["bin/app", "share/doc/README", "etc/app.conf"]);
        fs::create_dir_all(temp.path().join("var/empty")).unwrap();

        let contents = scan_directory(temp.path()).unwrap();
        assert_eq!(contents.files, vec!["bin/app", "etc/app.conf", "share/doc/README"]);
        assert_eq!(
            contents.directories,
            vec!["bin", "etc", "share", "share/doc", "var", "var/empty"]
        );
    }

    #[test]
    fn test_attribute_and_unit_entries() {
        let temp = TempDir::new().unwrap();
        stage(&temp.path().join("lib"), &["lib/libdemo.so"]);
        stage(&temp.path().join("app"), &["bin/demo", "lib/libdemo.so"]);

        let opts: OptionMap = [("COMPONENTS_ALL", "app;lib;docs")].into_iter().collect();
        let mut registry = ComponentRegistry::new();
        registry.populate(&opts, "demo");

        let tree = InstallTree::new(temp.path());
        tree.attribute(&mut registry).unwrap();

        let app = registry.component_id("app").unwrap();
        let lib = registry.component_id("lib").unwrap();
        let docs = registry.component_id("docs").unwrap();
        assert_eq!(registry.component(app).files, vec!["bin/demo", "lib/libdemo.so"]);
        assert_eq!(registry.component(lib).files, vec!["lib/libdemo.so"]);
        assert!(registry.component(docs).files.is_empty());

        let entries = tree.unit_entries(&registry, &[lib, app]).unwrap();
        let paths: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.relative.as_str(), e.is_dir))
            .collect();
        assert_eq!(
            paths,
            vec![("bin", true), ("bin/demo", false), ("lib", true), ("lib/libdemo.so", false)]
        );
        // lib was listed first, so its copy of the shared file is used
        let shared = entries.iter().find(|e| e.relative == "lib/libdemo.so").unwrap();
        assert!(shared.source.starts_with(temp.path().join("lib")));
    }

    #[test]
    fn test_monolithic_without_components_uses_root() {
        let temp = TempDir::new().unwrap();
        stage(temp.path(), &["bin/tool"]);
        let registry = ComponentRegistry::new();
        let tree = InstallTree::new(temp.path());
        let entries = tree.unit_entries(&registry, &[]).unwrap();
        let files: Vec<&str> = entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.relative.as_str())
            .collect();
        assert_eq!(files, vec!["bin/tool"]);
    }

    #[test]
    fn test_has_files() {
        let temp = TempDir::new().unwrap();
        let tree = InstallTree::new(temp.path().join("_install"));
        assert!(!tree.has_files(&ComponentRegistry::new()).unwrap());

        let opts: OptionMap = [("COMPONENTS_ALL", "app")].into_iter().collect();
        let mut registry = ComponentRegistry::new();
        registry.populate(&opts, "demo");
        // Files outside every component directory do not count
        stage(&temp.path().join("_install"), &["README"]);
        tree.attribute(&mut registry).unwrap();
        assert!(!tree.has_files(&registry).unwrap());

        stage(&temp.path().join("_install/app"), &["bin/app"]);
        tree.attribute(&mut registry).unwrap();
        assert!(tree.has_files(&registry).unwrap());
    }
}
