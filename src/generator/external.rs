// src/generator/external.rs

//! External generator
//!
//! Writes a JSON description of each unit for a packaging script that lives
//! outside compack. If `EXTERNAL_PACKAGE_COMMAND` is set, that command is run
//! after each descriptor is written, with the descriptor path appended as
//! its last argument.

use super::{EmitContext, PackagingBackend, remove_stale};
use crate::components::{ComponentId, ComponentRegistry, GroupId};
use crate::error::{Error, Result};
use crate::grouping::ComponentPackageMethod;
use crate::planner::PackagingUnit;
use crate::tool::{ToolCommand, run_checked};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

const FORMAT_VERSION_MAJOR: u32 = 1;
const FORMAT_VERSION_MINOR: u32 = 0;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    format_version_major: u32,
    format_version_minor: u32,
    package_name: String,
    package_version: String,
    package_vendor: String,
    package_description_summary: String,
    package_file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    packaging_method: Option<String>,
    staging_directory: String,
    components: BTreeMap<String, ComponentEntry>,
    component_groups: BTreeMap<String, GroupEntry>,
    installation_types: BTreeMap<String, InstallationTypeEntry>,
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComponentEntry {
    name: String,
    display_name: String,
    description: String,
    is_hidden: bool,
    is_required: bool,
    is_disabled_by_default: bool,
    is_downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    installation_types: Vec<String>,
    dependencies: Vec<String>,
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupEntry {
    name: String,
    display_name: String,
    description: String,
    is_bold: bool,
    is_expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_group: Option<String>,
    components: Vec<String>,
    subgroups: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallationTypeEntry {
    name: String,
    display_name: String,
    index: usize,
}

/// Backend writing JSON descriptors
#[derive(Debug, Default)]
pub struct ExternalBackend;

impl ExternalBackend {
    pub fn new() -> Self {
        Self
    }

    fn descriptor(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Descriptor {
        let registry = ctx.registry;
        let mut components = BTreeMap::new();
        let mut groups: BTreeSet<GroupId> = BTreeSet::new();
        let mut install_types = BTreeMap::new();

        for &id in &unit.components {
            let component = registry.component(id);
            components.insert(component.name.clone(), component_entry(registry, id));
            if let Some(mut group) = component.group {
                groups.insert(group);
                while let Some(parent) = registry.group(group).parent_group {
                    if !groups.insert(parent) {
                        break;
                    }
                    group = parent;
                }
            }
            for &type_id in &component.installation_types {
                let install_type = registry.installation_type(type_id);
                install_types
                    .entry(install_type.name.clone())
                    .or_insert_with(|| InstallationTypeEntry {
                        name: install_type.name.clone(),
                        display_name: install_type.display_name.clone(),
                        index: install_type.index,
                    });
            }
        }

        let component_groups = groups
            .into_iter()
            .map(|id| {
                let group = registry.group(id);
                (
                    group.name.clone(),
                    GroupEntry {
                        name: group.name.clone(),
                        display_name: group.display_name.clone(),
                        description: group.description.clone(),
                        is_bold: group.is_bold,
                        is_expanded: group.is_expanded_by_default,
                        parent_group: group
                            .parent_group
                            .map(|p| registry.group(p).name.clone()),
                        components: group
                            .components
                            .iter()
                            .map(|&c| registry.component(c).name.clone())
                            .collect(),
                        subgroups: group
                            .subgroups
                            .iter()
                            .map(|&g| registry.group(g).name.clone())
                            .collect(),
                    },
                )
            })
            .collect();

        Descriptor {
            format_version_major: FORMAT_VERSION_MAJOR,
            format_version_minor: FORMAT_VERSION_MINOR,
            package_name: ctx.project.name.clone(),
            package_version: ctx.project.version.clone(),
            package_vendor: ctx.project.vendor.clone(),
            package_description_summary: ctx.project.summary.clone(),
            package_file_name: unit.package_name.clone(),
            packaging_method: method_for(unit).map(|m| m.to_string()),
            staging_directory: ctx.tree.root().display().to_string(),
            components,
            component_groups,
            installation_types: install_types,
            dependencies: unit
                .dependencies
                .merged()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

fn method_for(unit: &PackagingUnit) -> Option<ComponentPackageMethod> {
    use crate::planner::UnitKind;
    match unit.kind {
        UnitKind::Monolithic => None,
        UnitKind::AllInOne => Some(ComponentPackageMethod::OnePackage),
        UnitKind::Component(_) => Some(ComponentPackageMethod::OnePackagePerComponent),
        UnitKind::Group(_) => Some(ComponentPackageMethod::OnePackagePerGroup),
    }
}

fn component_entry(registry: &ComponentRegistry, id: ComponentId) -> ComponentEntry {
    let component = registry.component(id);
    ComponentEntry {
        name: component.name.clone(),
        display_name: component.display_name.clone(),
        description: component.description.clone(),
        is_hidden: component.is_hidden,
        is_required: component.is_required,
        is_disabled_by_default: component.is_disabled_by_default,
        is_downloaded: component.is_downloaded,
        archive_file: component.archive_file.clone(),
        group: component.group.map(|g| registry.group(g).name.clone()),
        installation_types: component
            .installation_types
            .iter()
            .map(|&t| registry.installation_type(t).name.clone())
            .collect(),
        dependencies: component
            .dependencies
            .iter()
            .map(|&d| registry.component(d).name.clone())
            .collect(),
        files: component.files.clone(),
    }
}

impl PackagingBackend for ExternalBackend {
    fn name(&self) -> &str {
        "EXTERNAL"
    }

    fn output_extension(&self) -> &str {
        ".json"
    }

    fn supports_components(&self) -> bool {
        true
    }

    fn default_package_method(&self) -> ComponentPackageMethod {
        ComponentPackageMethod::OnePackage
    }

    fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        let output = ctx.output_path(unit);
        remove_stale(&output)?;

        let descriptor = self.descriptor(unit, ctx);
        let json = serde_json::to_string_pretty(&descriptor)?;
        std::fs::write(&output, json)?;
        ctx.log.verbose(&format!("Wrote descriptor {}", output.display()));

        if let Some(command) = ctx.options.non_empty_option("EXTERNAL_PACKAGE_COMMAND") {
            let mut parts = command.split_whitespace();
            let program = parts.next().ok_or_else(|| {
                Error::config("EXTERNAL_PACKAGE_COMMAND does not name a program")
            })?;
            let tool = ToolCommand::new(program)
                .args(parts)
                .arg(&output)
                .current_dir(&ctx.layout.toplevel);
            run_checked(&tool, &ctx.tool_log("external.log"))?;
        }

        Ok(vec![output])
    }
}
