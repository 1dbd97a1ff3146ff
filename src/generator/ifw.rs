// src/generator/ifw.rs

//! Installer framework generator
//!
//! Every unit becomes a package directory
//! `packages/<name>/{meta/package.xml,data/...}` below the generator
//! directory. Once all units are written, `config/config.xml` is generated
//! and `binarycreator` assembles the installer.
//!
//! Package names default to the component or group name and may be
//! overridden with `IFW_COMPONENT_<N>_NAME` / `IFW_COMPONENT_GROUP_<N>_NAME`.
//! An override that is not a legal package name drops the unit.

use super::xml::XmlDocument;
use super::{EmitContext, PackageLayout, PackagingBackend, copy_entry, remove_stale};
use crate::components::ComponentRegistry;
use crate::config::{OptionSource, key_name};
use crate::error::{Error, Result};
use crate::grouping::ComponentPackageMethod;
use crate::planner::{PackagingPlan, PackagingUnit, UnitKind};
use crate::tool::{ToolCommand, locate_tool, run_checked};
use std::path::PathBuf;

/// A remote repository offered by the installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub display_name: Option<String>,
    pub enabled: bool,
}

/// Read `IFW_REPOSITORIES_ALL`, skipping repositories without a URL
pub fn configured_repositories(options: &dyn OptionSource) -> Vec<Repository> {
    let mut repositories = Vec::new();
    for name in options.list_option("IFW_REPOSITORIES_ALL") {
        let prefix = format!("IFW_REPOSITORY_{}", key_name(&name));
        let Some(url) = options.non_empty_option(&format!("{}_URL", prefix)) else {
            tracing::warn!(
                "Invalid repository \"{}\" configuration. Repository will be skipped: {}_URL is not set",
                name,
                prefix
            );
            continue;
        };
        repositories.push(Repository {
            name: name.clone(),
            url: url.to_string(),
            display_name: options
                .non_empty_option(&format!("{}_DISPLAY_NAME", prefix))
                .map(str::to_string),
            enabled: !options.is_on(&format!("{}_DISABLED", prefix)),
        });
    }
    repositories
}

/// Is this usable as an installer package name?
pub fn is_valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Backend producing an installer framework package tree
#[derive(Debug)]
pub struct IfwBackend {
    extension: String,
    binarycreator: Option<PathBuf>,
}

impl Default for IfwBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IfwBackend {
    pub fn new() -> Self {
        Self {
            extension: ".run".to_string(),
            binarycreator: None,
        }
    }

    fn name_override_key(unit: &PackagingUnit, registry: &ComponentRegistry) -> Option<String> {
        match unit.kind {
            UnitKind::Component(id) => Some(format!(
                "IFW_COMPONENT_{}_NAME",
                key_name(&registry.component(id).name)
            )),
            UnitKind::Group(id) => Some(format!(
                "IFW_COMPONENT_GROUP_{}_NAME",
                key_name(&registry.group(id).name)
            )),
            UnitKind::Monolithic | UnitKind::AllInOne => None,
        }
    }

    fn write_package_xml(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>, meta: PathBuf) -> Result<()> {
        let registry = ctx.registry;
        let (description, hidden, required, disabled) = match unit.kind {
            UnitKind::Component(id) => {
                let c = registry.component(id);
                (
                    c.description.clone(),
                    c.is_hidden,
                    c.is_required,
                    c.is_disabled_by_default,
                )
            }
            UnitKind::Group(id) => (registry.group(id).description.clone(), false, false, false),
            UnitKind::Monolithic | UnitKind::AllInOne => {
                (ctx.project.summary.clone(), false, true, false)
            }
        };
        let version_key = match unit.kind {
            UnitKind::Component(_) => Some(format!("IFW_COMPONENT_{}_VERSION", key_name(&unit.name))),
            UnitKind::Group(_) => Some(format!(
                "IFW_COMPONENT_GROUP_{}_VERSION",
                key_name(&unit.name)
            )),
            UnitKind::Monolithic | UnitKind::AllInOne => None,
        };
        let version = version_key
            .and_then(|key| ctx.options.non_empty_option(&key))
            .unwrap_or(&ctx.project.version)
            .to_string();
        let release_date = chrono::Utc::now().format("%Y-%m-%d").to_string();

        let mut doc = XmlDocument::new()?;
        doc.start("Package", &[])?;
        doc.text_element("DisplayName", &unit.display_name)?;
        doc.text_element("Description", &description)?;
        doc.text_element("Name", &unit.canonical_name)?;
        doc.text_element("Version", &version)?;
        doc.text_element("ReleaseDate", &release_date)?;

        let dependencies: Vec<String> = unit
            .dependencies
            .merged()
            .iter()
            .map(ToString::to_string)
            .collect();
        if !dependencies.is_empty() {
            doc.text_element("Dependencies", &dependencies.join(","))?;
        }
        if hidden {
            doc.text_element("Virtual", "true")?;
        }
        if required {
            doc.text_element("ForcedInstallation", "true")?;
        } else {
            doc.text_element("Default", if disabled { "false" } else { "true" })?;
        }
        doc.end("Package")?;
        doc.write_to(&meta.join("package.xml"))
    }

    fn write_config_xml(&self, ctx: &EmitContext<'_>, config_dir: PathBuf) -> Result<()> {
        let project = ctx.project;
        let title = ctx
            .options
            .non_empty_option("IFW_PACKAGE_TITLE")
            .unwrap_or(&project.name);
        let target_dir = ctx
            .options
            .non_empty_option("IFW_TARGET_DIRECTORY")
            .map(str::to_string)
            .unwrap_or_else(|| format!("@HomeDir@/{}", project.name));

        let mut doc = XmlDocument::new()?;
        doc.start("Installer", &[])?;
        doc.text_element("Name", &project.name)?;
        doc.text_element("Version", &project.version)?;
        doc.text_element("Title", title)?;
        doc.text_element("Publisher", &project.vendor)?;
        doc.text_element("TargetDir", &target_dir)?;

        let repositories = configured_repositories(ctx.options);
        if !repositories.is_empty() {
            doc.start("RemoteRepositories", &[])?;
            for repository in &repositories {
                doc.start("Repository", &[])?;
                doc.text_element("Url", &repository.url)?;
                doc.text_element("Enabled", if repository.enabled { "1" } else { "0" })?;
                if let Some(display_name) = &repository.display_name {
                    doc.text_element("DisplayName", display_name)?;
                }
                doc.end("Repository")?;
            }
            doc.end("RemoteRepositories")?;
        }
        doc.end("Installer")?;
        doc.write_to(&config_dir.join("config.xml"))
    }
}

impl PackagingBackend for IfwBackend {
    fn name(&self) -> &str {
        "IFW"
    }

    fn output_extension(&self) -> &str {
        &self.extension
    }

    fn supports_components(&self) -> bool {
        true
    }

    fn default_package_method(&self) -> ComponentPackageMethod {
        ComponentPackageMethod::OnePackagePerComponent
    }

    fn initialize(&mut self, options: &dyn OptionSource, _layout: &PackageLayout) -> Result<()> {
        if let Some(extension) = options.non_empty_option("IFW_OUTPUT_EXTENSION") {
            self.extension = if extension.starts_with('.') {
                extension.to_string()
            } else {
                format!(".{}", extension)
            };
        }
        Ok(())
    }

    fn locate_tools(&mut self, options: &dyn OptionSource) -> Result<()> {
        self.binarycreator = Some(locate_tool(options, "IFW", "binarycreator", "binarycreator")?);
        Ok(())
    }

    fn prepare(&self, layout: &PackageLayout) -> Result<()> {
        // Packages of components no longer in the project must not be bundled
        remove_stale(&layout.toplevel.join("packages"))?;
        remove_stale(&layout.toplevel.join("config"))
    }

    fn validate_unit(
        &self,
        unit: &PackagingUnit,
        registry: &ComponentRegistry,
        options: &dyn OptionSource,
    ) -> std::result::Result<(), String> {
        let Some(key) = Self::name_override_key(unit, registry) else {
            return Ok(());
        };
        match options.get_option(&key) {
            Some(name) if !is_valid_package_name(name) => Err(format!(
                "{} is \"{}\", which is not a valid package name",
                key, name
            )),
            _ => Ok(()),
        }
    }

    fn canonical_name(
        &self,
        unit: &PackagingUnit,
        registry: &ComponentRegistry,
        options: &dyn OptionSource,
    ) -> String {
        if let Some(key) = Self::name_override_key(unit, registry) {
            return options
                .non_empty_option(&key)
                .unwrap_or(&unit.name)
                .to_string();
        }
        options
            .non_empty_option("IFW_PACKAGE_NAME")
            .or_else(|| options.non_empty_option("PACKAGE_NAME"))
            .unwrap_or(&unit.package_name)
            .to_string()
    }

    fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        let package_dir = ctx
            .layout
            .toplevel
            .join("packages")
            .join(&unit.canonical_name);
        remove_stale(&package_dir)?;

        let data = package_dir.join("data");
        std::fs::create_dir_all(&data)?;
        for entry in ctx.tree.unit_entries(ctx.registry, &unit.components)? {
            copy_entry(&entry.source, &data.join(&entry.relative), entry.is_dir)?;
        }
        self.write_package_xml(unit, ctx, package_dir.join("meta"))?;
        ctx.log
            .verbose(&format!("Prepared package directory {}", package_dir.display()));

        // The installer itself is produced once every package is in place
        Ok(Vec::new())
    }

    fn finish(&self, _plan: &PackagingPlan, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        let toplevel = &ctx.layout.toplevel;
        self.write_config_xml(ctx, toplevel.join("config"))?;

        let output = toplevel.join(format!("{}{}", ctx.layout.base_name, self.extension));
        remove_stale(&output)?;

        let binarycreator = self
            .binarycreator
            .as_ref()
            .ok_or_else(|| Error::InvalidState("binarycreator was not located".to_string()))?;
        let command = ToolCommand::new(binarycreator)
            .arg("-c")
            .arg(toplevel.join("config").join("config.xml"))
            .arg("-p")
            .arg(toplevel.join("packages"))
            .arg(&output)
            .current_dir(toplevel);
        run_checked(&command, &ctx.tool_log("IFWOutput.log"))?;
        Ok(vec![output])
    }
}
