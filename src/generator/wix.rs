// src/generator/wix.rs

//! WiX installer generator
//!
//! Each unit is described by three WiX sources written to its working
//! directory:
//!
//! - `main.wxs`: product, package and media definitions
//! - `features.wxs`: one feature per component, nested under the features
//!   of its groups
//! - `files.wxs`: the directory tree with one WiX component per file
//!
//! `candle` compiles them and `light` links the installer.

use super::xml::XmlDocument;
use super::{EmitContext, PackageLayout, PackagingBackend, ProjectInfo, remove_stale};
use crate::checksum::{ChecksumAlgorithm, hash_bytes};
use crate::components::{ComponentId, ComponentRegistry, GroupId};
use crate::config::OptionSource;
use crate::error::{Error, Result};
use crate::grouping::ComponentPackageMethod;
use crate::planner::PackagingUnit;
use crate::tool::{ToolCommand, locate_tool, run_checked};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

const MAX_ID_LENGTH: usize = 60;
const MAX_REPLACEMENT_PERCENT: usize = 33;
const MAX_HASHED_NAME_LENGTH: usize = 52;
const MAX_AMBIGUITY: usize = 999;

fn is_legal_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Unique WiX identifiers for installed paths
///
/// Identifiers are `P_` followed by the path with separators turned into
/// dots and illegal characters into underscores. Paths that need too many
/// replacements, or produce identifiers longer than 60 characters, use the
/// hashed `H_<sha1 prefix>_<file name>` form instead. Paths that normalize to
/// the same identifier are numbered `_2`, `_3`, ... up to `_999`.
#[derive(Debug, Default)]
pub struct IdGenerator {
    by_path: HashMap<String, String>,
    ambiguity: HashMap<String, usize>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier for `path`, stable for repeated calls with the same path
    pub fn id_for_path(&mut self, path: &str) -> Result<String> {
        if let Some(id) = self.by_path.get(path) {
            return Ok(id.clone());
        }

        let mut replacements = 0;
        let mut last = String::new();
        let mut identifier = String::new();
        for part in path.split(['/', '\\']).filter(|p| !p.is_empty()) {
            if !identifier.is_empty() {
                identifier.push('.');
            }
            last = part
                .chars()
                .map(|c| {
                    if is_legal_id_char(c) {
                        c
                    } else {
                        replacements += 1;
                        '_'
                    }
                })
                .collect();
            identifier.push_str(&last);
        }

        let mut prefix = "P";
        let too_mangled = identifier.is_empty()
            || replacements * 100 / identifier.len() > MAX_REPLACEMENT_PERCENT;
        if too_mangled || identifier.len() > MAX_ID_LENGTH {
            identifier = hashed_id(path, &last);
            prefix = "H";
        }

        let count = self.ambiguity.entry(identifier.clone()).or_insert(0);
        *count += 1;
        let id = match *count {
            1 => format!("{}_{}", prefix, identifier),
            n if n <= MAX_AMBIGUITY => format!("{}_{}_{}", prefix, identifier, n),
            _ => return Err(Error::IdAmbiguity(path.to_string())),
        };
        self.by_path.insert(path.to_string(), id.clone());
        Ok(id)
    }
}

fn hashed_id(path: &str, file_name: &str) -> String {
    let hash = hash_bytes(ChecksumAlgorithm::Sha1, path.as_bytes());
    let name = if file_name.len() > MAX_HASHED_NAME_LENGTH {
        // Only legal characters remain, so byte slicing stays on boundaries
        format!("{}...", &file_name[..MAX_HASHED_NAME_LENGTH - 3])
    } else {
        file_name.to_string()
    };
    format!("{}_{}", &hash[..7], name)
}

/// A file installed by the unit
#[derive(Debug, Clone)]
pub struct WixFile {
    /// Path below the installation root, `/`-separated
    pub relative: String,
    pub source: PathBuf,
    /// Component owning the file, `None` for monolithic units
    pub owner: Option<String>,
}

#[derive(Default)]
struct DirNode<'a> {
    children: BTreeMap<&'a str, DirNode<'a>>,
    files: Vec<&'a WixFile>,
}

impl<'a> DirNode<'a> {
    fn insert(&mut self, file: &'a WixFile) {
        let mut node = self;
        let mut parts: Vec<&str> = file.relative.split('/').filter(|p| !p.is_empty()).collect();
        parts.pop();
        for part in parts {
            node = node.children.entry(part).or_default();
        }
        node.files.push(file);
    }
}

fn group_id_attr(name: &str) -> String {
    format!("CM_CG_{}", name)
}

/// Render the files fragment
///
/// Every file becomes a WiX component with an automatic GUID; components
/// are collected into one component group per owner (`CM_CG_<owner>`, or
/// `CM_CG_all` for ownerless files).
pub fn files_fragment(files: &[WixFile], ids: &mut IdGenerator) -> Result<String> {
    let mut root = DirNode::default();
    for file in files {
        root.insert(file);
    }

    let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut doc = XmlDocument::new()?;
    doc.start("Wix", &[("xmlns", "http://schemas.microsoft.com/wix/2006/wi")])?;
    doc.start("Fragment", &[])?;
    doc.start("DirectoryRef", &[("Id", "INSTALL_ROOT")])?;
    write_directory(&mut doc, &root, "", ids, &mut owners)?;
    doc.end("DirectoryRef")?;
    doc.end("Fragment")?;

    doc.start("Fragment", &[])?;
    for (owner, components) in &owners {
        doc.start("ComponentGroup", &[("Id", group_id_attr(owner).as_str())])?;
        for component in components {
            doc.empty("ComponentRef", &[("Id", component.as_str())])?;
        }
        doc.end("ComponentGroup")?;
    }
    doc.end("Fragment")?;
    doc.end("Wix")?;
    Ok(doc.into_string())
}

fn write_directory(
    doc: &mut XmlDocument,
    node: &DirNode<'_>,
    path: &str,
    ids: &mut IdGenerator,
    owners: &mut BTreeMap<String, Vec<String>>,
) -> Result<()> {
    for file in &node.files {
        let id = ids.id_for_path(&file.relative)?;
        let component_id = format!("CM_C{}", id);
        let file_id = format!("CM_F{}", id);
        let name = file.relative.rsplit('/').next().unwrap_or(&file.relative);
        let source = file.source.display().to_string();

        doc.start("Component", &[("Id", component_id.as_str()), ("Guid", "*")])?;
        doc.empty(
            "File",
            &[
                ("Id", file_id.as_str()),
                ("Name", name),
                ("Source", source.as_str()),
                ("KeyPath", "yes"),
            ],
        )?;
        doc.end("Component")?;

        owners
            .entry(file.owner.clone().unwrap_or_else(|| "all".to_string()))
            .or_default()
            .push(component_id);
    }

    for (name, child) in &node.children {
        let child_path = if path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", path, name)
        };
        let id = format!("CM_D{}", ids.id_for_path(&format!("{}/", child_path))?);
        doc.start("Directory", &[("Id", id.as_str()), ("Name", *name)])?;
        write_directory(doc, child, &child_path, ids, owners)?;
        doc.end("Directory")?;
    }
    Ok(())
}

struct FeatureWriter<'a> {
    registry: &'a ComponentRegistry,
    members: HashSet<ComponentId>,
}

impl FeatureWriter<'_> {
    fn group_has_members(&self, id: GroupId) -> bool {
        self.registry
            .group_components_recursive(id)
            .iter()
            .any(|c| self.members.contains(c))
    }

    fn group(&self, doc: &mut XmlDocument, id: GroupId) -> Result<()> {
        if !self.group_has_members(id) {
            return Ok(());
        }
        let group = self.registry.group(id);
        let feature_id = format!("CM_G_{}", group.name);
        let mut attrs = vec![
            ("Id", feature_id.as_str()),
            ("Title", group.display_name.as_str()),
            ("Level", "1"),
        ];
        if !group.description.is_empty() {
            attrs.push(("Description", group.description.as_str()));
        }
        if group.is_expanded_by_default {
            attrs.push(("Display", "expand"));
        }
        doc.start("Feature", &attrs)?;
        for &subgroup in &group.subgroups {
            self.group(doc, subgroup)?;
        }
        for &component in &group.components {
            if self.members.contains(&component) {
                self.component(doc, component)?;
            }
        }
        doc.end("Feature")
    }

    fn component(&self, doc: &mut XmlDocument, id: ComponentId) -> Result<()> {
        let component = self.registry.component(id);
        let feature_id = format!("CM_C_{}", component.name);
        let level = if component.is_disabled_by_default { "2" } else { "1" };
        let mut attrs = vec![
            ("Id", feature_id.as_str()),
            ("Title", component.display_name.as_str()),
            ("Level", level),
        ];
        if !component.description.is_empty() {
            attrs.push(("Description", component.description.as_str()));
        }
        if component.is_required {
            attrs.push(("Absent", "disallow"));
        }
        if component.is_hidden {
            attrs.push(("Display", "hidden"));
        }
        doc.start("Feature", &attrs)?;
        if !component.files.is_empty() {
            doc.empty(
                "ComponentGroupRef",
                &[("Id", group_id_attr(&component.name).as_str())],
            )?;
        }
        doc.end("Feature")
    }
}

/// Render the features fragment for a unit
pub fn features_fragment(
    unit: &PackagingUnit,
    registry: &ComponentRegistry,
    project: &ProjectInfo,
) -> Result<String> {
    let mut doc = XmlDocument::new()?;
    doc.start("Wix", &[("xmlns", "http://schemas.microsoft.com/wix/2006/wi")])?;
    doc.start("Fragment", &[])?;
    doc.start(
        "Feature",
        &[
            ("Id", "ProductFeature"),
            ("Title", project.name.as_str()),
            ("Level", "1"),
            ("Display", "expand"),
            ("Absent", "disallow"),
            ("ConfigurableDirectory", "INSTALL_ROOT"),
        ],
    )?;

    if unit.is_monolithic() {
        doc.empty("ComponentGroupRef", &[("Id", group_id_attr("all").as_str())])?;
    } else {
        let writer = FeatureWriter {
            registry,
            members: unit.components.iter().copied().collect(),
        };
        for group in registry.top_level_groups() {
            writer.group(&mut doc, group)?;
        }
        for id in registry.orphan_components() {
            if writer.members.contains(&id) {
                writer.component(&mut doc, id)?;
            }
        }
    }

    doc.end("Feature")?;
    doc.end("Fragment")?;
    doc.end("Wix")?;
    Ok(doc.into_string())
}

fn guid(options: &dyn OptionSource, key: &str) -> String {
    match options.non_empty_option(key) {
        Some(guid) => guid.to_string(),
        None => uuid::Uuid::new_v4().to_string().to_uppercase(),
    }
}

/// Backend producing MSI installers through the WiX toolset
#[derive(Debug, Default)]
pub struct WixBackend {
    candle: Option<PathBuf>,
    light: Option<PathBuf>,
}

impl WixBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn main_source(&self, ctx: &EmitContext<'_>) -> Result<String> {
        let project = ctx.project;
        let options = ctx.options;
        let product_guid = guid(options, "WIX_PRODUCT_GUID");
        let upgrade_guid = match options.non_empty_option("WIX_UPGRADE_GUID") {
            Some(guid) => guid.to_string(),
            None => {
                let generated = uuid::Uuid::new_v4().to_string().to_uppercase();
                ctx.log.warning(&format!(
                    "WIX_UPGRADE_GUID is not set; generated {}. Later installers will not upgrade this one",
                    generated
                ));
                generated
            }
        };
        let install_dir = options
            .non_empty_option("WIX_INSTALL_DIRECTORY")
            .unwrap_or(&project.name);

        let mut doc = XmlDocument::new()?;
        doc.start("Wix", &[("xmlns", "http://schemas.microsoft.com/wix/2006/wi")])?;
        doc.start(
            "Product",
            &[
                ("Id", product_guid.as_str()),
                ("Name", project.name.as_str()),
                ("Language", "1033"),
                ("Version", project.version.as_str()),
                ("Manufacturer", project.vendor.as_str()),
                ("UpgradeCode", upgrade_guid.as_str()),
            ],
        )?;
        doc.empty(
            "Package",
            &[
                ("InstallerVersion", "301"),
                ("Compressed", "yes"),
                ("Description", project.summary.as_str()),
            ],
        )?;
        doc.empty("Media", &[("Id", "1"), ("Cabinet", "media1.cab"), ("EmbedCab", "yes")])?;
        doc.empty(
            "MajorUpgrade",
            &[(
                "DowngradeErrorMessage",
                "A later version of [ProductName] is already installed.",
            )],
        )?;
        doc.start("Directory", &[("Id", "TARGETDIR"), ("Name", "SourceDir")])?;
        doc.start("Directory", &[("Id", "ProgramFilesFolder")])?;
        doc.empty("Directory", &[("Id", "INSTALL_ROOT"), ("Name", install_dir)])?;
        doc.end("Directory")?;
        doc.end("Directory")?;
        doc.empty("FeatureRef", &[("Id", "ProductFeature")])?;
        doc.end("Product")?;
        doc.end("Wix")?;
        Ok(doc.into_string())
    }

    fn unit_files(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<WixFile>> {
        if unit.is_monolithic() {
            return Ok(ctx
                .tree
                .unit_entries(ctx.registry, &[])?
                .into_iter()
                .filter(|entry| !entry.is_dir)
                .map(|entry| WixFile {
                    relative: entry.relative,
                    source: entry.source,
                    owner: None,
                })
                .collect());
        }

        let mut files = Vec::new();
        let mut seen = HashSet::new();
        for &id in &unit.components {
            let component = ctx.registry.component(id);
            let root = ctx.tree.component_root(&component.name);
            for file in &component.files {
                // Two components installing the same path: the first one wins
                if !seen.insert(file.clone()) {
                    ctx.log.warning(&format!(
                        "{} is installed by more than one component; keeping the first",
                        file
                    ));
                    continue;
                }
                files.push(WixFile {
                    relative: file.clone(),
                    source: root.join(file),
                    owner: Some(component.name.clone()),
                });
            }
        }
        Ok(files)
    }
}

impl PackagingBackend for WixBackend {
    fn name(&self) -> &str {
        "WIX"
    }

    fn output_extension(&self) -> &str {
        ".msi"
    }

    fn supports_components(&self) -> bool {
        true
    }

    fn default_package_method(&self) -> ComponentPackageMethod {
        ComponentPackageMethod::OnePackage
    }

    fn locate_tools(&mut self, options: &dyn OptionSource) -> Result<()> {
        self.candle = Some(locate_tool(options, "WIX", "candle", "candle")?);
        self.light = Some(locate_tool(options, "WIX", "light", "light")?);
        Ok(())
    }

    fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        let output = ctx.output_path(unit);
        remove_stale(&output)?;
        let work = &unit.working_directory;
        remove_stale(work)?;
        std::fs::create_dir_all(work)?;

        let files = self.unit_files(unit, ctx)?;
        let mut ids = IdGenerator::new();
        let sources = [
            ("main", self.main_source(ctx)?),
            ("features", features_fragment(unit, ctx.registry, ctx.project)?),
            ("files", files_fragment(&files, &mut ids)?),
        ];
        for (name, content) in &sources {
            std::fs::write(work.join(format!("{}.wxs", name)), content)?;
        }

        let (candle, light) = match (&self.candle, &self.light) {
            (Some(candle), Some(light)) => (candle, light),
            _ => return Err(Error::InvalidState("WiX tools were not located".to_string())),
        };
        let log = ctx.tool_log("wix.log");

        let mut compile = ToolCommand::new(candle).arg("-nologo");
        for (name, _) in &sources {
            compile = compile.arg(format!("{}.wxs", name));
        }
        run_checked(&compile.current_dir(work), &log)?;

        let mut link = ToolCommand::new(light).arg("-nologo").arg("-out").arg(&output);
        for (name, _) in &sources {
            link = link.arg(format!("{}.wixobj", name));
        }
        run_checked(&link.current_dir(work), &log)?;

        Ok(vec![output])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionMap;
    use crate::grouping::GroupingDecision;
    use crate::planner::{FileNaming, plan_units};
    use std::path::Path;

    #[test]
    fn test_plain_identifiers() {
        let mut ids = IdGenerator::new();
        assert_eq!(ids.id_for_path("bin/tool.exe").unwrap(), "P_bin.tool.exe");
        assert_eq!(ids.id_for_path("share/my-app/readme.txt").unwrap(), "P_share.my_app.readme.txt");
        // Stable for the same path
        assert_eq!(ids.id_for_path("bin/tool.exe").unwrap(), "P_bin.tool.exe");
    }

    #[test]
    fn test_hashed_identifiers() {
        let mut ids = IdGenerator::new();
        let mangled = ids.id_for_path("bin/++--++.x").unwrap();
        assert!(mangled.starts_with("H_"));
        let hash = hash_bytes(ChecksumAlgorithm::Sha1, b"bin/++--++.x");
        assert_eq!(mangled, format!("H_{}_______.x", &hash[..7]));

        let long_path = format!("lib/{}/data.bin", "a".repeat(70));
        let long = ids.id_for_path(&long_path).unwrap();
        assert!(long.starts_with("H_"));
        assert!(long.ends_with("_data.bin"));
        assert!(long.chars().all(|c| is_legal_id_char(c)));
    }

    #[test]
    fn test_ambiguity_suffixes() {
        let mut ids = IdGenerator::new();
        assert_eq!(ids.id_for_path("a b").unwrap(), "P_a_b");
        assert_eq!(ids.id_for_path("a-b").unwrap(), "P_a_b_2");
        assert_eq!(ids.id_for_path("a+b").unwrap(), "P_a_b_3");
    }

    #[test]
    fn test_ambiguity_limit() {
        let mut ids = IdGenerator::new();
        // All of these normalize to "abcd_"
        for i in 0..MAX_AMBIGUITY {
            let path = format!("abcd{}", char::from_u32(0x100 + i as u32).unwrap());
            let id = ids.id_for_path(&path).unwrap();
            if i == MAX_AMBIGUITY - 1 {
                assert_eq!(id, "P_abcd__999");
            }
        }
        let err = ids.id_for_path("abcd!").unwrap_err();
        assert!(matches!(err, Error::IdAmbiguity(_)));
    }

    #[test]
    fn test_files_fragment_nests_directories() {
        let files = vec![
            WixFile {
                relative: "bin/app.exe".to_string(),
                source: PathBuf::from("/stage/app/bin/app.exe"),
                owner: Some("app".to_string()),
            },
            WixFile {
                relative: "bin/plugins/extra.dll".to_string(),
                source: PathBuf::from("/stage/extra/bin/plugins/extra.dll"),
                owner: Some("extra".to_string()),
            },
        ];
        let xml = files_fragment(&files, &mut IdGenerator::new()).unwrap();
        assert!(xml.contains("<Directory Id=\"CM_DP_bin\" Name=\"bin\">"));
        assert!(xml.contains("<Component Id=\"CM_CP_bin.app.exe\" Guid=\"*\">"));
        assert!(xml.contains("Name=\"extra.dll\""));
        assert!(xml.contains("<ComponentGroup Id=\"CM_CG_app\">"));
        assert!(xml.contains("<ComponentRef Id=\"CM_CP_bin.plugins.extra.dll\"/>"));
    }

    #[test]
    fn test_features_follow_group_tree() {
        let opts: OptionMap = [
            ("COMPONENTS_ALL", "core;gui;tools"),
            ("COMPONENT_CORE_GROUP", "runtime"),
            ("COMPONENT_GUI_GROUP", "desktop"),
            ("COMPONENT_GROUP_DESKTOP_PARENT_GROUP", "runtime"),
            ("COMPONENT_CORE_REQUIRED", "ON"),
            ("COMPONENT_TOOLS_DISABLED", "ON"),
        ]
        .into_iter()
        .collect();
        let mut registry = ComponentRegistry::new();
        registry.populate(&opts, "demo");
        let naming = FileNaming::new(&opts, "WIX", "demo-1.0", ".msi");
        let plan = plan_units(
            &registry,
            Some(GroupingDecision {
                method: ComponentPackageMethod::OnePackage,
                requested: None,
                demoted: false,
            }),
            &naming,
            Path::new("/tmp"),
        );
        let project = ProjectInfo::from_options(&opts, "demo");
        let xml = features_fragment(&plan.units[0], &registry, &project).unwrap();

        let runtime = xml.find("Id=\"CM_G_runtime\"").unwrap();
        let desktop = xml.find("Id=\"CM_G_desktop\"").unwrap();
        let gui = xml.find("Id=\"CM_C_gui\"").unwrap();
        let tools = xml.find("Id=\"CM_C_tools\"").unwrap();
        assert!(runtime < desktop && desktop < gui);
        assert!(xml.contains("Id=\"CM_C_core\" Title=\"core\" Level=\"1\" Absent=\"disallow\""));
        assert!(xml.contains("Id=\"CM_C_tools\" Title=\"tools\" Level=\"2\""));
        assert!(gui < tools);
    }
}
