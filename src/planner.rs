// src/planner.rs

//! Partition planning
//!
//! Turns the registry and a grouping decision into the list of packaging
//! units a generator will emit, names each unit's output file, and resolves
//! the dependencies units declare on each other and on packages outside the
//! run.

use crate::components::{
    ComponentId, ComponentRegistry, DependenceSpec, GroupId, ResolutionContext,
};
use crate::config::{OptionSource, key_name};
use crate::error::{Error, Result};
use crate::grouping::{ComponentPackageMethod, GroupingDecision};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a packaging unit was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Everything installed, with no component attribution
    Monolithic,
    /// Every component in one package
    AllInOne,
    Component(ComponentId),
    /// A top-level group with its subgroups
    Group(GroupId),
}

/// Dependencies declared by one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitDependencies {
    /// Canonical names of other units in the same run
    pub structural: Vec<String>,
    /// Textual dependencies, rewritten to canonical names where they name a unit
    pub alien: BTreeSet<DependenceSpec>,
}

impl UnitDependencies {
    /// Every dependency, one per name, sorted by name
    ///
    /// A textual spec wins over a structural reference to the same name,
    /// since it may carry a version constraint.
    pub fn merged(&self) -> Vec<DependenceSpec> {
        let mut all: BTreeSet<DependenceSpec> = self.alien.clone();
        for name in &self.structural {
            all.insert(DependenceSpec::named(name.clone()));
        }
        all.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.structural.is_empty() && self.alien.is_empty()
    }
}

/// One planned output artifact
#[derive(Debug, Clone)]
pub struct PackagingUnit {
    pub kind: UnitKind,
    /// Component or group name; empty for monolithic and all-in-one units
    pub name: String,
    pub display_name: String,
    /// Components packaged in this unit; empty for a monolithic unit
    pub components: Vec<ComponentId>,
    /// Output file stem
    pub package_name: String,
    /// Output file name (stem plus extension)
    pub output_file_name: String,
    /// Name other units use to refer to this one
    pub canonical_name: String,
    /// Scratch directory for this unit
    pub working_directory: PathBuf,
    pub dependencies: UnitDependencies,
}

impl PackagingUnit {
    pub fn is_monolithic(&self) -> bool {
        self.kind == UnitKind::Monolithic
    }

    /// Name used in log messages
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.package_name
        } else {
            &self.name
        }
    }
}

/// All units planned for one generator run
#[derive(Debug, Clone, Default)]
pub struct PackagingPlan {
    /// Whether units follow component boundaries
    pub component_install: bool,
    /// Grouping decision; absent for a monolithic plan
    pub grouping: Option<GroupingDecision>,
    pub units: Vec<PackagingUnit>,
}

impl PackagingPlan {
    pub fn method(&self) -> Option<ComponentPackageMethod> {
        self.grouping.map(|g| g.method)
    }

    /// Index of the unit that packages a component
    pub fn unit_of_component(&self, component: ComponentId) -> Option<usize> {
        self.units
            .iter()
            .position(|unit| unit.components.contains(&component))
    }

    /// Find a unit by component or group name
    pub fn unit_named(&self, name: &str) -> Option<&PackagingUnit> {
        self.units
            .iter()
            .find(|unit| !unit.name.is_empty() && unit.name == name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Reject unit names that are not plain file names, and units that
    /// would write the same output file
    pub fn check_names(&self) -> Result<()> {
        let mut outputs = HashSet::new();
        for unit in &self.units {
            if !unit.name.is_empty() && !is_plain_file_name(&unit.name) {
                return Err(Error::config(format!(
                    "package name \"{}\" cannot be used as a file name",
                    unit.name
                )));
            }
            if !is_plain_file_name(&unit.output_file_name) {
                return Err(Error::config(format!(
                    "output file name \"{}\" of {} cannot be used as a file name",
                    unit.output_file_name,
                    unit.label()
                )));
            }
            if !outputs.insert(unit.output_file_name.as_str()) {
                return Err(Error::config(format!(
                    "more than one package would be written to {}; rename the component or group {}",
                    unit.output_file_name,
                    unit.label()
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Output file naming for one generator
pub struct FileNaming<'a> {
    options: &'a dyn OptionSource,
    generator: String,
    base: String,
    extension: String,
}

impl<'a> FileNaming<'a> {
    pub fn new(
        options: &'a dyn OptionSource,
        generator: &str,
        base: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            options,
            generator: key_name(generator),
            base: base.into(),
            extension: extension.into(),
        }
    }

    /// Stem and file name of a single-package output
    pub fn whole_package(&self) -> (String, String) {
        (
            self.base.clone(),
            format!("{}{}", self.base, self.extension),
        )
    }

    /// Stem and file name of a component or group output
    ///
    /// The default is `{base}-{name}{ext}`. With
    /// `<GEN>_USE_DISPLAY_NAME_IN_FILENAME` the display name option replaces
    /// `name`; `<GEN>_<NAME>_FILE_NAME` replaces the whole stem.
    pub fn for_unit(&self, name: &str, is_group: bool) -> (String, String) {
        let override_key = format!("{}_{}_FILE_NAME", self.generator, key_name(name));
        if let Some(file_name) = self.options.non_empty_option(&override_key) {
            return match file_name.strip_suffix(self.extension.as_str()) {
                Some(stem) if !self.extension.is_empty() => (stem.to_string(), file_name.to_string()),
                _ => (
                    file_name.to_string(),
                    format!("{}{}", file_name, self.extension),
                ),
            };
        }

        let mut suffix = name.to_string();
        if self
            .options
            .is_on(&format!("{}_USE_DISPLAY_NAME_IN_FILENAME", self.generator))
        {
            let display_key = if is_group {
                format!("COMPONENT_GROUP_{}_DISPLAY_NAME", key_name(name))
            } else {
                format!("COMPONENT_{}_DISPLAY_NAME", key_name(name))
            };
            if let Some(display) = self.options.non_empty_option(&display_key) {
                suffix = display.to_string();
            }
        }

        let stem = format!("{}-{}", self.base, suffix);
        let file = format!("{}{}", stem, self.extension);
        (stem, file)
    }
}

/// Non-empty, no path separators, not `.` or `..`
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Should units follow component boundaries?
///
/// Requires backend support, at least one component or group, and no
/// `MONOLITHIC_INSTALL` override.
pub fn wants_component_installation(
    supports_components: bool,
    options: &dyn OptionSource,
    registry: &ComponentRegistry,
) -> bool {
    supports_components
        && !options.is_on("MONOLITHIC_INSTALL")
        && (registry.has_components() || registry.has_groups())
}

/// Partition the registry into packaging units
///
/// Without a grouping decision the plan holds a single monolithic unit.
/// Units are produced in name order; under the per-group method top-level
/// groups come first, followed by ungrouped components.
pub fn plan_units(
    registry: &ComponentRegistry,
    grouping: Option<GroupingDecision>,
    naming: &FileNaming<'_>,
    temp_dir: &Path,
) -> PackagingPlan {
    let mut units = Vec::new();

    match grouping.map(|g| g.method) {
        None => {
            let (package_name, output_file_name) = naming.whole_package();
            units.push(PackagingUnit {
                kind: UnitKind::Monolithic,
                name: String::new(),
                display_name: package_name.clone(),
                components: Vec::new(),
                canonical_name: package_name.clone(),
                package_name,
                output_file_name,
                working_directory: temp_dir.to_path_buf(),
                dependencies: UnitDependencies::default(),
            });
        }
        Some(ComponentPackageMethod::OnePackage) => {
            let (package_name, output_file_name) = naming.whole_package();
            units.push(PackagingUnit {
                kind: UnitKind::AllInOne,
                name: String::new(),
                display_name: package_name.clone(),
                components: registry.component_ids().collect(),
                canonical_name: package_name.clone(),
                package_name,
                output_file_name,
                working_directory: temp_dir.to_path_buf(),
                dependencies: UnitDependencies::default(),
            });
        }
        Some(ComponentPackageMethod::OnePackagePerComponent) => {
            for id in registry.component_ids() {
                units.push(component_unit(registry, id, naming, temp_dir));
            }
        }
        Some(ComponentPackageMethod::OnePackagePerGroup) => {
            for group_id in registry.top_level_groups() {
                let group = registry.group(group_id);
                let (package_name, output_file_name) = naming.for_unit(&group.name, true);
                units.push(PackagingUnit {
                    kind: UnitKind::Group(group_id),
                    name: group.name.clone(),
                    display_name: group.display_name.clone(),
                    components: registry.group_components_recursive(group_id),
                    canonical_name: package_name.clone(),
                    package_name,
                    output_file_name,
                    working_directory: temp_dir.join(&group.name),
                    dependencies: UnitDependencies::default(),
                });
            }
            for id in registry.orphan_components() {
                units.push(component_unit(registry, id, naming, temp_dir));
            }
        }
    }

    debug!("Planned {} packaging units", units.len());
    PackagingPlan {
        component_install: grouping.is_some(),
        grouping,
        units,
    }
}

fn component_unit(
    registry: &ComponentRegistry,
    id: ComponentId,
    naming: &FileNaming<'_>,
    temp_dir: &Path,
) -> PackagingUnit {
    let component = registry.component(id);
    let (package_name, output_file_name) = naming.for_unit(&component.name, false);
    PackagingUnit {
        kind: UnitKind::Component(id),
        name: component.name.clone(),
        display_name: component.display_name.clone(),
        components: vec![id],
        canonical_name: package_name.clone(),
        package_name,
        output_file_name,
        working_directory: temp_dir.join(&component.name),
        dependencies: UnitDependencies::default(),
    }
}

/// Option keys holding textual dependency specs for a unit
fn textual_dependency_keys(
    registry: &ComponentRegistry,
    unit: &PackagingUnit,
    generator: &str,
) -> Vec<String> {
    let generator = key_name(generator);
    match unit.kind {
        UnitKind::Monolithic | UnitKind::AllInOne => {
            vec![format!("{}_PACKAGE_DEPENDS", generator)]
        }
        UnitKind::Component(id) => vec![format!(
            "{}_COMPONENT_{}_DEPENDS",
            generator,
            key_name(&registry.component(id).name)
        )],
        UnitKind::Group(group_id) => {
            let mut keys = vec![format!(
                "{}_COMPONENT_GROUP_{}_DEPENDS",
                generator,
                key_name(&registry.group(group_id).name)
            )];
            for &id in &unit.components {
                keys.push(format!(
                    "{}_COMPONENT_{}_DEPENDS",
                    generator,
                    key_name(&registry.component(id).name)
                ));
            }
            keys
        }
    }
}

/// Fill in every unit's dependencies
///
/// Structural dependencies come from the registry's component edges that
/// cross unit boundaries. Textual specs naming a unit (or a component packaged
/// in one) are rewritten to that unit's canonical name; all others are
/// registered in `context`, and the spec on record for the name is used.
/// Units must already carry their canonical names.
pub fn resolve_dependencies(
    plan: &mut PackagingPlan,
    registry: &ComponentRegistry,
    options: &dyn OptionSource,
    generator: &str,
    context: &mut ResolutionContext,
) {
    let mut owner: HashMap<ComponentId, usize> = HashMap::new();
    for (index, unit) in plan.units.iter().enumerate() {
        for &id in &unit.components {
            owner.insert(id, index);
        }
    }
    let canonical: Vec<String> = plan.units.iter().map(|u| u.canonical_name.clone()).collect();
    let by_name: HashMap<String, usize> = plan
        .units
        .iter()
        .enumerate()
        .filter(|(_, unit)| !unit.name.is_empty())
        .map(|(index, unit)| (unit.name.clone(), index))
        .collect();

    let mut resolved = Vec::with_capacity(plan.units.len());
    for (index, unit) in plan.units.iter().enumerate() {
        let mut deps = UnitDependencies::default();

        for &id in &unit.components {
            for dependency in &registry.component(id).dependencies {
                if let Some(&target) = owner.get(dependency) {
                    if target != index && !deps.structural.contains(&canonical[target]) {
                        deps.structural.push(canonical[target].clone());
                    }
                }
            }
        }

        for key in textual_dependency_keys(registry, unit, generator) {
            for raw in options.list_option(&key) {
                let mut spec = DependenceSpec::parse(&raw);
                let target = by_name.get(&spec.name).copied().or_else(|| {
                    registry
                        .component_id(&spec.name)
                        .and_then(|id| owner.get(&id).copied())
                });
                match target {
                    Some(target) if target == index => {}
                    Some(target) => {
                        spec.name = canonical[target].clone();
                        deps.alien.insert(spec);
                    }
                    None => {
                        let registered = context.register(spec).clone();
                        deps.alien.insert(registered);
                    }
                }
            }
        }

        resolved.push(deps);
    }

    for (unit, deps) in plan.units.iter_mut().zip(resolved) {
        unit.dependencies = deps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::CompareOp;
    use crate::config::OptionMap;

    fn decision(method: ComponentPackageMethod) -> Option<GroupingDecision> {
        Some(GroupingDecision {
            method,
            requested: Some(method),
            demoted: false,
        })
    }

    fn registry(opts: &OptionMap) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.populate(opts, "demo");
        registry
    }

    #[test]
    fn test_unsafe_unit_names_are_rejected() {
        for name in ["../escape", "sub/dir", ".."] {
            let opts: OptionMap = [("COMPONENTS_ALL", name)].into_iter().collect();
            let reg = registry(&opts);
            let naming = FileNaming::new(&opts, "TGZ", "demo-1.0", ".tar.gz");
            let plan = plan_units(
                &reg,
                decision(ComponentPackageMethod::OnePackagePerComponent),
                &naming,
                Path::new("/tmp/demo"),
            );
            assert!(matches!(plan.check_names(), Err(Error::Config(_))), "{}", name);
        }
    }

    #[test]
    fn test_group_and_orphan_with_same_name_collide() {
        let opts: OptionMap = [
            ("COMPONENTS_ALL", "core;tools"),
            ("COMPONENT_CORE_GROUP", "tools"),
        ]
        .into_iter()
        .collect();
        let reg = registry(&opts);
        let naming = FileNaming::new(&opts, "TGZ", "demo-1.0", ".tar.gz");
        let plan = plan_units(
            &reg,
            decision(ComponentPackageMethod::OnePackagePerGroup),
            &naming,
            Path::new("/tmp/demo"),
        );
        assert_eq!(plan.len(), 2);
        let err = plan.check_names().unwrap_err();
        assert!(err.to_string().contains("demo-1.0-tools.tar.gz"));
    }

    #[test]
    fn test_empty_display_name_keeps_component_name() {
        let opts: OptionMap = [
            ("TGZ_USE_DISPLAY_NAME_IN_FILENAME", "ON"),
            ("COMPONENT_LIB_DISPLAY_NAME", ""),
        ]
        .into_iter()
        .collect();
        let naming = FileNaming::new(&opts, "TGZ", "demo-1.0", ".tar.gz");
        assert_eq!(naming.for_unit("lib", false).1, "demo-1.0-lib.tar.gz");
    }

    #[test]
    fn test_wants_component_installation() {
        let opts: OptionMap = [("COMPONENTS_ALL", "a")].into_iter().collect();
        let reg = registry(&opts);
        assert!(wants_component_installation(true, &opts, &reg));
        assert!(!wants_component_installation(false, &opts, &reg));

        let mono: OptionMap = [("COMPONENTS_ALL", "a"), ("MONOLITHIC_INSTALL", "ON")]
            .into_iter()
            .collect();
        assert!(!wants_component_installation(true, &mono, &reg));

        let empty = OptionMap::new();
        assert!(!wants_component_installation(true, &empty, &ComponentRegistry::new()));
    }

    #[test]
    fn test_file_naming_defaults() {
        let opts = OptionMap::new();
        let naming = FileNaming::new(&opts, "TGZ", "demo-1.0", ".tar.gz");
        assert_eq!(
            naming.whole_package(),
            ("demo-1.0".to_string(), "demo-1.0.tar.gz".to_string())
        );
        assert_eq!(
            naming.for_unit("lib", false),
            ("demo-1.0-lib".to_string(), "demo-1.0-lib.tar.gz".to_string())
        );
    }

    #[test]
    fn test_file_naming_display_name() {
        let opts: OptionMap = [
            ("TGZ_USE_DISPLAY_NAME_IN_FILENAME", "ON"),
            ("COMPONENT_LIB_DISPLAY_NAME", "Libraries"),
            ("COMPONENT_GROUP_RUNTIME_DISPLAY_NAME", "Runtime"),
        ]
        .into_iter()
        .collect();
        let naming = FileNaming::new(&opts, "tgz", "demo-1.0", ".tar.gz");
        assert_eq!(naming.for_unit("lib", false).1, "demo-1.0-Libraries.tar.gz");
        assert_eq!(naming.for_unit("runtime", true).1, "demo-1.0-Runtime.tar.gz");
        assert_eq!(naming.for_unit("docs", false).1, "demo-1.0-docs.tar.gz");
    }

    #[test]
    fn test_file_naming_override() {
        let opts: OptionMap = [
            ("TGZ_LIB_FILE_NAME", "libdemo"),
            ("TGZ_DOCS_FILE_NAME", "manual.tar.gz"),
        ]
        .into_iter()
        .collect();
        let naming = FileNaming::new(&opts, "TGZ", "demo-1.0", ".tar.gz");
        assert_eq!(
            naming.for_unit("lib", false),
            ("libdemo".to_string(), "libdemo.tar.gz".to_string())
        );
        assert_eq!(
            naming.for_unit("docs", false),
            ("manual".to_string(), "manual.tar.gz".to_string())
        );
    }

    #[test]
    fn test_monolithic_plan() {
        let opts: OptionMap = [("COMPONENTS_ALL", "a;b")].into_iter().collect();
        let reg = registry(&opts);
        let naming = FileNaming::new(&opts, "TGZ", "demo", ".tar.gz");
        let plan = plan_units(&reg, None, &naming, Path::new("/tmp/demo"));
        assert_eq!(plan.len(), 1);
        assert!(plan.units[0].is_monolithic());
        assert!(plan.units[0].components.is_empty());
        assert!(!plan.component_install);
        assert_eq!(plan.units[0].output_file_name, "demo.tar.gz");
    }

    #[test]
    fn test_all_in_one_plan() {
        let opts: OptionMap = [("COMPONENTS_ALL", "b;a")].into_iter().collect();
        let reg = registry(&opts);
        let naming = FileNaming::new(&opts, "TGZ", "demo", ".tar.gz");
        let plan = plan_units(
            &reg,
            decision(ComponentPackageMethod::OnePackage),
            &naming,
            Path::new("/tmp/demo"),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.units[0].kind, UnitKind::AllInOne);
        assert_eq!(plan.units[0].components.len(), 2);
        assert_eq!(plan.units[0].output_file_name, "demo.tar.gz");
    }

    #[test]
    fn test_per_group_plan_nests_subgroups() {
        let opts: OptionMap = [
            ("COMPONENTS_ALL", "core;plugins;tool"),
            ("COMPONENT_CORE_GROUP", "runtime"),
            ("COMPONENT_PLUGINS_GROUP", "extras"),
            ("COMPONENT_GROUP_EXTRAS_PARENT_GROUP", "runtime"),
        ]
        .into_iter()
        .collect();
        let reg = registry(&opts);
        let naming = FileNaming::new(&opts, "TGZ", "demo", ".tar.gz");
        let plan = plan_units(
            &reg,
            decision(ComponentPackageMethod::OnePackagePerGroup),
            &naming,
            Path::new("/tmp/demo"),
        );

        let names: Vec<&str> = plan.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["runtime", "tool"]);
        assert_eq!(plan.units[0].components.len(), 2);
        assert_eq!(plan.units[0].working_directory, Path::new("/tmp/demo/runtime"));
        assert_eq!(plan.units[1].output_file_name, "demo-tool.tar.gz");

        let core = reg.component_id("core").unwrap();
        let plugins = reg.component_id("plugins").unwrap();
        assert_eq!(plan.unit_of_component(core), Some(0));
        assert_eq!(plan.unit_of_component(plugins), Some(0));
    }

    #[test]
    fn test_structural_dependencies_cross_units_only() {
        let opts: OptionMap = [
            ("COMPONENTS_ALL", "app;lib;plugin"),
            ("COMPONENT_APP_DEPENDS", "lib;plugin"),
            ("COMPONENT_APP_GROUP", "main"),
            ("COMPONENT_PLUGIN_GROUP", "main"),
        ]
        .into_iter()
        .collect();
        let reg = registry(&opts);
        let naming = FileNaming::new(&opts, "TGZ", "demo", ".tar.gz");
        let mut plan = plan_units(
            &reg,
            decision(ComponentPackageMethod::OnePackagePerGroup),
            &naming,
            Path::new("/tmp"),
        );
        let mut ctx = ResolutionContext::new();
        resolve_dependencies(&mut plan, &reg, &opts, "TGZ", &mut ctx);

        let main = plan.unit_named("main").unwrap();
        assert_eq!(main.dependencies.structural, vec!["demo-lib"]);
        let lib = plan.unit_named("lib").unwrap();
        assert!(lib.dependencies.is_empty());
    }

    #[test]
    fn test_textual_dependencies() {
        let opts: OptionMap = [
            ("COMPONENTS_ALL", "app;lib"),
            ("IFW_COMPONENT_APP_DEPENDS", "lib>=1.0;qt.core;zlib->=1.2"),
            ("IFW_COMPONENT_LIB_DEPENDS", "zlib<2.0;lib"),
        ]
        .into_iter()
        .collect();
        let reg = registry(&opts);
        let naming = FileNaming::new(&opts, "IFW", "demo", "");
        let mut plan = plan_units(
            &reg,
            decision(ComponentPackageMethod::OnePackagePerComponent),
            &naming,
            Path::new("/tmp"),
        );
        plan.units[1].canonical_name = "org.demo.lib".to_string();

        let mut ctx = ResolutionContext::new();
        resolve_dependencies(&mut plan, &reg, &opts, "IFW", &mut ctx);

        let app = plan.unit_named("app").unwrap();
        let rendered: Vec<String> = app
            .dependencies
            .merged()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(rendered, vec!["org.demo.lib->=1.0", "qt.core", "zlib->=1.2"]);

        // lib's later zlib constraint does not replace the registered one
        let lib = plan.unit_named("lib").unwrap();
        let zlib = lib.dependencies.alien.iter().next().unwrap();
        assert_eq!(zlib.compare, CompareOp::GreaterOrEqual);
        assert_eq!(lib.dependencies.alien.len(), 1);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_merged_prefers_textual_spec() {
        let mut deps = UnitDependencies::default();
        deps.structural.push("demo-lib".to_string());
        deps.structural.push("demo-core".to_string());
        deps.alien.insert(DependenceSpec {
            name: "demo-lib".to_string(),
            compare: CompareOp::GreaterOrEqual,
            value: "2".to_string(),
        });
        let rendered: Vec<String> = deps.merged().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["demo-core", "demo-lib->=2"]);
    }
}
