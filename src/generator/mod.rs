// src/generator/mod.rs

//! Package generators
//!
//! A generator pairs a [`PackagingBackend`] (what an artifact looks like)
//! with the [`Generator`] driver (how a run proceeds). The driver reads the
//! configuration, plans packaging units and hands them to the backend one at
//! a time:
//!
//! ```text
//! Unconfigured -> Initialized -> Planned -> Emitting -> Done
//!                                                   \-> Failed
//! ```
//!
//! Any error moves the run to `Failed`, which is terminal. The first unit
//! that fails aborts the remaining units.
//!
//! # Layout
//!
//! Everything a run writes lives below
//! `PACKAGE_DIRECTORY/_packages/[TOPLEVEL_TAG/]<GEN>`; finished artifacts
//! are copied to `OUTPUT_FILE_PREFIX`.

mod archive;
mod external;
mod ifw;
mod nsis;
mod wix;
mod xml;

pub use archive::{ArchiveBackend, ArchiveCompression};
pub use external::ExternalBackend;
pub use ifw::IfwBackend;
pub use nsis::NsisBackend;
pub use wix::{IdGenerator, WixBackend};

use crate::checksum::{ChecksumAlgorithm, write_checksum_file};
use crate::components::{ComponentRegistry, ResolutionContext};
use crate::config::{OptionMap, OptionSource};
use crate::diagnostics::RunLog;
use crate::error::{Error, Result};
use crate::grouping::{ComponentPackageMethod, resolve_grouping};
use crate::planner::{
    FileNaming, PackagingPlan, PackagingUnit, plan_units, resolve_dependencies,
    wants_component_installation,
};
use crate::staging::InstallTree;
use std::fs;
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, info};

/// Backends known to compack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum GeneratorKind {
    /// gzip-compressed tarball
    Tgz,
    /// xz-compressed tarball
    Txz,
    /// zstd-compressed tarball
    Tzst,
    /// JSON descriptor for an external packaging script
    External,
    /// Installer framework package tree
    Ifw,
    /// NSIS installer script
    Nsis,
    /// WiX installer sources
    Wix,
}

impl GeneratorKind {
    /// Create the backend for this generator
    pub fn backend(&self) -> Box<dyn PackagingBackend> {
        match self {
            Self::Tgz => Box::new(ArchiveBackend::new(ArchiveCompression::Gzip)),
            Self::Txz => Box::new(ArchiveBackend::new(ArchiveCompression::Xz)),
            Self::Tzst => Box::new(ArchiveBackend::new(ArchiveCompression::Zstd)),
            Self::External => Box::new(ExternalBackend::new()),
            Self::Ifw => Box::new(IfwBackend::new()),
            Self::Nsis => Box::new(NsisBackend::new()),
            Self::Wix => Box::new(WixBackend::new()),
        }
    }
}

/// Capabilities and emission hooks of one package format
pub trait PackagingBackend {
    /// Generator name, as used in option keys
    fn name(&self) -> &str;

    /// Extension of produced artifacts, including the leading dot
    fn output_extension(&self) -> &str;

    /// Can this backend split a project by component?
    fn supports_components(&self) -> bool;

    /// Grouping method used when configuration asks for none
    fn default_package_method(&self) -> ComponentPackageMethod {
        ComponentPackageMethod::OnePackagePerGroup
    }

    /// Read backend options; must not touch the filesystem
    fn initialize(&mut self, _options: &dyn OptionSource, _layout: &PackageLayout) -> Result<()> {
        Ok(())
    }

    /// Find the external tools this backend runs
    fn locate_tools(&mut self, _options: &dyn OptionSource) -> Result<()> {
        Ok(())
    }

    /// Clear state left by an earlier run before any unit is emitted
    fn prepare(&self, _layout: &PackageLayout) -> Result<()> {
        Ok(())
    }

    /// Check a planned unit; a rejected unit is dropped with a warning
    fn validate_unit(
        &self,
        _unit: &PackagingUnit,
        _registry: &ComponentRegistry,
        _options: &dyn OptionSource,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Name other units use to depend on `unit`
    fn canonical_name(
        &self,
        unit: &PackagingUnit,
        _registry: &ComponentRegistry,
        _options: &dyn OptionSource,
    ) -> String {
        unit.package_name.clone()
    }

    /// Emit one unit, returning the produced artifacts
    ///
    /// Output left over from an earlier run must be removed first.
    fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>>;

    /// Runs once after every unit has been emitted
    fn finish(&self, _plan: &PackagingPlan, _ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Project metadata shared by all backends
#[derive(Debug, Clone, Default)]
pub struct ProjectInfo {
    pub name: String,
    pub version: String,
    pub vendor: String,
    pub summary: String,
}

impl ProjectInfo {
    pub fn from_options(options: &dyn OptionSource, fallback_name: &str) -> Self {
        Self {
            name: options
                .non_empty_option("PACKAGE_NAME")
                .unwrap_or(fallback_name)
                .to_string(),
            version: options
                .non_empty_option("PACKAGE_VERSION")
                .unwrap_or("0.0.0")
                .to_string(),
            vendor: options
                .non_empty_option("PACKAGE_VENDOR")
                .unwrap_or("Humanity")
                .to_string(),
            summary: options
                .non_empty_option("PACKAGE_DESCRIPTION_SUMMARY")
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Directories used by one generator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    /// Base file name of produced packages
    pub base_name: String,
    pub package_directory: PathBuf,
    /// Generator's own directory below `_packages`
    pub toplevel: PathBuf,
    /// Scratch directory for units, `<toplevel>/<base_name>`
    pub temp_dir: PathBuf,
    /// Where finished artifacts are copied
    pub output_prefix: PathBuf,
    /// Install tree produced by the build system
    pub staging: PathBuf,
}

impl PackageLayout {
    pub fn from_options(options: &dyn OptionSource, generator: &str) -> Result<Self> {
        let base_name = match options.non_empty_option("PACKAGE_FILE_NAME") {
            Some(name) => name.to_string(),
            None => match (
                options.non_empty_option("PACKAGE_NAME"),
                options.non_empty_option("PACKAGE_VERSION"),
            ) {
                (Some(name), Some(version)) => format!("{}-{}", name, version),
                _ => {
                    return Err(Error::config(
                        "PACKAGE_FILE_NAME not set and cannot be derived from PACKAGE_NAME and PACKAGE_VERSION",
                    ));
                }
            },
        };

        let package_directory = match options.non_empty_option("PACKAGE_DIRECTORY") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };

        let mut toplevel = package_directory.join("_packages");
        if let Some(tag) = options.non_empty_option("TOPLEVEL_TAG") {
            toplevel.push(tag);
        }
        toplevel.push(generator);

        let output_prefix = options
            .non_empty_option("OUTPUT_FILE_PREFIX")
            .map(PathBuf::from)
            .unwrap_or_else(|| package_directory.clone());
        let staging = options
            .non_empty_option("STAGING_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| package_directory.join("_install"));

        Ok(Self {
            temp_dir: toplevel.join(&base_name),
            base_name,
            package_directory,
            toplevel,
            output_prefix,
            staging,
        })
    }
}

/// Everything a backend may look at while emitting
pub struct EmitContext<'a> {
    pub generator: &'a str,
    pub options: &'a dyn OptionSource,
    pub registry: &'a ComponentRegistry,
    pub layout: &'a PackageLayout,
    pub tree: &'a InstallTree,
    pub project: &'a ProjectInfo,
    pub resolution: &'a ResolutionContext,
    pub log: &'a RunLog,
}

impl EmitContext<'_> {
    /// Location of a unit's artifact inside the generator directory
    pub fn output_path(&self, unit: &PackagingUnit) -> PathBuf {
        self.layout.toplevel.join(&unit.output_file_name)
    }

    /// Log file for an external tool
    pub fn tool_log(&self, name: &str) -> PathBuf {
        self.layout.toplevel.join(name)
    }
}

/// Remove a file or directory left over from an earlier run
pub fn remove_stale(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Copy a staged path into a destination root, creating parents
pub(crate) fn copy_entry(source: &Path, destination: &Path, is_dir: bool) -> Result<()> {
    if is_dir {
        fs::create_dir_all(destination)?;
        return Ok(());
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination)?;
    Ok(())
}

/// State of a packaging run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunState {
    Unconfigured,
    Initialized,
    Planned,
    Emitting,
    Done,
    Failed,
}

/// Artifacts produced for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    pub files: Vec<PathBuf>,
}

/// Summary of a finished run
#[derive(Debug, Clone, Default)]
pub struct PackagingReport {
    pub generator: String,
    pub method: Option<ComponentPackageMethod>,
    pub units: Vec<UnitReport>,
    /// Final artifacts in the output directory
    pub artifacts: Vec<PathBuf>,
    pub checksums: Vec<PathBuf>,
}

/// Plan computed without running a generator
#[derive(Debug)]
pub struct PlanPreview {
    pub registry: ComponentRegistry,
    pub plan: PackagingPlan,
}

/// Driver for one generator run
pub struct Generator {
    backend: Box<dyn PackagingBackend>,
    options: OptionMap,
    state: RunState,
    log: RunLog,
    registry: ComponentRegistry,
    resolution: ResolutionContext,
    project: ProjectInfo,
    layout: Option<PackageLayout>,
    tree: Option<InstallTree>,
    plan: Option<PackagingPlan>,
    checksum: Option<ChecksumAlgorithm>,
}

impl Generator {
    pub fn new(kind: GeneratorKind, options: OptionMap) -> Self {
        Self::with_backend(kind.backend(), options)
    }

    /// Drive a custom backend
    pub fn with_backend(backend: Box<dyn PackagingBackend>, options: OptionMap) -> Self {
        let log = RunLog::new(backend.name());
        Self {
            backend,
            options,
            state: RunState::Unconfigured,
            log,
            registry: ComponentRegistry::new(),
            resolution: ResolutionContext::new(),
            project: ProjectInfo::default(),
            layout: None,
            tree: None,
            plan: None,
            checksum: None,
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn layout(&self) -> Option<&PackageLayout> {
        self.layout.as_ref()
    }

    pub fn plan(&self) -> Option<&PackagingPlan> {
        self.plan.as_ref()
    }

    pub fn resolution(&self) -> &ResolutionContext {
        &self.resolution
    }

    fn expect_state(&self, expected: RunState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "{} requires state {}, generator is {}",
                operation, expected, self.state
            )));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = RunState::Failed;
        }
        result
    }

    /// Read configuration, compute the layout and locate tools
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state(RunState::Unconfigured, "initialize")?;
        let result = self
            .configure()
            .and_then(|()| self.backend.locate_tools(&self.options));
        self.track(result)?;
        self.state = RunState::Initialized;
        Ok(())
    }

    fn configure(&mut self) -> Result<()> {
        let generator = self.backend.name().to_string();
        let layout = PackageLayout::from_options(&self.options, &generator)?;
        debug!("Generator {} toplevel: {}", generator, layout.toplevel.display());

        self.checksum = self
            .options
            .non_empty_option("PACKAGE_CHECKSUM")
            .map(str::parse::<ChecksumAlgorithm>)
            .transpose()?;
        self.project = ProjectInfo::from_options(&self.options, &layout.base_name);
        self.backend.initialize(&self.options, &layout)?;
        self.tree = Some(InstallTree::new(&layout.staging));
        self.layout = Some(layout);
        Ok(())
    }

    /// Build the registry and compute the packaging units
    pub fn plan_packages(&mut self) -> Result<&PackagingPlan> {
        self.expect_state(RunState::Initialized, "plan")?;
        let result = self.plan_inner();
        self.track(result)?;
        self.state = RunState::Planned;
        self.plan
            .as_ref()
            .ok_or_else(|| Error::InvalidState("plan missing after planning".to_string()))
    }

    fn plan_inner(&mut self) -> Result<()> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| Error::InvalidState("layout missing".to_string()))?;

        if self.options.is_on("REMOVE_TOPLEVEL_DIRECTORY") && layout.toplevel.exists() {
            self.log.verbose(&format!(
                "Remove toplevel directory: {}",
                layout.toplevel.display()
            ));
            fs::remove_dir_all(&layout.toplevel)?;
        }
        fs::create_dir_all(&layout.temp_dir)?;
        self.backend.prepare(layout)?;

        self.compute_plan()?;

        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| Error::InvalidState("install tree missing".to_string()))?;
        if !tree.has_files(&self.registry)? {
            return Err(Error::config(format!(
                "cannot find any files in the staging tree {}",
                tree.root().display()
            )));
        }
        Ok(())
    }

    /// Registry, attribution and units; reads the staging tree but writes nothing
    fn compute_plan(&mut self) -> Result<()> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| Error::InvalidState("layout missing".to_string()))?;
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| Error::InvalidState("install tree missing".to_string()))?;
        let generator = self.backend.name();

        self.registry.populate(&self.options, &self.project.name);
        tree.attribute(&mut self.registry)?;

        let grouping = if wants_component_installation(
            self.backend.supports_components(),
            &self.options,
            &self.registry,
        ) {
            Some(resolve_grouping(
                &self.options,
                &self.registry,
                self.backend.default_package_method(),
            ))
        } else {
            None
        };

        let naming = FileNaming::new(
            &self.options,
            generator,
            layout.base_name.clone(),
            self.backend.output_extension(),
        );
        let mut plan = plan_units(&self.registry, grouping, &naming, &layout.temp_dir);
        plan.check_names()?;

        let backend = &self.backend;
        let registry = &self.registry;
        let options = &self.options;
        let log = &self.log;
        plan.units.retain(|unit| match backend.validate_unit(unit, registry, options) {
            Ok(()) => true,
            Err(reason) => {
                log.warning(&format!("Skipping package {}: {}", unit.label(), reason));
                false
            }
        });
        for unit in &mut plan.units {
            unit.canonical_name = backend.canonical_name(unit, registry, options);
        }

        resolve_dependencies(&mut plan, registry, options, generator, &mut self.resolution);
        self.plan = Some(plan);
        Ok(())
    }

    /// Compute the plan a run would follow, without locating tools or
    /// touching the generator directories
    pub fn into_preview(mut self) -> Result<PlanPreview> {
        self.expect_state(RunState::Unconfigured, "preview")?;
        self.configure()?;
        self.compute_plan()?;
        let plan = self
            .plan
            .take()
            .ok_or_else(|| Error::InvalidState("plan missing after planning".to_string()))?;
        Ok(PlanPreview {
            registry: self.registry,
            plan,
        })
    }

    /// Emit every planned unit and publish the artifacts
    pub fn package(&mut self) -> Result<PackagingReport> {
        self.expect_state(RunState::Planned, "package")?;
        self.state = RunState::Emitting;
        let result = self.package_inner();
        let report = self.track(result)?;
        self.state = RunState::Done;
        Ok(report)
    }

    fn package_inner(&mut self) -> Result<PackagingReport> {
        let Self {
            ref backend,
            ref options,
            ref log,
            ref registry,
            ref resolution,
            ref project,
            ref layout,
            ref tree,
            ref plan,
            checksum,
            ..
        } = *self;
        let layout = layout
            .as_ref()
            .ok_or_else(|| Error::InvalidState("layout missing".to_string()))?;
        let tree = tree
            .as_ref()
            .ok_or_else(|| Error::InvalidState("install tree missing".to_string()))?;
        let plan = plan
            .as_ref()
            .ok_or_else(|| Error::InvalidState("plan missing".to_string()))?;

        let ctx = EmitContext {
            generator: backend.name(),
            options,
            registry,
            layout,
            tree,
            project,
            resolution,
            log,
        };

        let mut report = PackagingReport {
            generator: backend.name().to_string(),
            method: plan.method(),
            ..Default::default()
        };
        let mut produced = Vec::new();

        for unit in &plan.units {
            log.output(&format!("Packaging {}", unit.label()));
            let files = backend.package(unit, &ctx)?;
            if log.error_occurred() {
                return Err(Error::Aborted);
            }
            for file in &files {
                if !file.exists() {
                    return Err(Error::MissingArtifact(file.clone()));
                }
            }
            produced.extend(files.iter().cloned());
            report.units.push(UnitReport {
                name: unit.label().to_string(),
                files,
            });
        }

        let finished = backend.finish(plan, &ctx)?;
        if log.error_occurred() {
            return Err(Error::Aborted);
        }
        produced.extend(finished);

        fs::create_dir_all(&layout.output_prefix)?;
        for file in produced {
            let Some(file_name) = file.file_name() else {
                return Err(Error::MissingArtifact(file));
            };
            let destination = layout.output_prefix.join(file_name);
            if destination != file {
                fs::copy(&file, &destination)?;
            }
            info!("Package {} generated", destination.display());

            if let Some(algorithm) = checksum {
                let checksum_file =
                    write_checksum_file(algorithm, &destination, backend.output_extension())?;
                report.checksums.push(checksum_file);
            }
            report.artifacts.push(destination);
        }

        Ok(report)
    }

    /// Initialize, plan and package in one go
    pub fn run(&mut self) -> Result<PackagingReport> {
        self.initialize()?;
        self.plan_packages()?;
        self.package()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_generator_kind_names() {
        assert_eq!(GeneratorKind::Tgz.to_string(), "TGZ");
        assert_eq!(GeneratorKind::from_str("wix").unwrap(), GeneratorKind::Wix);
        assert!(GeneratorKind::from_str("DMG").is_err());
        for kind in GeneratorKind::iter() {
            assert_eq!(kind.backend().name(), kind.to_string());
        }
    }

    #[test]
    fn test_layout_defaults() {
        let opts: OptionMap = [
            ("PACKAGE_NAME", "demo"),
            ("PACKAGE_VERSION", "1.0"),
            ("PACKAGE_DIRECTORY", "/work"),
            ("TOPLEVEL_TAG", "Linux"),
        ]
        .into_iter()
        .collect();
        let layout = PackageLayout::from_options(&opts, "TGZ").unwrap();
        assert_eq!(layout.base_name, "demo-1.0");
        assert_eq!(layout.toplevel, PathBuf::from("/work/_packages/Linux/TGZ"));
        assert_eq!(layout.temp_dir, PathBuf::from("/work/_packages/Linux/TGZ/demo-1.0"));
        assert_eq!(layout.output_prefix, PathBuf::from("/work"));
        assert_eq!(layout.staging, PathBuf::from("/work/_install"));
    }

    #[test]
    fn test_layout_requires_file_name() {
        let opts: OptionMap = [("PACKAGE_NAME", "demo")].into_iter().collect();
        let err = PackageLayout::from_options(&opts, "TGZ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let mut generator = Generator::new(GeneratorKind::Tgz, OptionMap::new());
        let err = generator.package().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(generator.state(), RunState::Unconfigured);
    }

    #[test]
    fn test_initialize_failure_is_terminal() {
        let mut generator = Generator::new(GeneratorKind::Tgz, OptionMap::new());
        assert!(generator.initialize().is_err());
        assert_eq!(generator.state(), RunState::Failed);
        assert!(matches!(generator.initialize(), Err(Error::InvalidState(_))));
    }

    /// Reports a problem through the run log instead of failing outright
    struct ComplainingBackend {
        calls: Rc<Cell<usize>>,
    }

    impl PackagingBackend for ComplainingBackend {
        fn name(&self) -> &str {
            "TGZ"
        }

        fn output_extension(&self) -> &str {
            ".tar.gz"
        }

        fn supports_components(&self) -> bool {
            true
        }

        fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
            self.calls.set(self.calls.get() + 1);
            ctx.log.error(&format!("cannot package {}", unit.label()));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_logged_error_aborts_run() {
        let temp = tempfile::tempdir().unwrap();
        for component in ["app", "lib"] {
            let dir = temp.path().join("_install").join(component);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("README"), component).unwrap();
        }
        let mut opts: OptionMap = [
            ("PACKAGE_NAME", "demo"),
            ("PACKAGE_VERSION", "1.0"),
            ("COMPONENTS_ALL", "app;lib"),
            ("COMPONENTS_GROUPING", "IGNORE"),
        ]
        .into_iter()
        .collect();
        opts.set_option("PACKAGE_DIRECTORY", temp.path().display().to_string());

        let calls = Rc::new(Cell::new(0));
        let backend = ComplainingBackend {
            calls: Rc::clone(&calls),
        };
        let mut generator = Generator::with_backend(Box::new(backend), opts);
        assert!(matches!(generator.run(), Err(Error::Aborted)));
        assert_eq!(generator.state(), RunState::Failed);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_preview_requires_fresh_generator() {
        let mut generator = Generator::new(GeneratorKind::Tgz, OptionMap::new());
        assert!(generator.initialize().is_err());
        assert!(matches!(generator.into_preview(), Err(Error::InvalidState(_))));
    }
}
