// src/generator/nsis.rs

//! NSIS installer generator
//!
//! Writes an NSIS script describing the unit's components as sections and
//! its groups as section groups, stages the files next to it and runs
//! `makensis`. Installation types become `InstType` entries in index order.
//! Selecting a component selects everything it depends on; deselecting one
//! deselects everything that depends on it.

use super::{EmitContext, PackageLayout, PackagingBackend, ProjectInfo, copy_entry, remove_stale};
use crate::components::{ComponentId, ComponentRegistry, GroupId};
use crate::config::{OptionSource, key_name};
use crate::error::{Error, Result};
use crate::grouping::ComponentPackageMethod;
use crate::planner::PackagingUnit;
use crate::tool::{ToolCommand, locate_tool, run_checked};
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

/// Start menu entry created by the installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    /// Executable name without extension, relative to `$INSTDIR\bin`
    pub executable: String,
    pub label: String,
}

/// Parse `PACKAGE_EXECUTABLES` as executable/label pairs
pub fn parse_shortcuts(options: &dyn OptionSource) -> Result<Vec<Shortcut>> {
    let items = options.list_option("PACKAGE_EXECUTABLES");
    if items.len() % 2 != 0 {
        return Err(Error::config(
            "PACKAGE_EXECUTABLES should contain pairs of <executable> and <text label>",
        ));
    }
    Ok(items
        .chunks(2)
        .map(|pair| Shortcut {
            executable: pair[0].clone(),
            label: pair[1].clone(),
        })
        .collect())
}

fn windows_path(path: &str) -> String {
    path.replace('/', "\\")
}

fn translate_newlines(text: &str) -> String {
    text.replace('\n', "$\\r$\\n")
}

/// Inputs needed to render one installer script
pub struct ScriptInput<'a> {
    pub unit: &'a PackagingUnit,
    pub registry: &'a ComponentRegistry,
    pub options: &'a dyn OptionSource,
    pub project: &'a ProjectInfo,
    pub shortcuts: &'a [Shortcut],
    /// Directory holding the staged files
    pub inst_dir: &'a Path,
    pub output: &'a Path,
}

struct ScriptBuilder<'a> {
    input: &'a ScriptInput<'a>,
    members: HashSet<ComponentId>,
    sections: String,
    macros: String,
    descriptions: String,
}

impl<'a> ScriptBuilder<'a> {
    fn new(input: &'a ScriptInput<'a>) -> Self {
        Self {
            input,
            members: input.unit.components.iter().copied().collect(),
            sections: String::new(),
            macros: String::new(),
            descriptions: String::new(),
        }
    }

    /// Components of this unit that can become sections
    fn is_emitted(&self, id: ComponentId) -> bool {
        self.members.contains(&id) && !self.input.registry.component(id).files.is_empty()
    }

    fn group_has_content(&self, id: GroupId) -> bool {
        let group = self.input.registry.group(id);
        group.components.iter().any(|&c| self.is_emitted(c))
            || group.subgroups.iter().any(|&g| self.group_has_content(g))
    }

    fn install_directory(&self, component: &str) -> String {
        self.input
            .options
            .non_empty_option(&format!("NSIS_{}_INSTALL_DIRECTORY", key_name(component)))
            .unwrap_or("$INSTDIR")
            .to_string()
    }

    fn group_section(&mut self, id: GroupId) -> fmt::Result {
        let registry = self.input.registry;
        if !self.group_has_content(id) {
            // NSIS rejects empty section groups
            return Ok(());
        }
        let group = registry.group(id);
        self.sections.push_str("SectionGroup ");
        if group.is_expanded_by_default {
            self.sections.push_str("/e ");
        }
        let bold = if group.is_bold { "!" } else { "" };
        writeln!(self.sections, "\"{}{}\" {}", bold, group.display_name, group.name)?;

        for &subgroup in &group.subgroups {
            self.group_section(subgroup)?;
        }
        for &component in &group.components {
            if self.is_emitted(component) {
                self.component_section(component)?;
            }
        }
        self.sections.push_str("SectionGroupEnd\n");

        if !group.description.is_empty() {
            writeln!(
                self.descriptions,
                "  !insertmacro MUI_DESCRIPTION_TEXT ${{{}}} \"{}\"",
                group.name,
                translate_newlines(&group.description)
            )?;
        }
        Ok(())
    }

    fn component_section(&mut self, id: ComponentId) -> fmt::Result {
        let registry = self.input.registry;
        let component = registry.component(id);
        let output_dir = self.install_directory(&component.name);

        let code = &mut self.sections;
        code.push_str("Section ");
        if component.is_disabled_by_default {
            code.push_str("/o ");
        }
        let hidden = if component.is_hidden { "-" } else { "" };
        writeln!(code, "\"{}{}\" {}", hidden, component.display_name, component.name)?;
        if component.is_required {
            code.push_str("  SectionIn RO\n");
        } else if !component.installation_types.is_empty() {
            code.push_str("  SectionIn");
            for &type_id in &component.installation_types {
                write!(code, " {}", registry.installation_type(type_id).index)?;
            }
            code.push('\n');
        }
        writeln!(code, "  SetOutPath \"{}\"", output_dir)?;
        writeln!(code, "  File /r \"${{INST_DIR}}\\{}\\*.*\"", component.name)?;
        code.push_str("SectionEnd\n");

        if !component.description.is_empty() {
            writeln!(
                self.descriptions,
                "  !insertmacro MUI_DESCRIPTION_TEXT ${{{}}} \"{}\"",
                component.name,
                translate_newlines(&component.description)
            )?;
        }

        // Sections outside this installer cannot be toggled from it
        let depends: Vec<ComponentId> = registry
            .dependency_closure(id)
            .into_iter()
            .filter(|&dep| self.is_emitted(dep))
            .collect();
        let dependents: Vec<ComponentId> = registry
            .reverse_dependency_closure(id)
            .into_iter()
            .filter(|&dep| self.is_emitted(dep))
            .collect();

        let macros = &mut self.macros;
        writeln!(macros, "!macro Remove_{}", component.name)?;
        writeln!(
            macros,
            "  IntCmp ${}_was_installed 0 noremove_{}",
            component.name, component.name
        )?;
        for file in &component.files {
            writeln!(macros, "  Delete \"{}\\{}\"", output_dir, windows_path(file))?;
        }
        for dir in component.directories.iter().rev() {
            writeln!(macros, "  RMDir \"{}\\{}\"", output_dir, windows_path(dir))?;
        }
        writeln!(macros, "  noremove_{}:", component.name)?;
        macros.push_str("!macroend\n");

        writeln!(macros, "!macro Select_{}_depends", component.name)?;
        for dep in depends {
            let name = &registry.component(dep).name;
            writeln!(macros, "  SectionGetFlags ${{{}}} $0", name)?;
            macros.push_str("  IntOp $0 $0 | ${SF_SELECTED}\n");
            writeln!(macros, "  SectionSetFlags ${{{}}} $0", name)?;
            writeln!(macros, "  IntOp ${}_selected 0 + ${{SF_SELECTED}}", name)?;
        }
        macros.push_str("!macroend\n");

        writeln!(macros, "!macro Deselect_required_by_{}", component.name)?;
        for dep in dependents {
            let name = &registry.component(dep).name;
            writeln!(macros, "  SectionGetFlags ${{{}}} $0", name)?;
            macros.push_str("  IntOp $1 ${SF_SELECTED} ~\n");
            macros.push_str("  IntOp $0 $0 & $1\n");
            writeln!(macros, "  SectionSetFlags ${{{}}} $0", name)?;
            writeln!(macros, "  IntOp ${}_selected 0 + 0", name)?;
        }
        macros.push_str("!macroend\n");
        Ok(())
    }

    /// Emitted components in section order
    fn emitted_components(&self) -> Vec<ComponentId> {
        self.input
            .registry
            .component_ids()
            .filter(|&id| self.is_emitted(id))
            .collect()
    }

    fn build(mut self) -> std::result::Result<String, fmt::Error> {
        let input = self.input;
        let registry = input.registry;
        let project = input.project;
        let install_dir = input
            .options
            .non_empty_option("NSIS_INSTALL_DIRECTORY")
            .unwrap_or(&project.name);
        let start_menu = input
            .options
            .non_empty_option("NSIS_START_MENU")
            .unwrap_or(&project.name);
        let component_install = !input.unit.is_monolithic();

        let mut script = String::new();
        script.push_str("; Generated by compack\n");
        writeln!(script, "!define INST_DIR \"{}\"", input.inst_dir.display())?;
        writeln!(script, "Name \"{} {}\"", project.name, project.version)?;
        writeln!(script, "OutFile \"{}\"", input.output.display())?;
        writeln!(script, "InstallDir \"$PROGRAMFILES\\{}\"", install_dir)?;
        script.push_str("RequestExecutionLevel admin\n");
        script.push_str("!include \"MUI2.nsh\"\n!include \"Sections.nsh\"\n\n");

        script.push_str("!insertmacro MUI_PAGE_WELCOME\n");
        if component_install {
            script.push_str("!insertmacro MUI_PAGE_COMPONENTS\n");
        }
        script.push_str("!insertmacro MUI_PAGE_DIRECTORY\n!insertmacro MUI_PAGE_INSTFILES\n");
        script.push_str("!insertmacro MUI_UNPAGE_INSTFILES\n!insertmacro MUI_LANGUAGE \"English\"\n\n");

        let mut emitted = Vec::new();
        if component_install {
            for install_type in registry.installation_types() {
                writeln!(script, "InstType \"{}\"", install_type.display_name)?;
            }

            emitted = self.emitted_components();
            for &id in &emitted {
                let name = &registry.component(id).name;
                writeln!(script, "Var {}_selected", name)?;
                writeln!(script, "Var {}_was_installed", name)?;
            }
            script.push('\n');

            for group in registry.top_level_groups() {
                self.group_section(group)?;
            }
            for &id in &emitted {
                if registry.component(id).group.is_none() {
                    self.component_section(id)?;
                }
            }
        }

        script.push_str("Section \"-Core installation\"\n  SetOutPath \"$INSTDIR\"\n");
        if !component_install {
            script.push_str("  File /r \"${INST_DIR}\\*.*\"\n");
        }
        script.push_str("  WriteUninstaller \"$INSTDIR\\Uninstall.exe\"\n");
        if !input.shortcuts.is_empty() {
            writeln!(script, "  CreateDirectory \"$SMPROGRAMS\\{}\"", start_menu)?;
            for shortcut in input.shortcuts {
                writeln!(
                    script,
                    "  CreateShortCut \"$SMPROGRAMS\\{}\\{}.lnk\" \"$INSTDIR\\bin\\{}.exe\"",
                    start_menu, shortcut.label, shortcut.executable
                )?;
            }
        }
        script.push_str("SectionEnd\n\n");

        script.push_str(&self.sections);
        script.push('\n');
        script.push_str(&self.macros);

        if !emitted.is_empty() {
            script.push_str("\nFunction .onSelChange\n");
            for &id in &emitted {
                let name = &registry.component(id).name;
                writeln!(
                    script,
                    "  !insertmacro SectionFlagIsSet ${{{0}}} ${{SF_SELECTED}} {0}_on {0}_off",
                    name
                )?;
                writeln!(script, "  {}_on:", name)?;
                writeln!(script, "  !insertmacro Select_{}_depends", name)?;
                writeln!(script, "  Goto {}_done", name)?;
                writeln!(script, "  {}_off:", name)?;
                writeln!(script, "  !insertmacro Deselect_required_by_{}", name)?;
                writeln!(script, "  {}_done:", name)?;
            }
            script.push_str("FunctionEnd\n");
        }

        if !self.descriptions.is_empty() {
            script.push_str("\n!insertmacro MUI_FUNCTION_DESCRIPTION_BEGIN\n");
            script.push_str(&self.descriptions);
            script.push_str("!insertmacro MUI_FUNCTION_DESCRIPTION_END\n");
        }

        script.push_str("\nSection \"Uninstall\"\n");
        for &id in &emitted {
            writeln!(script, "  !insertmacro Remove_{}", registry.component(id).name)?;
        }
        for shortcut in input.shortcuts {
            writeln!(
                script,
                "  Delete \"$SMPROGRAMS\\{}\\{}.lnk\"",
                start_menu, shortcut.label
            )?;
        }
        if !input.shortcuts.is_empty() {
            writeln!(script, "  RMDir \"$SMPROGRAMS\\{}\"", start_menu)?;
        }
        script.push_str("  Delete \"$INSTDIR\\Uninstall.exe\"\n  RMDir \"$INSTDIR\"\nSectionEnd\n");
        Ok(script)
    }
}

/// Render the NSIS script for a unit
pub fn render_script(input: &ScriptInput<'_>) -> Result<String> {
    Ok(ScriptBuilder::new(input).build()?)
}

/// Backend producing NSIS installers
#[derive(Debug, Default)]
pub struct NsisBackend {
    makensis: Option<PathBuf>,
    shortcuts: Vec<Shortcut>,
}

impl NsisBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PackagingBackend for NsisBackend {
    fn name(&self) -> &str {
        "NSIS"
    }

    fn output_extension(&self) -> &str {
        ".exe"
    }

    fn supports_components(&self) -> bool {
        true
    }

    fn default_package_method(&self) -> ComponentPackageMethod {
        ComponentPackageMethod::OnePackage
    }

    fn initialize(&mut self, options: &dyn OptionSource, _layout: &PackageLayout) -> Result<()> {
        self.shortcuts = parse_shortcuts(options)?;
        Ok(())
    }

    fn locate_tools(&mut self, options: &dyn OptionSource) -> Result<()> {
        self.makensis = Some(locate_tool(options, "NSIS", "makensis", "makensis")?);
        Ok(())
    }

    fn package(&self, unit: &PackagingUnit, ctx: &EmitContext<'_>) -> Result<Vec<PathBuf>> {
        let output = ctx.output_path(unit);
        remove_stale(&output)?;
        remove_stale(&unit.working_directory)?;

        // Component files are staged per component, as the sections expect
        if unit.is_monolithic() {
            for entry in ctx.tree.unit_entries(ctx.registry, &[])? {
                copy_entry(&entry.source, &unit.working_directory.join(&entry.relative), entry.is_dir)?;
            }
        } else {
            for &id in &unit.components {
                let name = &ctx.registry.component(id).name;
                let target = unit.working_directory.join(name);
                for entry in ctx.tree.unit_entries(ctx.registry, &[id])? {
                    copy_entry(&entry.source, &target.join(&entry.relative), entry.is_dir)?;
                }
            }
        }
        std::fs::create_dir_all(&unit.working_directory)?;

        let script = render_script(&ScriptInput {
            unit,
            registry: ctx.registry,
            options: ctx.options,
            project: ctx.project,
            shortcuts: &self.shortcuts,
            inst_dir: &unit.working_directory,
            output: &output,
        })?;
        let script_path = ctx
            .layout
            .toplevel
            .join(format!("{}.nsi", unit.package_name));
        std::fs::write(&script_path, script)?;

        let makensis = self
            .makensis
            .as_ref()
            .ok_or_else(|| Error::InvalidState("makensis was not located".to_string()))?;
        let command = ToolCommand::new(makensis)
            .arg(&script_path)
            .current_dir(&ctx.layout.toplevel);
        run_checked(&command, &ctx.tool_log("NSISOutput.log"))?;
        Ok(vec![output])
    }
}
