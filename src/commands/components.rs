// src/commands/components.rs

//! Components command: print the declared component model

use anyhow::Result;
use compack::{ComponentId, ComponentRegistry, GroupId, OptionMap, OptionSource};

pub fn cmd_components(options: OptionMap) -> Result<()> {
    let project = options.non_empty_option("PACKAGE_NAME").unwrap_or("project");
    let mut registry = ComponentRegistry::new();
    registry.populate(&options, project);

    if !registry.has_components() && !registry.has_groups() {
        println!("No components declared");
        return Ok(());
    }

    for group in registry.top_level_groups() {
        print_group(&registry, group, 0);
    }
    let orphans = registry.orphan_components();
    if !orphans.is_empty() {
        println!("(ungrouped)");
        for id in orphans {
            println!("  {}", describe_component(&registry, id));
        }
    }

    if !registry.installation_types().is_empty() {
        println!();
        println!("Installation types:");
        for install_type in registry.installation_types() {
            println!(
                "  {}. {} ({})",
                install_type.index, install_type.display_name, install_type.name
            );
        }
    }

    let edges: Vec<String> = registry
        .component_ids()
        .flat_map(|id| {
            let component = registry.component(id);
            component
                .dependencies
                .iter()
                .map(|&dep| format!("{} -> {}", component.name, registry.component(dep).name))
                .collect::<Vec<_>>()
        })
        .collect();
    if !edges.is_empty() {
        println!();
        println!("Dependencies:");
        for edge in edges {
            println!("  {}", edge);
        }
    }
    Ok(())
}

fn print_group(registry: &ComponentRegistry, id: GroupId, depth: usize) {
    let indent = "  ".repeat(depth);
    let group = registry.group(id);
    println!("{}[{}] {}", indent, group.name, group.display_name);
    for &subgroup in &group.subgroups {
        print_group(registry, subgroup, depth + 1);
    }
    for &component in &group.components {
        println!("{}  {}", indent, describe_component(registry, component));
    }
}

fn describe_component(registry: &ComponentRegistry, id: ComponentId) -> String {
    let component = registry.component(id);
    let mut flags = Vec::new();
    if component.is_required {
        flags.push("required");
    }
    if component.is_hidden {
        flags.push("hidden");
    }
    if component.is_disabled_by_default {
        flags.push("disabled");
    }
    if component.is_downloaded {
        flags.push("downloaded");
    }
    if flags.is_empty() {
        component.name.clone()
    } else {
        format!("{} ({})", component.name, flags.join(", "))
    }
}
