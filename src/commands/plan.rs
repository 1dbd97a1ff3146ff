// src/commands/plan.rs

//! Plan command: show the packaging units a generator would produce

use anyhow::Result;
use compack::{Generator, GeneratorKind, OptionMap};

pub fn cmd_plan(options: OptionMap, kind: GeneratorKind) -> Result<()> {
    let preview = Generator::new(kind, options).into_preview()?;
    let registry = &preview.registry;
    let plan = &preview.plan;

    match &plan.grouping {
        Some(decision) => {
            print!("Method: {}", decision.method);
            if let Some(requested) = decision.requested.filter(|&r| r != decision.method) {
                print!(" (requested {})", requested);
            }
            if decision.demoted {
                print!(" (demoted: no groups)");
            }
            println!();
        }
        None => println!("Method: monolithic"),
    }

    for unit in &plan.units {
        println!("{} -> {}", unit.label(), unit.output_file_name);
        if unit.canonical_name != unit.package_name {
            println!("  name: {}", unit.canonical_name);
        }
        if !unit.components.is_empty() {
            let names: Vec<&str> = unit
                .components
                .iter()
                .map(|&id| registry.component(id).name.as_str())
                .collect();
            println!("  components: {}", names.join(", "));
        }
        let dependencies = unit.dependencies.merged();
        if !dependencies.is_empty() {
            let rendered: Vec<String> = dependencies.iter().map(ToString::to_string).collect();
            println!("  depends: {}", rendered.join(", "));
        }
    }
    Ok(())
}
