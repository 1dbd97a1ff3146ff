// src/commands/package.rs

//! Package command: run generators over the staged tree

use anyhow::{Context, Result};
use compack::{Generator, GeneratorKind, OptionMap};
use std::path::Path;
use tracing::info;

/// Run each generator in order, stopping at the first failure
pub fn cmd_package(
    mut options: OptionMap,
    generators: &[GeneratorKind],
    output_dir: Option<&Path>,
) -> Result<()> {
    if let Some(dir) = output_dir {
        options.set_option("OUTPUT_FILE_PREFIX", dir.display().to_string());
    }

    for &kind in generators {
        info!("Running generator {}", kind);
        let mut generator = Generator::new(kind, options.clone());
        let report = generator
            .run()
            .with_context(|| format!("{} generator failed", kind))?;

        match report.method {
            Some(method) => println!("{}: {} package(s), {}", kind, report.units.len(), method),
            None => println!("{}: monolithic package", kind),
        }
        for artifact in &report.artifacts {
            println!("  {}", artifact.display());
        }
        for checksum in &report.checksums {
            println!("  {}", checksum.display());
        }
    }
    Ok(())
}
