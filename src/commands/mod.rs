// src/commands/mod.rs

//! Command handlers for the compack CLI

mod components;
mod package;
mod plan;

pub use components::cmd_components;
pub use package::cmd_package;
pub use plan::cmd_plan;

use crate::cli::ConfigArgs;
use anyhow::{Context, Result};
use compack::OptionMap;

/// Load the configuration file and apply `-D` overrides on top
pub fn load_options(args: &ConfigArgs) -> Result<OptionMap> {
    let mut options = match &args.config {
        Some(path) => OptionMap::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => OptionMap::new(),
    };
    for define in &args.defines {
        options.apply_override(define)?;
    }
    Ok(options)
}
