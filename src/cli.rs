// src/cli.rs
//! CLI definitions for compack
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use compack::GeneratorKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "compack")]
#[command(author = "Compack Contributors")]
#[command(version)]
#[command(about = "Component-aware packaging of staged install trees", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Project configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override an option, applied after the configuration file
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE")]
    pub defines: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build packages with one or more generators
    Package {
        #[command(flatten)]
        config: ConfigArgs,

        /// Generators to run, in order (TGZ, TXZ, TZST, EXTERNAL, IFW, NSIS, WIX)
        #[arg(short = 'G', long = "generators", value_delimiter = ',', required = true)]
        generators: Vec<GeneratorKind>,

        /// Directory receiving the finished packages
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Show how a generator would partition the project
    Plan {
        #[command(flatten)]
        config: ConfigArgs,

        /// Generator to plan for
        #[arg(short = 'G', long = "generator")]
        generator: GeneratorKind,
    },

    /// Show the declared components, groups and installation types
    Components {
        #[command(flatten)]
        config: ConfigArgs,
    },
}
