// src/main.rs

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use compack::ErrorKind;
use std::process::ExitCode;
use tracing::error;

/// Exit status for a packaging failure
const EXIT_FAILURE: u8 = 1;
/// Exit status for a configuration problem
const EXIT_CONFIG: u8 = 2;

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Package {
            config,
            generators,
            output_dir,
        } => {
            let options = commands::load_options(&config)?;
            commands::cmd_package(options, &generators, output_dir.as_deref())
        }
        Commands::Plan { config, generator } => {
            let options = commands::load_options(&config)?;
            commands::cmd_plan(options, generator)
        }
        Commands::Components { config } => {
            let options = commands::load_options(&config)?;
            commands::cmd_components(options)
        }
    }
}

/// Map a failure to the process exit status
fn exit_status(err: &anyhow::Error) -> u8 {
    let configuration = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<compack::Error>())
        .any(|e| e.kind() == ErrorKind::Configuration);
    if configuration { EXIT_CONFIG } else { EXIT_FAILURE }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generators_parse_as_list() {
        let cli = Cli::try_parse_from(["compack", "package", "-G", "tgz,WIX", "-D", "A=1"]).unwrap();
        match cli.command {
            Commands::Package {
                generators, config, ..
            } => {
                assert_eq!(
                    generators,
                    vec![compack::GeneratorKind::Tgz, compack::GeneratorKind::Wix]
                );
                assert_eq!(config.defines, vec!["A=1".to_string()]);
            }
            _ => panic!("expected package command"),
        }
    }

    #[test]
    fn test_configuration_errors_exit_with_two() {
        let err = anyhow::Error::new(compack::Error::config("missing"));
        assert_eq!(exit_status(&err), EXIT_CONFIG);
        let err = anyhow::Error::new(compack::Error::Aborted).context("TGZ generator failed");
        assert_eq!(exit_status(&err), EXIT_FAILURE);
    }
}
