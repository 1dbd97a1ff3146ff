// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Project configuration file (TOML)")
}

/// Common argument: option override
fn define_arg() -> Arg {
    Arg::new("define")
        .short('D')
        .long("define")
        .value_name("KEY=VALUE")
        .action(ArgAction::Append)
        .help("Override an option, applied after the configuration file")
}

fn build_cli() -> Command {
    Command::new("compack")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Compack Contributors")
        .about("Component-aware packaging of staged install trees")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .subcommand(
            Command::new("package")
                .about("Build packages with one or more generators")
                .arg(config_arg())
                .arg(define_arg())
                .arg(
                    Arg::new("generators")
                        .short('G')
                        .long("generators")
                        .required(true)
                        .value_delimiter(',')
                        .help("Generators to run, in order (TGZ, TXZ, TZST, EXTERNAL, IFW, NSIS, WIX)"),
                )
                .arg(
                    Arg::new("output_dir")
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Directory receiving the finished packages"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Show how a generator would partition the project")
                .arg(config_arg())
                .arg(define_arg())
                .arg(
                    Arg::new("generator")
                        .short('G')
                        .long("generator")
                        .required(true)
                        .help("Generator to plan for"),
                ),
        )
        .subcommand(
            Command::new("components")
                .about("Show the declared components, groups and installation types")
                .arg(config_arg())
                .arg(define_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("compack.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
