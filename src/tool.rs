// src/tool.rs

//! External packaging tool invocation
//!
//! Installer backends hand their prepared inputs to tools such as
//! `makensis`, `candle`/`light` or `binarycreator`. Running a tool never
//! returns an error by itself: a process that cannot be started is reported
//! as exit code `-1` with the spawn error as its output. [`run_checked`]
//! turns a failure into [`Error::ToolFailed`] after persisting the captured
//! output to a log file.

use crate::config::{OptionSource, key_name};
use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// A command line to run
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Program file name, used in messages
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Shell-like rendering of the command line
    pub fn display(&self) -> String {
        let mut parts = vec![quote(&self.program.to_string_lossy())];
        parts.extend(self.args.iter().map(|a| quote(&a.to_string_lossy())));
        parts.join(" ")
    }
}

fn quote(part: &str) -> String {
    if part.is_empty() || part.contains(char::is_whitespace) {
        format!("\"{}\"", part)
    } else {
        part.to_string()
    }
}

/// Captured result of a tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Combined stdout and stderr
    pub output: String,
    /// Exit code; `-1` when the process could not be started or was killed
    pub exit_code: i32,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command to completion, capturing its output
pub fn run(command: &ToolCommand) -> ToolOutput {
    debug!("Running: {}", command.display());

    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &command.current_dir {
        process.current_dir(dir);
    }

    match process.output() {
        Ok(result) => {
            let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
            output.push_str(&String::from_utf8_lossy(&result.stderr));
            ToolOutput {
                output,
                exit_code: result.status.code().unwrap_or(-1),
            }
        }
        Err(e) => ToolOutput {
            output: format!("failed to start {}: {}", command.program.display(), e),
            exit_code: -1,
        },
    }
}

/// Run a command, appending its output to `log_file`
///
/// A non-zero exit code is logged at error level and returned as
/// [`Error::ToolFailed`] naming the log file.
pub fn run_checked(command: &ToolCommand, log_file: &Path) -> Result<ToolOutput> {
    let result = run(command);

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    writeln!(log, "# Run command: {}", command.display())?;
    writeln!(log, "# Output:")?;
    writeln!(log, "{}", result.output)?;

    if !result.success() {
        let tool = command.tool_name();
        error!(
            "Problem running {} (exit code {}). Please check {} for errors",
            tool,
            result.exit_code,
            log_file.display()
        );
        return Err(Error::ToolFailed {
            tool,
            exit_code: result.exit_code,
            log: log_file.to_path_buf(),
        });
    }
    Ok(result)
}

/// Find a packaging tool
///
/// `<GEN>_<TOOL>_EXECUTABLE` wins when set; otherwise the executable is
/// searched for on `PATH`.
pub fn locate_tool(
    options: &dyn OptionSource,
    generator: &str,
    tool: &str,
    executable: &str,
) -> Result<PathBuf> {
    let option = format!("{}_{}_EXECUTABLE", key_name(generator), key_name(tool));
    if let Some(path) = options.non_empty_option(&option) {
        debug!("Using {} from {}: {}", tool, option, path);
        return Ok(PathBuf::from(path));
    }
    which::which(executable).map_err(|_| Error::ToolNotFound {
        tool: executable.to_string(),
        option,
    })
}
