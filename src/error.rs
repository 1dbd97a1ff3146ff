// src/error.rs

//! Crate-wide error type
//!
//! Failures fall into three tiers. Warnings never become errors: they are
//! logged and the offending record is skipped. Everything returned through
//! [`Error`] stops the current packaging run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout compack
pub type Result<T> = std::result::Result<T, Error>;

/// How far an error reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A configuration step failed; nothing was emitted for it
    Configuration,
    /// A packaging unit failed while being emitted
    Unit,
    /// The process cannot continue (I/O, state machine misuse)
    Fatal,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Required option missing or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// An external tool could not be located
    #[error("unable to locate {tool}: set {option} or add it to PATH")]
    ToolNotFound { tool: String, option: String },

    /// An external tool failed to start or exited non-zero
    #[error("problem running {tool} (exit code {exit_code}); please check {} for errors", .log.display())]
    ToolFailed {
        tool: String,
        exit_code: i32,
        log: PathBuf,
    },

    /// Identifier generation ran out of disambiguation suffixes
    #[error("error while trying to generate a unique id for '{0}'")]
    IdAmbiguity(String),

    /// A backend reported success but the expected artifact is missing
    #[error("package file was not produced: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to render installer script: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("failed to parse configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to walk staging tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// An ERROR was logged earlier in the run
    #[error("packaging aborted after an earlier error")]
    Aborted,

    /// A generator operation was called out of order
    #[error("invalid generator state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Create a configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify the error into its tier
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::ToolNotFound { .. } | Self::TomlParse(_) => {
                ErrorKind::Configuration
            }
            Self::ToolFailed { .. }
            | Self::IdAmbiguity(_)
            | Self::MissingArtifact(_)
            | Self::Json(_)
            | Self::Xml(_)
            | Self::Format(_)
            | Self::Aborted => ErrorKind::Unit,
            Self::Io(_) | Self::Walk(_) | Self::InvalidState(_) => ErrorKind::Fatal,
        }
    }
}
