//! Error taxonomy for the query pipeline.
//!
//! Configuration problems abort before any request is made, transport
//! failures end a single session, and malformed template input only ever
//! fails the job it belongs to.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::config::data::path_display;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Profile '{name}' not found in {}", path_display(.path))]
    MissingProfile { name: String, path: PathBuf },

    #[error("Profile '{profile}' is missing credential field '{field}'")]
    MissingCredential { profile: String, field: &'static str },

    #[error("Profile '{profile}' references unknown credentials '{credentials}'")]
    UnknownCredentials { profile: String, credentials: String },

    #[error(
        "System prompt '{name}' not found in {}; prompts are [sections] with a 'prompt' key",
        path_display(.path)
    )]
    MissingPrompt { name: String, path: PathBuf },

    #[error("Invalid re-think pattern: {0}")]
    RethinkPattern(#[from] regex::Error),

    #[error("Invalid tool '{name}': {reason}")]
    Tool { name: String, reason: String },

    #[error("Could not determine a model for profile '{0}'; set `model` in the profile")]
    NoModel(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Api(String),

    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{source}")]
    Transport {
        #[source]
        source: TransportError,
        partial: String,
    },

    #[error("Response cancelled")]
    Cancelled { partial: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl SessionError {
    /// Visible text that reached the sink before the session ended.
    pub fn partial(&self) -> &str {
        match self {
            SessionError::Transport { partial, .. } | SessionError::Cancelled { partial } => {
                partial
            }
            SessionError::Output(_) => "",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedInputError {
    #[error("variable '{0}' is not defined")]
    MissingVariable(String),

    #[error("template field '{0}' is missing or not a string")]
    MissingTemplateField(String),

    #[error("record {line} is not valid JSON: {reason}")]
    Record { line: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to read job source: {0}")]
    Source(#[source] io::Error),

    #[error("Inline variables are not valid JSON: {0}")]
    InlineVariables(#[source] serde_json::Error),

    #[error("Inline variables must be an object or an array of objects")]
    InlineShape,

    #[error("Failed to write results: {0}")]
    Sink(#[source] io::Error),
}

/// A tool call that could not be carried out. Reported back to the model as
/// the tool's output rather than ending the chat.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    Unknown(String),

    #[error("tool '{0}' is disabled")]
    Disabled(String),

    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("failed to start '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("'{name}' exited with {status}: {stderr}")]
    Failed {
        name: String,
        status: String,
        stderr: String,
    },
}
