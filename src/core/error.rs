use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::gatekeeper::BlockReason;

#[derive(Error, Debug)]
pub enum GatehouseError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("InvalidRegistration: {0}")]
    InvalidRegistration(String),
    #[error("Tool {0} not found")]
    ToolNotFound(String),
    #[error("MissingArgument: {tool} requires {argument}")]
    MissingArgument {
        tool: &'static str,
        argument: &'static str,
    },
    #[error("InvalidIntent: {id} not found in {source_file}")]
    InvalidIntent { id: String, source_file: String },
    #[error("UnsupportedFormat: {0}")]
    UnsupportedFormat(String),
    #[error("EmptyInput: {0}")]
    EmptyInput(String),
    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),
    #[error("Path escapes workspace: {}", .0.display())]
    PathEscapesWorkspace(PathBuf),
    #[error("approve_patch rolled back at {staged}: {reason}; no files were applied")]
    ApprovalRolledBack { staged: String, reason: String },
    #[error("Gate blocked request: {0}")]
    GateBlocked(BlockReason),
    #[error("Model client error: {0}")]
    ModelError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
