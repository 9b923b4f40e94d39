use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitCopyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Rule compilation error: {0}")]
    Rules(#[from] crate::scrub::RulesError),

    #[error("Filter error: {0}")]
    Filter(#[from] crate::scrub::FilterError),

    #[error("Validation error: {0}")]
    Validate(#[from] crate::scrub::ValidateError),

    #[error("Git error: {0}")]
    Git(#[from] crate::git::GitError),

    #[error("Sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Unsupported config version: {0}")]
    UnsupportedConfigVersion(u32),

    #[error("private_username is required")]
    MissingPrivate,

    #[error("Duplicate target label: {0}")]
    DuplicateTargetLabel(String),

    #[error("Target '{target}' is missing required field '{field}'")]
    MissingTargetField {
        target: String,
        field: &'static str,
    },

    #[error("Target '{target}' has invalid initial_history_mode '{value}' (expected 'full' or 'future')")]
    InvalidHistoryMode { target: String, value: String },

    #[error("git-copy config not found in working tree or main/master of '{0}'")]
    NotFound(PathBuf),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GitCopyError>;
