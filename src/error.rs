use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LabelerError {
    #[error("invalid dataset identifier: {0}")]
    InvalidIdentifier(String),

    #[error("missing config file ipeds-labeler.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download request failed: {0}")]
    Http(String),

    #[error("download returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("failed to read table {path}: {message}")]
    Csv { path: String, message: String },

    #[error("no {kind} file for {identifier} in {dir}")]
    MissingExtracted {
        kind: String,
        identifier: String,
        dir: String,
    },

    #[error("failed to parse artifact {path}: {message}")]
    ArtifactParse { path: String, message: String },

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),
}

impl LabelerError {
    pub fn is_network(&self) -> bool {
        matches!(self, LabelerError::Http(_) | LabelerError::HttpStatus { .. })
    }
}
