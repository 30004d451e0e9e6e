//! Errors raised while loading options and fixtures.

use crate::matching::RestrictionError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unknown file type: {0}")]
    UnknownFileType(String),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to list fixture files: {0}")]
    Glob(#[from] glob::GlobError),
    #[error(transparent)]
    Restriction(#[from] RestrictionError),
}
