//! Template loading errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template {0} is not a yaml or json file")]
    UnsupportedFormat(PathBuf),

    #[error("Unknown tag !{0}")]
    UnknownTag(String),

    #[error("Mapping key must be a scalar: {0}")]
    InvalidKey(String),

    #[error("Number {0} cannot be represented in JSON")]
    InvalidNumber(String),

    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
