use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SfmError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("YAML Parsing Error: {0}")]
    Yaml(#[from] Arc<serde_yaml::Error>),

    #[error("Git Error: {0}")]
    Git(#[from] Arc<git2::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Constraint Format Error: {0}")]
    ConstraintFormat(String),

    #[error("Constraint Resolution Error: {0}")]
    ConstraintResolution(String),

    #[error("Remote Connection Error: {0}")]
    RemoteConnection(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("Install Error: {0}")]
    Install(String),

    #[error("Requirements Update Error: {0}")]
    RequirementsUpdate(String),
}

impl From<std::io::Error> for SfmError {
    fn from(err: std::io::Error) -> Self {
        SfmError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for SfmError {
    fn from(err: reqwest::Error) -> Self {
        SfmError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for SfmError {
    fn from(err: serde_json::Error) -> Self {
        SfmError::Json(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for SfmError {
    fn from(err: serde_yaml::Error) -> Self {
        SfmError::Yaml(Arc::new(err))
    }
}

impl From<git2::Error> for SfmError {
    fn from(err: git2::Error) -> Self {
        SfmError::Git(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, SfmError>;
