//! Error types for scenario testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Scenario not found: {0}")]
    NotFound(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] silentcheck_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
