//! Error types for silentcheck

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using silentcheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// silentcheck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Staging error: {0}")]
    Staging(String),
}

impl Error {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Usage(_) => ExitCode::UsageError,
            Error::Io(_) | Error::Serialization(_) | Error::Data(_) => ExitCode::DataError,
            Error::Staging(_) => ExitCode::Incomplete,
            Error::InvariantViolation(_) => ExitCode::InvariantViolation,
        }
    }
}

/// Process exit codes exposed to CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    Success,
    Findings,
    Incomplete,
    InvariantViolation,
    UsageError,
    DataError,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Findings => 20,
            ExitCode::Incomplete => 30,
            ExitCode::InvariantViolation => 50,
            ExitCode::UsageError => 64,
            ExitCode::DataError => 65,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(Error::Usage("bad".into()).exit_code().code(), 64);
        assert_eq!(Error::Data("bad".into()).exit_code().code(), 65);
        assert_eq!(Error::InvariantViolation("dup".into()).exit_code().code(), 50);
        assert_eq!(Error::Staging("rename".into()).exit_code().code(), 30);
    }
}
