//! Errors of the runner.

use fia_exposure::ExposureError;
use fia_raster::RasterError;
use thiserror::Error;

/// Errors that can occur while running a job from the command line.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Exposure(#[from] ExposureError),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Missing or conflicting command line arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// `check` found datasets that cannot be used.
    #[error("{0} dataset(s) failed the check")]
    CheckFailed(usize),
}

impl RunnerError {
    /// Message for the person running the tool.
    pub fn user_message(&self) -> String {
        match self {
            RunnerError::Exposure(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    /// Source location of an engine failure, when known.
    pub fn location(&self) -> Option<(&'static str, u32)> {
        match self {
            RunnerError::Exposure(ExposureError::Engine { file, line, .. }) => Some((file, *line)),
            _ => None,
        }
    }
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
