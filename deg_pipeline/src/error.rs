//! Error types for the differential-expression view pipeline

use std::path::{Path, PathBuf};

use polars::prelude::PolarsError;
use thiserror::Error;

/// Everything that can abort a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("No '{key}' values shared between '{left}' and '{right}' (check identifier normalization)")]
    JoinKeyMismatch {
        left: String,
        right: String,
        key: String,
    },

    #[error("Invalid run configuration: {reason}")]
    Config { reason: String },

    #[error("External tool '{tool}' failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("Failed to render {}: {reason}", path.display())]
    Render { path: PathBuf, reason: String },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn malformed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedInput {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        PipelineError::Config {
            reason: reason.into(),
        }
    }

    pub fn render(path: impl AsRef<Path>, err: impl std::fmt::Display) -> Self {
        PipelineError::Render {
            path: path.as_ref().to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_names_file() {
        let err = PipelineError::malformed("data/de.tsv", "column 'padj' not found");
        let msg = err.to_string();
        assert!(msg.contains("data/de.tsv"));
        assert!(msg.contains("padj"));
    }

    #[test]
    fn polars_errors_convert() {
        let err: PipelineError = PolarsError::ComputeError("boom".into()).into();
        assert!(matches!(err, PipelineError::Polars(_)));
    }
}
