// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline definition error: {0}")]
    Definition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pipeline contains no steps")]
    EmptyPipeline,

    #[error("Start index {start} is out of range for a pipeline of {len} steps")]
    StartIndexOutOfRange { start: usize, len: usize },

    #[error("Invalid step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("Pipeline worker stopped unexpectedly: {0}")]
    Worker(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid_step(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            index,
            reason: reason.into(),
        }
    }
}

/// Failure of a single step. Never propagated out of the executor; it travels
/// inside [`crate::pipeline::StepOutcome::Failed`].
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Unit not found: {}", .path.display())]
    UnitNotFound { path: PathBuf },

    #[error("{unit} exited with {}: {stderr}", exit_label(.exit_code))]
    ExecutionFailure {
        unit: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch {unit}: {source}")]
    Spawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{unit} failed: {message}")]
    Routine { unit: String, message: String },

    #[error("{unit} panicked: {message}")]
    Panicked { unit: String, message: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
