// file: src/utils/validation.rs
// description: path checks run before a pipeline is started
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use crate::models::PipelineDefinition;
use crate::registry::{InvocationMode, UnitRegistry};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Validator;

impl Validator {
    pub fn validate_file_path(path: &Path) -> Result<()> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            PipelineError::Validation(format!(
                "Cannot canonicalize path {}: {}",
                path.display(),
                e
            ))
        })?;

        if !canonical.is_file() {
            return Err(PipelineError::Validation(format!(
                "Path is not a file: {}",
                canonical.display()
            )));
        }

        Ok(())
    }

    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Out-of-process units whose files are absent under `root`, with their
    /// step index. The run itself only discovers these when it reaches them.
    pub fn missing_units(
        definition: &PipelineDefinition,
        registry: &UnitRegistry,
        root: &Path,
    ) -> Vec<(usize, PathBuf)> {
        definition
            .steps()
            .iter()
            .filter(|step| matches!(registry.lookup(&step.unit).mode, InvocationMode::External))
            .map(|step| (step.index, root.join(&step.unit)))
            .filter(|(_, path)| !path.exists())
            .collect()
    }

    pub fn truncate_text(text: &str, max_length: usize) -> String {
        if text.chars().count() <= max_length {
            text.to_string()
        } else {
            let head: String = text.chars().take(max_length).collect();
            format!("{}...", head)
        }
    }
}
