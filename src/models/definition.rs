// file: src/models/definition.rs
// description: pipeline definition document loading and validation
// reference: `pipeline_steps` json documents produced by the pipeline editor

use crate::error::{PipelineError, Result};
use crate::models::step::{ParamValue, StepDescriptor};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RawDocument {
    pipeline_steps: Option<Vec<RawStep>>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: Option<String>,
    #[serde(alias = "unit")]
    script: Option<String>,
    params: Option<IndexMap<String, serde_json::Value>>,
}

/// Ordered steps of one pipeline, loaded once before a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    steps: Vec<StepDescriptor>,
}

impl PipelineDefinition {
    pub fn new(steps: Vec<StepDescriptor>) -> Self {
        Self { steps }
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading pipeline definition: {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Definition(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parses a `pipeline_steps` document. Every step must carry `name`,
    /// `script` (or `unit`) and `params`; the first step missing one fails
    /// the whole document.
    pub fn from_json(content: &str) -> Result<Self> {
        let document: RawDocument = serde_json::from_str(content)?;
        let raw_steps = document.pipeline_steps.ok_or_else(|| {
            PipelineError::Definition("document has no `pipeline_steps` array".to_string())
        })?;

        let mut steps = Vec::with_capacity(raw_steps.len());
        for (index, raw) in raw_steps.into_iter().enumerate() {
            steps.push(Self::convert_step(index, raw)?);
        }

        debug!("Parsed {} pipeline steps", steps.len());
        Ok(Self { steps })
    }

    fn convert_step(index: usize, raw: RawStep) -> Result<StepDescriptor> {
        let name = raw
            .name
            .ok_or_else(|| PipelineError::invalid_step(index, "missing field `name`"))?;
        let unit = raw
            .script
            .ok_or_else(|| PipelineError::invalid_step(index, "missing field `script`"))?;
        let raw_params = raw
            .params
            .ok_or_else(|| PipelineError::invalid_step(index, "missing field `params`"))?;

        let mut params = IndexMap::with_capacity(raw_params.len());
        for (key, value) in raw_params {
            let value = ParamValue::from_json(&value).ok_or_else(|| {
                PipelineError::invalid_step(index, format!("parameter `{}` is not a scalar", key))
            })?;
            params.insert(key, value);
        }

        Ok(StepDescriptor {
            index,
            name,
            unit,
            params,
        })
    }

    /// Points every `.tif` input parameter at `image`, if it exists.
    pub fn with_input_image(mut self, image: &Path) -> Self {
        if !image.exists() {
            debug!("Input image {} does not exist, keeping definition", image.display());
            return self;
        }

        let replacement = ParamValue::Text(image.display().to_string());
        for step in &mut self.steps {
            if let Some(value) = step.params.get_mut("input")
                && value.as_str().is_some_and(|s| s.ends_with(".tif"))
            {
                *value = replacement.clone();
            }
        }
        self
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&StepDescriptor> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
