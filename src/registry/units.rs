// file: src/registry/units.rs
// description: static map from unit identifier to invocation strategy
// reference: resolved once per run, before the first step executes

use crate::config::DetectionConfig;
use crate::error::{PipelineError, Result};
use crate::models::{PipelineDefinition, StepDescriptor};
use crate::registry::sink::InProcessRoutine;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub enum InvocationMode {
    /// Launched as a separate process with `--key value` arguments.
    External,
    /// Called directly with a progress sink.
    InProcess(Arc<dyn InProcessRoutine>),
}

impl fmt::Debug for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("External"),
            Self::InProcess(_) => f.write_str("InProcess"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub mode: InvocationMode,
    /// Detection units get a result watcher while they run.
    pub detection: bool,
    pub required_params: Vec<String>,
}

impl UnitSpec {
    pub fn external() -> Self {
        Self {
            mode: InvocationMode::External,
            detection: false,
            required_params: Vec::new(),
        }
    }

    pub fn in_process(routine: Arc<dyn InProcessRoutine>) -> Self {
        Self {
            mode: InvocationMode::InProcess(routine),
            detection: false,
            required_params: Vec::new(),
        }
    }

    pub fn detection() -> Self {
        Self {
            mode: InvocationMode::External,
            detection: true,
            required_params: vec!["input".to_string()],
        }
    }

    pub fn requiring(mut self, params: &[&str]) -> Self {
        self.required_params = params.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// A step paired with the strategy chosen for its unit.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub descriptor: StepDescriptor,
    pub spec: UnitSpec,
}

impl ResolvedStep {
    pub fn is_detection(&self) -> bool {
        self.spec.detection
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    units: HashMap<String, UnitSpec>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(detection: &DetectionConfig) -> Self {
        let mut registry = Self::new();
        for unit in &detection.units {
            registry.register(unit.clone(), UnitSpec::detection());
        }
        registry
    }

    pub fn register(&mut self, unit: impl Into<String>, spec: UnitSpec) -> &mut Self {
        let unit = unit.into();
        debug!("Registering unit {} as {:?}", unit, spec.mode);
        self.units.insert(unit, spec);
        self
    }

    pub fn register_in_process(
        &mut self,
        unit: impl Into<String>,
        routine: impl InProcessRoutine + 'static,
    ) -> &mut Self {
        self.register(unit, UnitSpec::in_process(Arc::new(routine)))
    }

    /// Unknown units default to out-of-process invocation.
    pub fn lookup(&self, unit: &str) -> UnitSpec {
        self.units
            .get(unit)
            .cloned()
            .unwrap_or_else(UnitSpec::external)
    }

    pub fn resolve(&self, definition: &PipelineDefinition) -> Result<Vec<ResolvedStep>> {
        definition
            .steps()
            .iter()
            .map(|step| self.resolve_step(step))
            .collect()
    }

    fn resolve_step(&self, step: &StepDescriptor) -> Result<ResolvedStep> {
        if step.name.trim().is_empty() {
            return Err(PipelineError::invalid_step(step.index, "empty step name"));
        }
        if step.unit.trim().is_empty() {
            return Err(PipelineError::invalid_step(step.index, "empty unit identifier"));
        }

        let spec = self.lookup(&step.unit);
        if let Some(missing) = spec
            .required_params
            .iter()
            .find(|p| !step.params.contains_key(p.as_str()))
        {
            return Err(PipelineError::invalid_step(
                step.index,
                format!("unit {} requires parameter `{}`", step.unit, missing),
            ));
        }

        Ok(ResolvedStep {
            descriptor: step.clone(),
            spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::{LogSink, ProgressSink};

    struct Noop;

    impl InProcessRoutine for Noop {
        fn run(
            &self,
            _step: &StepDescriptor,
            _progress: &mut dyn ProgressSink,
            _log: &dyn LogSink,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn definition(steps: Vec<StepDescriptor>) -> PipelineDefinition {
        PipelineDefinition::new(steps)
    }

    #[test]
    fn test_default_registry_marks_detection_unit() {
        let registry = UnitRegistry::from_config(&Config::default_config().detection);
        let spec = registry.lookup("cli/yolo_predict_cli.py");
        assert!(spec.detection);
        assert!(matches!(spec.mode, InvocationMode::External));
        assert!(!registry.lookup("cli/cutting_cli.py").detection);
    }

    #[test]
    fn test_resolve_assigns_modes() {
        let mut registry = UnitRegistry::new();
        registry.register_in_process("cli/hsv_batch_cli.py", Noop);

        let def = definition(vec![
            StepDescriptor::new(0, "HSV", "cli/hsv_batch_cli.py"),
            StepDescriptor::new(1, "Cut", "cli/cutting_cli.py"),
        ]);
        let resolved = registry.resolve(&def).unwrap();

        assert!(matches!(resolved[0].spec.mode, InvocationMode::InProcess(_)));
        assert!(matches!(resolved[1].spec.mode, InvocationMode::External));
    }

    #[test]
    fn test_detection_without_input_is_invalid() {
        let mut registry = UnitRegistry::new();
        registry.register("detect.sh", UnitSpec::detection());

        let def = definition(vec![
            StepDescriptor::new(0, "Cut", "cut.sh"),
            StepDescriptor::new(1, "Detect", "detect.sh").with_param("model", "best.pt"),
        ]);

        match registry.resolve(&def) {
            Err(PipelineError::InvalidStep { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("input"));
            }
            other => panic!("expected InvalidStep, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_blank_unit_is_invalid() {
        let def = definition(vec![StepDescriptor::new(0, "Blank", "  ")]);
        assert!(matches!(
            UnitRegistry::new().resolve(&def),
            Err(PipelineError::InvalidStep { index: 0, .. })
        ));
    }
}
