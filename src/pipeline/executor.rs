// file: src/pipeline/executor.rs
// description: runs a single resolved step and classifies its outcome
// reference: tokio::process for external units, spawn_blocking for in-process routines

use crate::config::Config;
use crate::error::StepError;
use crate::models::{EventSink, ParamValue, StepDescriptor};
use crate::pipeline::progress::ProgressAggregator;
use crate::registry::{InProcessRoutine, InvocationMode, ResolvedStep};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum StepOutcome {
    Completed { output: String },
    Failed(StepError),
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs one step to completion. Every failure is returned as
/// [`StepOutcome::Failed`]; nothing escapes to the pipeline loop.
pub struct StepExecutor {
    project_root: PathBuf,
    interpreter: String,
    search_path_var: String,
    ui_interval: Duration,
    events: EventSink,
}

impl StepExecutor {
    pub fn new(config: &Config, events: EventSink) -> Self {
        Self {
            project_root: config.runner.project_root.clone(),
            interpreter: config.runner.interpreter.clone(),
            search_path_var: config.runner.search_path_var.clone(),
            ui_interval: config.ui_interval(),
            events,
        }
    }

    pub async fn execute(&self, step: &ResolvedStep) -> StepOutcome {
        match &step.spec.mode {
            InvocationMode::External => self.run_external(&step.descriptor).await,
            InvocationMode::InProcess(routine) => {
                self.run_in_process(Arc::clone(routine), step.descriptor.clone())
                    .await
            }
        }
    }

    async fn run_external(&self, step: &StepDescriptor) -> StepOutcome {
        let script = self.project_root.join(&step.unit);
        if !script.exists() {
            return StepOutcome::Failed(StepError::UnitNotFound { path: script });
        }

        if let Err(e) = self.prepare_data_dirs(step) {
            return StepOutcome::Failed(e);
        }

        let args = step.command_args();
        let (mut command, program) = if self.interpreter.is_empty() {
            (Command::new(&script), script.display().to_string())
        } else {
            let mut command = Command::new(&self.interpreter);
            command.arg(&script);
            (
                command,
                format!("{} {}", self.interpreter, script.display()),
            )
        };

        command
            .args(&args)
            .current_dir(&self.project_root)
            .env(&self.search_path_var, self.search_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        self.events
            .log(format!("Executing: {} {}", program, args.join(" ")));

        let output = match command.output().await {
            Ok(output) => output,
            Err(source) => {
                return StepOutcome::Failed(StepError::Spawn {
                    unit: step.unit.clone(),
                    source,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return StepOutcome::Failed(StepError::ExecutionFailure {
                unit: step.unit.clone(),
                exit_code: output.status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        if !stdout.trim().is_empty() {
            self.events.log(stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            warn!("{} wrote to stderr", step.unit);
            self.events.log(format!("Warnings: {}", stderr.trim_end()));
        }

        StepOutcome::Completed { output: stdout }
    }

    async fn run_in_process(
        &self,
        routine: Arc<dyn InProcessRoutine>,
        step: StepDescriptor,
    ) -> StepOutcome {
        let unit = step.unit.clone();
        let events = self.events.clone();
        let ui_interval = self.ui_interval;

        self.events
            .log(format!("Running {} in-process with progress", step.name));

        let joined = tokio::task::spawn_blocking(move || {
            let mut aggregator = ProgressAggregator::new(step.name.clone(), events.clone(), ui_interval);
            let result = routine.run(&step, &mut aggregator, &events);
            if result.is_ok() {
                aggregator.finish();
            }
            result
        })
        .await;

        match joined {
            Ok(Ok(())) => StepOutcome::Completed {
                output: String::new(),
            },
            Ok(Err(e)) => StepOutcome::Failed(StepError::Routine {
                unit,
                message: format!("{:#}", e),
            }),
            Err(e) => StepOutcome::Failed(StepError::Panicked {
                unit,
                message: e.to_string(),
            }),
        }
    }

    /// Parent directories of `data/...` parameters are created up front.
    fn prepare_data_dirs(&self, step: &StepDescriptor) -> Result<(), StepError> {
        for value in step.params.values() {
            let ParamValue::Text(text) = value else {
                continue;
            };
            if !text.starts_with("data/") {
                continue;
            }

            let target = self.project_root.join(text);
            if let Some(parent) = target.parent() {
                debug!("Ensuring directory {}", parent.display());
                std::fs::create_dir_all(parent).map_err(|source| StepError::Prepare {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Project root prepended to the inherited search path. Built per call;
    /// this process's own environment is never modified.
    fn search_path(&self) -> OsString {
        let mut paths = vec![self.project_root.clone()];
        if let Some(existing) = std::env::var_os(&self.search_path_var) {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths)
            .unwrap_or_else(|_| self.project_root.clone().into_os_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::channel;
    use crate::models::{EventReceiver, PipelineEvent};
    use crate::registry::{LogSink, ProgressSink, UnitSpec};
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Config) {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default_config();
        config.runner.project_root = temp.path().to_path_buf();
        config.runner.interpreter = "sh".to_string();
        config.runner.search_path_var = "FOREST_TEST_PATH".to_string();
        config.progress.ui_interval_ms = 0;
        (temp, config)
    }

    fn external(step: StepDescriptor) -> ResolvedStep {
        ResolvedStep {
            descriptor: step,
            spec: UnitSpec::external(),
        }
    }

    fn logs(rx: &mut EventReceiver) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::LogLine(line) = event {
                lines.push(line);
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_external_success_passes_args() {
        let (temp, config) = setup();
        fs::write(temp.path().join("echo.sh"), "echo \"$@\"\necho \"path=$FOREST_TEST_PATH\"\n").unwrap();

        let (sink, mut rx) = channel();
        let executor = StepExecutor::new(&config, sink);
        let step = StepDescriptor::new(0, "Echo", "echo.sh")
            .with_param("input", "tiles")
            .with_param("conf", 0.3)
            .with_param("keep", false);

        match executor.execute(&external(step)).await {
            StepOutcome::Completed { output } => {
                let mut lines = output.lines();
                assert_eq!(lines.next(), Some("--input tiles --conf 0.3 --keep False"));
                let path_line = lines.next().unwrap();
                assert!(path_line.starts_with(&format!("path={}", temp.path().display())));
            }
            other => panic!("expected success, got {:?}", other),
        }

        assert!(std::env::var_os("FOREST_TEST_PATH").is_none());
        assert!(logs(&mut rx)[0].starts_with("Executing: sh "));
    }

    #[tokio::test]
    async fn test_external_failure_carries_stderr() {
        let (temp, config) = setup();
        fs::write(temp.path().join("fail.sh"), "echo 'no such band' >&2\nexit 3\n").unwrap();

        let (sink, _rx) = channel();
        let executor = StepExecutor::new(&config, sink);

        match executor
            .execute(&external(StepDescriptor::new(0, "Fail", "fail.sh")))
            .await
        {
            StepOutcome::Failed(StepError::ExecutionFailure {
                exit_code, stderr, ..
            }) => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "no such band");
            }
            other => panic!("expected execution failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_unit() {
        let (_temp, config) = setup();
        let (sink, _rx) = channel();
        let executor = StepExecutor::new(&config, sink);

        let outcome = executor
            .execute(&external(StepDescriptor::new(0, "Ghost", "cli/missing_cli.py")))
            .await;
        assert!(matches!(
            outcome,
            StepOutcome::Failed(StepError::UnitNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stderr_on_success_is_a_warning_line() {
        let (temp, config) = setup();
        fs::write(temp.path().join("warn.sh"), "echo done\necho 'gdal warning' >&2\n").unwrap();

        let (sink, mut rx) = channel();
        let executor = StepExecutor::new(&config, sink);
        let outcome = executor
            .execute(&external(StepDescriptor::new(0, "Warn", "warn.sh")))
            .await;

        assert!(outcome.is_completed());
        let lines = logs(&mut rx);
        assert!(lines.contains(&"done".to_string()));
        assert!(lines.contains(&"Warnings: gdal warning".to_string()));
    }

    #[tokio::test]
    async fn test_data_dirs_created() {
        let (temp, config) = setup();
        fs::write(temp.path().join("noop.sh"), "exit 0\n").unwrap();

        let (sink, _rx) = channel();
        let executor = StepExecutor::new(&config, sink);
        let step = StepDescriptor::new(0, "Cut", "noop.sh").with_param("output", "data/cut/tiles.shp");

        assert!(executor.execute(&external(step)).await.is_completed());
        assert!(temp.path().join("data/cut").is_dir());
    }

    struct Counting;

    impl InProcessRoutine for Counting {
        fn run(
            &self,
            step: &StepDescriptor,
            progress: &mut dyn ProgressSink,
            log: &dyn LogSink,
        ) -> anyhow::Result<()> {
            log.log(&format!("processing {}", step.param_str("input").unwrap_or("?")));
            for i in 1..=4 {
                progress.update(i, 4);
            }
            Ok(())
        }
    }

    struct Broken;

    impl InProcessRoutine for Broken {
        fn run(
            &self,
            _step: &StepDescriptor,
            progress: &mut dyn ProgressSink,
            _log: &dyn LogSink,
        ) -> anyhow::Result<()> {
            progress.update(1, 10);
            anyhow::bail!("raster has no bands")
        }
    }

    struct Panicking;

    impl InProcessRoutine for Panicking {
        fn run(
            &self,
            _step: &StepDescriptor,
            _progress: &mut dyn ProgressSink,
            _log: &dyn LogSink,
        ) -> anyhow::Result<()> {
            panic!("index out of bounds")
        }
    }

    fn in_process(routine: impl InProcessRoutine + 'static) -> ResolvedStep {
        ResolvedStep {
            descriptor: StepDescriptor::new(0, "HSV", "cli/hsv_batch_cli.py").with_param("input", "tiles"),
            spec: UnitSpec::in_process(Arc::new(routine)),
        }
    }

    #[tokio::test]
    async fn test_in_process_streams_progress() {
        let (_temp, config) = setup();
        let (sink, mut rx) = channel();
        let executor = StepExecutor::new(&config, sink);

        assert!(executor.execute(&in_process(Counting)).await.is_completed());

        let mut progress = Vec::new();
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::StepProgress { current, total } => progress.push((current, total)),
                PipelineEvent::LogLine(line) => lines.push(line),
                _ => {}
            }
        }
        assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4), (4, 4)]);
        assert!(lines.contains(&"processing tiles".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("HSV: done (100%)"));
    }

    #[tokio::test]
    async fn test_in_process_error_becomes_failure() {
        let (_temp, config) = setup();
        let (sink, _rx) = channel();
        let executor = StepExecutor::new(&config, sink);

        match executor.execute(&in_process(Broken)).await {
            StepOutcome::Failed(StepError::Routine { message, .. }) => {
                assert_eq!(message, "raster has no bands")
            }
            other => panic!("expected routine failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_in_process_panic_becomes_failure() {
        let (_temp, config) = setup();
        let (sink, _rx) = channel();
        let executor = StepExecutor::new(&config, sink);

        assert!(matches!(
            executor.execute(&in_process(Panicking)).await,
            StepOutcome::Failed(StepError::Panicked { .. })
        ));
    }
}
