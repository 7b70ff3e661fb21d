// file: src/pipeline/runner.rs
// description: drives a pipeline definition step by step on a background task
// reference: fail-fast sequential execution with cooperative cancellation

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::{EventSink, PipelineDefinition, PipelineEvent};
use crate::pipeline::executor::{StepExecutor, StepOutcome};
use crate::pipeline::progress::PipelineStats;
use crate::pipeline::watcher::{ResultScanner, ResultWatcher};
use crate::registry::{ResolvedStep, UnitRegistry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Per-run bookkeeping, owned and mutated only by the pipeline task.
#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
    outcomes: Vec<StepStatus>,
}

impl RunState {
    fn new(len: usize, start_index: usize) -> Self {
        let outcomes = (0..len)
            .map(|i| {
                if i < start_index {
                    StepStatus::Skipped
                } else {
                    StepStatus::Pending
                }
            })
            .collect();

        Self {
            phase: RunPhase::Idle,
            outcomes,
        }
    }

    fn transition(&mut self, next: RunPhase) {
        if self.phase.is_terminal() {
            warn!("Ignoring transition {:?} -> {:?}", self.phase, next);
            return;
        }
        self.phase = next;
    }

    fn mark(&mut self, index: usize, status: StepStatus) {
        if let Some(slot) = self.outcomes.get_mut(index) {
            *slot = status;
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn outcomes(&self) -> &[StepStatus] {
        &self.outcomes
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: RunState,
    pub stats: PipelineStats,
    /// Message of the error that ended the run, if any.
    pub error: Option<String>,
}

impl RunSummary {
    pub fn phase(&self) -> RunPhase {
        self.state.phase()
    }

    pub fn succeeded(&self) -> bool {
        self.state.phase() == RunPhase::Completed
    }
}

/// Requests a stop at the next step boundary. The running step is never
/// interrupted.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct RunHandle {
    handle: JoinHandle<RunSummary>,
    cancel: CancelHandle,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<RunSummary> {
        self.handle
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))
    }
}

/// Clears the runner's busy flag when the run task ends, even by panic.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PipelineRunner {
    config: Arc<Config>,
    registry: Arc<UnitRegistry>,
    cancelled: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
}

impl PipelineRunner {
    pub fn new(config: Config, registry: UnitRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            cancelled: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Idempotent; harmless before a run starts or after it ends.
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawns the run on the Tokio runtime and returns immediately.
    /// Events flow to `events`; the run never reports errors any other way.
    pub fn start(
        &self,
        definition: PipelineDefinition,
        start_index: usize,
        events: EventSink,
    ) -> Result<RunHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        // a cancel left over from an earlier run must not leak into this one
        self.cancelled.store(false, Ordering::SeqCst);

        let worker = RunWorker {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            cancel: self.cancel_handle(),
            events,
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                worker.run(run_id, definition, start_index).await
            }
            .instrument(span),
        );

        Ok(RunHandle {
            handle,
            cancel: self.cancel_handle(),
        })
    }
}

struct RunWorker {
    config: Arc<Config>,
    registry: Arc<UnitRegistry>,
    cancel: CancelHandle,
    events: EventSink,
}

impl RunWorker {
    async fn run(
        &self,
        run_id: Uuid,
        definition: PipelineDefinition,
        start_index: usize,
    ) -> RunSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        let total = definition.len();

        let mut state = RunState::new(total, start_index);
        let mut stats = PipelineStats::new(total);
        state.transition(RunPhase::Running);

        let steps = match self.validate(&definition, start_index) {
            Ok(steps) => steps,
            Err(e) => {
                error!("Pipeline rejected before execution: {}", e);
                self.events.log(format!("Pipeline rejected: {}", e));
                state.transition(RunPhase::Failed);
                self.events
                    .emit(PipelineEvent::PipelineCompleted { success: false });
                stats.duration_ms = clock.elapsed().as_millis() as u64;
                return RunSummary {
                    run_id,
                    started_at,
                    state,
                    stats,
                    error: Some(e.to_string()),
                };
            }
        };

        stats.steps_skipped = start_index;
        self.events.log(format!(
            "Starting pipeline at step {} of {}",
            start_index + 1,
            total
        ));

        let executor = StepExecutor::new(&self.config, self.events.clone());
        let mut failure = None;

        for step in &steps[start_index..] {
            let index = step.descriptor.index;
            let name = &step.descriptor.name;

            if self.cancel.is_cancelled() {
                self.events.log(format!(
                    "Pipeline cancelled by operator before step {} ({})",
                    index + 1,
                    name
                ));
                state.transition(RunPhase::Cancelled);
                break;
            }

            state.mark(index, StepStatus::Running);
            info!("[{}/{}] {}", index + 1, total, name);
            self.events.emit(PipelineEvent::StepStarted {
                index,
                name: name.clone(),
            });

            let mut watcher = step.is_detection().then(|| self.start_watcher(step));

            let outcome = executor.execute(step).await;

            // joined before the step's outcome is reported
            if let Some(watcher) = watcher.as_mut() {
                stats.detections_found += watcher.stop().await;
            }

            match outcome {
                StepOutcome::Completed { .. } => {
                    state.mark(index, StepStatus::Completed);
                    stats.steps_completed += 1;
                    self.events.log(format!("Step {} completed: {}", index + 1, name));
                    self.events.emit(PipelineEvent::StepCompleted { index });
                }
                StepOutcome::Failed(err) => {
                    let message = err.to_string();
                    error!("Step {} ({}) failed: {}", index + 1, name, message);
                    state.mark(index, StepStatus::Failed);
                    stats.steps_failed += 1;
                    self.events
                        .log(format!("Step {} failed: {}", index + 1, message));
                    self.events.emit(PipelineEvent::StepFailed {
                        index,
                        message: message.clone(),
                    });
                    state.transition(RunPhase::Failed);
                    failure = Some(message);
                    break;
                }
            }
        }

        if state.phase() == RunPhase::Running {
            state.transition(RunPhase::Completed);
            self.events.log("All pipeline steps completed");
        }

        let success = state.phase() == RunPhase::Completed;
        self.events
            .emit(PipelineEvent::PipelineCompleted { success });

        stats.duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            "Pipeline finished as {:?} in {:.2}s",
            state.phase(),
            stats.duration_secs()
        );

        RunSummary {
            run_id,
            started_at,
            state,
            stats,
            error: failure,
        }
    }

    fn validate(
        &self,
        definition: &PipelineDefinition,
        start_index: usize,
    ) -> Result<Vec<ResolvedStep>> {
        self.config.validate()?;
        if definition.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        if start_index >= definition.len() {
            return Err(PipelineError::StartIndexOutOfRange {
                start: start_index,
                len: definition.len(),
            });
        }
        self.registry.resolve(definition)
    }

    fn start_watcher(&self, step: &ResolvedStep) -> ResultWatcher {
        let input = step
            .descriptor
            .params
            .get("input")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let source_dir = self.config.resolve_path(input);
        let result_dir = self.config.labels_dir();
        let detection = &self.config.detection;

        self.events.log(format!(
            "Monitoring detection results in {}",
            result_dir.display()
        ));

        let scanner = ResultScanner::new(
            source_dir,
            result_dir,
            detection.source_extension.as_str(),
            detection.result_extension.as_str(),
        );
        ResultWatcher::start(scanner, self.config.poll_interval(), self.events.clone())
    }
}
