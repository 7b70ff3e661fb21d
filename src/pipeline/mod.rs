// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

mod executor;
mod progress;
mod runner;
mod watcher;

pub use executor::{StepExecutor, StepOutcome};
pub use progress::{PipelineStats, ProgressAggregator, percentage};
pub use runner::{
    CancelHandle, PipelineRunner, RunHandle, RunPhase, RunState, RunSummary, StepStatus,
};
pub use watcher::{ResultScanner, ResultWatcher};
