// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod error;
pub mod models;
pub mod observer;
pub mod pipeline;
pub mod registry;
pub mod utils;

pub use config::{Config, DetectionConfig, ProgressConfig, RunnerConfig};
pub use error::{PipelineError, Result, StepError};
pub use models::{
    DetectionPair, EventReceiver, EventSink, ParamValue, PipelineDefinition, PipelineEvent,
    StepDescriptor,
};
pub use observer::{ConsoleObserver, EventFormat};
pub use pipeline::{
    CancelHandle, PipelineRunner, PipelineStats, ProgressAggregator, ResultScanner, ResultWatcher,
    RunHandle, RunPhase, RunState, RunSummary, StepExecutor, StepOutcome, StepStatus,
};
pub use registry::{
    InProcessRoutine, InvocationMode, LogSink, ProgressSink, ResolvedStep, UnitRegistry, UnitSpec,
};
pub use utils::Validator;

pub use models::event::channel as event_channel;
