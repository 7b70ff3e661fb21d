// file: src/registry/sink.rs
// description: narrow capabilities handed to in-process routines
// reference: progress and log reporting without observer handles

use crate::models::{EventSink, StepDescriptor};

/// Receives step-local progress samples from a running routine.
pub trait ProgressSink: Send {
    fn update(&mut self, current: u64, total: u64);
}

pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

impl LogSink for EventSink {
    fn log(&self, message: &str) {
        EventSink::log(self, message);
    }
}

/// A unit that runs inside this process and reports fine-grained progress.
pub trait InProcessRoutine: Send + Sync {
    fn run(
        &self,
        step: &StepDescriptor,
        progress: &mut dyn ProgressSink,
        log: &dyn LogSink,
    ) -> anyhow::Result<()>;
}
