// file: src/models/event.rs
// description: observer-facing pipeline events and the one-way channel that carries them
// reference: tokio unbounded mpsc channels

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

/// A source image matched with the annotation file produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DetectionPair {
    pub source_artifact: PathBuf,
    pub result_artifact: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    StepStarted { index: usize, name: String },
    /// Step-local progress of the currently running step.
    StepProgress { current: u64, total: u64 },
    StepCompleted { index: usize },
    StepFailed { index: usize, message: String },
    DetectionPairFound(DetectionPair),
    LogLine(String),
    PipelineCompleted { success: bool },
}

pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Sending half handed to the runner, the executor and the watcher.
/// A dropped observer is not an error; events are simply discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

pub fn channel() -> (EventSink, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

impl EventSink {
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(PipelineEvent::LogLine(message));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = channel();
        drop(rx);
        assert!(sink.is_closed());
        sink.emit(PipelineEvent::PipelineCompleted { success: true });
        sink.log("still fine");
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut rx) = channel();
        sink.emit(PipelineEvent::StepStarted {
            index: 0,
            name: "Crop".to_string(),
        });
        sink.log("running");
        sink.emit(PipelineEvent::StepCompleted { index: 0 });

        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::StepStarted { index: 0, .. })));
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::LogLine("running".to_string()));
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::StepCompleted { index: 0 });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&PipelineEvent::StepCompleted { index: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"step_completed","data":{"index":2}}"#);

        let json = serde_json::to_string(&PipelineEvent::LogLine("hi".to_string())).unwrap();
        assert_eq!(json, r#"{"event":"log_line","data":"hi"}"#);
    }
}
