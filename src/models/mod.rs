// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod definition;
pub mod event;
pub mod step;

pub use definition::PipelineDefinition;
pub use event::{DetectionPair, EventReceiver, EventSink, PipelineEvent};
pub use step::{ParamValue, StepDescriptor};
