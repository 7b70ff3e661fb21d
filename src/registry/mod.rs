// file: src/registry/mod.rs
// description: unit registry module exports
// reference: internal module structure

mod sink;
mod units;

pub use sink::{InProcessRoutine, LogSink, ProgressSink};
pub use units::{InvocationMode, ResolvedStep, UnitRegistry, UnitSpec};
