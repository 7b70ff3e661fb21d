// file: src/observer/mod.rs
// description: observer implementations that consume pipeline events
// reference: internal module structure

mod console;

pub use console::{ConsoleObserver, EventFormat};
