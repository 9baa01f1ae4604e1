//! Recorded telemetry files.

mod reader;

pub use reader::ReplayFile;
