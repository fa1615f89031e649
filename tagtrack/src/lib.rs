//! `tracing` integration and command line driver for the tagtrack engine.

pub mod layer;
pub mod log;
pub mod replay;

pub use layer::{TagtrackHandle, TagtrackLayer};
pub use replay::{ReplayError, ReplayOptions, ReplaySummary, describe, replay, split_level};
