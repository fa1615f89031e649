use std::io::{self, IsTerminal};

use clap::ValueEnum;
use strum::Display;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::layer::TagtrackLayer;

#[derive(Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Level {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Silent => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Format of diagnostics written to stderr
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Full,
    /// One JSON object per line
    Json,
}

/// Install the global subscriber.
///
/// `level` (overridable through `RUST_LOG`) filters the stderr output only; a
/// supplied [`TagtrackLayer`] sees every event.
pub fn init_tracing(level: Level, format: LogFormat, tagtrack: Option<TagtrackLayer>) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy();

    let stderr = io::stderr;
    let stderr_layer = match format {
        LogFormat::Full => tracing_subscriber::fmt::layer()
            .with_writer(stderr)
            .with_ansi(stderr().is_terminal())
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(stderr_layer.with_filter(filter))
        .with(tagtrack)
        .init();
}
