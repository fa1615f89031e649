use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, crate_version};
use strum::Display;
use tagtrack::log::{Level, LogFormat};

#[derive(Parser)]
#[command(
    name = "tagtrack",
    color = clap::ColorChoice::Auto,
    about = format!("tagtrack {}: correlate hash-tag annotated log lines into events and activities", crate_version!())
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable additional debug logs.")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Silence all logs"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        help = "Configure the output format of the logs.",
        default_value_t
    )]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn level(&self) -> Level {
        if self.verbose {
            Level::Debug
        } else if self.quiet {
            Level::Silent
        } else {
            Level::default()
        }
    }
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    #[command(
        about = "Feed `LEVEL message` lines through the correlator and print tracked items as JSON lines."
    )]
    Replay {
        #[arg(help = "File to read. Reads stdin when omitted.")]
        file: Option<PathBuf>,

        #[arg(long, help = "YAML configuration file.")]
        config: Option<PathBuf>,

        #[arg(long, default_value = "tagtrack.replay", help = "Logger name of every record.")]
        logger: String,

        #[arg(long, default_value = "main", help = "Thread name of every record.")]
        thread: String,

        #[arg(long, default_value_t, help = "Where tracked items are written.")]
        output: Output,
    },

    #[command(about = "Print the text and annotations of a single message as JSON.")]
    Parse {
        message: String,

        #[arg(long, default_value_t = tagtrack_core::tags::DEFAULT_DELIMITER)]
        delimiter: char,
    },
}

/// Destination of tracked items
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Output {
    /// JSON lines on stdout
    #[default]
    Json,
    /// Log records on stderr, at a level derived from each item's severity
    Tracing,
}
