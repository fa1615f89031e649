mod cli;

use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, Output};
use miette::{IntoDiagnostic, Result, WrapErr};
use tagtrack::log::init_tracing;
use tagtrack::{ReplayOptions, describe, replay};
use tagtrack_activity::{EventSink, JsonLinesSink, TracingSink};
use tagtrack_core::{Config, Correlator, parse_message};
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.level(), cli.log_format, None);

    match cli.command {
        Commands::Replay {
            file,
            config,
            logger,
            thread,
            output,
        } => {
            let config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            let sink: Arc<dyn EventSink> = match output {
                Output::Json => Arc::new(JsonLinesSink::new(io::stdout())),
                Output::Tracing => Arc::new(TracingSink),
            };
            let correlator = Correlator::new(&config, sink);
            let options = ReplayOptions { logger, thread };

            let summary = match file {
                Some(path) => {
                    let input = File::open(&path)
                        .into_diagnostic()
                        .wrap_err_with(|| format!("failed to open {}", path.display()))?;
                    replay(BufReader::new(input), &correlator, &options)?
                }
                None => replay(io::stdin().lock(), &correlator, &options)?,
            };
            info!(
                target: "tagtrack::replay",
                tracker = config.source_name_or("tagtrack"),
                records = summary.records,
                skipped = summary.skipped,
                closed_at_eof = summary.closed_at_eof,
                "replay finished"
            );
        }
        Commands::Parse { message, delimiter } => {
            let parsed = parse_message(&message, delimiter);
            let json = serde_json::to_string_pretty(&describe(&parsed)).into_diagnostic()?;
            println!("{json}");
        }
    }

    Ok(())
}
