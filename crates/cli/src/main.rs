mod args;
mod identifiers;
mod output;
mod runner;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Commands};
use identifiers::run_identifiers;
use runner::{run_match, run_verify};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Match { xml_dir, text, load } => {
            run_match(xml_dir, text, load).await?;
        }
        Commands::Verify {
            xml_dir,
            examples,
            lint,
            load,
        } => {
            run_verify(xml_dir, examples, lint, load).await?;
        }
        Commands::Identifiers {
            write,
            zero,
            recog_home,
            files,
        } => {
            if run_identifiers(files, recog_home, write, zero).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    // stdout carries match output
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
