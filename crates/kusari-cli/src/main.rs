//! `kusari` command-line runner.
//!
//! `kusari run <FILE>` executes a workflow file and streams its progress as
//! NDJSON on stdout. `kusari check` evaluates a criterion against some text.

mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format)?;

    let ok = match cli.command {
        Commands::Run(args) => commands::run(args).await?,
        Commands::Check { criteria, file } => commands::check(&criteria, file.as_deref()).await?,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
