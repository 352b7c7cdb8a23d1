use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "kusari", version, about = "Run chained LLM prompts with validation and retries")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format (logs are written to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a workflow file and print progress as NDJSON on stdout
    Run(RunArgs),

    /// Check text against a criterion
    Check {
        /// Substring, or /pattern/flags for a regular expression
        #[arg(long)]
        criteria: String,

        /// File to check; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Workflow file: {"name": ..., "steps": [...]}
    pub file: PathBuf,

    /// Chat-completion endpoint, overrides KUSARI_API_URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Bearer token, overrides KUSARI_API_KEY
    #[arg(long)]
    pub api_key: Option<String>,

    /// Pause after each step is announced, in milliseconds
    #[arg(long)]
    pub step_pause_ms: Option<u64>,

    /// Per-call time limit, in seconds
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    /// Delay before each retry attempt, in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
}
