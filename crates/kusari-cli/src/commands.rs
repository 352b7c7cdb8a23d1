use crate::cli::RunArgs;
use anyhow::Context;
use futures::StreamExt;
use kusari::{
    stream_events, validate, ApiConfig, EngineConfig, InMemoryStore, NdjsonWriter,
    OpenAiCompatClient, ProgressEvent, RunStatus, Step, WorkflowEngine,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::info;

/// On-disk shape of a workflow.
#[derive(Debug, Deserialize)]
pub struct WorkflowFile {
    #[serde(default)]
    pub name: String,
    pub steps: Vec<Step>,
}

impl WorkflowFile {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("Invalid workflow file")
    }
}

/// Runs the workflow file and reports whether it completed.
pub async fn run(args: RunArgs) -> anyhow::Result<bool> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let workflow = WorkflowFile::parse(&text)?;

    let mut api = ApiConfig::from_env();
    if args.api_url.is_some() {
        api.url = args.api_url;
    }
    if args.api_key.is_some() {
        api.api_key = args.api_key;
    }

    let mut engine_config = EngineConfig::from_env();
    if let Some(ms) = args.step_pause_ms {
        engine_config.step_pause = Some(Duration::from_millis(ms)).filter(|d| !d.is_zero());
    }
    if let Some(secs) = args.call_timeout_secs {
        engine_config.call_timeout = Some(Duration::from_secs(secs)).filter(|d| !d.is_zero());
    }
    if let Some(ms) = args.retry_delay_ms {
        engine_config.retry_delay = Some(Duration::from_millis(ms)).filter(|d| !d.is_zero());
    }

    let engine = WorkflowEngine::builder()
        .client(OpenAiCompatClient::new(&api))
        .store(InMemoryStore::new())
        .config(&engine_config)
        .build()?;

    info!(
        "Running {} with {} step(s)",
        args.file.display(),
        workflow.steps.len()
    );

    let mut events = Box::pin(stream_events(
        Arc::new(engine),
        workflow.name,
        workflow.steps,
    ));
    let mut out = NdjsonWriter::new(tokio::io::stdout());
    let mut succeeded = false;

    while let Some(event) = events.next().await {
        if let ProgressEvent::WorkflowComplete { execution } = &event {
            succeeded = execution.status == RunStatus::Completed;
        }
        out.write_event(&event)
            .await
            .context("Failed to write progress to stdout")?;
    }

    Ok(succeeded)
}

pub async fn check(criteria: &str, file: Option<&Path>) -> anyhow::Result<bool> {
    let output = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let passed = validate(&output, criteria);
    println!("{}", if passed { "pass" } else { "fail" });
    Ok(passed)
}
