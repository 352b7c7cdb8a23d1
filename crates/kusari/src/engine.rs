//! Workflow engine for executing prompt chains.

use crate::config::EngineConfig;
use kusari_core::{
    extract_context, output_or_marker, validate, workflow_name, Backoff, CallError, ChatClient,
    EventSink, ExecutionRecord, ProgressEvent, RunStatus, Step, StepResult, WorkflowError,
    WorkflowStore,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, warn, Instrument};

/// Heading placed before the context carried over from the previous step.
pub const CONTEXT_HEADING: &str = "### Context from Previous Step:";

/// Runs workflows one step at a time against a chat backend.
///
/// The engine holds no per-run state, so one instance can serve concurrent runs.
pub struct WorkflowEngine {
    client: Arc<dyn ChatClient>,
    store: Arc<dyn WorkflowStore>,
    backoff: Backoff,
    call_timeout: Option<Duration>,
    step_pause: Option<Duration>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("client", &self.client)
            .field("backoff", &self.backoff)
            .field("call_timeout", &self.call_timeout)
            .field("step_pause", &self.step_pause)
            .finish()
    }
}

impl WorkflowEngine {
    /// Creates a new engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Returns the store runs are recorded in.
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Persists the workflow, runs its steps in order and persists the outcome.
    ///
    /// Progress is reported to `sink` as it happens. A step that exhausts its
    /// attempts ends the run with [`RunStatus::Failed`]; later steps are not
    /// started. Only persistence failures are returned as errors.
    pub async fn execute(
        &self,
        name: &str,
        steps: Vec<Step>,
        sink: &dyn EventSink,
    ) -> Result<ExecutionRecord, WorkflowError> {
        let definition = self
            .store
            .create_workflow(workflow_name(Some(name)), steps)
            .await?;

        let span = info_span!(
            "workflow_run",
            workflow_id = %definition.id,
            name = %definition.name
        );

        async move {
            info!("Workflow started with {} step(s)", definition.steps.len());
            notify(
                sink,
                ProgressEvent::WorkflowStart {
                    workflow_id: definition.id,
                },
            )
            .await;

            let mut results = Vec::with_capacity(definition.steps.len());
            let mut context = String::new();
            let mut status = RunStatus::Completed;

            for step in &definition.steps {
                let result = self
                    .execute_step_with_retry(step, &context, sink)
                    .instrument(info_span!("step", step_id = %step.id))
                    .await;
                let passed = result.is_success();
                if passed {
                    context = extract_context(&result.output);
                }

                results.push(result.clone());
                notify(
                    sink,
                    ProgressEvent::StepComplete {
                        step_id: step.id.clone(),
                        result,
                    },
                )
                .await;

                if !passed {
                    warn!("Workflow failed at step '{}'", step.id);
                    status = RunStatus::Failed;
                    break;
                }
            }

            let execution = self
                .store
                .create_execution(definition.id, status, results)
                .await?;
            info!("Workflow finished with status {:?}", execution.status);

            notify(
                sink,
                ProgressEvent::WorkflowComplete {
                    execution: execution.clone(),
                },
            )
            .await;

            Ok::<_, WorkflowError>(execution)
        }
        .instrument(span)
        .await
    }

    async fn execute_step_with_retry(
        &self,
        step: &Step,
        context: &str,
        sink: &dyn EventSink,
    ) -> StepResult {
        notify(
            sink,
            ProgressEvent::StepStart {
                step_id: step.id.clone(),
                model: step.model.clone(),
            },
        )
        .await;

        if let Some(pause) = self.step_pause {
            sleep(pause).await;
        }

        let max_attempts = step.max_attempts();
        let mut attempt = 0;
        let mut passed = false;
        let mut output = String::new();

        while !passed && attempt < max_attempts {
            attempt += 1;
            if attempt > 1 {
                info!(
                    "Step '{}' retrying ({}/{})",
                    step.id, attempt, max_attempts
                );
                notify(
                    sink,
                    ProgressEvent::StepRetry {
                        step_id: step.id.clone(),
                        attempt,
                    },
                )
                .await;
                if let Some(delay) = self.backoff.delay_before(attempt) {
                    sleep(delay).await;
                }
            }

            let prompt = compose_prompt(step, context, attempt);
            debug!("Prompt for attempt {}: {} bytes", attempt, prompt.len());

            output = self.call_model(&step.model, &prompt).await;
            passed = validate(&output, &step.criteria);

            if !passed {
                warn!(
                    "Step '{}' attempt {}/{} failed validation",
                    step.id, attempt, max_attempts
                );
            }
        }

        StepResult::from_attempt(step.id.clone(), output, passed, attempt)
    }

    async fn call_model(&self, model: &str, prompt: &str) -> String {
        match self.call_timeout {
            Some(limit) => match timeout(limit, self.client.call(model, prompt)).await {
                Ok(text) => text,
                Err(_) => output_or_marker(model, Err(CallError::Timeout(limit))),
            },
            None => self.client.call(model, prompt).await,
        }
    }
}

/// Builds the prompt for one attempt of a step.
///
/// The carried-over context is appended under [`CONTEXT_HEADING`]; retries also
/// restate the unmet criterion.
pub fn compose_prompt(step: &Step, context: &str, attempt: u32) -> String {
    let mut prompt = step.prompt.clone();

    if !context.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(CONTEXT_HEADING);
        prompt.push('\n');
        prompt.push_str(context);
    }

    if attempt > 1 {
        prompt.push_str(&format!(
            "\n\nIMPORTANT: Your previous answer failed validation. It MUST match this criteria: \"{}\". Please try again and strictly follow this rule.",
            step.criteria
        ));
    }

    prompt
}

async fn notify(sink: &dyn EventSink, event: ProgressEvent) {
    let kind = event.kind();
    if let Err(e) = sink.emit(event).await {
        debug!("Dropped {} event: {}", kind, e);
    }
}

/// Builder for constructing [`WorkflowEngine`] instances.
#[derive(Default)]
pub struct EngineBuilder {
    client: Option<Arc<dyn ChatClient>>,
    store: Option<Arc<dyn WorkflowStore>>,
    backoff: Backoff,
    call_timeout: Option<Duration>,
    step_pause: Option<Duration>,
}

impl EngineBuilder {
    /// Creates a new empty engine builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chat backend.
    pub fn client<C: ChatClient + 'static>(self, client: C) -> Self {
        self.shared_client(Arc::new(client))
    }

    /// Sets a chat backend that is shared with other owners.
    pub fn shared_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the persistence collaborator.
    pub fn store<S: WorkflowStore + 'static>(self, store: S) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Sets a persistence collaborator that is shared with other owners.
    pub fn shared_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the delay policy between attempts.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Limits each AI call. Calls that run over are recorded as failed output.
    pub fn call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    /// Pauses after announcing each step.
    pub fn step_pause(mut self, pause: Duration) -> Self {
        self.step_pause = Some(pause);
        self
    }

    /// Applies environment-derived settings.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        if let Some(delay) = config.retry_delay {
            self.backoff = Backoff::fixed(delay);
        }
        self.call_timeout = config.call_timeout.or(self.call_timeout);
        self.step_pause = config.step_pause.or(self.step_pause);
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Result<WorkflowEngine, WorkflowError> {
        let client = self.client.ok_or_else(|| {
            WorkflowError::Configuration("Chat client must be specified".to_string())
        })?;
        let store = self.store.ok_or_else(|| {
            WorkflowError::Configuration("Workflow store must be specified".to_string())
        })?;

        Ok(WorkflowEngine {
            client,
            store,
            backoff: self.backoff,
            call_timeout: self.call_timeout,
            step_pause: self.step_pause,
        })
    }
}
