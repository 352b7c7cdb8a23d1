use async_trait::async_trait;
use futures::StreamExt;
use kusari::prelude::*;
use kusari::{
    decode_stream, stream_events, stream_run, CallError, StoreError, WorkflowDefinition,
    WorkflowEntry, WorkflowId, DEFAULT_HISTORY_LIMIT,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Debug)]
struct Reply(&'static str);

#[async_trait]
impl ChatClient for Reply {
    async fn complete(&self, _model: &str, _prompt: &str) -> Result<String, CallError> {
        Ok(self.0.to_string())
    }
}

/// Answers with the prompt's first line, so each step can be told apart.
#[derive(Debug, Default)]
struct EchoFirstLine {
    calls: AtomicU32,
    models: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatClient for EchoFirstLine {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().expect("model log").push(model.to_string());
        Ok(prompt.lines().next().unwrap_or_default().to_string())
    }
}

#[derive(Debug)]
struct Unavailable;

#[async_trait]
impl ChatClient for Unavailable {
    async fn complete(&self, _model: &str, _prompt: &str) -> Result<String, CallError> {
        Err(CallError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

/// Accepts workflows but rejects every execution record.
#[derive(Debug, Default)]
struct RejectingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl WorkflowStore for RejectingStore {
    async fn create_workflow(
        &self,
        name: String,
        steps: Vec<Step>,
    ) -> Result<WorkflowDefinition, StoreError> {
        self.inner.create_workflow(name, steps).await
    }

    async fn create_execution(
        &self,
        _workflow_id: WorkflowId,
        _status: RunStatus,
        _results: Vec<StepResult>,
    ) -> Result<ExecutionRecord, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn get_workflow(
        &self,
        id: WorkflowId,
        with_executions: bool,
    ) -> Result<Option<WorkflowEntry>, StoreError> {
        self.inner.get_workflow(id, with_executions).await
    }

    async fn list_workflows(
        &self,
        limit: usize,
        with_executions: bool,
    ) -> Result<Vec<WorkflowEntry>, StoreError> {
        self.inner.list_workflows(limit, with_executions).await
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<(), StoreError> {
        self.inner.delete_workflow(id).await
    }
}

fn engine<C: ChatClient + 'static>(client: C) -> WorkflowEngine {
    WorkflowEngine::builder()
        .client(client)
        .store(InMemoryStore::new())
        .build()
        .expect("valid engine")
}

#[tokio::test]
async fn test_single_step_end_to_end() {
    init_tracing();
    let engine = engine(Reply("hello"));
    let steps: Vec<Step> = serde_json::from_str(
        r#"[{"id": 1, "model": "m", "prompt": "p", "criteria": ""}]"#,
    )
    .expect("valid steps");

    let execution = engine
        .execute("T", steps, &NoopSink)
        .await
        .expect("run recorded");

    assert_eq!(execution.status, RunStatus::Completed);
    assert_eq!(
        execution.results,
        vec![StepResult {
            step_id: StepId::Number(1),
            output: "hello".to_string(),
            status: StepStatus::Success,
            criteria_match: true,
            attempts: 1,
        }]
    );
}

#[tokio::test]
async fn test_empty_workflow_completes() {
    let sink = CollectingSink::new();
    let execution = engine(Reply("unused"))
        .execute("", Vec::new(), &sink)
        .await
        .expect("run recorded");

    assert_eq!(execution.status, RunStatus::Completed);
    assert!(execution.results.is_empty());
    assert_eq!(sink.kinds(), vec!["WORKFLOW_START", "WORKFLOW_COMPLETE"]);
}

#[tokio::test]
async fn test_two_step_event_order() {
    let client = Arc::new(EchoFirstLine::default());
    let engine = WorkflowEngine::builder()
        .shared_client(client.clone())
        .store(InMemoryStore::new())
        .build()
        .expect("valid engine");
    let sink = CollectingSink::new();

    let steps = vec![
        Step::new(1, "model-a", "first"),
        Step::new(2, "model-b", "second"),
    ];
    let execution = engine
        .execute("two", steps, &sink)
        .await
        .expect("run recorded");

    let events = sink.events();
    assert_eq!(
        sink.kinds(),
        vec![
            "WORKFLOW_START",
            "STEP_START",
            "STEP_COMPLETE",
            "STEP_START",
            "STEP_COMPLETE",
            "WORKFLOW_COMPLETE"
        ]
    );
    assert!(matches!(
        &events[1],
        ProgressEvent::StepStart { step_id, model } if *step_id == StepId::Number(1) && model == "model-a"
    ));
    assert!(matches!(
        &events[3],
        ProgressEvent::StepStart { step_id, model } if *step_id == StepId::Number(2) && model == "model-b"
    ));
    assert!(matches!(
        &events[0],
        ProgressEvent::WorkflowStart { workflow_id } if *workflow_id == execution.workflow_id
    ));
    assert!(matches!(
        &events[5],
        ProgressEvent::WorkflowComplete { execution: reported } if *reported == execution
    ));
    assert_eq!(
        *client.models.lock().expect("model log"),
        vec!["model-a".to_string(), "model-b".to_string()]
    );
}

#[tokio::test]
async fn test_failed_step_stops_the_run() {
    let client = Arc::new(EchoFirstLine::default());
    let engine = WorkflowEngine::builder()
        .shared_client(client.clone())
        .store(InMemoryStore::new())
        .build()
        .expect("valid engine");
    let sink = CollectingSink::new();

    let steps = vec![
        Step::new(1, "m", "ok").with_criteria("ok"),
        Step::new(2, "m", "nope")
            .with_criteria("UNREACHABLE")
            .with_retry_limit(3),
        Step::new(3, "m", "never"),
    ];
    let execution = engine
        .execute("fail", steps, &sink)
        .await
        .expect("run recorded");

    assert_eq!(execution.status, RunStatus::Failed);
    assert_eq!(execution.results.len(), 2);
    let last = execution.results.last().expect("failing step recorded");
    assert_eq!(last.step_id, StepId::Number(2));
    assert_eq!(last.status, StepStatus::Failed);
    assert_eq!(last.attempts, 3);
    assert!(!last.criteria_match);
    assert_eq!(client.calls.load(Ordering::SeqCst), 4);

    assert_eq!(
        sink.kinds(),
        vec![
            "WORKFLOW_START",
            "STEP_START",
            "STEP_COMPLETE",
            "STEP_START",
            "STEP_RETRY",
            "STEP_RETRY",
            "STEP_COMPLETE",
            "WORKFLOW_COMPLETE"
        ]
    );
}

#[tokio::test]
async fn test_upstream_errors_consume_attempts() {
    let execution = engine(Unavailable)
        .execute("down", vec![Step::new("s", "m", "p").with_criteria("answer")], &NoopSink)
        .await
        .expect("run recorded");

    let result = &execution.results[0];
    assert_eq!(result.attempts, 3);
    assert_eq!(result.output, "[Error calling AI: API Error: 503 overloaded]");
    assert_eq!(execution.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_blank_criteria_never_retries() {
    let execution = engine(Unavailable)
        .execute("lenient", vec![Step::new(1, "m", "p").with_criteria("  ")], &NoopSink)
        .await
        .expect("run recorded");

    assert_eq!(execution.results[0].attempts, 1);
    assert_eq!(execution.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_runs_are_persisted_with_partial_results() {
    let store = Arc::new(InMemoryStore::new());
    let engine = WorkflowEngine::builder()
        .client(Reply("draft"))
        .shared_store(store.clone())
        .build()
        .expect("valid engine");

    engine
        .execute("  ", vec![Step::new(1, "m", "p").with_criteria("final")], &NoopSink)
        .await
        .expect("run recorded");
    engine
        .execute("second", vec![Step::new(1, "m", "p")], &NoopSink)
        .await
        .expect("run recorded");

    let history = store
        .list_workflows(DEFAULT_HISTORY_LIMIT, true)
        .await
        .expect("listed");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].workflow.name, "second");
    assert_eq!(history[1].workflow.name, "Untitled Run");

    let failed = history[1].executions.as_ref().expect("executions requested");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, RunStatus::Failed);
    assert_eq!(failed[0].results.len(), 1);
}

#[tokio::test]
async fn test_persistence_failure_propagates() {
    let engine = WorkflowEngine::builder()
        .client(Reply("x"))
        .store(RejectingStore::default())
        .build()
        .expect("valid engine");

    let result = engine
        .execute("w", vec![Step::new(1, "m", "p")], &NoopSink)
        .await;
    assert!(matches!(
        result,
        Err(WorkflowError::Store(StoreError::Backend(_)))
    ));
}

#[tokio::test]
async fn test_streamed_run_round_trips_through_decoder() {
    let engine = Arc::new(engine(Reply("```\nctx\n```")));
    let steps = vec![Step::new(1, "m", "a"), Step::new(2, "m", "b")];

    let lines = stream_run(engine, "streamed".to_string(), steps);
    let events: Vec<ProgressEvent> =
        decode_stream(lines.map(Ok::<_, std::io::Error>)).collect().await;

    let kinds: Vec<&str> = events.iter().map(ProgressEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "WORKFLOW_START",
            "STEP_START",
            "STEP_COMPLETE",
            "STEP_START",
            "STEP_COMPLETE",
            "WORKFLOW_COMPLETE"
        ]
    );
    assert!(events.last().map_or(false, ProgressEvent::is_terminal));
}

#[tokio::test]
async fn test_streamed_run_ends_with_error_event() {
    let engine = Arc::new(
        WorkflowEngine::builder()
            .client(Reply("x"))
            .store(RejectingStore::default())
            .build()
            .expect("valid engine"),
    );

    let events: Vec<ProgressEvent> =
        stream_events(engine, "w".to_string(), vec![Step::new(1, "m", "p")])
            .collect()
            .await;

    assert_eq!(
        events.iter().map(ProgressEvent::kind).collect::<Vec<_>>(),
        vec!["WORKFLOW_START", "STEP_START", "STEP_COMPLETE", "ERROR"]
    );
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error { message }) if message.contains("disk full")
    ));
}

#[tokio::test]
async fn test_concurrent_runs_share_one_engine() {
    let engine = Arc::new(engine(Reply("ok")));
    let runs = (0..4).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .execute(
                    &format!("run-{}", i),
                    vec![Step::new(1, "m", "p"), Step::new(2, "m", "q")],
                    &NoopSink,
                )
                .await
        })
    });

    for run in futures::future::join_all(runs).await {
        let execution = run.expect("task finished").expect("run recorded");
        assert_eq!(execution.status, RunStatus::Completed);
        assert_eq!(execution.results.len(), 2);
    }

    let history = engine
        .store()
        .list_workflows(DEFAULT_HISTORY_LIMIT, false)
        .await
        .expect("listed");
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn test_run_outlives_dropped_stream() {
    let engine = Arc::new(engine(Reply("ok")));
    let mut events = Box::pin(stream_events(
        engine.clone(),
        "abandoned".to_string(),
        vec![Step::new(1, "m", "p"), Step::new(2, "m", "q")],
    ));

    let first = events.next().await.expect("first event");
    assert_eq!(first.kind(), "WORKFLOW_START");
    drop(events);

    let mut recorded = None;
    for _ in 0..200 {
        let history = engine
            .store()
            .list_workflows(DEFAULT_HISTORY_LIMIT, true)
            .await
            .expect("listed");
        let executions = history
            .into_iter()
            .next()
            .and_then(|entry| entry.executions)
            .unwrap_or_default();
        if let Some(execution) = executions.into_iter().next() {
            recorded = Some(execution);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let execution = recorded.expect("run persisted after the consumer left");
    assert_eq!(execution.status, RunStatus::Completed);
    assert_eq!(execution.results.len(), 2);
}
