//! End-to-end tool-call evaluation against an in-process scripted graph.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use email_eval_core::agent::scripted::sample_call;
use email_eval_core::agent::ChunkStream;
use email_eval_core::{
    AgentError, AgentGraph, AgentVariant, Assistant, AssistantRunner, CasePhase, ConfigError,
    EmailDataset, EmailInput, EvalError, EvalOrchestrator, EvalSink, GraphInput, ScriptedGraph,
    SinkError, StateSnapshot, ThreadConfig, TracingSink, TriageLabel,
};
use graph_state::{Checkpointer, MemoryStore};
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingSink {
    inputs: Mutex<Vec<Value>>,
    outputs: Mutex<Vec<Value>>,
}

impl EvalSink for RecordingSink {
    fn log_inputs(&self, _case: &str, inputs: &Value) -> Result<(), SinkError> {
        self.inputs.lock().unwrap().push(inputs.clone());
        Ok(())
    }

    fn log_outputs(&self, _case: &str, outputs: &Value) -> Result<(), SinkError> {
        self.outputs.lock().unwrap().push(outputs.clone());
        Ok(())
    }
}

struct FailingSink;

impl EvalSink for FailingSink {
    fn log_inputs(&self, _: &str, _: &Value) -> Result<(), SinkError> {
        Err(SinkError::Rejected("tracing backend unavailable".into()))
    }

    fn log_outputs(&self, _: &str, _: &Value) -> Result<(), SinkError> {
        Err(SinkError::Rejected("tracing backend unavailable".into()))
    }
}

fn email(subject: &str) -> EmailInput {
    EmailInput::new(
        "Alice Smith <alice.smith@company.com>",
        "Lance Martin <lance@company.com>",
        subject,
        "Hi Lance",
    )
}

/// Two `respond` rows (both expecting `write_email`) and one `ignore` row.
fn dataset() -> EmailDataset {
    EmailDataset::from_columns(
        vec![email("API docs"), email("Newsletter"), email("Swim classes")],
        vec![
            "api_docs".into(),
            "newsletter".into(),
            "swim_classes".into(),
        ],
        vec![
            "Send email with write_email".into(),
            "No response needed".into(),
            "Send email with write_email".into(),
        ],
        vec![TriageLabel::Respond, TriageLabel::Ignore, TriageLabel::Respond],
        vec![vec!["write_email".into()], vec![], vec!["write_email".into()]],
    )
    .unwrap()
}

fn orchestrator(graph: ScriptedGraph, sink: Arc<dyn EvalSink>) -> EvalOrchestrator {
    EvalOrchestrator::new(
        AssistantRunner::new(AgentVariant::EmailAssistant, Arc::new(graph)),
        sink,
    )
}

#[tokio::test]
async fn extra_calls_are_allowed_and_reported() {
    let e = email("API docs");
    let graph = ScriptedGraph::new("email_assistant").with_plan(
        "API docs",
        vec![
            sample_call("check_calendar_availability", &e),
            sample_call("write_email", &e),
        ],
    );
    let sink = Arc::new(RecordingSink::default());
    let orch = orchestrator(graph, sink.clone());

    let case = &dataset().response_cases()[0];
    let outcome = orch.run_tool_call_case(case).await.unwrap();

    assert!(outcome.passed);
    assert_eq!(outcome.phase, CasePhase::Pass);
    assert!(outcome.missing_calls.is_empty());
    assert_eq!(outcome.extra_calls, vec!["check_calendar_availability"]);

    let outputs = sink.outputs.lock().unwrap();
    assert_eq!(outputs[0]["extra_calls"], json!(["check_calendar_availability"]));
    assert_eq!(outputs[0]["missing_calls"], json!([]));
    assert!(outputs[0]["response"]
        .as_str()
        .unwrap()
        .contains("write_email"));
}

#[tokio::test]
async fn no_tool_calls_fails_with_missing_write_email() {
    let sink = Arc::new(RecordingSink::default());
    let orch = orchestrator(ScriptedGraph::new("email_assistant"), sink.clone());

    let case = &dataset().response_cases()[0];
    let outcome = orch.run_tool_call_case(case).await.unwrap();

    assert!(!outcome.passed);
    assert_eq!(outcome.phase, CasePhase::Fail);
    assert_eq!(outcome.missing_calls, vec!["write_email"]);
    assert!(outcome.extracted_tool_calls.is_empty());
    assert!(outcome.error.is_none());
    assert_eq!(
        sink.inputs.lock().unwrap()[0],
        json!({"module": "email_assistant", "test": "test_email_dataset_tool_calls", "case": "api_docs"})
    );
}

#[tokio::test]
async fn ignore_rows_are_never_executed() {
    let ds = dataset();
    let graph = ScriptedGraph::from_dataset("email_assistant", &ds).failing_on("Newsletter");
    let orch = orchestrator(graph, Arc::new(TracingSink));

    let report = orch.run_tool_call_suite(&ds).await.unwrap();
    let names: Vec<_> = report.cases.iter().map(|c| c.case.as_str()).collect();
    assert_eq!(names, vec!["api_docs", "swim_classes"]);
    assert!(report.all_passed());
    assert_eq!(report.dataset_digest, ds.digest());
}

#[tokio::test]
async fn builtin_dataset_passes_against_its_own_plans() {
    let ds = EmailDataset::builtin().unwrap();
    let graph = ScriptedGraph::from_dataset("email_assistant", &ds);
    let orch = orchestrator(graph, Arc::new(TracingSink));

    let report = orch.run_tool_call_suite(&ds).await.unwrap();
    assert_eq!(report.total(), 7);
    assert!(report.all_passed(), "failures: {:?}", report.failed().collect::<Vec<_>>());
    assert!((report.pass_rate() - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn back_to_back_cases_do_not_share_state() {
    let e = email("API docs");
    let graph = Arc::new(
        ScriptedGraph::new("email_assistant")
            .with_plan("API docs", vec![sample_call("write_email", &e)])
            .with_plan("Swim classes", vec![sample_call("done", &e)]),
    );
    let runner = AssistantRunner::new(AgentVariant::EmailAssistant, graph);

    let first = runner.setup().unwrap();
    let state = runner.invoke(&first, &e).await.unwrap();
    assert!(!state.messages.is_empty());

    let second = runner.setup().unwrap();
    let initial = runner.final_state(&second).await.unwrap();
    assert!(initial.messages.is_empty());
    assert_eq!(second.checkpointer.thread_count(), 0);

    let state = runner.invoke(&second, &email("Swim classes")).await.unwrap();
    let calls = email_eval_core::extract_tool_calls(&state.messages);
    assert!(calls.contains("done"));
    assert!(!calls.contains("write_email"));
}

#[tokio::test]
async fn non_canonical_variant_is_a_configuration_error() {
    let graph = ScriptedGraph::new("email_assistant_hitl");
    let orch = EvalOrchestrator::new(
        AssistantRunner::new(AgentVariant::EmailAssistantHitl, Arc::new(graph)),
        Arc::new(TracingSink),
    );

    let err = orch.run_tool_call_suite(&dataset()).await.unwrap_err();
    assert!(err.is_fatal());
    match err {
        EvalError::Config(ConfigError::UnsupportedVariant { module, supported }) => {
            assert_eq!(module, "email_assistant_hitl");
            assert_eq!(supported, "email_assistant");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn agent_failure_fails_only_that_case() {
    let ds = dataset();
    let graph = ScriptedGraph::from_dataset("email_assistant", &ds).failing_on("API docs");
    let orch = orchestrator(graph, Arc::new(TracingSink));

    let report = orch.run_tool_call_suite(&ds).await.unwrap();
    assert_eq!(report.passed_count(), 1);
    let failed = &report.cases[0];
    assert!(!failed.passed);
    assert_eq!(failed.phase, CasePhase::Fail);
    assert!(failed.error.as_deref().unwrap().contains("scripted failure"));
}

#[tokio::test]
async fn sink_failures_do_not_change_outcomes() {
    let ds = dataset();
    let graph = ScriptedGraph::from_dataset("email_assistant", &ds);
    let orch = orchestrator(graph, Arc::new(FailingSink));

    let report = orch.run_tool_call_suite(&ds).await.unwrap();
    assert!(report.all_passed());
}

/// Wraps a graph and counts `get_state` calls across all compiled sessions.
struct CountingGraph {
    inner: ScriptedGraph,
    state_reads: Arc<AtomicUsize>,
}

struct CountingAssistant {
    inner: Arc<dyn Assistant>,
    state_reads: Arc<AtomicUsize>,
}

impl AgentGraph for CountingGraph {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn compile(
        &self,
        checkpointer: Arc<dyn Checkpointer>,
        store: Option<Arc<dyn MemoryStore>>,
    ) -> Result<Arc<dyn Assistant>, AgentError> {
        Ok(Arc::new(CountingAssistant {
            inner: self.inner.compile(checkpointer, store)?,
            state_reads: self.state_reads.clone(),
        }))
    }
}

#[async_trait]
impl Assistant for CountingAssistant {
    async fn invoke(&self, input: GraphInput, config: &ThreadConfig) -> Result<Value, AgentError> {
        self.inner.invoke(input, config).await
    }

    async fn stream(
        &self,
        input: GraphInput,
        config: &ThreadConfig,
    ) -> Result<ChunkStream, AgentError> {
        self.inner.stream(input, config).await
    }

    async fn get_state(&self, config: &ThreadConfig) -> Result<StateSnapshot, AgentError> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_state(config).await
    }
}

#[tokio::test]
async fn each_case_reads_thread_state_once() {
    let ds = dataset();
    let state_reads = Arc::new(AtomicUsize::new(0));
    let graph = CountingGraph {
        inner: ScriptedGraph::from_dataset("email_assistant", &ds),
        state_reads: state_reads.clone(),
    };
    let orch = EvalOrchestrator::new(
        AssistantRunner::new(AgentVariant::EmailAssistant, Arc::new(graph)),
        Arc::new(TracingSink),
    );

    let report = orch.run_tool_call_suite(&ds).await.unwrap();
    assert!(report.all_passed());
    assert_eq!(state_reads.load(Ordering::SeqCst), report.total());
}
