//! Observability tests: lifecycle events are emitted with their fields.

use std::sync::Arc;

use email_eval_core::obs::{
    case_span, emit_case_finished, emit_case_phase, emit_case_started, emit_sink_error,
    emit_suite_finished,
};
use email_eval_core::{
    AgentVariant, AssistantRunner, EmailDataset, EvalOrchestrator, ScriptedGraph, TracingSink,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_case_started_logs_case_and_module() {
    emit_case_started("email_input_1", "email_assistant", "thread-1");
    assert!(logs_contain("case.started"));
    assert!(logs_contain("email_input_1"));
    assert!(logs_contain("thread-1"));
}

#[traced_test]
#[test]
fn test_emit_case_finished_logs_verdict() {
    emit_case_finished("email_input_4", false, 1, 0, 12);
    assert!(logs_contain("case.finished"));
    assert!(logs_contain("passed=false"));
    assert!(logs_contain("missing=1"));
}

#[traced_test]
#[test]
fn test_emit_suite_finished_logs_pass_rate() {
    emit_suite_finished("test_email_dataset_tool_calls", 7, 7, 1.0);
    assert!(logs_contain("suite.finished"));
    assert!(logs_contain("total=7"));
}

#[traced_test]
#[test]
fn test_emit_sink_error_logs_warning() {
    emit_sink_error("email_input_1", &"connection reset");
    assert!(logs_contain("sink.error"));
    assert!(logs_contain("connection reset"));
}

#[traced_test]
#[test]
fn test_case_phase_inside_span() {
    let span = case_span("test_email_dataset_tool_calls", "email_input_1");
    let _entered = span.enter();
    emit_case_phase("email_input_1", "execute");
    assert!(logs_contain("case.phase"));
    assert!(logs_contain("eval.case"));
}

#[tokio::test]
#[traced_test]
async fn test_suite_run_emits_lifecycle_events() {
    let ds = EmailDataset::builtin().unwrap();
    let orch = EvalOrchestrator::new(
        AssistantRunner::new(
            AgentVariant::EmailAssistant,
            Arc::new(ScriptedGraph::from_dataset("email_assistant", &ds)),
        ),
        Arc::new(TracingSink),
    );
    orch.run_tool_call_suite(&ds).await.unwrap();
    assert!(logs_contain("case.started"));
    assert!(logs_contain("case.finished"));
    assert!(logs_contain("suite.finished"));
}
