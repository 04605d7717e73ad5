//! Criteria evaluation: transcript grading through a shared chat model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use email_eval_core::agent::scripted::sample_call;
use email_eval_core::{
    AgentVariant, AssistantRunner, CasePhase, ChatModel, ConfigError, CriteriaGrader,
    EmailDataset, EvalError, EvalOrchestrator, GradingError, ScriptedGraph, TracingSink,
};

/// Grades `true` when the transcript (not the criteria) mentions `write_email`.
struct KeywordJudge {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for KeywordJudge {
    fn model_name(&self) -> &str {
        "keyword-judge"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String, GradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let transcript = user.split("Assistant's response:").nth(1).unwrap_or_default();
        let grade = transcript.contains("write_email");
        Ok(format!(
            r#"{{"grade": {grade}, "justification": "keyword check"}}"#
        ))
    }
}

struct DownJudge;

#[async_trait]
impl ChatModel for DownJudge {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _: &str, _: &str) -> Result<String, GradingError> {
        Err(GradingError::Status {
            status: 503,
            body: "upstream unavailable".into(),
        })
    }
}

fn orchestrator(graph: ScriptedGraph) -> EvalOrchestrator {
    EvalOrchestrator::new(
        AssistantRunner::new(AgentVariant::EmailAssistant, Arc::new(graph)),
        Arc::new(TracingSink),
    )
}

#[tokio::test]
async fn grader_is_shared_across_cases() {
    let ds = EmailDataset::builtin().unwrap();
    let judge = Arc::new(KeywordJudge {
        calls: AtomicUsize::new(0),
    });
    let orch = orchestrator(ScriptedGraph::from_dataset("email_assistant", &ds))
        .with_grader(CriteriaGrader::new(judge.clone()));

    let report = orch.run_criteria_suite(&ds).await.unwrap();
    assert_eq!(report.total(), 7);
    assert!(report.all_passed());
    assert_eq!(judge.calls.load(Ordering::SeqCst), 7);
    assert!(report.cases.iter().all(|c| c.grade.is_some()));
}

#[tokio::test]
async fn negative_grade_fails_case() {
    let ds = EmailDataset::builtin().unwrap();
    let case = ds.response_cases().remove(0);
    let graph = ScriptedGraph::new("email_assistant").with_plan(
        case.email_input.subject.clone(),
        vec![sample_call("done", &case.email_input)],
    );
    let orch = orchestrator(graph).with_grader(CriteriaGrader::new(Arc::new(KeywordJudge {
        calls: AtomicUsize::new(0),
    })));

    let outcome = orch.run_criteria_case(&case).await.unwrap();
    assert!(!outcome.passed);
    assert_eq!(outcome.grade.unwrap().justification, "keyword check");
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn grading_error_fails_case_without_aborting() {
    let ds = EmailDataset::builtin().unwrap();
    let orch = orchestrator(ScriptedGraph::from_dataset("email_assistant", &ds))
        .with_grader(CriteriaGrader::new(Arc::new(DownJudge)));

    let report = orch.run_criteria_suite(&ds).await.unwrap();
    assert_eq!(report.passed_count(), 0);
    for case in &report.cases {
        assert_eq!(case.phase, CasePhase::Fail);
        assert!(case.error.as_deref().unwrap().contains("503"));
        assert!(!case.transcript.is_empty());
    }
}

#[tokio::test]
async fn criteria_without_grader_is_configuration_error() {
    let ds = EmailDataset::builtin().unwrap();
    let orch = orchestrator(ScriptedGraph::from_dataset("email_assistant", &ds));
    let err = orch.run_criteria_suite(&ds).await.unwrap_err();
    assert!(matches!(err, EvalError::Config(ConfigError::Missing(_))));
}
