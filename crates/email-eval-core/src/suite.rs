//! Test orchestration.
//!
//! Each case moves through `Setup → Execute → Extract → Compare` (or
//! `Grade` for criteria cases) and ends in `Pass` or `Fail`. A case fails
//! when an expected tool call is missing; extra calls are reported but
//! allowed. Agent, extraction and grading errors fail the case they occur
//! in. Configuration errors abort the whole suite.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;

use crate::dataset::{EmailDataset, ResponseCase};
use crate::domain::{ConfigError, EvalError, ExecutionState, Result};
use crate::extract::{extract_tool_calls, format_messages_string, ToolCallFacts};
use crate::grader::{CriteriaGrader, GradeResult};
use crate::obs;
use crate::runner::{AgentVariant, AssistantRunner};
use crate::sink::EvalSink;

pub const TOOL_CALL_TEST: &str = "test_email_dataset_tool_calls";
pub const CRITERIA_TEST: &str = "test_response_criteria_evaluation";

/// Lifecycle position of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePhase {
    Setup,
    Execute,
    Extract,
    Compare,
    Grade,
    Pass,
    Fail,
}

impl CasePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CasePhase::Setup => "setup",
            CasePhase::Execute => "execute",
            CasePhase::Extract => "extract",
            CasePhase::Compare => "compare",
            CasePhase::Grade => "grade",
            CasePhase::Pass => "pass",
            CasePhase::Fail => "fail",
        }
    }
}

/// Expected vs. actual tool calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallComparison {
    /// Expected calls absent from the trace, in expected order.
    pub missing: Vec<String>,
    /// Calls in the trace that were not expected, sorted.
    pub extra: Vec<String>,
}

impl ToolCallComparison {
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Case-insensitive set comparison. Passing requires only containment.
///
/// `missing` lists each absent name once, spelled as first expected.
pub fn compare_tool_calls(expected: &[String], actual: &ToolCallFacts) -> ToolCallComparison {
    let expected_lower: BTreeSet<String> = expected.iter().map(|c| c.to_lowercase()).collect();
    let mut seen = BTreeSet::new();
    let missing = expected
        .iter()
        .filter(|c| {
            let lower = c.to_lowercase();
            !actual.contains(&lower) && seen.insert(lower)
        })
        .cloned()
        .collect();
    let extra = actual
        .iter()
        .filter(|c| !expected_lower.contains(&c.to_lowercase()))
        .cloned()
        .collect();
    ToolCallComparison { missing, extra }
}

/// Result of one evaluated case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub test: String,
    pub case: String,
    pub index: usize,
    pub passed: bool,
    /// Last phase reached; `Pass`/`Fail` once the case completed.
    pub phase: CasePhase,
    pub extracted_tool_calls: Vec<String>,
    pub missing_calls: Vec<String>,
    pub extra_calls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub transcript: String,
    pub duration_ms: u64,
}

impl CaseOutcome {
    fn new(test: &str, case: &ResponseCase) -> Self {
        Self {
            test: test.to_string(),
            case: case.name.clone(),
            index: case.index,
            passed: false,
            phase: CasePhase::Setup,
            extracted_tool_calls: Vec::new(),
            missing_calls: Vec::new(),
            extra_calls: Vec::new(),
            grade: None,
            error: None,
            transcript: String::new(),
            duration_ms: 0,
        }
    }
}

/// Outcomes of one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub test: String,
    pub agent_module: String,
    pub dataset_digest: String,
    pub cases: Vec<CaseOutcome>,
}

impl SuiteReport {
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.cases.iter().filter(|c| !c.passed)
    }

    /// Fraction of passing cases; 0.0 for an empty suite.
    pub fn pass_rate(&self) -> f32 {
        if self.cases.is_empty() {
            return 0.0;
        }
        self.passed_count() as f32 / self.cases.len() as f32
    }

    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }
}

/// Drives dataset cases through the assistant and scores them.
pub struct EvalOrchestrator {
    runner: AssistantRunner,
    sink: Arc<dyn EvalSink>,
    grader: Option<CriteriaGrader>,
}

impl EvalOrchestrator {
    pub fn new(runner: AssistantRunner, sink: Arc<dyn EvalSink>) -> Self {
        Self {
            runner,
            sink,
            grader: None,
        }
    }

    pub fn with_grader(mut self, grader: CriteriaGrader) -> Self {
        self.grader = Some(grader);
        self
    }

    pub fn variant(&self) -> AgentVariant {
        self.runner.variant()
    }

    fn enter(&self, outcome: &mut CaseOutcome, phase: CasePhase) {
        outcome.phase = phase;
        obs::emit_case_phase(&outcome.case, phase.as_str());
    }

    fn log_inputs(&self, test: &str, case: &ResponseCase) {
        let inputs = json!({
            "module": self.variant().module_name(),
            "test": test,
            "case": case.name,
        });
        if let Err(e) = self.sink.log_inputs(&case.name, &inputs) {
            obs::emit_sink_error(&case.name, &e);
        }
    }

    fn log_outputs(&self, outcome: &CaseOutcome) {
        let mut outputs = json!({
            "extracted_tool_calls": outcome.extracted_tool_calls,
            "missing_calls": outcome.missing_calls,
            "extra_calls": outcome.extra_calls,
            "response": outcome.transcript,
        });
        if let Some(grade) = &outcome.grade {
            outputs["grade"] = json!(grade);
        }
        if let Some(error) = &outcome.error {
            outputs["error"] = json!(error);
        }
        if let Err(e) = self.sink.log_outputs(&outcome.case, &outputs) {
            obs::emit_sink_error(&outcome.case, &e);
        }
    }

    /// Setup and execute phases shared by both tests.
    async fn execute(&self, outcome: &mut CaseOutcome, case: &ResponseCase) -> Result<ExecutionState> {
        self.enter(outcome, CasePhase::Setup);
        let session = self.runner.setup()?;
        obs::emit_case_started(
            &case.name,
            self.variant().module_name(),
            session.thread.thread_id.as_str(),
        );

        self.enter(outcome, CasePhase::Execute);
        if !self.variant().is_canonical() {
            return Err(ConfigError::UnsupportedVariant {
                module: self.variant().module_name().to_string(),
                supported: AgentVariant::CANONICAL.module_name().to_string(),
            }
            .into());
        }
        let state = self.runner.invoke(&session, &case.email_input).await?;

        self.enter(outcome, CasePhase::Extract);
        outcome.transcript = format_messages_string(&state.messages);
        Ok(state)
    }

    /// Fatal errors propagate; anything else fails the case.
    fn settle(
        &self,
        mut outcome: CaseOutcome,
        result: Result<()>,
        started: Instant,
    ) -> Result<CaseOutcome> {
        match result {
            Err(e) if e.is_fatal() => {
                tracing::error!(case = %outcome.case, error = %e, "configuration error, aborting");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(case = %outcome.case, phase = outcome.phase.as_str(), error = %e, "case errored");
                outcome.error = Some(e.to_string());
                outcome.passed = false;
            }
            Ok(()) => {}
        }
        outcome.phase = if outcome.passed {
            CasePhase::Pass
        } else {
            CasePhase::Fail
        };
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        self.log_outputs(&outcome);
        obs::emit_case_finished(
            &outcome.case,
            outcome.passed,
            outcome.missing_calls.len(),
            outcome.extra_calls.len(),
            outcome.duration_ms,
        );
        Ok(outcome)
    }

    /// Check that the assistant issued every expected tool call.
    pub async fn run_tool_call_case(&self, case: &ResponseCase) -> Result<CaseOutcome> {
        self.tool_call_case(case)
            .instrument(obs::case_span(TOOL_CALL_TEST, &case.name))
            .await
    }

    async fn tool_call_case(&self, case: &ResponseCase) -> Result<CaseOutcome> {
        let started = Instant::now();
        self.log_inputs(TOOL_CALL_TEST, case);

        let mut outcome = CaseOutcome::new(TOOL_CALL_TEST, case);
        let result = async {
            let state = self.execute(&mut outcome, case).await?;
            let facts = extract_tool_calls(&state.messages);

            self.enter(&mut outcome, CasePhase::Compare);
            let comparison = compare_tool_calls(&case.expected_calls, &facts);
            outcome.passed = comparison.passed();
            outcome.extracted_tool_calls = facts.into_iter().collect();
            outcome.missing_calls = comparison.missing;
            outcome.extra_calls = comparison.extra;
            Ok::<(), EvalError>(())
        }
        .await;
        self.settle(outcome, result, started)
    }

    /// Grade the assistant's transcript against the case's criteria.
    pub async fn run_criteria_case(&self, case: &ResponseCase) -> Result<CaseOutcome> {
        let grader = self
            .grader
            .as_ref()
            .ok_or_else(|| ConfigError::Missing("criteria grader".to_string()))?;
        self.criteria_case(grader, case)
            .instrument(obs::case_span(CRITERIA_TEST, &case.name))
            .await
    }

    async fn criteria_case(&self, grader: &CriteriaGrader, case: &ResponseCase) -> Result<CaseOutcome> {
        let started = Instant::now();
        self.log_inputs(CRITERIA_TEST, case);

        let mut outcome = CaseOutcome::new(CRITERIA_TEST, case);
        let result = async {
            let state = self.execute(&mut outcome, case).await?;
            outcome.extracted_tool_calls = extract_tool_calls(&state.messages).into_iter().collect();

            self.enter(&mut outcome, CasePhase::Grade);
            let grade = grader.grade(&outcome.transcript, &case.criteria).await?;
            outcome.passed = grade.grade;
            outcome.grade = Some(grade);
            Ok::<(), EvalError>(())
        }
        .await;
        self.settle(outcome, result, started)
    }

    pub async fn run_tool_call_suite(&self, dataset: &EmailDataset) -> Result<SuiteReport> {
        let mut cases = Vec::new();
        for case in dataset.response_cases() {
            cases.push(self.run_tool_call_case(&case).await?);
        }
        Ok(self.report(TOOL_CALL_TEST, dataset, cases))
    }

    pub async fn run_criteria_suite(&self, dataset: &EmailDataset) -> Result<SuiteReport> {
        let mut cases = Vec::new();
        for case in dataset.response_cases() {
            cases.push(self.run_criteria_case(&case).await?);
        }
        Ok(self.report(CRITERIA_TEST, dataset, cases))
    }

    fn report(&self, test: &str, dataset: &EmailDataset, cases: Vec<CaseOutcome>) -> SuiteReport {
        let report = SuiteReport {
            test: test.to_string(),
            agent_module: self.variant().module_name().to_string(),
            dataset_digest: dataset.digest().to_string(),
            cases,
        };
        obs::emit_suite_finished(test, report.total(), report.passed_count(), report.pass_rate());
        report
    }
}
