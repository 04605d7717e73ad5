//! Structured observability hooks for evaluation case lifecycle events.
//!
//! This module provides:
//! - Case-scoped tracing spans via [`case_span`]
//! - Emission functions for key lifecycle events: case start, phase change, finish, suite summary
//!
//! Events are emitted at `info!` level (configurable via `EMAIL_EVAL_LOG` env var).

use tracing::info;

/// Case-scoped span. Attach it to the case future with
/// [`tracing::Instrument::instrument`] so every event of the case carries
/// the test and case names, including events emitted after an `.await`.
///
/// # Example
///
/// ```ignore
/// run_case(case).instrument(case_span("test_email_dataset_tool_calls", "email_input_1")).await;
/// ```
pub fn case_span(test: &str, case: &str) -> tracing::Span {
    tracing::info_span!("eval.case", test = %test, case = %case)
}

/// Emit event: case started for an agent module.
pub fn emit_case_started(case: &str, module: &str, thread_id: &str) {
    info!(event = "case.started", case = %case, module = %module, thread_id = %thread_id);
}

/// Emit event: case entered a new phase.
pub fn emit_case_phase(case: &str, phase: &str) {
    tracing::debug!(event = "case.phase", case = %case, phase = %phase);
}

/// Emit event: case finished with verdict and call counts.
pub fn emit_case_finished(case: &str, passed: bool, missing: usize, extra: usize, duration_ms: u64) {
    info!(
        event = "case.finished",
        case = %case,
        passed = passed,
        missing = missing,
        extra = extra,
        duration_ms = duration_ms,
    );
}

/// Emit event: suite finished with pass rate.
pub fn emit_suite_finished(test: &str, total: usize, passed: usize, pass_rate: f32) {
    info!(
        event = "suite.finished",
        test = %test,
        total = total,
        passed = passed,
        pass_rate = pass_rate,
    );
}

/// Emit event: evaluation sink write failed (warning level).
pub fn emit_sink_error(case: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "sink.error", case = %case, error = %error);
}
