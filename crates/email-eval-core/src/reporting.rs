use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::suite::{CaseOutcome, SuiteReport};

pub const RESULTS_SCHEMA_VERSION: &str = "1.0";

/// Single case result in the persisted results artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseResultArtifact {
    pub case: String,
    pub index: usize,
    pub passed: bool,
    pub missing_calls: Vec<String>,
    pub extra_calls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl From<&CaseOutcome> for CaseResultArtifact {
    fn from(outcome: &CaseOutcome) -> Self {
        Self {
            case: outcome.case.clone(),
            index: outcome.index,
            passed: outcome.passed,
            missing_calls: outcome.missing_calls.clone(),
            extra_calls: outcome.extra_calls.clone(),
            grade: outcome.grade.as_ref().map(|g| g.grade),
            error: outcome.error.clone(),
            duration_ms: outcome.duration_ms,
        }
    }
}

/// Summary section of the results artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryArtifact {
    pub total_cases: usize,
    pub passed_cases: usize,
    pub pass_rate: f32,
    pub overall_pass: bool,
}

/// One suite inside the results artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteArtifact {
    pub test: String,
    pub summary: SummaryArtifact,
    pub cases: Vec<CaseResultArtifact>,
}

impl From<&SuiteReport> for SuiteArtifact {
    fn from(report: &SuiteReport) -> Self {
        Self {
            test: report.test.clone(),
            summary: SummaryArtifact {
                total_cases: report.total(),
                passed_cases: report.passed_count(),
                pass_rate: report.pass_rate(),
                overall_pass: report.all_passed(),
            },
            cases: report.cases.iter().map(CaseResultArtifact::from).collect(),
        }
    }
}

/// Canonical results artifact written for CI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub agent_module: String,
    pub dataset_digest: String,
    pub suites: Vec<SuiteArtifact>,
}

impl ResultsArtifact {
    pub fn from_reports(agent_module: &str, dataset_digest: &str, reports: &[SuiteReport]) -> Self {
        Self {
            schema_version: RESULTS_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            agent_module: agent_module.to_string(),
            dataset_digest: dataset_digest.to_string(),
            suites: reports.iter().map(SuiteArtifact::from).collect(),
        }
    }

    pub fn overall_pass(&self) -> bool {
        self.suites.iter().all(|s| s.summary.overall_pass)
    }
}

/// Write the results artifact in pretty JSON format.
pub fn write_results_json(path: &Path, artifact: &ResultsArtifact) -> Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize results artifact")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
    }
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary of one suite.
pub fn render_summary_md(report: &SuiteReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.test));
    out.push_str(&format!(
        "- module: `{}`\n- passed: {}/{} ({:.1}%)\n\n",
        report.agent_module,
        report.passed_count(),
        report.total(),
        report.pass_rate() * 100.0
    ));

    out.push_str("| case | result | missing | extra |\n|---|---|---|---|\n");
    for case in &report.cases {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            case.case,
            if case.passed { "PASS" } else { "FAIL" },
            join_or_dash(&case.missing_calls),
            join_or_dash(&case.extra_calls),
        ));
    }

    let errors: Vec<&CaseOutcome> = report.cases.iter().filter(|c| c.error.is_some()).collect();
    if !errors.is_empty() {
        out.push_str("\n## Errors\n");
        for case in errors {
            out.push_str(&format!(
                "- `{}`: {}\n",
                case.case,
                case.error.as_deref().unwrap_or_default()
            ));
        }
    }
    out
}

fn join_or_dash(calls: &[String]) -> String {
    if calls.is_empty() {
        "-".to_string()
    } else {
        calls.join(", ")
    }
}
