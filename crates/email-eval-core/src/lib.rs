//! Email Assistant Evaluation Core Library
//!
//! Re-exports the harness components: dataset provider, tool registry,
//! agent invocation surface, assistant runner, fact extraction, criteria
//! grader and test orchestrator.

pub mod agent;
pub mod credentials;
pub mod dataset;
pub mod domain;
pub mod extract;
pub mod grader;
pub mod obs;
pub mod reporting;
pub mod runner;
pub mod sink;
pub mod suite;
pub mod telemetry;
pub mod tools;

pub use agent::remote::{RemoteGraph, RemoteGraphConfig};
pub use agent::scripted::{ScriptedGraph, ScriptedPlans};
pub use agent::{AgentGraph, Assistant, Command, GraphInput, StateSnapshot, ThreadConfig};

pub use credentials::{load_gmail_credentials, GmailCredentials};

pub use dataset::{DatasetRow, EmailDataset, ResponseCase};

pub use domain::{
    AgentError, ConfigError, EmailInput, EvalError, ExecutionState, ExtractionError,
    GradingError, Message, MessageContent, Result, ToolCallRecord, TriageLabel,
};

pub use extract::{extract_tool_calls, format_messages_string, parse_messages, ToolCallFacts};

pub use grader::{
    ChatModel, CriteriaGrader, GradeResult, GraderConfig, OpenAiCompatClient,
    RESPONSE_CRITERIA_SYSTEM_PROMPT,
};

pub use reporting::{render_summary_md, write_results_json, ResultsArtifact};

pub use runner::{AgentVariant, AssistantRunner, Session};

pub use sink::{EvalSink, JsonlSink, MultiSink, SinkError, TracingSink};

pub use suite::{
    compare_tool_calls, CaseOutcome, CasePhase, EvalOrchestrator, SuiteReport,
    ToolCallComparison, CRITERIA_TEST, TOOL_CALL_TEST,
};

pub use tools::{Tool, ToolError, ToolRegistry, ToolSpec};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
