//! Error taxonomy for the evaluation harness.
//!
//! Configuration errors are fatal and never retried. Extraction, grading and
//! agent errors fail the case they occur in. Missing tool calls are not
//! errors at all: they are reported through `CaseOutcome`.

/// Fatal setup problems.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "unsupported agent module: {module}. Only '{supported}' is supported in automated testing"
    )]
    UnsupportedVariant { module: String, supported: String },

    #[error("unknown agent module: {0}")]
    UnknownVariant(String),

    #[error(
        "dataset columns are misaligned: email_inputs={inputs}, email_names={names}, \
         response_criteria_list={criteria}, triage_outputs_list={triage}, \
         expected_tool_calls={tool_calls}"
    )]
    MisalignedDataset {
        inputs: usize,
        names: usize,
        criteria: usize,
        triage: usize,
        tool_calls: usize,
    },

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("missing configuration value: {0}")]
    Missing(String),
}

/// Malformed message traces.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("state values must be an object, found {found}")]
    StateNotAnObject { found: String },

    #[error("state has no message list: field 'messages' is {found}")]
    MessagesNotAList { found: String },

    #[error("malformed message at index {index}: {source}")]
    MalformedMessage {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Criteria grading could not produce a verdict.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("grading model request failed: {0}")]
    Transport(String),

    #[error("grading model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("grading model response has no message content")]
    EmptyResponse,

    #[error("unparsable grade: {0}")]
    Unparsable(String),
}

impl From<reqwest::Error> for GradingError {
    fn from(err: reqwest::Error) -> Self {
        GradingError::Transport(err.to_string())
    }
}

/// Failures raised by the agent graph or its transport.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent graph failed to compile: {0}")]
    Compile(String),

    #[error("agent execution failed: {0}")]
    Execution(String),

    #[error("agent server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("agent transport error: {0}")]
    Transport(String),

    #[error("state error: {0}")]
    State(#[from] graph_state::StateError),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

/// Harness-level error aggregating every concern.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("grading error: {0}")]
    Grading(#[from] GradingError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// Configuration errors abort the whole run instead of failing one case.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::Config(_))
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_variant_display() {
        let err = ConfigError::UnsupportedVariant {
            module: "email_assistant_hitl".to_string(),
            supported: "email_assistant".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("email_assistant_hitl"));
        assert!(msg.contains("Only 'email_assistant'"));
    }

    #[test]
    fn test_misaligned_dataset_lists_every_length() {
        let err = ConfigError::MisalignedDataset {
            inputs: 3,
            names: 3,
            criteria: 2,
            triage: 3,
            tool_calls: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("response_criteria_list=2"));
        assert!(msg.contains("email_inputs=3"));
    }

    #[test]
    fn test_config_errors_are_fatal() {
        let err: EvalError = ConfigError::UnknownVariant("x".into()).into();
        assert!(err.is_fatal());

        let err: EvalError = GradingError::EmptyResponse.into();
        assert!(!err.is_fatal());
    }
}
