//! LLM-as-judge grading of a transcript against free-text criteria.
//!
//! The chat model is built once per process and shared through
//! `Arc<dyn ChatModel>`. Every failure to obtain a verdict (transport,
//! status, empty or unparsable output) is a [`GradingError`]; there is no
//! retry and no default grade.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::agent::remote::is_loopback;
use crate::domain::{ConfigError, GradingError};

pub const RESPONSE_CRITERIA_SYSTEM_PROMPT: &str = "\
You are evaluating an email assistant that works on behalf of a user.

You will see a sequence of messages, starting with an email sent to the user.
You will then see the assistant's response to this email on behalf of the user,
which includes any tool calls made (e.g., write_email, schedule_meeting,
check_calendar_availability, done).

You will also see a list of criteria that the assistant's response must meet.

Your job is to evaluate if the assistant's response meets ALL the criteria
bulleted below.

If the response meets all the criteria, set grade to true. Otherwise set grade
to false. Justify the grade with specific examples from the response, naming
every criterion that was missed.";

pub const DEFAULT_GRADER_MODEL: &str = "openai/gpt-oss-20b";
pub const DEFAULT_GRADER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Verdict returned by the grading model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Whether the response meets the criteria.
    pub grade: bool,
    /// The justification for the grade, including examples from the response.
    pub justification: String,
}

/// Grading model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for GraderConfig {
    fn default() -> Self {
        GraderConfig {
            model: DEFAULT_GRADER_MODEL.to_string(),
            base_url: DEFAULT_GRADER_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.0,
        }
    }
}

impl GraderConfig {
    /// `OPENROUTER_API_KEY`, `EVAL_GRADER_MODEL`, `EVAL_GRADER_BASE_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        GraderConfig {
            model: std::env::var("EVAL_GRADER_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("EVAL_GRADER_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            ..defaults
        }
    }
}

/// A chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One system + user exchange; returns the raw assistant text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, GradingError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompatClient {
    config: GraderConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(config: GraderConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::Missing("OPENROUTER_API_KEY".to_string()))?;
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if is_loopback(&config.base_url) {
            builder = builder.no_proxy();
        }
        let http_client = builder
            .build()
            .map_err(|e| ConfigError::Missing(format!("http client: {e}")))?;
        Ok(Self {
            config,
            api_key,
            http_client,
        })
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": self.config.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "criteria_grade",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "grade": {
                                "type": "boolean",
                                "description": "Whether the response meets the criteria."
                            },
                            "justification": {
                                "type": "string",
                                "description": "The justification for the grade, including specific examples from the response."
                            }
                        },
                        "required": ["grade", "justification"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, GradingError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(model = %self.config.model, prompt_chars = user.len(), "sending grading request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system, user))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        extract_message_content(&body)
    }
}

/// `choices[0].message.content` of a chat completion response.
pub fn extract_message_content(body: &Value) -> Result<String, GradingError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or(GradingError::EmptyResponse)
}

/// Parse the model's structured output. A surrounding markdown code fence
/// is tolerated; anything else that is not the expected object is an error.
pub fn parse_grade(raw: &str) -> Result<GradeResult, GradingError> {
    let trimmed = raw.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    };
    serde_json::from_str(body).map_err(|e| GradingError::Unparsable(format!("{e}: {raw}")))
}

/// Grades transcripts with a shared chat model.
#[derive(Clone)]
pub struct CriteriaGrader {
    model: Arc<dyn ChatModel>,
}

impl CriteriaGrader {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn grade(&self, transcript: &str, criteria: &str) -> Result<GradeResult, GradingError> {
        let user = format!(
            "\n\nResponse criteria: {criteria}\n\nAssistant's response:\n\n{transcript}\n\nEvaluate whether the assistant's response meets the criteria and provide justification for your evaluation."
        );
        let raw = self
            .model
            .complete(RESPONSE_CRITERIA_SYSTEM_PROMPT, &user)
            .await?;
        let result = parse_grade(&raw)?;
        info!(model = %self.model.model_name(), grade = result.grade, "transcript graded");
        Ok(result)
    }
}
