//! Client for a deployed LangGraph-compatible agent server.
//!
//! Endpoints used:
//! - `POST /threads` to create the thread
//! - `POST /threads/{id}/runs/wait` to run to completion
//! - `POST /threads/{id}/runs/stream` (server-sent events) to stream
//! - `GET  /threads/{id}/state` to read the final state
//!
//! After every run the server's thread state is mirrored into the session's
//! checkpointer, so `get_state` is answered locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use graph_state::{Checkpointer, MemoryStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{snapshot_from, Assistant, AgentGraph, ChunkStream, GraphInput, StateSnapshot, ThreadConfig};
use crate::domain::AgentError;

/// Remote graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteGraphConfig {
    /// Server base URL
    pub url: String,
    /// Graph / assistant id registered on the server
    pub assistant_id: String,
    /// API key sent as `x-api-key` (optional for local servers)
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for RemoteGraphConfig {
    fn default() -> Self {
        RemoteGraphConfig {
            url: std::env::var("LANGGRAPH_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:2024".to_string()),
            assistant_id: std::env::var("LANGGRAPH_ASSISTANT_ID")
                .unwrap_or_else(|_| "email_assistant".to_string()),
            api_key: std::env::var("LANGSMITH_API_KEY").ok(),
            timeout_secs: 600,
        }
    }
}

impl RemoteGraphConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(url: &str, assistant_id: &str) -> Self {
        RemoteGraphConfig {
            url: url.to_string(),
            assistant_id: assistant_id.to_string(),
            api_key: None,
            timeout_secs: 600,
        }
    }
}

/// A graph served over HTTP.
pub struct RemoteGraph {
    config: RemoteGraphConfig,
    http_client: reqwest::Client,
}

impl RemoteGraph {
    pub fn new(config: RemoteGraphConfig) -> Result<Self, AgentError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("email-eval/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs));
        if is_loopback(&config.url) {
            builder = builder.no_proxy();
        }
        let http_client = builder.build()?;
        Ok(RemoteGraph {
            config,
            http_client,
        })
    }
}

impl AgentGraph for RemoteGraph {
    fn name(&self) -> &str {
        &self.config.assistant_id
    }

    fn compile(
        &self,
        checkpointer: Arc<dyn Checkpointer>,
        store: Option<Arc<dyn MemoryStore>>,
    ) -> Result<Arc<dyn Assistant>, AgentError> {
        if store.is_some() {
            debug!("remote deployments keep long-term memory server-side; local store unused");
        }
        Ok(Arc::new(RemoteAssistant {
            config: self.config.clone(),
            http_client: self.http_client.clone(),
            checkpointer,
        }))
    }
}

struct RemoteAssistant {
    config: RemoteGraphConfig,
    http_client: reqwest::Client,
    checkpointer: Arc<dyn Checkpointer>,
}

impl RemoteAssistant {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, self.url(path));
        match &self.config.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AgentError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn ensure_thread(&self, config: &ThreadConfig) -> Result<(), AgentError> {
        let body = json!({ "thread_id": config.thread_id.as_str(), "if_exists": "do_nothing" });
        self.send(self.request(reqwest::Method::POST, "/threads").json(&body))
            .await?;
        Ok(())
    }

    fn run_body(&self, input: &GraphInput, extra: Value) -> Value {
        let mut body = json!({ "assistant_id": self.config.assistant_id });
        match input {
            GraphInput::Values(values) => body["input"] = values.clone(),
            GraphInput::Command(command) => body["command"] = json!(command),
        }
        if let (Some(map), Value::Object(extra)) = (body.as_object_mut(), extra) {
            map.extend(extra);
        }
        body
    }

    /// Fetch the server state and mirror it into the local checkpointer.
    async fn mirror_state(&self, config: &ThreadConfig) -> Result<StateSnapshot, AgentError> {
        let path = format!("/threads/{}/state", config.thread_id);
        let snapshot: StateSnapshot = self
            .send(self.request(reqwest::Method::GET, &path))
            .await?
            .json()
            .await?;
        self.checkpointer
            .put(&config.thread_id, snapshot.values.clone(), snapshot.next.clone())
            .await?;
        Ok(snapshot)
    }
}

#[async_trait]
impl Assistant for RemoteAssistant {
    async fn invoke(&self, input: GraphInput, config: &ThreadConfig) -> Result<Value, AgentError> {
        self.ensure_thread(config).await?;
        let path = format!("/threads/{}/runs/wait", config.thread_id);
        let body = self.run_body(&input, Value::Null);
        info!(thread_id = %config.thread_id, assistant_id = %self.config.assistant_id, "remote run started");
        self.send(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;
        let snapshot = self.mirror_state(config).await?;
        Ok(snapshot.values)
    }

    async fn stream(
        &self,
        input: GraphInput,
        config: &ThreadConfig,
    ) -> Result<ChunkStream, AgentError> {
        self.ensure_thread(config).await?;
        let path = format!("/threads/{}/runs/stream", config.thread_id);
        let body = self.run_body(&input, json!({ "stream_mode": "updates" }));
        let text = self
            .send(self.request(reqwest::Method::POST, &path).json(&body))
            .await?
            .text()
            .await?;
        let chunks = chunks_from_sse(&text)?;
        self.mirror_state(config).await?;
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn get_state(&self, config: &ThreadConfig) -> Result<StateSnapshot, AgentError> {
        snapshot_from(self.checkpointer.as_ref(), config).await
    }
}

/// Local servers are reached directly, bypassing any proxy set in the environment.
pub(crate) fn is_loopback(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str()
                .map(|h| matches!(h, "localhost" | "127.0.0.1" | "[::1]"))
        })
        .unwrap_or(false)
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Split a complete SSE body into events. Multi-line `data:` fields are
/// joined with `\n`; comment lines (`:`) are skipped.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut event = String::new();
    let mut data: Vec<&str> = Vec::new();

    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if !data.is_empty() || !event.is_empty() {
                events.push(SseEvent {
                    event: if event.is_empty() {
                        "message".to_string()
                    } else {
                        std::mem::take(&mut event)
                    },
                    data: data.join("\n"),
                });
                data.clear();
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }
    events
}

/// Decode the JSON payloads of an SSE body, dropping bookkeeping events.
fn chunks_from_sse(body: &str) -> Result<Vec<Value>, AgentError> {
    let mut chunks = Vec::new();
    for ev in parse_sse(body) {
        match ev.event.as_str() {
            "metadata" | "end" => continue,
            "error" => return Err(AgentError::Execution(ev.data)),
            _ => {}
        }
        if ev.data.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&ev.data)
            .map_err(|e| AgentError::Execution(format!("bad stream chunk: {e}")))?;
        chunks.push(value);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_events() {
        let body = "event: metadata\ndata: {\"run_id\": \"r1\"}\n\n: keepalive\n\nevent: updates\ndata: {\"triage_router\":\ndata: {\"classification_decision\": \"respond\"}}\n\nevent: end\n\n";
        let events = parse_sse(body);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event, "metadata");
        assert_eq!(events[1].event, "updates");
        assert_eq!(
            events[1].data,
            "{\"triage_router\":\n{\"classification_decision\": \"respond\"}}"
        );
        assert_eq!(events[2].event, "end");
        assert!(events[2].data.is_empty());
    }

    #[test]
    fn test_chunks_skip_bookkeeping() {
        let body = "event: metadata\ndata: {\"run_id\": \"r1\"}\n\nevent: updates\ndata: {\"a\": 1}\n\nevent: end\ndata: null\n\n";
        let chunks = chunks_from_sse(body).unwrap();
        assert_eq!(chunks, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_stream_error_event_fails() {
        let body = "event: error\ndata: {\"message\": \"boom\"}\n\n";
        let err = chunks_from_sse(body).unwrap_err();
        assert!(matches!(err, AgentError::Execution(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("http://127.0.0.1:2024"));
        assert!(is_loopback("http://localhost:8123/"));
        assert!(!is_loopback("https://openrouter.ai/api/v1"));
        assert!(!is_loopback("not a url"));
    }

    #[test]
    fn test_config_new() {
        let config = RemoteGraphConfig::new("http://localhost:2024/", "email_assistant");
        assert_eq!(config.assistant_id, "email_assistant");
        assert!(config.api_key.is_none());
    }
}
