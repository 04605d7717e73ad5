//! Assistant runner: one isolated session per test case.
//!
//! Every `setup` call compiles the graph against a fresh `MemorySaver`, a
//! fresh thread id and (for the memory variant only) a fresh `InMemoryStore`.
//! Nothing is shared between sessions, so back-to-back cases cannot leak
//! conversation state into one another.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use graph_state::{Checkpointer, InMemoryStore, MemorySaver, MemoryStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::{AgentGraph, Assistant, Command, GraphInput, ThreadConfig};
use crate::domain::{AgentError, ConfigError, EmailInput, ExecutionState, Result};

/// Assistant implementation under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentVariant {
    EmailAssistant,
    EmailAssistantHitl,
    EmailAssistantHitlMemory,
}

impl AgentVariant {
    /// The only variant that can run unattended.
    pub const CANONICAL: AgentVariant = AgentVariant::EmailAssistant;

    pub const ALL: [AgentVariant; 3] = [
        AgentVariant::EmailAssistant,
        AgentVariant::EmailAssistantHitl,
        AgentVariant::EmailAssistantHitlMemory,
    ];

    pub fn module_name(&self) -> &'static str {
        match self {
            AgentVariant::EmailAssistant => "email_assistant",
            AgentVariant::EmailAssistantHitl => "email_assistant_hitl",
            AgentVariant::EmailAssistantHitlMemory => "email_assistant_hitl_memory",
        }
    }

    /// Whether the compiled graph needs a long-term memory store.
    pub fn requires_store(&self) -> bool {
        matches!(self, AgentVariant::EmailAssistantHitlMemory)
    }

    pub fn is_canonical(&self) -> bool {
        *self == Self::CANONICAL
    }
}

impl Default for AgentVariant {
    fn default() -> Self {
        Self::CANONICAL
    }
}

impl fmt::Display for AgentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module_name())
    }
}

impl FromStr for AgentVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.module_name() == s)
            .ok_or_else(|| ConfigError::UnknownVariant(s.to_string()))
    }
}

/// One compiled assistant bound to its own thread and persistence.
pub struct Session {
    pub assistant: Arc<dyn Assistant>,
    pub thread: ThreadConfig,
    pub checkpointer: Arc<MemorySaver>,
    pub store: Option<Arc<InMemoryStore>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("thread", &self.thread)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

pub struct AssistantRunner {
    variant: AgentVariant,
    graph: Arc<dyn AgentGraph>,
}

impl AssistantRunner {
    pub fn new(variant: AgentVariant, graph: Arc<dyn AgentGraph>) -> Self {
        Self { variant, graph }
    }

    pub fn variant(&self) -> AgentVariant {
        self.variant
    }

    pub fn graph_name(&self) -> &str {
        self.graph.name()
    }

    /// Compile a fresh, isolated session.
    pub fn setup(&self) -> Result<Session> {
        let checkpointer = Arc::new(MemorySaver::new());
        let store = self
            .variant
            .requires_store()
            .then(|| Arc::new(InMemoryStore::new()));
        let assistant = self.graph.compile(
            checkpointer.clone() as Arc<dyn Checkpointer>,
            store.clone().map(|s| s as Arc<dyn MemoryStore>),
        )?;
        let thread = ThreadConfig::fresh();
        debug!(
            variant = %self.variant,
            thread_id = %thread.thread_id,
            with_store = store.is_some(),
            "assistant session created"
        );
        Ok(Session {
            assistant,
            thread,
            checkpointer,
            store,
        })
    }

    /// Run the assistant on one email until it finishes (or pauses).
    pub async fn invoke(&self, session: &Session, email: &EmailInput) -> Result<ExecutionState> {
        info!(thread_id = %session.thread.thread_id, subject = %email.subject, "invoking assistant");
        session
            .assistant
            .invoke(GraphInput::Values(email.to_graph_input()), &session.thread)
            .await?;
        self.final_state(session).await
    }

    /// Run the assistant on one email and collect every streamed chunk.
    pub async fn stream_email(&self, session: &Session, email: &EmailInput) -> Result<Vec<Value>> {
        collect(
            session,
            GraphInput::Values(email.to_graph_input()),
        )
        .await
    }

    /// Answer a pending interrupt and collect the chunks of the continued run.
    pub async fn resume(&self, session: &Session, command: Command) -> Result<Vec<Value>> {
        debug!(thread_id = %session.thread.thread_id, ?command, "resuming assistant");
        collect(session, GraphInput::Command(command)).await
    }

    /// Latest state of the session's thread.
    pub async fn final_state(&self, session: &Session) -> Result<ExecutionState> {
        let snapshot = session.assistant.get_state(&session.thread).await?;
        Ok(ExecutionState::from_values(&snapshot.values, snapshot.next)?)
    }
}

async fn collect(session: &Session, input: GraphInput) -> Result<Vec<Value>> {
    let stream = session.assistant.stream(input, &session.thread).await?;
    let chunks: Vec<std::result::Result<Value, AgentError>> = stream.collect().await;
    let chunks = chunks.into_iter().collect::<std::result::Result<Vec<_>, _>>()?;
    debug!(thread_id = %session.thread.thread_id, chunks = chunks.len(), "stream drained");
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::{sample_call, ScriptedGraph};
    use crate::domain::EvalError;

    fn email() -> EmailInput {
        EmailInput::new("alice@company.com", "lance@company.com", "API docs", "Hi")
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!(
            "email_assistant".parse::<AgentVariant>().unwrap(),
            AgentVariant::EmailAssistant
        );
        assert_eq!(
            "email_assistant_hitl_memory".parse::<AgentVariant>().unwrap(),
            AgentVariant::EmailAssistantHitlMemory
        );
        assert_eq!(
            "email_assistant_v2".parse::<AgentVariant>().unwrap_err(),
            ConfigError::UnknownVariant("email_assistant_v2".to_string())
        );
        assert_eq!(AgentVariant::default().to_string(), "email_assistant");
    }

    #[test]
    fn test_only_memory_variant_requires_store() {
        assert!(!AgentVariant::EmailAssistant.requires_store());
        assert!(!AgentVariant::EmailAssistantHitl.requires_store());
        assert!(AgentVariant::EmailAssistantHitlMemory.requires_store());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let runner = AssistantRunner::new(
            AgentVariant::EmailAssistantHitlMemory,
            Arc::new(ScriptedGraph::new("email_assistant_hitl_memory")),
        );
        let a = runner.setup().unwrap();
        let b = runner.setup().unwrap();
        assert_ne!(a.thread, b.thread);
        assert!(!Arc::ptr_eq(&a.checkpointer, &b.checkpointer));
        assert!(!Arc::ptr_eq(
            a.store.as_ref().unwrap(),
            b.store.as_ref().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_invoke_returns_final_state() {
        let e = email();
        let graph = ScriptedGraph::new("email_assistant")
            .with_default_plan(vec![sample_call("write_email", &e)]);
        let runner = AssistantRunner::new(AgentVariant::EmailAssistant, Arc::new(graph));
        let session = runner.setup().unwrap();
        let state = runner.invoke(&session, &e).await.unwrap();
        assert_eq!(state.messages.len(), 3);
        assert!(!state.is_interrupted());
    }

    #[tokio::test]
    async fn test_stream_then_resume() {
        let e = email();
        let graph = ScriptedGraph::new("email_assistant_hitl")
            .with_default_plan(vec![sample_call("write_email", &e), sample_call("done", &e)])
            .interrupting_on("write_email");
        let runner = AssistantRunner::new(AgentVariant::EmailAssistantHitl, Arc::new(graph));
        let session = runner.setup().unwrap();

        let chunks = runner.stream_email(&session, &e).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(runner.final_state(&session).await.unwrap().is_interrupted());

        let chunks = runner
            .resume(&session, Command::edit(serde_json::json!({
                "to": "alice@company.com",
                "subject": "Re: API docs",
                "content": "Edited reply"
            })))
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        let state = runner.final_state(&session).await.unwrap();
        assert!(!state.is_interrupted());
        let sent = state
            .messages
            .iter()
            .find(|m| m.label() == "Tool")
            .unwrap()
            .content()
            .as_text();
        assert!(sent.contains("Edited reply"));
    }

    #[tokio::test]
    async fn test_resume_last_step_reports_finished_thread() {
        let e = email();
        let graph = ScriptedGraph::new("email_assistant_hitl")
            .with_default_plan(vec![sample_call("write_email", &e)])
            .interrupting_on("write_email");
        let runner = AssistantRunner::new(AgentVariant::EmailAssistantHitl, Arc::new(graph));
        let session = runner.setup().unwrap();

        runner.stream_email(&session, &e).await.unwrap();
        assert!(runner.final_state(&session).await.unwrap().is_interrupted());

        runner.resume(&session, Command::accept()).await.unwrap();
        let state = runner.final_state(&session).await.unwrap();
        assert!(!state.is_interrupted());
        assert_eq!(state.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_agent_failure_propagates() {
        let graph = ScriptedGraph::new("email_assistant").failing_on("API docs");
        let runner = AssistantRunner::new(AgentVariant::EmailAssistant, Arc::new(graph));
        let session = runner.setup().unwrap();
        let err = runner.invoke(&session, &email()).await.unwrap_err();
        assert!(matches!(err, EvalError::Agent(AgentError::Execution(_))));
    }
}
