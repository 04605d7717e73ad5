//! Agent invocation surface.
//!
//! The assistant is a graph owned by an external orchestration framework.
//! The harness only needs four operations from it:
//! - [`AgentGraph::compile`] with a checkpointer and, for memory variants, a store
//! - [`Assistant::invoke`] to run a thread to completion
//! - [`Assistant::stream`] to observe intermediate chunks
//! - [`Assistant::get_state`] to read the thread's latest state
//!
//! Two graphs are provided: [`remote::RemoteGraph`] for a deployed
//! LangGraph-compatible server and [`scripted::ScriptedGraph`], an
//! in-process replay of planned tool calls.

pub mod remote;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use graph_state::{Checkpointer, MemoryStore, ThreadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::AgentError;

/// Per-invocation configuration scoping execution to one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    pub thread_id: ThreadId,
}

impl ThreadConfig {
    /// A config for a brand-new thread.
    pub fn fresh() -> Self {
        Self {
            thread_id: ThreadId::new(),
        }
    }

    /// Framework wire layout: `{"configurable": {"thread_id": ...}}`.
    pub fn to_configurable(&self) -> Value {
        serde_json::json!({ "configurable": { "thread_id": self.thread_id.as_str() } })
    }
}

/// Follow-up directive for a paused (interrupted) graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

impl Command {
    pub fn resume(value: Value) -> Self {
        Self {
            resume: Some(value),
            ..Self::default()
        }
    }

    /// Accept the pending action as proposed.
    pub fn accept() -> Self {
        Self::resume(serde_json::json!([{ "type": "accept", "args": "" }]))
    }

    /// Reply to the pending action with free-text feedback.
    pub fn respond(feedback: impl Into<String>) -> Self {
        Self::resume(serde_json::json!([{ "type": "response", "args": feedback.into() }]))
    }

    /// Replace the pending action's arguments.
    pub fn edit(args: Value) -> Self {
        Self::resume(serde_json::json!([{ "type": "edit", "args": { "args": args } }]))
    }

    /// Skip the pending action.
    pub fn ignore() -> Self {
        Self::resume(serde_json::json!([{ "type": "ignore", "args": "" }]))
    }

    pub fn goto(node: impl Into<String>) -> Self {
        Self {
            goto: Some(node.into()),
            ..Self::default()
        }
    }
}

/// What to feed the graph: fresh input values or a resume command.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphInput {
    Values(Value),
    Command(Command),
}

/// Raw state as reported by the framework.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub values: Value,
    #[serde(default)]
    pub next: Vec<String>,
}

pub type ChunkStream = BoxStream<'static, Result<Value, AgentError>>;

/// A compiled, runnable assistant.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Run to completion (or to the next interrupt) and return the final values.
    async fn invoke(&self, input: GraphInput, config: &ThreadConfig) -> Result<Value, AgentError>;

    /// Run and yield intermediate chunks.
    async fn stream(&self, input: GraphInput, config: &ThreadConfig)
        -> Result<ChunkStream, AgentError>;

    /// Latest state of a thread; empty for a thread that never ran.
    async fn get_state(&self, config: &ThreadConfig) -> Result<StateSnapshot, AgentError>;
}

/// An uncompiled workflow.
pub trait AgentGraph: Send + Sync {
    fn name(&self) -> &str;

    fn compile(
        &self,
        checkpointer: Arc<dyn Checkpointer>,
        store: Option<Arc<dyn MemoryStore>>,
    ) -> Result<Arc<dyn Assistant>, AgentError>;
}

/// Read a thread's latest checkpoint as a snapshot.
pub(crate) async fn snapshot_from(
    checkpointer: &dyn Checkpointer,
    config: &ThreadConfig,
) -> Result<StateSnapshot, AgentError> {
    Ok(match checkpointer.latest(&config.thread_id).await? {
        Some(cp) => StateSnapshot {
            values: cp.values,
            next: cp.next,
        },
        None => StateSnapshot::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_configurable_layout() {
        let config = ThreadConfig {
            thread_id: ThreadId("t-1".to_string()),
        };
        assert_eq!(
            config.to_configurable(),
            json!({"configurable": {"thread_id": "t-1"}})
        );
    }

    #[test]
    fn test_command_serializes_only_set_fields() {
        let cmd = Command::accept();
        let raw = serde_json::to_value(&cmd).unwrap();
        assert_eq!(raw, json!({"resume": [{"type": "accept", "args": ""}]}));

        let raw = serde_json::to_value(Command::goto("response_agent")).unwrap();
        assert_eq!(raw, json!({"goto": "response_agent"}));
    }

    #[test]
    fn test_fresh_configs_differ() {
        assert_ne!(ThreadConfig::fresh(), ThreadConfig::fresh());
    }
}
