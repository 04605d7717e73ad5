//! Storage trait definitions for agent graph execution
//!
//! These traits define the two persistence seams a compiled graph needs:
//! - `Checkpointer`: per-thread execution state, one checkpoint per step
//! - `MemoryStore`: namespaced key/value memory shared by the nodes of a graph
//!
//! All traits are async and backend-agnostic. In-memory implementations are
//! provided in the `memory` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StateError, StateResult};

// ---------------------------------------------------------------------------
// Thread identity
// ---------------------------------------------------------------------------

/// Identifier scoping one isolated execution / checkpoint lifeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    /// Generate a new random ThreadId
    pub fn new() -> Self {
        ThreadId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Checkpointer: per-thread execution state
// ---------------------------------------------------------------------------

/// A persisted snapshot of graph state after one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: ThreadId,
    pub checkpoint_id: String,
    /// Monotonic step counter within the thread, starting at 0
    pub step: u64,
    /// Full graph state values (messages plus any other channels)
    pub values: serde_json::Value,
    /// Nodes scheduled to run next; empty once the graph has finished
    pub next: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether the graph paused with work still pending (e.g. an interrupt).
    pub fn is_pending(&self) -> bool {
        !self.next.is_empty()
    }
}

/// Checkpoint persistence keyed by thread.
///
/// Guarantees:
/// - `put` appends; earlier checkpoints of the thread are kept.
/// - `latest` returns the checkpoint with the highest step, or `None` for a
///   thread that has never been written.
/// - Threads never observe each other's checkpoints.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Append a checkpoint for `thread_id` and return it.
    async fn put(
        &self,
        thread_id: &ThreadId,
        values: serde_json::Value,
        next: Vec<String>,
    ) -> StateResult<Checkpoint>;

    /// Latest checkpoint for a thread.
    async fn latest(&self, thread_id: &ThreadId) -> StateResult<Option<Checkpoint>>;

    /// Specific checkpoint by id. Returns `StateError::CheckpointNotFound` if absent.
    async fn get(&self, thread_id: &ThreadId, checkpoint_id: &str) -> StateResult<Checkpoint>;

    /// All checkpoints of a thread, oldest first.
    async fn history(&self, thread_id: &ThreadId) -> StateResult<Vec<Checkpoint>>;

    /// Drop every checkpoint of a thread. No-op if absent.
    async fn delete_thread(&self, thread_id: &ThreadId) -> StateResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryStore: namespaced key/value memory
// ---------------------------------------------------------------------------

/// Hierarchical namespace, e.g. `["email_assistant", "triage_preferences"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    /// Build a namespace; every label must be non-empty and there must be at least one.
    pub fn new<I, S>(labels: I) -> StateResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() || labels.iter().any(|l| l.is_empty()) {
            return Err(StateError::InvalidNamespace(labels));
        }
        Ok(Namespace(labels))
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// A stored memory value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreItem {
    pub namespace: Namespace,
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Namespaced key/value memory store.
///
/// Guarantees:
/// - `put` on an existing key replaces the value and keeps `created_at`.
/// - `search` returns items under a namespace prefix ordered by (namespace, key).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
    ) -> StateResult<()>;

    async fn get(&self, namespace: &Namespace, key: &str) -> StateResult<Option<StoreItem>>;

    async fn search(&self, prefix: &Namespace) -> StateResult<Vec<StoreItem>>;

    /// Delete a key. No-op if absent.
    async fn delete(&self, namespace: &Namespace, key: &str) -> StateResult<()>;
}
