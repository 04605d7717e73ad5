//! Domain models for the evaluation harness.
//!
//! Canonical definitions for the core entities:
//! - `EmailInput` / `TriageLabel`: dataset inputs and expected classification
//! - `Message` / `ExecutionState`: the agent's conversation trace
//! - error taxonomy shared by every component

pub mod email;
pub mod error;
pub mod message;

pub use email::{EmailInput, TriageLabel};
pub use error::{AgentError, ConfigError, EvalError, ExtractionError, GradingError, Result};
pub use message::{parse_messages, ExecutionState, Message, MessageContent, ToolCallRecord};
