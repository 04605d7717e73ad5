//! Message records and the uniform execution-state accessor.
//!
//! The agent framework serializes its conversation as a list of tagged
//! records (`human`, `ai`, `tool`, `system`). Parsing is strict: a record
//! with an unknown `type`, or a tool call without a `name`, is malformed and
//! rejected instead of being coerced into something plausible.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::ExtractionError;

/// Message body: plain text or a list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Flatten to text. Blocks contribute their `text` field; other block
    /// kinds are rendered as compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => match b.as_str() {
                        Some(s) => s.to_string(),
                        None => b.to_string(),
                    },
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub id: Option<String>,
}

/// One record of the conversation trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Human {
        #[serde(default)]
        content: MessageContent,
    },
    Ai {
        #[serde(default)]
        content: MessageContent,
        #[serde(default)]
        tool_calls: Vec<ToolCallRecord>,
    },
    Tool {
        #[serde(default)]
        content: MessageContent,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        tool_call_id: Option<String>,
    },
    System {
        #[serde(default)]
        content: MessageContent,
    },
}

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Message::Human {
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn ai(text: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Message::Ai {
            content: MessageContent::Text(text.into()),
            tool_calls,
        }
    }

    pub fn tool(name: impl Into<String>, tool_call_id: Option<String>, text: impl Into<String>) -> Self {
        Message::Tool {
            content: MessageContent::Text(text.into()),
            name: Some(name.into()),
            tool_call_id,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Message::System {
            content: MessageContent::Text(text.into()),
        }
    }

    /// Banner label used in transcripts ("Human", "Ai", "Tool", "System").
    pub fn label(&self) -> &'static str {
        match self {
            Message::Human { .. } => "Human",
            Message::Ai { .. } => "Ai",
            Message::Tool { .. } => "Tool",
            Message::System { .. } => "System",
        }
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            Message::Human { content }
            | Message::Ai { content, .. }
            | Message::Tool { content, .. }
            | Message::System { content } => content,
        }
    }

    /// Tool calls issued by this message; empty for non-`ai` records.
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        match self {
            Message::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Strictly parse a raw message list.
pub fn parse_messages(raw: &Value) -> Result<Vec<Message>, ExtractionError> {
    let list = raw.as_array().ok_or_else(|| ExtractionError::MessagesNotAList {
        found: json_kind(raw).to_string(),
    })?;
    list.iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value(record.clone())
                .map_err(|source| ExtractionError::MalformedMessage { index, source })
        })
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Final (or paused) state of one thread, as seen by the harness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionState {
    pub messages: Vec<Message>,
    /// Every other state channel (classification decision, email input, ...).
    pub values: serde_json::Map<String, Value>,
    /// Nodes still scheduled; non-empty when the graph is interrupted.
    pub next: Vec<String>,
}

impl ExecutionState {
    /// Build from the framework's state values.
    ///
    /// `null` and objects without a `messages` channel are valid empty
    /// traces. A `messages` channel that is not a list, or that holds a
    /// malformed record, is an error.
    pub fn from_values(values: &Value, next: Vec<String>) -> Result<Self, ExtractionError> {
        let mut channels = match values {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ExtractionError::StateNotAnObject {
                    found: json_kind(other).to_string(),
                })
            }
        };
        let messages = match channels.remove("messages") {
            Some(raw) => parse_messages(&raw)?,
            None => Vec::new(),
        };
        Ok(Self {
            messages,
            values: channels,
            next,
        })
    }

    pub fn from_checkpoint(cp: &graph_state::Checkpoint) -> Result<Self, ExtractionError> {
        Self::from_values(&cp.values, cp.next.clone())
    }

    pub fn is_interrupted(&self) -> bool {
        !self.next.is_empty()
    }

    /// Serialize back to the framework's value layout.
    pub fn to_values(&self) -> Value {
        let mut map = self.values.clone();
        map.insert(
            "messages".to_string(),
            serde_json::to_value(&self.messages).unwrap_or(Value::Array(Vec::new())),
        );
        Value::Object(map)
    }
}
