//! Assistant tool registry.
//!
//! Exposes the calendar and email actions the assistant may call:
//! - `write_email`, `triage_email`, `Done` (email tools)
//! - `schedule_meeting`, `check_calendar_availability` (calendar tools)
//!
//! Tools are looked up by name, either all at once ([`ToolRegistry::get_tools`])
//! or as a filtered subset ([`ToolRegistry::get_tools_by_name`]). Arguments are
//! checked against each tool's required fields before invocation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Message, ToolCallRecord};

pub const WRITE_EMAIL: &str = "write_email";
pub const TRIAGE_EMAIL: &str = "triage_email";
pub const DONE: &str = "Done";
pub const SCHEDULE_MEETING: &str = "schedule_meeting";
pub const CHECK_CALENDAR_AVAILABILITY: &str = "check_calendar_availability";

/// Minimal JSON schema: required top-level fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonFieldSchema {
    pub required_fields: Vec<String>,
}

impl JsonFieldSchema {
    pub fn required<const N: usize>(fields: [&str; N]) -> Self {
        Self {
            required_fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }
}

/// Tool description as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: JsonFieldSchema,
}

/// Tool failure taxonomy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("duplicate tool registration: {tool_name}")]
    DuplicateTool { tool_name: String },

    #[error("tool '{tool_name}' is missing required argument '{field}'")]
    MissingArgument { tool_name: String, field: String },

    #[error("tool '{tool_name}' got an invalid '{field}': {reason}")]
    InvalidArgument {
        tool_name: String,
        field: String,
        reason: String,
    },
}

/// A callable capability exposed to the assistant.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    /// Run the tool on already-validated arguments.
    async fn call(&self, args: &Value) -> Result<String, ToolError>;

    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Validate `args` against the spec, then run the tool.
    async fn invoke(&self, args: &Value) -> Result<String, ToolError> {
        validate_args(self.spec(), args)?;
        self.call(args).await
    }
}

fn validate_args(spec: &ToolSpec, args: &Value) -> Result<(), ToolError> {
    for field in &spec.input_schema.required_fields {
        if args.get(field).is_none() {
            return Err(ToolError::MissingArgument {
                tool_name: spec.name.clone(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

fn str_arg<'a>(tool: &str, args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgument {
            tool_name: tool.to_string(),
            field: field.to_string(),
            reason: "expected a string".to_string(),
        })
}

fn int_arg(tool: &str, args: &Value, field: &str) -> Result<i64, ToolError> {
    args.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolError::InvalidArgument {
            tool_name: tool.to_string(),
            field: field.to_string(),
            reason: "expected an integer".to_string(),
        })
}

// ---------------------------------------------------------------------------
// Email tools
// ---------------------------------------------------------------------------

/// Write and send an email.
pub struct WriteEmail {
    spec: ToolSpec,
}

impl Default for WriteEmail {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: WRITE_EMAIL.to_string(),
                description: "Write and send an email.".to_string(),
                input_schema: JsonFieldSchema::required(["to", "subject", "content"]),
            },
        }
    }
}

#[async_trait]
impl Tool for WriteEmail {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let to = str_arg(WRITE_EMAIL, args, "to")?;
        let subject = str_arg(WRITE_EMAIL, args, "subject")?;
        let content = str_arg(WRITE_EMAIL, args, "content")?;
        Ok(format!(
            "Email sent to {to} with subject '{subject}' and content: {content}"
        ))
    }
}

/// Classify an email as ignore / notify / respond.
pub struct TriageEmail {
    spec: ToolSpec,
}

impl Default for TriageEmail {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: TRIAGE_EMAIL.to_string(),
                description: "Triage an email into one of three categories: ignore, notify, respond."
                    .to_string(),
                input_schema: JsonFieldSchema::required(["category"]),
            },
        }
    }
}

#[async_trait]
impl Tool for TriageEmail {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let category = str_arg(TRIAGE_EMAIL, args, "category")?;
        match category {
            "ignore" | "notify" | "respond" => Ok(format!("Classification Decision: {category}")),
            other => Err(ToolError::InvalidArgument {
                tool_name: TRIAGE_EMAIL.to_string(),
                field: "category".to_string(),
                reason: format!("'{other}' is not one of ignore, notify, respond"),
            }),
        }
    }
}

/// Completion marker: the assistant calls it once the email is handled.
pub struct Done {
    spec: ToolSpec,
}

impl Default for Done {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: DONE.to_string(),
                description: "E-mail has been sent.".to_string(),
                input_schema: JsonFieldSchema::required(["done"]),
            },
        }
    }
}

#[async_trait]
impl Tool for Done {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        match args.get("done").and_then(Value::as_bool) {
            Some(done) => Ok(format!("done={done}")),
            None => Err(ToolError::InvalidArgument {
                tool_name: DONE.to_string(),
                field: "done".to_string(),
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar tools
// ---------------------------------------------------------------------------

/// Schedule a calendar meeting.
pub struct ScheduleMeeting {
    spec: ToolSpec,
}

impl Default for ScheduleMeeting {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: SCHEDULE_MEETING.to_string(),
                description: "Schedule a calendar meeting.".to_string(),
                input_schema: JsonFieldSchema::required([
                    "attendees",
                    "subject",
                    "duration_minutes",
                    "preferred_day",
                    "start_time",
                ]),
            },
        }
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[async_trait]
impl Tool for ScheduleMeeting {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let attendees = args
            .get("attendees")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArgument {
                tool_name: SCHEDULE_MEETING.to_string(),
                field: "attendees".to_string(),
                reason: "expected a list".to_string(),
            })?;
        let subject = str_arg(SCHEDULE_MEETING, args, "subject")?;
        let duration = int_arg(SCHEDULE_MEETING, args, "duration_minutes")?;
        let start_time = int_arg(SCHEDULE_MEETING, args, "start_time")?;
        let raw_day = str_arg(SCHEDULE_MEETING, args, "preferred_day")?;
        let day = parse_day(raw_day).ok_or_else(|| ToolError::InvalidArgument {
            tool_name: SCHEDULE_MEETING.to_string(),
            field: "preferred_day".to_string(),
            reason: format!("'{raw_day}' is not a date"),
        })?;

        Ok(format!(
            "Meeting '{subject}' scheduled on {} at {start_time} for {duration} minutes with {} attendees",
            day.format("%A, %B %d, %Y"),
            attendees.len()
        ))
    }
}

/// Check calendar availability for a given day.
pub struct CheckCalendarAvailability {
    spec: ToolSpec,
}

impl Default for CheckCalendarAvailability {
    fn default() -> Self {
        Self {
            spec: ToolSpec {
                name: CHECK_CALENDAR_AVAILABILITY.to_string(),
                description: "Check calendar availability for a given day.".to_string(),
                input_schema: JsonFieldSchema::required(["day"]),
            },
        }
    }
}

#[async_trait]
impl Tool for CheckCalendarAvailability {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let day = str_arg(CHECK_CALENDAR_AVAILABILITY, args, "day")?;
        Ok(format!("Available times on {day}: 9:00 AM, 2:00 PM, 4:00 PM"))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name → tool mapping, preserving registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolRegistry {
    /// The assistant's standard tool set.
    pub fn default_tools() -> Self {
        let mut registry = Self::default();
        let tools: [Arc<dyn Tool>; 5] = [
            Arc::new(WriteEmail::default()),
            Arc::new(TriageEmail::default()),
            Arc::new(Done::default()),
            Arc::new(ScheduleMeeting::default()),
            Arc::new(CheckCalendarAvailability::default()),
        ];
        for tool in tools {
            // Names above are distinct constants.
            let _ = registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool { tool_name: name });
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Exact lookup, falling back to a case-insensitive match (`done` → `Done`).
    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name).or_else(|| {
            self.order
                .iter()
                .find(|registered| registered.eq_ignore_ascii_case(name))
                .and_then(|registered| self.tools.get(registered))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every tool, in registration order.
    pub fn get_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }

    /// The named subset. Fails on the first unknown name.
    pub fn get_tools_by_name(
        &self,
        names: &[&str],
    ) -> Result<BTreeMap<String, Arc<dyn Tool>>, ToolError> {
        names
            .iter()
            .map(|name| {
                self.tools
                    .get(*name)
                    .map(|tool| (name.to_string(), Arc::clone(tool)))
                    .ok_or_else(|| ToolError::UnknownTool {
                        tool_name: name.to_string(),
                    })
            })
            .collect()
    }

    /// Execute a model tool call and wrap the result as a `tool` message.
    pub async fn invoke(&self, call: &ToolCallRecord) -> Result<Message, ToolError> {
        let tool = self.lookup(&call.name).ok_or_else(|| ToolError::UnknownTool {
            tool_name: call.name.clone(),
        })?;
        let output = tool.invoke(&call.args).await?;
        Ok(Message::tool(call.name.clone(), call.id.clone(), output))
    }
}
