//! In-process graph that replays planned tool calls.
//!
//! Each email subject maps to a plan: the ordered tool calls the assistant
//! would issue for it. Running the graph appends one `ai` message (with the
//! tool call) and one `tool` message (the registry's output) per step, and
//! writes a checkpoint after every step, mirroring how a compiled agent graph
//! persists its progress.
//!
//! Calls named in `interrupt_on` pause the run with `next = ["interrupt_handler"]`
//! until a [`Command`] resumes it (accept / edit / respond / ignore).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use graph_state::{Checkpointer, MemoryStore, Namespace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{snapshot_from, Assistant, AgentGraph, ChunkStream, Command, GraphInput, StateSnapshot, ThreadConfig};
use crate::dataset::EmailDataset;
use crate::domain::{AgentError, EmailInput, ExecutionState, Message, ToolCallRecord};
use crate::tools::{self, ToolRegistry};

const INTERRUPT_NODE: &str = "interrupt_handler";
const PENDING_STEP: &str = "pending_step";

/// Serialized form accepted by [`ScriptedGraph::from_json`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedPlans {
    /// Plan used for subjects without an entry in `plans`.
    #[serde(default)]
    pub default: Vec<ToolCallRecord>,
    /// Subject → planned calls.
    #[serde(default)]
    pub plans: HashMap<String, Vec<ToolCallRecord>>,
    /// Subjects whose run fails with an execution error.
    #[serde(default)]
    pub fail_on: BTreeSet<String>,
    /// Tool names that pause the run for human review.
    #[serde(default)]
    pub interrupt_on: BTreeSet<String>,
}

pub struct ScriptedGraph {
    name: String,
    plans: ScriptedPlans,
    tools: ToolRegistry,
}

impl ScriptedGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plans: ScriptedPlans::default(),
            tools: ToolRegistry::default_tools(),
        }
    }

    pub fn from_plans(name: impl Into<String>, plans: ScriptedPlans) -> Self {
        Self {
            plans,
            ..Self::new(name)
        }
    }

    pub fn from_json(name: impl Into<String>, raw: &str) -> Result<Self, AgentError> {
        let plans: ScriptedPlans = serde_json::from_str(raw)
            .map_err(|e| AgentError::Compile(format!("invalid scripted plans: {e}")))?;
        Ok(Self::from_plans(name, plans))
    }

    /// A graph whose plan for every dataset row is exactly its expected
    /// tool calls, with plausible arguments filled in.
    pub fn from_dataset(name: impl Into<String>, dataset: &EmailDataset) -> Self {
        let mut graph = Self::new(name);
        for row in dataset.rows() {
            let calls = row
                .expected_tool_calls
                .iter()
                .map(|tool| sample_call(tool, &row.email_input))
                .collect();
            graph
                .plans
                .plans
                .insert(row.email_input.subject.clone(), calls);
        }
        graph
    }

    /// Plan `calls` for emails with this subject.
    pub fn with_plan(mut self, subject: impl Into<String>, calls: Vec<ToolCallRecord>) -> Self {
        self.plans.plans.insert(subject.into(), calls);
        self
    }

    pub fn with_default_plan(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.plans.default = calls;
        self
    }

    /// Make runs for this subject fail.
    pub fn failing_on(mut self, subject: impl Into<String>) -> Self {
        self.plans.fail_on.insert(subject.into());
        self
    }

    /// Pause before executing calls to `tool`.
    pub fn interrupting_on(mut self, tool: impl Into<String>) -> Self {
        self.plans.interrupt_on.insert(tool.into());
        self
    }
}

/// Build a call to `tool` with arguments that satisfy its schema.
pub fn sample_call(tool: &str, email: &EmailInput) -> ToolCallRecord {
    let args = match tool.to_ascii_lowercase().as_str() {
        tools::WRITE_EMAIL => json!({
            "to": email.author,
            "subject": format!("Re: {}", email.subject),
            "content": "Thanks for your email. I'll follow up shortly.",
        }),
        tools::TRIAGE_EMAIL => json!({ "category": "respond" }),
        tools::SCHEDULE_MEETING => json!({
            "attendees": [email.author, email.to],
            "subject": email.subject,
            "duration_minutes": 45,
            "preferred_day": "2025-04-22",
            "start_time": 1400,
        }),
        tools::CHECK_CALENDAR_AVAILABILITY => json!({ "day": "2025-04-22" }),
        "done" => json!({ "done": true }),
        _ => json!({}),
    };
    ToolCallRecord {
        name: tool.to_string(),
        args,
        id: None,
    }
}

impl AgentGraph for ScriptedGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile(
        &self,
        checkpointer: Arc<dyn Checkpointer>,
        store: Option<Arc<dyn MemoryStore>>,
    ) -> Result<Arc<dyn Assistant>, AgentError> {
        Ok(Arc::new(ScriptedAssistant {
            name: self.name.clone(),
            plans: self.plans.clone(),
            tools: self.tools.clone(),
            checkpointer,
            store,
        }))
    }
}

struct ScriptedAssistant {
    name: String,
    plans: ScriptedPlans,
    tools: ToolRegistry,
    checkpointer: Arc<dyn Checkpointer>,
    store: Option<Arc<dyn MemoryStore>>,
}

/// Working state of one run.
struct Run {
    state: ExecutionState,
    plan: Vec<ToolCallRecord>,
    step: usize,
    chunks: Vec<Value>,
    /// State changed since the last checkpoint was written.
    dirty: bool,
}

impl ScriptedAssistant {
    fn plan_for(&self, subject: &str) -> Vec<ToolCallRecord> {
        self.plans
            .plans
            .get(subject)
            .unwrap_or(&self.plans.default)
            .clone()
    }

    async fn start(&self, values: Value, config: &ThreadConfig) -> Result<Run, AgentError> {
        let email: EmailInput = serde_json::from_value(values["email_input"].clone())
            .map_err(|e| AgentError::Execution(format!("input has no valid email_input: {e}")))?;
        if self.plans.fail_on.contains(&email.subject) {
            return Err(AgentError::Execution(format!(
                "scripted failure for '{}'",
                email.subject
            )));
        }

        let plan = self.plan_for(&email.subject);
        let decision = if plan.is_empty() { "ignore" } else { "respond" };
        let mut state = ExecutionState::default();
        state
            .values
            .insert("email_input".to_string(), serde_json::to_value(&email).map_err(to_exec)?);
        state
            .values
            .insert("classification_decision".to_string(), json!(decision));
        state.messages.push(Message::human(format!(
            "Respond to the email: {}",
            email.subject
        )));

        self.checkpointer
            .put(&config.thread_id, state.to_values(), Vec::new())
            .await?;
        debug!(thread_id = %config.thread_id, steps = plan.len(), decision, "scripted run started");

        Ok(Run {
            chunks: vec![json!({ "triage_router": { "classification_decision": decision } })],
            state,
            plan,
            step: 0,
            dirty: false,
        })
    }

    async fn resume(&self, command: Command, config: &ThreadConfig) -> Result<Run, AgentError> {
        let cp = self
            .checkpointer
            .latest(&config.thread_id)
            .await?
            .filter(|cp| cp.is_pending())
            .ok_or_else(|| AgentError::Execution("no interrupted run to resume".to_string()))?;
        let mut state = ExecutionState::from_checkpoint(&cp)
            .map_err(|e| AgentError::Execution(e.to_string()))?;
        let step = state
            .values
            .remove(PENDING_STEP)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| AgentError::Execution("checkpoint has no pending step".to_string()))?
            as usize;
        let subject = subject_of(&state).to_string();
        let mut run = Run {
            plan: self.plan_for(&subject),
            state,
            step,
            chunks: Vec::new(),
            dirty: true,
        };

        let response = command
            .resume
            .as_ref()
            .and_then(|r| r.get(0).cloned().or_else(|| Some(r.clone())))
            .ok_or_else(|| AgentError::Execution("command carries no resume value".to_string()))?;
        let kind = response["type"].as_str().unwrap_or("accept");
        let call = run
            .plan
            .get(step)
            .cloned()
            .map(|call| with_id(call, step))
            .ok_or_else(|| AgentError::Execution(format!("no planned call at step {step}")))?;
        info!(thread_id = %config.thread_id, tool = %call.name, action = kind, "resuming interrupted run");

        match kind {
            "accept" => self.execute(&mut run, call).await,
            "edit" => {
                let mut call = call;
                call.args = response["args"]["args"].clone();
                self.execute(&mut run, call).await;
            }
            "response" => {
                let feedback = response["args"].as_str().unwrap_or_default();
                let id = call.id.clone();
                run.state.messages.push(Message::ai("", vec![call.clone()]));
                run.state.messages.push(Message::tool(
                    call.name,
                    id,
                    format!("User gave feedback, which can we incorporate into the email. Feedback: {feedback}"),
                ));
            }
            "ignore" => {
                run.state.messages.push(Message::human(format!(
                    "User ignored the {} call. Ending the workflow.",
                    call.name
                )));
                run.step = run.plan.len();
                return Ok(run);
            }
            other => {
                return Err(AgentError::Execution(format!(
                    "unknown resume action '{other}'"
                )))
            }
        }
        run.step += 1;
        Ok(run)
    }

    async fn execute(&self, run: &mut Run, call: ToolCallRecord) {
        let output = match self.tools.invoke(&call).await {
            Ok(message) => message,
            Err(e) => Message::tool(call.name.clone(), call.id.clone(), format!("Error: {e}")),
        };
        run.state.messages.push(Message::ai("", vec![call]));
        run.state.messages.push(output);
    }

    /// Drive the run to completion or to the next interrupt.
    async fn drive(&self, mut run: Run, config: &ThreadConfig) -> Result<Run, AgentError> {
        while run.step < run.plan.len() {
            let call = with_id(run.plan[run.step].clone(), run.step);
            if self.plans.interrupt_on.contains(&call.name) {
                run.state
                    .values
                    .insert(PENDING_STEP.to_string(), json!(run.step));
                self.checkpointer
                    .put(
                        &config.thread_id,
                        run.state.to_values(),
                        vec![INTERRUPT_NODE.to_string()],
                    )
                    .await?;
                run.chunks.push(json!({ "__interrupt__": [{ "value": { "action_request": {
                    "action": call.name,
                    "args": call.args,
                } } }] }));
                debug!(thread_id = %config.thread_id, step = run.step, "scripted run interrupted");
                return Ok(run);
            }
            self.execute(&mut run, call).await;
            self.checkpointer
                .put(&config.thread_id, run.state.to_values(), Vec::new())
                .await?;
            run.dirty = false;
            let tail = &run.state.messages[run.state.messages.len() - 2..];
            run.chunks
                .push(json!({ "response_agent": { "messages": tail } }));
            run.step += 1;
        }
        if run.dirty {
            self.checkpointer
                .put(&config.thread_id, run.state.to_values(), Vec::new())
                .await?;
            run.dirty = false;
        }
        self.remember(&run, config).await?;
        Ok(run)
    }

    /// Record the handled email in long-term memory, when a store is attached.
    async fn remember(&self, run: &Run, config: &ThreadConfig) -> Result<(), AgentError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let subject = subject_of(&run.state);
        let calls: Vec<&str> = run
            .state
            .messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .map(|c| c.name.as_str())
            .collect();
        let namespace = Namespace::new([self.name.as_str(), "processed_emails"])?;
        store
            .put(
                &namespace,
                subject,
                json!({ "thread_id": config.thread_id.as_str(), "tool_calls": calls }),
            )
            .await?;
        Ok(())
    }

    async fn run(&self, input: GraphInput, config: &ThreadConfig) -> Result<Run, AgentError> {
        let run = match input {
            GraphInput::Values(values) => self.start(values, config).await?,
            GraphInput::Command(command) => self.resume(command, config).await?,
        };
        self.drive(run, config).await
    }
}

fn with_id(mut call: ToolCallRecord, step: usize) -> ToolCallRecord {
    if call.id.is_none() {
        call.id = Some(format!("call_{step}"));
    }
    call
}

fn subject_of(state: &ExecutionState) -> &str {
    state
        .values
        .get("email_input")
        .and_then(|email| email.get("subject"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn to_exec(e: serde_json::Error) -> AgentError {
    AgentError::Execution(e.to_string())
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn invoke(&self, input: GraphInput, config: &ThreadConfig) -> Result<Value, AgentError> {
        let run = self.run(input, config).await?;
        Ok(run.state.to_values())
    }

    async fn stream(
        &self,
        input: GraphInput,
        config: &ThreadConfig,
    ) -> Result<ChunkStream, AgentError> {
        let run = self.run(input, config).await?;
        Ok(futures::stream::iter(run.chunks.into_iter().map(Ok)).boxed())
    }

    async fn get_state(&self, config: &ThreadConfig) -> Result<StateSnapshot, AgentError> {
        snapshot_from(self.checkpointer.as_ref(), config).await
    }
}
