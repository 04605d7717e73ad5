//! Fact extraction from message traces.
//!
//! Tool calls are read only from `ai` messages; `tool` result messages are
//! evidence of execution, not of intent, and are not counted.

use std::collections::BTreeSet;
use std::fmt::Write;

pub use crate::domain::parse_messages;
use crate::domain::Message;

/// Distinct, lower-cased tool names invoked during a run.
pub type ToolCallFacts = BTreeSet<String>;

/// Collect every tool name called anywhere in the trace.
pub fn extract_tool_calls(messages: &[Message]) -> ToolCallFacts {
    messages
        .iter()
        .flat_map(Message::tool_calls)
        .map(|call| call.name.to_lowercase())
        .collect()
}

/// Render a trace as a readable transcript, one banner per message.
pub fn format_messages_string(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let title = format!(" {} Message ", message.label());
        let _ = writeln!(out, "{title:=^80}");

        if let Message::Tool { name: Some(name), .. } = message {
            let _ = writeln!(out, "Name: {name}");
            let _ = writeln!(out);
        }

        let text = message.content().as_text();
        if !text.is_empty() {
            let _ = writeln!(out, "{text}");
        }

        let calls = message.tool_calls();
        if !calls.is_empty() {
            let _ = writeln!(out, "Tool Calls:");
            for call in calls {
                let _ = writeln!(out, "  {}", call.name);
                if let Some(call_id) = &call.id {
                    let _ = writeln!(out, " Call ID: {call_id}");
                }
                let _ = writeln!(out, "  Args:");
                if let Some(args) = call.args.as_object() {
                    for (key, value) in args {
                        let rendered = value
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| value.to_string());
                        let _ = writeln!(out, "    {key}: {rendered}");
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolCallRecord;
    use serde_json::json;

    fn call(name: &str) -> ToolCallRecord {
        ToolCallRecord {
            name: name.to_string(),
            args: json!({"to": "alice@company.com"}),
            id: Some(format!("id_{name}")),
        }
    }

    fn trace() -> Vec<Message> {
        vec![
            Message::human("Respond to the email"),
            Message::ai("", vec![call("check_calendar_availability")]),
            Message::tool("check_calendar_availability", Some("id_1".into()), "Available"),
            Message::ai("", vec![call("Write_Email"), call("Done")]),
            Message::ai("", vec![call("write_email")]),
        ]
    }

    #[test]
    fn test_extracts_distinct_lowercase_names() {
        let facts = extract_tool_calls(&trace());
        let expected: ToolCallFacts = ["check_calendar_availability", "done", "write_email"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(facts, expected);
    }

    #[test]
    fn test_extraction_is_idempotent_and_order_independent() {
        let messages = trace();
        let mut reversed = messages.clone();
        reversed.reverse();
        assert_eq!(extract_tool_calls(&messages), extract_tool_calls(&messages));
        assert_eq!(extract_tool_calls(&messages), extract_tool_calls(&reversed));
    }

    #[test]
    fn test_no_calls_yields_empty_set() {
        let messages = vec![
            Message::human("hello"),
            Message::ai("Nothing to do", vec![]),
            Message::tool("write_email", None, "tool output is not a call"),
        ];
        assert!(extract_tool_calls(&messages).is_empty());
        assert!(extract_tool_calls(&[]).is_empty());
    }

    #[test]
    fn test_transcript_banners_and_calls() {
        let text = format_messages_string(&trace());
        assert!(text.contains(&format!("{:=^80}", " Ai Message ")));
        assert!(text.contains("Name: check_calendar_availability"));
        assert!(text.contains("Call ID: id_Write_Email"));
        assert!(text.contains("    to: alice@company.com"));
        assert_eq!(text.matches(" Message ").count(), 5);
    }
}
