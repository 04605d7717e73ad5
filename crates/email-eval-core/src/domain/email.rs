//! Email inputs and triage labels.

use serde::{Deserialize, Serialize};

/// An incoming email as handed to the assistant.
///
/// The harness never validates or rewrites it: the record is forwarded
/// verbatim as `{"email_input": ...}`. Unknown fields survive the round trip
/// through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailInput {
    pub author: String,
    pub to: String,
    pub subject: String,
    /// Body of the email, including quoted thread history.
    pub email_thread: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EmailInput {
    pub fn new(
        author: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        email_thread: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            to: to.into(),
            subject: subject.into(),
            email_thread: email_thread.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// The graph input payload for this email.
    pub fn to_graph_input(&self) -> serde_json::Value {
        serde_json::json!({ "email_input": self })
    }
}

/// Classification of an incoming email.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TriageLabel {
    Respond,
    Notify,
    Ignore,
}

impl TriageLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::Notify => "notify",
            Self::Ignore => "ignore",
        }
    }
}

impl std::fmt::Display for TriageLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extra_fields_are_preserved() {
        let raw = json!({
            "author": "Alice <alice@company.com>",
            "to": "Lance <lance@company.com>",
            "subject": "Quick question",
            "email_thread": "Hi Lance",
            "id": "msg-42"
        });
        let email: EmailInput = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(email.extra.get("id"), Some(&json!("msg-42")));
        assert_eq!(serde_json::to_value(&email).unwrap(), raw);
    }

    #[test]
    fn test_graph_input_wraps_email() {
        let email = EmailInput::new("a", "b", "c", "d");
        let input = email.to_graph_input();
        assert_eq!(input["email_input"]["subject"], json!("c"));
    }

    #[test]
    fn test_triage_label_lowercase() {
        let label: TriageLabel = serde_json::from_value(json!("respond")).unwrap();
        assert_eq!(label, TriageLabel::Respond);
        assert!(serde_json::from_value::<TriageLabel>(json!("Respond")).is_err());
        assert_eq!(TriageLabel::Ignore.to_string(), "ignore");
    }
}
