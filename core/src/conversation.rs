use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One transcript entry. Entries are immutable once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConversationEntry {
    Message {
        role: Role,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInvocation {
        tool_name: String,
        parameters: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_name: String,
        output: serde_json::Value,
    },
}

impl ConversationEntry {
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        Self::Message {
            role,
            content: content.into(),
        }
    }

    /// Single-line rendering for terminals and logs.
    pub fn render(&self) -> String {
        match self {
            Self::Message { role, content } => format!("[{}] {}", role.as_str(), content),
            Self::ToolInvocation {
                tool_name,
                parameters,
            } => format!("[tool call] {tool_name} {parameters}"),
            Self::ToolResult { tool_name, output } => format!("[tool result] {tool_name} {output}"),
        }
    }
}

/// Append-only transcript of a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Entries appended at or after `index`, for incremental rendering.
    pub fn since(&self, index: usize) -> &[ConversationEntry] {
        self.entries.get(index..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `message` entries, i.e. what a chat view would count.
    pub fn message_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, ConversationEntry::Message { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entries_serialize_as_tagged_variants() {
        let entry = ConversationEntry::ToolInvocation {
            tool_name: "updateFormField".into(),
            parameters: json!({"fieldName": "city", "value": "Paris"}),
        };
        let value = serde_json::to_value(&entry).expect("entry should serialize");
        assert_eq!(value["kind"], "toolInvocation");
        assert_eq!(value["toolName"], "updateFormField");
    }

    #[test]
    fn since_returns_tail_and_tolerates_out_of_range() {
        let mut log = ConversationLog::new();
        log.push(ConversationEntry::message(Role::Assistant, "Hi!"));
        log.push(ConversationEntry::message(Role::User, "Hello"));
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(2).is_empty());
        assert!(log.since(10).is_empty());
        assert_eq!(log.message_count(), 2);
    }

    #[test]
    fn render_covers_every_variant() {
        let entries = [
            ConversationEntry::message(Role::User, "I live in Paris"),
            ConversationEntry::ToolInvocation {
                tool_name: "updateFormField".into(),
                parameters: json!({"fieldName": "city"}),
            },
            ConversationEntry::ToolResult {
                tool_name: "updateFormField".into(),
                output: json!({}),
            },
        ];
        let rendered: Vec<String> = entries.iter().map(ConversationEntry::render).collect();
        assert_eq!(rendered[0], "[user] I live in Paris");
        assert_eq!(rendered[1], "[tool call] updateFormField {\"fieldName\":\"city\"}");
        assert_eq!(rendered[2], "[tool result] updateFormField {}");
    }
}
