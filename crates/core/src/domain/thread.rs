use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl ThreadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
}

/// One typed content segment of a thread message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: TextContent,
    },
    #[serde(other)]
    Other,
}

impl MessageContent {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { text: TextContent { value: value.into() } }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text.value.as_str()),
            Self::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub role: MessageRole,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the platform is still working on the run.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub thread_id: ThreadId,
    #[serde(rename = "assistant_id")]
    pub agent_id: AgentId,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{MessageContent, MessageRole, Run, RunStatus, ThreadMessage};

    #[test]
    fn thread_message_decodes_platform_payload() {
        let message: ThreadMessage = serde_json::from_value(json!({
            "id": "msg_1",
            "object": "thread.message",
            "thread_id": "thread_1",
            "role": "assistant",
            "created_at": 1_717_000_000,
            "content": [
                {"type": "text", "text": {"value": "two exemptions found", "annotations": []}},
                {"type": "image_file", "image_file": {"file_id": "file_1"}}
            ]
        }))
        .expect("message should decode");

        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content.len(), 2);
        assert_eq!(message.content[0].as_text(), Some("two exemptions found"));
        assert_eq!(message.content[1], MessageContent::Other);
    }

    #[test]
    fn unknown_roles_and_statuses_do_not_fail_decoding() {
        let role: MessageRole = serde_json::from_value(json!("system")).expect("role decodes");
        assert_eq!(role, MessageRole::Other);

        let run: Run = serde_json::from_value(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "assistant_id": "asst_1",
            "status": "paused_for_review"
        }))
        .expect("run decodes");
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_pending());
    }
}
