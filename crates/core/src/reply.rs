use crate::domain::thread::{MessageRole, ThreadMessage};

pub const NO_ASSISTANT_MESSAGE: &str = "No assistant message found.";

/// Text of the most recently created assistant message, with its text
/// segments joined by single spaces.
///
/// Messages with equal `created_at` resolve to the one listed last.
pub fn extract_assistant_reply(messages: &[ThreadMessage]) -> Option<String> {
    let latest = messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.role == MessageRole::Assistant)
        .max_by_key(|(position, message)| (message.created_at, *position))
        .map(|(_, message)| message)?;

    let parts: Vec<&str> = latest.content.iter().filter_map(|part| part.as_text()).collect();
    Some(parts.join(" "))
}

/// Same as [`extract_assistant_reply`] but falls back to a fixed notice.
pub fn assistant_reply_or_notice(messages: &[ThreadMessage]) -> String {
    extract_assistant_reply(messages).unwrap_or_else(|| NO_ASSISTANT_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use crate::domain::thread::{MessageContent, MessageId, MessageRole, ThreadId, ThreadMessage};

    use super::{assistant_reply_or_notice, extract_assistant_reply, NO_ASSISTANT_MESSAGE};

    fn message(id: &str, role: MessageRole, created_at: i64, parts: &[&str]) -> ThreadMessage {
        ThreadMessage {
            id: MessageId(id.to_string()),
            thread_id: ThreadId("thread_1".to_string()),
            role,
            created_at,
            content: parts.iter().map(|part| MessageContent::text(*part)).collect(),
        }
    }

    #[test]
    fn picks_newest_assistant_message_regardless_of_list_order() {
        let messages = vec![
            message("m3", MessageRole::Assistant, 30, &["latest"]),
            message("m1", MessageRole::Assistant, 10, &["oldest"]),
            message("m4", MessageRole::User, 40, &["user after"]),
            message("m2", MessageRole::User, 20, &["question"]),
        ];

        assert_eq!(extract_assistant_reply(&messages).as_deref(), Some("latest"));
    }

    #[test]
    fn joins_text_segments_and_skips_other_parts() {
        let mut reply = message("m1", MessageRole::Assistant, 10, &["Found", "3 exemptions."]);
        reply.content.insert(1, MessageContent::Other);

        assert_eq!(extract_assistant_reply(&[reply]).as_deref(), Some("Found 3 exemptions."));
    }

    #[test]
    fn equal_timestamps_prefer_the_later_entry() {
        let messages = vec![
            message("m1", MessageRole::Assistant, 10, &["first"]),
            message("m2", MessageRole::Assistant, 10, &["second"]),
        ];

        assert_eq!(extract_assistant_reply(&messages).as_deref(), Some("second"));
    }

    #[test]
    fn no_assistant_message_yields_notice() {
        let messages = vec![message("m1", MessageRole::User, 10, &["hello"])];

        assert_eq!(extract_assistant_reply(&messages), None);
        assert_eq!(assistant_reply_or_notice(&messages), NO_ASSISTANT_MESSAGE);
    }
}
