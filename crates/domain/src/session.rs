//! Session data model.
//!
//! A `Session` is owned by exactly one orchestrator process; persistence
//! (write-temp-then-rename, atomic) lives in `agentrt-sessions`, which
//! serializes this type directly.

use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::todo::TodoItem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub working_directory: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Short-term memory: ordered conversation history.
    pub history: Vec<Message>,
    pub todos: Vec<TodoItem>,
    /// Path to the project's long-term-memory file, if resolved.
    #[serde(default)]
    pub ltm_handle: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Set by the orchestrator on ESC-interrupt; cleared once the
    /// synthetic user message has been injected for this turn.
    #[serde(default)]
    pub interrupt_pending: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, working_directory: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            working_directory: working_directory.into(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            todos: Vec::new(),
            ltm_handle: None,
            metadata: serde_json::Map::new(),
            interrupt_pending: false,
        }
    }

    /// Verify the tool-call/tool-message pairing invariant
    /// holds across the full history. Returns the index of the first
    /// violation, if any.
    pub fn validate_tool_pairing(&self) -> Option<usize> {
        let mut i = 0;
        while i < self.history.len() {
            let msg = &self.history[i];
            if msg.expects_tool_results() {
                let expected_ids: Vec<&str> = msg
                    .tool_calls
                    .iter()
                    .map(|c| c.id.as_str())
                    .collect();
                let n = expected_ids.len();
                let following = &self.history[i + 1..(i + 1 + n).min(self.history.len())];
                if following.len() != n {
                    return Some(i);
                }
                for (slot, id) in following.iter().zip(expected_ids.iter()) {
                    if slot.role != crate::conversation::Role::Tool
                        || slot.tool_call_id.as_deref() != Some(*id)
                    {
                        return Some(i);
                    }
                }
                i += 1 + n;
            } else {
                i += 1;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolCall;

    #[test]
    fn empty_history_is_valid() {
        let s = Session::new("s1", "/tmp");
        assert!(s.validate_tool_pairing().is_none());
    }

    #[test]
    fn matched_pairing_is_valid() {
        let mut s = Session::new("s1", "/tmp");
        s.history.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                tool_name: "file_operations".into(),
                arguments: serde_json::json!({}),
            }],
        ));
        s.history.push(Message::tool_result("c1", "ok"));
        assert!(s.validate_tool_pairing().is_none());
    }

    #[test]
    fn missing_tool_message_is_invalid() {
        let mut s = Session::new("s1", "/tmp");
        s.history.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                tool_name: "file_operations".into(),
                arguments: serde_json::json!({}),
            }],
        ));
        assert_eq!(s.validate_tool_pairing(), Some(0));
    }

    #[test]
    fn mismatched_tool_call_id_is_invalid() {
        let mut s = Session::new("s1", "/tmp");
        s.history.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                tool_name: "file_operations".into(),
                arguments: serde_json::json!({}),
            }],
        ));
        s.history.push(Message::tool_result("wrong-id", "ok"));
        assert_eq!(s.validate_tool_pairing(), Some(0));
    }
}
