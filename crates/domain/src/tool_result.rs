//! Uniform tool result shape and the stored-result bookkeeping record that
//! the Tool Result Store persists for oversized outputs.

use serde::{Deserialize, Serialize};

/// The result every tool returns to the executor, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    /// The output handed back to the LLM. May later be replaced in-place
    /// by the Tool Result Store with a retrieval marker.
    pub output: String,
    pub action_description: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Arbitrary tool-specific metadata (e.g. match counts, byte offsets).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub expanded_content: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, action_description: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            action_description: action_description.into(),
            tool_name: tool_name.into(),
            error: None,
            expanded_content: serde_json::Map::new(),
        }
    }

    pub fn err(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: String::new(),
            action_description: String::new(),
            tool_name: tool_name.into(),
            error: Some(error),
            expanded_content: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.expanded_content.insert(key.into(), value);
        self
    }
}

/// Bookkeeping record for a tool output persisted to disk because it
/// exceeded the inline threshold. The bytes themselves live in a sibling
/// file named by `tool_call_id`; this record is what `list_results` and
/// age-based cleanup operate over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToolResult {
    pub tool_call_id: String,
    pub session_id: String,
    pub total_length: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Size of the persisted blob, which may differ from `total_length`
    /// only if the store ever compresses content (it does not today).
    pub content_bytes_on_disk: usize,
}

impl StoredToolResult {
    pub fn new(
        tool_call_id: impl Into<String>,
        session_id: impl Into<String>,
        total_length: usize,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            session_id: session_id.into(),
            total_length,
            created_at: chrono::Utc::now(),
            content_bytes_on_disk: total_length,
        }
    }

    pub fn age(&self) -> chrono::Duration {
        chrono::Utc::now() - self.created_at
    }

    pub fn is_older_than(&self, max_age_hours: i64) -> bool {
        self.age() > chrono::Duration::hours(max_age_hours)
    }
}

/// A bounded slice of a stored result's content, returned by the chunked
/// retrieval operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultChunk {
    pub content: String,
    pub offset: usize,
    pub length: usize,
    pub total_length: usize,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

/// Hard cap on any single chunk returned by `retrieveChunk`, regardless of
/// the length requested by the caller.
pub const MAX_CHUNK_LENGTH: usize = 32 * 1024;

/// Inline threshold: outputs at or under this size are returned to the
/// model as-is rather than stored and replaced with a marker.
pub const INLINE_THRESHOLD: usize = 8 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_has_no_error() {
        let r = ToolResult::ok("file_operations", "read file", "contents");
        assert!(r.success);
        assert!(r.error.is_none());
    }

    #[test]
    fn err_result_has_no_output() {
        let r = ToolResult::err("file_operations", "not found");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("not found"));
    }

    #[test]
    fn stored_result_age_threshold() {
        let mut r = StoredToolResult::new("c1", "s1", 100);
        r.created_at = chrono::Utc::now() - chrono::Duration::hours(25);
        assert!(r.is_older_than(24));
        assert!(!r.is_older_than(48));
    }
}
