//! Tool Result Store: maps `(session_id, tool_call_id)` to an
//! opaque byte blob. Outputs at or under the inline threshold pass straight
//! through; larger ones are persisted under
//! `.<app>/tool_results/<session_id>/<tool_call_id>.bin` and replaced with a
//! retrieval marker the model can page through with `read_tool_result`.

use std::path::{Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use agentrt_domain::tool_result::{ResultChunk, StoredToolResult};
use tokio::io::AsyncWriteExt;

pub struct ToolResultStore {
    base_dir: PathBuf,
    inline_threshold: usize,
    max_chunk: usize,
}

const PREVIEW_CHARS: usize = 280;

impl ToolResultStore {
    pub fn new(base_dir: impl Into<PathBuf>, inline_threshold: usize, max_chunk: usize) -> Self {
        Self { base_dir: base_dir.into(), inline_threshold, max_chunk }
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_component(session_id, "session_id")?;
        Ok(self.base_dir.join(session_id))
    }

    fn blob_path(&self, session_id: &str, tool_call_id: &str) -> Result<PathBuf> {
        validate_component(tool_call_id, "tool_call_id")?;
        Ok(self.session_dir(session_id)?.join(format!("{tool_call_id}.bin")))
    }

    fn meta_path(&self, session_id: &str, tool_call_id: &str) -> Result<PathBuf> {
        validate_component(tool_call_id, "tool_call_id")?;
        Ok(self.session_dir(session_id)?.join(format!("{tool_call_id}.meta.json")))
    }

    /// Either hands `content` back untouched (inline) or persists it and
    /// returns a marker string embedding `tool_call_id` and `totalLength`
    /// so a follow-up `read_tool_result` call can retrieve it deterministically.
    pub async fn process_tool_result(&self, tool_call_id: &str, session_id: &str, content: &str) -> Result<String> {
        if content.len() <= self.inline_threshold {
            return Ok(content.to_string());
        }

        let dir = self.session_dir(session_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let blob_path = self.blob_path(session_id, tool_call_id)?;
        atomic_write(&blob_path, content.as_bytes()).await?;

        let record = StoredToolResult::new(tool_call_id, session_id, content.len());
        let meta_path = self.meta_path(session_id, tool_call_id)?;
        atomic_write(&meta_path, serde_json::to_vec_pretty(&record)?.as_slice()).await?;

        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        Ok(format!(
            "[output truncated, {} bytes total] preview: {preview}...\ntoolCallId={tool_call_id} totalLength={}\nCall read_tool_result(tool_call_id, offset, length) to page the rest.",
            content.len(),
            content.len()
        ))
    }

    pub async fn retrieve_chunk(
        &self,
        tool_call_id: &str,
        session_id: &str,
        offset: usize,
        length: Option<usize>,
    ) -> Result<ResultChunk> {
        let blob_path = self.blob_path(session_id, tool_call_id)?;
        let bytes = match tokio::fs::read(&blob_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("tool result '{tool_call_id}'")));
            }
            Err(e) => return Err(e.into()),
        };
        let total_length = bytes.len();
        if offset > total_length {
            return Err(Error::InvalidInput(format!(
                "offset {offset} exceeds stored result length {total_length}"
            )));
        }

        let requested = length.unwrap_or(self.max_chunk).min(self.max_chunk);
        let end = (offset + requested).min(total_length);
        let slice = &bytes[offset..end];
        let content = String::from_utf8_lossy(slice).into_owned();
        let has_more = end < total_length;

        Ok(ResultChunk {
            content,
            offset,
            length: end - offset,
            total_length,
            has_more,
            next_offset: has_more.then_some(end),
        })
    }

    pub async fn list_results(&self, session_id: &str) -> Result<Vec<StoredToolResult>> {
        let dir = self.session_dir(session_id)?;
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(record) = serde_json::from_slice::<StoredToolResult>(&bytes) {
                    out.push(record);
                }
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub async fn delete_result(&self, tool_call_id: &str, session_id: &str) -> Result<()> {
        let blob_path = self.blob_path(session_id, tool_call_id)?;
        let meta_path = self.meta_path(session_id, tool_call_id)?;
        let blob_removed = remove_if_exists(&blob_path).await?;
        let _ = remove_if_exists(&meta_path).await?;
        if !blob_removed {
            return Err(Error::NotFound(format!("tool result '{tool_call_id}'")));
        }
        Ok(())
    }

    pub async fn cleanup_old_results(&self, session_id: &str, max_age_hours: i64) -> Result<CleanupReport> {
        let records = self.list_results(session_id).await?;
        let mut deleted_count = 0usize;
        let mut reclaimed_bytes = 0u64;
        for record in records {
            if record.is_older_than(max_age_hours) {
                let blob_path = self.blob_path(session_id, &record.tool_call_id)?;
                if let Ok(meta) = tokio::fs::metadata(&blob_path).await {
                    reclaimed_bytes += meta.len();
                }
                self.delete_result(&record.tool_call_id, session_id).await.ok();
                deleted_count += 1;
            }
        }
        Ok(CleanupReport { deleted_count, reclaimed_bytes })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub reclaimed_bytes: u64,
}

fn validate_component(value: &str, field: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(Error::InvalidInput(format!("invalid {field} '{value}'")));
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!("{}.tmp", path.extension().and_then(|e| e.to_str()).unwrap_or("bin")));
    let mut f = tokio::fs::File::create(&tmp_path).await?;
    f.write_all(bytes).await?;
    f.flush().await?;
    f.sync_data().await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn inline_content_passes_through_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 1024, 32 * 1024);
        let out = store.process_tool_result("c1", "s1", "short").await.unwrap();
        assert_eq!(out, "short");
    }

    #[tokio::test]
    async fn oversized_content_is_stored_and_marked() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 8, 1024);
        let content = "x".repeat(100);
        let marker = store.process_tool_result("c1", "s1", &content).await.unwrap();
        assert!(marker.contains("toolCallId=c1"));
        assert!(marker.contains("totalLength=100"));
    }

    #[tokio::test]
    async fn retrieve_chunk_is_byte_accurate_and_caps_length() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 8, 10);
        let content = "0123456789abcdefghij";
        store.process_tool_result("c1", "s1", content).await.unwrap();

        let chunk = store.retrieve_chunk("c1", "s1", 0, Some(100)).await.unwrap();
        assert_eq!(chunk.length, 10);
        assert!(chunk.has_more);
        assert_eq!(chunk.next_offset, Some(10));

        let chunk2 = store.retrieve_chunk("c1", "s1", 10, Some(100)).await.unwrap();
        assert_eq!(chunk2.content, "abcdefghij");
        assert!(!chunk2.has_more);
    }

    #[tokio::test]
    async fn retrieve_chunk_rejects_offset_past_end() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 8, 1024);
        store.process_tool_result("c1", "s1", &"x".repeat(20)).await.unwrap();
        assert!(store.retrieve_chunk("c1", "s1", 1000, None).await.is_err());
    }

    #[tokio::test]
    async fn retrieve_chunk_missing_result_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 8, 1024);
        assert!(store.retrieve_chunk("nope", "s1", 0, None).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_removes_results_older_than_threshold() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 8, 1024);
        store.process_tool_result("c1", "s1", &"x".repeat(20)).await.unwrap();

        let meta_path = store.meta_path("s1", "c1").unwrap();
        let mut record: StoredToolResult = serde_json::from_slice(&tokio::fs::read(&meta_path).await.unwrap()).unwrap();
        record.created_at = chrono::Utc::now() - chrono::Duration::hours(48);
        tokio::fs::write(&meta_path, serde_json::to_vec(&record).unwrap()).await.unwrap();

        let report = store.cleanup_old_results("s1", 24).await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(store.retrieve_chunk("c1", "s1", 0, None).await.is_err());
    }

    #[tokio::test]
    async fn list_results_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = ToolResultStore::new(dir.path(), 8, 1024);
        store.process_tool_result("c1", "s1", &"x".repeat(20)).await.unwrap();
        store.process_tool_result("c2", "s1", &"y".repeat(20)).await.unwrap();
        let results = store.list_results("s1").await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
