//! Cross-session recall: scans a project's session files newest-first for
//! text matches across message content.

use std::path::Path;

use agentrt_domain::error::Result;
use agentrt_domain::session::Session;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RecallHit {
    pub session_id: String,
    pub role: String,
    pub message_index: usize,
    pub preview: String,
}

const DEFAULT_MAX_SESSIONS: usize = 20;
const DEFAULT_MAX_RESULTS: usize = 50;
const PREVIEW_CHARS: usize = 200;

/// Scan the newest `max_sessions` session files under `sessions_dir` for
/// `query` (case-insensitive substring match over each message's text),
/// stopping once `max_results` hits have been collected.
pub async fn recall_sessions(
    sessions_dir: &Path,
    query: &str,
    max_sessions: Option<usize>,
    max_results: Option<usize>,
) -> Result<Vec<RecallHit>> {
    let max_sessions = max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS);
    let max_results = max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let needle = query.to_lowercase();

    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(sessions_dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
            let modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
            files.push((entry.path(), modified));
        }
    }
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut hits = Vec::new();
    for (path, _) in files.into_iter().take(max_sessions) {
        if hits.len() >= max_results {
            break;
        }
        let Ok(bytes) = tokio::fs::read(&path).await else { continue };
        let Ok(session) = serde_json::from_slice::<Session>(&bytes) else { continue };
        for (idx, msg) in session.history.iter().enumerate() {
            if hits.len() >= max_results {
                break;
            }
            let text = msg.content.extract_all_text();
            if text.to_lowercase().contains(&needle) {
                let preview: String = text.chars().take(PREVIEW_CHARS).collect();
                hits.push(RecallHit {
                    session_id: session.id.clone(),
                    role: format!("{:?}", msg.role).to_lowercase(),
                    message_index: idx,
                    preview,
                });
            }
        }
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::conversation::Message;
    use tempfile::TempDir;

    async fn write_session(dir: &Path, id: &str, messages: Vec<Message>) {
        let mut session = Session::new(id, "/tmp");
        session.history = messages;
        let bytes = serde_json::to_vec(&session).unwrap();
        tokio::fs::write(dir.join(format!("{id}.json")), bytes).await.unwrap();
    }

    #[tokio::test]
    async fn finds_substring_match_case_insensitive() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), "s1", vec![Message::user("I saw a RACE condition in the scheduler")]).await;
        let hits = recall_sessions(dir.path(), "race condition", None, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
    }

    #[tokio::test]
    async fn missing_directory_returns_empty() {
        let hits = recall_sessions(Path::new("/nonexistent/path"), "x", None, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn respects_max_results() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "s1",
            vec![Message::user("needle one"), Message::user("needle two"), Message::user("needle three")],
        )
        .await;
        let hits = recall_sessions(dir.path(), "needle", None, Some(2)).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
