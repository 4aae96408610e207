//! Session persistence: `.agentrt/sessions/<id>.json`, one file per
//! session, written atomically (write-temp-then-rename) so a crash never
//! leaves a torn file behind. Resuming a session is just `load(id)`.

use std::path::{Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use agentrt_domain::session::Session;
use tokio::io::AsyncWriteExt;

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(Error::InvalidInput(format!("invalid session id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    pub async fn load(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically persist `session`, bumping `updated_at` first.
    pub async fn save(&self, session: &mut Session) -> Result<()> {
        session.updated_at = chrono::Utc::now();
        let path = self.path_for(&session.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(session)?;
        let tmp_path = path.with_extension("json.tmp");
        let mut f = tokio::fs::File::create(&tmp_path).await?;
        f.write_all(&bytes).await?;
        f.flush().await?;
        f.sync_data().await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Copy the current on-disk file for `id` aside before it is overwritten
    /// by a freshly reset session, so a staleness reset never silently
    /// discards history.
    pub async fn archive(&self, id: &str, suffix: &str) -> Result<Option<PathBuf>> {
        let path = self.path_for(id)?;
        match tokio::fs::metadata(&path).await {
            Ok(_) => {
                let archived = self.dir.join(format!("{id}.{suffix}.json"));
                tokio::fs::copy(&path, &archived).await?;
                Ok(Some(archived))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("session '{id}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every session id under this store, newest-modified first. Used by
    /// `recall_sessions` (agentrt-memory) and by the CLI's session list.
    pub async fn list_ids_newest_first(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Skip archived copies (`<id>.<suffix>.json`): only bare
            // `<id>.json` files are live sessions.
            let stem_has_no_dot = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| !s.contains('.'))
                .unwrap_or(false);
            if path.extension().and_then(|e| e.to_str()) == Some("json") && stem_has_no_dot {
                let modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
                if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                    files.push((id.to_string(), modified));
                }
            }
        }
        files.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(files.into_iter().map(|(id, _)| id).collect())
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.dir
    }
}

pub fn default_sessions_dir(project_root: &Path) -> PathBuf {
    project_root.join(".agentrt").join("sessions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("s1", "/tmp/project");
        session.history.push(agentrt_domain::conversation::Message::user("hi"));
        store.save(&mut session).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "s1");
        assert_eq!(loaded.history.len(), 1);
    }

    #[tokio::test]
    async fn missing_session_returns_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_path_traversal_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("../escape", "/tmp");
        assert!(store.save(&mut session).await.is_err());
    }

    #[tokio::test]
    async fn archive_preserves_prior_content_under_the_same_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("s1", "/tmp");
        store.save(&mut session).await.unwrap();

        let archived = store.archive("s1", "stale-20260101").await.unwrap();
        assert!(archived.is_some());
        assert!(tokio::fs::metadata(archived.unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn list_ids_excludes_archived_copies() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("s1", "/tmp");
        store.save(&mut session).await.unwrap();
        store.archive("s1", "stale-1").await.unwrap();

        let ids = store.list_ids_newest_first().await.unwrap();
        assert_eq!(ids, vec!["s1".to_string()]);
    }
}
