//! Per-key project memory: one JSON file per key under the project memory
//! directory, written atomically.

use std::path::{Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

pub struct KvStore {
    dir: PathBuf,
}

impl KvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            return Err(Error::InvalidInput(format!("invalid memory key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        let tmp_path = path.with_extension("json.tmp");
        let mut f = tokio::fs::File::create(&tmp_path).await?;
        f.write_all(&bytes).await?;
        f.flush().await?;
        f.sync_data().await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("memory key '{key}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

pub fn default_memory_dir(project_root: &Path) -> PathBuf {
    project_root.join(".agentrt").join("memory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());
        store.set("favorite_color", serde_json::json!("blue")).await.unwrap();
        let value = store.get("favorite_color").await.unwrap();
        assert_eq!(value, Some(serde_json::json!("blue")));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_path_traversal_key() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());
        assert!(store.set("../escape", serde_json::json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn list_returns_sorted_keys() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());
        store.set("b", serde_json::json!(1)).await.unwrap();
        store.set("a", serde_json::json!(2)).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
