//! Project-level long-term memory: a single-writer-per-project file of
//! discoveries, solutions, patterns, workflows, and failures, bounded per
//! kind with confidence/recency-based pruning.

use std::path::{Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtmKind {
    Discovery,
    Solution,
    Pattern,
    Workflow,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtmEntry {
    pub id: String,
    pub kind: LtmKind,
    pub payload: String,
    pub confidence: f32,
    #[serde(default)]
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl LtmEntry {
    fn new(kind: LtmKind, payload: impl Into<String>, confidence: f32) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload: payload.into(),
            confidence: confidence.clamp(0.0, 1.0),
            verified: false,
            created_at: now,
            last_used_at: now,
            examples: Vec::new(),
        }
    }

    /// Score used to rank entries for both "top-N for the system prompt"
    /// rendering and prune-candidate selection: confidence weighted by how
    /// recently the entry was used.
    fn score(&self, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - self.last_used_at).num_minutes().max(0) as f64 / 60.0;
        let recency = 1.0 / (1.0 + age_hours / 24.0);
        self.confidence as f64 * recency
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LtmFile {
    entries: Vec<LtmEntry>,
}

/// File-backed store for one project. Callers are expected to hold one
/// instance per project; the store is not designed for concurrent writers
/// across processes (the whole file is rewritten on every mutation).
pub struct LtmStore {
    path: PathBuf,
    max_per_kind: usize,
}

impl LtmStore {
    pub fn new(path: impl Into<PathBuf>, max_per_kind: usize) -> Self {
        Self { path: path.into(), max_per_kind }
    }

    async fn load(&self) -> Result<LtmFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LtmFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, file: &LtmFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut f = tokio::fs::File::create(&tmp_path).await?;
        f.write_all(&bytes).await?;
        f.flush().await?;
        f.sync_data().await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn add(&self, kind: LtmKind, payload: impl Into<String>, confidence: f32) -> Result<LtmEntry> {
        let mut file = self.load().await?;
        let entry = LtmEntry::new(kind, payload, confidence);
        file.entries.push(entry.clone());
        self.enforce_bounds(&mut file);
        self.save(&file).await?;
        Ok(entry)
    }

    pub async fn add_discovery(&self, payload: impl Into<String>, confidence: f32) -> Result<LtmEntry> {
        self.add(LtmKind::Discovery, payload, confidence).await
    }

    pub async fn add_solution(&self, payload: impl Into<String>, confidence: f32) -> Result<LtmEntry> {
        self.add(LtmKind::Solution, payload, confidence).await
    }

    pub async fn add_pattern(&self, payload: impl Into<String>, confidence: f32) -> Result<LtmEntry> {
        self.add(LtmKind::Pattern, payload, confidence).await
    }

    pub async fn add_workflow(&self, payload: impl Into<String>, confidence: f32) -> Result<LtmEntry> {
        self.add(LtmKind::Workflow, payload, confidence).await
    }

    pub async fn add_failure(&self, payload: impl Into<String>, confidence: f32) -> Result<LtmEntry> {
        self.add(LtmKind::Failure, payload, confidence).await
    }

    /// Drop the lowest-scoring entries of each kind past `max_per_kind`.
    /// Called on every write and exposed standalone as `prune_ltm`.
    fn enforce_bounds(&self, file: &mut LtmFile) {
        let now = Utc::now();
        for kind in [LtmKind::Discovery, LtmKind::Solution, LtmKind::Pattern, LtmKind::Workflow, LtmKind::Failure] {
            let mut of_kind: Vec<usize> = file
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.kind == kind)
                .map(|(i, _)| i)
                .collect();
            if of_kind.len() <= self.max_per_kind {
                continue;
            }
            of_kind.sort_by(|&a, &b| {
                file.entries[b]
                    .score(now)
                    .partial_cmp(&file.entries[a].score(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let to_drop: std::collections::HashSet<usize> =
                of_kind[self.max_per_kind..].iter().copied().collect();
            let mut kept = Vec::with_capacity(file.entries.len());
            for (i, e) in file.entries.drain(..).enumerate() {
                if !to_drop.contains(&i) {
                    kept.push(e);
                }
            }
            file.entries = kept;
        }
    }

    pub async fn prune_ltm(&self) -> Result<PruneReport> {
        let mut file = self.load().await?;
        let before = file.entries.len();
        self.enforce_bounds(&mut file);
        let after = file.entries.len();
        self.save(&file).await?;
        Ok(PruneReport { removed: before - after, remaining: after })
    }

    pub async fn ltm_stats(&self) -> Result<LtmStats> {
        let file = self.load().await?;
        let mut by_kind = std::collections::HashMap::new();
        for e in &file.entries {
            *by_kind.entry(format!("{:?}", e.kind)).or_insert(0usize) += 1;
        }
        Ok(LtmStats { total: file.entries.len(), by_kind })
    }

    /// Top-N entries by confidence×recency, across all kinds, for system
    /// prompt rendering.
    pub async fn top_n(&self, n: usize) -> Result<Vec<LtmEntry>> {
        let file = self.load().await?;
        let now = Utc::now();
        let mut entries = file.entries;
        entries.sort_by(|a, b| b.score(now).partial_cmp(&a.score(now)).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(n);
        Ok(entries)
    }

    pub async fn touch(&self, id: &str) -> Result<()> {
        let mut file = self.load().await?;
        if let Some(entry) = file.entries.iter_mut().find(|e| e.id == id) {
            entry.last_used_at = Utc::now();
            self.save(&file).await?;
            Ok(())
        } else {
            Err(Error::NotFound(format!("ltm entry '{id}'")))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub removed: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LtmStats {
    pub total: usize,
    pub by_kind: std::collections::HashMap<String, usize>,
}

pub fn default_ltm_path(project_root: &Path) -> PathBuf {
    project_root.join(".agentrt").join("ltm.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_and_stat_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LtmStore::new(dir.path().join("ltm.json"), 10);
        store.add_discovery("found a race condition", 0.8).await.unwrap();
        store.add_solution("retry with backoff", 0.9).await.unwrap();
        let stats = store.ltm_stats().await.unwrap();
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn enforce_bounds_drops_lowest_scoring_per_kind() {
        let dir = TempDir::new().unwrap();
        let store = LtmStore::new(dir.path().join("ltm.json"), 2);
        for i in 0..5 {
            store.add_discovery(format!("discovery {i}"), 0.1 * i as f32).await.unwrap();
        }
        let stats = store.ltm_stats().await.unwrap();
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn top_n_orders_by_confidence() {
        let dir = TempDir::new().unwrap();
        let store = LtmStore::new(dir.path().join("ltm.json"), 10);
        store.add_discovery("low", 0.2).await.unwrap();
        store.add_discovery("high", 0.9).await.unwrap();
        let top = store.top_n(1).await.unwrap();
        assert_eq!(top[0].payload, "high");
    }

    #[tokio::test]
    async fn prune_reports_counts() {
        let dir = TempDir::new().unwrap();
        let store = LtmStore::new(dir.path().join("ltm.json"), 1);
        store.add_discovery("a", 0.1).await.unwrap();
        store.add_discovery("b", 0.9).await.unwrap();
        let report = store.prune_ltm().await.unwrap();
        assert_eq!(report.remaining, 1);
    }
}
