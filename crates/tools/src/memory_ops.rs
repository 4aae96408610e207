//! Memory operations tool: a plain
//! key/value store in the project memory directory, long-term-memory verbs,
//! and cross-session recall — all backed by `agentrt-memory`.

use std::path::Path;

use agentrt_domain::error::Result;
use agentrt_memory::{recall::recall_sessions, KvStore, LtmStore};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum MemoryOperation {
    Get { key: String },
    Set { key: String, value: Value },
    Delete { key: String },
    ListKeys,
    AddDiscovery { payload: String, #[serde(default = "default_confidence")] confidence: f32 },
    AddSolution { payload: String, #[serde(default = "default_confidence")] confidence: f32 },
    AddPattern { payload: String, #[serde(default = "default_confidence")] confidence: f32 },
    PruneLtm,
    LtmStats,
    RecallSessions {
        query: String,
        #[serde(default)]
        max_sessions: Option<usize>,
        #[serde(default)]
        max_results: Option<usize>,
    },
}

fn default_confidence() -> f32 {
    0.7
}

pub async fn handle(
    kv: &KvStore,
    ltm: &LtmStore,
    sessions_dir: &Path,
    op: MemoryOperation,
) -> Result<Value> {
    match op {
        MemoryOperation::Get { key } => Ok(serde_json::json!({ "key": key, "value": kv.get(&key).await? })),
        MemoryOperation::Set { key, value } => {
            kv.set(&key, value.clone()).await?;
            Ok(serde_json::json!({ "key": key, "value": value }))
        }
        MemoryOperation::Delete { key } => {
            kv.delete(&key).await?;
            Ok(serde_json::json!({ "key": key, "deleted": true }))
        }
        MemoryOperation::ListKeys => Ok(serde_json::json!({ "keys": kv.list().await? })),
        MemoryOperation::AddDiscovery { payload, confidence } => {
            Ok(serde_json::to_value(ltm.add_discovery(payload, confidence).await?)?)
        }
        MemoryOperation::AddSolution { payload, confidence } => {
            Ok(serde_json::to_value(ltm.add_solution(payload, confidence).await?)?)
        }
        MemoryOperation::AddPattern { payload, confidence } => {
            Ok(serde_json::to_value(ltm.add_pattern(payload, confidence).await?)?)
        }
        MemoryOperation::PruneLtm => Ok(serde_json::to_value(ltm.prune_ltm().await?)?),
        MemoryOperation::LtmStats => Ok(serde_json::to_value(ltm.ltm_stats().await?)?),
        MemoryOperation::RecallSessions { query, max_sessions, max_results } => {
            let hits = recall_sessions(sessions_dir, &query, max_sessions, max_results).await?;
            Ok(serde_json::json!({ "query": query, "hits": hits, "count": hits.len() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::new(dir.path().join("memory"));
        let ltm = LtmStore::new(dir.path().join("ltm.json"), 100);
        handle(&kv, &ltm, dir.path(), MemoryOperation::Set { key: "k".into(), value: serde_json::json!(1) })
            .await
            .unwrap();
        let result = handle(&kv, &ltm, dir.path(), MemoryOperation::Get { key: "k".into() }).await.unwrap();
        assert_eq!(result["value"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn add_discovery_then_stats() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::new(dir.path().join("memory"));
        let ltm = LtmStore::new(dir.path().join("ltm.json"), 100);
        handle(&kv, &ltm, dir.path(), MemoryOperation::AddDiscovery { payload: "found it".into(), confidence: 0.9 })
            .await
            .unwrap();
        let stats = handle(&kv, &ltm, dir.path(), MemoryOperation::LtmStats).await.unwrap();
        assert_eq!(stats["total"], 1);
    }

    #[tokio::test]
    async fn recall_sessions_with_no_sessions_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::new(dir.path().join("memory"));
        let ltm = LtmStore::new(dir.path().join("ltm.json"), 100);
        let result = handle(
            &kv,
            &ltm,
            &dir.path().join("sessions"),
            MemoryOperation::RecallSessions { query: "x".into(), max_sessions: None, max_results: None },
        )
        .await
        .unwrap();
        assert_eq!(result["count"], 0);
    }
}
