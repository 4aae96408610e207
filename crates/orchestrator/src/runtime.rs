//! Boots the stores, provider router, and tool registry into a single
//! [`Runtime`] that both the interactive session and a `--subagent` child
//! can drive one turn at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentrt_domain::config::Config;
use agentrt_domain::error::Result;
use agentrt_domain::provider_config::LlmConfig;
use agentrt_memory::{KvStore, LtmStore};
use agentrt_providers::LlmRouter;
use agentrt_sessions::SessionStore;
use agentrt_tools::git_ops::NoGitLock;
use agentrt_tools::{default_registry, ToolContext, ToolRegistry, ToolResultStore};

use crate::collab::TerminalCollaborationChannel;

/// Everything the turn loop needs for one project checkout, built once at
/// startup and shared across every session the process handles.
pub struct Runtime {
    pub config: Config,
    pub router: LlmRouter,
    pub registry: ToolRegistry,
    pub sessions: SessionStore,
    pub tool_ctx: ToolContext,
}

impl Runtime {
    /// Wires up on-disk stores under `project_root/.agentrt` (or wherever
    /// `config.directories` points) and a fresh `NoGitLock` +
    /// `TerminalCollaborationChannel` tool context — the defaults for a
    /// top-level interactive session with no broker connection yet.
    /// Sub-agent children replace `tool_ctx.git_lock`/`collaboration`
    /// (and populate `tool_ctx.subagents`) once they've connected to the
    /// broker; see `agentrt_subagent::child`.
    pub async fn bootstrap(project_root: impl AsRef<Path>, session_id: impl Into<String>, config: Config, llm_config: &LlmConfig) -> Result<Self> {
        let project_root = project_root.as_ref().to_path_buf();
        let app_dir = project_root.join(&config.directories.app_dir_name);

        let sessions_dir = sub_dir(&app_dir, &config.directories.sessions_subdir, "sessions");
        let memory_dir = sub_dir(&app_dir, &config.directories.memory_subdir, "memory");
        let tool_results_dir = sub_dir(&app_dir, &config.directories.tool_results_subdir, "tool-results");

        tokio::fs::create_dir_all(&sessions_dir).await?;
        tokio::fs::create_dir_all(&memory_dir).await?;
        tokio::fs::create_dir_all(&tool_results_dir).await?;

        let router = LlmRouter::from_config(llm_config)?;
        let registry = default_registry();
        let sessions = SessionStore::new(sessions_dir.clone());

        let result_store = Arc::new(ToolResultStore::new(
            tool_results_dir,
            config.thresholds.inline_threshold_bytes,
            config.thresholds.max_chunk_bytes,
        ));
        let kv = Arc::new(KvStore::new(memory_dir.join("kv")));
        let ltm = Arc::new(LtmStore::new(memory_dir.join("ltm.json"), config.thresholds.ltm_max_per_kind));

        let mcp = if config.mcp.servers.is_empty() {
            None
        } else {
            Some(Arc::new(agentrt_mcp_client::McpManager::from_config(&config.mcp).await))
        };

        let tool_ctx = ToolContext {
            workspace_root: project_root,
            config: config.clone(),
            session_id: session_id.into(),
            git_lock: Arc::new(NoGitLock),
            collaboration: Arc::new(TerminalCollaborationChannel),
            result_store,
            kv,
            ltm,
            sessions_dir,
            mcp,
            subagents: None,
            remote: None,
        };

        Ok(Self { config, router, registry, sessions, tool_ctx })
    }
}

fn sub_dir(app_dir: &Path, configured: &str, fallback: &str) -> PathBuf {
    if configured.is_empty() {
        app_dir.join(fallback)
    } else {
        app_dir.join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_creates_the_expected_directory_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::default();
        let llm_config = LlmConfig::default();
        let runtime = Runtime::bootstrap(dir.path(), "s1", config, &llm_config).await.unwrap();
        assert!(dir.path().join(".agentrt/sessions").is_dir());
        assert!(dir.path().join(".agentrt/memory").is_dir());
        assert!(dir.path().join(".agentrt/tool-results").is_dir());
        assert_eq!(runtime.tool_ctx.session_id, "s1");
        assert!(runtime.registry.lookup("file_operations").is_some());
    }
}
