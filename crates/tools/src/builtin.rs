//! Wraps each standalone operation module (file_ops, git_ops, terminal, ...)
//! in the `Tool` trait so it can be registered, and assembles the default
//! `ToolRegistry` every orchestrator/CLI entry point starts from.

use std::sync::Arc;

use agentrt_domain::error::Result;
use agentrt_domain::tool_result::ToolResult;
use async_trait::async_trait;
use serde_json::Value;

use crate::registry::ToolRegistry;
use crate::tool_trait::{Tool, ToolContext, ToolFlags};

fn ok_json(tool_name: &'static str, value: Value) -> ToolResult {
    ToolResult::ok(tool_name, format!("{tool_name} completed"), value.to_string())
}

pub struct FileOperationsTool;
#[async_trait]
impl Tool for FileOperationsTool {
    fn name(&self) -> &'static str {
        "file_operations"
    }
    fn description(&self) -> &'static str {
        "Read, write, search and inspect files within the workspace."
    }
    fn operations(&self) -> &'static [&'static str] {
        &[
            "read_file",
            "write_file",
            "create_file",
            "append_file",
            "replace_string",
            "insert_at_line",
            "delete_file",
            "rename_file",
            "create_directory",
            "list_dir",
            "file_search",
            "grep_search",
            "get_file_info",
            "file_exists",
            "get_errors",
            "read_tool_result",
        ]
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op: crate::file_ops::FileOperation = serde_json::from_value(args)?;
        if let crate::file_ops::FileOperation::ReadToolResult { tool_call_id, offset, length } = op {
            return match ctx.result_store.retrieve_chunk(&tool_call_id, &ctx.session_id, offset, length).await {
                Ok(chunk) => Ok(ok_json(self.name(), serde_json::to_value(chunk)?)),
                Err(e) => Ok(ToolResult::err(self.name(), e.to_string())),
            };
        }
        let value = crate::file_ops::handle(&ctx.workspace_root, op, ctx.config.sandbox).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct GitOperationsTool;
#[async_trait]
impl Tool for GitOperationsTool {
    fn name(&self) -> &'static str {
        "git_operations"
    }
    fn description(&self) -> &'static str {
        "Inspect and mutate the workspace's git repository."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["status", "log", "diff", "branch", "commit", "push", "pull", "blame", "stash", "tag"]
    }
    fn flags(&self) -> ToolFlags {
        ToolFlags { requires_serial: true, ..ToolFlags::default() }
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::git_ops::handle(&ctx.workspace_root, op, ctx.git_lock.as_ref()).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct TerminalTool;
#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &'static str {
        "terminal"
    }
    fn description(&self) -> &'static str {
        "Run a shell command in the workspace, foreground or passthrough."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["execute", "validate"]
    }
    fn flags(&self) -> ToolFlags {
        ToolFlags { requires_blocking: true, ..ToolFlags::default() }
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::terminal::handle(op, &ctx.config).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct CollaborationTool;
#[async_trait]
impl Tool for CollaborationTool {
    fn name(&self) -> &'static str {
        "user_collaboration"
    }
    fn description(&self) -> &'static str {
        "Ask the human operator a question and wait for their reply."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["request_input"]
    }
    fn flags(&self) -> ToolFlags {
        ToolFlags { requires_blocking: true, is_interactive: true, ..ToolFlags::default() }
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::collab::handle(ctx.collaboration.as_ref(), op).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct CodeIntelTool;
#[async_trait]
impl Tool for CodeIntelTool {
    fn name(&self) -> &'static str {
        "code_intelligence"
    }
    fn description(&self) -> &'static str {
        "Find symbol usages across the tree and search commit history by relevance."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["list_usages", "search_history"]
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::code_intel::handle(&ctx.workspace_root, op).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct ApplyPatchTool;
#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &'static str {
        "apply_patch"
    }
    fn description(&self) -> &'static str {
        "Apply a context-anchored, multi-file patch to the workspace."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["apply"]
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::apply_patch::handle(&ctx.workspace_root, op, ctx.config.sandbox).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct TodoTool;
#[async_trait]
impl Tool for TodoTool {
    fn name(&self) -> &'static str {
        "todo"
    }
    fn description(&self) -> &'static str {
        "Read, write, update or add items on the session's todo list."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["read", "write", "update", "add"]
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let store = agentrt_sessions::SessionStore::new(ctx.sessions_dir.clone());
        let value = crate::todo_ops::handle(&store, &ctx.session_id, op).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct MemoryTool;
#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &'static str {
        "memory"
    }
    fn description(&self) -> &'static str {
        "Read and write the project's key/value memory, long-term memory, and recall past sessions."
    }
    fn operations(&self) -> &'static [&'static str] {
        &[
            "get",
            "set",
            "delete",
            "list_keys",
            "add_discovery",
            "add_solution",
            "add_pattern",
            "prune_ltm",
            "ltm_stats",
            "recall_sessions",
        ]
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::memory_ops::handle(ctx.kv.as_ref(), ctx.ltm.as_ref(), &ctx.sessions_dir, op).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct WebTool;
#[async_trait]
impl Tool for WebTool {
    fn name(&self) -> &'static str {
        "web_operations"
    }
    fn description(&self) -> &'static str {
        "Fetch a URL or search the web."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["fetch_url", "search_web"]
    }
    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let op = serde_json::from_value(args)?;
        let value = crate::web_ops::handle(op).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct SubAgentTool;
#[async_trait]
impl Tool for SubAgentTool {
    fn name(&self) -> &'static str {
        "subagent"
    }
    fn description(&self) -> &'static str {
        "Spawn, list, and coordinate child agents through the broker."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["spawn", "list", "status", "kill", "killall", "inbox", "acknowledge", "history", "send", "broadcast"]
    }
    fn flags(&self) -> ToolFlags {
        ToolFlags { requires_blocking: true, ..ToolFlags::default() }
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Some(manager) = &ctx.subagents else {
            return Ok(ToolResult::err(self.name(), "sub-agent coordination is unavailable: no broker connection for this session".to_string()));
        };
        let op = serde_json::from_value(args)?;
        let value = crate::subagent_ops::handle(manager, op).await?;
        Ok(ok_json(self.name(), value))
    }
}

pub struct RemoteExecutionTool;
#[async_trait]
impl Tool for RemoteExecutionTool {
    fn name(&self) -> &'static str {
        "remote_execution"
    }
    fn description(&self) -> &'static str {
        "Run a task on another machine over SSH, staging the local tree and retrieving outputs."
    }
    fn operations(&self) -> &'static [&'static str] {
        &["execute", "execute_parallel", "validate_ssh", "prepare_staging", "transfer_files", "retrieve_files", "cleanup_staging"]
    }
    fn flags(&self) -> ToolFlags {
        ToolFlags { requires_blocking: true, ..ToolFlags::default() }
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let Some(remote) = &ctx.remote else {
            return Ok(ToolResult::err(self.name(), "remote execution is unavailable: no devices/credentials configured".to_string()));
        };
        let op = serde_json::from_value(args)?;
        let value = crate::remote_ops::handle(remote, op).await?;
        Ok(ok_json(self.name(), value))
    }
}

/// The built-in tools every orchestrator/CLI entry point registers, in the
/// order the system prompt's tool menu lists them.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FileOperationsTool));
    registry.register(Arc::new(GitOperationsTool));
    registry.register(Arc::new(TerminalTool));
    registry.register(Arc::new(CollaborationTool));
    registry.register(Arc::new(CodeIntelTool));
    registry.register(Arc::new(ApplyPatchTool));
    registry.register(Arc::new(TodoTool));
    registry.register(Arc::new(MemoryTool));
    registry.register(Arc::new(WebTool));
    registry.register(Arc::new(SubAgentTool));
    registry.register(Arc::new(RemoteExecutionTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollaborationChannel;
    use crate::git_ops::NoGitLock;
    use crate::tool_trait::ToolContext;
    use agentrt_domain::config::Config;
    use tempfile::TempDir;

    struct NoopChannel;
    #[async_trait]
    impl CollaborationChannel for NoopChannel {
        async fn request_input(&self, _message: &str, _context: Option<&str>) -> Result<String> {
            Ok("noop".to_string())
        }
    }

    fn make_ctx(workspace_root: std::path::PathBuf) -> ToolContext {
        let results_dir = workspace_root.join(".agentrt").join("tool_results");
        let memory_dir = workspace_root.join(".agentrt").join("memory");
        let ltm_path = workspace_root.join(".agentrt").join("ltm.json");
        ToolContext {
            workspace_root: workspace_root.clone(),
            config: Config::default(),
            session_id: "s1".to_string(),
            git_lock: Arc::new(NoGitLock),
            collaboration: Arc::new(NoopChannel),
            result_store: Arc::new(crate::result_store::ToolResultStore::new(results_dir, 8 * 1024, 32 * 1024)),
            kv: Arc::new(agentrt_memory::KvStore::new(memory_dir)),
            ltm: Arc::new(agentrt_memory::LtmStore::new(ltm_path, 100)),
            sessions_dir: workspace_root.join(".agentrt").join("sessions"),
            mcp: None,
            subagents: None,
            remote: None,
        }
    }

    #[tokio::test]
    async fn read_tool_result_pages_through_a_stored_output() {
        let dir = TempDir::new().unwrap();
        let ctx = make_ctx(dir.path().to_path_buf());
        let tool = FileOperationsTool;

        let big = "y".repeat(20_000);
        ctx.result_store.process_tool_result("c1", &ctx.session_id, &big).await.unwrap();

        let args = serde_json::json!({
            "operation": "read_tool_result",
            "tool_call_id": "c1",
            "offset": 0,
        });
        let result = tool.execute(args, &ctx).await.unwrap();
        assert!(result.success);
        let value: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(value["total_length"], 20_000);
        assert_eq!(value["offset"], 0);
        assert!(value["has_more"].as_bool().unwrap());
    }

    #[test]
    fn default_registry_contains_every_built_in_tool() {
        let registry = default_registry();
        let names = registry.names().to_vec();
        assert_eq!(
            names,
            vec![
                "file_operations",
                "git_operations",
                "terminal",
                "user_collaboration",
                "code_intelligence",
                "apply_patch",
                "todo",
                "memory",
                "web_operations",
                "subagent",
                "remote_execution",
            ]
        );
    }
}
