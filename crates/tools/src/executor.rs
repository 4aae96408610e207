//! Tool Executor: alias a bare operation name to its hosting
//! tool, repair and sandbox-check arguments, route `mcp_`-prefixed calls to
//! the MCP bridge, dispatch to the tool, and hand the output to the Result
//! Store before returning the uniform tool result the orchestrator appends
//! as a `tool` message.

use std::panic::AssertUnwindSafe;
use std::path::Path;

use agentrt_domain::error::Error;
use agentrt_domain::tool_result::ToolResult;
use futures_util::FutureExt;
use serde_json::Value;

use crate::file_ops::validate_path;
use crate::mcp_bridge;
use crate::registry::ToolRegistry;
use crate::tool_trait::{unsupported_operation_result, ToolContext};

/// A model-emitted tool call before argument repair.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: String,
}

const PATH_LIKE_KEYS: &[&str] = &["path", "paths", "source", "destination", "base", "working_directory"];

const REMOTE_TOOL_NAMES: &[&str] = &["remote_execution"];

/// Execute one tool call end to end and return the JSON-serialized
/// `ToolResult` ready to become the matching `tool` message. Never panics
/// or propagates an error out of this function: every failure mode becomes
/// an error `ToolResult`.
pub async fn execute_tool_call(registry: &ToolRegistry, ctx: &ToolContext, call: &ToolCallRequest) -> Value {
    let result = run(registry, ctx, call).await;
    serde_json::to_value(result).unwrap_or_else(|e| {
        serde_json::to_value(ToolResult::err(&call.name, format!("failed to serialize tool result: {e}")))
            .expect("ToolResult always serializes")
    })
}

async fn run(registry: &ToolRegistry, ctx: &ToolContext, call: &ToolCallRequest) -> ToolResult {
    let (tool_name, operation_alias) = resolve_alias(registry, &call.name);

    let mut args = match crate::arg_repair::parse_tool_arguments(&call.arguments) {
        Ok(v) => v,
        Err(e) => return ToolResult::err(&call.name, e.to_string()),
    };

    if let Some(op) = operation_alias {
        if let Some(obj) = args.as_object_mut() {
            obj.insert("operation".to_string(), Value::String(op.to_string()));
        }
    }

    if ctx.config.sandbox {
        if let Err(e) = enforce_sandbox(&tool_name, &args, &ctx.workspace_root) {
            return ToolResult::err(&call.name, e.to_string());
        }
    }

    if mcp_bridge::is_mcp_tool(&tool_name) {
        return run_mcp(ctx, &tool_name, call, args).await;
    }

    let Some(tool) = registry.lookup(&tool_name) else {
        let available = registry.names().join(", ");
        return ToolResult::err(&call.name, format!("unknown tool '{tool_name}'. Available tools: {available}"));
    };

    let op_value = args.get("operation").and_then(|v| v.as_str()).map(|s| s.to_string());
    if let Some(op) = &op_value {
        if !tool.operations().contains(&op.as_str()) {
            return unsupported_operation_result(tool.name(), tool.operations(), Some(op));
        }
    } else if !tool.operations().is_empty() {
        return unsupported_operation_result(tool.name(), tool.operations(), None);
    }

    let timeout = args
        .get("timeout")
        .or_else(|| args.get("timeout_secs"))
        .and_then(|v| v.as_u64());

    let execution = AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind();
    let outcome = match timeout {
        Some(secs) => match tokio::time::timeout(std::time::Duration::from_secs(secs), execution).await {
            Ok(result) => result,
            Err(_) => return ToolResult::err(tool.name(), format!("tool '{}' timed out after {secs}s", tool.name())),
        },
        None => execution.await,
    };

    let tool_result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => ToolResult::err(tool.name(), e.to_string()),
        Err(_panic) => ToolResult::err(tool.name(), format!("tool '{}' panicked during execution", tool.name())),
    };

    post_process(ctx, call, tool_result).await
}

async fn run_mcp(ctx: &ToolContext, tool_name: &str, call: &ToolCallRequest, args: Value) -> ToolResult {
    let Some(manager) = &ctx.mcp else {
        return ToolResult::err(tool_name, "no MCP servers are configured".to_string());
    };
    let result = match mcp_bridge::call(manager, tool_name, args).await {
        Ok(v) => v,
        Err(e) => return ToolResult::err(tool_name, e.to_string()),
    };
    let success = result.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
    let output = result.get("output").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let raw = if success {
        ToolResult::ok(tool_name, "mcp tool call", output)
    } else {
        ToolResult::err(tool_name, output)
    };
    post_process(ctx, call, raw).await
}

/// If `name` is not a registered tool but matches one of the registered
/// tools' operations, route the call to that tool with `operation = name`.
fn resolve_alias(registry: &ToolRegistry, name: &str) -> (String, Option<String>) {
    if registry.lookup(name).is_some() {
        return (name.to_string(), None);
    }
    for tool in registry.list() {
        if tool.operations().contains(&name) {
            return (tool.name().to_string(), Some(name.to_string()));
        }
    }
    (name.to_string(), None)
}

fn enforce_sandbox(tool_name: &str, args: &Value, workspace_root: &Path) -> agentrt_domain::error::Result<()> {
    if REMOTE_TOOL_NAMES.contains(&tool_name) {
        return Err(Error::InvalidInput(format!(
            "remote-execution tool '{tool_name}' is blocked while sandbox mode is enabled"
        )));
    }
    if let Some(obj) = args.as_object() {
        for key in PATH_LIKE_KEYS {
            match obj.get(*key) {
                Some(Value::String(s)) => {
                    validate_path(workspace_root, s, true)?;
                }
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Some(s) = item.as_str() {
                            validate_path(workspace_root, s, true)?;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Stores oversized output in the Tool Result Store and substitutes a
/// pagination marker for it in the message history.
async fn post_process(ctx: &ToolContext, call: &ToolCallRequest, mut result: ToolResult) -> ToolResult {
    match ctx.result_store.process_tool_result(&call.tool_call_id, &ctx.session_id, &result.output).await {
        Ok(output) => result.output = output,
        Err(e) => {
            tracing::warn!(tool_call_id = %call.tool_call_id, error = %e, "failed to persist oversized tool output");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollaborationChannel;
    use crate::file_ops::FileOperation;
    use crate::git_ops::NoGitLock;
    use crate::result_store::ToolResultStore;
    use crate::tool_trait::{Tool, ToolFlags};
    use agentrt_domain::config::Config;
    use agentrt_domain::error::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct EchoChannel;
    #[async_trait]
    impl CollaborationChannel for EchoChannel {
        async fn request_input(&self, _message: &str, _context: Option<&str>) -> Result<String> {
            Ok("echo".to_string())
        }
    }

    struct FileOpsTool;
    #[async_trait]
    impl Tool for FileOpsTool {
        fn name(&self) -> &'static str {
            "file_operations"
        }
        fn description(&self) -> &'static str {
            "filesystem tool"
        }
        fn operations(&self) -> &'static [&'static str] {
            &["read_file", "write_file", "grep_search"]
        }
        fn flags(&self) -> ToolFlags {
            ToolFlags::default()
        }
        async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
            let op: FileOperation = serde_json::from_value(args)?;
            let value = crate::file_ops::handle(&ctx.workspace_root, op, ctx.config.sandbox).await?;
            Ok(ToolResult::ok("file_operations", "file op", value.to_string()))
        }
    }

    struct PanicTool;
    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &'static str {
            "panics"
        }
        fn description(&self) -> &'static str {
            "always panics"
        }
        fn operations(&self) -> &'static [&'static str] {
            &["boom"]
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            panic!("boom")
        }
    }

    fn make_ctx(workspace_root: std::path::PathBuf, sandbox: bool) -> (TempDir, ToolContext) {
        let sessions_dir = workspace_root.join(".agentrt").join("sessions");
        let results_dir = workspace_root.join(".agentrt").join("tool_results");
        let memory_dir = workspace_root.join(".agentrt").join("memory");
        let ltm_path = workspace_root.join(".agentrt").join("ltm.json");
        let mut config = Config::default();
        config.sandbox = sandbox;
        let ctx = ToolContext {
            workspace_root: workspace_root.clone(),
            config,
            session_id: "s1".to_string(),
            git_lock: Arc::new(NoGitLock),
            collaboration: Arc::new(EchoChannel),
            result_store: Arc::new(ToolResultStore::new(results_dir, 8 * 1024, 32 * 1024)),
            kv: Arc::new(agentrt_memory::KvStore::new(memory_dir)),
            ltm: Arc::new(agentrt_memory::LtmStore::new(ltm_path, 100)),
            sessions_dir,
            mcp: None,
            subagents: None,
            remote: None,
        };
        (TempDir::new().unwrap(), ctx)
    }

    #[tokio::test]
    async fn dispatches_to_registered_tool_by_exact_name() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "hello").await.unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileOpsTool));
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), false);

        let call = ToolCallRequest {
            tool_call_id: "c1".into(),
            name: "file_operations".into(),
            arguments: r#"{"operation": "read_file", "path": "a.txt"}"#.into(),
        };
        let result = execute_tool_call(&registry, &ctx, &call).await;
        assert_eq!(result["success"], true);
    }

    #[tokio::test]
    async fn aliases_bare_operation_to_hosting_tool() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "hello").await.unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileOpsTool));
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), false);

        let call = ToolCallRequest {
            tool_call_id: "c1".into(),
            name: "read_file".into(),
            arguments: r#"{"path": "a.txt"}"#.into(),
        };
        let result = execute_tool_call(&registry, &ctx, &call).await;
        assert_eq!(result["success"], true);
    }

    #[tokio::test]
    async fn missing_operation_returns_helpful_error() {
        let registry_ = {
            let mut r = ToolRegistry::new();
            r.register(Arc::new(FileOpsTool));
            r
        };
        let dir = TempDir::new().unwrap();
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), false);
        let call = ToolCallRequest { tool_call_id: "c1".into(), name: "file_operations".into(), arguments: "{}".into() };
        let result = execute_tool_call(&registry_, &ctx, &call).await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("Valid operations"));
    }

    #[tokio::test]
    async fn unknown_tool_lists_available_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileOpsTool));
        let dir = TempDir::new().unwrap();
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), false);
        let call = ToolCallRequest { tool_call_id: "c1".into(), name: "nonexistent".into(), arguments: "{}".into() };
        let result = execute_tool_call(&registry, &ctx, &call).await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("file_operations"));
    }

    #[tokio::test]
    async fn sandbox_blocks_paths_outside_workspace() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileOpsTool));
        let dir = TempDir::new().unwrap();
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), true);
        let call = ToolCallRequest {
            tool_call_id: "c1".into(),
            name: "file_operations".into(),
            arguments: r#"{"operation": "read_file", "path": "../../etc/passwd"}"#.into(),
        };
        let result = execute_tool_call(&registry, &ctx, &call).await;
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn panicking_tool_is_converted_to_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanicTool));
        let dir = TempDir::new().unwrap();
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), false);
        let call = ToolCallRequest {
            tool_call_id: "c1".into(),
            name: "panics".into(),
            arguments: r#"{"operation": "boom"}"#.into(),
        };
        let result = execute_tool_call(&registry, &ctx, &call).await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn oversized_output_is_replaced_with_a_retrieval_marker() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileOpsTool));
        let dir = TempDir::new().unwrap();
        let big = "x".repeat(20_000);
        tokio::fs::write(dir.path().join("big.txt"), &big).await.unwrap();
        let (_tmp, ctx) = make_ctx(dir.path().to_path_buf(), false);
        let call = ToolCallRequest {
            tool_call_id: "c1".into(),
            name: "file_operations".into(),
            arguments: r#"{"operation": "read_file", "path": "big.txt"}"#.into(),
        };
        let result = execute_tool_call(&registry, &ctx, &call).await;
        assert!(result["output"].as_str().unwrap().contains("toolCallId=c1"));
    }
}
