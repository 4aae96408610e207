//! The common seam every built-in tool is wrapped in so the Registry and
//! Executor can dispatch by name without knowing each tool's concrete
//! argument shape.

use std::path::PathBuf;
use std::sync::Arc;

use agentrt_domain::config::Config;
use agentrt_domain::error::Result;
use agentrt_domain::tool_result::ToolResult;
use async_trait::async_trait;
use serde_json::Value;

use crate::collab::CollaborationChannel;
use crate::git_ops::GitLock;
use crate::result_store::ToolResultStore;

/// Everything `remote_execution` needs beyond a single call's arguments: the
/// static device/group table plus the credentials and local tree to ship
///. Absent when the host process has no provider configured
/// to borrow a model/key from, in which case the tool reports that remote
/// execution is unavailable rather than guessing at defaults.
#[derive(Clone)]
pub struct RemoteExecutionContext {
    pub config: agentrt_domain::config::RemoteConfig,
    pub default_model: String,
    pub api_key: String,
    pub local_root: PathBuf,
    pub entry_point_relpath: String,
}

/// Execution-control flags a tool declares about itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolFlags {
    /// Blocks any subsequent tool in the same assistant message until it
    /// returns (user collaboration, remote execution).
    pub requires_blocking: bool,
    /// Never runs concurrently with another `requires_serial` call from the
    /// same assistant message (git commit); the turn loop's batching keeps
    /// at most one such call in flight at a time.
    pub requires_serial: bool,
    /// Needs a real terminal / user attention when run locally.
    pub is_interactive: bool,
}

/// Everything a tool's `execute` may need beyond its own arguments. Holds
/// capability seams (`GitLock`, `CollaborationChannel`) behind trait objects
/// rather than hard-wiring a single concrete implementation, so the same
/// tool code runs unchanged for a top-level session and a broker-aware
/// sub-agent.
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub config: Config,
    pub session_id: String,
    pub git_lock: Arc<dyn GitLock>,
    pub collaboration: Arc<dyn CollaborationChannel>,
    pub result_store: Arc<ToolResultStore>,
    pub kv: Arc<agentrt_memory::KvStore>,
    pub ltm: Arc<agentrt_memory::LtmStore>,
    pub sessions_dir: PathBuf,
    pub mcp: Option<Arc<agentrt_mcp_client::McpManager>>,
    /// Present once a session has a broker connection to spawn/coordinate
    /// sub-agents through; absent for a bare one-shot invocation with no
    /// broker running.
    pub subagents: Option<Arc<agentrt_subagent::SubAgentManager>>,
    pub remote: Option<RemoteExecutionContext>,
}

/// A built-in tool: a name, a human description, the operations it
/// supports, optional execution-control flags, and an `execute` entry
/// point that receives already-repaired JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn operations(&self) -> &'static [&'static str];
    fn flags(&self) -> ToolFlags {
        ToolFlags::default()
    }

    /// `{name, description, parameters}`, cached by the Registry until the
    /// next mutation. `parameters` enumerates the `operation` values this
    /// tool supports; it is deliberately not a full per-operation schema.
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": {
                    "type": "object",
                    "properties": {
                        "operation": {
                            "type": "string",
                            "enum": self.operations(),
                        }
                    },
                    "required": ["operation"],
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Produced when the model calls an unsupported or missing `operation`:
/// enumerates the valid ones and shows an example so the next attempt
/// succeeds without another round trip.
pub fn unsupported_operation_result(tool_name: &str, operations: &[&str], got: Option<&str>) -> ToolResult {
    let example = operations.first().copied().unwrap_or("status");
    let message = match got {
        Some(op) => format!(
            "unsupported operation '{op}' for tool '{tool_name}'. Valid operations: {}. Example: {{\"operation\": \"{example}\"}}",
            operations.join(", ")
        ),
        None => format!(
            "missing 'operation' for tool '{tool_name}'. Valid operations: {}. Example: {{\"operation\": \"{example}\"}}",
            operations.join(", ")
        ),
    };
    ToolResult::err(tool_name, message)
}
