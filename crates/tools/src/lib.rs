//! Built-in tools for the agent runtime.
//!
//! Every multi-operation tool follows the same shape: a tagged `operation`
//! enum deserialized from the model's arguments and a `handle` entry point
//! (`file_ops`, `git_ops`, `terminal`, `collab`, `code_intel`, `apply_patch`,
//! `todo_ops`, `memory_ops`, `web_ops`). `tool_trait` wraps each in the
//! common `Tool` seam, `registry` and `builtin` assemble them into a
//! `ToolRegistry`, and `executor` is the single dispatch entry point the
//! orchestrator calls per tool call.

pub mod apply_patch;
pub mod arg_repair;
pub mod builtin;
pub mod code_intel;
pub mod collab;
pub mod executor;
pub mod file_ops;
pub mod git_ops;
pub mod mcp_bridge;
pub mod memory_ops;
pub mod registry;
pub mod remote_ops;
pub mod result_store;
pub mod subagent_ops;
pub mod terminal;
pub mod todo_ops;
pub mod tool_trait;
pub mod web_ops;

pub use builtin::default_registry;
pub use executor::{execute_tool_call, ToolCallRequest};
pub use registry::ToolRegistry;
pub use result_store::ToolResultStore;
pub use tool_trait::{RemoteExecutionContext, Tool, ToolContext, ToolFlags};
