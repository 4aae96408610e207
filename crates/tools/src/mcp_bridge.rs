//! MCP bridge: tool names prefixed `mcp_` are routed
//! to an external Model-Context-Protocol manager rather than the built-in
//! registry; this module owns the qualified-name scheme and the mapping of
//! the bridge's result shape into the uniform tool result.

use agentrt_domain::error::{Error, Result};
use agentrt_mcp_client::McpManager;
use serde_json::Value;

const PREFIX: &str = "mcp_";
const SEPARATOR: &str = "__";

pub fn is_mcp_tool(name: &str) -> bool {
    name.starts_with(PREFIX)
}

/// `mcp_<server_id>__<tool_name>`, the name an LLM sees in the tool menu
/// for each MCP-discovered tool.
pub fn qualified_name(server_id: &str, tool_name: &str) -> String {
    format!("{PREFIX}{server_id}{SEPARATOR}{tool_name}")
}

fn split_qualified_name(name: &str) -> Result<(&str, &str)> {
    let rest = name.strip_prefix(PREFIX).ok_or_else(|| Error::InvalidInput(format!("not an mcp_ tool name: '{name}'")))?;
    rest.split_once(SEPARATOR)
        .ok_or_else(|| Error::InvalidInput(format!("malformed mcp tool name '{name}', expected mcp_<server>__<tool>")))
}

/// Dispatch `tool_name` to the MCP manager and map the result into the
/// uniform `{success, output}` shape the executor expects from every tool.
pub async fn call(manager: &McpManager, tool_name: &str, arguments: Value) -> Result<Value> {
    let (server_id, mcp_tool_name) = split_qualified_name(tool_name)?;
    let result = manager
        .call_tool(server_id, mcp_tool_name, arguments)
        .await
        .map_err(Error::from)?;

    let text = result
        .content
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(serde_json::json!({
        "success": !result.is_error,
        "output": text,
        "server_id": server_id,
        "tool": mcp_tool_name,
    }))
}

/// Every MCP-discovered tool's qualified name plus description, for
/// inclusion in the Registry's exported schema list.
pub fn list_qualified_tools(manager: &McpManager) -> Vec<(String, String)> {
    manager
        .list_tools()
        .into_iter()
        .map(|(server_id, def)| (qualified_name(server_id, &def.name), def.description.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_mcp_tool_checks_prefix() {
        assert!(is_mcp_tool("mcp_filesystem__read_file"));
        assert!(!is_mcp_tool("file_operations"));
    }

    #[test]
    fn qualified_name_roundtrips_through_split() {
        let name = qualified_name("filesystem", "read_file");
        let (server, tool) = split_qualified_name(&name).unwrap();
        assert_eq!(server, "filesystem");
        assert_eq!(tool, "read_file");
    }

    #[test]
    fn split_rejects_names_without_mcp_prefix() {
        assert!(split_qualified_name("file_operations").is_err());
    }

    #[test]
    fn split_rejects_names_without_separator() {
        assert!(split_qualified_name("mcp_nowseparator").is_err());
    }
}
