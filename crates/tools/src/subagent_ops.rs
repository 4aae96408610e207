//! Sub-Agent Operations: spawn, list, and coordinate child
//! agents from inside a tool call. Thin serde-tagged wrapper around
//! [`agentrt_subagent::SubAgentManager`] so the model sees the same
//! `{operation, ...}` shape as every other multi-operation tool.

use agentrt_domain::error::{Error, Result};
use agentrt_subagent::{SpawnOptions, SubAgentManager};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum SubAgentOperation {
    Spawn {
        task: String,
        model: Option<String>,
        #[serde(default)]
        persistent: bool,
    },
    List,
    Status {
        agent_id: String,
    },
    Kill {
        agent_id: String,
    },
    Killall,
    Inbox,
    Acknowledge {
        #[serde(default)]
        message_ids: Option<Vec<u64>>,
    },
    History,
    Send {
        agent_id: String,
        message: String,
    },
    Broadcast {
        message: String,
    },
}

pub async fn handle(manager: &SubAgentManager, op: SubAgentOperation) -> Result<Value> {
    match op {
        SubAgentOperation::Spawn { task, model, persistent } => {
            if task.trim().is_empty() {
                return Err(Error::InvalidInput("'task' must not be empty".to_string()));
            }
            let summary = manager.spawn(SpawnOptions { task, model, persistent }).await?;
            Ok(serde_json::to_value(summary)?)
        }
        SubAgentOperation::List => Ok(serde_json::to_value(manager.list().await?)?),
        SubAgentOperation::Status { agent_id } => Ok(serde_json::to_value(manager.status(&agent_id).await?)?),
        SubAgentOperation::Kill { agent_id } => {
            manager.kill(&agent_id).await?;
            Ok(serde_json::json!({"killed": agent_id}))
        }
        SubAgentOperation::Killall => {
            let n = manager.killall().await?;
            Ok(serde_json::json!({"killed_count": n}))
        }
        SubAgentOperation::Inbox => Ok(serde_json::to_value(manager.inbox().await?)?),
        SubAgentOperation::Acknowledge { message_ids } => {
            let n = manager.acknowledge(message_ids).await?;
            Ok(serde_json::json!({"acknowledged_count": n}))
        }
        SubAgentOperation::History => Ok(serde_json::to_value(manager.history().await?)?),
        SubAgentOperation::Send { agent_id, message } => {
            manager.send(&agent_id, &message).await?;
            Ok(serde_json::json!({"sent_to": agent_id}))
        }
        SubAgentOperation::Broadcast { message } => {
            let n = manager.broadcast(&message).await?;
            Ok(serde_json::json!({"sent_count": n}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_deserializes_with_optional_fields_defaulted() {
        let op: SubAgentOperation = serde_json::from_value(serde_json::json!({
            "operation": "spawn",
            "task": "investigate flaky test",
        }))
        .unwrap();
        match op {
            SubAgentOperation::Spawn { task, model, persistent } => {
                assert_eq!(task, "investigate flaky test");
                assert!(model.is_none());
                assert!(!persistent);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_operation_fails_to_deserialize() {
        let result: std::result::Result<SubAgentOperation, _> =
            serde_json::from_value(serde_json::json!({"operation": "nonexistent"}));
        assert!(result.is_err());
    }
}
