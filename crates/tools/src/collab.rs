//! User collaboration tool: a single blocking, interactive operation that
//! asks the human a question and waits for a reply.
//!
//! The local-vs-sub-agent behavioral split lives behind the
//! `CollaborationChannel` trait: the orchestrator wires a terminal-backed
//! implementation for a top-level session, and the sub-agent manager wires
//! a broker-backed one for spawned agents. This tool never talks to a
//! terminal or a broker socket directly.

use agentrt_domain::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CollaborationOperation {
    RequestInput {
        message: String,
        #[serde(default)]
        context: Option<String>,
    },
}

pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

#[async_trait]
pub trait CollaborationChannel: Send + Sync {
    /// Present `message` (with optional `context`) to the human and block
    /// until a reply arrives or `DEFAULT_WAIT_TIMEOUT_SECS` elapses.
    async fn request_input(&self, message: &str, context: Option<&str>) -> Result<String>;

    /// Whether this channel talks to a human at the same terminal the turn
    /// loop is running in, as opposed to routing through the broker to a
    /// top-level session elsewhere. The turn loop uses this to decide
    /// whether to fold the question/reply into session history itself
    /// (the local case) or leave that to whichever session owns the other
    /// end of the broker conversation.
    fn is_local(&self) -> bool {
        false
    }
}

pub async fn handle(channel: &dyn CollaborationChannel, op: CollaborationOperation) -> Result<Value> {
    match op {
        CollaborationOperation::RequestInput { message, context } => {
            let reply = tokio::time::timeout(
                std::time::Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
                channel.request_input(&message, context.as_deref()),
            )
            .await
            .map_err(|_| Error::Timeout("request_input timed out waiting for a reply".to_string()))??;
            Ok(serde_json::json!({ "reply": reply }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl CollaborationChannel for Echo {
        async fn request_input(&self, message: &str, _context: Option<&str>) -> Result<String> {
            Ok(format!("answer to: {message}"))
        }
    }

    #[tokio::test]
    async fn request_input_returns_reply() {
        let op = CollaborationOperation::RequestInput { message: "continue?".into(), context: None };
        let result = handle(&Echo, op).await.unwrap();
        assert_eq!(result["reply"].as_str().unwrap(), "answer to: continue?");
    }
}
