//! `CollaborationChannel` implementations: a terminal
//! one for the top-level session and a broker-backed one for sub-agents,
//! so `user_collaboration` never needs to know which kind of agent is
//! calling it.

use agentrt_broker::BrokerClient;
use agentrt_broker_protocol::MessageType;
use agentrt_domain::error::{Error, Result};
use agentrt_tools::collab::CollaborationChannel;
use async_trait::async_trait;
use std::io::Write;

/// Blocks on stdin/stdout. Used by the top-level interactive session, where
/// a human is actually at the keyboard.
pub struct TerminalCollaborationChannel;

#[async_trait]
impl CollaborationChannel for TerminalCollaborationChannel {
    async fn request_input(&self, message: &str, context: Option<&str>) -> Result<String> {
        let message = message.to_string();
        let context = context.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            if let Some(ctx) = &context {
                eprintln!("[context] {ctx}");
            }
            eprint!("{message}\n> ");
            std::io::stderr().flush().ok();
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .map_err(|e| Error::Io(e))?;
            Ok(line.trim_end_matches(['\n', '\r']).to_string())
        })
        .await
        .map_err(|e| Error::Other(format!("terminal collaboration task panicked: {e}")))?
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Routes the question through the broker to `"user"` and waits (polling
/// its own inbox) for an `answer`/`clarification` reply. Used by sub-agents,
/// which have no terminal of their own.
pub struct BrokerCollaborationChannel {
    pub broker: BrokerClient,
    pub agent_id: String,
}

#[async_trait]
impl CollaborationChannel for BrokerCollaborationChannel {
    async fn request_input(&self, message: &str, context: Option<&str>) -> Result<String> {
        let content = match context {
            Some(ctx) => format!("{message}\n\ncontext: {ctx}"),
            None => message.to_string(),
        };
        self.broker
            .send_message(&self.agent_id, "user", MessageType::Question, &content)
            .await
            .map_err(|e| Error::BrokerUnavailable(e.to_string()))?;

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(300);
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            let inbox = self
                .broker
                .poll_inbox(&self.agent_id)
                .await
                .map_err(|e| Error::BrokerUnavailable(e.to_string()))?;
            if let Some(stop) = inbox.iter().find(|m| matches!(m.kind, MessageType::Stop)) {
                let _ = self.broker.acknowledge(&self.agent_id, Some(vec![stop.id])).await;
                return Err(Error::Other("request_input aborted: received a stop signal".to_string()));
            }
            if let Some(reply) = inbox
                .iter()
                .find(|m| matches!(m.kind, MessageType::Answer | MessageType::Clarification))
            {
                let _ = self.broker.acknowledge(&self.agent_id, Some(vec![reply.id])).await;
                return Ok(reply.content.clone());
            }
        }
        Err(Error::Timeout("request_input timed out waiting for the user over the broker".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broker_channel_returns_the_answer_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("b.sock");
        let broker = agentrt_broker::Broker::bind(&sock, chrono::Duration::seconds(20), 200).unwrap();
        let server = tokio::spawn(broker.serve());

        let agent_client = BrokerClient::connect(&sock).await.unwrap();
        agent_client.register("child1", agentrt_broker_protocol::AgentMode::Oneshot, "t", 1).await.unwrap();
        let channel = BrokerCollaborationChannel { broker: agent_client, agent_id: "child1".to_string() };

        let responder = BrokerClient::connect(&sock).await.unwrap();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                if responder.poll_inbox("user").await.map(|m| !m.is_empty()).unwrap_or(false) {
                    let _ = responder.send_message("user", "child1", MessageType::Answer, "42").await;
                    return;
                }
            }
        });

        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), channel.request_input("how many?", None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, "42");

        server.abort();
    }
}
