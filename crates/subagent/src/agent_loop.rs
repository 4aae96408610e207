//! Agent Loop: what a persistent sub-agent runs instead of
//! exiting after its first turn. Polls its own inbox, dispatches each
//! message to a caller-supplied handler, heartbeats, and respects `stop`.

use std::time::Duration;

use agentrt_broker::BrokerClient;
use agentrt_broker_protocol::{BrokerMessage, MessageType};
use agentrt_domain::error::Result;
use agentrt_domain::trace::TraceEvent;
use async_trait::async_trait;

/// What a handled message resolved to.
pub enum HandlerOutcome {
    /// Keep looping; nothing more to say about this message.
    Continue,
    /// The task behind this message is done; if `stop` is also set the
    /// whole loop should exit, otherwise the agent idles for more work.
    Completed { stop: bool },
    /// The handler cannot proceed without human input. The loop sends a
    /// `question` to `user` and waits for a `clarification` before
    /// re-invoking the handler with the same message.
    Blocked { reason: String },
    /// Unrecoverable; unwind the loop.
    Fatal(String),
}

/// Caller-supplied task dispatch, kept generic over the orchestrator turn
/// function so this crate never depends on `agentrt-orchestrator`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome;
}

pub struct AgentLoopConfig {
    pub agent_id: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

/// Runs until the handler signals `{completed, stop}`, a `stop` message
/// arrives from the broker, or the handler returns `Fatal`. Always
/// unregisters and flushes the inbox on the way out, successful or not.
pub async fn run(broker: &BrokerClient, handler: &dyn TaskHandler, cfg: AgentLoopConfig) -> Result<()> {
    let mut last_heartbeat = tokio::time::Instant::now();

    'outer: loop {
        tokio::time::sleep(cfg.poll_interval).await;

        if last_heartbeat.elapsed() >= cfg.heartbeat_interval {
            let _ = broker.heartbeat(&cfg.agent_id).await;
            last_heartbeat = tokio::time::Instant::now();
        }

        let messages = match broker.poll_inbox(&cfg.agent_id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(agent_id = %cfg.agent_id, error = %e, "agent loop: broker unreachable, retrying");
                continue;
            }
        };

        let mut handled_ids = Vec::new();
        for message in &messages {
            if message.kind == MessageType::Stop {
                handled_ids.push(message.id);
                let _ = broker.acknowledge(&cfg.agent_id, Some(handled_ids)).await;
                break 'outer;
            }

            match dispatch_with_blocking(broker, handler, &cfg.agent_id, message).await {
                HandlerOutcome::Fatal(reason) => {
                    handled_ids.push(message.id);
                    let _ = broker.acknowledge(&cfg.agent_id, Some(handled_ids)).await;
                    unwind(broker, &cfg.agent_id).await;
                    return Err(agentrt_domain::error::Error::Fatal(reason));
                }
                HandlerOutcome::Completed { stop } => {
                    handled_ids.push(message.id);
                    if stop {
                        let _ = broker.acknowledge(&cfg.agent_id, Some(handled_ids)).await;
                        break 'outer;
                    }
                }
                HandlerOutcome::Continue | HandlerOutcome::Blocked { .. } => {
                    handled_ids.push(message.id);
                }
            }
        }

        if !handled_ids.is_empty() {
            let _ = broker.acknowledge(&cfg.agent_id, Some(handled_ids)).await;
        }
    }

    unwind(broker, &cfg.agent_id).await;
    Ok(())
}

/// Runs the handler; if it reports `Blocked`, sends a `question` to `user`
/// and waits (polling the inbox) for a `clarification`, then re-invokes the
/// handler once before giving up and treating it as handled-with-no-result.
async fn dispatch_with_blocking(
    broker: &BrokerClient,
    handler: &dyn TaskHandler,
    agent_id: &str,
    message: &BrokerMessage,
) -> HandlerOutcome {
    match handler.handle(message).await {
        HandlerOutcome::Blocked { reason } => {
            let _ = broker.send_message(agent_id, "user", MessageType::Question, &reason).await;
            let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
            while tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(500)).await;
                if let Ok(inbox) = broker.poll_inbox(agent_id).await {
                    if let Some(clarification) = inbox.iter().find(|m| m.kind == MessageType::Clarification) {
                        let _ = broker.acknowledge(agent_id, Some(vec![clarification.id])).await;
                        return handler.handle(message).await;
                    }
                }
            }
            HandlerOutcome::Continue
        }
        other => other,
    }
}

async fn unwind(broker: &BrokerClient, agent_id: &str) {
    let _ = broker.acknowledge(agent_id, None).await;
    let _ = broker.unregister(agent_id).await;
    TraceEvent::SubAgentExited { agent_id: agent_id.to_string(), reason: "loop exited".to_string() }.emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_broker::Broker;
    use agentrt_broker_protocol::AgentMode;

    struct AlwaysCompletes;

    #[async_trait]
    impl TaskHandler for AlwaysCompletes {
        async fn handle(&self, _message: &BrokerMessage) -> HandlerOutcome {
            HandlerOutcome::Completed { stop: false }
        }
    }

    #[tokio::test]
    async fn stop_message_ends_the_loop() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("b.sock");
        let broker = Broker::bind(&sock, chrono::Duration::seconds(20), 200).unwrap();
        let server = tokio::spawn(broker.serve());

        let client = BrokerClient::connect(&sock).await.unwrap();
        client.register("child1", AgentMode::Persistent, "t", 1).await.unwrap();

        let controller = BrokerClient::connect(&sock).await.unwrap();
        controller.send_message("parent", "child1", MessageType::Stop, "stop now").await.unwrap();

        let cfg = AgentLoopConfig {
            agent_id: "child1".into(),
            poll_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_secs(30),
        };
        let result = tokio::time::timeout(Duration::from_secs(5), run(&client, &AlwaysCompletes, cfg)).await;
        assert!(result.is_ok());

        server.abort();
    }
}
