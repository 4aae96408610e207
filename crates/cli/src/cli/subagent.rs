//! `--subagent` child-mode entry point: the process a top-level session's
//! [`agentrt_subagent::manager::SubAgentManager`] spawns.
//! Grounded on `agentrt_subagent::child::ChildInvocation`'s argv contract
//! for the flags it reads, and on `agentrt_orchestrator`'s broker-backed
//! `GitLock`/`CollaborationChannel` for how it replaces the top-level
//! session's terminal-bound defaults once connected.

use std::sync::Arc;
use std::time::Duration;

use agentrt_broker::BrokerClient;
use agentrt_broker_protocol::{AgentMode, BrokerMessage, MessageType};
use agentrt_orchestrator::{BrokerCollaborationChannel, BrokerGitLock, Runtime, TurnDeps};
use agentrt_subagent::agent_loop::{self, AgentLoopConfig, HandlerOutcome, TaskHandler};
use agentrt_subagent::SubAgentManager;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Cli;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub async fn run(args: Cli) -> anyhow::Result<()> {
    let agent_id = args.agent_id.clone().ok_or_else(|| anyhow::anyhow!("--subagent requires --agent-id"))?;
    let broker_socket = args.broker_socket.clone().ok_or_else(|| anyhow::anyhow!("--subagent requires --broker-socket"))?;
    let project_root = args.project_root.clone().ok_or_else(|| anyhow::anyhow!("--subagent requires --project-root"))?;
    let task = args.task.clone().ok_or_else(|| anyhow::anyhow!("--subagent requires --task"))?;

    let broker = BrokerClient::connect(&broker_socket).await.map_err(|e| anyhow::anyhow!("connecting to broker: {e}"))?;
    let mode = if args.persistent { AgentMode::Persistent } else { AgentMode::Oneshot };
    broker
        .register(&agent_id, mode, &task, std::process::id())
        .await
        .map_err(|e| anyhow::anyhow!("registering with broker: {e}"))?;

    let (mut config, _path) = super::load_config()?;
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    let llm_config = config.llm.clone();

    let mut runtime = Runtime::bootstrap(&project_root, &agent_id, config, &llm_config).await?;

    runtime.tool_ctx.git_lock = Arc::new(BrokerGitLock { broker: broker.clone(), agent_id: agent_id.clone() });
    runtime.tool_ctx.collaboration = Arc::new(BrokerCollaborationChannel { broker: broker.clone(), agent_id: agent_id.clone() });
    let log_dir = runtime.tool_ctx.sessions_dir.parent().unwrap_or(&project_root).join("subagent-logs");
    runtime.tool_ctx.subagents =
        Some(Arc::new(SubAgentManager::new(agent_id.clone(), project_root.clone(), log_dir, broker_socket.clone(), Arc::new(broker.clone()))?));

    let mut session = crate::bootstrap::resolve_or_create(&runtime.sessions, &agent_id, &project_root.display().to_string()).await?;

    let outcome = run_one_turn(&runtime, &mut session, &task).await;
    report_outcome(&broker, &agent_id, &outcome).await;

    if !args.persistent {
        let _ = broker.unregister(&agent_id).await;
        return outcome.map(|_| ());
    }
    outcome?;

    let handler = Handler { runtime: &runtime, broker: broker.clone(), agent_id: agent_id.clone(), session: Mutex::new(session) };
    let cfg = AgentLoopConfig { agent_id: agent_id.clone(), poll_interval: POLL_INTERVAL, heartbeat_interval: HEARTBEAT_INTERVAL };
    agent_loop::run(&broker, &handler, cfg).await?;

    runtime.sessions.save(&mut handler.session.into_inner()).await?;
    Ok(())
}

async fn run_one_turn(runtime: &Runtime, session: &mut agentrt_domain::session::Session, message: &str) -> anyhow::Result<String> {
    let ltm_top = runtime.tool_ctx.ltm.top_n(5).await.unwrap_or_default();
    crate::bootstrap::prime_system_message(session, &runtime.registry, &ltm_top, true);

    let deps = TurnDeps { router: &runtime.router, registry: &runtime.registry, tool_ctx: &runtime.tool_ctx, config: &runtime.config };
    let interrupt = agentrt_orchestrator::InterruptFlag::new();
    let outcome = agentrt_orchestrator::run_turn(session, message, &deps, &interrupt).await;

    if let Err(e) = runtime.sessions.save(session).await {
        tracing::warn!(agent_id = %runtime.tool_ctx.session_id, error = %e, "failed to persist sub-agent session");
    }

    outcome.map(|o| o.final_text).map_err(|e| anyhow::anyhow!(e))
}

async fn report_outcome(broker: &BrokerClient, agent_id: &str, outcome: &anyhow::Result<String>) {
    let (kind, content) = match outcome {
        Ok(text) => (MessageType::Complete, text.clone()),
        Err(e) => (MessageType::Complete, format!("failed: {e}")),
    };
    let _ = broker.send_message(agent_id, "main", kind, &content).await;
}

/// Dispatches each `task`/`guidance` message the broker hands this agent to
/// another orchestrator turn over the same (mutex-guarded) session, so a
/// persistent sub-agent keeps its conversation history across messages the
/// way the top-level REPL keeps it across user turns. Replies go back to
/// whoever sent the message, not unconditionally to `main`.
struct Handler<'a> {
    runtime: &'a Runtime,
    broker: BrokerClient,
    agent_id: String,
    session: Mutex<agentrt_domain::session::Session>,
}

#[async_trait]
impl<'a> TaskHandler for Handler<'a> {
    async fn handle(&self, message: &BrokerMessage) -> HandlerOutcome {
        if !matches!(message.kind, MessageType::Task | MessageType::Guidance | MessageType::Broadcast) {
            return HandlerOutcome::Continue;
        }

        let mut session = self.session.lock().await;
        let result = run_one_turn(self.runtime, &mut session, &message.content).await;
        drop(session);

        match result {
            Ok(text) => {
                let _ = self.broker.send_message(&self.agent_id, &message.from, MessageType::Response, &text).await;
                HandlerOutcome::Completed { stop: false }
            }
            Err(e) => HandlerOutcome::Fatal(e.to_string()),
        }
    }
}
