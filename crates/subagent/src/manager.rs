//! Sub-Agent Operations: spawn child processes that run the
//! same orchestrator, and relay coordination through the broker on behalf
//! of the calling agent (the "self" identity passed to [`SubAgentManager::new`]).
//!
//! This crate deliberately does not depend on `agentrt-tools` or
//! `agentrt-orchestrator`: it only starts/stops OS processes and talks to
//! the broker. The spawned child re-runs the same binary, which wires its
//! own broker-backed `GitLock`/`CollaborationChannel` based on the
//! `--subagent` flags in [`crate::child::ChildInvocation`].

use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use agentrt_broker::BrokerClient;
use agentrt_broker_protocol::{AgentMode, AgentRecord, AgentStatus, BrokerMessage, MessageType};
use agentrt_domain::error::{Error, Result};
use chrono::Utc;
use serde::Serialize;

use crate::child::{log_path, ChildInvocation};

/// Lines of log tail included in [`AgentStatusDetail`].
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub status: AgentStatus,
    pub mode: AgentMode,
    pub task: String,
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusDetail {
    pub agent_id: String,
    pub task: String,
    pub pid: u32,
    pub mode: AgentMode,
    pub status: AgentStatus,
    pub started_at: chrono::DateTime<Utc>,
    pub last_heartbeat: chrono::DateTime<Utc>,
    pub uptime_secs: i64,
    pub log_tail: Vec<String>,
}

impl From<AgentRecord> for AgentSummary {
    fn from(r: AgentRecord) -> Self {
        Self { agent_id: r.agent_id, status: r.status, mode: r.mode, task: r.task, pid: r.pid }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub task: String,
    pub model: Option<String>,
    pub persistent: bool,
}

/// Owns the parent-side half of sub-agent lifecycle management: spawning
/// child processes and driving the broker client under the caller's own
/// agent identity (`"main"` for the top-level session).
pub struct SubAgentManager {
    self_agent_id: String,
    project_root: PathBuf,
    log_dir: PathBuf,
    broker_socket: PathBuf,
    broker: Arc<BrokerClient>,
    exe_path: PathBuf,
}

impl SubAgentManager {
    pub fn new(
        self_agent_id: impl Into<String>,
        project_root: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        broker_socket: impl Into<PathBuf>,
        broker: Arc<BrokerClient>,
    ) -> Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;
        let exe_path = std::env::current_exe().map_err(|e| Error::Other(format!("cannot resolve own executable: {e}")))?;
        Ok(Self {
            self_agent_id: self_agent_id.into(),
            project_root: project_root.into(),
            log_dir,
            broker_socket: broker_socket.into(),
            broker,
            exe_path,
        })
    }

    pub fn self_agent_id(&self) -> &str {
        &self.self_agent_id
    }

    /// Start a child process running the same binary in `--subagent` mode.
    /// Returns once the process is spawned; the child registers itself with
    /// the broker asynchronously, so an immediate `status()` may show it as
    /// not-yet-present until its first heartbeat lands.
    pub async fn spawn(&self, opts: SpawnOptions) -> Result<AgentSummary> {
        let agent_id = uuid::Uuid::new_v4().to_string();
        let invocation = ChildInvocation {
            agent_id: agent_id.clone(),
            broker_socket: self.broker_socket.clone(),
            project_root: self.project_root.clone(),
            task: opts.task.clone(),
            model: opts.model.clone(),
            persistent: opts.persistent,
        };

        let log_file_out = std::fs::File::create(log_path(&self.log_dir, &agent_id))?;
        let log_file_err = log_file_out.try_clone()?;

        let mut child = tokio::process::Command::new(&self.exe_path)
            .args(invocation.to_args())
            .current_dir(&self.project_root)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(log_file_out))
            .stderr(std::process::Stdio::from(log_file_err))
            .spawn()
            .map_err(|e| Error::Other(format!("failed to spawn sub-agent process: {e}")))?;

        let pid = child.id().unwrap_or(0);
        agentrt_domain::trace::TraceEvent::SubAgentSpawned {
            agent_id: agent_id.clone(),
            mode: if opts.persistent { "persistent".into() } else { "oneshot".into() },
        }
        .emit();

        // Reap in the background so it never becomes a zombie; we don't
        // block spawn() on it. kill() signals by pid looked up from the
        // broker record rather than holding onto this handle, since a
        // manager instance from a prior process invocation has no handle
        // to give it anyway.
        let reap_agent_id = agent_id.clone();
        tokio::spawn(async move {
            let _ = child.wait().await;
            tracing::debug!(agent_id = %reap_agent_id, "sub-agent child process exited");
        });

        Ok(AgentSummary {
            agent_id,
            status: AgentStatus::Running,
            mode: if opts.persistent { AgentMode::Persistent } else { AgentMode::Oneshot },
            task: opts.task,
            pid,
        })
    }

    pub async fn list(&self) -> Result<Vec<AgentSummary>> {
        let status = self.broker.get_status().await.map_err(|e| Error::BrokerUnavailable(e.to_string()))?;
        let mut agents: Vec<AgentSummary> = status.agents.into_iter().map(Into::into).collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    pub async fn status(&self, agent_id: &str) -> Result<AgentStatusDetail> {
        let status = self.broker.get_status().await.map_err(|e| Error::BrokerUnavailable(e.to_string()))?;
        let record = status
            .agents
            .into_iter()
            .find(|a| a.agent_id == agent_id)
            .ok_or_else(|| Error::NotFound(format!("sub-agent '{agent_id}' is not registered with the broker")))?;

        let uptime_secs = (Utc::now() - record.started_at).num_seconds().max(0);
        let log_tail = tail_lines(&log_path(&self.log_dir, agent_id), LOG_TAIL_LINES);

        Ok(AgentStatusDetail {
            agent_id: record.agent_id,
            task: record.task,
            pid: record.pid,
            mode: record.mode,
            status: record.status,
            started_at: record.started_at,
            last_heartbeat: record.last_heartbeat,
            uptime_secs,
            log_tail,
        })
    }

    /// Signal the process by pid (looked up from the broker record, since
    /// a manager may outlive the process that originally spawned a given
    /// agent) and unregister it so locks/inboxes are released immediately
    /// rather than waiting on the heartbeat reaper.
    pub async fn kill(&self, agent_id: &str) -> Result<()> {
        if let Ok(status) = self.broker.get_status().await {
            if let Some(record) = status.agents.iter().find(|a| a.agent_id == agent_id) {
                let _ = tokio::process::Command::new("kill").arg("-TERM").arg(record.pid.to_string()).output().await;
            }
        }

        let _ = self.broker.unregister(agent_id).await;
        agentrt_domain::trace::TraceEvent::SubAgentExited { agent_id: agent_id.to_string(), reason: "killed".to_string() }.emit();
        Ok(())
    }

    pub async fn killall(&self) -> Result<usize> {
        let agents = self.list().await?;
        let mut n = 0;
        for agent in agents {
            if agent.status != AgentStatus::Exited {
                self.kill(&agent.agent_id).await?;
                n += 1;
            }
        }
        Ok(n)
    }

    /// Non-destructive: this agent's own inbox.
    pub async fn inbox(&self) -> Result<Vec<BrokerMessage>> {
        self.broker.poll_inbox(&self.self_agent_id).await.map_err(|e| Error::BrokerUnavailable(e.to_string()))
    }

    pub async fn acknowledge(&self, message_ids: Option<Vec<u64>>) -> Result<usize> {
        self.broker.acknowledge(&self.self_agent_id, message_ids).await.map_err(|e| Error::BrokerUnavailable(e.to_string()))
    }

    pub async fn history(&self) -> Result<Vec<BrokerMessage>> {
        self.broker.get_message_history(&self.self_agent_id).await.map_err(|e| Error::BrokerUnavailable(e.to_string()))
    }

    pub async fn send(&self, agent_id: &str, message: &str) -> Result<()> {
        self.broker
            .send_message(&self.self_agent_id, agent_id, MessageType::Guidance, message)
            .await
            .map_err(|e| Error::BrokerUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn broadcast(&self, message: &str) -> Result<usize> {
        let agents = self.list().await?;
        let mut n = 0;
        for agent in agents.iter().filter(|a| a.status != AgentStatus::Exited && a.agent_id != self.self_agent_id) {
            self.broker
                .send_message(&self.self_agent_id, &agent.agent_id, MessageType::Broadcast, message)
                .await
                .map_err(|e| Error::BrokerUnavailable(e.to_string()))?;
            n += 1;
        }
        Ok(n)
    }
}

/// Best-effort last-`n`-lines read; returns an empty vec if the log does
/// not exist yet (the child hasn't written anything) rather than erroring.
fn tail_lines(path: &std::path::Path, n: usize) -> Vec<String> {
    use std::io::Read;
    let Ok(mut f) = std::fs::File::open(path) else { return Vec::new() };
    let mut contents = String::new();
    if f.seek(SeekFrom::Start(0)).is_err() || f.read_to_string(&mut contents).is_err() {
        return Vec::new();
    }
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_lines_returns_empty_for_missing_file() {
        let path = std::path::Path::new("/nonexistent/definitely/not/here.log");
        assert!(tail_lines(path, 20).is_empty());
    }

    #[test]
    fn tail_lines_caps_at_n() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, (0..50).map(|i| format!("line {i}\n")).collect::<String>()).unwrap();
        let tail = tail_lines(&path, 5);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[4], "line 49");
    }
}
