//! Coordination Broker server: a single process per session
//! that owns one local Unix-domain socket, named by session id. All state
//! mutations are serialized through one task that owns a `State`; client
//! I/O (accept, read, write) runs concurrently across connections.

use std::path::{Path, PathBuf};

use agentrt_broker_protocol::{read_frame, write_frame, BrokerEnvelope, BrokerOp, BrokerReply};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

use crate::state::State;

/// One command sent to the state-owning task: the parsed op plus a
/// one-shot channel to deliver the reply payload back to the connection
/// that received it.
struct Command {
    op: BrokerOp,
    reply_tx: oneshot::Sender<Result<serde_json::Value, String>>,
}

#[derive(Clone)]
pub struct BrokerHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl BrokerHandle {
    async fn dispatch(&self, op: BrokerOp) -> Result<serde_json::Value, String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Command { op, reply_tx }).await.is_err() {
            return Err("broker state task has shut down".to_string());
        }
        reply_rx.await.unwrap_or_else(|_| Err("broker dropped the request".to_string()))
    }
}

/// The broker process. Bind with [`Broker::bind`], then [`Broker::serve`]
/// to run forever (typically spawned on its own task by the CLI/sub-agent
/// manager that owns the session).
pub struct Broker {
    listener: UnixListener,
    socket_path: PathBuf,
    state_task: tokio::task::JoinHandle<()>,
    handle: BrokerHandle,
}

impl Broker {
    /// Bind the socket at `socket_path`, removing any stale file left by a
    /// crashed prior instance first.
    pub fn bind(
        socket_path: impl Into<PathBuf>,
        heartbeat_timeout: chrono::Duration,
        shared_list_capacity: usize,
    ) -> std::io::Result<Self> {
        let socket_path = socket_path.into();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&socket_path)?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
        let state_task = tokio::spawn(async move {
            let mut state = State::new(heartbeat_timeout, shared_list_capacity);
            while let Some(Command { op, reply_tx }) = cmd_rx.recv().await {
                let result = apply(&mut state, op);
                let _ = reply_tx.send(result);
            }
        });

        Ok(Self { listener, socket_path, state_task, handle: BrokerHandle { cmd_tx } })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn handle(&self) -> BrokerHandle {
        self.handle.clone()
    }

    /// Accept connections forever. Returns only on a listener error; the
    /// caller typically runs this inside `tokio::spawn` for the lifetime of
    /// the session.
    pub async fn serve(self) -> std::io::Result<()> {
        loop {
            let (stream, _addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handle).await {
                    tracing::debug!(error = %e, "broker connection closed");
                }
            });
        }
    }

    /// Stop accepting new requests and wait for the state task to drain.
    /// Mainly useful in tests.
    pub async fn shutdown(self) {
        drop(self.listener);
        self.state_task.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn handle_connection(mut stream: UnixStream, handle: BrokerHandle) -> std::io::Result<()> {
    loop {
        let Some(bytes) = read_frame(&mut stream).await? else { return Ok(()) };
        let envelope: BrokerEnvelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "malformed broker envelope, dropping connection");
                return Ok(());
            }
        };
        let reply = match handle.dispatch(envelope.op).await {
            Ok(payload) => BrokerReply::ok(envelope.id, payload),
            Err(e) => BrokerReply::err(envelope.id, e),
        };
        let reply_bytes = serde_json::to_vec(&reply)?;
        write_frame(&mut stream, &reply_bytes).await?;
    }
}

/// Pure dispatch from one `BrokerOp` to the `State` mutation it names.
/// Ordering is total because this function only ever runs inside the
/// single state-owning task.
fn apply(state: &mut State, op: BrokerOp) -> Result<serde_json::Value, String> {
    use BrokerOp::*;
    match op {
        Register { agent_id, mode, task, pid } => {
            let record = state.register(&agent_id, mode, &task, pid);
            Ok(serde_json::to_value(record).unwrap())
        }
        Heartbeat { agent_id } => {
            if state.heartbeat(&agent_id) {
                Ok(serde_json::json!({}))
            } else {
                Err(format!("unknown agent '{agent_id}'"))
            }
        }
        Unregister { agent_id } => {
            state.unregister(&agent_id);
            Ok(serde_json::json!({}))
        }
        RequestFileLock { agent_id, paths } => {
            let granted = state.request_file_lock(&agent_id, &paths);
            if granted {
                Ok(serde_json::json!({"granted": true}))
            } else {
                Err(format!("one or more of {paths:?} is already locked"))
            }
        }
        ReleaseFileLock { agent_id, paths } => {
            state.release_file_lock(&agent_id, &paths);
            Ok(serde_json::json!({}))
        }
        RequestGitLock { agent_id } => {
            if state.request_git_lock(&agent_id) {
                Ok(serde_json::json!({"granted": true}))
            } else {
                Err("git lock is held by another agent".to_string())
            }
        }
        ReleaseGitLock { agent_id } => {
            state.release_git_lock(&agent_id);
            Ok(serde_json::json!({}))
        }
        SendMessage { from, to, kind, content } => {
            let msg = state.send_message(&from, &to, kind, &content);
            Ok(serde_json::to_value(msg).unwrap())
        }
        PollInbox { agent_id } => Ok(serde_json::to_value(state.poll_inbox(&agent_id)).unwrap()),
        Acknowledge { agent_id, message_ids } => {
            let count = state.acknowledge(&agent_id, message_ids.as_deref());
            Ok(serde_json::json!({"acknowledged": count}))
        }
        GetMessageHistory { agent_id } => Ok(serde_json::to_value(state.get_message_history(&agent_id)).unwrap()),
        SendDiscovery { agent_id, content } => {
            let msg = state.send_discovery(&agent_id, &content);
            Ok(serde_json::to_value(msg).unwrap())
        }
        SendWarning { agent_id, content } => {
            let msg = state.send_warning(&agent_id, &content);
            Ok(serde_json::to_value(msg).unwrap())
        }
        GetDiscoveries => Ok(serde_json::to_value(state.get_discoveries()).unwrap()),
        GetWarnings => Ok(serde_json::to_value(state.get_warnings()).unwrap()),
        GetStatus => Ok(serde_json::to_value(state.status()).unwrap()),
    }
}

/// `.agentrt/broker/<session_id>.sock` — named by session id so sibling
/// sub-agents working the same project find the same broker.
pub fn default_socket_path(project_root: &Path, session_id: &str) -> PathBuf {
    project_root.join(".agentrt").join("broker").join(format!("{session_id}.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_broker_protocol::{AgentMode, MessageType};

    #[tokio::test]
    async fn register_then_heartbeat_roundtrips() {
        let dir = tempfile::TempDir::new().unwrap();
        let broker = Broker::bind(dir.path().join("b.sock"), chrono::Duration::seconds(20), 200).unwrap();
        let handle = broker.handle();
        let server = tokio::spawn(broker.serve());

        let client = crate::client::BrokerClient::connect(dir.path().join("b.sock")).await.unwrap();
        client.register("a1", AgentMode::Oneshot, "task", 123).await.unwrap();
        client.heartbeat("a1").await.unwrap();

        let status = client.get_status().await.unwrap();
        assert_eq!(status.agents.len(), 1);

        server.abort();
        let _ = handle.dispatch(BrokerOp::GetStatus).await;
    }

    #[tokio::test]
    async fn file_lock_denied_to_second_requester() {
        let dir = tempfile::TempDir::new().unwrap();
        let broker = Broker::bind(dir.path().join("b.sock"), chrono::Duration::seconds(20), 200).unwrap();
        let server = tokio::spawn(broker.serve());

        let c1 = crate::client::BrokerClient::connect(dir.path().join("b.sock")).await.unwrap();
        let c2 = crate::client::BrokerClient::connect(dir.path().join("b.sock")).await.unwrap();

        assert!(c1.request_file_lock("a1", &["lib/M.pm".into()]).await.unwrap());
        assert!(!c2.request_file_lock("a2", &["lib/M.pm".into()]).await.unwrap());
        c1.release_file_lock("a1", &["lib/M.pm".into()]).await.unwrap();
        assert!(c2.request_file_lock("a2", &["lib/M.pm".into()]).await.unwrap());

        server.abort();
    }

    #[tokio::test]
    async fn send_message_then_poll_then_acknowledge() {
        let dir = tempfile::TempDir::new().unwrap();
        let broker = Broker::bind(dir.path().join("b.sock"), chrono::Duration::seconds(20), 200).unwrap();
        let server = tokio::spawn(broker.serve());

        let client = crate::client::BrokerClient::connect(dir.path().join("b.sock")).await.unwrap();
        client.send_message("a1", "a2", MessageType::Question, "ping?").await.unwrap();
        let inbox = client.poll_inbox("a2").await.unwrap();
        assert_eq!(inbox.len(), 1);
        client.acknowledge("a2", None).await.unwrap();
        let inbox = client.poll_inbox("a2").await.unwrap();
        assert!(inbox.is_empty());

        server.abort();
    }
}
