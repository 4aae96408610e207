//! Coordination Broker wire protocol.
//!
//! The broker is a single process per session, reachable over a local
//! Unix-domain socket named by session id. Every request/response is a
//! length-prefixed JSON frame: a 4-byte big-endian length followed by that
//! many bytes of UTF-8 JSON. `BrokerEnvelope` wraps every request with a
//! correlation id so a client can match responses out of order on one
//! connection; `BrokerReply` is always `{ok, ...}`. A tagged-enum envelope
//! over a local socket rather than a remote WebSocket, since every peer is
//! a sibling process on the same machine.

use serde::{Deserialize, Serialize};

/// One request sent by a client to the broker, tagged with a correlation id
/// so responses on a long-lived connection can be matched out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerEnvelope {
    pub id: u64,
    pub op: BrokerOp,
}

/// Every operation the broker exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrokerOp {
    /// First message on a connection: registers (or re-registers) the
    /// calling agent and starts its heartbeat clock.
    Register {
        agent_id: String,
        mode: AgentMode,
        task: String,
        pid: u32,
    },
    Heartbeat {
        agent_id: String,
    },
    Unregister {
        agent_id: String,
    },
    RequestFileLock {
        agent_id: String,
        paths: Vec<String>,
    },
    ReleaseFileLock {
        agent_id: String,
        paths: Vec<String>,
    },
    RequestGitLock {
        agent_id: String,
    },
    ReleaseGitLock {
        agent_id: String,
    },
    SendMessage {
        from: String,
        to: String,
        #[serde(rename = "type")]
        kind: MessageType,
        content: String,
    },
    PollInbox {
        agent_id: String,
    },
    Acknowledge {
        agent_id: String,
        /// `None` acknowledges (clears) the entire inbox.
        message_ids: Option<Vec<u64>>,
    },
    GetMessageHistory {
        agent_id: String,
    },
    SendDiscovery {
        agent_id: String,
        content: String,
    },
    SendWarning {
        agent_id: String,
        content: String,
    },
    GetDiscoveries,
    GetWarnings,
    GetStatus,
}

/// The broker's reply to one `BrokerEnvelope`, carrying the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl BrokerReply {
    pub fn ok(id: u64, payload: serde_json::Value) -> Self {
        Self { id, ok: true, error: None, payload }
    }

    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self { id, ok: false, error: Some(error.into()), payload: serde_json::Value::Null }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Oneshot,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Blocked,
    Exited,
}

/// Broker-side view of a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    pub mode: AgentMode,
    pub task: String,
    pub pid: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    File,
    Git,
}

/// A held or requested resource lock, keyed by resource kind and path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub resource: String,
    pub holder: String,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
    pub kind: LockKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Task,
    Question,
    Answer,
    Clarification,
    Guidance,
    Discovery,
    Warning,
    Status,
    Stop,
    Complete,
    Response,
    Broadcast,
}

/// A message routed through the broker between two agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub id: u64,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub read: bool,
}

/// A snapshot of broker state for `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerStatus {
    pub agents: Vec<AgentRecord>,
    pub file_locks: Vec<Lock>,
    pub git_lock_holder: Option<String>,
    pub inbox_depths: std::collections::HashMap<String, usize>,
    pub discoveries: usize,
    pub warnings: usize,
}

/// Read one length-prefixed frame from `reader` into a `Vec<u8>`. Returns
/// `Ok(None)` on a clean EOF before any bytes of the next frame arrive.
pub async fn read_frame<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    use tokio::io::AsyncReadExt;
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Write one length-prefixed frame to `writer`.
pub async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let len = (bytes.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}
