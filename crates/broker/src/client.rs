//! Coordination Broker client: a short-lived connection per
//! request... except we keep one long-lived connection per agent, since
//! the broker needs a stable peer for message delivery and lock ownership.
//! Connect failure is not fatal: callers get a [`BrokerClientError::Unavailable`]
//! and are expected to degrade to "no coordination".

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentrt_broker_protocol::{
    read_frame, write_frame, AgentMode, AgentRecord, BrokerEnvelope, BrokerMessage, BrokerOp, BrokerReply,
    BrokerStatus, MessageType,
};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};

use crate::types::BrokerClientError;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<BrokerReply>>>>;

/// A connected client. Cheap to clone: the socket write half and the
/// pending-request table are shared.
#[derive(Clone)]
pub struct BrokerClient {
    writer: Arc<Mutex<WriteHalf<UnixStream>>>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
}

impl BrokerClient {
    /// Connect to the broker's Unix-domain socket and start the background
    /// reader task that demultiplexes replies by correlation id.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, BrokerClientError> {
        let stream = UnixStream::connect(socket_path.as_ref())
            .await
            .map_err(|e| BrokerClientError::Unavailable(e.to_string()))?;
        let (mut read_half, write_half) = tokio::io::split(stream);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(bytes)) => {
                        if let Ok(reply) = serde_json::from_slice::<BrokerReply>(&bytes) {
                            if let Some(tx) = reader_pending.lock().await.remove(&reply.id) {
                                let _ = tx.send(reply);
                            }
                        }
                    }
                    Ok(None) | Err(_) => {
                        // Connection closed; wake every still-pending waiter
                        // with nothing so they time out rather than hang.
                        reader_pending.lock().await.clear();
                        return;
                    }
                }
            }
        });

        Ok(Self { writer: Arc::new(Mutex::new(write_half)), pending, next_id: Arc::new(AtomicU64::new(1)) })
    }

    async fn request(&self, op: BrokerOp) -> Result<serde_json::Value, BrokerClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let envelope = BrokerEnvelope { id, op };
        let bytes = serde_json::to_vec(&envelope)?;
        {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &bytes).await.map_err(|e| {
                BrokerClientError::Unavailable(format!("failed to write to broker: {e}"))
            })?;
        }

        let reply = tokio::time::timeout(std::time::Duration::from_secs(10), rx)
            .await
            .map_err(|_| BrokerClientError::Timeout)?
            .map_err(|_| BrokerClientError::Unavailable("broker connection closed".to_string()))?;

        if reply.ok {
            Ok(reply.payload)
        } else {
            Err(BrokerClientError::Denied(reply.error.unwrap_or_default()))
        }
    }

    pub async fn register(&self, agent_id: &str, mode: AgentMode, task: &str, pid: u32) -> Result<AgentRecord, BrokerClientError> {
        let v = self.request(BrokerOp::Register { agent_id: agent_id.into(), mode, task: task.into(), pid }).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn heartbeat(&self, agent_id: &str) -> Result<(), BrokerClientError> {
        self.request(BrokerOp::Heartbeat { agent_id: agent_id.into() }).await?;
        Ok(())
    }

    pub async fn unregister(&self, agent_id: &str) -> Result<(), BrokerClientError> {
        self.request(BrokerOp::Unregister { agent_id: agent_id.into() }).await?;
        Ok(())
    }

    /// Returns `true` if granted, `false`... actually a denial comes back
    /// as `Err(Denied)`; this returns `Ok(true)` only on grant so callers
    /// can treat a denial as a normal "back off and retry" signal without
    /// matching on the error variant.
    pub async fn request_file_lock(&self, agent_id: &str, paths: &[String]) -> Result<bool, BrokerClientError> {
        match self.request(BrokerOp::RequestFileLock { agent_id: agent_id.into(), paths: paths.to_vec() }).await {
            Ok(_) => Ok(true),
            Err(BrokerClientError::Denied(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn release_file_lock(&self, agent_id: &str, paths: &[String]) -> Result<(), BrokerClientError> {
        self.request(BrokerOp::ReleaseFileLock { agent_id: agent_id.into(), paths: paths.to_vec() }).await?;
        Ok(())
    }

    pub async fn request_git_lock(&self, agent_id: &str) -> Result<bool, BrokerClientError> {
        match self.request(BrokerOp::RequestGitLock { agent_id: agent_id.into() }).await {
            Ok(_) => Ok(true),
            Err(BrokerClientError::Denied(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn release_git_lock(&self, agent_id: &str) -> Result<(), BrokerClientError> {
        self.request(BrokerOp::ReleaseGitLock { agent_id: agent_id.into() }).await?;
        Ok(())
    }

    pub async fn send_message(&self, from: &str, to: &str, kind: MessageType, content: &str) -> Result<BrokerMessage, BrokerClientError> {
        let v = self
            .request(BrokerOp::SendMessage { from: from.into(), to: to.into(), kind, content: content.into() })
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn poll_inbox(&self, agent_id: &str) -> Result<Vec<BrokerMessage>, BrokerClientError> {
        let v = self.request(BrokerOp::PollInbox { agent_id: agent_id.into() }).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn acknowledge(&self, agent_id: &str, message_ids: Option<Vec<u64>>) -> Result<usize, BrokerClientError> {
        let v = self.request(BrokerOp::Acknowledge { agent_id: agent_id.into(), message_ids }).await?;
        Ok(v.get("acknowledged").and_then(|n| n.as_u64()).unwrap_or(0) as usize)
    }

    pub async fn get_message_history(&self, agent_id: &str) -> Result<Vec<BrokerMessage>, BrokerClientError> {
        let v = self.request(BrokerOp::GetMessageHistory { agent_id: agent_id.into() }).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn send_discovery(&self, agent_id: &str, content: &str) -> Result<BrokerMessage, BrokerClientError> {
        let v = self.request(BrokerOp::SendDiscovery { agent_id: agent_id.into(), content: content.into() }).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn send_warning(&self, agent_id: &str, content: &str) -> Result<BrokerMessage, BrokerClientError> {
        let v = self.request(BrokerOp::SendWarning { agent_id: agent_id.into(), content: content.into() }).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn get_discoveries(&self) -> Result<Vec<BrokerMessage>, BrokerClientError> {
        let v = self.request(BrokerOp::GetDiscoveries).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn get_warnings(&self) -> Result<Vec<BrokerMessage>, BrokerClientError> {
        let v = self.request(BrokerOp::GetWarnings).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn get_status(&self) -> Result<BrokerStatus, BrokerClientError> {
        let v = self.request(BrokerOp::GetStatus).await?;
        Ok(serde_json::from_value(v)?)
    }

    /// Best-effort close; does not error if the peer already hung up.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
