//! `GitLock` backed by the Coordination Broker: serializes
//! `git commit` across sibling sub-agents sharing a project, rather than
//! only within a single process like [`agentrt_tools::git_ops::NoGitLock`].

use agentrt_broker::BrokerClient;
use agentrt_domain::error::{Error, Result};
use agentrt_tools::git_ops::{GitLock, GitLockGuard};
use async_trait::async_trait;

pub struct BrokerGitLock {
    pub broker: BrokerClient,
    pub agent_id: String,
}

#[async_trait]
impl GitLock for BrokerGitLock {
    async fn acquire(&self) -> Result<GitLockGuard> {
        let granted = self
            .broker
            .request_git_lock(&self.agent_id)
            .await
            .map_err(|e| Error::BrokerUnavailable(e.to_string()))?;
        if !granted {
            return Err(Error::LockContended("git lock is held by another agent".to_string()));
        }
        let broker = self.broker.clone();
        let agent_id = self.agent_id.clone();
        Ok(GitLockGuard::new(move || {
            tokio::spawn(async move {
                let _ = broker.release_git_lock(&agent_id).await;
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_is_denied_until_the_first_is_released() {
        let dir = tempfile::TempDir::new().unwrap();
        let sock = dir.path().join("b.sock");
        let broker = agentrt_broker::Broker::bind(&sock, chrono::Duration::seconds(20), 200).unwrap();
        let server = tokio::spawn(broker.serve());

        let client_a = BrokerClient::connect(&sock).await.unwrap();
        client_a.register("a", agentrt_broker_protocol::AgentMode::Oneshot, "t", 1).await.unwrap();
        let client_b = BrokerClient::connect(&sock).await.unwrap();
        client_b.register("b", agentrt_broker_protocol::AgentMode::Oneshot, "t", 2).await.unwrap();

        let lock_a = BrokerGitLock { broker: client_a, agent_id: "a".to_string() };
        let lock_b = BrokerGitLock { broker: client_b, agent_id: "b".to_string() };

        let guard_a = lock_a.acquire().await.unwrap();
        assert!(lock_b.acquire().await.is_err());

        drop(guard_a);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(lock_b.acquire().await.is_ok());

        server.abort();
    }
}
