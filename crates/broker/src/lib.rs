//! Coordination Broker: a per-session local IPC service
//! that serializes file/git lock contention and routes messages between
//! sibling sub-agents. One [`Broker`] process owns a Unix-domain socket
//! named by session id; [`BrokerClient`] connects to it from the
//! orchestrator, tool executor, or sub-agent manager.
//!
//! Wire shape is a tagged-enum envelope over length-prefixed JSON frames on
//! a local socket. Broker absence is never fatal: `BrokerClient::connect`
//! failing maps to `BrokerClientError::Unavailable`, which callers convert
//! to `agentrt_domain::error::Error::BrokerUnavailable` and proceed without
//! coordination.

pub mod client;
pub mod reconnect;
pub mod server;
pub mod state;
pub mod types;

pub use client::BrokerClient;
pub use reconnect::ReconnectBackoff;
pub use server::{default_socket_path, Broker, BrokerHandle};
pub use types::BrokerClientError;

pub use agentrt_broker_protocol::{AgentMode, AgentRecord, AgentStatus, BrokerMessage, BrokerStatus, Lock, LockKind, MessageType};
