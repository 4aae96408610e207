//! Errors the broker client surfaces to its callers.

/// Client-side errors. Connect failure is deliberately not fatal — callers
/// (tools, sub-agent manager) degrade to "no coordination" and map this
/// into `agentrt_domain::error::Error::BrokerUnavailable`.
#[derive(thiserror::Error, Debug)]
pub enum BrokerClientError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("broker denied request: {0}")]
    Denied(String),
    #[error("broker request timed out")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
