//! Shared error type used across all agent-runtime crates.
//!
//! Variants map 1:1 onto the error kinds every collaborator (orchestrator,
//! executor, broker, remote) classifies into; see each variant's doc
//! comment for the propagation policy that applies to it.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Bad parameters, missing `operation`, unsupported operation, path
    /// outside sandbox. Surfaced as a tool error result; the turn loop
    /// continues.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing file, memory key, or stored tool result.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem or SSH permission failure.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Shell/SSH/LLM/collaboration timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Provider responded 429. Carries the `Retry-After` seconds if given.
    #[error("rate limited, retry after {retry_after_secs:?}s: {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },

    /// Non-retried; terminates the turn with a credential-fix instruction.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Retried with backoff up to 3 times by the orchestrator, then surfaced.
    #[error("server error: {0}")]
    ServerError(String),

    /// Partial assistant content is preserved by the caller; this only
    /// carries the reason the stream broke.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// A patch hunk could not be located unambiguously.
    #[error("patch mismatch in hunk {hunk}: {reason}")]
    PatchMismatch { hunk: usize, reason: String },

    /// Broker denied a lock request.
    #[error("lock contended: {0}")]
    LockContended(String),

    /// Broker connect failed; caller should degrade to no-coordination.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Orchestrator-level invariant violation. Abort the process with a
    /// final save attempt.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("http: {0}")]
    Http(String),

    /// A provider adapter's own error (non-transport, e.g. an API-level
    /// failure response body), kept distinct from `Http` so routers can
    /// pattern-match on message content for retriability.
    #[error("provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the orchestrator's LLM-call retry policy should retry this
    /// error (5xx / timeout) rather than surface it immediately.
    pub fn is_retryable_server_error(&self) -> bool {
        matches!(self, Error::ServerError(_) | Error::Timeout(_))
    }
}
