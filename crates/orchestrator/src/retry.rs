//! Retry/backoff policy for the turn loop's LLM call: the
//! router's own fallback chain only reacts to timeouts and 5xx-shaped
//! provider errors, so `Error::RateLimited` — the one case that carries a
//! server-given wait hint — is handled one level up, here.

use agentrt_domain::error::Error;
use agentrt_domain::trace::TraceEvent;

/// Caps how long a single turn spends waiting out rate limits before giving
/// up and surfacing the error to the caller.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Default wait when a `RateLimited` error carries no `retry_after_secs`.
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 5;

/// Runs `attempt` up to `MAX_RATE_LIMIT_RETRIES + 1` times, sleeping for the
/// server-given (or default) wait whenever it returns `Error::RateLimited`.
/// Any other error is returned immediately without a retry.
pub async fn with_rate_limit_retry<T, F, Fut>(mut attempt: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut tries = 0u32;
    loop {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(Error::RateLimited { retry_after_secs, message }) if tries < MAX_RATE_LIMIT_RETRIES => {
                let wait_secs = retry_after_secs.unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS);
                tries += 1;
                TraceEvent::LlmRetry { attempt: tries, reason: message.clone(), wait_ms: wait_secs * 1000 }.emit();
                tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_one_rate_limited_retry() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::RateLimited { retry_after_secs: Some(0), message: "slow down".to_string() })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_rate_limit_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::RateLimited { retry_after_secs: Some(0), message: "still slow".to_string() })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RATE_LIMIT_RETRIES + 1);
    }

    #[tokio::test]
    async fn non_rate_limit_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_rate_limit_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidInput("bad request".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
