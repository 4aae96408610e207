//! Session staleness policy (SPEC_FULL.md §4 "Session lifecycle / reset
//! policy"): a session untouched for longer than `idle_timeout` is flagged
//! stale on load. The orchestrator archives the old file under the same id
//! and starts a fresh history rather than silently discarding it.

use agentrt_domain::session::Session;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    pub idle_timeout: chrono::Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: chrono::Duration::hours(24),
        }
    }
}

impl StalenessPolicy {
    pub fn new(idle_timeout: chrono::Duration) -> Self {
        Self { idle_timeout }
    }

    pub fn is_stale(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(session.updated_at) >= self.idle_timeout
    }

    /// If `session` is stale, return a fresh replacement (same id and
    /// working directory, empty history/todos) plus an archive suffix the
    /// caller should pass to `SessionStore::archive` before saving it.
    pub fn reset_if_stale(&self, session: Session, now: DateTime<Utc>) -> (Session, Option<String>) {
        if !self.is_stale(&session, now) {
            return (session, None);
        }
        let suffix = format!("stale-{}", now.format("%Y%m%dT%H%M%S"));
        let fresh = Session::new(session.id.clone(), session.working_directory.clone());
        (fresh, Some(suffix))
    }
}
