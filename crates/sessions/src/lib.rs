//! Session persistence and lifecycle for the agent runtime: one atomically-written JSON file per session id under
//! `.agentrt/sessions/`, plus the idle-staleness reset policy.

pub mod lifecycle;
pub mod store;

pub use lifecycle::StalenessPolicy;
pub use store::{default_sessions_dir, SessionStore};
