//! Shared session wiring used by both the one-shot `run` command and the
//! interactive REPL: resolve-or-create a session, and keep its leading
//! system message in sync with the current tool registry / todo list /
//! long-term memory before every turn.

use agentrt_domain::conversation::{Message, Role};
use agentrt_domain::session::Session;
use agentrt_orchestrator::{build_system_prompt, SystemPromptInputs};
use agentrt_tools::ToolRegistry;

/// Load `session_id` from `runtime.sessions`, or start a fresh session
/// rooted at `working_directory` if none exists yet.
pub async fn resolve_or_create(
    sessions: &agentrt_sessions::SessionStore,
    session_id: &str,
    working_directory: &str,
) -> agentrt_domain::error::Result<Session> {
    match sessions.load(session_id).await? {
        Some(session) => Ok(session),
        None => Ok(Session::new(session_id, working_directory)),
    }
}

/// Replace (or insert) the session's leading `system` message with a
/// freshly-built prompt, so tool-registry/todo/ltm changes since the last
/// turn are reflected without growing the history every turn.
pub fn prime_system_message(session: &mut Session, registry: &ToolRegistry, ltm_top: &[agentrt_memory::LtmEntry], is_subagent: bool) {
    let working_directory = session.working_directory.clone();
    let prompt = build_system_prompt(&SystemPromptInputs {
        session,
        registry,
        ltm_top,
        working_directory: &working_directory,
        is_subagent,
    });
    let message = Message::system(prompt);
    if session.history.first().map(|m| m.role) == Some(Role::System) {
        session.history[0] = message;
    } else {
        session.history.insert(0, message);
    }
}
