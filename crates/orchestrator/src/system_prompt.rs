//! System prompt assembly: a pure function from
//! the current session/tool-registry/memory state to the text sent as the
//! conversation's `system` message. Kept side-effect free so it can be unit
//! tested without a provider or filesystem.

use agentrt_domain::session::Session;
use agentrt_memory::LtmEntry;
use agentrt_tools::ToolRegistry;

/// Everything the prompt needs beyond the session itself.
pub struct SystemPromptInputs<'a> {
    pub session: &'a Session,
    pub registry: &'a ToolRegistry,
    pub ltm_top: &'a [LtmEntry],
    pub working_directory: &'a str,
    /// Set for a spawned sub-agent's own turn loop: appends a preamble
    /// forbidding `user_collaboration` calls, since there is no human on
    /// the other end of a sub-agent's terminal.
    pub is_subagent: bool,
}

pub fn build(inputs: &SystemPromptInputs<'_>) -> String {
    let mut out = String::new();
    out.push_str("You are an autonomous coding agent operating inside a single project checkout.\n");
    out.push_str(&format!("Working directory: {}\n", inputs.working_directory));
    out.push_str(&format!("Session: {}\n\n", inputs.session.id));

    out.push_str("## Tools\n");
    out.push_str(&inputs.registry.menu());
    out.push_str("\n\n");

    if !inputs.session.todos.is_empty() {
        out.push_str("## Current todo list\n");
        for todo in &inputs.session.todos {
            out.push_str(&format!("- [{:?}] ({}) {}\n", todo.status, todo.id, todo.title));
        }
        out.push('\n');
    }

    if !inputs.ltm_top.is_empty() {
        out.push_str("## Relevant long-term memory\n");
        for entry in inputs.ltm_top {
            out.push_str(&format!("- ({:?}, confidence {:.2}) {}\n", entry.kind, entry.confidence, entry.payload));
        }
        out.push('\n');
    }

    out.push_str(
        "Use tools to inspect and modify the project rather than guessing at file contents. \
         Prefer the smallest change that satisfies the request. When a tool call fails, read \
         the error before retrying — it usually names the exact problem.\n",
    );

    if inputs.is_subagent {
        out.push_str(
            "\nYou are a sub-agent running without a human operator attached. Do not call \
             user_collaboration/request_input; there is no one to answer it and the call will \
             time out. Work from the task you were given and whatever the broker's shared \
             state and your own tools tell you. If you cannot proceed without a decision only \
             a human can make, stop and report the blocker in your final message instead of \
             asking for it.\n",
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::session::Session;

    #[test]
    fn includes_working_directory_and_tool_menu() {
        let session = Session::new("s1", "/proj");
        let registry = agentrt_tools::default_registry();
        let prompt = build(&SystemPromptInputs {
            session: &session,
            registry: &registry,
            ltm_top: &[],
            working_directory: "/proj",
            is_subagent: false,
        });
        assert!(prompt.contains("/proj"));
        assert!(prompt.contains("file_operations"));
    }

    #[test]
    fn omits_empty_sections() {
        let session = Session::new("s1", "/proj");
        let registry = agentrt_tools::default_registry();
        let prompt = build(&SystemPromptInputs {
            session: &session,
            registry: &registry,
            ltm_top: &[],
            working_directory: "/proj",
            is_subagent: false,
        });
        assert!(!prompt.contains("## Current todo list"));
        assert!(!prompt.contains("## Relevant long-term memory"));
        assert!(!prompt.contains("sub-agent running without a human operator"));
    }

    #[test]
    fn subagent_prompt_forbids_user_collaboration() {
        let session = Session::new("s1", "/proj");
        let registry = agentrt_tools::default_registry();
        let prompt = build(&SystemPromptInputs {
            session: &session,
            registry: &registry,
            ltm_top: &[],
            working_directory: "/proj",
            is_subagent: true,
        });
        assert!(prompt.contains("Do not call user_collaboration"));
    }
}
