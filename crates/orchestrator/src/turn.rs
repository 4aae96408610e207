//! The turn loop: the state machine that
//! takes one user message, round-trips it against the LLM and the tool
//! executor until the model stops calling tools or the iteration budget
//! runs out, and returns the final assistant text.
//!
//! Reusable by both the top-level session and a sub-agent's single-shot
//! invocation — neither holds any turn-loop logic of its own.

use std::time::Instant;

use agentrt_domain::capability::ModelRole;
use agentrt_domain::config::Config;
use agentrt_domain::conversation::{Message, ToolDefinition};
use agentrt_domain::error::Result;
use agentrt_domain::session::Session;
use agentrt_domain::trace::TraceEvent;
use agentrt_providers::{ChatRequest, LlmRouter};
use agentrt_tools::tool_trait::{Tool, ToolFlags};
use agentrt_tools::{ToolCallRequest, ToolContext, ToolRegistry};

use crate::interrupt::{interrupt_message, InterruptFlag};
use crate::retry::with_rate_limit_retry;

/// Everything a turn needs beyond the session and the user's message.
pub struct TurnDeps<'a> {
    pub router: &'a LlmRouter,
    pub registry: &'a ToolRegistry,
    pub tool_ctx: &'a ToolContext,
    pub config: &'a Config,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_text: String,
    pub iterations: u32,
    /// `true` if the iteration budget was exhausted before the model
    /// stopped calling tools.
    pub truncated: bool,
}

/// Runs one turn to completion, mutating `session.history` in place as it
/// goes so a crash mid-turn leaves a valid (pairing-respecting) transcript
/// behind rather than a half-written one.
pub async fn run_turn(
    session: &mut Session,
    user_message: &str,
    deps: &TurnDeps<'_>,
    interrupt: &InterruptFlag,
) -> Result<TurnOutcome> {
    session.history.push(Message::user(user_message));

    let mut last_text = String::new();
    let mut iterations: u32 = 0;

    loop {
        if iterations >= deps.config.max_iterations {
            TraceEvent::TurnFinished { session_id: session.id.clone(), iterations, truncated: true }.emit();
            return Ok(TurnOutcome { final_text: last_text, iterations, truncated: true });
        }
        iterations += 1;
        TraceEvent::TurnStarted { session_id: session.id.clone(), iteration: iterations }.emit();

        if interrupt.take() {
            session.history.push(interrupt_message());
            TraceEvent::InterruptInjected { session_id: session.id.clone() }.emit();
        }

        let tools = tool_definitions(deps.registry);
        let req = ChatRequest { messages: session.history.clone(), tools, temperature: None, max_tokens: None, json_mode: false, model: None };

        let router = deps.router;
        let response = with_rate_limit_retry(|| {
            let req = req.clone();
            async move { router.chat_for_role(ModelRole::Executor, req).await }
        })
        .await?;

        last_text = response.content.clone();

        if response.tool_calls.is_empty() {
            session.history.push(Message::assistant(response.content.clone()));
            TraceEvent::TurnFinished { session_id: session.id.clone(), iterations, truncated: false }.emit();
            return Ok(TurnOutcome { final_text: response.content, iterations, truncated: false });
        }

        session.history.push(Message::assistant_with_tool_calls(response.content.clone(), response.tool_calls.clone()));

        for call in &response.tool_calls {
            TraceEvent::ToolDispatched {
                tool_call_id: call.id.clone(),
                tool_name: call.tool_name.clone(),
                operation: call.arguments.get("operation").and_then(|v| v.as_str()).map(str::to_string),
            }
            .emit();
        }

        let results = dispatch_tool_calls(deps.registry, deps.tool_ctx, &response.tool_calls).await;
        for (call, value) in response.tool_calls.iter().zip(results.iter()) {
            let content = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
            session.history.push(Message::tool_result(call.id.clone(), content));

            if deps.tool_ctx.collaboration.is_local() && is_collaboration_request(deps.registry, &call.tool_name) {
                record_collaboration_exchange(session, call, value);
            }
        }
    }
}

/// For a local (terminal) `request_input` call, fold the question asked and
/// the reply given into session history as an assistant/user pair, on top
/// of the raw tool result already recorded — so the transcript reads the
/// way it would have if the user had just been asked directly.
fn record_collaboration_exchange(
    session: &mut Session,
    call: &agentrt_domain::conversation::ToolCall,
    value: &serde_json::Value,
) {
    let Some(message) = call.arguments.get("message").and_then(|v| v.as_str()) else {
        return;
    };
    let question = match call.arguments.get("context").and_then(|v| v.as_str()) {
        Some(ctx) => format!("{message}\n\ncontext: {ctx}"),
        None => message.to_string(),
    };

    let output = value.get("output").and_then(|v| v.as_str()).unwrap_or_default();
    let Some(reply) = serde_json::from_str::<serde_json::Value>(output)
        .ok()
        .and_then(|v| v.get("reply").and_then(|r| r.as_str()).map(str::to_string))
    else {
        return;
    };

    session.history.push(Message::assistant(question));
    session.history.push(Message::user(reply));
}

/// Whether `name` (a registered tool or a bare operation alias) resolves to
/// the `user_collaboration` tool.
fn is_collaboration_request(registry: &ToolRegistry, name: &str) -> bool {
    if let Some(tool) = registry.lookup(name) {
        return tool.name() == "user_collaboration";
    }
    registry.list().iter().any(|tool| tool.name() == "user_collaboration" && tool.operations().contains(&name))
}

/// Splits `calls` into batches at every `requires_blocking` call (which runs
/// alone, since it must finish before anything after it in the same
/// assistant turn starts) and runs each batch concurrently, preserving
/// overall call order in the returned results. A batch never contains more
/// than one `requires_serial` call, so two serial calls (e.g. two git
/// operations) in the same assistant message never race each other — each
/// additional serial call starts a new batch instead.
async fn dispatch_tool_calls(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    calls: &[agentrt_domain::conversation::ToolCall],
) -> Vec<serde_json::Value> {
    let mut results = Vec::with_capacity(calls.len());
    let mut batch_start = 0;

    while batch_start < calls.len() {
        let mut batch_end = batch_start;
        // A blocking call is its own singleton batch; otherwise grow the
        // batch until (but not including) the next blocking call, stopping
        // early if it already holds a serial call and hits another one.
        if flags_for(registry, &calls[batch_start].tool_name).requires_blocking {
            batch_end = batch_start + 1;
        } else {
            let mut has_serial = flags_for(registry, &calls[batch_start].tool_name).requires_serial;
            batch_end += 1;
            while batch_end < calls.len() {
                let flags = flags_for(registry, &calls[batch_end].tool_name);
                if flags.requires_blocking || (flags.requires_serial && has_serial) {
                    break;
                }
                has_serial |= flags.requires_serial;
                batch_end += 1;
            }
        }

        let futures = calls[batch_start..batch_end].iter().map(|call| {
            let request = ToolCallRequest {
                tool_call_id: call.id.clone(),
                name: call.tool_name.clone(),
                arguments: call.arguments.to_string(),
            };
            async move {
                let started = Instant::now();
                let value = agentrt_tools::execute_tool_call(registry, ctx, &request).await;
                let success = value.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
                let output_bytes = value.get("output").and_then(|v| v.as_str()).map(str::len).unwrap_or(0);
                TraceEvent::ToolCompleted {
                    tool_call_id: request.tool_call_id,
                    tool_name: request.name,
                    success,
                    duration_ms: started.elapsed().as_millis() as u64,
                    output_bytes,
                }
                .emit();
                value
            }
        });
        results.extend(futures_util::future::join_all(futures).await);
        batch_start = batch_end;
    }

    results
}

/// Resolves `name` to its hosting tool's flags, whether `name` is a
/// registered tool or a bare operation alias — mirrors
/// `agentrt_tools::executor`'s private alias resolution closely enough to
/// decide batching, without needing that function exported.
fn flags_for(registry: &ToolRegistry, name: &str) -> ToolFlags {
    if let Some(tool) = registry.lookup(name) {
        return tool.flags();
    }
    for tool in registry.list() {
        if tool.operations().contains(&name) {
            return tool.flags();
        }
    }
    ToolFlags::default()
}

fn tool_definitions(registry: &ToolRegistry) -> Vec<ToolDefinition> {
    registry
        .list()
        .iter()
        .map(|t| {
            let schema = t.schema();
            let parameters = schema.get("function").and_then(|f| f.get("parameters")).cloned().unwrap_or(serde_json::json!({}));
            ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), parameters }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_for_resolves_bare_operation_alias() {
        let registry = agentrt_tools::default_registry();
        let flags = flags_for(&registry, "read_file");
        assert!(!flags.requires_blocking);
        let terminal_flags = flags_for(&registry, "execute");
        assert!(terminal_flags.requires_blocking);
    }

    #[test]
    fn tool_definitions_cover_every_registered_tool() {
        let registry = agentrt_tools::default_registry();
        let defs = tool_definitions(&registry);
        assert_eq!(defs.len(), registry.names().len());
        assert!(defs.iter().any(|d| d.name == "file_operations"));
    }

    #[test]
    fn is_collaboration_request_resolves_tool_name_and_alias() {
        let registry = agentrt_tools::default_registry();
        assert!(is_collaboration_request(&registry, "user_collaboration"));
        assert!(is_collaboration_request(&registry, "request_input"));
        assert!(!is_collaboration_request(&registry, "read_file"));
    }

    #[tokio::test]
    async fn serial_tools_never_overlap_within_a_batch() {
        use agentrt_tools::tool_trait::Tool;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc as StdArc;

        struct SerialProbe {
            concurrent: StdArc<AtomicUsize>,
            max_concurrent: StdArc<AtomicUsize>,
        }
        #[async_trait]
        impl Tool for SerialProbe {
            fn name(&self) -> &'static str {
                "serial_probe"
            }
            fn description(&self) -> &'static str {
                "test double"
            }
            fn operations(&self) -> &'static [&'static str] {
                &[]
            }
            fn flags(&self) -> ToolFlags {
                ToolFlags { requires_serial: true, ..ToolFlags::default() }
            }
            async fn execute(
                &self,
                _args: serde_json::Value,
                _ctx: &ToolContext,
            ) -> agentrt_domain::error::Result<agentrt_domain::tool_result::ToolResult> {
                let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(agentrt_domain::tool_result::ToolResult::ok("serial_probe", "ok", "{}".to_string()))
            }
        }

        let concurrent = StdArc::new(AtomicUsize::new(0));
        let max_concurrent = StdArc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(SerialProbe { concurrent: concurrent.clone(), max_concurrent: max_concurrent.clone() }));

        let dir = tempfile::TempDir::new().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());
        let calls: Vec<agentrt_domain::conversation::ToolCall> = (0..3)
            .map(|i| agentrt_domain::conversation::ToolCall {
                id: format!("c{i}"),
                tool_name: "serial_probe".to_string(),
                arguments: serde_json::json!({}),
            })
            .collect();

        let results = dispatch_tool_calls(&registry, &ctx, &calls).await;
        assert_eq!(results.len(), 3);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    fn test_ctx(workspace_root: std::path::PathBuf) -> ToolContext {
        use agentrt_tools::collab::CollaborationChannel;

        struct NoopChannel;
        #[async_trait::async_trait]
        impl CollaborationChannel for NoopChannel {
            async fn request_input(&self, _message: &str, _context: Option<&str>) -> agentrt_domain::error::Result<String> {
                Ok("noop".to_string())
            }
        }

        let results_dir = workspace_root.join(".agentrt").join("tool_results");
        let memory_dir = workspace_root.join(".agentrt").join("memory");
        let ltm_path = workspace_root.join(".agentrt").join("ltm.json");
        ToolContext {
            workspace_root: workspace_root.clone(),
            config: Config::default(),
            session_id: "s1".to_string(),
            git_lock: std::sync::Arc::new(agentrt_tools::git_ops::NoGitLock),
            collaboration: std::sync::Arc::new(NoopChannel),
            result_store: std::sync::Arc::new(agentrt_tools::result_store::ToolResultStore::new(results_dir, 8 * 1024, 32 * 1024)),
            kv: std::sync::Arc::new(agentrt_memory::KvStore::new(memory_dir)),
            ltm: std::sync::Arc::new(agentrt_memory::LtmStore::new(ltm_path, 100)),
            sessions_dir: workspace_root.join(".agentrt").join("sessions"),
            mcp: None,
            subagents: None,
            remote: None,
        }
    }

    #[test]
    fn record_collaboration_exchange_appends_question_and_reply() {
        let mut session = Session::new("s1", "test");
        let call = agentrt_domain::conversation::ToolCall {
            id: "c1".into(),
            tool_name: "user_collaboration".into(),
            arguments: serde_json::json!({"operation": "request_input", "message": "continue?"}),
        };
        let value = serde_json::json!({"success": true, "output": "{\"reply\":\"yes\"}"});
        record_collaboration_exchange(&mut session, &call, &value);
        assert_eq!(session.history.len(), 2);
        match &session.history[1].content {
            agentrt_domain::conversation::MessageContent::Text(text) => assert_eq!(text, "yes"),
            other => panic!("expected text content, got {other:?}"),
        }
    }
}
