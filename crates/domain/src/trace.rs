use serde::Serialize;

/// Structured trace events emitted across the agent runtime.
///
/// Every event is logged as a single `tracing::info!` line with the
/// serialized event as a field, so a log aggregator can filter/group on
/// `event` without parsing free text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        session_id: String,
        iteration: u32,
    },
    LlmRequest {
        #[serde(default)]
        provider: String,
        model: String,
        #[serde(default)]
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    LlmRetry {
        attempt: u32,
        reason: String,
        wait_ms: u64,
    },
    ToolDispatched {
        tool_call_id: String,
        tool_name: String,
        operation: Option<String>,
    },
    ToolCompleted {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        output_bytes: usize,
    },
    ToolResultStored {
        tool_call_id: String,
        total_length: usize,
    },
    InterruptInjected {
        session_id: String,
    },
    TurnFinished {
        session_id: String,
        iterations: u32,
        truncated: bool,
    },
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_id: String,
        reason: String,
    },
    BrokerLockGranted {
        resource: String,
        holder: String,
    },
    BrokerLockDenied {
        resource: String,
        requester: String,
    },
    BrokerUnavailable {
        reason: String,
    },
    SubAgentSpawned {
        agent_id: String,
        mode: String,
    },
    SubAgentExited {
        agent_id: String,
        reason: String,
    },
    RemoteExecStarted {
        device: String,
        task_preview: String,
    },
    RemoteExecFinished {
        device: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "agent_event");
    }
}
