//! Capability metadata a provider adapter advertises about itself, used by
//! the router to pick a provider/model that can actually serve a request
//! (tool calling, JSON mode, streaming) before sending it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSupport {
    /// No function-calling support at all.
    None,
    /// Supports function calling but arguments may not always be strict JSON.
    Loose,
    /// Function calling with a JSON-Schema-constrained arguments payload.
    StrictJson,
}

/// The role a model is assigned to play for a given request, matching the
/// orchestrator's split between driving the turn loop, running the heavier
/// planning pass, summarizing context, and embedding for recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Planner,
    Executor,
    Summarizer,
    Embedder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_tools: ToolSupport,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    pub supports_vision: bool,
    pub context_window_tokens: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: ToolSupport::None,
            supports_streaming: false,
            supports_json_mode: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        }
    }
}
