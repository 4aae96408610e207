//! LLM provider configuration: the shape of the `[[llm.providers]]` table
//! and the role-assignment/fallback config the router consumes, generalized
//! from a single `model`/`api_key` pair to multiple named providers with
//! per-role routing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    Google,
    OpenaiCompat,
    OpenaiCodexOauth,
    AzureOpenai,
    AwsBedrock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Plain,
    Env,
    Keychain,
    Oauth,
}

/// How to resolve a provider's credential. Exactly one of `key`/`env`/
/// `service`+`account` is expected to be set; `resolve_api_key` in
/// `agentrt-providers` applies the precedence order documented there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    /// Env var names of multiple keys to round-robin across, for providers
    /// with a per-key rate limit. Empty means single-key resolution via
    /// `key`/`env`/`service`+`account`.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Override the HTTP header carrying the credential (default depends on
    /// provider kind: `Authorization` for OpenAI-compatible, `api-key` for
    /// Azure OpenAI).
    #[serde(default)]
    pub header: Option<String>,
    /// Override the value prefix before the key (default `"Bearer "` for
    /// OpenAI-compatible, empty for Azure).
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// `"provider_id/model_name"`.
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
    #[serde(default)]
    pub require_streaming: bool,
    #[serde(default)]
    pub fallbacks: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// Boot even if every provider fails to initialize (auth can be fixed later).
    #[default]
    AllowNone,
    /// Abort startup unless at least one provider initializes.
    RequireOne,
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Back-compat escape hatch: treat as `RequireOne` even if
    /// `startup_policy` wasn't set explicitly.
    #[serde(default)]
    pub require_provider: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            roles: HashMap::new(),
            default_timeout_ms: default_timeout_ms(),
            startup_policy: LlmStartupPolicy::default(),
            require_provider: false,
        }
    }
}
