//! Runtime configuration shared by every crate. Loading from file/env/CLI
//! flags is someone else's job; this crate only owns the shape, defaults,
//! and validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_iterations() -> u32 {
    25
}

fn default_inline_threshold_bytes() -> usize {
    8 * 1024
}

fn default_max_chunk_bytes() -> usize {
    32 * 1024
}

fn default_result_max_age_hours() -> i64 {
    24
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    20_000
}

fn default_inbox_poll_interval_ms() -> u64 {
    1_000
}

fn default_interrupt_poll_interval_ms() -> u64 {
    100
}

fn default_collaboration_timeout_secs() -> u64 {
    300
}

fn default_shared_list_capacity() -> usize {
    200
}

fn default_ltm_max_per_kind() -> usize {
    100
}

fn default_app_dir_name() -> String {
    ".agentrt".to_string()
}

/// MCP (Model Context Protocol) server connections the tool executor bridges
/// `mcp_`-prefixed tool calls into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub transport: McpTransportKind,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

fn default_ssh_connect_timeout_secs() -> u64 {
    10
}

fn default_min_free_tmp_mb() -> u64 {
    50
}

fn default_staging_dir_name() -> String {
    ".agentrt-remote-staging".to_string()
}

fn default_per_device_timeout_secs() -> u64 {
    120
}

/// A minimal, statically-configured device registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Device name → SSH target (`user@host`, or a bare host relying on
    /// `~/.ssh/config` for the user).
    #[serde(default)]
    pub devices: std::collections::HashMap<String, String>,

    /// Group name → member device names, for `execute_parallel`'s `all`
    /// and named-group target resolution.
    #[serde(default)]
    pub groups: std::collections::HashMap<String, Vec<String>>,

    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub ssh_connect_timeout_secs: u64,

    #[serde(default = "default_min_free_tmp_mb")]
    pub min_free_tmp_mb: u64,

    #[serde(default = "default_staging_dir_name")]
    pub staging_dir_name: String,

    /// Deadline for a single device's remote run in `execute_parallel`
    /// (staging through output retrieval); a device that misses it reports
    /// its own timeout without failing the rest of the batch.
    #[serde(default = "default_per_device_timeout_secs")]
    pub per_device_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            devices: std::collections::HashMap::new(),
            groups: std::collections::HashMap::new(),
            ssh_connect_timeout_secs: default_ssh_connect_timeout_secs(),
            min_free_tmp_mb: default_min_free_tmp_mb(),
            staging_dir_name: default_staging_dir_name(),
            per_device_timeout_secs: default_per_device_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Block remote-execution operations and any path argument that
    /// resolves outside the session's working directory.
    #[serde(default)]
    pub sandbox: bool,

    /// Force passthrough (pseudo-TTY) mode for every `execute` call,
    /// overriding auto-detection.
    #[serde(default)]
    pub terminal_passthrough: bool,

    /// Enable the interactive-command heuristic that auto-selects
    /// passthrough mode when neither a per-call flag nor
    /// `terminal_passthrough` decided it.
    #[serde(default = "default_true")]
    pub terminal_autodetect: bool,

    /// Provider credential, read from environment by the caller and
    /// staged here; never logged, never placed on a command line.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Path to a file holding the provider token, as an alternative to
    /// `api_key` for environments that prefer file-based secrets.
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default)]
    pub directories: Directories,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub broker: BrokerTuning,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    /// Provider/role routing table consumed by `agentrt-providers`' router.
    /// Kept as its own sub-table (mirroring the rest of this struct) rather
    /// than a separately-loaded file, so one TOML document configures both
    /// the agent runtime and which models back each role.
    #[serde(default)]
    pub llm: crate::provider_config::LlmConfig,
}

fn default_true() -> bool {
    true
}

/// Project-local paths, all rooted under `directories.app_dir` unless
/// overridden individually (environment-variable opt-in overrides apply
/// at the loading layer, not here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directories {
    #[serde(default = "default_app_dir_name")]
    pub app_dir_name: String,
    #[serde(default)]
    pub sessions_subdir: String,
    #[serde(default)]
    pub memory_subdir: String,
    #[serde(default)]
    pub tool_results_subdir: String,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            app_dir_name: default_app_dir_name(),
            sessions_subdir: "sessions".to_string(),
            memory_subdir: "memory".to_string(),
            tool_results_subdir: "tool_results".to_string(),
        }
    }
}

impl Directories {
    pub fn app_dir(&self, project_root: &std::path::Path) -> PathBuf {
        project_root.join(&self.app_dir_name)
    }

    pub fn sessions_dir(&self, project_root: &std::path::Path) -> PathBuf {
        self.app_dir(project_root).join(&self.sessions_subdir)
    }

    pub fn memory_dir(&self, project_root: &std::path::Path) -> PathBuf {
        self.app_dir(project_root).join(&self.memory_subdir)
    }

    pub fn tool_results_dir(&self, project_root: &std::path::Path) -> PathBuf {
        self.app_dir(project_root).join(&self.tool_results_subdir)
    }

    pub fn ltm_path(&self, project_root: &std::path::Path) -> PathBuf {
        self.app_dir(project_root).join("ltm.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_inline_threshold_bytes")]
    pub inline_threshold_bytes: usize,
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    #[serde(default = "default_result_max_age_hours")]
    pub result_max_age_hours: i64,
    #[serde(default = "default_ltm_max_per_kind")]
    pub ltm_max_per_kind: usize,
    #[serde(default = "default_shared_list_capacity")]
    pub shared_knowledge_capacity: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: default_inline_threshold_bytes(),
            max_chunk_bytes: default_max_chunk_bytes(),
            result_max_age_hours: default_result_max_age_hours(),
            ltm_max_per_kind: default_ltm_max_per_kind(),
            shared_knowledge_capacity: default_shared_list_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_collaboration_timeout_secs")]
    pub collaboration_secs: u64,
    #[serde(default = "default_interrupt_poll_interval_ms")]
    pub interrupt_poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            collaboration_secs: default_collaboration_timeout_secs(),
            interrupt_poll_interval_ms: default_interrupt_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerTuning {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_inbox_poll_interval_ms")]
    pub inbox_poll_interval_ms: u64,
}

impl Default for BrokerTuning {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            inbox_poll_interval_ms: default_inbox_poll_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox: false,
            terminal_passthrough: false,
            terminal_autodetect: true,
            api_key: None,
            api_key_file: None,
            model: default_model(),
            max_iterations: default_max_iterations(),
            directories: Directories::default(),
            thresholds: Thresholds::default(),
            timeouts: Timeouts::default(),
            broker: BrokerTuning::default(),
            mcp: McpConfig::default(),
            remote: RemoteConfig::default(),
            llm: crate::provider_config::LlmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "[ERROR]",
            ConfigSeverity::Warning => "[WARN]",
        };
        write!(f, "{tag} {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Check internal consistency; returns every problem found rather than
    /// failing on the first one so a caller can report them all at once.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.model.trim().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "model".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.max_iterations == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "max_iterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.thresholds.max_chunk_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "thresholds.max_chunk_bytes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.thresholds.inline_threshold_bytes > self.thresholds.max_chunk_bytes {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "thresholds.inline_threshold_bytes".to_string(),
                message: "larger than max_chunk_bytes; oversized outputs will still page in chunks smaller than the inline threshold".to_string(),
            });
        }

        if self.api_key.is_none() && self.api_key_file.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "api_key".to_string(),
                message: "no credential configured; provider calls will fail auth".to_string(),
            });
        }

        if self.terminal_passthrough && !self.terminal_autodetect {
            // Explicit passthrough always wins regardless of autodetect; not a
            // problem, just noting the combination is intentional-looking.
        }

        errors
    }

    pub fn has_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_only_warnings() {
        let cfg = Config::default();
        let errors = cfg.validate();
        assert!(!Config::has_errors(&errors));
    }

    #[test]
    fn empty_model_is_an_error() {
        let mut cfg = Config::default();
        cfg.model = String::new();
        let errors = cfg.validate();
        assert!(Config::has_errors(&errors));
    }

    #[test]
    fn zero_max_iterations_is_an_error() {
        let mut cfg = Config::default();
        cfg.max_iterations = 0;
        assert!(Config::has_errors(&cfg.validate()));
    }

    #[test]
    fn inline_threshold_above_chunk_cap_is_a_warning_not_an_error() {
        let mut cfg = Config::default();
        cfg.thresholds.inline_threshold_bytes = cfg.thresholds.max_chunk_bytes + 1;
        let errors = cfg.validate();
        assert!(!Config::has_errors(&errors));
        assert!(errors
            .iter()
            .any(|e| e.field == "thresholds.inline_threshold_bytes"));
    }

    #[test]
    fn directories_compose_under_app_dir() {
        let dirs = Directories::default();
        let root = std::path::Path::new("/tmp/project");
        assert_eq!(dirs.sessions_dir(root), PathBuf::from("/tmp/project/.agentrt/sessions"));
        assert_eq!(dirs.ltm_path(root), PathBuf::from("/tmp/project/.agentrt/ltm.json"));
    }
}
