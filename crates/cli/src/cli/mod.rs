//! Command-line surface: argument definitions and the config-loading
//! helper shared by every subcommand.

pub mod config;
pub mod doctor;
pub mod repl;
pub mod run;
pub mod subagent;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentrt — a terminal coding agent runtime.
///
/// The sub-agent child-mode flags below are not meant to be typed by a
/// human; they are the fixed argv contract `agentrt_subagent::child`
/// renders when the sub-agent manager spawns a child (see that module's
/// doc comment). They live on the top-level struct rather than inside
/// `Command` because they're parsed alongside (and take priority over)
/// whatever subcommand happens to also be present.
#[derive(Debug, Parser)]
#[command(name = "agentrt", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Internal: marks this process as a spawned sub-agent rather than a
    /// top-level session. Set only by `agentrt_subagent::child`.
    #[arg(long, hide = true)]
    pub subagent: bool,
    #[arg(long = "agent-id", hide = true)]
    pub agent_id: Option<String>,
    #[arg(long = "broker-socket", hide = true)]
    pub broker_socket: Option<PathBuf>,
    #[arg(long = "project-root", hide = true)]
    pub project_root: Option<PathBuf>,
    #[arg(long, hide = true)]
    pub task: Option<String>,
    #[arg(long, hide = true)]
    pub model: Option<String>,
    #[arg(long, hide = true)]
    pub persistent: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start an interactive session in the current directory (default).
    Chat,
    /// Send a single message to the agent and print the response.
    Run {
        /// The message to send.
        message: String,
        /// Session id (defaults to "cli:run").
        #[arg(long, default_value = "cli:run")]
        session: String,
        /// Model override (e.g. "anthropic/claude-3-7-sonnet").
        #[arg(long)]
        model: Option<String>,
        /// Output the full response as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load configuration from the path named by `AGENTRT_CONFIG` (default
/// `agentrt.toml`), or `Config::default()` if that file doesn't exist.
pub fn load_config() -> anyhow::Result<(agentrt_domain::config::Config, String)> {
    let config_path = std::env::var("AGENTRT_CONFIG").unwrap_or_else(|_| "agentrt.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        agentrt_domain::config::Config::default()
    };

    Ok((config, config_path))
}
