//! The argv contract between a [`crate::manager::SubAgentManager`] and the
//! child process it spawns. Kept as plain strings rather than
//! shelling out to the CLI's own `clap` parser so this crate never depends
//! on the `cli` binary crate; the binary's argument definitions must accept
//! exactly these flags under `--subagent`.

use std::path::{Path, PathBuf};

/// Everything the child needs to become a broker-aware sub-agent on startup:
/// its own id, where the broker socket lives, the project it operates on,
/// its initial task, an optional model override, and whether it should enter
/// the persistent [Agent Loop](crate::agent_loop) instead of exiting after
/// one turn.
#[derive(Debug, Clone)]
pub struct ChildInvocation {
    pub agent_id: String,
    pub broker_socket: PathBuf,
    pub project_root: PathBuf,
    pub task: String,
    pub model: Option<String>,
    pub persistent: bool,
}

pub const FLAG_SUBAGENT: &str = "--subagent";
pub const FLAG_AGENT_ID: &str = "--agent-id";
pub const FLAG_BROKER_SOCKET: &str = "--broker-socket";
pub const FLAG_PROJECT_ROOT: &str = "--project-root";
pub const FLAG_TASK: &str = "--task";
pub const FLAG_MODEL: &str = "--model";
pub const FLAG_PERSISTENT: &str = "--persistent";

impl ChildInvocation {
    /// Render as `argv[1..]` for `Command::args`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            FLAG_SUBAGENT.to_string(),
            FLAG_AGENT_ID.to_string(),
            self.agent_id.clone(),
            FLAG_BROKER_SOCKET.to_string(),
            self.broker_socket.display().to_string(),
            FLAG_PROJECT_ROOT.to_string(),
            self.project_root.display().to_string(),
            FLAG_TASK.to_string(),
            self.task.clone(),
        ];
        if let Some(model) = &self.model {
            args.push(FLAG_MODEL.to_string());
            args.push(model.clone());
        }
        if self.persistent {
            args.push(FLAG_PERSISTENT.to_string());
        }
        args
    }
}

/// Per-agent log file path, keyed by agent id.
pub fn log_path(log_dir: &Path, agent_id: &str) -> PathBuf {
    log_dir.join(format!("{agent_id}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_args_includes_optional_flags_only_when_set() {
        let inv = ChildInvocation {
            agent_id: "a1".into(),
            broker_socket: PathBuf::from("/tmp/b.sock"),
            project_root: PathBuf::from("/proj"),
            task: "do the thing".into(),
            model: None,
            persistent: false,
        };
        let args = inv.to_args();
        assert!(!args.contains(&FLAG_MODEL.to_string()));
        assert!(!args.contains(&FLAG_PERSISTENT.to_string()));

        let inv2 = ChildInvocation { model: Some("gpt-4o-mini".into()), persistent: true, ..inv };
        let args2 = inv2.to_args();
        assert!(args2.contains(&FLAG_MODEL.to_string()));
        assert!(args2.contains(&FLAG_PERSISTENT.to_string()));
    }
}
