//! Terminal operations tool: run a shell command in capture or passthrough
//! mode, plus a standalone dangerous-command `validate` check.

use std::sync::Arc;

use agentrt_domain::config::Config;
use agentrt_domain::error::{Error, Result};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TerminalOperation {
    Execute {
        command: String,
        #[serde(default)]
        timeout: Option<u64>,
        #[serde(default)]
        working_directory: Option<String>,
        #[serde(default)]
        passthrough: Option<bool>,
    },
    Validate { command: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteOutput {
    pub output: String,
    pub exit_code: Option<i32>,
    pub mode: &'static str,
}

fn default_timeout_secs() -> u64 {
    120
}

/// Regex patterns for commands that need a real TTY to behave correctly:
/// editors, pagers, interactive shells/REPLs, SSH with an interactive
/// prompt. Used by auto-detection when no explicit mode is requested.
fn interactive_command_patterns() -> &'static [&'static str] {
    &[
        r"^\s*(vi|vim|nvim|nano|emacs)\b",
        r"^\s*(less|more)\b",
        r"^\s*(bash|zsh|sh|fish)\s*$",
        r"^\s*(python3?|irb|node|psql|mysql|sqlite3)\s*$",
        r"^\s*ssh\b",
        r"^\s*(top|htop|man)\b",
    ]
}

/// Dangerous-command blacklist, checked independent of execution.
fn dangerous_patterns() -> &'static [&'static str] {
    &[
        r"\brm\s+-[a-zA-Z]*r[a-zA-Z]*f\b",
        r"\brm\s+-[a-zA-Z]*f[a-zA-Z]*r\b",
        r"\bmkfs(\.\w+)?\b",
        r"\bdd\s+if=",
        r"\bshutdown\b",
        r"\breboot\b",
        r":\(\)\s*\{\s*:\|:&\s*\};:",
        r"\bchmod\s+-R\s+777\s+/",
        r">\s*/dev/sd[a-z]",
    ]
}

/// Flags on otherwise-safe commands that imply interactive editing and
/// cannot run headlessly.
fn interactive_editing_flags() -> &'static [&'static str] {
    &["rebase -i", "rebase --interactive", "add -p", "add --patch", "commit --patch", "mergetool"]
}

/// Dangerous-command and interactive-editing check. For `git ...`
/// commands, only the subcommand (not the message body) is evaluated, so
/// a commit message containing `rm -rf` does not trigger a false positive.
pub fn validate_command(command: &str) -> std::result::Result<(), String> {
    let evaluated = if let Some(rest) = command.trim_start().strip_prefix("git ") {
        rest
    } else {
        command
    };

    for pattern in dangerous_patterns() {
        let re = Regex::new(pattern).expect("built-in pattern is valid");
        if re.is_match(evaluated) {
            return Err(format!("command blocked by dangerous-command policy (matched `{pattern}`)"));
        }
    }
    for flag in interactive_editing_flags() {
        if evaluated.contains(flag) {
            return Err(format!("command requires interactive editing (`{flag}`), which is not supported headlessly"));
        }
    }
    Ok(())
}

fn should_use_passthrough(per_call: Option<bool>, config: &Config, command: &str) -> bool {
    if let Some(explicit) = per_call {
        return explicit;
    }
    if config.terminal_passthrough {
        return true;
    }
    if config.terminal_autodetect {
        return interactive_command_patterns()
            .iter()
            .any(|p| Regex::new(p).expect("built-in pattern is valid").is_match(command));
    }
    false
}

/// Strip ANSI/terminal escape sequences from captured bytes.
fn strip_ansi(input: &str) -> String {
    // CSI sequences (ESC '[' ... final byte) plus lone ESC.
    let re = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[@-_]").expect("built-in pattern is valid");
    re.replace_all(input, "").into_owned()
}

pub async fn handle(op: TerminalOperation, config: &Config) -> Result<Value> {
    match op {
        TerminalOperation::Validate { command } => match validate_command(&command) {
            Ok(()) => Ok(serde_json::json!({ "command": command, "allowed": true })),
            Err(reason) => Ok(serde_json::json!({ "command": command, "allowed": false, "reason": reason })),
        },
        TerminalOperation::Execute { command, timeout, working_directory, passthrough } => {
            if let Err(reason) = validate_command(&command) {
                return Err(Error::InvalidInput(reason));
            }
            let use_passthrough = should_use_passthrough(passthrough, config, &command);
            let timeout_secs = timeout.unwrap_or_else(default_timeout_secs);
            let result = execute(&command, working_directory.as_deref(), timeout_secs, use_passthrough).await?;
            Ok(serde_json::to_value(result).expect("ExecuteOutput is always serializable"))
        }
    }
}

async fn execute(
    command: &str,
    working_directory: Option<&str>,
    timeout_secs: u64,
    passthrough: bool,
) -> Result<ExecuteOutput> {
    if passthrough {
        execute_passthrough(command, working_directory, timeout_secs).await
    } else {
        execute_capture(command, working_directory, timeout_secs).await
    }
}

/// Foreground, stdout+stderr captured, no TTY.
async fn execute_capture(command: &str, working_directory: Option<&str>, timeout_secs: u64) -> Result<ExecuteOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    if let Some(wd) = working_directory {
        cmd.current_dir(wd);
    }

    let mut child = cmd.spawn().map_err(|e| Error::InvalidInput(format!("failed to spawn command: {e}")))?;

    let combined = Arc::new(Mutex::new(String::new()));
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_buf = combined.clone();
    let stdout_task = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let mut buf = out_buf.lock();
                buf.push_str(&line);
                buf.push('\n');
            }
        }
    });
    let err_buf = combined.clone();
    let stderr_task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let mut buf = err_buf.lock();
                buf.push_str(&line);
                buf.push('\n');
            }
        }
    });

    let wait_result = tokio::select! {
        result = child.wait() => Some(result),
        _ = tokio::time::sleep(std::time::Duration::from_secs(timeout_secs)) => {
            let _ = child.kill().await;
            None
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let output = strip_ansi(&combined.lock());

    match wait_result {
        None => Err(Error::Timeout(format!("command exceeded {timeout_secs}s: {command}"))),
        Some(Ok(status)) => Ok(ExecuteOutput { output, exit_code: status.code(), mode: "capture" }),
        Some(Err(e)) => Err(Error::InvalidInput(format!("failed waiting on command: {e}"))),
    }
}

/// Passthrough mode: allocate a pseudo-terminal so interactive programs see
/// a real TTY, while still teeing the bytes so the model gets output.
async fn execute_passthrough(command: &str, working_directory: Option<&str>, timeout_secs: u64) -> Result<ExecuteOutput> {
    use portable_pty::{native_pty_system, CommandBuilder, PtySize};

    let command = command.to_string();
    let working_directory = working_directory.map(|s| s.to_string());

    let captured = tokio::task::spawn_blocking(move || -> std::result::Result<(String, Option<i32>), String> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| e.to_string())?;

        let mut builder = CommandBuilder::new("sh");
        builder.arg("-c");
        builder.arg(&command);
        if let Some(wd) = &working_directory {
            builder.cwd(wd);
        }

        let mut child = pair.slave.spawn_command(builder).map_err(|e| e.to_string())?;
        drop(pair.slave);

        let mut reader = pair.master.try_clone_reader().map_err(|e| e.to_string())?;
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut buf).ok();

        let status = child.wait().map_err(|e| e.to_string())?;
        Ok((String::from_utf8_lossy(&buf).into_owned(), status.exit_code().into()))
    });

    match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), captured).await {
        Ok(Ok(Ok((raw, exit_code)))) => Ok(ExecuteOutput { output: strip_ansi(&raw), exit_code, mode: "passthrough" }),
        Ok(Ok(Err(e))) => Err(Error::InvalidInput(format!("passthrough execution failed: {e}"))),
        Ok(Err(e)) => Err(Error::InvalidInput(format!("passthrough task panicked: {e}"))),
        Err(_) => Err(Error::Timeout(format!("passthrough command exceeded {timeout_secs}s"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_command_blocks_rm_rf() {
        assert!(validate_command("rm -rf /").is_err());
    }

    #[test]
    fn validate_command_allows_plain_rm() {
        assert!(validate_command("rm file.txt").is_ok());
    }

    #[test]
    fn validate_command_blocks_dd() {
        assert!(validate_command("dd if=/dev/zero of=/dev/sda").is_err());
    }

    #[test]
    fn validate_command_evaluates_git_subcommand_only() {
        // A commit message containing "rm -rf" must not trigger the blacklist.
        assert!(validate_command("git commit -m 'rm -rf the old cache dir'").is_ok());
    }

    #[test]
    fn validate_command_blocks_interactive_rebase() {
        assert!(validate_command("git rebase -i HEAD~3").is_err());
    }

    #[tokio::test]
    async fn execute_capture_runs_command_and_returns_output() {
        let cfg = Config::default();
        let op = TerminalOperation::Execute {
            command: "echo hello".to_string(),
            timeout: Some(5),
            working_directory: None,
            passthrough: Some(false),
        };
        let result = handle(op, &cfg).await.unwrap();
        assert_eq!(result["exit_code"].as_i64(), Some(0));
        assert!(result["output"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn execute_rejects_dangerous_command_before_running() {
        let cfg = Config::default();
        let op = TerminalOperation::Execute {
            command: "rm -rf /tmp/nonexistent-marker-dir-xyz".to_string(),
            timeout: Some(5),
            working_directory: None,
            passthrough: Some(false),
        };
        assert!(handle(op, &cfg).await.is_err());
    }
}
