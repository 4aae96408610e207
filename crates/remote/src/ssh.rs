//! SSH reachability and capability probing.

use agentrt_domain::error::{Error, Result};
use tokio::process::Command;

/// Causes `execute_remote` step 2 classifies a failed connectivity test
/// into, so the tool can return targeted guidance instead of a raw SSH
/// error string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshFailureReason {
    NoAgentOrKey,
    PermissionDenied,
    ConnectionRefused,
    TimeoutOrDns,
    Unknown(String),
}

impl SshFailureReason {
    pub fn guidance(&self) -> String {
        match self {
            SshFailureReason::NoAgentOrKey => {
                "no SSH agent is running or no usable key is loaded; run `ssh-add` or set up an identity file".to_string()
            }
            SshFailureReason::PermissionDenied => {
                "the remote host rejected the key; confirm the public key is in the target's authorized_keys".to_string()
            }
            SshFailureReason::ConnectionRefused => "connection refused; confirm sshd is running on the target host".to_string(),
            SshFailureReason::TimeoutOrDns => "connection timed out or the host could not be resolved; check the address and network path".to_string(),
            SshFailureReason::Unknown(detail) => format!("ssh failed: {detail}"),
        }
    }
}

fn classify(stderr: &str) -> SshFailureReason {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") {
        SshFailureReason::PermissionDenied
    } else if lower.contains("could not resolve hostname") || lower.contains("name or service not known") || lower.contains("timed out") {
        SshFailureReason::TimeoutOrDns
    } else if lower.contains("connection refused") {
        SshFailureReason::ConnectionRefused
    } else if lower.contains("no identities") || lower.contains("identity file") && lower.contains("not accessible") {
        SshFailureReason::NoAgentOrKey
    } else {
        SshFailureReason::Unknown(stderr.trim().to_string())
    }
}

/// Batch-mode `ssh host exit`: succeeds only if a passwordless connection
/// is possible (no password prompt, since batch mode refuses to prompt).
pub async fn validate_ssh(ssh_target: &str, connect_timeout_secs: u64) -> Result<()> {
    let output = Command::new("ssh")
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg(format!("ConnectTimeout={connect_timeout_secs}"))
        .arg(ssh_target)
        .arg("exit")
        .output()
        .await
        .map_err(|e| Error::Other(format!("failed to invoke ssh: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let reason = classify(&String::from_utf8_lossy(&output.stderr));
        Err(Error::InvalidInput(reason.guidance()))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RemoteCheck {
    pub reachable: bool,
    pub interpreter_present: bool,
    pub transfer_tool: Option<String>,
    pub free_tmp_mb: Option<u64>,
    pub meets_min_free: bool,
}

/// `check_remote`: reachability, a POSIX shell, a
/// `curl` or `wget`, and free space in `/tmp`, all in one SSH round trip.
pub async fn check_remote(ssh_target: &str, connect_timeout_secs: u64, min_free_tmp_mb: u64) -> Result<RemoteCheck> {
    let probe = r#"
        echo __SH_OK__
        if command -v curl >/dev/null 2>&1; then echo __TOOL__curl; elif command -v wget >/dev/null 2>&1; then echo __TOOL__wget; fi
        df -Pm /tmp 2>/dev/null | tail -n 1
    "#;
    let output = Command::new("ssh")
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg(format!("ConnectTimeout={connect_timeout_secs}"))
        .arg(ssh_target)
        .arg(probe)
        .output()
        .await
        .map_err(|e| Error::Other(format!("failed to invoke ssh: {e}")))?;

    if !output.status.success() {
        return Ok(RemoteCheck { reachable: false, interpreter_present: false, transfer_tool: None, free_tmp_mb: None, meets_min_free: false });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let interpreter_present = stdout.contains("__SH_OK__");
    let transfer_tool = if stdout.contains("__TOOL__curl") {
        Some("curl".to_string())
    } else if stdout.contains("__TOOL__wget") {
        Some("wget".to_string())
    } else {
        None
    };
    let free_tmp_mb = stdout
        .lines()
        .find(|l| !l.starts_with("__") && l.split_whitespace().count() >= 4)
        .and_then(|l| l.split_whitespace().nth(3))
        .and_then(|n| n.parse::<u64>().ok());
    let meets_min_free = free_tmp_mb.map(|mb| mb >= min_free_tmp_mb).unwrap_or(false);

    Ok(RemoteCheck { reachable: true, interpreter_present, transfer_tool, free_tmp_mb, meets_min_free })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_permission_denied() {
        assert_eq!(classify("Permission denied (publickey)."), SshFailureReason::PermissionDenied);
    }

    #[test]
    fn classify_dns_failure() {
        assert_eq!(classify("ssh: Could not resolve hostname foo: Name or service not known"), SshFailureReason::TimeoutOrDns);
    }

    #[test]
    fn classify_connection_refused() {
        assert_eq!(classify("ssh: connect to host x port 22: Connection refused"), SshFailureReason::ConnectionRefused);
    }
}
