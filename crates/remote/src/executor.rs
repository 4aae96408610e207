//! `execute_remote` / `execute_parallel`: the end-to-end
//! algorithm that strings together device resolution, SSH validation,
//! staging, non-interactive execution, retrieval, and cleanup.

use std::path::{Path, PathBuf};
use std::time::Instant;

use agentrt_domain::config::RemoteConfig;
use agentrt_domain::error::Result;
use agentrt_domain::trace::TraceEvent;
use serde::Serialize;
use tokio::process::Command;

use crate::device::{resolve_many, resolve_one};
use crate::ssh::{check_remote, validate_ssh};
use crate::staging::{cleanup_remote, materialize_config, prepare_remote, retrieve_files};

#[derive(Debug, Clone, Serialize)]
pub struct RemoteExecutionResult {
    pub device: String,
    pub output: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub retrieved_files: Vec<PathBuf>,
}

pub struct ExecuteRemoteRequest<'a> {
    pub target: &'a str,
    pub task: &'a str,
    pub model: &'a str,
    pub api_key: &'a str,
    pub local_root: &'a Path,
    pub entry_point_relpath: &'a str,
    pub retrieve_relpaths: &'a [String],
    pub cleanup: bool,
}

/// Resolve the device, probe reachability, stage input files, run the
/// command, retrieve output files, and clean up the staging directory.
/// `requires_blocking=true` on the tool's contract is enforced by the
/// caller (the executor/registry), not here.
pub async fn execute_remote(remote: &RemoteConfig, req: ExecuteRemoteRequest<'_>) -> Result<RemoteExecutionResult> {
    let started = Instant::now();
    let device = resolve_one(remote, req.target);
    TraceEvent::RemoteExecStarted { device: device.name.clone(), task_preview: preview(req.task) }.emit();

    validate_ssh(&device.ssh_target, remote.ssh_connect_timeout_secs).await?;

    let check = check_remote(&device.ssh_target, remote.ssh_connect_timeout_secs, remote.min_free_tmp_mb).await?;
    if !check.reachable {
        return Err(agentrt_domain::error::Error::Timeout(format!("remote check failed for '{}'", device.name)));
    }
    if !check.interpreter_present {
        return Err(agentrt_domain::error::Error::InvalidInput(format!("no POSIX shell available on '{}'", device.name)));
    }
    if check.transfer_tool.is_none() {
        return Err(agentrt_domain::error::Error::InvalidInput(format!("neither curl nor wget is available on '{}'", device.name)));
    }
    if !check.meets_min_free {
        return Err(agentrt_domain::error::Error::InvalidInput(format!(
            "'{}' has less than {} MB free in /tmp",
            device.name, remote.min_free_tmp_mb
        )));
    }

    let staging_dir = format!("/tmp/{}-{}", remote.staging_dir_name.trim_start_matches('.'), uuid::Uuid::new_v4());
    prepare_remote(&device.ssh_target, req.local_root, &staging_dir, req.entry_point_relpath).await?;
    materialize_config(&device.ssh_target, &staging_dir, req.model, req.api_key).await?;

    let remote_cmd = format!(
        "cd {staging_dir} && ./{entry} --config config.json --input {task} --exit",
        entry = req.entry_point_relpath,
        task = shell_quote(req.task),
    );
    let output = Command::new("ssh")
        .arg(&device.ssh_target)
        .arg(&remote_cmd)
        .output()
        .await
        .map_err(|e| agentrt_domain::error::Error::Other(format!("failed to invoke ssh for remote execution: {e}")))?;

    let retrieved_files = if req.retrieve_relpaths.is_empty() {
        Vec::new()
    } else {
        retrieve_files(&device.ssh_target, &staging_dir, req.retrieve_relpaths).await.unwrap_or_default()
    };

    if req.cleanup {
        if let Err(e) = cleanup_remote(&device.ssh_target, &staging_dir).await {
            tracing::warn!(device = %device.name, error = %e, "remote staging cleanup failed");
        }
    }

    let execution_time_ms = started.elapsed().as_millis() as u64;
    TraceEvent::RemoteExecFinished { device: device.name.clone(), exit_code: output.status.code(), duration_ms: execution_time_ms }.emit();

    Ok(RemoteExecutionResult {
        device: device.name,
        output: String::from_utf8_lossy(&output.stdout).to_string(),
        exit_code: output.status.code(),
        execution_time_ms,
        retrieved_files,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PerDeviceResult {
    pub device: String,
    pub ok: bool,
    pub result: Option<RemoteExecutionResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParallelExecutionReport {
    pub results: Vec<PerDeviceResult>,
    pub success_count: usize,
}

/// Resolves `targets` (array, group name, or `all`) and runs
/// `execute_remote` against each device concurrently, aggregating results
/// in the same order the devices were resolved in regardless of which
/// finished first.
pub async fn execute_parallel(
    remote: &RemoteConfig,
    targets: &[String],
    task: &str,
    model: &str,
    api_key: &str,
    local_root: &Path,
    entry_point_relpath: &str,
) -> Result<ParallelExecutionReport> {
    let devices = resolve_many(remote, targets)?;
    let futures = devices.iter().map(|d| {
        let req = ExecuteRemoteRequest {
            target: &d.name,
            task,
            model,
            api_key,
            local_root,
            entry_point_relpath,
            retrieve_relpaths: &[],
            cleanup: true,
        };
        let device_name = d.name.clone();
        let deadline = std::time::Duration::from_secs(remote.per_device_timeout_secs);
        async move {
            match tokio::time::timeout(deadline, execute_remote(remote, req)).await {
                Ok(Ok(result)) => PerDeviceResult { device: device_name, ok: true, result: Some(result), error: None },
                Ok(Err(e)) => PerDeviceResult { device: device_name, ok: false, result: None, error: Some(e.to_string()) },
                Err(_) => PerDeviceResult { device: device_name, ok: false, result: None, error: Some("timeout".to_string()) },
            }
        }
    });

    let results: Vec<PerDeviceResult> = futures_util::future::join_all(futures).await;
    let success_count = results.iter().filter(|r| r.ok).count();

    Ok(ParallelExecutionReport { results, success_count })
}

fn preview(task: &str) -> String {
    const MAX: usize = 80;
    if task.len() <= MAX {
        task.to_string()
    } else {
        format!("{}…", &task[..MAX])
    }
}

/// Single-quote for a POSIX shell, escaping embedded single quotes.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's a test"), "'it'\\''s a test'");
    }

    #[test]
    fn preview_truncates_long_tasks() {
        let long = "x".repeat(200);
        let p = preview(&long);
        assert!(p.ends_with('…'));
        assert!(p.len() < long.len());
    }
}
