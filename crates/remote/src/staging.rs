//! Staging directory lifecycle on the remote host:
//! replicate the binary tree via `rsync`, materialize a minimal config with
//! the API key kept out of any command line, retrieve output files back,
//! and clean up.

use std::path::{Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use serde::Serialize;
use tokio::process::Command;

/// Directories rsync never needs to replicate to run the binary remotely.
const RSYNC_EXCLUDES: &[&str] = &[".git/", "target/", "node_modules/", ".agentrt/", "*.log"];

async fn run_rsync(args: &[&str]) -> Result<()> {
    let output = Command::new("rsync")
        .args(args)
        .output()
        .await
        .map_err(|e| Error::Other(format!("failed to invoke rsync: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::Other(format!("rsync failed: {}", String::from_utf8_lossy(&output.stderr))))
    }
}

/// Replicate `local_root` to `<ssh_target>:<staging_dir>/`, excluding VCS,
/// build, scratch, and log artifacts, then mark the entry point executable.
pub async fn prepare_remote(ssh_target: &str, local_root: &Path, staging_dir: &str, entry_point_relpath: &str) -> Result<()> {
    let mut args: Vec<String> = vec!["-az".to_string(), "--delete".to_string()];
    for pattern in RSYNC_EXCLUDES {
        args.push("--exclude".to_string());
        args.push((*pattern).to_string());
    }
    let mut src = local_root.display().to_string();
    if !src.ends_with('/') {
        src.push('/');
    }
    args.push(src);
    args.push(format!("{ssh_target}:{staging_dir}/"));

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_rsync(&arg_refs).await?;

    let chmod = Command::new("ssh")
        .arg(ssh_target)
        .arg(format!("chmod +x {staging_dir}/{entry_point_relpath}"))
        .output()
        .await
        .map_err(|e| Error::Other(format!("failed to chmod remote entry point: {e}")))?;
    if !chmod.status.success() {
        return Err(Error::Other(format!("chmod +x on remote entry point failed: {}", String::from_utf8_lossy(&chmod.stderr))));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct StagedConfig {
    model: String,
    sandbox: bool,
}

/// Writes `config.json` and a provider-token file into the staging
/// directory via a local temp file plus a single-file rsync, so the API
/// key never appears in a command line or in `ssh` argv.
pub async fn materialize_config(ssh_target: &str, staging_dir: &str, model: &str, api_key: &str) -> Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let config = StagedConfig { model: model.to_string(), sandbox: false };
    std::fs::write(tmp.path().join("config.json"), serde_json::to_vec_pretty(&config)?)?;
    std::fs::write(tmp.path().join("token"), api_key)?;

    for name in ["config.json", "token"] {
        run_rsync(&["-az", tmp.path().join(name).to_str().unwrap(), &format!("{ssh_target}:{staging_dir}/{name}")]).await?;
    }
    Ok(())
}

/// `transfer_files`: push local files into the staging directory.
pub async fn transfer_files(ssh_target: &str, staging_dir: &str, local_paths: &[PathBuf]) -> Result<usize> {
    let mut n = 0;
    for path in local_paths {
        let name = path.file_name().ok_or_else(|| Error::InvalidInput(format!("'{}' has no file name", path.display())))?;
        run_rsync(&[
            "-az",
            path.to_str().ok_or_else(|| Error::InvalidInput("non-UTF8 path".to_string()))?,
            &format!("{ssh_target}:{staging_dir}/{}", name.to_string_lossy()),
        ])
        .await?;
        n += 1;
    }
    Ok(n)
}

/// `retrieve_files`: pull requested output files from
/// the staging directory back to a local temp directory, returning their
/// local paths.
pub async fn retrieve_files(ssh_target: &str, staging_dir: &str, remote_relpaths: &[String]) -> Result<Vec<PathBuf>> {
    let local_dir = tempfile::TempDir::new()?.into_path();
    let mut retrieved = Vec::new();
    for relpath in remote_relpaths {
        let local_path = local_dir.join(relpath);
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        run_rsync(&["-az", &format!("{ssh_target}:{staging_dir}/{relpath}"), local_path.to_str().unwrap()]).await?;
        retrieved.push(local_path);
    }
    Ok(retrieved)
}

/// `cleanup_remote`: remove the staging directory.
pub async fn cleanup_remote(ssh_target: &str, staging_dir: &str) -> Result<()> {
    let output = Command::new("ssh")
        .arg(ssh_target)
        .arg(format!("rm -rf {staging_dir}"))
        .output()
        .await
        .map_err(|e| Error::Other(format!("failed to invoke ssh for cleanup: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::Other(format!("remote cleanup failed: {}", String::from_utf8_lossy(&output.stderr))))
    }
}
