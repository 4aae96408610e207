//! Remote Execution tool operations. Wraps
//! [`agentrt_remote::execute_remote`]/[`agentrt_remote::execute_parallel`]
//! plus the staging helpers so each step of the 9-step algorithm is also
//! independently callable (e.g. to probe a device before committing to a
//! full run).

use agentrt_domain::error::Result;
use agentrt_remote::{
    cleanup_remote, execute_parallel, execute_remote, materialize_config, prepare_remote, retrieve_files, transfer_files,
    validate_ssh, ExecuteRemoteRequest,
};
use serde::Deserialize;
use serde_json::Value;

use crate::tool_trait::RemoteExecutionContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum RemoteOperation {
    Execute {
        target: String,
        task: String,
        model: Option<String>,
        #[serde(default)]
        retrieve: Vec<String>,
        #[serde(default = "default_true")]
        cleanup: bool,
    },
    ExecuteParallel {
        targets: Vec<String>,
        task: String,
        model: Option<String>,
    },
    ValidateSsh {
        target: String,
    },
    PrepareStaging {
        target: String,
        staging_dir: String,
    },
    TransferFiles {
        target: String,
        staging_dir: String,
        paths: Vec<String>,
    },
    RetrieveFiles {
        target: String,
        staging_dir: String,
        relpaths: Vec<String>,
    },
    CleanupStaging {
        target: String,
        staging_dir: String,
    },
}

fn default_true() -> bool {
    true
}

pub async fn handle(remote: &RemoteExecutionContext, op: RemoteOperation) -> Result<Value> {
    match op {
        RemoteOperation::Execute { target, task, model, retrieve, cleanup } => {
            let model = model.unwrap_or_else(|| remote.default_model.clone());
            let result = execute_remote(
                &remote.config,
                ExecuteRemoteRequest {
                    target: &target,
                    task: &task,
                    model: &model,
                    api_key: &remote.api_key,
                    local_root: &remote.local_root,
                    entry_point_relpath: &remote.entry_point_relpath,
                    retrieve_relpaths: &retrieve,
                    cleanup,
                },
            )
            .await?;
            Ok(serde_json::to_value(result)?)
        }
        RemoteOperation::ExecuteParallel { targets, task, model } => {
            let model = model.unwrap_or_else(|| remote.default_model.clone());
            let report = execute_parallel(
                &remote.config,
                &targets,
                &task,
                &model,
                &remote.api_key,
                &remote.local_root,
                &remote.entry_point_relpath,
            )
            .await?;
            Ok(serde_json::to_value(report)?)
        }
        RemoteOperation::ValidateSsh { target } => {
            let device = agentrt_remote::resolve_one(&remote.config, &target);
            validate_ssh(&device.ssh_target, remote.config.ssh_connect_timeout_secs).await?;
            Ok(serde_json::json!({"reachable": true, "device": device.name}))
        }
        RemoteOperation::PrepareStaging { target, staging_dir } => {
            let device = agentrt_remote::resolve_one(&remote.config, &target);
            prepare_remote(&device.ssh_target, &remote.local_root, &staging_dir, &remote.entry_point_relpath).await?;
            Ok(serde_json::json!({"staged": true, "staging_dir": staging_dir}))
        }
        RemoteOperation::TransferFiles { target, staging_dir, paths } => {
            let device = agentrt_remote::resolve_one(&remote.config, &target);
            let local_paths: Vec<std::path::PathBuf> = paths.into_iter().map(std::path::PathBuf::from).collect();
            let n = transfer_files(&device.ssh_target, &staging_dir, &local_paths).await?;
            Ok(serde_json::json!({"transferred_count": n}))
        }
        RemoteOperation::RetrieveFiles { target, staging_dir, relpaths } => {
            let device = agentrt_remote::resolve_one(&remote.config, &target);
            let retrieved = retrieve_files(&device.ssh_target, &staging_dir, &relpaths).await?;
            Ok(serde_json::json!({"retrieved_files": retrieved}))
        }
        RemoteOperation::CleanupStaging { target, staging_dir } => {
            let device = agentrt_remote::resolve_one(&remote.config, &target);
            cleanup_remote(&device.ssh_target, &staging_dir).await?;
            Ok(serde_json::json!({"cleaned_up": true}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_defaults_cleanup_to_true_and_retrieve_to_empty() {
        let op: RemoteOperation = serde_json::from_value(serde_json::json!({
            "operation": "execute",
            "target": "mac-mini",
            "task": "run the suite",
        }))
        .unwrap();
        match op {
            RemoteOperation::Execute { cleanup, retrieve, .. } => {
                assert!(cleanup);
                assert!(retrieve.is_empty());
            }
            _ => panic!("wrong variant"),
        }
    }
}
