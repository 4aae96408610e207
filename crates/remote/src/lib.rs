//! Remote Execution: run a task on another machine over
//! SSH by replicating the local binary tree, materializing a minimal
//! config, executing non-interactively, and retrieving outputs.
//!
//! Device resolution is deliberately simple: a static name→`user@host` map
//! plus named groups, both sourced from [`agentrt_domain::config::RemoteConfig`].

pub mod device;
pub mod executor;
pub mod ssh;
pub mod staging;

pub use device::{resolve_many, resolve_one, ResolvedDevice};
pub use executor::{execute_parallel, execute_remote, ExecuteRemoteRequest, ParallelExecutionReport, PerDeviceResult, RemoteExecutionResult};
pub use ssh::{check_remote, validate_ssh, RemoteCheck, SshFailureReason};
pub use staging::{cleanup_remote, materialize_config, prepare_remote, retrieve_files, transfer_files};
