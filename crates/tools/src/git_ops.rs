//! Version control tool: a thin, argv-array wrapper over `git` that rejects
//! anything implying interactive editing and serializes `commit` through a
//! broker-held lock when one is available.

use std::path::Path;

use agentrt_domain::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GitOperation {
    Status,
    Log {
        #[serde(default)]
        max_count: Option<u32>,
    },
    Diff {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        staged: bool,
    },
    Branch {
        #[serde(default)]
        name: Option<String>,
    },
    Commit {
        message: String,
        #[serde(default)]
        add_all: bool,
    },
    Push {
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        branch: Option<String>,
    },
    Pull {
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        branch: Option<String>,
    },
    Blame {
        path: String,
    },
    Stash {
        #[serde(default)]
        pop: bool,
    },
    Tag {
        #[serde(default)]
        name: Option<String>,
    },
}

/// Held around the staging+commit critical section to serialize commits
/// across sibling agents on the same session. A no-op implementation means
/// "no broker": commits proceed best-effort-serial within this process only.
#[async_trait]
pub trait GitLock: Send + Sync {
    async fn acquire(&self) -> Result<GitLockGuard>;
}

pub struct GitLockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl GitLockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }

    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for GitLockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

fn rejects_interactive_flags(args: &[&str]) -> Option<&'static str> {
    let joined = args.join(" ");
    const BLOCKED: &[(&str, &str)] = &[
        ("-i", "rebase -i"),
        ("--interactive", "rebase --interactive"),
        ("-p", "add -p"),
        ("--patch", "commit --patch"),
    ];
    for (flag, label) in BLOCKED {
        if args.contains(flag) || joined.contains(label) {
            return Some(label);
        }
    }
    if args.first() == Some(&"mergetool") {
        return Some("mergetool");
    }
    None
}

async fn run_git(repo_root: &Path, args: &[&str]) -> Result<Value> {
    if let Some(blocked) = rejects_interactive_flags(args) {
        return Err(Error::InvalidInput(format!("'{blocked}' implies interactive editing and is not supported")));
    }
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .await
        .map_err(|e| Error::InvalidInput(format!("failed to run git: {e}")))?;

    Ok(serde_json::json!({
        "stdout": String::from_utf8_lossy(&output.stdout),
        "stderr": String::from_utf8_lossy(&output.stderr),
        "exit_code": output.status.code(),
        "success": output.status.success(),
    }))
}

pub async fn handle(repo_root: &Path, op: GitOperation, git_lock: &dyn GitLock) -> Result<Value> {
    match op {
        GitOperation::Status => run_git(repo_root, &["status", "--porcelain=v1", "-b"]).await,
        GitOperation::Log { max_count } => {
            let count = max_count.unwrap_or(20).to_string();
            run_git(repo_root, &["log", &format!("-{count}"), "--pretty=format:%H%x09%an%x09%ad%x09%s"]).await
        }
        GitOperation::Diff { path, staged } => {
            let mut args = vec!["diff"];
            if staged {
                args.push("--staged");
            }
            if let Some(ref p) = path {
                args.push("--");
                args.push(p);
            }
            run_git(repo_root, &args).await
        }
        GitOperation::Branch { name } => match name {
            Some(n) => run_git(repo_root, &["checkout", "-b", &n]).await,
            None => run_git(repo_root, &["branch", "--show-current"]).await,
        },
        GitOperation::Commit { message, add_all } => {
            let guard = match git_lock.acquire().await {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(error = %e, "git lock unavailable, committing best-effort");
                    GitLockGuard::noop()
                }
            };
            if add_all {
                run_git(repo_root, &["add", "-A"]).await?;
            }
            let result = run_git(repo_root, &["commit", "-m", &message]).await;
            drop(guard);
            result
        }
        GitOperation::Push { remote, branch } => {
            let mut args = vec!["push"];
            if let Some(ref r) = remote {
                args.push(r);
            }
            if let Some(ref b) = branch {
                args.push(b);
            }
            run_git(repo_root, &args).await
        }
        GitOperation::Pull { remote, branch } => {
            let mut args = vec!["pull"];
            if let Some(ref r) = remote {
                args.push(r);
            }
            if let Some(ref b) = branch {
                args.push(b);
            }
            run_git(repo_root, &args).await
        }
        GitOperation::Blame { path } => run_git(repo_root, &["blame", "--porcelain", &path]).await,
        GitOperation::Stash { pop } => {
            if pop {
                run_git(repo_root, &["stash", "pop"]).await
            } else {
                run_git(repo_root, &["stash"]).await
            }
        }
        GitOperation::Tag { name } => match name {
            Some(n) => run_git(repo_root, &["tag", &n]).await,
            None => run_git(repo_root, &["tag", "--list"]).await,
        },
    }
}

/// Always grants immediately; used when no broker is configured.
pub struct NoGitLock;

#[async_trait]
impl GitLock for NoGitLock {
    async fn acquire(&self) -> Result<GitLockGuard> {
        Ok(GitLockGuard::noop())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GitLockDenied;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_rebase_interactive() {
        assert!(rejects_interactive_flags(&["rebase", "-i", "HEAD~3"]).is_some());
    }

    #[test]
    fn rejects_add_patch() {
        assert!(rejects_interactive_flags(&["add", "-p"]).is_some());
    }

    #[test]
    fn allows_plain_commit() {
        assert!(rejects_interactive_flags(&["commit", "-m", "fix bug"]).is_none());
    }

    #[tokio::test]
    async fn status_runs_in_repo() {
        let dir = tempfile::TempDir::new().unwrap();
        Command::new("git").arg("init").current_dir(dir.path()).output().await.unwrap();
        let result = handle(dir.path(), GitOperation::Status, &NoGitLock).await.unwrap();
        assert_eq!(result["success"].as_bool(), Some(true));
    }
}
