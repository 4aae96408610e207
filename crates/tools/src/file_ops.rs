//! File operations tool: read/write/search a workspace, sandboxed to a
//! workspace root.
//!
//! Every multi-operation tool in this crate follows the same shape: a
//! tagged `operation` enum deserialized from the model's arguments, and a
//! single `handle` entry point the registry calls.

use std::path::{Component, Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum FileOperation {
    ReadFile {
        path: String,
        start_line: Option<usize>,
        end_line: Option<usize>,
    },
    WriteFile {
        path: String,
        content: String,
    },
    CreateFile {
        path: String,
        content: String,
    },
    AppendFile {
        path: String,
        content: String,
    },
    ReplaceString {
        path: String,
        old: String,
        new: String,
    },
    InsertAtLine {
        path: String,
        line: usize,
        content: String,
    },
    DeleteFile {
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    RenameFile {
        source: String,
        destination: String,
    },
    CreateDirectory {
        path: String,
    },
    ListDir {
        #[serde(default = "default_dot")]
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    FileSearch {
        pattern: String,
        #[serde(default = "default_dot")]
        base: String,
    },
    GrepSearch {
        query: String,
        #[serde(default = "default_dot")]
        path: String,
        #[serde(default)]
        is_regex: bool,
        #[serde(default)]
        context_before: usize,
        #[serde(default)]
        context_after: usize,
    },
    GetFileInfo {
        path: String,
    },
    FileExists {
        path: String,
    },
    GetErrors,
    /// Proxies to the Tool Result Store: pages through
    /// an oversized tool output the executor replaced with a marker.
    /// Handled by [`crate::builtin::FileOperationsTool`] directly (it needs
    /// the session's result store, which this module has no handle to) —
    /// kept here only so it appears in the operation enum callers match on.
    ReadToolResult {
        tool_call_id: String,
        #[serde(default)]
        offset: usize,
        length: Option<usize>,
    },
}

fn default_dot() -> String {
    ".".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrepMatch {
    pub file: String,
    pub line_number: usize,
    pub line: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_after: Vec<String>,
}

/// Validate and resolve a requested path within a workspace root.
///
/// When `sandbox` is false (the default), the request is just joined onto
/// the workspace root (or used as-is if absolute) with no containment
/// check — the workspace-confinement behavior below only applies once
/// sandbox mode is turned on.
///
/// With sandbox on: rejects raw `..` components and absolute paths before
/// resolution, canonicalizes the nearest existing ancestor, appends the
/// remaining components, then verifies containment via `starts_with`.
pub fn validate_path(workspace_root: &Path, requested: &str, sandbox: bool) -> Result<PathBuf> {
    let requested_path = Path::new(requested);

    if !sandbox {
        return Ok(if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            workspace_root.join(requested_path)
        });
    }

    if requested_path.is_absolute() {
        return Err(Error::InvalidInput(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        )));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::InvalidInput(
                "path must not contain '..' components".to_string(),
            ));
        }
    }

    let canonical_root = workspace_root.canonicalize().map_err(|e| {
        Error::InvalidInput(format!(
            "cannot resolve workspace root '{}': {e}",
            workspace_root.display()
        ))
    })?;

    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| Error::InvalidInput(format!("cannot resolve path '{}': {e}", candidate.display())))?
    } else {
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing.canonicalize().map_err(|e| {
            Error::InvalidInput(format!("cannot resolve ancestor of '{}': {e}", candidate.display()))
        })?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(Error::InvalidInput(format!(
            "path '{requested}' resolves outside workspace root '{}'",
            canonical_root.display()
        )));
    }

    Ok(resolved)
}

async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_data().await?;

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

pub async fn handle(workspace_root: &Path, op: FileOperation, sandbox: bool) -> Result<Value> {
    match op {
        FileOperation::ReadFile { path, start_line, end_line } => {
            read_file(workspace_root, &path, start_line, end_line, sandbox).await
        }
        FileOperation::WriteFile { path, content } | FileOperation::CreateFile { path, content } => {
            write_file(workspace_root, &path, &content, sandbox).await
        }
        FileOperation::AppendFile { path, content } => append_file(workspace_root, &path, &content, sandbox).await,
        FileOperation::ReplaceString { path, old, new } => replace_string(workspace_root, &path, &old, &new, sandbox).await,
        FileOperation::InsertAtLine { path, line, content } => {
            insert_at_line(workspace_root, &path, line, &content, sandbox).await
        }
        FileOperation::DeleteFile { path, recursive } => delete_file(workspace_root, &path, recursive, sandbox).await,
        FileOperation::RenameFile { source, destination } => {
            rename_file(workspace_root, &source, &destination, sandbox).await
        }
        FileOperation::CreateDirectory { path } => create_directory(workspace_root, &path, sandbox).await,
        FileOperation::ListDir { path, recursive } => list_dir(workspace_root, &path, recursive, sandbox).await,
        FileOperation::FileSearch { pattern, base } => file_search(workspace_root, &pattern, &base, sandbox).await,
        FileOperation::GrepSearch { query, path, is_regex, context_before, context_after } => {
            grep_search(workspace_root, &query, &path, is_regex, context_before, context_after, sandbox).await
        }
        FileOperation::GetFileInfo { path } => get_file_info(workspace_root, &path, sandbox).await,
        FileOperation::FileExists { path } => file_exists(workspace_root, &path, sandbox).await,
        FileOperation::GetErrors => Ok(serde_json::json!({ "errors": [] })),
        FileOperation::ReadToolResult { .. } => Err(Error::InvalidInput(
            "read_tool_result must be handled by FileOperationsTool::execute, not file_ops::handle".to_string(),
        )),
    }
}

/// Read lines `[start_line, end_line]` inclusive, 1-indexed. Omitted bounds
/// default to the whole file.
async fn read_file(
    workspace_root: &Path,
    path: &str,
    start_line: Option<usize>,
    end_line: Option<usize>,
    sandbox: bool,
) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let content = fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::NotFound(format!("'{path}': {e}")))?;

    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();
    let start = start_line.unwrap_or(1).max(1);
    let end = end_line.unwrap_or(total_lines).min(total_lines);

    let selected = if start > end || start > total_lines {
        String::new()
    } else {
        lines[(start - 1)..end].join("\n")
    };

    Ok(serde_json::json!({
        "path": path,
        "content": selected,
        "total_lines": total_lines,
        "start_line": start,
        "end_line": end.max(start.saturating_sub(1)),
    }))
}

async fn write_file(workspace_root: &Path, path: &str, content: &str, sandbox: bool) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    atomic_write(&resolved, content.as_bytes()).await?;
    Ok(serde_json::json!({ "path": path, "bytes_written": content.len() }))
}

async fn append_file(workspace_root: &Path, path: &str, content: &str, sandbox: bool) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    if let Some(parent) = resolved.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(&resolved).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(serde_json::json!({ "path": path, "bytes_appended": content.len() }))
}

/// Replace all non-overlapping occurrences of `old` with `new`, reporting
/// the number of replacements made.
async fn replace_string(workspace_root: &Path, path: &str, old: &str, new: &str, sandbox: bool) -> Result<Value> {
    if old.is_empty() {
        return Err(Error::InvalidInput("'old' must not be empty".to_string()));
    }
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let content = fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::NotFound(format!("'{path}': {e}")))?;

    let count = content.matches(old).count();
    let replaced = content.replace(old, new);
    atomic_write(&resolved, replaced.as_bytes()).await?;

    Ok(serde_json::json!({ "path": path, "replacements": count }))
}

async fn insert_at_line(workspace_root: &Path, path: &str, line: usize, content: &str, sandbox: bool) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let existing = fs::read_to_string(&resolved)
        .await
        .map_err(|e| Error::NotFound(format!("'{path}': {e}")))?;

    let mut lines: Vec<&str> = existing.lines().collect();
    let idx = line.saturating_sub(1).min(lines.len());
    lines.insert(idx, content);
    let joined = lines.join("\n");
    atomic_write(&resolved, joined.as_bytes()).await?;

    Ok(serde_json::json!({ "path": path, "inserted_at": idx + 1 }))
}

async fn delete_file(workspace_root: &Path, path: &str, recursive: bool, sandbox: bool) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let metadata = fs::metadata(&resolved).await.map_err(|e| Error::NotFound(format!("'{path}': {e}")))?;

    if metadata.is_dir() {
        if recursive {
            fs::remove_dir_all(&resolved).await?;
        } else {
            fs::remove_dir(&resolved)
                .await
                .map_err(|e| Error::InvalidInput(format!("directory '{path}' not empty (pass recursive=true): {e}")))?;
        }
    } else {
        fs::remove_file(&resolved).await?;
    }
    Ok(serde_json::json!({ "path": path, "deleted": true }))
}

async fn rename_file(workspace_root: &Path, source: &str, destination: &str, sandbox: bool) -> Result<Value> {
    let src = validate_path(workspace_root, source, sandbox)?;
    let dst = validate_path(workspace_root, destination, sandbox)?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(&src, &dst)
        .await
        .map_err(|e| Error::InvalidInput(format!("failed to rename '{source}' to '{destination}': {e}")))?;
    Ok(serde_json::json!({ "source": source, "destination": destination }))
}

async fn create_directory(workspace_root: &Path, path: &str, sandbox: bool) -> Result<Value> {
    let target = validate_path(workspace_root, path, sandbox)?;
    fs::create_dir_all(&target).await?;
    Ok(serde_json::json!({ "path": path, "created": true }))
}

async fn list_dir(workspace_root: &Path, path: &str, recursive: bool, sandbox: bool) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let mut entries = Vec::new();
    collect_entries(&resolved, &resolved, recursive, &mut entries).await?;
    entries.sort_by(|a: &DirEntry, b| a.path.cmp(&b.path));
    Ok(serde_json::json!({ "path": path, "entries": entries, "count": entries.len() }))
}

fn collect_entries<'a>(
    root: &'a Path,
    dir: &'a Path,
    recursive: bool,
    out: &'a mut Vec<DirEntry>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let modified = metadata
                .modified()
                .ok()
                .map(|t| {
                    let dt: DateTime<Utc> = t.into();
                    dt.to_rfc3339()
                })
                .unwrap_or_default();
            let rel = entry.path().strip_prefix(root).unwrap_or(&entry.path()).to_string_lossy().to_string();
            let is_dir = metadata.is_dir();
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                path: rel,
                size: metadata.len(),
                modified,
                is_dir,
            });
            if recursive && is_dir {
                collect_entries(root, &entry.path(), recursive, out).await?;
            }
        }
        Ok(())
    })
}

/// Glob search for file names across `base`, honoring standard glob
/// semantics (`*`, `**`, `?`, character classes).
async fn file_search(workspace_root: &Path, pattern: &str, base: &str, sandbox: bool) -> Result<Value> {
    let resolved_base = validate_path(workspace_root, base, sandbox)?;
    let glob = globset::Glob::new(pattern)
        .map_err(|e| Error::InvalidInput(format!("invalid glob pattern '{pattern}': {e}")))?
        .compile_matcher();

    let mut matches = Vec::new();
    let walker = ignore::WalkBuilder::new(&resolved_base).hidden(false).build();
    for entry in walker.flatten() {
        let rel = entry.path().strip_prefix(&resolved_base).unwrap_or(entry.path());
        if glob.is_match(rel) || entry.file_name().to_string_lossy().as_ref() == pattern {
            matches.push(rel.to_string_lossy().to_string());
        }
    }
    matches.sort();
    Ok(serde_json::json!({ "pattern": pattern, "matches": matches, "count": matches.len() }))
}

/// Search `path` (a file or directory) for `query`, returning matches with
/// optional surrounding context lines.
async fn grep_search(
    workspace_root: &Path,
    query: &str,
    path: &str,
    is_regex: bool,
    context_before: usize,
    context_after: usize,
    sandbox: bool,
) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let re = if is_regex {
        Regex::new(query).map_err(|e| Error::InvalidInput(format!("invalid regex '{query}': {e}")))?
    } else {
        Regex::new(&regex::escape(query)).expect("escaped literal is always valid")
    };

    let mut results = Vec::new();
    let walker = ignore::WalkBuilder::new(&resolved).hidden(false).build();
    for entry in walker.flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let file_path = entry.path();
        let Ok(content) = std::fs::read_to_string(file_path) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();
        let rel = file_path.strip_prefix(workspace_root.canonicalize()?).unwrap_or(file_path);
        for (i, line) in lines.iter().enumerate() {
            if re.is_match(line) {
                let before: Vec<String> = lines[i.saturating_sub(context_before)..i].iter().map(|s| s.to_string()).collect();
                let after_end = (i + 1 + context_after).min(lines.len());
                let after: Vec<String> = lines[i + 1..after_end].iter().map(|s| s.to_string()).collect();
                results.push(GrepMatch {
                    file: rel.to_string_lossy().to_string(),
                    line_number: i + 1,
                    line: line.to_string(),
                    context_before: before,
                    context_after: after,
                });
            }
        }
    }

    Ok(serde_json::json!({ "query": query, "matches": results, "count": results.len() }))
}

async fn get_file_info(workspace_root: &Path, path: &str, sandbox: bool) -> Result<Value> {
    let resolved = validate_path(workspace_root, path, sandbox)?;
    let metadata = fs::metadata(&resolved).await.map_err(|e| Error::NotFound(format!("'{path}': {e}")))?;
    let modified = metadata
        .modified()
        .ok()
        .map(|t| {
            let dt: DateTime<Utc> = t.into();
            dt.to_rfc3339()
        })
        .unwrap_or_default();
    Ok(serde_json::json!({
        "path": path,
        "size": metadata.len(),
        "is_dir": metadata.is_dir(),
        "modified": modified,
    }))
}

async fn file_exists(workspace_root: &Path, path: &str, sandbox: bool) -> Result<Value> {
    match validate_path(workspace_root, path, sandbox) {
        Ok(resolved) => Ok(serde_json::json!({ "path": path, "exists": resolved.exists() })),
        Err(_) => Ok(serde_json::json!({ "path": path, "exists": false })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_workspace() -> TempDir {
        TempDir::new().expect("failed to create temp dir")
    }

    #[test]
    fn validate_path_rejects_parent_traversal_when_sandboxed() {
        let ws = tmp_workspace();
        let result = validate_path(ws.path(), "../etc/passwd", true);
        assert!(result.is_err());
    }

    #[test]
    fn validate_path_rejects_absolute_path_when_sandboxed() {
        let ws = tmp_workspace();
        let abs_path = if cfg!(windows) { "C:\\Windows\\System32" } else { "/etc/passwd" };
        assert!(validate_path(ws.path(), abs_path, true).is_err());
    }

    #[test]
    fn validate_path_allows_escaping_paths_when_not_sandboxed() {
        let ws = tmp_workspace();
        let abs_path = if cfg!(windows) { "C:\\Windows\\System32" } else { "/etc/hostname" };
        let resolved = validate_path(ws.path(), abs_path, false).unwrap();
        assert_eq!(resolved, Path::new(abs_path));
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let ws = tmp_workspace();
        write_file(ws.path(), "test.txt", "hello\nworld", true).await.unwrap();
        let result = read_file(ws.path(), "test.txt", None, None, true).await.unwrap();
        assert_eq!(result["content"].as_str().unwrap(), "hello\nworld");
        assert_eq!(result["total_lines"].as_u64().unwrap(), 2);
    }

    #[tokio::test]
    async fn read_file_respects_line_range() {
        let ws = tmp_workspace();
        write_file(ws.path(), "lines.txt", "a\nb\nc\nd\ne", true).await.unwrap();
        let result = read_file(ws.path(), "lines.txt", Some(2), Some(3), true).await.unwrap();
        assert_eq!(result["content"].as_str().unwrap(), "b\nc");
    }

    #[tokio::test]
    async fn replace_string_counts_occurrences() {
        let ws = tmp_workspace();
        write_file(ws.path(), "f.txt", "foo bar foo baz foo", true).await.unwrap();
        let result = replace_string(ws.path(), "f.txt", "foo", "qux", true).await.unwrap();
        assert_eq!(result["replacements"].as_u64().unwrap(), 3);
        let content = fs::read_to_string(ws.path().join("f.txt")).await.unwrap();
        assert_eq!(content, "qux bar qux baz qux");
    }

    #[tokio::test]
    async fn insert_at_line_splices_content() {
        let ws = tmp_workspace();
        write_file(ws.path(), "f.txt", "a\nb\nc", true).await.unwrap();
        insert_at_line(ws.path(), "f.txt", 2, "inserted", true).await.unwrap();
        let content = fs::read_to_string(ws.path().join("f.txt")).await.unwrap();
        assert_eq!(content, "a\ninserted\nb\nc");
    }

    #[tokio::test]
    async fn delete_non_empty_dir_requires_recursive() {
        let ws = tmp_workspace();
        std::fs::create_dir(ws.path().join("d")).unwrap();
        std::fs::write(ws.path().join("d/f.txt"), "x").unwrap();
        assert!(delete_file(ws.path(), "d", false, true).await.is_err());
        delete_file(ws.path(), "d", true, true).await.unwrap();
        assert!(!ws.path().join("d").exists());
    }

    #[tokio::test]
    async fn grep_search_finds_matches_with_context() {
        let ws = tmp_workspace();
        write_file(ws.path(), "f.txt", "one\ntwo needle\nthree", true).await.unwrap();
        let result = grep_search(ws.path(), "needle", ".", false, 1, 1, true).await.unwrap();
        assert_eq!(result["count"].as_u64().unwrap(), 1);
        let m = &result["matches"][0];
        assert_eq!(m["line_number"].as_u64().unwrap(), 2);
        assert_eq!(m["context_before"][0].as_str().unwrap(), "one");
        assert_eq!(m["context_after"][0].as_str().unwrap(), "three");
    }

    #[tokio::test]
    async fn file_search_matches_glob() {
        let ws = tmp_workspace();
        write_file(ws.path(), "src/a.rs", "x", true).await.unwrap();
        write_file(ws.path(), "src/b.txt", "y", true).await.unwrap();
        let result = file_search(ws.path(), "*.rs", ".", true).await.unwrap();
        let matches: Vec<&str> = result["matches"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert!(matches.iter().any(|m| m.ends_with("a.rs")));
        assert!(!matches.iter().any(|m| m.ends_with("b.txt")));
    }
}
