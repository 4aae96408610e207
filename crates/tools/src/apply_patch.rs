//! Apply-patch tool: a lightweight, LLM-authored
//! diff format with file-level directives (`Add File`, `Update File`,
//! `Delete File`, optional `Move to`) and hunks anchored by `@@ context`
//! lines rather than line numbers, since a model rarely gets line numbers
//! right.

use std::path::{Path, PathBuf};

use agentrt_domain::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::file_ops::validate_path;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ApplyPatchOperation {
    Apply { patch: String },
}

#[derive(Debug, Clone, PartialEq)]
enum HunkLine {
    Context(String),
    Add(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct Hunk {
    anchor: Option<String>,
    lines: Vec<HunkLine>,
}

#[derive(Debug, Clone)]
enum PatchFile {
    Add { path: String, content: String },
    Update { path: String, move_to: Option<String>, hunks: Vec<Hunk> },
    Delete { path: String },
}

pub async fn handle(workspace_root: &Path, op: ApplyPatchOperation, sandbox: bool) -> Result<Value> {
    match op {
        ApplyPatchOperation::Apply { patch } => apply(workspace_root, &patch, sandbox).await,
    }
}

async fn apply(workspace_root: &Path, patch_text: &str, sandbox: bool) -> Result<Value> {
    let files = parse_patch(patch_text)?;
    let mut applied = Vec::new();

    // Validate every path up front so a mid-patch failure never leaves some
    // files written and others not.
    for file in &files {
        match file {
            PatchFile::Add { path, .. } => {
                validate_path(workspace_root, path, sandbox)?;
            }
            PatchFile::Update { path, move_to, .. } => {
                validate_path(workspace_root, path, sandbox)?;
                if let Some(dest) = move_to {
                    validate_path(workspace_root, dest, sandbox)?;
                }
            }
            PatchFile::Delete { path } => {
                validate_path(workspace_root, path, sandbox)?;
            }
        }
    }

    for file in &files {
        match file {
            PatchFile::Add { path, content } => {
                let target = validate_path(workspace_root, path, sandbox)?;
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                atomic_write(&target, content.as_bytes()).await?;
                applied.push(serde_json::json!({ "path": path, "action": "add" }));
            }
            PatchFile::Update { path, move_to, hunks } => {
                let source = validate_path(workspace_root, path, sandbox)?;
                let original = tokio::fs::read_to_string(&source)
                    .await
                    .map_err(|e| Error::NotFound(format!("{path}: {e}")))?;
                let updated = apply_hunks(&original, hunks)?;

                let dest = match move_to {
                    Some(m) => validate_path(workspace_root, m, sandbox)?,
                    None => source.clone(),
                };
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                atomic_write(&dest, updated.as_bytes()).await?;
                if dest != source {
                    tokio::fs::remove_file(&source).await?;
                }
                applied.push(serde_json::json!({ "path": path, "action": "update", "moved_to": move_to }));
            }
            PatchFile::Delete { path } => {
                let target = validate_path(workspace_root, path, sandbox)?;
                tokio::fs::remove_file(&target).await?;
                applied.push(serde_json::json!({ "path": path, "action": "delete" }));
            }
        }
    }

    Ok(serde_json::json!({ "files": applied, "count": applied.len() }))
}

fn parse_patch(text: &str) -> Result<Vec<PatchFile>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    while i < lines.len() && lines[i].trim() != "*** Begin Patch" {
        i += 1;
    }
    if i == lines.len() {
        return Err(Error::InvalidInput("patch missing '*** Begin Patch' header".to_string()));
    }
    i += 1;

    let mut files = Vec::new();
    while i < lines.len() {
        let line = lines[i].trim_end();
        if line.trim() == "*** End Patch" {
            break;
        }
        if let Some(path) = line.strip_prefix("*** Add File: ") {
            let mut content_lines = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].starts_with("*** ") {
                content_lines.push(lines[i].strip_prefix('+').unwrap_or(lines[i]));
                i += 1;
            }
            files.push(PatchFile::Add { path: path.trim().to_string(), content: content_lines.join("\n") + "\n" });
        } else if let Some(path) = line.strip_prefix("*** Delete File: ") {
            files.push(PatchFile::Delete { path: path.trim().to_string() });
            i += 1;
        } else if let Some(path) = line.strip_prefix("*** Update File: ") {
            i += 1;
            let mut move_to = None;
            if i < lines.len() {
                if let Some(dest) = lines[i].trim_end().strip_prefix("*** Move to: ") {
                    move_to = Some(dest.trim().to_string());
                    i += 1;
                }
            }
            let mut hunks = Vec::new();
            while i < lines.len() && !lines[i].starts_with("*** ") {
                if let Some(anchor) = lines[i].strip_prefix("@@") {
                    let anchor = anchor.trim();
                    let mut hunk = Hunk { anchor: (!anchor.is_empty()).then(|| anchor.to_string()), lines: Vec::new() };
                    i += 1;
                    while i < lines.len() && !lines[i].starts_with("@@") && !lines[i].starts_with("*** ") {
                        let raw = lines[i];
                        if let Some(rest) = raw.strip_prefix('+') {
                            hunk.lines.push(HunkLine::Add(rest.to_string()));
                        } else if let Some(rest) = raw.strip_prefix('-') {
                            hunk.lines.push(HunkLine::Remove(rest.to_string()));
                        } else if let Some(rest) = raw.strip_prefix(' ') {
                            hunk.lines.push(HunkLine::Context(rest.to_string()));
                        } else if raw.is_empty() {
                            hunk.lines.push(HunkLine::Context(String::new()));
                        } else {
                            return Err(Error::InvalidInput(format!(
                                "hunk line must start with ' ', '+', or '-': {raw:?}"
                            )));
                        }
                        i += 1;
                    }
                    hunks.push(hunk);
                } else {
                    i += 1;
                }
            }
            files.push(PatchFile::Update { path: path.trim().to_string(), move_to, hunks });
        } else {
            i += 1;
        }
    }

    if files.is_empty() {
        return Err(Error::InvalidInput("patch contains no file directives".to_string()));
    }
    Ok(files)
}

/// Apply every hunk in order, each search starting where the previous one
/// left off (monotonic progress through the file) so repeated context
/// elsewhere in the file cannot be matched twice.
fn apply_hunks(original: &str, hunks: &[Hunk]) -> Result<String> {
    let mut lines: Vec<String> = original.lines().map(|l| l.to_string()).collect();
    let trailing_newline = original.ends_with('\n');
    let mut search_from = 0usize;

    for (hunk_index, hunk) in hunks.iter().enumerate() {
        let old_lines: Vec<&str> = hunk
            .lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect();
        let new_lines: Vec<String> = hunk
            .lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.clone()),
                HunkLine::Remove(_) => None,
            })
            .collect();

        if old_lines.is_empty() {
            // Pure insertion: splice at the anchor position (or EOF).
            let pos = hunk
                .anchor
                .as_ref()
                .and_then(|a| find_exact(&lines, &[a.as_str()], search_from))
                .map(|p| p + 1)
                .unwrap_or(lines.len());
            lines.splice(pos..pos, new_lines.clone());
            search_from = pos + new_lines.len();
            continue;
        }

        let found = find_exact(&lines, &old_lines, search_from)
            .or_else(|| find_fuzzy(&lines, &old_lines, search_from));

        let Some(start) = found else {
            return Err(Error::PatchMismatch {
                hunk: hunk_index,
                reason: format!(
                    "could not locate hunk body{} in file",
                    hunk.anchor.as_ref().map(|a| format!(" near anchor '{a}'")).unwrap_or_default()
                ),
            });
        };

        lines.splice(start..start + old_lines.len(), new_lines.clone());
        search_from = start + new_lines.len();
    }

    let mut joined = lines.join("\n");
    if trailing_newline {
        joined.push('\n');
    }
    Ok(joined)
}

fn find_exact(lines: &[String], needle: &[&str], from: usize) -> Option<usize> {
    if needle.is_empty() || from + needle.len() > lines.len() {
        return None;
    }
    (from..=lines.len() - needle.len()).find(|&start| {
        (0..needle.len()).all(|j| lines[start + j] == needle[j])
    })
}

fn find_fuzzy(lines: &[String], needle: &[&str], from: usize) -> Option<usize> {
    if needle.is_empty() || from + needle.len() > lines.len() {
        return None;
    }
    let normalized_needle: Vec<String> = needle.iter().map(|l| normalize_whitespace(l)).collect();
    (from..=lines.len() - needle.len()).find(|&start| {
        (0..needle.len()).all(|j| normalize_whitespace(&lines[start + j]) == normalized_needle[j])
    })
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

async fn atomic_write(path: &PathBuf, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("patched")
    ));
    let mut f = tokio::fs::File::create(&tmp_path).await?;
    f.write_all(bytes).await?;
    f.flush().await?;
    f.sync_data().await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_file_writes_new_content() {
        let dir = TempDir::new().unwrap();
        let patch = "*** Begin Patch\n*** Add File: new.txt\n+hello\n+world\n*** End Patch";
        let result = apply(dir.path(), patch, true).await.unwrap();
        assert_eq!(result["count"], 1);
        let content = tokio::fs::read_to_string(dir.path().join("new.txt")).await.unwrap();
        assert_eq!(content, "hello\nworld\n");
    }

    #[tokio::test]
    async fn update_file_applies_single_hunk() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "fn main() {\n    println!(\"old\");\n}\n").await.unwrap();
        let patch = "*** Begin Patch\n*** Update File: a.rs\n@@ fn main() {\n    println!(\"old\");\n+    println!(\"new\");\n*** End Patch";
        apply(dir.path(), patch, true).await.unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("a.rs")).await.unwrap();
        assert!(content.contains("println!(\"new\")"));
    }

    #[tokio::test]
    async fn update_file_replaces_context_with_minus_and_plus() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").await.unwrap();
        let patch = "*** Begin Patch\n*** Update File: a.txt\n@@\n one\n-two\n+TWO\n three\n*** End Patch";
        apply(dir.path(), patch, true).await.unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap();
        assert_eq!(content, "one\nTWO\nthree\n");
    }

    #[tokio::test]
    async fn delete_file_removes_it() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("gone.txt"), "bye").await.unwrap();
        let patch = "*** Begin Patch\n*** Delete File: gone.txt\n*** End Patch";
        apply(dir.path(), patch, true).await.unwrap();
        assert!(!dir.path().join("gone.txt").exists());
    }

    #[tokio::test]
    async fn unmatchable_hunk_aborts_before_any_write() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").await.unwrap();
        let patch = "*** Begin Patch\n*** Update File: a.txt\n@@\n nonexistent line\n-two\n+TWO\n*** End Patch";
        let err = apply(dir.path(), patch, true).await.unwrap_err();
        assert!(matches!(err, Error::PatchMismatch { .. }));
        let content = tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap();
        assert_eq!(content, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn fuzzy_match_tolerates_whitespace_differences() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "  one\ntwo  \nthree\n").await.unwrap();
        let patch = "*** Begin Patch\n*** Update File: a.txt\n@@\n one\n-two\n+TWO\n three\n*** End Patch";
        apply(dir.path(), patch, true).await.unwrap();
        let content = tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap();
        assert!(content.contains("TWO"));
    }

    #[tokio::test]
    async fn move_to_renames_file_after_patching() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("old.txt"), "one\ntwo\n").await.unwrap();
        let patch = "*** Begin Patch\n*** Update File: old.txt\n*** Move to: new.txt\n@@\n one\n-two\n+TWO\n*** End Patch";
        apply(dir.path(), patch, true).await.unwrap();
        assert!(!dir.path().join("old.txt").exists());
        let content = tokio::fs::read_to_string(dir.path().join("new.txt")).await.unwrap();
        assert_eq!(content, "one\nTWO\n");
    }
}
