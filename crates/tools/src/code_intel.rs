//! Code intelligence tool: find symbol usages and search commit history by
//! keyword relevance.

use std::path::Path;

use agentrt_domain::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CodeIntelOperation {
    ListUsages {
        symbol: String,
        #[serde(default)]
        paths: Option<Vec<String>>,
        #[serde(default)]
        context_lines: usize,
    },
    SearchHistory {
        query: String,
        #[serde(default)]
        max_results: Option<usize>,
        #[serde(default)]
        since: Option<String>,
        #[serde(default)]
        author: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub file: String,
    pub line_number: usize,
    pub line: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_after: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitHit {
    pub hash: String,
    pub author: String,
    pub date: String,
    pub subject: String,
    pub score: i32,
}

async fn is_git_repo(root: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(root)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub async fn handle(root: &Path, op: CodeIntelOperation) -> Result<Value> {
    match op {
        CodeIntelOperation::ListUsages { symbol, paths, context_lines } => {
            list_usages(root, &symbol, paths, context_lines).await
        }
        CodeIntelOperation::SearchHistory { query, max_results, since, author } => {
            search_history(root, &query, max_results, since, author).await
        }
    }
}

async fn list_usages(root: &Path, symbol: &str, paths: Option<Vec<String>>, context_lines: usize) -> Result<Value> {
    let mut usages = if is_git_repo(root).await {
        list_usages_via_git_grep(root, symbol, &paths).await?
    } else {
        list_usages_via_walk(root, symbol, &paths)?
    };
    if context_lines > 0 {
        attach_context(root, &mut usages, context_lines);
    }
    Ok(serde_json::json!({ "symbol": symbol, "usages": usages, "count": usages.len() }))
}

/// Slices `context_lines` lines of surrounding source around each usage,
/// re-reading each referenced file at most once.
fn attach_context(root: &Path, usages: &mut [Usage], context_lines: usize) {
    let mut cache: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    for usage in usages {
        let lines = cache.entry(usage.file.clone()).or_insert_with(|| {
            std::fs::read_to_string(root.join(&usage.file))
                .map(|content| content.lines().map(str::to_string).collect())
                .unwrap_or_default()
        });
        if lines.is_empty() || usage.line_number == 0 || usage.line_number > lines.len() {
            continue;
        }
        let idx = usage.line_number - 1;
        let before_start = idx.saturating_sub(context_lines);
        usage.context_before = lines[before_start..idx].to_vec();
        let after_end = (idx + 1 + context_lines).min(lines.len());
        usage.context_after = lines[idx + 1..after_end].to_vec();
    }
}

async fn list_usages_via_git_grep(root: &Path, symbol: &str, paths: &Option<Vec<String>>) -> Result<Vec<Usage>> {
    let mut args = vec!["grep", "-n", "-w", symbol];
    if let Some(p) = paths {
        args.push("--");
        for path in p {
            args.push(path.as_str());
        }
    }
    let output = Command::new("git")
        .args(&args)
        .current_dir(root)
        .output()
        .await
        .map_err(|e| Error::InvalidInput(format!("failed to run git grep: {e}")))?;

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(parse_grep_lines(&text))
}

fn parse_grep_lines(text: &str) -> Vec<Usage> {
    let mut usages = Vec::new();
    for line in text.lines() {
        let mut parts = line.splitn(3, ':');
        let (Some(file), Some(num), Some(content)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if let Ok(line_number) = num.parse() {
            usages.push(Usage {
                file: file.to_string(),
                line_number,
                line: content.to_string(),
                context_before: Vec::new(),
                context_after: Vec::new(),
            });
        }
    }
    usages
}

fn list_usages_via_walk(root: &Path, symbol: &str, paths: &Option<Vec<String>>) -> Result<Vec<Usage>> {
    let pattern = format!(r"\b{}\b", regex::escape(symbol));
    let re = Regex::new(&pattern).expect("escaped symbol pattern is always valid");
    let mut usages = Vec::new();

    let roots: Vec<std::path::PathBuf> = match paths {
        Some(p) if !p.is_empty() => p.iter().map(|s| root.join(s)).collect(),
        _ => vec![root.to_path_buf()],
    };

    for base in roots {
        let walker = ignore::WalkBuilder::new(&base).hidden(false).build();
        for entry in walker.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            for (i, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    usages.push(Usage {
                        file: rel.to_string_lossy().to_string(),
                        line_number: i + 1,
                        line: line.to_string(),
                        context_before: Vec::new(),
                        context_after: Vec::new(),
                    });
                }
            }
        }
    }
    Ok(usages)
}

/// Scores each commit: +3 per keyword found in the subject, +1 per keyword
/// in the body, a bonus for matching more than one keyword, and a bonus
/// when keyword coverage reaches at least 50%. Ties break by newer date.
async fn search_history(
    root: &Path,
    query: &str,
    max_results: Option<usize>,
    since: Option<String>,
    author: Option<String>,
) -> Result<Value> {
    let keywords: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
    if keywords.is_empty() {
        return Ok(serde_json::json!({ "query": query, "commits": [] }));
    }

    const SEP: &str = "\x1f";
    let format = format!("%H{SEP}%an{SEP}%ad{SEP}%s{SEP}%b\x1e");
    let mut args = vec!["log".to_string(), format!("--pretty=format:{format}"), "--date=short".to_string()];
    if let Some(s) = since {
        args.push(format!("--since={s}"));
    }
    if let Some(a) = author {
        args.push(format!("--author={a}"));
    }

    let output = Command::new("git")
        .args(&args)
        .current_dir(root)
        .output()
        .await
        .map_err(|e| Error::InvalidInput(format!("failed to run git log: {e}")))?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut hits: Vec<CommitHit> = Vec::new();
    for record in text.split('\x1e') {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, SEP);
        let (Some(hash), Some(author_name), Some(date), Some(rest)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let mut subject_body = rest.splitn(2, '\n');
        let subject = subject_body.next().unwrap_or("").to_string();
        let body = subject_body.next().unwrap_or("").to_string();

        let subject_lower = subject.to_lowercase();
        let body_lower = body.to_lowercase();

        let mut score = 0i32;
        let mut matched = 0usize;
        for kw in &keywords {
            let in_subject = subject_lower.contains(kw.as_str());
            let in_body = body_lower.contains(kw.as_str());
            if in_subject {
                score += 3;
            }
            if in_body {
                score += 1;
            }
            if in_subject || in_body {
                matched += 1;
            }
        }
        if matched == 0 {
            continue;
        }
        if matched > 1 {
            score += 2;
        }
        let coverage = matched as f64 / keywords.len() as f64;
        if coverage >= 0.5 {
            score += 1;
        }

        hits.push(CommitHit { hash: hash.to_string(), author: author_name.to_string(), date: date.to_string(), subject, score });
    }

    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.date.cmp(&a.date)));
    hits.truncate(max_results.unwrap_or(20));

    Ok(serde_json::json!({ "query": query, "commits": hits, "count": hits.len() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_grep_lines_splits_file_line_content() {
        let hits = parse_grep_lines("src/lib.rs:12:fn run_turn() {");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file, "src/lib.rs");
        assert_eq!(hits[0].line_number, 12);
    }

    #[test]
    fn list_usages_via_walk_finds_whole_word_matches_only() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn run_turn() {}\nfn run_turns() {}\n").unwrap();
        let usages = list_usages_via_walk(dir.path(), "run_turn", &None).unwrap();
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].line_number, 1);
    }

    #[test]
    fn attach_context_slices_surrounding_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "one\ntwo\nrun_turn();\nfour\nfive\n").unwrap();
        let mut usages = list_usages_via_walk(dir.path(), "run_turn", &None).unwrap();
        attach_context(dir.path(), &mut usages, 1);
        assert_eq!(usages[0].context_before, vec!["two".to_string()]);
        assert_eq!(usages[0].context_after, vec!["four".to_string()]);
    }
}
