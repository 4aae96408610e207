//! Todo item model and the invariants the Todo Operations tool enforces at
//! write time: at most one `in-progress` item, `blocked` requires a reason,
//! and `dependencies` must reference existing ids and form a DAG.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

/// A violated invariant found while validating a proposed todo list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoValidationError {
    MultipleInProgress(Vec<u64>),
    BlockedWithoutReason(u64),
    UnknownDependency { id: u64, missing: u64 },
    DependencyCycle(Vec<u64>),
    ProgressOutOfRange { id: u64, progress: String },
}

impl std::fmt::Display for TodoValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleInProgress(ids) => {
                write!(f, "more than one todo is in-progress: {ids:?}")
            }
            Self::BlockedWithoutReason(id) => {
                write!(f, "todo {id} is blocked but has no blocked_reason")
            }
            Self::UnknownDependency { id, missing } => {
                write!(f, "todo {id} depends on unknown todo {missing}")
            }
            Self::DependencyCycle(cycle) => {
                write!(f, "dependency cycle: {cycle:?}")
            }
            Self::ProgressOutOfRange { id, progress } => {
                write!(f, "todo {id} has progress {progress} outside [0,1]")
            }
        }
    }
}

/// Validate a full todo list against the write-time invariants: at most
/// one in-progress item, blocked items carry a reason, dependencies
/// reference existing ids and form a DAG, and progress stays in [0,1].
/// Called by the write path before persisting.
pub fn validate_todos(items: &[TodoItem]) -> Vec<TodoValidationError> {
    let mut errors = Vec::new();

    let in_progress: Vec<u64> = items
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress)
        .map(|t| t.id)
        .collect();
    if in_progress.len() > 1 {
        errors.push(TodoValidationError::MultipleInProgress(in_progress));
    }

    for item in items {
        if item.status == TodoStatus::Blocked
            && item
                .blocked_reason
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            errors.push(TodoValidationError::BlockedWithoutReason(item.id));
        }

        if let Some(p) = item.progress {
            if !(0.0..=1.0).contains(&p) {
                errors.push(TodoValidationError::ProgressOutOfRange {
                    id: item.id,
                    progress: p.to_string(),
                });
            }
        }
    }

    let known: HashSet<u64> = items.iter().map(|t| t.id).collect();
    for item in items {
        for dep in &item.dependencies {
            if !known.contains(dep) {
                errors.push(TodoValidationError::UnknownDependency {
                    id: item.id,
                    missing: *dep,
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(items) {
        errors.push(TodoValidationError::DependencyCycle(cycle));
    }

    errors
}

/// DFS-based cycle detection over the dependency graph (edges: item -> dep).
fn find_cycle(items: &[TodoItem]) -> Option<Vec<u64>> {
    let graph: HashMap<u64, &[u64]> = items
        .iter()
        .map(|t| (t.id, t.dependencies.as_slice()))
        .collect();

    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<u64, Mark> = HashMap::new();
    let mut stack: Vec<u64> = Vec::new();

    fn visit(
        node: u64,
        graph: &HashMap<u64, &[u64]>,
        marks: &mut HashMap<u64, Mark>,
        stack: &mut Vec<u64>,
    ) -> Option<Vec<u64>> {
        if let Some(Mark::Done) = marks.get(&node) {
            return None;
        }
        if let Some(Mark::Visiting) = marks.get(&node) {
            let start = stack.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle = stack[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(deps) = graph.get(&node) {
            for &dep in *deps {
                if let Some(cycle) = visit(dep, graph, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    for &id in graph.keys() {
        if let Some(cycle) = visit(id, &graph, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, status: TodoStatus) -> TodoItem {
        TodoItem {
            id,
            title: format!("task {id}"),
            description: String::new(),
            status,
            priority: None,
            dependencies: Vec::new(),
            progress: None,
            blocked_reason: None,
        }
    }

    #[test]
    fn single_in_progress_is_valid() {
        let items = vec![
            item(1, TodoStatus::InProgress),
            item(2, TodoStatus::NotStarted),
        ];
        assert!(validate_todos(&items).is_empty());
    }

    #[test]
    fn two_in_progress_is_invalid() {
        let items = vec![item(1, TodoStatus::InProgress), item(2, TodoStatus::InProgress)];
        let errors = validate_todos(&items);
        assert!(matches!(errors[0], TodoValidationError::MultipleInProgress(_)));
    }

    #[test]
    fn blocked_without_reason_is_invalid() {
        let items = vec![item(1, TodoStatus::Blocked)];
        let errors = validate_todos(&items);
        assert_eq!(errors, vec![TodoValidationError::BlockedWithoutReason(1)]);
    }

    #[test]
    fn blocked_with_reason_is_valid() {
        let mut t = item(1, TodoStatus::Blocked);
        t.blocked_reason = Some("waiting on review".into());
        assert!(validate_todos(&[t]).is_empty());
    }

    #[test]
    fn unknown_dependency_is_invalid() {
        let mut t = item(1, TodoStatus::NotStarted);
        t.dependencies = vec![99];
        let errors = validate_todos(&[t]);
        assert_eq!(
            errors,
            vec![TodoValidationError::UnknownDependency { id: 1, missing: 99 }]
        );
    }

    #[test]
    fn self_cycle_detected() {
        let mut t = item(1, TodoStatus::NotStarted);
        t.dependencies = vec![1];
        let errors = validate_todos(&[t]);
        assert!(errors.iter().any(|e| matches!(e, TodoValidationError::DependencyCycle(_))));
    }

    #[test]
    fn mutual_cycle_detected() {
        let mut a = item(1, TodoStatus::NotStarted);
        a.dependencies = vec![2];
        let mut b = item(2, TodoStatus::NotStarted);
        b.dependencies = vec![1];
        let errors = validate_todos(&[a, b]);
        assert!(errors.iter().any(|e| matches!(e, TodoValidationError::DependencyCycle(_))));
    }

    #[test]
    fn progress_out_of_range_is_invalid() {
        let mut t = item(1, TodoStatus::NotStarted);
        t.progress = Some(1.5);
        let errors = validate_todos(&[t]);
        assert!(matches!(errors[0], TodoValidationError::ProgressOutOfRange { .. }));
    }

    #[test]
    fn dag_without_cycle_is_valid() {
        let mut a = item(1, TodoStatus::NotStarted);
        let mut b = item(2, TodoStatus::NotStarted);
        b.dependencies = vec![1];
        a.dependencies = vec![];
        assert!(validate_todos(&[a, b]).is_empty());
    }
}
