//! Todo operations tool: read/write/update/add
//! against the session's todo list, enforcing the write-time invariants in
//! `agentrt_domain::todo` before ever persisting a proposed change.

use agentrt_domain::error::{Error, Result};
use agentrt_domain::todo::{validate_todos, TodoItem};
use agentrt_sessions::SessionStore;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TodoOperation {
    Read,
    Write { items: Vec<TodoItem> },
    Update { id: u64, #[serde(flatten)] patch: TodoPatch },
    Add { item: TodoItem },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<agentrt_domain::todo::TodoStatus>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

pub async fn handle(store: &SessionStore, session_id: &str, op: TodoOperation) -> Result<Value> {
    match op {
        TodoOperation::Read => read(store, session_id).await,
        TodoOperation::Write { items } => write_all(store, session_id, items).await,
        TodoOperation::Update { id, patch } => update_one(store, session_id, id, patch).await,
        TodoOperation::Add { item } => add_one(store, session_id, item).await,
    }
}

async fn load(store: &SessionStore, session_id: &str) -> Result<agentrt_domain::session::Session> {
    store
        .load(session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session '{session_id}'")))
}

async fn read(store: &SessionStore, session_id: &str) -> Result<Value> {
    let session = load(store, session_id).await?;
    Ok(serde_json::json!({ "todos": session.todos }))
}

fn validate_or_error(items: &[TodoItem]) -> Result<()> {
    let errors = validate_todos(items);
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::InvalidInput(
        errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "),
    ))
}

async fn write_all(store: &SessionStore, session_id: &str, items: Vec<TodoItem>) -> Result<Value> {
    validate_or_error(&items)?;
    let mut session = load(store, session_id).await?;
    session.todos = items;
    store.save(&mut session).await?;
    Ok(serde_json::json!({ "todos": session.todos }))
}

async fn update_one(store: &SessionStore, session_id: &str, id: u64, patch: TodoPatch) -> Result<Value> {
    let mut session = load(store, session_id).await?;
    let mut items = session.todos.clone();
    let item = items
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| Error::NotFound(format!("todo '{id}'")))?;

    if let Some(title) = patch.title {
        item.title = title;
    }
    if let Some(description) = patch.description {
        item.description = description;
    }
    if let Some(status) = patch.status {
        item.status = status;
    }
    if patch.priority.is_some() {
        item.priority = patch.priority;
    }
    if let Some(progress) = patch.progress {
        item.progress = Some(progress);
    }
    if patch.blocked_reason.is_some() {
        item.blocked_reason = patch.blocked_reason;
    }

    validate_or_error(&items)?;
    session.todos = items;
    store.save(&mut session).await?;
    Ok(serde_json::json!({ "todos": session.todos }))
}

async fn add_one(store: &SessionStore, session_id: &str, item: TodoItem) -> Result<Value> {
    let mut session = load(store, session_id).await?;
    let mut items = session.todos.clone();
    if items.iter().any(|t| t.id == item.id) {
        return Err(Error::InvalidInput(format!("todo id {} already exists", item.id)));
    }
    items.push(item);
    validate_or_error(&items)?;
    session.todos = items;
    store.save(&mut session).await?;
    Ok(serde_json::json!({ "todos": session.todos }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrt_domain::session::Session;
    use agentrt_domain::todo::TodoStatus;
    use tempfile::TempDir;

    fn new_item(id: u64, status: TodoStatus) -> TodoItem {
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

    async fn seeded_store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let mut session = Session::new("s1", "/tmp");
        store.save(&mut session).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_then_read_roundtrips() {
        let (_dir, store) = seeded_store().await;
        handle(&store, "s1", TodoOperation::Add { item: new_item(1, TodoStatus::NotStarted) }).await.unwrap();
        let result = handle(&store, "s1", TodoOperation::Read).await.unwrap();
        assert_eq!(result["todos"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_rejects_two_in_progress() {
        let (_dir, store) = seeded_store().await;
        let items = vec![new_item(1, TodoStatus::InProgress), new_item(2, TodoStatus::InProgress)];
        let err = handle(&store, "s1", TodoOperation::Write { items }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (_dir, store) = seeded_store().await;
        let err = handle(
            &store,
            "s1",
            TodoOperation::Update { id: 99, patch: TodoPatch::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn update_to_blocked_without_reason_is_rejected() {
        let (_dir, store) = seeded_store().await;
        handle(&store, "s1", TodoOperation::Add { item: new_item(1, TodoStatus::NotStarted) }).await.unwrap();
        let patch = TodoPatch { status: Some(TodoStatus::Blocked), ..Default::default() };
        let err = handle(&store, "s1", TodoOperation::Update { id: 1, patch }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn add_duplicate_id_is_rejected() {
        let (_dir, store) = seeded_store().await;
        handle(&store, "s1", TodoOperation::Add { item: new_item(1, TodoStatus::NotStarted) }).await.unwrap();
        let err = handle(&store, "s1", TodoOperation::Add { item: new_item(1, TodoStatus::NotStarted) }).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
