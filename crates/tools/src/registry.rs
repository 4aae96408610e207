//! Tool Registry: tools in insertion order, keyed by name,
//! with a schema-export cache that only invalidates on mutation so the
//! system-prompt tool menu stays byte-stable across turns (provider
//! prompt-caching relies on this).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::tool_trait::Tool;

#[derive(Default)]
struct SchemaCache {
    schemas: Option<Vec<Value>>,
}

pub struct ToolRegistry {
    order: Vec<String>,
    by_name: HashMap<String, Arc<dyn Tool>>,
    cache: RwLock<SchemaCache>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { order: Vec::new(), by_name: HashMap::new(), cache: RwLock::new(SchemaCache::default()) }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.by_name.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.by_name.insert(name, tool);
        self.cache.write().schemas = None;
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        if self.by_name.remove(name).is_some() {
            self.order.retain(|n| n != name);
            self.cache.write().schemas = None;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_name.clear();
        self.cache.write().schemas = None;
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).cloned()
    }

    /// Tools in registration order — the order the system prompt's tool
    /// menu and the provider's tool-schema array both present them in.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.order.iter().filter_map(|n| self.by_name.get(n).cloned()).collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// `{name, description, parameters}` per tool, cached until the next
    /// register/unregister/clear.
    pub fn schema_export(&self) -> Vec<Value> {
        if let Some(cached) = &self.cache.read().schemas {
            return cached.clone();
        }
        let schemas: Vec<Value> = self.list().iter().map(|t| t.schema()).collect();
        self.cache.write().schemas = Some(schemas.clone());
        schemas
    }

    /// One line per tool: name plus its supported operations, for the
    /// system prompt's tool menu (descriptions only, not full schemas).
    pub fn menu(&self) -> String {
        self.list()
            .iter()
            .map(|t| format!("- {}: {} (operations: {})", t.name(), t.description(), t.operations().join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_trait::{ToolContext, ToolFlags};
    use agentrt_domain::error::Result;
    use agentrt_domain::tool_result::ToolResult;
    use async_trait::async_trait;

    struct Dummy(&'static str);

    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> &'static str {
            self.0
        }
        fn description(&self) -> &'static str {
            "a dummy tool"
        }
        fn operations(&self) -> &'static [&'static str] {
            &["noop"]
        }
        fn flags(&self) -> ToolFlags {
            ToolFlags::default()
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::ok(self.0, "noop", ""))
        }
    }

    #[test]
    fn preserves_insertion_order() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(Dummy("b")));
        reg.register(Arc::new(Dummy("a")));
        assert_eq!(reg.names(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn schema_export_is_cached_until_mutation() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(Dummy("a")));
        let first = reg.schema_export();
        let second = reg.schema_export();
        assert_eq!(first, second);
        reg.register(Arc::new(Dummy("b")));
        assert_eq!(reg.schema_export().len(), 2);
    }

    #[test]
    fn unregister_removes_from_order_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(Dummy("a")));
        assert!(reg.unregister("a"));
        assert!(reg.lookup("a").is_none());
        assert!(reg.names().is_empty());
    }
}
