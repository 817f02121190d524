// SPDX-License-Identifier: MIT

//! Name lookup for the tools and agents a workflow file refers to

use crate::adk::agent::Agent;
use crate::adk::tool::Tool;
use crate::kinetic::tools::builtin;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Anything a workflow file can address by name
pub trait Named: Send + Sync {
    fn key(&self) -> &str;
}

impl Named for dyn Tool {
    fn key(&self) -> &str {
        self.name()
    }
}

impl Named for dyn Agent {
    fn key(&self) -> &str {
        self.name()
    }
}

/// Shared, cloneable map from name to implementation. Clones see each
/// other's registrations; a later registration under the same name wins.
pub struct Registry<T: ?Sized> {
    entries: Arc<RwLock<HashMap<String, Arc<T>>>>,
}

pub type ToolRegistry = Registry<dyn Tool>;
pub type AgentRegistry = Registry<dyn Agent>;

impl<T: Named + ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, entry: Arc<T>) {
        let name = entry.key().to_string();
        if self.entries.write().await.insert(name.clone(), entry).is_some() {
            log::debug!("Replaced registration '{}'", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().await.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ToolRegistry {
    /// Registry holding every built-in function tool
    pub async fn with_builtins() -> Self {
        let registry = Self::new();
        for tool in builtin::all() {
            registry.register(tool).await;
        }
        registry
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Named + ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::tool::{FnTool, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::error::Error;

    fn constant(name: &str, value: Value) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, move |_input: Value, _ctx| {
            let value = value.clone();
            async move { ToolResult::Ok(value) }
        }))
    }

    struct Critic;

    #[async_trait]
    impl Agent for Critic {
        fn name(&self) -> &str {
            "critic"
        }

        async fn run(&self, input: String) -> Result<String, Box<dyn Error + Send + Sync>> {
            Ok(format!("{} (reviewed)", input))
        }
    }

    #[tokio::test]
    async fn test_lookup_by_name() {
        let tools = ToolRegistry::new();
        tools.register(constant("score", json!(3))).await;

        assert_eq!(tools.get("score").await.map(|t| t.name().to_string()), Some("score".into()));
        assert!(tools.get("grade").await.is_none());
    }

    #[tokio::test]
    async fn test_reregistering_replaces() {
        let tools = ToolRegistry::new();
        tools.register(constant("score", json!(1))).await;
        tools.register(constant("score", json!(2))).await;

        assert_eq!(tools.names().await, vec!["score"]);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let tools = ToolRegistry::default();
        let handle = tools.clone();
        handle.register(constant("late", Value::Null)).await;

        assert!(tools.get("late").await.is_some());
    }

    #[tokio::test]
    async fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins().await;
        assert_eq!(
            registry.names().await,
            vec!["echo", "join", "set_state", "uppercase"]
        );
    }

    #[tokio::test]
    async fn test_agent_lookup() {
        let agents = AgentRegistry::new();
        agents.register(Arc::new(Critic)).await;

        let critic = agents.get("critic").await.unwrap();
        assert_eq!(critic.run("draft".into()).await.unwrap(), "draft (reviewed)");
        assert!(agents.get("writer").await.is_none());
    }
}
