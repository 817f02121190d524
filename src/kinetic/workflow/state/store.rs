// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::schema::{reduce, StateSchema};

/// Key-value state shared by every executor of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    fields: BTreeMap<String, Value>,
}

impl SharedState {
    /// Create a new SharedState seeded with the schema defaults
    pub fn new(schema: &StateSchema) -> Self {
        Self {
            fields: schema.initial_values(),
        }
    }

    /// Merge a value into a field using the field's reducer
    ///
    /// A value that does not match the field's declared type is dropped.
    pub fn apply(&mut self, schema: &StateSchema, key: &str, value: Value) {
        if !schema.accepts(key, &value) {
            log::warn!("Dropping write to state field '{}': {} does not match its type", key, value);
            return;
        }
        let reducer = schema.reducer_for(key);
        if let Some(reduced) = reduce(&reducer, self.fields.get(key), value) {
            self.fields.insert(key.to_string(), reduced);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// View of the shared state handed to one executor invocation
///
/// Reads see the state as of the start of the superstep plus the
/// invocation's own writes. Writes are buffered and only become visible to
/// other executors once the runner commits them after the superstep.
#[derive(Debug, Clone)]
pub struct StateScope {
    snapshot: Arc<SharedState>,
    schema: Arc<StateSchema>,
    writes: Arc<Mutex<Vec<(String, Value)>>>,
}

impl StateScope {
    pub fn new(snapshot: Arc<SharedState>, schema: Arc<StateSchema>) -> Self {
        Self {
            snapshot,
            schema,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scope over an empty state, used outside of a run
    pub fn empty() -> Self {
        Self::new(Arc::default(), Arc::default())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
        let mut value = self.snapshot.get(key).cloned();
        let reducer = self.schema.reducer_for(key);
        for (_, incoming) in writes.iter().filter(|(k, _)| k == key) {
            if let Some(reduced) = reduce(&reducer, value.as_ref(), incoming.clone()) {
                value = Some(reduced);
            }
        }
        value
    }

    /// Buffer a write; returns false and drops it when the value does not
    /// match the field's declared type
    pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if !self.schema.accepts(&key, &value) {
            log::warn!("Rejected write to state field '{}': {} does not match its type", key, value);
            return false;
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key, value));
        true
    }

    /// Drain the buffered writes in the order they were made
    pub fn take_writes(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.writes.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::workflow::state::schema::{FieldType, ReducerType, StateFieldDef};
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::default()
            .with_field(
                "count",
                StateFieldDef::new(FieldType::Number, ReducerType::Overwrite).with_default(json!(0)),
            )
            .with_field(
                "items",
                StateFieldDef::new(FieldType::Array, ReducerType::Append),
            )
    }

    #[test]
    fn test_state_with_defaults() {
        let state = SharedState::new(&schema());
        assert_eq!(state.get("count"), Some(&json!(0)));
        assert!(state.get("items").is_none());
    }

    #[test]
    fn test_apply_uses_field_reducer() {
        let schema = schema();
        let mut state = SharedState::new(&schema);

        state.apply(&schema, "items", json!("a"));
        state.apply(&schema, "items", json!("b"));
        state.apply(&schema, "count", json!(3));
        state.apply(&schema, "count", json!(4));

        assert_eq!(state.get("items"), Some(&json!(["a", "b"])));
        assert_eq!(state.get("count"), Some(&json!(4)));
    }

    #[test]
    fn test_apply_drops_mistyped_values() {
        let schema = schema();
        let mut state = SharedState::new(&schema);

        state.apply(&schema, "count", json!("many"));
        state.apply(&schema, "free_form", json!("anything"));

        assert_eq!(state.get("count"), Some(&json!(0)));
        assert_eq!(state.get("free_form"), Some(&json!("anything")));
    }

    #[test]
    fn test_scope_rejects_mistyped_write() {
        let schema = Arc::new(schema());
        let scope = StateScope::new(Arc::new(SharedState::new(&schema)), schema);

        assert!(!scope.set("count", json!("many")));
        assert!(scope.set("count", json!(2)));
        assert!(scope.set("items", json!("single")));

        assert_eq!(scope.get("count"), Some(json!(2)));
        assert_eq!(
            scope.take_writes(),
            vec![
                ("count".to_string(), json!(2)),
                ("items".to_string(), json!("single"))
            ]
        );
    }

    #[test]
    fn test_scope_reads_own_writes_only() {
        let schema = Arc::new(schema());
        let snapshot = Arc::new(SharedState::new(&schema));
        let first = StateScope::new(snapshot.clone(), schema.clone());
        let second = StateScope::new(snapshot, schema);

        first.set("items", json!("x"));
        first.set("items", json!("y"));

        assert_eq!(first.get("items"), Some(json!(["x", "y"])));
        assert_eq!(second.get("items"), None);
        assert_eq!(second.get("count"), Some(json!(0)));
    }

    #[test]
    fn test_take_writes_preserves_order() {
        let scope = StateScope::empty();
        scope.set("k", json!(1));
        scope.set("k", json!(2));

        let writes = scope.take_writes();
        assert_eq!(
            writes,
            vec![("k".to_string(), json!(1)), ("k".to_string(), json!(2))]
        );
        assert!(scope.take_writes().is_empty());
    }
}
