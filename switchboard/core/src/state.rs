//! Shared State
//!
//! Namespaced key/value store that subsystems use to publish small pieces
//! of runtime state for each other (the router records its last fallback
//! under `ai/last_fallback`). Namespaces keep engines, plugins and servers
//! from stepping on each other's keys.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Namespace used by the routing layer
pub const AI_NAMESPACE: &str = "ai";

/// Key under [`AI_NAMESPACE`] holding the last fallback engine id
pub const LAST_FALLBACK_KEY: &str = "last_fallback";

/// Namespaced key/value store
#[derive(Debug, Default)]
pub struct SharedState {
    inner: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl SharedState {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value
    #[must_use]
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.inner
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
    }

    /// Write a value, replacing any previous one
    pub fn set(&self, namespace: &str, key: &str, value: impl Into<Value>) {
        self.inner
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Remove a value; returns it if present
    pub fn delete(&self, namespace: &str, key: &str) -> Option<Value> {
        self.inner
            .write()
            .get_mut(namespace)
            .and_then(|ns| ns.remove(key))
    }

    /// Remove a whole namespace
    pub fn clear_namespace(&self, namespace: &str) {
        self.inner.write().remove(namespace);
    }

    /// Copy of one namespace (empty if it does not exist)
    #[must_use]
    pub fn snapshot(&self, namespace: &str) -> Map<String, Value> {
        self.inner
            .read()
            .get(namespace)
            .map(|ns| ns.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_namespaces_are_isolated() {
        let state = SharedState::new();
        state.set("ai", "last_fallback", "openai");
        state.set("plugins", "last_fallback", 3);

        assert_eq!(state.get("ai", "last_fallback"), Some(json!("openai")));
        assert_eq!(state.get("plugins", "last_fallback"), Some(json!(3)));
        assert_eq!(state.get("servers", "last_fallback"), None);
    }

    #[test]
    fn test_delete_and_clear() {
        let state = SharedState::new();
        state.set("ai", "a", true);
        state.set("ai", "b", false);

        assert_eq!(state.delete("ai", "a"), Some(json!(true)));
        assert_eq!(state.delete("ai", "a"), None);

        state.clear_namespace("ai");
        assert!(state.snapshot("ai").is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let state = SharedState::new();
        state.set("ai", "k", "v1");
        let snap = state.snapshot("ai");
        state.set("ai", "k", "v2");
        assert_eq!(snap["k"], json!("v1"));
    }
}
