//! Flow and global context lookups provided by the host.

use dashmap::DashMap;
use serde_json::Value;

/// Which context a lookup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextScope {
    /// Variables shared by the nodes of one flow
    Flow,
    /// Variables shared by every flow
    Global,
}

/// Read access to the host's context variables
pub trait ContextStore: Send + Sync {
    /// Look up a variable
    fn get(&self, scope: ContextScope, key: &str) -> Option<Value>;
}

/// Context store backed by concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    values: DashMap<(ContextScope, String), Value>,
}

impl InMemoryContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set(&self, scope: ContextScope, key: impl Into<String>, value: Value) {
        self.values.insert((scope, key.into()), value);
    }

    /// Builder-style [`set`](Self::set) for the flow scope
    pub fn with_flow(self, key: impl Into<String>, value: Value) -> Self {
        self.set(ContextScope::Flow, key, value);
        self
    }

    /// Builder-style [`set`](Self::set) for the global scope
    pub fn with_global(self, key: impl Into<String>, value: Value) -> Self {
        self.set(ContextScope::Global, key, value);
        self
    }
}

impl ContextStore for InMemoryContextStore {
    fn get(&self, scope: ContextScope, key: &str) -> Option<Value> {
        self.values
            .get(&(scope, key.to_string()))
            .map(|entry| entry.value().clone())
    }
}
