//! Mock implementation of the ContextStore trait.

use mockall::mock;
use pgmulti_core::{ContextScope, ContextStore};
use serde_json::Value;

// Generate the mock implementation for ContextStore
mock! {
    pub ContextStore {}

    impl ContextStore for ContextStore {
        fn get(&self, scope: ContextScope, key: &str) -> Option<Value>;
    }
}
