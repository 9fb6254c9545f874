//! The PostgreSQL batch node.

use std::sync::Arc;
use tracing::info;

use pgmulti_core::{ConnectionPool, ContextStore, Message, NodeError, NodeHost};
use pgmulti_postgres::PostgresPool;

use crate::config::{ConfigRegistry, NodeDefinition};
use crate::credentials::CredentialStore;
use crate::executor::BatchExecutor;

/// One configured query node
///
/// Owns the connection pool for its database target for its whole
/// lifetime. Messages may be handled concurrently; each one checks out its
/// own connection.
pub struct PostgresNode {
    definition: NodeDefinition,
    executor: BatchExecutor,
}

impl PostgresNode {
    /// Build a node from its definition
    ///
    /// Resolves the referenced configuration entity and creates the pool.
    /// No connection is opened until the first message arrives. Fails with
    /// [`NodeError::ConfigurationMissing`] when the definition references no
    /// known entity. Must be called from within a Tokio runtime.
    pub fn new(
        definition: NodeDefinition,
        registry: &ConfigRegistry,
        context: &dyn ContextStore,
        credentials: &dyn CredentialStore,
    ) -> Result<Self, NodeError> {
        let entity = definition
            .postgresdb
            .as_deref()
            .and_then(|id| registry.get(id))
            .ok_or_else(|| {
                NodeError::ConfigurationMissing("missing postgres configuration".to_string())
            })?;

        let stored = credentials.get(&entity.id);
        let config = entity.resolve(context, stored.as_ref())?;
        let pool = PostgresPool::new(&config);

        info!(node_id = %definition.id, target_db = %config.target(), "Created postgres node");
        Ok(Self::with_pool(definition, Arc::new(pool)))
    }

    /// Build a node on an existing pool
    pub fn with_pool(definition: NodeDefinition, pool: Arc<dyn ConnectionPool>) -> Self {
        let executor = BatchExecutor::new(definition.id.clone(), pool)
            .with_output(definition.output)
            .with_completion(definition.completion);
        Self {
            definition,
            executor,
        }
    }

    /// Node id
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Node definition
    pub fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    /// Handle one inbound message
    pub async fn on_input(&self, msg: Message, host: &dyn NodeHost) {
        self.executor.process(msg, host).await
    }

    /// Close the pool; called when the host stops the node
    pub async fn close(&self) {
        info!(node_id = %self.definition.id, "Closing postgres node");
        self.executor.pool().close().await;
    }
}
