//! Node and database configuration entities.
//!
//! These mirror what the host stores in its flow definition. Field names
//! follow the host's camelCase convention.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use pgmulti_core::config::{DEFAULT_HOST, DEFAULT_PORT};
use pgmulti_core::{CompletionMode, ConnectionConfig, ContextStore, NodeError, PoolSettings, TlsMode};

use crate::credentials::Credentials;
use crate::field::{raw_text, value_as_text, FieldType};

/// Host type name of the database configuration entity
pub const CONFIG_NODE_TYPE: &str = "postgresdb";

/// Host type name of the query node
pub const NODE_TYPE: &str = "postgres";

/// TLS setting as stored by the editor: a checkbox, or an explicit mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SslSetting {
    /// `true` requires TLS, `false` disables it
    Flag(bool),
    /// Explicit mode
    Mode(TlsMode),
}

impl Default for SslSetting {
    fn default() -> Self {
        SslSetting::Flag(false)
    }
}

impl From<SslSetting> for TlsMode {
    fn from(setting: SslSetting) -> Self {
        match setting {
            SslSetting::Flag(flag) => TlsMode::from(flag),
            SslSetting::Mode(mode) => mode,
        }
    }
}

/// Database configuration entity shared by query nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfigEntity {
    /// Entity id, referenced by query nodes
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Server host
    #[serde(default)]
    pub hostname: Option<Value>,
    /// Source of `hostname`
    #[serde(default)]
    pub host_field_type: FieldType,

    /// Server port
    #[serde(default)]
    pub port: Option<Value>,
    /// Source of `port`
    #[serde(default)]
    pub port_field_type: FieldType,

    /// Database name
    #[serde(default)]
    pub db: Option<Value>,
    /// Source of `db`
    #[serde(default)]
    pub db_field_type: FieldType,

    /// Login role
    #[serde(default)]
    pub user: Option<Value>,
    /// Source of `user`
    #[serde(default)]
    pub user_field_type: FieldType,

    /// Password
    #[serde(default)]
    pub password: Option<Value>,
    /// Source of `password`
    #[serde(default)]
    pub password_field_type: FieldType,

    /// TLS setting
    #[serde(default)]
    pub ssl: SslSetting,

    /// Pool size override
    #[serde(default)]
    pub max_connections: Option<u32>,

    /// Acquire timeout override, in milliseconds
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,

    /// Idle timeout override, in milliseconds
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

impl DatabaseConfigEntity {
    /// Resolve every field into an immutable connection configuration
    ///
    /// `credentials` fill in the user and password when the entity leaves
    /// them empty.
    pub fn resolve(
        &self,
        context: &dyn ContextStore,
        credentials: Option<&Credentials>,
    ) -> Result<ConnectionConfig, NodeError> {
        let host = resolve_text(&self.hostname, self.host_field_type, context)?
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match resolve_field(&self.port, self.port_field_type, context)? {
            Some(value) => parse_port(&value)?,
            None => DEFAULT_PORT,
        };

        let database = resolve_text(&self.db, self.db_field_type, context)?;

        let user = resolve_text(&self.user, self.user_field_type, context)?
            .or_else(|| credentials.and_then(|c| c.user.clone()));

        let password = resolve_text(&self.password, self.password_field_type, context)?
            .or_else(|| credentials.and_then(|c| c.password.clone()));

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            acquire_timeout: self
                .acquire_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: self
                .idle_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_timeout),
        };
        if pool.max_connections == 0 {
            return Err(NodeError::Configuration(
                "maxConnections must be at least 1".to_string(),
            ));
        }

        let config = ConnectionConfig {
            host,
            port,
            database,
            user,
            password,
            tls: self.ssl.into(),
            pool,
        };
        debug!(entity = %self.id, config = ?config, "Resolved database configuration");
        Ok(config)
    }
}

fn resolve_field(
    raw: &Option<Value>,
    field_type: FieldType,
    context: &dyn ContextStore,
) -> Result<Option<Value>, NodeError> {
    match raw.as_ref().and_then(raw_text) {
        Some(text) => field_type.resolve(&text, context),
        None => Ok(None),
    }
}

fn resolve_text(
    raw: &Option<Value>,
    field_type: FieldType,
    context: &dyn ContextStore,
) -> Result<Option<String>, NodeError> {
    Ok(value_as_text(resolve_field(raw, field_type, context)?))
}

fn parse_port(value: &Value) -> Result<u16, NodeError> {
    let invalid = || NodeError::Configuration(format!("invalid port: {}", value));
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()).ok_or_else(invalid),
        Value::String(s) if s.trim().is_empty() => Ok(DEFAULT_PORT),
        Value::String(s) => crate::field::parse_leading_int(s)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Database configuration entities known to the host, by id
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    entities: HashMap<String, DatabaseConfigEntity>,
}

impl ConfigRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity under its id
    pub fn register(&mut self, entity: DatabaseConfigEntity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Look up an entity
    pub fn get(&self, id: &str) -> Option<&DatabaseConfigEntity> {
        self.entities.get(id)
    }
}

impl FromIterator<DatabaseConfigEntity> for ConfigRegistry {
    fn from_iter<I: IntoIterator<Item = DatabaseConfigEntity>>(iter: I) -> Self {
        let mut registry = Self::new();
        for entity in iter {
            registry.register(entity);
        }
        registry
    }
}

/// Definition of one query node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Node id
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Id of the database configuration entity
    #[serde(default)]
    pub postgresdb: Option<String>,

    /// Whether result messages are emitted
    #[serde(default)]
    pub output: bool,

    /// Completion signalling after setup failures
    #[serde(default)]
    pub completion: CompletionMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgmulti_core::InMemoryContextStore;
    use serde_json::json;

    fn entity(value: Value) -> DatabaseConfigEntity {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_literal_entity() {
        let entity = entity(json!({
            "id": "db1",
            "type": "postgresdb",
            "hostname": "db.internal",
            "hostFieldType": "str",
            "port": "6543",
            "portFieldType": "num",
            "db": "orders",
            "dbFieldType": "str",
            "user": "app",
            "userFieldType": "str",
            "password": "secret",
            "passwordFieldType": "str",
            "ssl": true
        }));

        let config = entity.resolve(&InMemoryContextStore::new(), None).unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.database.as_deref(), Some("orders"));
        assert_eq!(config.user.as_deref(), Some("app"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.tls, TlsMode::Require);
        assert_eq!(config.pool, PoolSettings::default());
    }

    #[test]
    fn test_context_resolved_entity() {
        let context = InMemoryContextStore::new()
            .with_flow("pg_host", json!("flow-db"))
            .with_global("pg_port", json!(5433))
            .with_global("pg_db", json!("analytics"));
        std::env::set_var("PGMULTI_CONFIG_TEST_USER", "env-user");

        let entity = entity(json!({
            "id": "db1",
            "hostname": "pg_host",
            "hostFieldType": "flow",
            "port": "pg_port",
            "portFieldType": "global",
            "db": "pg_db",
            "dbFieldType": "global",
            "user": "PGMULTI_CONFIG_TEST_USER",
            "userFieldType": "env"
        }));

        let config = entity.resolve(&context, None).unwrap();
        assert_eq!(config.host, "flow-db");
        assert_eq!(config.port, 5433);
        assert_eq!(config.database.as_deref(), Some("analytics"));
        assert_eq!(config.user.as_deref(), Some("env-user"));
        assert_eq!(config.password, None);
        assert_eq!(config.tls, TlsMode::Disable);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let entity = entity(json!({"id": "db1", "hostname": "", "port": ""}));
        let config = entity.resolve(&InMemoryContextStore::new(), None).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, None);
    }

    #[test]
    fn test_missing_lookup_uses_default() {
        let entity = entity(json!({"id": "db1", "hostname": "nope", "hostFieldType": "global"}));
        let config = entity.resolve(&InMemoryContextStore::new(), None).unwrap();
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn test_credentials_fill_empty_fields() {
        let entity = entity(json!({"id": "db1", "user": "", "password": ""}));
        let credentials = Credentials {
            user: Some("stored-user".to_string()),
            password: Some("stored-pw".to_string()),
        };
        let config = entity.resolve(&InMemoryContextStore::new(), Some(&credentials)).unwrap();
        assert_eq!(config.user.as_deref(), Some("stored-user"));
        assert_eq!(config.password.as_deref(), Some("stored-pw"));

        let entity = entity_with_user();
        let config = entity.resolve(&InMemoryContextStore::new(), Some(&credentials)).unwrap();
        assert_eq!(config.user.as_deref(), Some("literal-user"));
    }

    fn entity_with_user() -> DatabaseConfigEntity {
        entity(json!({"id": "db1", "user": "literal-user"}))
    }

    #[test]
    fn test_invalid_port() {
        for port in [json!("99999"), json!("http"), json!(-1)] {
            let entity = entity(json!({"id": "db1", "port": port}));
            let err = entity.resolve(&InMemoryContextStore::new(), None).unwrap_err();
            assert!(matches!(err, NodeError::Configuration(_)), "port {:?}", port);
        }
    }

    #[test]
    fn test_numeric_port_literal() {
        let entity = entity(json!({"id": "db1", "port": 5434}));
        let config = entity.resolve(&InMemoryContextStore::new(), None).unwrap();
        assert_eq!(config.port, 5434);
    }

    #[test]
    fn test_ssl_modes() {
        let entity = entity(json!({"id": "db1", "ssl": "prefer"}));
        assert_eq!(entity.resolve(&InMemoryContextStore::new(), None).unwrap().tls, TlsMode::Prefer);
    }

    #[test]
    fn test_pool_overrides() {
        let entity = entity(json!({
            "id": "db1",
            "maxConnections": 3,
            "acquireTimeoutMs": 1500,
            "idleTimeoutMs": 2000
        }));
        let config = entity.resolve(&InMemoryContextStore::new(), None).unwrap();
        assert_eq!(config.pool.max_connections, 3);
        assert_eq!(config.pool.acquire_timeout, Duration::from_millis(1500));
        assert_eq!(config.pool.idle_timeout, Duration::from_millis(2000));

        let empty_pool: DatabaseConfigEntity =
            serde_json::from_value(json!({"id": "db1", "maxConnections": 0})).unwrap();
        assert!(empty_pool.resolve(&InMemoryContextStore::new(), None).is_err());
    }

    #[test]
    fn test_registry_and_node_definition() {
        let registry: ConfigRegistry = vec![entity(json!({"id": "db1"}))].into_iter().collect();
        assert!(registry.get("db1").is_some());
        assert!(registry.get("db2").is_none());

        let node: NodeDefinition = serde_json::from_value(json!({
            "id": "n1",
            "type": "postgres",
            "postgresdb": "db1",
            "output": true
        }))
        .unwrap();
        assert_eq!(node.postgresdb.as_deref(), Some("db1"));
        assert!(node.output);
        assert_eq!(node.completion, CompletionMode::SkipOnSetupFailure);
    }
}
