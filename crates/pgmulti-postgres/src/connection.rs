use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode, PgTypeInfo};
use sqlx::{Either, Executor, PgPool, Postgres, Statement, TypeInfo};
use tracing::{debug, info, warn};

use pgmulti_core::{
    ConnectionConfig, ConnectionPool, NodeError, PoolStatus, PooledConnection, QueryParams, Row,
    StatementError, TlsMode,
};

use crate::bind::{ParamKind, PgParam};
use crate::named::{to_positional, PositionalQuery};
use crate::row::row_to_json;

/// Connection pool for one PostgreSQL target
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    target: String,
}

impl PostgresPool {
    /// Create the pool for a resolved configuration
    ///
    /// No connection is opened here; the first `acquire` connects. Must be
    /// called from within a Tokio runtime.
    pub fn new(config: &ConnectionConfig) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.acquire_timeout)
            .idle_timeout(Some(config.pool.idle_timeout))
            .connect_lazy_with(connect_options(config));

        info!(
            target_db = %config.target(),
            max_connections = config.pool.max_connections,
            "Created PostgreSQL pool"
        );

        Self {
            pool,
            target: config.target(),
        }
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            target: "<external>".to_string(),
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Driver options for a resolved configuration
///
/// Starts from sqlx's defaults, which honour the `PG*` environment
/// variables, and overrides what the configuration sets.
pub fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .ssl_mode(ssl_mode(config.tls));

    if let Some(database) = &config.database {
        options = options.database(database);
    }
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    options
}

fn ssl_mode(tls: TlsMode) -> PgSslMode {
    match tls {
        TlsMode::Disable => PgSslMode::Disable,
        TlsMode::Prefer => PgSslMode::Prefer,
        TlsMode::Require => PgSslMode::Require,
    }
}

#[async_trait]
impl ConnectionPool for PostgresPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, NodeError> {
        let conn = self.pool.acquire().await.map_err(|e| {
            warn!(target_db = %self.target, error = %e, "Failed to acquire connection");
            NodeError::Connection(format!("Failed to connect to database: {}", e))
        })?;
        debug!(target_db = %self.target, "Acquired connection");
        Ok(Box::new(PostgresPooledConnection { conn }))
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    async fn close(&self) {
        info!(target_db = %self.target, "Closing PostgreSQL pool");
        self.pool.close().await;
    }
}

/// A connection checked out of a [`PostgresPool`]
pub struct PostgresPooledConnection {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl PooledConnection for PostgresPooledConnection {
    async fn query(&mut self, sql: &str, params: &QueryParams) -> Result<Vec<Row>, StatementError> {
        let PositionalQuery { sql, values } = to_positional(sql, params)?;

        // Without parameters the simple protocol is used so that
        // multi-statement scripts run as one unit.
        let rows = if values.is_empty() {
            (&mut *self.conn)
                .fetch_all(sqlx::raw_sql(&sql))
                .await
                .map_err(statement_error)?
        } else {
            self.query_prepared(&sql, values).await?
        };

        Ok(rows.iter().map(row_to_json).collect())
    }

    fn release(self: Box<Self>) {
        // dropping a PoolConnection hands it back to its pool
        drop(self.conn);
    }
}

impl PostgresPooledConnection {
    /// Prepare `sql`, convert each value to the type the server inferred for
    /// its placeholder and run it
    ///
    /// The prepared statement lands in the connection's statement cache, so
    /// the execution reuses it.
    async fn query_prepared(
        &mut self,
        sql: &str,
        values: Vec<serde_json::Value>,
    ) -> Result<Vec<PgRow>, StatementError> {
        let statement = (&mut *self.conn)
            .prepare(sql)
            .await
            .map_err(statement_error)?;

        let types: Vec<PgTypeInfo> = match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        };
        if types.len() != values.len() {
            return Err(StatementError::new(format!(
                "statement expects {} parameters, got {}",
                types.len(),
                values.len()
            )));
        }

        let params = values
            .into_iter()
            .zip(&types)
            .enumerate()
            .map(|(idx, (value, type_info))| {
                PgParam::convert(value, ParamKind::from_type_info(type_info)).map_err(|e| {
                    StatementError::new(format!(
                        "parameter ${}: {} to {}",
                        idx + 1,
                        e,
                        type_info.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let query = params
            .into_iter()
            .fold(statement.query(), |query, param| param.bind(query));
        query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(statement_error)
    }
}

fn statement_error(err: sqlx::Error) -> StatementError {
    match &err {
        sqlx::Error::Database(db_err) => StatementError::new(db_err.message())
            .with_code(db_err.code().map(|code| code.into_owned())),
        _ => StatementError::new(err.to_string()),
    }
}
