//! Resolved connection settings for one PostgreSQL target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default PostgreSQL host
pub const DEFAULT_HOST: &str = "localhost";

/// Default PostgreSQL port
pub const DEFAULT_PORT: u16 = 5432;

/// Whether connections use TLS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain TCP
    #[default]
    Disable,
    /// TLS when the server offers it
    Prefer,
    /// TLS or fail
    Require,
}

impl From<bool> for TlsMode {
    fn from(ssl: bool) -> Self {
        if ssl {
            TlsMode::Require
        } else {
            TlsMode::Disable
        }
    }
}

/// Pool sizing and timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,

    /// How long `acquire` may wait for a free connection
    pub acquire_timeout: Duration,

    /// How long an unused connection stays open
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10),
        }
    }
}

/// Fully resolved parameters of one database target
///
/// Built once when the node is constructed and never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host name or address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Database name; the driver default applies when absent
    pub database: Option<String>,

    /// Login role; the driver default applies when absent
    pub user: Option<String>,

    /// Password
    pub password: Option<String>,

    /// TLS mode
    pub tls: TlsMode,

    /// Pool settings
    #[serde(default)]
    pub pool: PoolSettings,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: None,
            user: None,
            password: None,
            tls: TlsMode::default(),
            pool: PoolSettings::default(),
        }
    }
}

impl ConnectionConfig {
    /// `user@host:port/database`, without the password
    pub fn target(&self) -> String {
        let user = self.user.as_deref().map(|u| format!("{}@", u)).unwrap_or_default();
        let database = self.database.as_deref().unwrap_or("");
        format!("{}{}:{}/{}", user, self.host, self.port, database)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("pool", &self.pool)
            .finish()
    }
}
