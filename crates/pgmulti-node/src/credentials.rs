//! Credential storage for database configuration entities.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User name and password kept outside the flow definition
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login role
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Changes submitted by an editor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialUpdate {
    /// New user; absent or empty removes the stored user
    #[serde(default)]
    pub user: Option<String>,
    /// New password; empty removes it, absent keeps the stored one
    #[serde(default)]
    pub password: Option<String>,
}

/// What an editor may see of stored credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    /// Stored user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Whether a non-empty password is stored
    pub has_password: bool,
}

impl Credentials {
    /// Merge an editor update into these credentials
    pub fn apply(&mut self, update: CredentialUpdate) {
        self.user = update.user.filter(|u| !u.is_empty());
        match update.password {
            Some(p) if p.is_empty() => self.password = None,
            Some(p) => self.password = Some(p),
            None => {}
        }
    }

    /// Editor view, never exposing the password
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            user: self.user.clone(),
            has_password: self.password.as_deref().map_or(false, |p| !p.is_empty()),
        }
    }
}

/// Credentials keyed by configuration entity id
pub trait CredentialStore: Send + Sync {
    /// Stored credentials, if any
    fn get(&self, id: &str) -> Option<Credentials>;

    /// Replace the stored credentials
    fn add(&self, id: &str, credentials: Credentials);

    /// Forget the stored credentials
    fn delete(&self, id: &str);

    /// Merge an editor update and store the result
    fn update(&self, id: &str, update: CredentialUpdate) -> Credentials {
        let mut credentials = self.get(id).unwrap_or_default();
        credentials.apply(update);
        self.add(id, credentials.clone());
        credentials
    }
}

/// Credential store held in memory
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: DashMap<String, Credentials>,
}

impl InMemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, id: &str) -> Option<Credentials> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    fn add(&self, id: &str, credentials: Credentials) {
        self.entries.insert(id.to_string(), credentials);
    }

    fn delete(&self, id: &str) {
        self.entries.remove(id);
    }
}
