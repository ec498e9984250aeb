//! User identities and the directory used to resolve them.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::error::{AuthError, StoreError};
use crate::password::verify_password;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 PHC string.
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            password_hash: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// A user without a stored hash never verifies.
    pub fn is_valid_password(&self, secret: &str) -> bool {
        self.password_hash
            .as_deref()
            .map(|hash| verify_password(secret, hash))
            .unwrap_or(false)
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Where users live. Implementations must be safe to share across
/// request-handling threads.
pub trait UserDirectory: Send + Sync {
    /// Look up by login identifier (email).
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let dir = Self::new();
        for user in users {
            dir.insert(user);
        }
        dir
    }

    /// Load a JSON array of users.
    pub fn load_json(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file: {}", path.display()))?;
        let users: Vec<User> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse users file: {}", path.display()))?;
        debug!(count = users.len(), "Loaded users");
        Ok(Self::from_users(users))
    }

    pub fn insert(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.email == identifier)
            .cloned())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().get(id).cloned())
    }
}

/// Look a user up by identifier and check the secret against their hash.
pub fn resolve_user(
    directory: &dyn UserDirectory,
    credentials: &Credentials,
) -> Result<User, AuthError> {
    let user = directory
        .find_by_identifier(&credentials.identifier)
        .inspect_err(|e| warn!(error = %e, "User lookup failed"))?
        .ok_or(AuthError::UserNotFound)?;

    if !user.is_valid_password(&credentials.secret) {
        return Err(AuthError::SecretMismatch);
    }
    Ok(user)
}
