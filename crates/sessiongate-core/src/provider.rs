//! Authentication strategies.
//!
//! One [`AuthProvider`] is chosen at process start by [`build_provider`] and
//! shared by every request thread. Session-based strategies are a single
//! generic [`SessionAuth`] over whichever [`SessionStore`] the mode calls for.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::{AuthConfig, AuthMode};
use crate::credentials::{parse_basic, Credentials};
use crate::error::AuthError;
use crate::paths::ExcludedPaths;
use crate::session::{
    token_prefix, ExpirationPolicy, ExpiringSessionStore, JsonFileRecordStore, MemorySessionStore,
    PersistentSessionStore, SessionRecordStore, SessionStore,
};
use crate::user::{resolve_user, User, UserDirectory};

// ============================================================================
// Request view
// ============================================================================

/// The parts of an HTTP request authentication looks at.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub cookies: HashMap<String, String>,
    /// Set by the gate once the request is authenticated.
    pub current_user: Option<User>,
}

impl AuthRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Build from raw header pairs. Header names are case-insensitive; the
    /// first `Authorization` header and the first value of each cookie win.
    pub fn from_headers<'a>(
        path: impl Into<String>,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut request = Self::new(path);
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("authorization") {
                request.authorization.get_or_insert_with(|| value.to_string());
            } else if name.eq_ignore_ascii_case("cookie") {
                for pair in value.split(';') {
                    if let Some((k, v)) = pair.split_once('=') {
                        let k = k.trim();
                        if !k.is_empty() {
                            request
                                .cookies
                                .entry(k.to_string())
                                .or_insert_with(|| v.trim().to_string());
                        }
                    }
                }
            }
        }
        request
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

// ============================================================================
// Provider capability
// ============================================================================

pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// The no-op provider lets every request through.
    fn is_noop(&self) -> bool {
        false
    }

    fn require_auth(&self, path: Option<&str>, excluded: &ExcludedPaths) -> bool {
        excluded.requires_auth(path)
    }

    fn authorization_header<'r>(&self, request: &'r AuthRequest) -> Option<&'r str> {
        request.authorization.as_deref()
    }

    fn session_cookie_name(&self) -> Option<&str> {
        None
    }

    fn session_cookie<'r>(&self, request: &'r AuthRequest) -> Option<&'r str> {
        self.session_cookie_name().and_then(|name| request.cookie(name))
    }

    /// Who is making this request, if anyone valid.
    fn current_user(&self, request: &AuthRequest) -> Option<User>;

    /// Start a session; providers without sessions return `None`.
    fn create_session(&self, _user_id: &str) -> Option<String> {
        None
    }

    /// End the session named by the request's cookie.
    fn destroy_session(&self, _request: &AuthRequest) -> bool {
        false
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// No authentication at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_noop(&self) -> bool {
        true
    }

    fn current_user(&self, _request: &AuthRequest) -> Option<User> {
        None
    }
}

/// HTTP Basic credentials checked against a user directory.
///
/// When a session cookie name is configured, a request carrying only that
/// cookie counts as having presented credentials (and is then refused with
/// 403) rather than as anonymous.
pub struct BasicAuth {
    users: Arc<dyn UserDirectory>,
    session_cookie_name: Option<String>,
}

impl BasicAuth {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self {
            users,
            session_cookie_name: None,
        }
    }

    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = Some(name.into());
        self
    }

    /// Resolve an identifier/secret pair. Either being absent yields `None`.
    pub fn user_from_credentials(&self, identifier: Option<&str>, secret: Option<&str>) -> Option<User> {
        let credentials = Credentials {
            identifier: identifier?.to_string(),
            secret: secret?.to_string(),
        };
        self.resolve(&credentials).ok()
    }

    pub fn try_current_user(&self, request: &AuthRequest) -> Result<User, AuthError> {
        let credentials = parse_basic(self.authorization_header(request))?;
        self.resolve(&credentials)
    }

    fn resolve(&self, credentials: &Credentials) -> Result<User, AuthError> {
        resolve_user(self.users.as_ref(), credentials)
    }
}

impl AuthProvider for BasicAuth {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn session_cookie_name(&self) -> Option<&str> {
        self.session_cookie_name.as_deref()
    }

    fn current_user(&self, request: &AuthRequest) -> Option<User> {
        match self.try_current_user(request) {
            Ok(user) => Some(user),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Basic auth could not reach user directory");
                None
            }
            Err(e) => {
                debug!(reason = %e, "Basic auth rejected");
                None
            }
        }
    }
}

/// Session-cookie authentication over any session store.
pub struct SessionAuth<S> {
    store: S,
    cookie_name: String,
    users: Arc<dyn UserDirectory>,
}

pub type MemorySessionAuth = SessionAuth<MemorySessionStore>;
pub type SessionExpAuth = SessionAuth<ExpiringSessionStore<MemorySessionStore>>;
pub type SessionDbAuth = SessionAuth<PersistentSessionStore<MemorySessionStore>>;

impl<S: SessionStore> SessionAuth<S> {
    pub fn new(store: S, cookie_name: impl Into<String>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            cookie_name: cookie_name.into(),
            users,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn user_id_for_session_id(&self, session_id: Option<&str>) -> Option<String> {
        self.store.lookup(session_id?)
    }
}

impl<S: SessionStore> AuthProvider for SessionAuth<S> {
    fn name(&self) -> &'static str {
        self.store.mode()
    }

    fn session_cookie_name(&self) -> Option<&str> {
        Some(self.cookie_name.as_str())
    }

    fn current_user(&self, request: &AuthRequest) -> Option<User> {
        let user_id = self.user_id_for_session_id(self.session_cookie(request))?;
        match self.users.find_by_id(&user_id) {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                debug!(user_id = %user_id, "Session points at unknown user");
                None
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User lookup failed");
                None
            }
        }
    }

    fn create_session(&self, user_id: &str) -> Option<String> {
        self.store.create_session(user_id)
    }

    fn destroy_session(&self, request: &AuthRequest) -> bool {
        let Some(token) = self.session_cookie(request) else {
            return false;
        };
        let destroyed = self.store.destroy(token);
        debug!(token = token_prefix(token), destroyed, "Logout");
        destroyed
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Pick the strategy for `config`. `session_db` opens the JSON record store.
pub fn build_provider(config: &AuthConfig, users: Arc<dyn UserDirectory>) -> Result<Arc<dyn AuthProvider>> {
    let records: Option<Arc<dyn SessionRecordStore>> = if config.mode == AuthMode::SessionDb {
        let path = config.resolved_store_path()?;
        let store = JsonFileRecordStore::open(&path, config.backend_timeout)
            .with_context(|| format!("Failed to open session store: {}", path.display()))?;
        Some(Arc::new(store))
    } else {
        None
    };
    build_provider_with(config, users, records)
}

/// As [`build_provider`], with the durable record store supplied by the caller.
pub fn build_provider_with(
    config: &AuthConfig,
    users: Arc<dyn UserDirectory>,
    records: Option<Arc<dyn SessionRecordStore>>,
) -> Result<Arc<dyn AuthProvider>> {
    let cookie_name = || {
        config
            .session_cookie_name
            .clone()
            .with_context(|| format!("SESSION_NAME is required when AUTH_MODE is {}", config.mode))
    };
    let policy = ExpirationPolicy::new(config.session_duration_secs);

    let provider: Arc<dyn AuthProvider> = match config.mode {
        AuthMode::None => Arc::new(NoAuth),
        AuthMode::Basic => {
            let basic = BasicAuth::new(users);
            match config.session_cookie_name.clone() {
                Some(name) => Arc::new(basic.with_session_cookie_name(name)),
                None => Arc::new(basic),
            }
        }
        AuthMode::Session => Arc::new(MemorySessionAuth::new(MemorySessionStore::new(), cookie_name()?, users)),
        AuthMode::SessionExp => Arc::new(SessionExpAuth::new(
            ExpiringSessionStore::new(MemorySessionStore::new(), policy),
            cookie_name()?,
            users,
        )),
        AuthMode::SessionDb => {
            let records = records.context("session_db mode needs a session record store")?;
            Arc::new(SessionDbAuth::new(
                PersistentSessionStore::new(MemorySessionStore::new(), records, policy),
                cookie_name()?,
                users,
            ))
        }
    };

    info!(
        mode = %config.mode,
        provider = provider.name(),
        session_duration_secs = config.session_duration_secs,
        "Authentication provider selected"
    );
    Ok(provider)
}

/// Verify credentials and open a session for the user they name.
pub fn login(
    provider: &dyn AuthProvider,
    users: &dyn UserDirectory,
    identifier: &str,
    secret: &str,
) -> Option<(User, String)> {
    if identifier.is_empty() || secret.is_empty() {
        return None;
    }
    let credentials = Credentials {
        identifier: identifier.to_string(),
        secret: secret.to_string(),
    };
    let user = match resolve_user(users, &credentials) {
        Ok(user) => user,
        Err(e) => {
            debug!(reason = %e, "Login rejected");
            return None;
        }
    };
    let token = provider.create_session(&user.id)?;
    info!(user_id = %user.id, token = token_prefix(&token), "Logged in");
    Some((user, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::encode_basic;
    use crate::password::hash_password;
    use crate::user::InMemoryUserDirectory;

    fn users() -> Arc<InMemoryUserDirectory> {
        let hash = hash_password("pwd").unwrap();
        Arc::new(InMemoryUserDirectory::from_users([
            User::new("u1", "alice@example.com").with_password_hash(hash)
        ]))
    }

    fn session_auth(users: Arc<InMemoryUserDirectory>) -> MemorySessionAuth {
        MemorySessionAuth::new(MemorySessionStore::new(), "_sid", users)
    }

    #[test]
    fn test_request_from_headers() {
        let request = AuthRequest::from_headers(
            "/api/v1/users",
            [
                ("authorization", "Basic abc"),
                ("Authorization", "Basic second"),
                ("Cookie", "theme=dark; _sid = tok123 ;flag; _sid=later"),
            ],
        );
        assert_eq!(request.authorization.as_deref(), Some("Basic abc"));
        assert_eq!(request.cookie("_sid"), Some("tok123"));
        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(request.cookie("flag"), None);
    }

    #[test]
    fn test_basic_auth_current_user() {
        let provider = BasicAuth::new(users());
        let ok = AuthRequest::new("/").with_authorization(encode_basic("alice@example.com", "pwd"));
        assert_eq!(provider.current_user(&ok).unwrap().id, "u1");

        let wrong = AuthRequest::new("/").with_authorization(encode_basic("alice@example.com", "nope"));
        assert!(provider.current_user(&wrong).is_none());
        assert!(matches!(provider.try_current_user(&wrong), Err(AuthError::SecretMismatch)));

        let garbage = AuthRequest::new("/").with_authorization("Basic %%%");
        assert!(provider.current_user(&garbage).is_none());
        assert!(provider.current_user(&AuthRequest::new("/")).is_none());
    }

    #[test]
    fn test_basic_auth_from_credentials() {
        let provider = BasicAuth::new(users());
        assert!(provider.user_from_credentials(Some("alice@example.com"), Some("pwd")).is_some());
        assert!(provider.user_from_credentials(None, Some("pwd")).is_none());
        assert!(provider.user_from_credentials(Some("alice@example.com"), None).is_none());
        assert!(provider.session_cookie_name().is_none());
    }

    #[test]
    fn test_basic_auth_sees_configured_session_cookie() {
        let provider = BasicAuth::new(users()).with_session_cookie_name("_sid");
        let request = AuthRequest::new("/").with_cookie("_sid", "abc");
        assert_eq!(provider.session_cookie(&request), Some("abc"));
        assert!(provider.current_user(&request).is_none());
        assert!(!provider.destroy_session(&request));
    }

    #[test]
    fn test_session_auth_round_trip() {
        let provider = session_auth(users());
        let token = provider.create_session("u1").unwrap();

        let request = AuthRequest::new("/").with_cookie("_sid", token.clone());
        assert_eq!(provider.session_cookie(&request), Some(token.as_str()));
        assert_eq!(provider.current_user(&request).unwrap().email, "alice@example.com");

        assert!(provider.destroy_session(&request));
        assert!(provider.current_user(&request).is_none());
        assert!(!provider.destroy_session(&request));
    }

    #[test]
    fn test_session_auth_without_cookie() {
        let provider = session_auth(users());
        provider.create_session("u1").unwrap();
        let request = AuthRequest::new("/").with_cookie("other", "x");
        assert!(provider.current_user(&request).is_none());
        assert!(!provider.destroy_session(&request));
        assert_eq!(provider.user_id_for_session_id(None), None);
    }

    #[test]
    fn test_session_for_deleted_user() {
        let provider = session_auth(users());
        let token = provider.create_session("ghost").unwrap();
        let request = AuthRequest::new("/").with_cookie("_sid", token);
        assert!(provider.current_user(&request).is_none());
    }

    #[test]
    fn test_build_provider_by_mode() {
        let dir = users();
        let cases = [
            (AuthMode::None, "none"),
            (AuthMode::Basic, "basic"),
            (AuthMode::Session, "session"),
            (AuthMode::SessionExp, "session_exp"),
        ];
        for (mode, name) in cases {
            let config = AuthConfig {
                mode,
                session_cookie_name: Some("_sid".into()),
                ..Default::default()
            };
            let provider = build_provider(&config, dir.clone()).unwrap();
            assert_eq!(provider.name(), name);
            assert_eq!(provider.is_noop(), mode == AuthMode::None);
        }
    }

    #[test]
    fn test_build_session_db_provider() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = AuthConfig {
            mode: AuthMode::SessionDb,
            session_cookie_name: Some("_sid".into()),
            session_store_path: Some(tmp.path().join("sessions.json")),
            ..Default::default()
        };
        let provider = build_provider(&config, users()).unwrap();
        assert_eq!(provider.name(), "session_db");
        let token = provider.create_session("u1").unwrap();
        assert!(tmp.path().join("sessions.json").exists());
        let request = AuthRequest::new("/").with_cookie("_sid", token);
        assert_eq!(provider.current_user(&request).unwrap().id, "u1");
    }

    #[test]
    fn test_build_requires_cookie_name_and_records() {
        let config = AuthConfig {
            mode: AuthMode::Session,
            ..Default::default()
        };
        assert!(build_provider(&config, users()).is_err());

        let config = AuthConfig {
            mode: AuthMode::SessionDb,
            session_cookie_name: Some("_sid".into()),
            ..Default::default()
        };
        assert!(build_provider_with(&config, users(), None).is_err());
    }

    #[test]
    fn test_login() {
        let dir = users();
        let provider = session_auth(dir.clone());
        let (user, token) = login(&provider, &*dir, "alice@example.com", "pwd").unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(provider.store().lookup(&token).as_deref(), Some("u1"));

        assert!(login(&provider, &*dir, "alice@example.com", "bad").is_none());
        assert!(login(&provider, &*dir, "", "pwd").is_none());
        assert!(login(&BasicAuth::new(dir.clone()), &*dir, "alice@example.com", "pwd").is_none());
    }
}
