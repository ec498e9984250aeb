//! Authentication configuration.
//!
//! Loaded once at process start from the environment:
//!
//! | key | meaning |
//! |---|---|
//! | `AUTH_MODE` (or `AUTH_TYPE`) | `none`, `basic`, `session`, `session_exp`, `session_db` |
//! | `SESSION_NAME` | session cookie name, required for session modes |
//! | `SESSION_DURATION` | seconds a session stays valid, `0` = forever |
//! | `SESSION_STORE_PATH` | JSON file for `session_db` records |
//! | `SESSION_BACKEND_TIMEOUT_MS` | bound on each durable-store call |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tracing::warn;

/// Application name used for the data directory path
const APP_NAME: &str = "sessiongate";

/// Durable session file name in the data directory
const SESSION_STORE_FILE: &str = "user_sessions.json";

/// Default bound on durable-store calls.
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    None,
    Basic,
    Session,
    SessionExp,
    SessionDb,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Basic => "basic",
            AuthMode::Session => "session",
            AuthMode::SessionExp => "session_exp",
            AuthMode::SessionDb => "session_db",
        }
    }

    pub fn uses_sessions(&self) -> bool {
        matches!(self, AuthMode::Session | AuthMode::SessionExp | AuthMode::SessionDb)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "none" => Ok(AuthMode::None),
            "basic" | "basic_auth" => Ok(AuthMode::Basic),
            "session" | "session_auth" => Ok(AuthMode::Session),
            "session_exp" | "session_exp_auth" => Ok(AuthMode::SessionExp),
            "session_db" | "session_db_auth" => Ok(AuthMode::SessionDb),
            other => Err(anyhow!("Unknown auth mode: {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub session_cookie_name: Option<String>,
    /// Zero or negative: sessions never expire.
    pub session_duration_secs: i64,
    pub session_store_path: Option<PathBuf>,
    pub backend_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::None,
            session_cookie_name: None,
            session_duration_secs: 0,
            session_store_path: None,
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = match lookup("AUTH_MODE").or_else(|| lookup("AUTH_TYPE")) {
            Some(raw) => raw.parse()?,
            None => AuthMode::None,
        };

        let session_cookie_name = lookup("SESSION_NAME")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        if mode.uses_sessions() && session_cookie_name.is_none() {
            bail!("SESSION_NAME is required when AUTH_MODE is {}", mode);
        }

        let session_duration_secs = match lookup("SESSION_DURATION") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid SESSION_DURATION, sessions will not expire");
                0
            }),
            None => 0,
        };

        let session_store_path = lookup("SESSION_STORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let backend_timeout = match lookup("SESSION_BACKEND_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Invalid SESSION_BACKEND_TIMEOUT_MS: {:?}", raw))?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
        };

        Ok(Self {
            mode,
            session_cookie_name,
            session_duration_secs,
            session_store_path,
            backend_timeout,
        })
    }

    /// Where `session_db` keeps its records.
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.session_store_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(SESSION_STORE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AuthConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.backend_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_mode_names_and_aliases() {
        assert_eq!("basic".parse::<AuthMode>().unwrap(), AuthMode::Basic);
        assert_eq!("basic_auth".parse::<AuthMode>().unwrap(), AuthMode::Basic);
        assert_eq!("session_exp_auth".parse::<AuthMode>().unwrap(), AuthMode::SessionExp);
        assert!("auth".parse::<AuthMode>().is_err());
        assert!("oauth".parse::<AuthMode>().is_err());
        assert_eq!(AuthMode::SessionDb.to_string(), "session_db");
    }

    #[test]
    fn test_auth_type_fallback() {
        let config = load(&[("AUTH_TYPE", "basic_auth")]).unwrap();
        assert_eq!(config.mode, AuthMode::Basic);
        let config = load(&[("AUTH_MODE", "none"), ("AUTH_TYPE", "basic_auth")]).unwrap();
        assert_eq!(config.mode, AuthMode::None);
    }

    #[test]
    fn test_session_modes_need_cookie_name() {
        assert!(load(&[("AUTH_MODE", "session")]).is_err());
        assert!(load(&[("AUTH_MODE", "session_db"), ("SESSION_NAME", "  ")]).is_err());
        let config = load(&[("AUTH_MODE", "session"), ("SESSION_NAME", "_my_session_id")]).unwrap();
        assert_eq!(config.session_cookie_name.as_deref(), Some("_my_session_id"));
        assert!(load(&[("AUTH_MODE", "basic")]).is_ok());
    }

    #[test]
    fn test_session_duration() {
        let base = [("AUTH_MODE", "session_exp"), ("SESSION_NAME", "sid")];
        let with = |d: &'static str| {
            let mut pairs = base.to_vec();
            pairs.push(("SESSION_DURATION", d));
            load(&pairs).unwrap().session_duration_secs
        };
        assert_eq!(with("60"), 60);
        assert_eq!(with(" 60 "), 60);
        assert_eq!(with("soon"), 0);
        assert_eq!(with("-5"), -5);
        assert_eq!(with("100000000000000"), 100_000_000_000_000);
        assert_eq!(with("9223372036854775807"), i64::MAX);
        assert_eq!(load(&base).unwrap().session_duration_secs, 0);
    }

    #[test]
    fn test_store_path_and_timeout() {
        let config = load(&[
            ("SESSION_STORE_PATH", "/tmp/sessions.json"),
            ("SESSION_BACKEND_TIMEOUT_MS", "150"),
        ])
        .unwrap();
        assert_eq!(config.resolved_store_path().unwrap(), PathBuf::from("/tmp/sessions.json"));
        assert_eq!(config.backend_timeout, Duration::from_millis(150));
        assert!(load(&[("SESSION_BACKEND_TIMEOUT_MS", "fast")]).is_err());
    }
}
