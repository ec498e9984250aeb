//! Path exemptions: which request paths skip authentication.
//!
//! Patterns come in three shapes:
//! - `/api/v1/docs*` matches anything starting with `/api/v1/docs`
//! - `/api/v1/status/` matches `/api/v1/status` and everything below it
//! - `/api/v1/login` matches itself and everything below it, but not
//!   `/api/v1/loginx`
//!
//! Matching is case-sensitive and works on the raw path; nothing is
//! URL-decoded.

/// Paths the stock API leaves open.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/api/v1/status/",
    "/api/v1/unauthorized/",
    "/api/v1/forbidden/",
    "/api/v1/auth_session/login/",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    /// Literal prefix, suffix unconstrained.
    Prefix(String),
    /// The path itself or anything beneath it on a `/` boundary.
    Subtree(String),
}

impl Rule {
    fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            Some(Rule::Prefix(prefix.to_string()))
        } else if let Some(base) = pattern.strip_suffix('/') {
            Some(Rule::Subtree(base.to_string()))
        } else {
            Some(Rule::Subtree(pattern.to_string()))
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Rule::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Rule::Subtree(base) => path
                .strip_prefix(base.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
        }
    }
}

/// An ordered, pre-parsed exemption list. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct ExcludedPaths {
    rules: Vec<Rule>,
}

impl ExcludedPaths {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            rules: patterns.iter().filter_map(|p| Rule::parse(p.as_ref())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule wins; no rules, or no path, means auth is required.
    pub fn requires_auth(&self, path: Option<&str>) -> bool {
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            return true;
        };
        !self.rules.iter().any(|rule| rule.matches(path))
    }
}

/// One-shot form of [`ExcludedPaths::requires_auth`].
pub fn require_auth<S: AsRef<str>>(path: Option<&str>, excluded_paths: &[S]) -> bool {
    ExcludedPaths::new(excluded_paths).requires_auth(path)
}
