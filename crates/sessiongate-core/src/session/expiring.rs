use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{token_prefix, Clock, MemorySessionStore, Session, SessionStore, SystemClock};
use crate::error::AuthError;

/// How long a session stays valid after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpirationPolicy {
    /// Zero or negative means sessions never expire.
    pub duration_secs: i64,
}

impl ExpirationPolicy {
    pub fn new(duration_secs: i64) -> Self {
        Self { duration_secs }
    }

    pub fn never() -> Self {
        Self { duration_secs: 0 }
    }

    pub fn expires(&self) -> bool {
        self.duration_secs > 0
    }

    /// `None` when sessions never expire, including a duration too large
    /// to represent as a timestamp.
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.expires() {
            return None;
        }
        Duration::try_seconds(self.duration_secs)
            .and_then(|duration| created_at.checked_add_signed(duration))
    }

    /// Expired strictly after `created_at + duration`.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expires_at(created_at).is_some_and(|expiry| now > expiry)
    }
}

/// Adds an expiration policy on top of another store.
///
/// Expired sessions are masked on lookup, not evicted; they can still be
/// destroyed, and [`purge_expired`](ExpiringSessionStore::purge_expired)
/// clears them out in bulk.
pub struct ExpiringSessionStore<S = MemorySessionStore> {
    inner: S,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStore> ExpiringSessionStore<S> {
    pub fn new(inner: S, policy: ExpirationPolicy) -> Self {
        Self::with_clock(inner, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: S, policy: ExpirationPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn try_session(&self, token: &str) -> Result<Session, AuthError> {
        let mut session = self.inner.session(token).ok_or(AuthError::SessionNotFound)?;
        if self.policy.is_expired(session.created_at, self.clock.now()) {
            return Err(AuthError::SessionExpired);
        }
        session.expires_at = self.policy.expires_at(session.created_at);
        Ok(session)
    }
}

impl ExpiringSessionStore<MemorySessionStore> {
    /// Memory-backed store sharing one clock with its inner map.
    pub fn in_memory(policy: ExpirationPolicy, clock: Arc<dyn Clock>) -> Self {
        let inner = MemorySessionStore::with_clock(Arc::clone(&clock));
        Self::with_clock(inner, policy, clock)
    }

    /// Evict every expired session, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let policy = self.policy;
        let purged = self
            .inner
            .remove_where(|s| policy.is_expired(s.created_at, now));
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        purged
    }
}

impl<S: SessionStore> SessionStore for ExpiringSessionStore<S> {
    fn mode(&self) -> &'static str {
        "session_exp"
    }

    fn create_session(&self, user_id: &str) -> Option<String> {
        self.inner.create_session(user_id)
    }

    fn session(&self, token: &str) -> Option<Session> {
        match self.try_session(token) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(token = token_prefix(token), reason = %e, "Session lookup missed");
                None
            }
        }
    }

    fn destroy(&self, token: &str) -> bool {
        self.inner.destroy(token)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
