use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    token_prefix, Clock, ExpirationPolicy, MemorySessionStore, Session, SessionRecord,
    SessionRecordStore, SessionStore, SystemClock,
};
use crate::error::AuthError;

/// Sessions backed by a durable [`SessionRecordStore`].
///
/// Tokens are minted by the wrapped in-memory store and then moved into the
/// durable store, which holds the only copy. Lookups, destroys, counts and
/// purges all go to the durable store, so a restarted process (or another
/// handle on the same records) sees the same sessions.
///
/// [`lookup`](SessionStore::lookup) and [`destroy`](SessionStore::destroy)
/// fold backend failures into "not found". Callers that want to tell an
/// outage from a logged-out user use [`try_lookup`](Self::try_lookup) and
/// [`try_destroy`](Self::try_destroy).
pub struct PersistentSessionStore<S = MemorySessionStore> {
    inner: S,
    records: Arc<dyn SessionRecordStore>,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStore> PersistentSessionStore<S> {
    pub fn new(inner: S, records: Arc<dyn SessionRecordStore>, policy: ExpirationPolicy) -> Self {
        Self::with_clock(inner, records, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: S,
        records: Arc<dyn SessionRecordStore>,
        policy: ExpirationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            records,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    /// Read the durable record for `token` and apply the expiration policy.
    pub fn try_session(&self, token: &str) -> Result<Session, AuthError> {
        let mut found = self.records.find_by_session_id(token)?;
        if found.len() > 1 {
            warn!(
                token = token_prefix(token),
                count = found.len(),
                "Duplicate durable session records, treating as not found"
            );
        }
        let record = match found.pop() {
            Some(record) if found.is_empty() => record,
            _ => return Err(AuthError::SessionNotFound),
        };
        if self.policy.is_expired(record.created_at, self.clock.now()) {
            return Err(AuthError::SessionExpired);
        }
        Ok(Session {
            token: record.session_id,
            user_id: record.user_id,
            created_at: record.created_at,
            expires_at: self.policy.expires_at(record.created_at),
        })
    }

    pub fn try_lookup(&self, token: &str) -> Result<String, AuthError> {
        self.try_session(token).map(|s| s.user_id)
    }

    /// Remove the durable record for `token`.
    pub fn try_destroy(&self, token: &str) -> Result<(), AuthError> {
        if self.records.remove(token)? == 0 {
            return Err(AuthError::SessionNotFound);
        }
        debug!(token = token_prefix(token), "Durable session destroyed");
        Ok(())
    }

    /// Number of durable records, live or expired.
    pub fn try_len(&self) -> Result<usize, AuthError> {
        Ok(self.records.len()?)
    }

    /// Delete every expired durable record, returning how many went.
    pub fn try_purge_expired(&self) -> Result<usize, AuthError> {
        let now = self.clock.now();
        let policy = self.policy;
        let purged = self
            .records
            .remove_where(&|r| policy.is_expired(r.created_at, now))?;
        if purged > 0 {
            debug!(purged, "Purged expired durable sessions");
        }
        Ok(purged)
    }

    /// As [`try_purge_expired`](Self::try_purge_expired); a backend failure
    /// is logged and counts as nothing purged.
    pub fn purge_expired(&self) -> usize {
        self.try_purge_expired().unwrap_or_else(|e| {
            warn!(error = %e, "Durable session purge failed");
            0
        })
    }
}

impl<S: SessionStore> SessionStore for PersistentSessionStore<S> {
    fn mode(&self) -> &'static str {
        "session_db"
    }

    fn create_session(&self, user_id: &str) -> Option<String> {
        let token = self.inner.create_session(user_id)?;
        let created_at = self
            .inner
            .session(&token)
            .map(|s| s.created_at)
            .unwrap_or_else(|| self.clock.now());
        self.inner.destroy(&token);

        let record = SessionRecord {
            user_id: user_id.to_string(),
            session_id: token.clone(),
            created_at,
        };
        if let Err(e) = self.records.insert(record) {
            warn!(user_id, error = %e, "Failed to persist session");
            return None;
        }
        debug!(user_id, token = token_prefix(&token), "Durable session created");
        Some(token)
    }

    fn session(&self, token: &str) -> Option<Session> {
        match self.try_session(token) {
            Ok(session) => Some(session),
            Err(e) if e.is_transient() => {
                warn!(token = token_prefix(token), error = %e, "Durable session lookup failed");
                None
            }
            Err(e) => {
                debug!(token = token_prefix(token), reason = %e, "Session lookup missed");
                None
            }
        }
    }

    fn destroy(&self, token: &str) -> bool {
        match self.try_destroy(token) {
            Ok(()) => true,
            Err(e) => {
                if e.is_transient() {
                    warn!(token = token_prefix(token), error = %e, "Durable session destroy failed");
                }
                false
            }
        }
    }

    fn len(&self) -> usize {
        self.try_len().unwrap_or_else(|e| {
            warn!(error = %e, "Durable session count failed");
            0
        })
    }
}
