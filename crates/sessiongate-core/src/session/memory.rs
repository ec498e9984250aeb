use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{generate_token, token_prefix, Clock, Session, SessionStore, SystemClock};

/// Process-local session map. Sessions never expire here; wrap it in an
/// [`ExpiringSessionStore`](super::ExpiringSessionStore) for that.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Drop every record matching `predicate`, returning how many went.
    pub fn remove_where(&self, mut predicate: impl FnMut(&Session) -> bool) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !predicate(&*s));
        before - sessions.len()
    }

    /// Every token currently held for `user_id`.
    pub fn tokens_for_user(&self, user_id: &str) -> Vec<String> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.token.clone())
            .collect()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, user_id: &str) -> Option<String> {
        if user_id.is_empty() {
            return None;
        }

        let created_at = self.clock.now();
        let mut sessions = self.sessions.write();
        // A collision on 256 random bits is not expected, but the check is
        // free while we hold the write lock.
        loop {
            let token = generate_token();
            if let Entry::Vacant(slot) = sessions.entry(token.clone()) {
                slot.insert(Session {
                    token: token.clone(),
                    user_id: user_id.to_string(),
                    created_at,
                    expires_at: None,
                });
                debug!(user_id, token = token_prefix(&token), "Session created");
                return Some(token);
            }
        }
    }

    fn session(&self, token: &str) -> Option<Session> {
        self.sessions.read().get(token).cloned()
    }

    fn destroy(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token).is_some();
        if removed {
            debug!(token = token_prefix(token), "Session destroyed");
        }
        removed
    }

    fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_create_lookup_destroy() {
        let store = MemorySessionStore::new();
        let token = store.create_session("user-1").unwrap();
        assert_eq!(store.lookup(&token).as_deref(), Some("user-1"));

        assert!(store.destroy(&token));
        assert_eq!(store.lookup(&token), None);
        assert!(!store.destroy(&token));
    }

    #[test]
    fn test_empty_user_id_rejected() {
        let store = MemorySessionStore::new();
        assert_eq!(store.create_session(""), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_token() {
        let store = MemorySessionStore::new();
        assert_eq!(store.lookup("nope"), None);
        assert!(!store.destroy("nope"));
    }

    #[test]
    fn test_session_record_has_creation_time() {
        let store = MemorySessionStore::new();
        let token = store.create_session("user-1").unwrap();
        let session = store.session(&token).unwrap();
        assert_eq!(session.token, token);
        assert_eq!(session.expires_at, None);
        assert!(session.created_at <= chrono::Utc::now());
    }

    #[test]
    fn test_same_user_gets_distinct_sessions() {
        let store = MemorySessionStore::new();
        let a = store.create_session("user-1").unwrap();
        let b = store.create_session("user-1").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.tokens_for_user("user-1").len(), 2);
    }

    #[test]
    fn test_concurrent_creates_never_collide() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let store = Arc::new(MemorySessionStore::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|i| store.create_session(&format!("user-{}-{}", t, i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut tokens = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(tokens.insert(token));
            }
        }
        assert_eq!(tokens.len(), THREADS * PER_THREAD);
        assert_eq!(store.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_concurrent_create_and_destroy() {
        let store = Arc::new(MemorySessionStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        let token = store.create_session(&format!("u{}", t)).unwrap();
                        if i % 2 == 0 {
                            assert!(store.destroy(&token));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 4 * 50);
    }
}
