//! Server-side session state.
//!
//! This module provides:
//! - `MemorySessionStore`: process-local token → session map
//! - `ExpiringSessionStore`: wraps any store and masks sessions older than
//!   the configured duration
//! - `PersistentSessionStore`: reads and writes through a durable
//!   `SessionRecordStore`
//!
//! Every store is internally synchronized and meant to be shared by all
//! request-handling threads.

pub mod expiring;
pub mod memory;
pub mod persistent;
pub mod record;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};

pub use expiring::{ExpirationPolicy, ExpiringSessionStore};
pub use memory::MemorySessionStore;
pub use persistent::PersistentSessionStore;
pub use record::{JsonFileRecordStore, SessionRecord, SessionRecordStore};

/// Random bytes per session token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Characters of a token that may appear in logs.
const LOGGED_TOKEN_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// `None` when the session never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token → session mapping with create/lookup/destroy.
pub trait SessionStore: Send + Sync {
    /// `AUTH_MODE` name of the session flavour this store provides.
    fn mode(&self) -> &'static str {
        "session"
    }

    /// Start a session for `user_id`, returning its token. An empty user id
    /// is rejected with `None`.
    fn create_session(&self, user_id: &str) -> Option<String>;

    /// The live session for `token`, if any.
    fn session(&self, token: &str) -> Option<Session>;

    fn lookup(&self, token: &str) -> Option<String> {
        self.session(token).map(|s| s.user_id)
    }

    /// Remove the session. `true` iff it was present.
    fn destroy(&self, token: &str) -> bool;

    /// Number of stored records, live or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of "now" for session timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Fresh token from the OS CSPRNG, base64url without padding.
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Loggable prefix of a token.
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(LOGGED_TOKEN_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
