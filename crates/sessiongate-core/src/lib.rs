//! Request authentication and session lifecycle for HTTP services.
//!
//! This crate provides:
//! - `paths`: which request paths are exempt from authentication
//! - `credentials`: HTTP Basic header decoding
//! - `session`: in-memory, expiring and durable session stores
//! - `provider`: the pluggable `AuthProvider` strategies
//! - `gate`: the per-request decision (allow, 401, 403)
//!
//! The host builds one provider from [`AuthConfig`] at startup, wraps it in a
//! [`RequestGate`], and runs every incoming request through
//! [`RequestGate::authorize`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod password;
pub mod paths;
pub mod provider;
pub mod session;
pub mod user;

pub use config::{AuthConfig, AuthMode};
pub use credentials::Credentials;
pub use error::{AuthError, StoreError};
pub use gate::{GateDecision, Rejection, RequestGate};
pub use paths::{require_auth, ExcludedPaths, DEFAULT_EXCLUDED_PATHS};
pub use provider::{
    build_provider, build_provider_with, login, AuthProvider, AuthRequest, BasicAuth,
    MemorySessionAuth, NoAuth, SessionAuth, SessionDbAuth, SessionExpAuth,
};
pub use session::{
    Clock, ExpirationPolicy, ExpiringSessionStore, JsonFileRecordStore, ManualClock,
    MemorySessionStore, PersistentSessionStore, Session, SessionRecord, SessionRecordStore,
    SessionStore, SystemClock,
};
pub use user::{InMemoryUserDirectory, User, UserDirectory};
