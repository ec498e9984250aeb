use thiserror::Error;

/// Why a request could not be tied to an identity.
///
/// These never cross the public capability boundary: each layer logs the
/// reason and collapses it to `None` / `false`. They exist so internal
/// helpers and `try_*` methods can say what went wrong.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed Authorization header")]
    MalformedAuthHeader,

    #[error("Invalid base64 in Authorization header")]
    InvalidBase64,

    #[error("Decoded credentials are not in identifier:secret form")]
    InvalidCredentialFormat,

    #[error("User not found")]
    UserNotFound,

    #[error("Secret does not match stored hash")]
    SecretMismatch,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] StoreError),
}

impl AuthError {
    /// True for failures that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::BackendUnavailable(_))
    }
}

/// Failures of a durable backend (session records or user directory).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("Backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
