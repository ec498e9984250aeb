//! HTTP Basic credential decoding.
//!
//! `Authorization: Basic <base64(identifier:secret)>` is taken apart in
//! three steps, each of which yields `None` on bad input rather than an
//! error: [`extract_token`], [`decode`], [`split_credentials`].

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::AuthError;

/// Authentication scheme keyword, including the single separating space.
const BASIC_PREFIX: &str = "Basic ";

/// A decoded identifier/secret pair. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"***")
            .finish()
    }
}

/// Pull the base64 token out of a `Basic` Authorization header.
///
/// The scheme keyword is case-sensitive and must be followed by exactly one
/// space and a non-empty token. Whitespace around the whole header is fine.
pub fn extract_token(header: Option<&str>) -> Option<&str> {
    let token = header?.trim().strip_prefix(BASIC_PREFIX)?;
    if token.is_empty() || token.starts_with(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Strict base64 decode to a UTF-8 string.
pub fn decode(token: Option<&str>) -> Option<String> {
    let bytes = STANDARD.decode(token?).ok()?;
    String::from_utf8(bytes).ok()
}

/// Split `identifier:secret` on the first colon.
///
/// The secret may itself contain colons. An empty identifier or secret, or
/// no colon at all, yields `None`.
pub fn split_credentials(decoded: Option<&str>) -> Option<Credentials> {
    let (identifier, secret) = decoded?.split_once(':')?;
    if identifier.is_empty() || secret.is_empty() {
        return None;
    }
    Some(Credentials {
        identifier: identifier.to_string(),
        secret: secret.to_string(),
    })
}

/// All three steps, reporting which one failed.
pub fn parse_basic(header: Option<&str>) -> Result<Credentials, AuthError> {
    let token = extract_token(header).ok_or(AuthError::MalformedAuthHeader)?;
    let decoded = decode(Some(token)).ok_or(AuthError::InvalidBase64)?;
    split_credentials(Some(&decoded)).ok_or(AuthError::InvalidCredentialFormat)
}

/// Build a `Basic` header value.
pub fn encode_basic(identifier: &str, secret: &str) -> String {
    format!("{}{}", BASIC_PREFIX, STANDARD.encode(format!("{}:{}", identifier, secret)))
}
