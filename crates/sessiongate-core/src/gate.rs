//! Per-request authentication gate.
//!
//! Each request moves from unchecked to exactly one terminal decision:
//! open (no-op provider), path exempt, credential missing (401), identity
//! unresolved (403), or authenticated.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::paths::ExcludedPaths;
use crate::provider::{AuthProvider, AuthRequest};
use crate::user::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Authentication is switched off.
    Open,
    PathExempt,
    /// Neither an Authorization header nor a session cookie was sent.
    CredentialMissing,
    /// Credentials were sent but did not resolve to a user.
    IdentityUnresolved,
    Authenticated(User),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            GateDecision::Open | GateDecision::PathExempt | GateDecision::Authenticated(_)
        )
    }

    pub fn status(&self) -> u16 {
        match self.rejection() {
            Some(rejection) => rejection.status(),
            None => 200,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            GateDecision::CredentialMissing => Some(Rejection::Unauthorized),
            GateDecision::IdentityUnresolved => Some(Rejection::Forbidden),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            GateDecision::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            GateDecision::Open => "open",
            GateDecision::PathExempt => "path_exempt",
            GateDecision::CredentialMissing => "credential_missing",
            GateDecision::IdentityUnresolved => "identity_unresolved",
            GateDecision::Authenticated(_) => "authenticated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unauthorized,
    Forbidden,
}

impl Rejection {
    pub fn status(&self) -> u16 {
        match self {
            Rejection::Unauthorized => 401,
            Rejection::Forbidden => 403,
        }
    }

    /// JSON error body for the response.
    pub fn body(&self) -> String {
        let error = match self {
            Rejection::Unauthorized => "Unauthorized",
            Rejection::Forbidden => "Forbidden",
        };
        json!({ "error": error }).to_string()
    }
}

pub struct RequestGate {
    provider: Arc<dyn AuthProvider>,
    excluded: ExcludedPaths,
}

impl RequestGate {
    pub fn new(provider: Arc<dyn AuthProvider>, excluded: ExcludedPaths) -> Self {
        Self { provider, excluded }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub fn check(&self, request: &AuthRequest) -> GateDecision {
        let decision = self.decide(request);
        if decision.is_allowed() {
            debug!(path = %request.path, decision = decision.label(), "Request allowed");
        } else {
            info!(path = %request.path, decision = decision.label(), status = decision.status(), "Request rejected");
        }
        decision
    }

    fn decide(&self, request: &AuthRequest) -> GateDecision {
        if self.provider.is_noop() {
            return GateDecision::Open;
        }
        if !self.provider.require_auth(Some(request.path.as_str()), &self.excluded) {
            return GateDecision::PathExempt;
        }
        if self.provider.authorization_header(request).is_none()
            && self.provider.session_cookie(request).is_none()
        {
            return GateDecision::CredentialMissing;
        }
        match self.provider.current_user(request) {
            Some(user) => GateDecision::Authenticated(user),
            None => GateDecision::IdentityUnresolved,
        }
    }

    /// Run the gate and attach the identity to the request on success.
    pub fn authorize(&self, request: &mut AuthRequest) -> Result<(), Rejection> {
        let decision = self.check(request);
        if let Some(rejection) = decision.rejection() {
            return Err(rejection);
        }
        if let GateDecision::Authenticated(user) = decision {
            request.current_user = Some(user);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::DEFAULT_EXCLUDED_PATHS;
    use crate::provider::NoAuth;

    /// Accepts any request carrying the header `Authorization: let-me-in`.
    struct FixedProvider;

    impl AuthProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn current_user(&self, request: &AuthRequest) -> Option<User> {
            (self.authorization_header(request) == Some("let-me-in"))
                .then(|| User::new("u1", "alice@example.com"))
        }
    }

    fn gate(provider: Arc<dyn AuthProvider>) -> RequestGate {
        RequestGate::new(provider, ExcludedPaths::new(DEFAULT_EXCLUDED_PATHS))
    }

    #[test]
    fn test_noop_provider_allows_everything() {
        let gate = gate(Arc::new(NoAuth));
        assert_eq!(gate.check(&AuthRequest::new("/api/v1/users")), GateDecision::Open);
    }

    #[test]
    fn test_exempt_path_skips_credentials() {
        let gate = gate(Arc::new(FixedProvider));
        assert_eq!(gate.check(&AuthRequest::new("/api/v1/status")), GateDecision::PathExempt);
    }

    #[test]
    fn test_missing_credentials_is_401() {
        let gate = gate(Arc::new(FixedProvider));
        let decision = gate.check(&AuthRequest::new("/api/v1/users"));
        assert_eq!(decision, GateDecision::CredentialMissing);
        assert_eq!(decision.status(), 401);
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_unresolved_identity_is_403() {
        let gate = gate(Arc::new(FixedProvider));
        let request = AuthRequest::new("/api/v1/users").with_authorization("wrong");
        let decision = gate.check(&request);
        assert_eq!(decision, GateDecision::IdentityUnresolved);
        assert_eq!(decision.status(), 403);
    }

    #[test]
    fn test_authenticated_request_gets_user_attached() {
        let gate = gate(Arc::new(FixedProvider));
        let mut request = AuthRequest::new("/api/v1/users").with_authorization("let-me-in");
        assert!(gate.authorize(&mut request).is_ok());
        assert_eq!(request.current_user.unwrap().id, "u1");
    }

    #[test]
    fn test_authorize_rejection() {
        let gate = gate(Arc::new(FixedProvider));
        let mut request = AuthRequest::new("/api/v1/users");
        let rejection = gate.authorize(&mut request).unwrap_err();
        assert_eq!(rejection, Rejection::Unauthorized);
        assert_eq!(rejection.body(), r#"{"error":"Unauthorized"}"#);
        assert!(request.current_user.is_none());
        assert_eq!(Rejection::Forbidden.body(), r#"{"error":"Forbidden"}"#);
    }

    #[test]
    fn test_cookie_from_provider_without_sessions_does_not_count() {
        let gate = gate(Arc::new(FixedProvider));
        let request = AuthRequest::new("/api/v1/users").with_cookie("_sid", "abc");
        assert_eq!(gate.check(&request), GateDecision::CredentialMissing);
    }
}
