//! Module E: auth subsystem.
//!
//! Handles Login/Logout/Heartbeat, consulting the Security Gate's
//! `login` bucket before touching the credential verifier, then minting a
//! session token through the `TokenIssuer` seam.

pub mod credential;
pub mod token;

pub use credential::{CredentialVerifier, InMemoryVerifier};
pub use token::{Claims, JwtTokenIssuer, TokenIssuer};

use crate::error::AuthError;
use crate::security::SecurityGate;

pub struct AuthSubsystem<V, T> {
    verifier: V,
    issuer: T,
    security: std::sync::Arc<SecurityGate>,
}

impl<V, T> AuthSubsystem<V, T>
where
    V: CredentialVerifier,
    T: TokenIssuer,
{
    pub fn new(verifier: V, issuer: T, security: std::sync::Arc<SecurityGate>) -> Self {
        Self {
            verifier,
            issuer,
            security,
        }
    }

    pub fn login(
        &self,
        remote_key: &str,
        account: &str,
        credential: &str,
        player_id: u64,
        session_id: &str,
    ) -> Result<String, AuthError> {
        if !self.security.allow(remote_key, "login") {
            return Err(AuthError::TooManyAttempts);
        }
        if !self.verifier.verify(account, credential) {
            return Err(AuthError::InvalidCredentials);
        }
        self.issuer.issue(player_id, session_id)
    }

    pub fn heartbeat(&self, token: &str) -> Result<Claims, AuthError> {
        self.issuer.verify(token)
    }

    pub fn logout(&self, _token: &str) {
        // Session teardown is owned by the registry; auth has nothing
        // further to invalidate until token revocation lists exist.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityGate;
    use std::sync::Arc;

    fn subsystem() -> AuthSubsystem<InMemoryVerifier, JwtTokenIssuer> {
        AuthSubsystem::new(
            InMemoryVerifier::default().with_account("alice", "hunter2"),
            JwtTokenIssuer::new("a-secret-that-is-long-enough-for-tests", 3600),
            Arc::new(SecurityGate::default()),
        )
    }

    #[test]
    fn login_with_good_credentials_issues_token() {
        let auth = subsystem();
        let token = auth.login("1.2.3.4", "alice", "hunter2", 1, "sess").unwrap();
        assert!(auth.heartbeat(&token).is_ok());
    }

    #[test]
    fn login_with_bad_credentials_is_rejected() {
        let auth = subsystem();
        let err = auth.login("1.2.3.4", "alice", "wrong", 1, "sess").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
