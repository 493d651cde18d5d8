//! JWT session token issuance, grounded on `NexusSocial-nexus-vr`'s
//! identity server which signs `jsonwebtoken` claims off an
//! `EnvironmentConfig`-style secret.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: u64,
    pub exp: usize,
    pub session_id: String,
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, player_id: u64, session_id: &str) -> Result<String, AuthError>;
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

pub struct JwtTokenIssuer {
    secret: String,
    ttl_secs: i64,
}

impl JwtTokenIssuer {
    pub fn new(secret: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, player_id: u64, session_id: &str) -> Result<String, AuthError> {
        let exp = (chrono_like_now_secs() + self.ttl_secs) as usize;
        let claims = Claims {
            sub: player_id,
            exp,
            session_id: session_id.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|_| AuthError::InvalidCredentials)
    }

    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidCredentials,
        })
    }
}

fn chrono_like_now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_back_to_same_claims() {
        let issuer = JwtTokenIssuer::new("a-secret-that-is-long-enough-for-tests", 3600);
        let token = issuer.issue(42, "session-abc").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.session_id, "session-abc");
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = JwtTokenIssuer::new("a-secret-that-is-long-enough-for-tests", -10);
        let token = issuer.issue(1, "s").unwrap();
        assert!(matches!(issuer.verify(&token), Err(AuthError::TokenExpired)));
    }
}
