/// JWT claims (RFC 7519) for both token kinds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Which credential a token claims to be. Access tokens ride on every
/// request and are verified statelessly; refresh tokens are redeemed once
/// per rotation against the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// User email; present on access tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Unique token id; present on refresh tokens so two issuances for the
    /// same principal in the same second never produce equal token values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn access(user_id: Uuid, email: String, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            email: Some(email),
            jti: None,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    pub fn refresh(user_id: Uuid, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            email: None,
            jti: Some(Uuid::new_v4().to_string()),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// Extract the owning principal's id from the claims.
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_claims_carry_email_but_no_jti() {
        let user_id = Uuid::new_v4();
        let claims = Claims::access(user_id, "test@example.com".to_string(), 900, "test".to_string());

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("test@example.com"));
        assert!(claims.jti.is_none());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_claims_get_unique_jtis() {
        let user_id = Uuid::new_v4();
        let first = Claims::refresh(user_id, 2_592_000, "test".to_string());
        let second = Claims::refresh(user_id, 2_592_000, "test".to_string());

        assert!(first.jti.is_some());
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn user_id_extraction() {
        let user_id = Uuid::new_v4();
        let claims = Claims::access(user_id, "a@b.com".to_string(), 900, "test".to_string());
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn invalid_subject_is_malformed() {
        let mut claims = Claims::access(Uuid::new_v4(), "a@b.com".to_string(), 900, "test".to_string());
        claims.sub = "not-a-uuid".to_string();
        assert_eq!(claims.user_id(), Err(AuthError::Malformed));
    }
}
