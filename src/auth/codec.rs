/// Token codec: a pure function of (claims, key, lifetime) in one direction
/// and (token, key) in the other. Verification never touches the store,
/// which is what keeps the per-request hot path free of I/O.
///
/// Access and refresh tokens use separate signing secrets, so presenting one
/// kind where the other is expected fails signature verification.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_expiry: i64,
    refresh_expiry: i64,
    issuer: String,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            access_expiry: settings.access_token_expiry,
            refresh_expiry: settings.refresh_token_expiry,
            issuer: settings.issuer.clone(),
        }
    }

    /// Access-token lifetime in seconds, surfaced to clients as `expires_in`.
    pub fn access_expiry(&self) -> i64 {
        self.access_expiry
    }

    pub fn issue_access_token(&self, user_id: Uuid, email: &str) -> Result<String, AppError> {
        let claims = Claims::access(
            user_id,
            email.to_string(),
            self.access_expiry,
            self.issuer.clone(),
        );

        encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(|e| AppError::Internal(format!("access token generation failed: {}", e)))
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = Claims::refresh(user_id, self.refresh_expiry, self.issuer.clone());

        encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(|e| AppError::Internal(format!("refresh token generation failed: {}", e)))
    }

    /// Verifies signature, expiry, and issuer for the expected token kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                _ => AuthError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> JwtSettings {
        JwtSettings {
            access_secret: "access-secret-at-least-32-characters-long".to_string(),
            refresh_secret: "refresh-secret-at-least-32-characters-long".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 2_592_000,
            issuer: "postline-test".to_string(),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let codec = TokenCodec::new(&test_settings());
        let user_id = Uuid::new_v4();

        let token = codec.issue_access_token(user_id, "test@example.com").unwrap();
        let claims = codec.verify(&token, TokenKind::Access).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email.as_deref(), Some("test@example.com"));
        assert_eq!(claims.iss, "postline-test");
    }

    #[test]
    fn refresh_token_round_trips_with_jti() {
        let codec = TokenCodec::new(&test_settings());
        let user_id = Uuid::new_v4();

        let token = codec.issue_refresh_token(user_id).unwrap();
        let claims = codec.verify(&token, TokenKind::Refresh).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert!(claims.jti.is_some());
    }

    #[test]
    fn consecutive_refresh_tokens_are_distinct() {
        let codec = TokenCodec::new(&test_settings());
        let user_id = Uuid::new_v4();

        let first = codec.issue_refresh_token(user_id).unwrap();
        let second = codec.issue_refresh_token(user_id).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn tampered_token_fails_with_signature_invalid() {
        let codec = TokenCodec::new(&test_settings());
        let token = codec
            .issue_access_token(Uuid::new_v4(), "test@example.com")
            .unwrap();

        // Flip the signature segment.
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_signature = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        parts[2] = forged_signature;
        let tampered = parts.join(".");

        assert_eq!(
            codec.verify(&tampered, TokenKind::Access).unwrap_err(),
            AuthError::SignatureInvalid
        );
    }

    #[test]
    fn expired_token_fails_with_expired_not_signature_invalid() {
        let mut settings = test_settings();
        settings.access_token_expiry = -120;
        let codec = TokenCodec::new(&settings);

        let token = codec
            .issue_access_token(Uuid::new_v4(), "test@example.com")
            .unwrap();

        assert_eq!(
            codec.verify(&token, TokenKind::Access).unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn kind_confusion_is_rejected() {
        let codec = TokenCodec::new(&test_settings());
        let user_id = Uuid::new_v4();

        let refresh = codec.issue_refresh_token(user_id).unwrap();
        let access = codec.issue_access_token(user_id, "a@b.com").unwrap();

        assert_eq!(
            codec.verify(&refresh, TokenKind::Access).unwrap_err(),
            AuthError::SignatureInvalid
        );
        assert_eq!(
            codec.verify(&access, TokenKind::Refresh).unwrap_err(),
            AuthError::SignatureInvalid
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = TokenCodec::new(&test_settings());
        assert_eq!(
            codec.verify("not.a.token", TokenKind::Access).unwrap_err(),
            AuthError::Malformed
        );
        assert_eq!(
            codec.verify("", TokenKind::Access).unwrap_err(),
            AuthError::Malformed
        );
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let codec = TokenCodec::new(&test_settings());
        let mut other_settings = test_settings();
        other_settings.issuer = "someone-else".to_string();
        let other = TokenCodec::new(&other_settings);

        let token = other
            .issue_access_token(Uuid::new_v4(), "a@b.com")
            .unwrap();
        assert!(codec.verify(&token, TokenKind::Access).is_err());
    }
}
