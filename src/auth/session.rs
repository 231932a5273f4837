/// Session lifecycle: issuance, validation, rotation, enumeration, and
/// revocation of refresh tokens, orchestrated against the credential store.
///
/// Refresh tokens are hashed with SHA-256 before they touch the store; the
/// plaintext exists only in transit to the client. Log lines carry opaque
/// session handles (a short hash prefix), never credential material.
///
/// Per-token state machine: issued tokens are Active; rotation, revocation,
/// and expiry all end in Dead, and Dead is terminal. Rotation is the one
/// security-critical transition: the store's conditional swap guarantees a
/// single winner when the same token is redeemed concurrently, and the loser
/// is told to re-authenticate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::claims::TokenKind;
use crate::auth::codec::TokenCodec;
use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, DeviceMeta, DeviceType, Principal};

const SESSION_HANDLE_LENGTH: usize = 12;

/// SHA-256 hex digest of a token. This is the only form a refresh token is
/// ever stored or indexed in.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn session_handle(token_hash: &str) -> String {
    token_hash.chars().take(SESSION_HANDLE_LENGTH).collect()
}

/// The principal as seen by request handlers: identity without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Principal> for CurrentUser {
    fn from(principal: Principal) -> Self {
        Self {
            id: principal.id,
            email: principal.email,
            name: principal.name,
            created_at: principal.created_at,
        }
    }
}

/// Result of opening a new session at registration or login.
#[derive(Debug)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub device_label: String,
    pub expires_in: i64,
}

/// Result of a successful rotation.
#[derive(Debug)]
pub struct RotatedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub principal_id: Uuid,
}

/// What a live refresh token resolves to.
#[derive(Debug)]
pub struct SessionInfo {
    pub principal_id: Uuid,
    pub session_id: String,
    pub device_label: String,
    pub device_type: DeviceType,
}

/// Read-only projection for the "active sessions" listing. Exposes an opaque
/// handle, never the token value.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub device_label: String,
    pub device_type: DeviceType,
    pub issued_at: DateTime<Utc>,
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Mints an access/refresh pair and records the refresh token in the
    /// principal's live set. The device label is derived from the current
    /// device count and stored with the token, so it stays stable however
    /// the set is mutated afterwards.
    pub async fn create_session(
        &self,
        principal: &Principal,
        device_type: DeviceType,
    ) -> Result<SessionTokens, AppError> {
        let existing = self.store.list_tokens(principal.id).await?.len();
        let device_label = format!("{} {}", device_type.label_prefix(), existing + 1);

        let access_token = self.codec.issue_access_token(principal.id, &principal.email)?;
        let refresh_token = self.codec.issue_refresh_token(principal.id)?;
        let token_hash = hash_token(&refresh_token);

        self.store
            .add_token(
                principal.id,
                &token_hash,
                DeviceMeta {
                    device_label: device_label.clone(),
                    device_type,
                    issued_at: Utc::now(),
                },
            )
            .await?;

        tracing::info!(
            user_id = %principal.id,
            session_id = %session_handle(&token_hash),
            device_type = device_type.as_str(),
            "Session created"
        );

        Ok(SessionTokens {
            access_token,
            refresh_token,
            device_label,
            expires_in: self.codec.access_expiry(),
        })
    }

    /// Resolves a refresh token to its live session, or fails `Unauthorized`.
    /// Covers never-issued, rotated-away, revoked, and expired tokens alike.
    pub async fn validate_session(&self, refresh_token: &str) -> Result<SessionInfo, AppError> {
        self.verify_refresh(refresh_token).await?;

        let token_hash = hash_token(refresh_token);
        let principal = self
            .store
            .find_principal_owning_token(&token_hash)
            .await?
            .ok_or(AuthError::Reused)?;

        let meta = self
            .store
            .list_tokens(principal.id)
            .await?
            .into_iter()
            .find(|(hash, _)| hash == &token_hash)
            .map(|(_, meta)| meta)
            .ok_or(AuthError::Reused)?;

        Ok(SessionInfo {
            principal_id: principal.id,
            session_id: session_handle(&token_hash),
            device_label: meta.device_label,
            device_type: meta.device_type,
        })
    }

    /// Redeems a refresh token: the old token is atomically replaced by a
    /// fresh one in the owner's live set, and a new access token is minted.
    ///
    /// Redemption of a token that is signed by us but no longer live fails
    /// `Reused`, the detection signal for token replay. When two requests
    /// race on the same token, the store's conditional swap lets exactly one
    /// through; the other observes the swap failing and is rejected the same
    /// way, so it re-authenticates instead of trusting a token that was
    /// never persisted.
    pub async fn rotate_session(&self, old_token: &str) -> Result<RotatedSession, AppError> {
        let claims = self.verify_refresh(old_token).await?;
        let old_hash = hash_token(old_token);

        let principal = match self.store.find_principal_owning_token(&old_hash).await? {
            Some(principal) => principal,
            None => {
                tracing::warn!(
                    principal = %claims.sub,
                    "Replay of a rotated or revoked refresh token"
                );
                return Err(AuthError::Reused.into());
            }
        };

        let refresh_token = self.codec.issue_refresh_token(principal.id)?;
        let new_hash = hash_token(&refresh_token);

        let replaced = self
            .store
            .replace_token(principal.id, &old_hash, &new_hash)
            .await?;
        if !replaced {
            tracing::warn!(
                user_id = %principal.id,
                "Lost rotation race; token already consumed"
            );
            return Err(AuthError::Reused.into());
        }

        let access_token = self.codec.issue_access_token(principal.id, &principal.email)?;

        tracing::info!(
            user_id = %principal.id,
            session_id = %session_handle(&new_hash),
            "Session rotated"
        );

        Ok(RotatedSession {
            access_token,
            refresh_token,
            principal_id: principal.id,
        })
    }

    /// Removes one session. Idempotent: returns `false` when the token was
    /// already gone.
    pub async fn revoke_one(&self, refresh_token: &str) -> Result<bool, AppError> {
        let token_hash = hash_token(refresh_token);

        let principal = match self.store.find_principal_owning_token(&token_hash).await? {
            Some(principal) => principal,
            None => return Ok(false),
        };

        let removed = self.store.remove_token(principal.id, &token_hash).await?;
        if removed {
            tracing::info!(
                user_id = %principal.id,
                session_id = %session_handle(&token_hash),
                "Session revoked"
            );
        }
        Ok(removed)
    }

    /// Logs the principal out everywhere.
    pub async fn revoke_all(&self, principal_id: Uuid) -> Result<u64, AppError> {
        let removed = self.store.clear_all_tokens(principal_id).await?;
        tracing::info!(user_id = %principal_id, sessions = removed, "All sessions revoked");
        Ok(removed)
    }

    pub async fn list_sessions(&self, principal_id: Uuid) -> Result<Vec<SessionView>, AppError> {
        let tokens = self.store.list_tokens(principal_id).await?;

        Ok(tokens
            .into_iter()
            .map(|(hash, meta)| SessionView {
                session_id: session_handle(&hash),
                device_label: meta.device_label,
                device_type: meta.device_type,
                issued_at: meta.issued_at,
            })
            .collect())
    }

    /// Per-request authentication: verify the access token statelessly, then
    /// load the principal it names. Store trouble surfaces as a store
    /// failure, never as a credential failure.
    pub async fn authenticate_access(&self, access_token: &str) -> Result<CurrentUser, AppError> {
        let claims = self.codec.verify(access_token, TokenKind::Access)?;
        let user_id = claims.user_id()?;

        let principal = self
            .store
            .find_principal_by_id(user_id)
            .await?
            .ok_or(AuthError::PrincipalGone)?;

        Ok(principal.into())
    }

    /// Verifies a refresh token cryptographically; an expired token also
    /// gets its store entry purged so the live set does not accumulate
    /// corpses.
    async fn verify_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<crate::auth::claims::Claims, AppError> {
        match self.codec.verify(refresh_token, TokenKind::Refresh) {
            Ok(claims) => Ok(claims),
            Err(AuthError::Expired) => {
                let token_hash = hash_token(refresh_token);
                if let Ok(Some(principal)) =
                    self.store.find_principal_owning_token(&token_hash).await
                {
                    if let Err(e) = self.store.remove_token(principal.id, &token_hash).await {
                        tracing::debug!(error = %e, "Could not purge expired refresh token");
                    }
                }
                Err(AuthError::Expired.into())
            }
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_opaque() {
        let token = "header.payload.signature";
        let first = hash_token(token);
        let second = hash_token(token);

        assert_eq!(first, second);
        assert_ne!(first, token);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn handles_are_short_prefixes() {
        let hash = hash_token("some token");
        let handle = session_handle(&hash);

        assert_eq!(handle.len(), SESSION_HANDLE_LENGTH);
        assert!(hash.starts_with(&handle));
    }
}
