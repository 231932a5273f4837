//! Session-core behavior against the in-memory store: rotation, revocation,
//! replay rejection, and the concurrency guarantees around the live set.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use postline::auth::{hash_token, SessionManager, TokenCodec, TokenKind};
use postline::configuration::JwtSettings;
use postline::error::{AppError, AuthError, StoreError};
use postline::store::{
    CredentialStore, DeviceMeta, DeviceType, InMemoryStore, NewPrincipal, Principal,
};

fn test_jwt() -> JwtSettings {
    JwtSettings {
        access_secret: "access-secret-at-least-32-characters-long".to_string(),
        refresh_secret: "refresh-secret-at-least-32-characters-long".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 2_592_000,
        issuer: "postline-test".to_string(),
    }
}

async fn setup_with(jwt: JwtSettings) -> (Arc<InMemoryStore>, SessionManager, Principal) {
    let store = Arc::new(InMemoryStore::new());
    let codec = TokenCodec::new(&jwt);
    let manager = SessionManager::new(store.clone(), codec);

    let principal = store
        .create_principal(NewPrincipal {
            email: format!("{}@example.com", Uuid::new_v4()),
            name: "Test User".to_string(),
            password_hash: "$2b$10$placeholderhash".to_string(),
        })
        .await
        .expect("failed to create principal");

    (store, manager, principal)
}

async fn setup() -> (Arc<InMemoryStore>, SessionManager, Principal) {
    setup_with(test_jwt()).await
}

#[tokio::test]
async fn created_session_validates_immediately() {
    let (_store, manager, principal) = setup().await;

    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();
    assert_eq!(session.device_label, "Web App 1");

    let info = manager.validate_session(&session.refresh_token).await.unwrap();
    assert_eq!(info.principal_id, principal.id);
    assert_eq!(info.device_label, "Web App 1");
    assert_eq!(info.device_type, DeviceType::Web);
}

#[tokio::test]
async fn rotation_kills_the_predecessor_forever() {
    let (_store, manager, principal) = setup().await;

    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();
    let first = session.refresh_token;

    let rotated = manager.rotate_session(&first).await.unwrap();
    assert_eq!(rotated.principal_id, principal.id);
    assert_ne!(rotated.refresh_token, first);

    // The old token must never validate or rotate again.
    for _ in 0..3 {
        let validate_err = manager.validate_session(&first).await.unwrap_err();
        assert!(matches!(validate_err, AppError::Auth(AuthError::Reused)));

        let rotate_err = manager.rotate_session(&first).await.unwrap_err();
        assert!(matches!(rotate_err, AppError::Auth(AuthError::Reused)));
    }

    // The successor works, and chains.
    manager.validate_session(&rotated.refresh_token).await.unwrap();
    manager.rotate_session(&rotated.refresh_token).await.unwrap();
}

#[tokio::test]
async fn revoked_token_never_resurrects() {
    let (_store, manager, principal) = setup().await;

    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();
    let token = session.refresh_token;

    assert!(manager.revoke_one(&token).await.unwrap());
    // Idempotent: a second revoke reports the token already gone.
    assert!(!manager.revoke_one(&token).await.unwrap());

    assert!(manager.validate_session(&token).await.is_err());
    assert!(manager.rotate_session(&token).await.is_err());
}

#[tokio::test]
async fn revoke_all_logs_out_every_device() {
    let (_store, manager, principal) = setup().await;

    let web = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();
    let mobile = manager
        .create_session(&principal, DeviceType::Mobile)
        .await
        .unwrap();

    assert_eq!(manager.revoke_all(principal.id).await.unwrap(), 2);

    assert!(manager.validate_session(&web.refresh_token).await.is_err());
    assert!(manager.validate_session(&mobile.refresh_token).await.is_err());
    assert!(manager.list_sessions(principal.id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_rotations_have_exactly_one_winner() {
    for _ in 0..10 {
        let (store, manager, principal) = setup().await;
        let manager = Arc::new(manager);

        let session = manager
            .create_session(&principal, DeviceType::Web)
            .await
            .unwrap();
        let token = session.refresh_token;

        let first = tokio::spawn({
            let manager = manager.clone();
            let token = token.clone();
            async move { manager.rotate_session(&token).await }
        });
        let second = tokio::spawn({
            let manager = manager.clone();
            let token = token.clone();
            async move { manager.rotate_session(&token).await }
        });

        let outcomes = vec![first.await.unwrap(), second.await.unwrap()];
        let (winners, losers): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(Result::is_ok);

        assert_eq!(winners.len(), 1, "exactly one rotation must win");
        assert_eq!(losers.len(), 1);

        for loser in &losers {
            assert!(matches!(
                loser.as_ref().unwrap_err(),
                AppError::Auth(AuthError::Reused)
            ));
        }

        // The live set holds exactly the winner's token: never two, never
        // zero.
        let winner = winners.into_iter().next().unwrap().unwrap();
        let tokens = store.list_tokens(principal.id).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].0, hash_token(&winner.refresh_token));

        manager.validate_session(&winner.refresh_token).await.unwrap();
    }
}

#[tokio::test]
async fn live_set_holds_exactly_the_latest_issuances() {
    let (store, manager, principal) = setup().await;

    let web = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();
    let mobile = manager
        .create_session(&principal, DeviceType::Mobile)
        .await
        .unwrap();
    assert_eq!(web.device_label, "Web App 1");
    assert_eq!(mobile.device_label, "Mobile App 2");

    let rotated_web = manager.rotate_session(&web.refresh_token).await.unwrap();

    let mut expected = vec![
        hash_token(&rotated_web.refresh_token),
        hash_token(&mobile.refresh_token),
    ];
    expected.sort();

    let mut live: Vec<String> = store
        .list_tokens(principal.id)
        .await
        .unwrap()
        .into_iter()
        .map(|(hash, _)| hash)
        .collect();
    live.sort();

    assert_eq!(live, expected);

    // Rotation preserved the label stored at issuance.
    let sessions = manager.list_sessions(principal.id).await.unwrap();
    let labels: Vec<&str> = sessions.iter().map(|s| s.device_label.as_str()).collect();
    assert!(labels.contains(&"Web App 1"));
    assert!(labels.contains(&"Mobile App 2"));
}

#[tokio::test]
async fn session_views_do_not_leak_tokens() {
    let (_store, manager, principal) = setup().await;

    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();

    let views = manager.list_sessions(principal.id).await.unwrap();
    assert_eq!(views.len(), 1);

    let view = &views[0];
    assert_eq!(view.session_id.len(), 12);
    // The handle is a hash prefix, unrelated to the token value.
    assert!(!session.refresh_token.contains(&view.session_id));
    assert!(hash_token(&session.refresh_token).starts_with(&view.session_id));
}

#[tokio::test]
async fn expired_refresh_token_fails_expired_and_is_purged() {
    let mut jwt = test_jwt();
    jwt.refresh_token_expiry = -120;
    let (store, manager, principal) = setup_with(jwt).await;

    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();

    let err = manager.rotate_session(&session.refresh_token).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(AuthError::Expired)));

    // Passive expiry ends in the same terminal state as rotation/revocation.
    assert!(store.list_tokens(principal.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn token_of_unknown_provenance_is_rejected() {
    let (_store, manager, _principal) = setup().await;

    // Signed by someone else entirely.
    let mut foreign_jwt = test_jwt();
    foreign_jwt.refresh_secret = "a-completely-different-signing-secret!!".to_string();
    let foreign = TokenCodec::new(&foreign_jwt);
    let forged = foreign.issue_refresh_token(Uuid::new_v4()).unwrap();

    let err = manager.rotate_session(&forged).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(AuthError::SignatureInvalid)));

    // Signed by us, but never issued into any live set.
    let never_stored = manager.codec().issue_refresh_token(Uuid::new_v4()).unwrap();
    let err = manager.validate_session(&never_stored).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(AuthError::Reused)));
}

/// Store stub that fails every operation, standing in for a backend outage.
struct UnavailableStore;

#[async_trait]
impl CredentialStore for UnavailableStore {
    async fn find_principal_by_email(&self, _: &str) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn find_principal_by_id(&self, _: Uuid) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn create_principal(&self, _: NewPrincipal) -> Result<Principal, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn find_principal_owning_token(
        &self,
        _: &str,
    ) -> Result<Option<Principal>, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn add_token(&self, _: Uuid, _: &str, _: DeviceMeta) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn replace_token(&self, _: Uuid, _: &str, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn remove_token(&self, _: Uuid, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn clear_all_tokens(&self, _: Uuid) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
    async fn list_tokens(&self, _: Uuid) -> Result<Vec<(String, DeviceMeta)>, StoreError> {
        Err(StoreError::Unavailable("store is down".to_string()))
    }
}

#[tokio::test]
async fn access_verification_needs_no_store() {
    // Tokens minted against a live setup...
    let (_store, manager, principal) = setup().await;
    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();

    // ...still verify with a codec alone, no store in sight.
    let codec = TokenCodec::new(&test_jwt());
    let claims = codec.verify(&session.access_token, TokenKind::Access).unwrap();
    assert_eq!(claims.user_id().unwrap(), principal.id);
}

#[tokio::test]
async fn store_outage_is_not_reported_as_bad_credentials() {
    let (_store, live_manager, principal) = setup().await;
    let session = live_manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();

    let down_manager =
        SessionManager::new(Arc::new(UnavailableStore), TokenCodec::new(&test_jwt()));

    // A valid access token against a dead store: the signature check passes
    // and the failure is a store failure, not a 401-class error.
    let err = down_manager
        .authenticate_access(&session.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Store(StoreError::Unavailable(_))));

    // Same for rotation of a valid refresh token.
    let err = down_manager
        .rotate_session(&session.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Store(StoreError::Unavailable(_))));

    // But a cryptographically bad token is still an auth failure even with
    // the store down: verification happens first and touches nothing.
    let err = down_manager
        .authenticate_access("garbage.token.value")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Auth(AuthError::Malformed)));
}

#[tokio::test]
async fn deleted_principal_is_rejected_on_access() {
    let (_store, manager, principal) = setup().await;
    let session = manager
        .create_session(&principal, DeviceType::Web)
        .await
        .unwrap();

    // A different store with no such principal, same keys: the token is
    // valid but its owner is gone.
    let empty = Arc::new(InMemoryStore::new());
    let orphan_manager = SessionManager::new(empty, TokenCodec::new(&test_jwt()));

    let err = orphan_manager
        .authenticate_access(&session.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Auth(AuthError::PrincipalGone)));
}
