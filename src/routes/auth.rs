/// Authentication endpoints: registration, login, token refresh, logout
/// (single device and everywhere), session listing, and current user.
///
/// Tokens travel both in the JSON body and as `httpOnly` cookies so browser
/// and API clients can use the same endpoints. The `x-device-type` header
/// labels the session being opened; it never changes security behavior.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};

use crate::auth::{
    hash_password, verify_password, CurrentUser, SessionManager, SessionView,
};
use crate::error::{AppError, AuthError};
use crate::startup::CookiePolicy;
use crate::store::{CredentialStore, DeviceType, NewPrincipal};
use crate::validators::{is_valid_email, is_valid_name};

/// Cookie lifetimes are transport policy, distinct from token expiry.
const REFRESH_COOKIE_MAX_AGE_DAYS: i64 = 30;
const ACCESS_COOKIE_MAX_AGE_DAYS: i64 = 7;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub message: String,
    pub revoked: bool,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionView>,
    pub count: usize,
}

fn session_cookie(
    name: &'static str,
    value: String,
    max_age_days: i64,
    policy: &CookiePolicy,
) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::days(max_age_days))
        .finish()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .finish();
    cookie.make_removal();
    cookie
}

fn device_type_from(req: &HttpRequest) -> DeviceType {
    DeviceType::from_header(
        req.headers()
            .get("x-device-type")
            .and_then(|value| value.to_str().ok()),
    )
}

fn refresh_token_from(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie("refreshToken") {
        return Some(cookie.value().to_string());
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid email, name, or password
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    req: HttpRequest,
    store: web::Data<dyn CredentialStore>,
    manager: web::Data<SessionManager>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    let password_hash = hash_password(&form.password)?;

    if store.find_principal_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "User already exists with this email".to_string(),
        ));
    }

    let principal = store
        .create_principal(NewPrincipal {
            email,
            name,
            password_hash,
        })
        .await?;

    let session = manager
        .create_session(&principal, device_type_from(&req))
        .await?;

    tracing::info!(user_id = %principal.id, "User registered");

    Ok(HttpResponse::Created()
        .cookie(session_cookie(
            "refreshToken",
            session.refresh_token.clone(),
            REFRESH_COOKIE_MAX_AGE_DAYS,
            &policy,
        ))
        .cookie(session_cookie(
            "accessToken",
            session.access_token.clone(),
            ACCESS_COOKIE_MAX_AGE_DAYS,
            &policy,
        ))
        .json(AuthResponse {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: session.expires_in,
            device_label: Some(session.device_label),
        }))
}

/// POST /auth/login
///
/// The same 401 and message cover "no such account" and "wrong password",
/// which keeps account existence unguessable.
pub async fn login(
    form: web::Json<LoginRequest>,
    req: HttpRequest,
    store: web::Data<dyn CredentialStore>,
    manager: web::Data<SessionManager>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let principal = store
        .find_principal_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&form.password, &principal.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let session = manager
        .create_session(&principal, device_type_from(&req))
        .await?;

    tracing::info!(user_id = %principal.id, "User logged in");

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(
            "refreshToken",
            session.refresh_token.clone(),
            REFRESH_COOKIE_MAX_AGE_DAYS,
            &policy,
        ))
        .cookie(session_cookie(
            "accessToken",
            session.access_token.clone(),
            ACCESS_COOKIE_MAX_AGE_DAYS,
            &policy,
        ))
        .json(AuthResponse {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: session.expires_in,
            device_label: Some(session.device_label),
        }))
}

/// POST /auth/refresh
///
/// Rotates the presented refresh token: the old token dies, its successor
/// and a fresh access token come back. Reusing the old token afterwards is
/// rejected with 401.
pub async fn refresh(
    req: HttpRequest,
    manager: web::Data<SessionManager>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let refresh_token = refresh_token_from(&req).ok_or(AuthError::MissingToken)?;

    let rotated = manager.rotate_session(&refresh_token).await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(
            "refreshToken",
            rotated.refresh_token.clone(),
            REFRESH_COOKIE_MAX_AGE_DAYS,
            &policy,
        ))
        .cookie(session_cookie(
            "accessToken",
            rotated.access_token.clone(),
            ACCESS_COOKIE_MAX_AGE_DAYS,
            &policy,
        ))
        .json(AuthResponse {
            access_token: rotated.access_token,
            refresh_token: rotated.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: manager.codec().access_expiry(),
            device_label: None,
        }))
}

/// POST /auth/logout
///
/// Revokes the refresh token from the session cookie and clears both
/// cookies. On this route the `Authorization` header carries the access
/// token for the auth gate, so only the cookie can name the session to
/// revoke. Revocation is idempotent; logging out an already-dead session
/// still succeeds with `revoked: false`.
pub async fn logout(
    req: HttpRequest,
    user: web::ReqData<CurrentUser>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let revoked = match req.cookie("refreshToken") {
        Some(cookie) => manager.revoke_one(cookie.value()).await?,
        None => false,
    };

    tracing::info!(user_id = %user.id, revoked = revoked, "User logged out");

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie("refreshToken"))
        .cookie(removal_cookie("accessToken"))
        .json(LogoutResponse {
            message: "User logged out successfully".to_string(),
            revoked,
        }))
}

/// POST /auth/logout-all
pub async fn logout_all(
    user: web::ReqData<CurrentUser>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    manager.revoke_all(user.id).await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie("refreshToken"))
        .cookie(removal_cookie("accessToken"))
        .json(LogoutResponse {
            message: "Logged out from all devices successfully".to_string(),
            revoked: true,
        }))
}

/// GET /auth/sessions
///
/// Active sessions for the current user. Token values never appear here,
/// only opaque session handles.
pub async fn get_sessions(
    user: web::ReqData<CurrentUser>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let sessions = manager.list_sessions(user.id).await?;
    let count = sessions.len();

    Ok(HttpResponse::Ok().json(SessionsResponse { sessions, count }))
}

/// GET /auth/me
pub async fn get_current_user(user: web::ReqData<CurrentUser>) -> HttpResponse {
    HttpResponse::Ok().json(user.into_inner())
}
