/// Authentication gate for protected routes.
///
/// Pulls the access token from the `accessToken` cookie or the
/// `Authorization: Bearer` header, verifies it statelessly, loads the
/// principal it names, and attaches a `CurrentUser` to the request
/// extensions for downstream handlers. Nothing on this path writes to the
/// store.
///
/// Every rejection surfaces as the uniform 401 produced by `AppError`; which
/// sub-reason applied (missing, malformed, expired, forged, owner deleted)
/// is only visible in logs. A store outage while loading the principal is
/// reported as a 5xx, not as a credential failure.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::SessionManager;
use crate::error::{AppError, AuthError};

pub struct AuthGate {
    manager: Arc<SessionManager>,
}

impl AuthGate {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGateService {
            service: Rc::new(service),
            manager: self.manager.clone(),
        }))
    }
}

pub struct AuthGateService<S> {
    service: Rc<S>,
    manager: Arc<SessionManager>,
}

fn extract_access_token(req: &ServiceRequest) -> Option<String> {
    if let Some(cookie) = req.cookie("accessToken") {
        return Some(cookie.value().to_string());
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let manager = self.manager.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let token = match extract_access_token(&req) {
                Some(token) => token,
                None => {
                    return Err(AppError::Auth(AuthError::MissingToken).into());
                }
            };

            match manager.authenticate_access(&token).await {
                Ok(user) => {
                    tracing::debug!(user_id = %user.id, "Access token verified");
                    req.extensions_mut().insert(user);
                    service.call(req).await
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}
