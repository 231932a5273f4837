/// Request logging middleware.
///
/// Logs one line at completion with method, path, status, and latency.
/// Paths and query strings may carry user input, so only the path is logged;
/// query strings and headers (which can hold credentials) are not.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;

pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerService<S>
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
        let started = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let request_id = uuid::Uuid::new_v4().to_string();

        let service = self.service.clone();

        Box::pin(async move {
            let res = service.call(req).await?;

            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = res.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request completed"
            );

            Ok(res)
        })
    }
}
