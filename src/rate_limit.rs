//! Per-client request limiting. Each peer address gets `requests` requests
//! per `window`, refilled gradually; extra requests get a 429.

use std::future::{ready, Ready};
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, ResponseError};
use futures::future::LocalBoxFuture;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use crate::error::MNError;

type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

#[derive(Clone)]
pub struct RateLimit {
    limiter: Option<Arc<IpRateLimiter>>,
}

impl RateLimit {
    /// Zero requests or an empty window turns limiting off.
    pub fn new(requests: u32, window: Duration) -> Self {
        let limiter = NonZeroU32::new(requests)
            .and_then(|burst| Quota::with_period(window / burst.get()).map(|q| q.allow_burst(burst)))
            .map(|quota| Arc::new(RateLimiter::keyed(quota)));
        if limiter.is_none() {
            tracing::warn!("Rate limiting is disabled");
        }
        RateLimit { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service,
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: S,
    limiter: Option<Arc<IpRateLimiter>>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(limiter) = &self.limiter {
            let client = req
                .peer_addr()
                .map(|addr| addr.ip())
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            if limiter.check_key(&client).is_err() {
                tracing::warn!("Rate limit exceeded for {}", client);
                let response = MNError::RateLimited.error_response().map_into_right_body();
                return Box::pin(ready(Ok(req.into_response(response))));
            }
        }
        let fut = self.service.call(req);
        Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::{self as actix_test, TestRequest};
    use actix_web::{web, App, HttpResponse};

    const PEER: &str = "10.0.0.1:4000";

    #[actix_rt::test]
    async fn request_past_quota_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(100, Duration::from_secs(900)))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;
        for _ in 0..100 {
            let req = TestRequest::get().uri("/").peer_addr(PEER.parse().unwrap());
            let resp = actix_test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let req = TestRequest::get().uri("/").peer_addr(PEER.parse().unwrap());
        let resp = actix_test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert!(body["error"].is_string());

        let other = TestRequest::get().uri("/").peer_addr("10.0.0.2:4000".parse().unwrap());
        let resp = actix_test::call_service(&app, other.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn zero_requests_disables_limiting() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(0, Duration::from_secs(900)))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;
        for _ in 0..150 {
            let resp = actix_test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }
}
