//! Per-caller rate limiting middleware.
//!
//! Applies sliding-window rate limits per caller:
//! - 100 requests per minute
//! - 1000 requests per hour
//!
//! Behind the auth layer a caller is the authenticated user. Elsewhere it
//! is the client's socket address, so unauthenticated callers never share
//! a bucket and cannot mint new ones by varying request headers.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};

/// Extract a rate-limit key from the request.
fn rate_key<B>(req: &Request<B>) -> String {
    if let Some(auth) = req.extensions().get::<AuthContext>() {
        return format!("user:{}", auth.user_id);
    }
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("client:{}", addr.ip()),
        None => "client:unknown".to_string(),
    }
}

/// Per-caller rate limiting. Returns 429 if exceeded.
/// Accesses `ApiContext` from request extensions.
pub async fn limit(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req);

    // MutexGuard is !Send, dropped before .await
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter
            .check(&key)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use uuid::Uuid;

    use crate::models::Role;

    fn request() -> Request<()> {
        Request::builder()
            .uri("/api/auth/login")
            .header("Authorization", "Bearer made-up-token")
            .body(())
            .unwrap()
    }

    #[test]
    fn anonymous_callers_are_keyed_by_address() {
        let mut req = request();
        req.extensions_mut().insert(ConnectInfo(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            51000,
        )));
        assert_eq!(rate_key(&req), "client:10.0.0.7");
    }

    #[test]
    fn authenticated_callers_are_keyed_by_user() {
        let user_id = Uuid::new_v4();
        let mut req = request();
        req.extensions_mut().insert(ConnectInfo(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            51000,
        )));
        req.extensions_mut().insert(AuthContext {
            user_id,
            centre_id: Uuid::new_v4(),
            role: Role::Receptionist,
            name: "Rita".into(),
            token: "t".into(),
        });
        assert_eq!(rate_key(&req), format!("user:{user_id}"));
    }

    #[test]
    fn bearer_header_alone_does_not_pick_the_bucket() {
        let req = request();
        assert_eq!(rate_key(&req), "client:unknown");
    }
}
