//! Audit logging middleware.
//!
//! Logs every authenticated API request with user, centre, method, path
//! and response status. Runs innermost (after auth has injected AuthContext).

use axum::extract::OriginalUri;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::{ApiContext, AuthContext};

/// Log API access for audit trail.
/// Accesses `ApiContext` from request extensions.
pub async fn log_access(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    // Nested routers see a stripped URI; record the full request path.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let ctx = req.extensions().get::<ApiContext>().cloned();
    let caller = req.extensions().get::<AuthContext>().cloned();

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        let status = response.status().as_u16();
        ctx.state.log_access(
            caller.as_ref().map(|c| &c.centre_id),
            caller.as_ref().map(|c| &c.user_id),
            &format!("{method} {path}"),
            &format!("status:{status}"),
        );
    }

    response
}
