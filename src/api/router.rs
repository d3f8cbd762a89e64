//! HTTP API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Auth validator → 2. Rate limiter → 3. Audit logger
//!
//! Protected routes are rate limited per authenticated user; public routes
//! per client address, which needs the service built with connect info.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::state::AppState;

/// Build the API router over shared application state.
pub fn api_router(state: Arc<AppState>) -> Router {
    build_router(ApiContext::new(state))
}

/// Build router from a pre-constructed `ApiContext`.
pub fn build_router(ctx: ApiContext) -> Router {
    // Protected routes — require auth + full middleware stack
    //
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Rate limit → Audit (innermost) → Handler
    //
    // Extension must be outermost so all middleware can access ApiContext.
    // .with_state() converts Router<ApiContext> → Router<()> so the
    // from_fn layers (state = ()) are compatible.
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .route("/auth/password", post(endpoints::auth::change_password))
        .route("/centre", get(endpoints::centres::current))
        .route(
            "/users",
            get(endpoints::users::list).post(endpoints::users::create),
        )
        .route(
            "/users/:id",
            put(endpoints::users::update).delete(endpoints::users::delete),
        )
        .route("/users/:id/password", post(endpoints::users::set_password))
        .route(
            "/patients",
            get(endpoints::patients::list).post(endpoints::patients::create),
        )
        .route(
            "/patients/:id",
            get(endpoints::patients::get)
                .put(endpoints::patients::update)
                .delete(endpoints::patients::delete),
        )
        .route("/patients/:id/history", get(endpoints::patients::history))
        .route(
            "/therapists",
            get(endpoints::therapists::list).post(endpoints::therapists::create),
        )
        .route(
            "/therapists/:id",
            get(endpoints::therapists::get)
                .put(endpoints::therapists::update)
                .delete(endpoints::therapists::deactivate),
        )
        .route(
            "/treatments",
            get(endpoints::catalogue::list_treatments).post(endpoints::catalogue::create_treatment),
        )
        .route(
            "/treatments/:id",
            get(endpoints::catalogue::get_treatment)
                .put(endpoints::catalogue::update_treatment)
                .delete(endpoints::catalogue::delete_treatment),
        )
        .route(
            "/packages",
            get(endpoints::catalogue::list_packages).post(endpoints::catalogue::create_package),
        )
        .route(
            "/packages/:id",
            get(endpoints::catalogue::get_package)
                .put(endpoints::catalogue::update_package)
                .delete(endpoints::catalogue::deactivate_package),
        )
        .route(
            "/sales",
            get(endpoints::sales::list).post(endpoints::sales::sell),
        )
        .route("/sales/:id", get(endpoints::sales::get))
        .route(
            "/sessions",
            get(endpoints::sessions::list).post(endpoints::sessions::book),
        )
        .route(
            "/sessions/:id",
            get(endpoints::sessions::get).delete(endpoints::sessions::delete),
        )
        .route("/sessions/:id/schedule", put(endpoints::sessions::reschedule))
        .route("/sessions/:id/status", post(endpoints::sessions::update_status))
        .route("/sessions/:id/notes", put(endpoints::sessions::update_notes))
        .route("/calendar", get(endpoints::calendar::view))
        .route(
            "/bills",
            get(endpoints::bills::list).post(endpoints::bills::create),
        )
        .route("/bills/revenue", get(endpoints::bills::revenue))
        .route("/bills/:id", get(endpoints::bills::get))
        .route("/bills/:id/pay", post(endpoints::bills::pay))
        .route("/bills/:id/void", post(endpoints::bills::void))
        .route(
            "/templates",
            get(endpoints::templates::list).post(endpoints::templates::create),
        )
        .route(
            "/templates/:id",
            get(endpoints::templates::get)
                .put(endpoints::templates::update)
                .delete(endpoints::templates::delete),
        )
        .route("/dashboard/admin", get(endpoints::dashboard::admin))
        .route("/dashboard/reception", get(endpoints::dashboard::reception))
        .route("/dashboard/therapist", get(endpoints::dashboard::therapist))
        .route("/audit", get(endpoints::dashboard::audit))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes (rate-limited per client address, no auth required)
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/centres", post(endpoints::centres::bootstrap))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
}
