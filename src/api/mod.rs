//! HTTP API.
//!
//! Routes are nested under `/api/` and protected by a middleware stack:
//! Rate Limit → Auth → Audit → Handler. Login, centre bootstrap and the
//! health check are public.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::{api_router, build_router};
pub use server::{start_server, ApiServer, ServerError, ServerSession};
pub use types::ApiContext;
