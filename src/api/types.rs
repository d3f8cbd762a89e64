//! Shared types for the HTTP API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::api::error::ApiError;
use crate::auth::AuthSession;
use crate::authorization::{self, AccessLevel, Permission};
use crate::models::Role;
use crate::state::AppState;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `AppState` plus API-specific caches.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<AppState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Auth context — injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions by the auth
/// middleware after successful token validation.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub centre_id: Uuid,
    pub role: Role,
    pub name: String,
    pub token: String,
}

impl AuthContext {
    pub fn from_session(session: AuthSession, token: String) -> Self {
        Self {
            user_id: session.user_id,
            centre_id: session.centre_id,
            role: session.role,
            name: session.name,
            token,
        }
    }

    /// Fail with 403 unless the caller's role holds `permission`.
    pub fn require(&self, permission: Permission) -> Result<AccessLevel, ApiError> {
        Ok(authorization::require(self.role, permission)?)
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiter — per-caller sliding window
// ═══════════════════════════════════════════════════════════

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Per-caller rate limiter with per-minute and per-hour limits.
/// Callers idle for an hour are swept at most once a minute.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
    per_hour: u32,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(100, 1000)
    }

    pub fn with_limits(per_minute: u32, per_hour: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
            per_hour,
            last_sweep: Instant::now(),
        }
    }

    /// Number of callers currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Drop callers with no request in the hour before `now`.
    pub fn prune_idle(&mut self, now: Instant) {
        self.windows
            .retain(|_, entries| entries.last().is_some_and(|ts| now.duration_since(*ts) < HOUR));
        self.last_sweep = now;
    }

    /// Check if a caller is within rate limits. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        if now.duration_since(self.last_sweep) >= MINUTE {
            self.prune_idle(now);
        }
        let entries = self.windows.entry(key.to_string()).or_default();

        entries.retain(|ts| now.duration_since(*ts) < HOUR);

        let last_minute = entries
            .iter()
            .filter(|ts| now.duration_since(**ts) < MINUTE)
            .count() as u32;
        if last_minute >= self.per_minute {
            return Err(60);
        }

        if entries.len() as u32 >= self.per_hour {
            return Err(3600);
        }

        entries.push(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
