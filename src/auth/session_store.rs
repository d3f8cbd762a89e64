//! In-memory login sessions keyed by the SHA-256 of an opaque bearer token.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::{Role, User};

/// Purge expired entries once the store grows past this size.
const PURGE_THRESHOLD: usize = 1000;

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Identity carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub centre_id: Uuid,
    pub role: Role,
    pub name: String,
}

struct Entry {
    session: AuthSession,
    expires_at: Instant,
}

/// Sliding-expiry session table. Raw tokens are never stored.
pub struct SessionStore {
    sessions: HashMap<[u8; 32], Entry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `user`.
    pub fn issue(&mut self, user: &User) -> String {
        if self.sessions.len() > PURGE_THRESHOLD {
            self.purge_expired();
        }
        let token = generate_token();
        self.sessions.insert(
            hash_token(&token),
            Entry {
                session: AuthSession {
                    user_id: user.id,
                    centre_id: user.centre_id,
                    role: user.role,
                    name: user.name.clone(),
                },
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Returns the session for a live token and pushes its expiry forward.
    pub fn validate(&mut self, token: &str) -> Option<AuthSession> {
        let key = hash_token(token);
        let now = Instant::now();
        match self.sessions.get_mut(&key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Some(entry.session.clone())
            }
            Some(_) => {
                self.sessions.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Returns `true` if the token was live.
    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(&hash_token(token)).is_some()
    }

    /// Drop every session of a user (password change, deletion).
    pub fn revoke_user(&mut self, user_id: &Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, e| &e.session.user_id != user_id);
        before - self.sessions.len()
    }

    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
