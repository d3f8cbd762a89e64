//! Shared application state for the HTTP server.
//!
//! Holds the database location, the in-memory login session store and the
//! audit buffer. Each request opens its own SQLite connection.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use crate::auth::SessionStore;
use crate::db::{self, repository::AuditRecord};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Audit rows older than this are pruned on every flush.
pub const AUDIT_RETENTION_DAYS: i64 = 90;

// ═══════════════════════════════════════════════════════════
// AppState
// ═══════════════════════════════════════════════════════════

pub struct AppState {
    db_path: PathBuf,
    sessions: Mutex<SessionStore>,
    audit: AuditLogger,
}

impl AppState {
    pub fn new(db_path: impl Into<PathBuf>, session_ttl: Duration) -> Self {
        Self {
            db_path: db_path.into(),
            sessions: Mutex::new(SessionStore::new(session_ttl)),
            audit: AuditLogger::new(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a database connection (migrations run on open).
    pub fn open_db(&self) -> Result<Connection, StateError> {
        db::open_database(&self.db_path).map_err(StateError::Database)
    }

    /// The store itself, for `auth::login` / `auth::logout`.
    pub fn session_store(&self) -> &Mutex<SessionStore> {
        &self.sessions
    }

    pub fn lock_sessions(&self) -> Result<MutexGuard<'_, SessionStore>, StateError> {
        self.sessions.lock().map_err(|_| StateError::LockPoisoned)
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Record an access event; flushes to the database once the buffer is full.
    pub fn log_access(&self, centre_id: Option<&Uuid>, user_id: Option<&Uuid>, action: &str, entity: &str) {
        if self.audit.log(centre_id, user_id, action, entity) {
            if let Err(e) = self.flush_and_prune_audit() {
                tracing::warn!(error = %e, "Failed to flush audit log");
            }
        }
    }

    /// Flush the audit buffer and drop entries past retention.
    pub fn flush_and_prune_audit(&self) -> Result<usize, StateError> {
        let conn = self.open_db()?;
        let flushed = self.audit.flush_to_db(&conn)?;
        let pruned = db::repository::prune_audit_log(&conn, AUDIT_RETENTION_DAYS)?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired audit entries");
        }
        Ok(flushed)
    }
}

/// Errors from AppState operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// In-memory audit log buffer. Entries are flushed to SQLite
/// when the buffer reaches capacity or on explicit flush.
pub struct AuditLogger {
    buffer: Mutex<Vec<AuditRecord>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Log an access event to the in-memory buffer.
    /// Returns `true` if the buffer has reached flush threshold.
    pub fn log(&self, centre_id: Option<&Uuid>, user_id: Option<&Uuid>, action: &str, entity: &str) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(AuditRecord {
                timestamp: chrono::Utc::now().format(db::DATETIME_FORMAT).to_string(),
                centre_id: centre_id.map(|id| id.to_string()),
                user_id: user_id.map(|id| id.to_string()),
                action: action.to_string(),
                entity: entity.to_string(),
            });
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    pub fn flush_to_db(&self, conn: &Connection) -> Result<usize, StateError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }
        db::repository::insert_audit_entries(conn, &entries)?;
        tracing::debug!(count = entries.len(), "Flushed audit entries to database");
        Ok(entries.len())
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
