use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::DatabaseError;

/// One persisted access event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// UTC, `YYYY-MM-DD HH:MM:SS` so it compares against SQLite's `datetime('now')`.
    pub timestamp: String,
    pub centre_id: Option<String>,
    pub user_id: Option<String>,
    pub action: String,
    pub entity: String,
}

/// Insert a batch of audit entries into the audit_log table.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditRecord]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO audit_log (timestamp, centre_id, user_id, action, entity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for e in entries {
        stmt.execute(params![e.timestamp, e.centre_id, e.user_id, e.action, e.entity])?;
    }
    Ok(())
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}

/// Audit entries for one centre within the last N days, newest first.
pub fn query_audit_by_centre(
    conn: &Connection,
    centre_id: &str,
    days: i64,
) -> Result<Vec<AuditRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, centre_id, user_id, action, entity FROM audit_log
         WHERE centre_id = ?1 AND timestamp >= datetime('now', ?2)
         ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![centre_id, format!("-{days} days")], |row| {
            Ok(AuditRecord {
                timestamp: row.get(0)?,
                centre_id: row.get(1)?,
                user_id: row.get(2)?,
                action: row.get(3)?,
                entity: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
