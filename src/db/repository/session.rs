use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const SESSION_COLUMNS: &str = "id, centre_id, patient_id, therapist_id, start_at, end_at, status,
     package_sale_id, treatment_id, notes, template_id, answers, created_at, updated_at";

pub fn insert_session(conn: &Connection, session: &Session) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (id, centre_id, patient_id, therapist_id, start_at, end_at, status,
         package_sale_id, treatment_id, notes, template_id, answers, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            session.id.to_string(),
            session.centre_id.to_string(),
            session.patient_id.to_string(),
            session.therapist_id.to_string(),
            fmt_datetime(&session.start_at),
            fmt_datetime(&session.end_at),
            session.status.as_str(),
            session.package_sale_id.map(|id| id.to_string()),
            session.treatment_id.map(|id| id.to_string()),
            session.notes,
            session.template_id.map(|id| id.to_string()),
            answers_to_json(session.answers.as_ref())?,
            fmt_datetime(&session.created_at),
            fmt_datetime(&session.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_session(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Session>, DatabaseError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            session_row_from_rusqlite,
        )
        .optional()?;
    row.map(session_from_row).transpose()
}

/// Sessions in start order, narrowed by whichever filter fields are set.
pub fn list_sessions(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &SessionFilter,
) -> Result<Vec<Session>, DatabaseError> {
    let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE centre_id = ?");
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(centre_id.to_string())];

    if let Some(from) = filter.from {
        sql.push_str(" AND start_at >= ?");
        values.push(Box::new(fmt_datetime(&from)));
    }
    if let Some(to) = filter.to {
        sql.push_str(" AND start_at < ?");
        values.push(Box::new(fmt_datetime(&to)));
    }
    if let Some(therapist_id) = filter.therapist_id {
        sql.push_str(" AND therapist_id = ?");
        values.push(Box::new(therapist_id.to_string()));
    }
    if let Some(patient_id) = filter.patient_id {
        sql.push_str(" AND patient_id = ?");
        values.push(Box::new(patient_id.to_string()));
    }
    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(sale_id) = filter.package_sale_id {
        sql.push_str(" AND package_sale_id = ?");
        values.push(Box::new(sale_id.to_string()));
    }
    sql.push_str(" ORDER BY start_at ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(values.iter().map(|v| v.as_ref())),
        session_row_from_rusqlite,
    )?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(session_from_row(row?)?);
    }
    Ok(sessions)
}

/// Non-cancelled sessions of `therapist_id` that intersect `[start, end)`.
/// Touching intervals do not overlap.
pub fn find_overlapping_sessions(
    conn: &Connection,
    therapist_id: &Uuid,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude_id: Option<&Uuid>,
) -> Result<Vec<Session>, DatabaseError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE therapist_id = ?1
           AND status != 'cancelled'
           AND start_at < ?3
           AND end_at > ?2
           AND (?4 IS NULL OR id != ?4)
         ORDER BY start_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            therapist_id.to_string(),
            fmt_datetime(&start),
            fmt_datetime(&end),
            exclude_id.map(|id| id.to_string()),
        ],
        session_row_from_rusqlite,
    )?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(session_from_row(row?)?);
    }
    Ok(sessions)
}

/// Moves a session to a new slot and/or therapist.
pub fn update_session_schedule(
    conn: &Connection,
    session: &Session,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE sessions SET therapist_id = ?1, start_at = ?2, end_at = ?3, updated_at = ?4
         WHERE id = ?5 AND centre_id = ?6",
        params![
            session.therapist_id.to_string(),
            fmt_datetime(&session.start_at),
            fmt_datetime(&session.end_at),
            fmt_datetime(&session.updated_at),
            session.id.to_string(),
            session.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Session", session.id));
    }
    Ok(())
}

pub fn update_session_status(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    status: SessionStatus,
    updated_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3 AND centre_id = ?4",
        params![
            status.as_str(),
            fmt_datetime(&updated_at),
            id.to_string(),
            centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Session", id));
    }
    Ok(())
}

/// Writes notes, template and answers together.
pub fn update_session_notes(conn: &Connection, session: &Session) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE sessions SET notes = ?1, treatment_id = ?2, template_id = ?3, answers = ?4,
         updated_at = ?5
         WHERE id = ?6 AND centre_id = ?7",
        params![
            session.notes,
            session.treatment_id.map(|id| id.to_string()),
            session.template_id.map(|id| id.to_string()),
            answers_to_json(session.answers.as_ref())?,
            fmt_datetime(&session.updated_at),
            session.id.to_string(),
            session.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Session", session.id));
    }
    Ok(())
}

pub fn delete_session(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM sessions WHERE id = ?1 AND centre_id = ?2",
        params![id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Session", id));
    }
    Ok(())
}

/// Cancels every still-scheduled session of a package sale. Returns the number cancelled.
pub fn cancel_scheduled_sessions_for_sale(
    conn: &Connection,
    sale_id: &Uuid,
    updated_at: NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE sessions SET status = 'cancelled', updated_at = ?1
         WHERE package_sale_id = ?2 AND status = 'scheduled'",
        params![fmt_datetime(&updated_at), sale_id.to_string()],
    )?;
    Ok(changed)
}

/// Sessions of a sale that are still scheduled or checked in.
pub fn count_open_sessions_for_sale(
    conn: &Connection,
    centre_id: &Uuid,
    sale_id: &Uuid,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sessions
         WHERE centre_id = ?1 AND package_sale_id = ?2 AND status IN ('scheduled', 'checked_in')",
        params![centre_id.to_string(), sale_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Session counts per status for sessions starting in `[from, to)`.
pub fn count_sessions_by_status(
    conn: &Connection,
    centre_id: &Uuid,
    therapist_id: Option<&Uuid>,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<Vec<(SessionStatus, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM sessions
         WHERE centre_id = ?1 AND start_at >= ?2 AND start_at < ?3
           AND (?4 IS NULL OR therapist_id = ?4)
         GROUP BY status ORDER BY status",
    )?;
    let rows = stmt.query_map(
        params![
            centre_id.to_string(),
            fmt_datetime(&from),
            fmt_datetime(&to),
            therapist_id.map(|id| id.to_string()),
        ],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let mut counts = Vec::new();
    for row in rows {
        let (status, count) = row?;
        counts.push((SessionStatus::from_str(&status)?, count));
    }
    Ok(counts)
}

fn answers_to_json(answers: Option<&TemplateAnswers>) -> Result<Option<String>, DatabaseError> {
    answers
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(format!("unserialisable answers: {e}")))
}

struct SessionRow {
    id: String,
    centre_id: String,
    patient_id: String,
    therapist_id: String,
    start_at: String,
    end_at: String,
    status: String,
    package_sale_id: Option<String>,
    treatment_id: Option<String>,
    notes: Option<String>,
    template_id: Option<String>,
    answers: Option<String>,
    created_at: String,
    updated_at: String,
}

fn session_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<SessionRow, rusqlite::Error> {
    Ok(SessionRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        patient_id: row.get(2)?,
        therapist_id: row.get(3)?,
        start_at: row.get(4)?,
        end_at: row.get(5)?,
        status: row.get(6)?,
        package_sale_id: row.get(7)?,
        treatment_id: row.get(8)?,
        notes: row.get(9)?,
        template_id: row.get(10)?,
        answers: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn session_from_row(row: SessionRow) -> Result<Session, DatabaseError> {
    let answers = row
        .answers
        .as_deref()
        .map(serde_json::from_str::<TemplateAnswers>)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(format!("corrupt answers: {e}")))?;

    Ok(Session {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        therapist_id: parse_uuid(&row.therapist_id)?,
        start_at: parse_datetime(&row.start_at)?,
        end_at: parse_datetime(&row.end_at)?,
        status: SessionStatus::from_str(&row.status)?,
        package_sale_id: parse_opt_uuid(row.package_sale_id)?,
        treatment_id: parse_opt_uuid(row.treatment_id)?,
        notes: row.notes,
        template_id: parse_opt_uuid(row.template_id)?,
        answers,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
