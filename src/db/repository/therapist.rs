use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_opt_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const THERAPIST_COLUMNS: &str = "id, centre_id, name, user_id, working_hours, active, created_at";

pub fn insert_therapist(conn: &Connection, therapist: &Therapist) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO therapists (id, centre_id, name, user_id, working_hours, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            therapist.id.to_string(),
            therapist.centre_id.to_string(),
            therapist.name,
            therapist.user_id.map(|id| id.to_string()),
            working_hours_json(&therapist.working_hours)?,
            therapist.active as i32,
            fmt_datetime(&therapist.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_therapist(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Therapist>, DatabaseError> {
    let sql = format!("SELECT {THERAPIST_COLUMNS} FROM therapists WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            therapist_row_from_rusqlite,
        )
        .optional()?;
    row.map(therapist_from_row).transpose()
}

/// Therapists ordered by name; this order drives round-robin assignment.
pub fn list_therapists(
    conn: &Connection,
    centre_id: &Uuid,
    active_only: bool,
) -> Result<Vec<Therapist>, DatabaseError> {
    let sql = format!(
        "SELECT {THERAPIST_COLUMNS} FROM therapists
         WHERE centre_id = ?1 AND (?2 = 0 OR active = 1)
         ORDER BY name COLLATE NOCASE ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![centre_id.to_string(), active_only as i32],
        therapist_row_from_rusqlite,
    )?;

    let mut therapists = Vec::new();
    for row in rows {
        therapists.push(therapist_from_row(row?)?);
    }
    Ok(therapists)
}

pub fn find_therapist_by_user(
    conn: &Connection,
    centre_id: &Uuid,
    user_id: &Uuid,
) -> Result<Option<Therapist>, DatabaseError> {
    let sql = format!(
        "SELECT {THERAPIST_COLUMNS} FROM therapists WHERE user_id = ?1 AND centre_id = ?2 LIMIT 1"
    );
    let row = conn
        .query_row(
            &sql,
            params![user_id.to_string(), centre_id.to_string()],
            therapist_row_from_rusqlite,
        )
        .optional()?;
    row.map(therapist_from_row).transpose()
}

pub fn update_therapist(conn: &Connection, therapist: &Therapist) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE therapists SET name = ?1, user_id = ?2, working_hours = ?3, active = ?4
         WHERE id = ?5 AND centre_id = ?6",
        params![
            therapist.name,
            therapist.user_id.map(|id| id.to_string()),
            working_hours_json(&therapist.working_hours)?,
            therapist.active as i32,
            therapist.id.to_string(),
            therapist.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Therapist", therapist.id));
    }
    Ok(())
}

pub fn count_active_therapists(conn: &Connection, centre_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM therapists WHERE centre_id = ?1 AND active = 1",
        params![centre_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn working_hours_json(hours: &[WorkingHours]) -> Result<String, DatabaseError> {
    serde_json::to_string(hours)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("JSON serialization: {e}")))
}

struct TherapistRow {
    id: String,
    centre_id: String,
    name: String,
    user_id: Option<String>,
    working_hours: String,
    active: i32,
    created_at: String,
}

fn therapist_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<TherapistRow, rusqlite::Error> {
    Ok(TherapistRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        name: row.get(2)?,
        user_id: row.get(3)?,
        working_hours: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn therapist_from_row(row: TherapistRow) -> Result<Therapist, DatabaseError> {
    let working_hours: Vec<WorkingHours> = serde_json::from_str(&row.working_hours)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("working hours JSON: {e}")))?;
    Ok(Therapist {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        name: row.name,
        user_id: parse_opt_uuid(row.user_id)?,
        working_hours,
        active: row.active != 0,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::Weekday;

    #[test]
    fn working_hours_survive_storage() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let id = seed_therapist(&conn, &centre, "Tom Physio");

        let therapist = get_therapist(&conn, &centre, &id).unwrap().unwrap();
        assert_eq!(therapist.working_hours.len(), 5);
        assert_eq!(therapist.working_hours[0].weekday, Weekday::Mon);
        assert!(therapist.active);
    }

    #[test]
    fn list_orders_by_name_and_filters_inactive() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        seed_therapist(&conn, &centre, "Zoe");
        let bea = seed_therapist(&conn, &centre, "Bea");

        let mut therapist = get_therapist(&conn, &centre, &bea).unwrap().unwrap();
        assert_eq!(list_therapists(&conn, &centre, true).unwrap()[0].name, "Bea");

        therapist.active = false;
        update_therapist(&conn, &therapist).unwrap();
        let active = list_therapists(&conn, &centre, true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Zoe");
        assert_eq!(list_therapists(&conn, &centre, false).unwrap().len(), 2);
        assert_eq!(count_active_therapists(&conn, &centre).unwrap(), 1);
    }

    #[test]
    fn find_by_linked_user() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let user = seed_user(&conn, &centre, "tom@clinic.test", Role::Therapist);
        let id = seed_therapist(&conn, &centre, "Tom Physio");

        let mut therapist = get_therapist(&conn, &centre, &id).unwrap().unwrap();
        therapist.user_id = Some(user);
        update_therapist(&conn, &therapist).unwrap();

        let found = find_therapist_by_user(&conn, &centre, &user).unwrap().unwrap();
        assert_eq!(found.id, id);
    }
}
