use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_datetime, map_unique_violation, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_centre(conn: &Connection, centre: &Centre) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO centres (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![
            centre.id.to_string(),
            centre.name,
            fmt_datetime(&centre.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_centre(conn: &Connection, id: &Uuid) -> Result<Option<Centre>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, created_at FROM centres WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, name, created_at)| {
        Ok(Centre {
            id: parse_uuid(&id)?,
            name,
            created_at: parse_datetime(&created_at)?,
        })
    })
    .transpose()
}

// ─── Users ────────────────────────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, centre_id, name, email, role, password_hash, created_at";

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, centre_id, name, email, role, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.to_string(),
            user.centre_id.to_string(),
            user.name,
            user.email,
            user.role.as_str(),
            user.password_hash,
            fmt_datetime(&user.created_at),
        ],
    )
    .map_err(|e| map_unique_violation(e, "e-mail address is already registered"))?;
    Ok(())
}

pub fn get_user(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            user_row_from_rusqlite,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

/// Login lookup. E-mail addresses are unique across all centres.
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE");
    let row = conn
        .query_row(&sql, params![email.trim()], user_row_from_rusqlite)
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn list_users(conn: &Connection, centre_id: &Uuid) -> Result<Vec<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE centre_id = ?1 ORDER BY name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![centre_id.to_string()], user_row_from_rusqlite)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(user_from_row(row?)?);
    }
    Ok(users)
}

/// Updates name, e-mail and role. The password hash is changed separately.
pub fn update_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE users SET name = ?1, email = ?2, role = ?3
             WHERE id = ?4 AND centre_id = ?5",
            params![
                user.name,
                user.email,
                user.role.as_str(),
                user.id.to_string(),
                user.centre_id.to_string(),
            ],
        )
        .map_err(|e| map_unique_violation(e, "e-mail address is already registered"))?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", user.id));
    }
    Ok(())
}

pub fn set_user_password(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    password_hash: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2 AND centre_id = ?3",
        params![password_hash, id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn delete_user(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM users WHERE id = ?1 AND centre_id = ?2",
        params![id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn count_users_with_role(
    conn: &Connection,
    centre_id: &Uuid,
    role: Role,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE centre_id = ?1 AND role = ?2",
        params![centre_id.to_string(), role.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct UserRow {
    id: String,
    centre_id: String,
    name: String,
    email: String,
    role: String,
    password_hash: String,
    created_at: String,
}

fn user_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        role: row.get(4)?,
        password_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        name: row.name,
        email: row.email,
        role: Role::from_str(&row.role)?,
        password_hash: row.password_hash,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn centre_insert_and_get() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "Harbour Physio");
        let loaded = get_centre(&conn, &centre).unwrap().unwrap();
        assert_eq!(loaded.name, "Harbour Physio");
        assert!(get_centre(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn user_lookup_by_email_is_case_insensitive() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "Harbour Physio");
        let user = seed_user(&conn, &centre, "anna@clinic.test", Role::Admin);

        let found = get_user_by_email(&conn, "ANNA@clinic.test").unwrap().unwrap();
        assert_eq!(found.id, user);
        assert_eq!(found.role, Role::Admin);
        assert!(!found.password_hash.is_empty());
    }

    #[test]
    fn duplicate_email_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "Harbour Physio");
        seed_user(&conn, &centre, "anna@clinic.test", Role::Admin);

        let dup = User {
            id: Uuid::new_v4(),
            centre_id: centre,
            name: "Other Anna".into(),
            email: "anna@clinic.test".into(),
            role: Role::Receptionist,
            password_hash: "x".into(),
            created_at: super::super::now_timestamp(),
        };
        let err = insert_user(&conn, &dup).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn users_are_scoped_by_centre() {
        let conn = open_memory_database().unwrap();
        let north = seed_centre(&conn, "North");
        let south = seed_centre(&conn, "South");
        let user = seed_user(&conn, &north, "n@clinic.test", Role::Receptionist);

        assert!(get_user(&conn, &north, &user).unwrap().is_some());
        assert!(get_user(&conn, &south, &user).unwrap().is_none());
        assert!(list_users(&conn, &south).unwrap().is_empty());
        let err = delete_user(&conn, &south, &user).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn update_and_count_roles() {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let id = seed_user(&conn, &centre, "r@clinic.test", Role::Receptionist);
        assert_eq!(count_users_with_role(&conn, &centre, Role::Admin).unwrap(), 0);

        let mut user = get_user(&conn, &centre, &id).unwrap().unwrap();
        user.role = Role::Admin;
        update_user(&conn, &user).unwrap();
        assert_eq!(count_users_with_role(&conn, &centre, Role::Admin).unwrap(), 1);

        set_user_password(&conn, &centre, &id, "new-hash").unwrap();
        let reloaded = get_user(&conn, &centre, &id).unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
    }
}
