use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

// ─── Treatments ───────────────────────────────────────────────────────────────

const TREATMENT_COLUMNS: &str = "id, centre_id, name, price_cents, duration_minutes, active, created_at";

pub fn insert_treatment(conn: &Connection, treatment: &Treatment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO treatments (id, centre_id, name, price_cents, duration_minutes, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            treatment.id.to_string(),
            treatment.centre_id.to_string(),
            treatment.name,
            treatment.price_cents,
            treatment.duration_minutes,
            treatment.active as i32,
            fmt_datetime(&treatment.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_treatment(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<Treatment>, DatabaseError> {
    let sql = format!("SELECT {TREATMENT_COLUMNS} FROM treatments WHERE id = ?1 AND centre_id = ?2");
    conn.query_row(&sql, params![id.to_string(), centre_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, u32>(4)?,
            row.get::<_, i32>(5)?,
            row.get::<_, String>(6)?,
        ))
    })
    .optional()?
    .map(treatment_from_tuple)
    .transpose()
}

pub fn list_treatments(
    conn: &Connection,
    centre_id: &Uuid,
    active_only: bool,
) -> Result<Vec<Treatment>, DatabaseError> {
    let sql = format!(
        "SELECT {TREATMENT_COLUMNS} FROM treatments
         WHERE centre_id = ?1 AND (?2 = 0 OR active = 1)
         ORDER BY name COLLATE NOCASE ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![centre_id.to_string(), active_only as i32], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, u32>(4)?,
            row.get::<_, i32>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut treatments = Vec::new();
    for row in rows {
        treatments.push(treatment_from_tuple(row?)?);
    }
    Ok(treatments)
}

pub fn update_treatment(conn: &Connection, treatment: &Treatment) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE treatments SET name = ?1, price_cents = ?2, duration_minutes = ?3, active = ?4
         WHERE id = ?5 AND centre_id = ?6",
        params![
            treatment.name,
            treatment.price_cents,
            treatment.duration_minutes,
            treatment.active as i32,
            treatment.id.to_string(),
            treatment.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Treatment", treatment.id));
    }
    Ok(())
}

/// Treatments are referenced by bills and sessions, so they are only ever retired.
pub fn deactivate_treatment(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE treatments SET active = 0 WHERE id = ?1 AND centre_id = ?2",
        params![id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Treatment", id));
    }
    Ok(())
}

type TreatmentTuple = (String, String, String, i64, u32, i32, String);

fn treatment_from_tuple(t: TreatmentTuple) -> Result<Treatment, DatabaseError> {
    let (id, centre_id, name, price_cents, duration_minutes, active, created_at) = t;
    Ok(Treatment {
        id: parse_uuid(&id)?,
        centre_id: parse_uuid(&centre_id)?,
        name,
        price_cents,
        duration_minutes,
        active: active != 0,
        created_at: parse_datetime(&created_at)?,
    })
}

// ─── Packages ─────────────────────────────────────────────────────────────────

const PACKAGE_COLUMNS: &str = "id, centre_id, name, session_count, session_duration_minutes,
     price_cents, discount_percent, interval_days, validity_days, active, created_at";

pub fn insert_package(conn: &Connection, package: &PackageDef) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO packages (id, centre_id, name, session_count, session_duration_minutes,
         price_cents, discount_percent, interval_days, validity_days, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            package.id.to_string(),
            package.centre_id.to_string(),
            package.name,
            package.session_count,
            package.session_duration_minutes,
            package.price_cents,
            package.discount_percent,
            package.interval_days,
            package.validity_days,
            package.active as i32,
            fmt_datetime(&package.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_package(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<Option<PackageDef>, DatabaseError> {
    let sql = format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = ?1 AND centre_id = ?2");
    let row = conn
        .query_row(
            &sql,
            params![id.to_string(), centre_id.to_string()],
            package_row_from_rusqlite,
        )
        .optional()?;
    row.map(package_from_row).transpose()
}

pub fn list_packages(
    conn: &Connection,
    centre_id: &Uuid,
    active_only: bool,
) -> Result<Vec<PackageDef>, DatabaseError> {
    let sql = format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages
         WHERE centre_id = ?1 AND (?2 = 0 OR active = 1)
         ORDER BY name COLLATE NOCASE ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![centre_id.to_string(), active_only as i32],
        package_row_from_rusqlite,
    )?;

    let mut packages = Vec::new();
    for row in rows {
        packages.push(package_from_row(row?)?);
    }
    Ok(packages)
}

pub fn update_package(conn: &Connection, package: &PackageDef) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE packages SET name = ?1, session_count = ?2, session_duration_minutes = ?3,
         price_cents = ?4, discount_percent = ?5, interval_days = ?6, validity_days = ?7, active = ?8
         WHERE id = ?9 AND centre_id = ?10",
        params![
            package.name,
            package.session_count,
            package.session_duration_minutes,
            package.price_cents,
            package.discount_percent,
            package.interval_days,
            package.validity_days,
            package.active as i32,
            package.id.to_string(),
            package.centre_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Package", package.id));
    }
    Ok(())
}

pub fn deactivate_package(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE packages SET active = 0 WHERE id = ?1 AND centre_id = ?2",
        params![id.to_string(), centre_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Package", id));
    }
    Ok(())
}

struct PackageRow {
    id: String,
    centre_id: String,
    name: String,
    session_count: u32,
    session_duration_minutes: u32,
    price_cents: i64,
    discount_percent: f64,
    interval_days: u32,
    validity_days: u32,
    active: i32,
    created_at: String,
}

fn package_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PackageRow, rusqlite::Error> {
    Ok(PackageRow {
        id: row.get(0)?,
        centre_id: row.get(1)?,
        name: row.get(2)?,
        session_count: row.get(3)?,
        session_duration_minutes: row.get(4)?,
        price_cents: row.get(5)?,
        discount_percent: row.get(6)?,
        interval_days: row.get(7)?,
        validity_days: row.get(8)?,
        active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn package_from_row(row: PackageRow) -> Result<PackageDef, DatabaseError> {
    Ok(PackageDef {
        id: parse_uuid(&row.id)?,
        centre_id: parse_uuid(&row.centre_id)?,
        name: row.name,
        session_count: row.session_count,
        session_duration_minutes: row.session_duration_minutes,
        price_cents: row.price_cents,
        discount_percent: row.discount_percent,
        interval_days: row.interval_days,
        validity_days: row.validity_days,
        active: row.active != 0,
        created_at: parse_datetime(&row.created_at)?,
    })
}
